//! Structured error types for the proxy.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for startup and operator-facing failures
#[derive(Debug, Error)]
pub enum ProxyError {
    /// IO error (socket bind, config file read)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
    /// Hosts file could not be read
    #[error("Cannot read hosts file {}: {source}", path.display())]
    Hosts {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// DNS resolution or query error
    #[error("DNS error: {0}")]
    Dns(#[from] DnsError),
}

/// Errors produced by the wire codec.
///
/// All of these are local to one message: the caller decides whether to drop
/// the datagram or log it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WireError {
    /// Fewer bytes remain than a fixed-size field requires
    #[error("message truncated")]
    TruncatedMessage,
    /// Compression pointers nested deeper than the decoder allows
    #[error("compression pointer chain too deep or cyclic")]
    CompressionLoop,
    /// Label length byte uses a reserved encoding, or a label is out of range
    #[error("invalid label length: {0}")]
    InvalidLabelLength(usize),
    /// Label bytes are not valid UTF-8
    #[error("label is not valid UTF-8")]
    NonUtf8Label,
    /// Label contains a `.` byte, which the dotted name form cannot express
    #[error("label contains a dot")]
    DotInLabel,
    /// Record data does not fit the 16-bit length field
    #[error("rdata too long: {0} bytes")]
    RdataTooLong(usize),
    /// A section has more entries than a 16-bit count can express
    #[error("too many entries in section: {0}")]
    TooManyEntries(usize),
}

/// Per-query DNS errors
#[derive(Debug, Error)]
pub enum DnsError {
    /// Failed to decode a DNS message
    #[error("DNS decode error: {0}")]
    Decode(#[from] WireError),
    /// Failed to encode a response built locally
    #[error("DNS encode error: {0}")]
    Encode(WireError),
    /// Request decoded but carries no question
    #[error("DNS request has no question")]
    NoQuestion,
    /// Timeout waiting for the upstream response
    #[error("DNS upstream timeout")]
    Timeout,
    /// Socket failure talking to the upstream
    #[error("DNS upstream IO error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience type alias for Results using ProxyError
pub type Result<T> = std::result::Result<T, ProxyError>;
