//! Upstream forwarding behind a resolver trait.

use crate::error::DnsError;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::debug;

/// Largest datagram accepted from the upstream
const MAX_RESPONSE_SIZE: usize = 65535;

/// DNS resolver trait using generics for zero-cost abstraction.
///
/// The server only needs "send these bytes upstream, give me the reply";
/// tests substitute a counting mock.
pub trait DnsResolver: Send + Sync {
    /// Relay a raw query and return the raw response bytes
    fn resolve(
        &self,
        query: &[u8],
        upstream: SocketAddr,
        timeout: Duration,
        enable_logging: bool,
    ) -> impl Future<Output = Result<Vec<u8>, DnsError>> + Send;
}

/// Forwards over a fresh UDP socket per query
#[derive(Debug, Default, Clone, Copy)]
pub struct UdpDnsResolver;

impl UdpDnsResolver {
    pub fn new() -> Self {
        UdpDnsResolver
    }
}

impl DnsResolver for UdpDnsResolver {
    async fn resolve(
        &self,
        query: &[u8],
        upstream: SocketAddr,
        timeout: Duration,
        enable_logging: bool,
    ) -> Result<Vec<u8>, DnsError> {
        // Bind to appropriate address family based on upstream (IPv4 or IPv6)
        let bind_addr = if upstream.is_ipv4() {
            "0.0.0.0:0"
        } else {
            "[::]:0"
        };

        let socket = UdpSocket::bind(bind_addr).await?;
        // Connected: replies from any other source are dropped by the kernel
        socket.connect(upstream).await?;
        socket.send(query).await?;

        let mut response_buf = vec![0u8; MAX_RESPONSE_SIZE];
        match tokio::time::timeout(timeout, socket.recv(&mut response_buf)).await {
            Ok(Ok(len)) => {
                if enable_logging {
                    debug!(upstream = %upstream, bytes = len, "DNS upstream replied");
                }
                response_buf.truncate(len);
                Ok(response_buf)
            }
            Ok(Err(e)) => Err(DnsError::Io(e)),
            Err(_) => Err(DnsError::Timeout),
        }
    }
}
