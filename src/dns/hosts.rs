//! Wildcard host table loaded from a hosts-style file.
//!
//! Only lines of the form `<ip>  *<suffix>` are kept, e.g.
//! `127.0.0.1  *.dev.local` answers every name ending in `.dev.local`.

use crate::error::ProxyError;
use std::fs;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use tracing::debug;

const WILDCARD: char = '*';

/// One wildcard binding: names ending in `suffix` resolve to `addr`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEntry {
    pub addr: IpAddr,
    pub suffix: String,
}

impl HostEntry {
    /// Address in network byte order: 4 bytes for IPv4, 16 for IPv6
    pub fn packed_addr(&self) -> Vec<u8> {
        match self.addr {
            IpAddr::V4(v4) => v4.octets().to_vec(),
            IpAddr::V6(v6) => v6.octets().to_vec(),
        }
    }
}

/// Wildcard entries in file order. Immutable once loaded.
#[derive(Debug, Clone, Default)]
pub struct HostsTable {
    entries: Vec<HostEntry>,
}

impl HostsTable {
    pub fn new(entries: Vec<HostEntry>) -> Self {
        HostsTable { entries }
    }

    /// Read and parse a hosts file. An unreadable file is an error; a file
    /// with no wildcard lines gives an empty table.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ProxyError> {
        let path = path.as_ref();
        let raw = fs::read(path).map_err(|source| ProxyError::Hosts {
            path: path.to_path_buf(),
            source,
        })?;
        let table = Self::parse(&String::from_utf8_lossy(&raw));
        debug!(path = %path.display(), entries = table.len(), "Hosts file loaded");
        Ok(table)
    }

    /// Parse hosts-file text, skipping every line that is not a wildcard binding
    pub fn parse(content: &str) -> Self {
        let entries = content.lines().filter_map(parse_wildcard_line).collect();
        HostsTable { entries }
    }

    /// First entry, in load order, whose suffix ends `qname`
    pub fn lookup(&self, qname: &str) -> Option<&HostEntry> {
        self.entries.iter().find(|entry| qname.ends_with(&entry.suffix))
    }

    pub fn entries(&self) -> &[HostEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn parse_wildcard_line(line: &str) -> Option<HostEntry> {
    let mut fields = line.split_whitespace();
    let ip = fields.next()?;
    let suffix = fields.next()?.strip_prefix(WILDCARD)?;
    let addr = parse_addr(ip)?;

    Some(HostEntry {
        addr,
        suffix: suffix.to_string(),
    })
}

// IPv4 first, then IPv6
fn parse_addr(text: &str) -> Option<IpAddr> {
    if let Ok(v4) = text.parse::<Ipv4Addr>() {
        return Some(IpAddr::V4(v4));
    }
    text.parse::<Ipv6Addr>().ok().map(IpAddr::V6)
}
