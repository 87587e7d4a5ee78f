//! DNS proxy: wire codec, wildcard hosts, answer cache and UDP server.

pub mod cache;
pub mod hosts;
pub mod resolver;
pub mod server;
pub mod wire;

pub use cache::DnsCache;
pub use hosts::{HostEntry, HostsTable};
pub use resolver::{DnsResolver, UdpDnsResolver};
pub use server::{handle_dns_query, run_dns_server, ProxyState};
