//! DNS proxy server: wildcard host answers, answer cache, upstream forwarding.

use crate::dns::cache::DnsCache;
use crate::dns::hosts::HostsTable;
use crate::dns::resolver::DnsResolver;
use crate::dns::wire::{
    Header, Message, ResourceRecord, CLASS_IN, FLAG_QR, FLAG_RA, FLAG_RD, TYPE_A, TYPE_AAAA,
};
use crate::error::{DnsError, ProxyError};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// TTL given to answers synthesized from the hosts table
pub const WILDCARD_TTL: u32 = 2000;

// Largest inbound client datagram
const MAX_QUERY_SIZE: usize = 8192;
const CACHE_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// State shared by every query handler
pub struct ProxyState<R> {
    pub resolver: R,
    pub upstream: SocketAddr,
    pub upstream_timeout: Duration,
    pub hosts: HostsTable,
    pub cache: Mutex<DnsCache>,
    pub enable_logging: bool,
}

/// Serve queries arriving on `socket` until the process is stopped.
///
/// Each datagram is handled on its own task, so a slow upstream only holds
/// up the query waiting on it.
pub async fn run_dns_server<R>(socket: UdpSocket, state: Arc<ProxyState<R>>) -> Result<(), ProxyError>
where
    R: DnsResolver + 'static,
{
    let enable_logging = state.enable_logging;
    let socket = Arc::new(socket);

    if enable_logging {
        info!(
            listen = %socket.local_addr()?,
            upstream = %state.upstream,
            wildcard_hosts = state.hosts.len(),
            timeout_secs = state.upstream_timeout.as_secs(),
            "DNS proxy started"
        );
    }

    // Spawn cleanup task for DNS cache
    if state.cache.lock().await.respects_ttl() {
        let cleanup_state = Arc::clone(&state);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(CACHE_CLEANUP_INTERVAL).await;
                cleanup_state.cache.lock().await.cleanup();
            }
        });
    }

    loop {
        let mut buf = vec![0u8; MAX_QUERY_SIZE];
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                if enable_logging {
                    warn!(error = %e, "DNS receive failed");
                }
                continue;
            }
        };
        buf.truncate(len);

        if enable_logging {
            debug!(bytes = len, client = %src, "DNS query received");
        }

        let socket_clone = Arc::clone(&socket);
        let state_clone = Arc::clone(&state);

        tokio::spawn(async move {
            match handle_dns_query(&*state_clone, &buf, src).await {
                Ok(response) => {
                    if let Err(e) = socket_clone.send_to(&response, src).await {
                        if enable_logging {
                            error!(client = %src, error = %e, "DNS failed to send response");
                        }
                    } else if enable_logging {
                        debug!(bytes = response.len(), client = %src, "DNS response sent");
                    }
                }
                // No reply: the client's own retry logic takes over
                Err(DnsError::NoQuestion) => {
                    if enable_logging {
                        debug!(client = %src, "DNS query without question dropped");
                    }
                }
                Err(e @ DnsError::Encode(_)) => {
                    if enable_logging {
                        error!(client = %src, error = %e, "DNS failed to build response");
                    }
                }
                Err(e) => {
                    if enable_logging {
                        warn!(client = %src, error = %e, "DNS query dropped");
                    }
                }
            }
        });
    }
}

/// Decide how to answer one datagram and produce the reply bytes.
///
/// A/AAAA queries in class IN are answered from the hosts table, then the
/// cache, then upstream (caching address answers). Everything else is
/// relayed to the upstream untouched. Any error means no reply is sent.
pub async fn handle_dns_query<R: DnsResolver>(
    state: &ProxyState<R>,
    query_buf: &[u8],
    client: SocketAddr,
) -> Result<Vec<u8>, DnsError> {
    let enable_logging = state.enable_logging;

    let request = match Message::parse(query_buf) {
        Ok(m) => m,
        Err(e) => {
            if enable_logging {
                warn!(
                    client = %client,
                    error = %e,
                    bytes = query_buf.len(),
                    "DNS failed to parse query"
                );
            }
            return Err(e.into());
        }
    };

    // Only the first question is considered
    let Some(question) = request.questions.first() else {
        return Err(DnsError::NoQuestion);
    };

    if enable_logging {
        info!(
            id = request.header.id,
            client = %client,
            name = %question.qname,
            qtype = %question.record_type(),
            "DNS query"
        );
    }

    if !question.is_address_query() {
        return forward(state, query_buf).await;
    }

    if let Some(entry) = state.hosts.lookup(&question.qname) {
        if enable_logging {
            debug!(name = %question.qname, addr = %entry.addr, "DNS wildcard hit");
        }
        let rtype = if entry.addr.is_ipv4() { TYPE_A } else { TYPE_AAAA };
        let answer = ResourceRecord::new(
            question.qname.clone(),
            rtype,
            CLASS_IN,
            WILDCARD_TTL,
            entry.packed_addr(),
        );
        return build_answer_response(&request, vec![answer]);
    }

    let cached = state.cache.lock().await.get(&question.qname);
    if let Some(answers) = cached {
        if enable_logging {
            debug!(name = %question.qname, answers = answers.len(), "DNS cache hit");
        }
        return build_answer_response(&request, answers);
    }

    let response_buf = forward(state, query_buf).await?;

    match Message::parse(&response_buf) {
        Ok(response) => {
            let answers: Vec<ResourceRecord> = response
                .answers
                .into_iter()
                .filter(ResourceRecord::is_address)
                .collect();
            if !answers.is_empty() {
                if enable_logging {
                    debug!(name = %question.qname, answers = answers.len(), "DNS cached");
                }
                state.cache.lock().await.put(&question.qname, answers);
            }
        }
        Err(e) => {
            if enable_logging {
                warn!(error = %e, "DNS upstream response not decodable, relaying uncached");
            }
        }
    }

    Ok(response_buf)
}

async fn forward<R: DnsResolver>(state: &ProxyState<R>, query_buf: &[u8]) -> Result<Vec<u8>, DnsError> {
    state
        .resolver
        .resolve(
            query_buf,
            state.upstream,
            state.upstream_timeout,
            state.enable_logging,
        )
        .await
}

/// Reply to `request` with `answers`: header and questions copied, flags
/// set to QR|RD|RA, counts taken from the sections.
fn build_answer_response(
    request: &Message,
    answers: Vec<ResourceRecord>,
) -> Result<Vec<u8>, DnsError> {
    let response = Message {
        header: Header {
            flags: FLAG_QR | FLAG_RD | FLAG_RA,
            ..request.header
        },
        questions: request.questions.clone(),
        answers,
        ..Default::default()
    };
    response.to_bytes().map_err(DnsError::Encode)
}
