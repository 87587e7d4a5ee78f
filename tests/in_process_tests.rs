//! In-process integration tests for the DNS proxy.
//!
//! These tests start the real server on a free UDP port, pointed at a fake
//! upstream resolver that also runs in-process, and query it over UDP.

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use dnsproxy::config::DnsCacheConfig;
use dnsproxy::dns::wire::{
    Header, Message, Question, ResourceRecord, CLASS_IN, FLAG_QR, FLAG_RA, FLAG_RD, TYPE_A,
};
use dnsproxy::dns::{run_dns_server, DnsCache, HostsTable, ProxyState, UdpDnsResolver};

const TYPE_MX: u16 = 15;
const UPSTREAM_ADDR: [u8; 4] = [10, 0, 0, 1];

/// Fake upstream: answers every query with one A record and counts queries
struct FakeUpstream {
    addr: SocketAddr,
    queries: Arc<AtomicUsize>,
}

async fn start_fake_upstream() -> FakeUpstream {
    start_fake_upstream_with_ttl(300).await
}

async fn start_fake_upstream_with_ttl(ttl: u32) -> FakeUpstream {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();
    let queries = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&queries);

    tokio::spawn(async move {
        let mut buf = vec![0u8; 1500];
        while let Ok((len, src)) = socket.recv_from(&mut buf).await {
            counter.fetch_add(1, Ordering::SeqCst);
            let Ok(query) = Message::parse(&buf[..len]) else {
                continue;
            };
            let qname = query.questions[0].qname.clone();
            let response = Message {
                header: Header {
                    flags: FLAG_QR | FLAG_RD | FLAG_RA,
                    ..query.header
                },
                questions: query.questions,
                answers: vec![ResourceRecord::new(
                    qname,
                    TYPE_A,
                    CLASS_IN,
                    ttl,
                    UPSTREAM_ADDR.to_vec(),
                )],
                ..Default::default()
            };
            let _ = socket.send_to(&response.to_bytes().unwrap(), src).await;
        }
    });

    FakeUpstream { addr, queries }
}

/// Fake upstream that never answers
async fn start_silent_upstream() -> (SocketAddr, tokio::net::UdpSocket) {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    (socket.local_addr().unwrap(), socket)
}

/// Start a DNS proxy and return its address
async fn start_test_dns_server(
    upstream: SocketAddr,
    hosts: &str,
    upstream_timeout: Duration,
) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    start_test_dns_server_with_cache(upstream, hosts, upstream_timeout, DnsCacheConfig::default()).await
}

async fn start_test_dns_server_with_cache(
    upstream: SocketAddr,
    hosts: &str,
    upstream_timeout: Duration,
    cache_config: DnsCacheConfig,
) -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let socket = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let addr = socket.local_addr().unwrap();

    let state = Arc::new(ProxyState {
        resolver: UdpDnsResolver::new(),
        upstream,
        upstream_timeout,
        hosts: HostsTable::parse(hosts),
        cache: Mutex::new(DnsCache::new(cache_config)),
        enable_logging: false, // Disable logging for tests to reduce noise
    });

    let handle = tokio::spawn(async move {
        let _ = run_dns_server(socket, state).await;
    });

    (addr, handle)
}

fn build_query(domain: &str, qtype: u16, id: u16) -> Vec<u8> {
    Message {
        header: Header {
            id,
            flags: FLAG_RD,
            ..Default::default()
        },
        questions: vec![Question::new(domain, qtype, CLASS_IN)],
        ..Default::default()
    }
    .to_bytes()
    .unwrap()
}

fn client_socket(read_timeout: Duration) -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket.set_read_timeout(Some(read_timeout)).unwrap();
    socket
}

/// Send one query from a blocking socket and wait for the reply
async fn exchange(socket: UdpSocket, server: SocketAddr, query: Vec<u8>) -> (UdpSocket, Option<Message>) {
    tokio::task::spawn_blocking(move || {
        socket.send_to(&query, server).unwrap();
        let mut buf = [0u8; 4096];
        let reply = socket
            .recv_from(&mut buf)
            .ok()
            .map(|(len, _)| Message::parse(&buf[..len]).unwrap());
        (socket, reply)
    })
    .await
    .unwrap()
}

// ============== DNS Tests ==============

#[tokio::test]
async fn test_dns_wildcard_answered_locally() {
    let upstream = start_fake_upstream().await;
    let (dns_addr, _handle) =
        start_test_dns_server(upstream.addr, "192.168.0.9 *.lan.test\n", Duration::from_secs(2)).await;

    let socket = client_socket(Duration::from_secs(5));
    let (_, reply) = exchange(socket, dns_addr, build_query("nas.lan.test", TYPE_A, 0x1234)).await;

    let reply = reply.expect("wildcard query should be answered");
    assert_eq!(reply.header.id, 0x1234);
    assert!(reply.header.is_response());
    assert_eq!(reply.answers.len(), 1);
    assert_eq!(reply.answers[0].rdata, vec![192, 168, 0, 9]);
    assert_eq!(reply.answers[0].ttl, 2000);
    assert_eq!(upstream.queries.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_dns_query_forwarding_and_cache_hit() {
    let upstream = start_fake_upstream().await;
    let (dns_addr, _handle) = start_test_dns_server(upstream.addr, "", Duration::from_secs(2)).await;

    let socket = client_socket(Duration::from_secs(5));

    // First query goes upstream
    let (socket, first) = exchange(socket, dns_addr, build_query("example.com", TYPE_A, 0x1111)).await;
    let first = first.expect("forwarded query should be answered");
    assert_eq!(first.header.id, 0x1111);
    assert_eq!(first.answers[0].rdata, UPSTREAM_ADDR.to_vec());
    assert_eq!(upstream.queries.load(Ordering::SeqCst), 1);

    // Second query (should hit cache)
    let (_, second) = exchange(socket, dns_addr, build_query("example.com", TYPE_A, 0x2222)).await;
    let second = second.expect("cached query should be answered");
    assert_eq!(second.header.id, 0x2222);
    assert_eq!(second.header.flags, FLAG_QR | FLAG_RD | FLAG_RA);
    assert_eq!(second.answers, first.answers);
    assert_eq!(upstream.queries.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_dns_expired_answer_forwarded_again() {
    let upstream = start_fake_upstream_with_ttl(0).await;
    let (dns_addr, _handle) = start_test_dns_server_with_cache(
        upstream.addr,
        "",
        Duration::from_secs(2),
        DnsCacheConfig { respect_ttl: true },
    )
    .await;

    let socket = client_socket(Duration::from_secs(5));
    let (socket, first) = exchange(socket, dns_addr, build_query("short.test", TYPE_A, 0x6001)).await;
    assert_eq!(first.expect("first query should be answered").header.id, 0x6001);

    // Zero TTL: the cached entry is already stale
    let (_, second) = exchange(socket, dns_addr, build_query("short.test", TYPE_A, 0x6002)).await;
    let second = second.expect("second query should be answered");
    assert_eq!(second.header.id, 0x6002);
    assert_eq!(second.answers[0].ttl, 0);

    assert_eq!(upstream.queries.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dns_mx_forwarded_every_time() {
    let upstream = start_fake_upstream().await;
    let (dns_addr, _handle) = start_test_dns_server(upstream.addr, "", Duration::from_secs(2)).await;

    let mut socket = client_socket(Duration::from_secs(5));
    for i in 0..3u16 {
        let (s, reply) = exchange(socket, dns_addr, build_query("mail.test", TYPE_MX, 0x3000 + i)).await;
        socket = s;
        assert_eq!(reply.expect("MX query should be relayed").header.id, 0x3000 + i);
    }

    assert_eq!(upstream.queries.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_dns_malformed_query_gets_no_reply() {
    let upstream = start_fake_upstream().await;
    let (dns_addr, _handle) = start_test_dns_server(upstream.addr, "", Duration::from_secs(2)).await;

    let socket = client_socket(Duration::from_millis(500));
    let (socket, reply) = exchange(socket, dns_addr, vec![0x12, 0x34, 0x01]).await;
    assert!(reply.is_none());
    assert_eq!(upstream.queries.load(Ordering::SeqCst), 0);

    // Server keeps serving after a bad datagram
    socket.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let (_, reply) = exchange(socket, dns_addr, build_query("after.test", TYPE_A, 0x4444)).await;
    assert_eq!(reply.expect("server should still answer").header.id, 0x4444);
}

#[tokio::test]
async fn test_dns_upstream_timeout_gets_no_reply() {
    let (silent_addr, _silent) = start_silent_upstream().await;
    let (dns_addr, _handle) =
        start_test_dns_server(silent_addr, "", Duration::from_millis(200)).await;

    let socket = client_socket(Duration::from_secs(1));
    let (_, reply) = exchange(socket, dns_addr, build_query("slow.test", TYPE_A, 0x5555)).await;

    assert!(reply.is_none());
}

#[tokio::test]
async fn test_dns_concurrent_queries() {
    let upstream = start_fake_upstream().await;
    let (dns_addr, _handle) =
        start_test_dns_server(upstream.addr, "127.0.0.2 *.local.test\n", Duration::from_secs(2)).await;

    let mut tasks = Vec::new();
    for i in 0..10u16 {
        let domain = if i % 2 == 0 {
            format!("host{}.local.test", i)
        } else {
            format!("remote{}.test", i)
        };
        let socket = client_socket(Duration::from_secs(5));
        tasks.push(tokio::spawn(exchange(socket, dns_addr, build_query(&domain, TYPE_A, i))));
    }

    for (i, task) in tasks.into_iter().enumerate() {
        let (_, reply) = task.await.unwrap();
        assert_eq!(reply.expect("every query should be answered").header.id, i as u16);
    }

    assert_eq!(upstream.queries.load(Ordering::SeqCst), 5);
}
