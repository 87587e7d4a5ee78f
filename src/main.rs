//! dnsproxy - a caching DNS forwarding proxy
//!
//! Answers A/AAAA queries for wildcard names from a hosts file, caches
//! address answers from the upstream resolver and relays everything else.

use clap::{CommandFactory, Parser};
use dnsproxy::config::{load_config, resolve_listen_addr, resolve_upstream, Config, LogFormat};
use dnsproxy::dns::{run_dns_server, DnsCache, HostsTable, ProxyState, UdpDnsResolver};
use dnsproxy::error::Result;
use dnsproxy::logging;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tracing::error;

#[derive(Parser)]
#[command(name = "dnsproxy")]
#[command(version)]
#[command(about = "Caching DNS forwarding proxy with wildcard host overrides")]
struct Cli {
    /// Upstream DNS server (IP, ip:port or host name)
    #[arg(short = 's', long)]
    server: Option<String>,

    /// Address to listen on
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Hosts file with wildcard entries
    #[arg(short = 'f', long, value_name = "FILE")]
    hosts_file: Option<String>,

    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// Upstream timeout in seconds
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Console log format
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// Apply command line values on top of the file configuration
    fn apply(self, config: &mut Config) {
        if let Some(server) = self.server {
            config.upstream = Some(server);
        }
        if let Some(host) = self.host {
            config.listen_host = host;
        }
        if let Some(port) = self.port {
            config.listen_port = port;
        }
        if let Some(hosts_file) = self.hosts_file {
            config.hosts_file = hosts_file;
        }
        if let Some(timeout) = self.timeout {
            config.upstream_timeout_seconds = timeout;
        }
        if let Some(format) = self.log_format {
            config.logging.format = format;
        }
    }
}

fn parse_log_format(s: &str) -> std::result::Result<LogFormat, String> {
    match s {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => Err(format!("unknown log format '{}' (expected text or json)", other)),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    cli.apply(&mut config);

    let Some(upstream) = config.upstream.clone() else {
        eprintln!("Error: no upstream DNS server given\n");
        // Best effort; the exit code carries the failure
        let _ = Cli::command().print_help();
        return ExitCode::FAILURE;
    };

    // Initialize logging system
    let _log_guard = logging::init_logging(&config.logging);

    tracing::debug!(config = ?config, "Configuration loaded");

    match run(config, &upstream).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "DNS proxy failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config, upstream: &str) -> Result<()> {
    let hosts = HostsTable::load(&config.hosts_file)?;
    let upstream = resolve_upstream(upstream).await?;
    let listen_addr = resolve_listen_addr(&config.listen_host, config.listen_port).await?;

    let socket = UdpSocket::bind(listen_addr).await?;
    println!("DNS proxy listening on {}", socket.local_addr()?);
    println!("DNS upstream: {}", upstream);

    let state = Arc::new(ProxyState {
        resolver: UdpDnsResolver::new(),
        upstream,
        upstream_timeout: Duration::from_secs(config.upstream_timeout_seconds),
        hosts,
        cache: Mutex::new(DnsCache::new(config.cache.clone())),
        enable_logging: config.logging.log_requests,
    });

    run_dns_server(socket, state).await
}
