use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use serde::Serialize;
use time::{format_description::well_known, OffsetDateTime};
use tokio_util::sync::CancellationToken;

use lan_infer_scan::netdetect::{InterfaceResolver, StaticSubnet, SubnetResolver};
use lan_infer_scan::{server, DiscoveredServer, ScanConfig, ScanSession, ScanState};

/// lan-infer-scan — find Ollama and OpenAI-compatible inference servers on your LAN.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "lan-infer-scan",
    version,
    about = "Find Ollama and OpenAI-compatible inference servers on the local /24 network.",
    long_about = None
)]
struct Cli {
    /// Subnet prefix to sweep, e.g. 192.168.1. If omitted, derived from the active interface.
    #[arg(long)]
    subnet: Option<String>,

    /// Max probes in flight.
    #[arg(long, default_value_t = 64)]
    concurrency: usize,

    /// TCP connect timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 400)]
    timeout_ms: u64,

    /// Timeout for each identification HTTP request, in milliseconds.
    #[arg(long = "http-timeout-ms", default_value_t = 3000)]
    http_timeout_ms: u64,

    /// Interval between progress updates, in milliseconds.
    #[arg(long = "progress-ms", default_value_t = 250)]
    progress_ms: u64,

    /// Abort the scan after this many seconds and report what was found.
    #[arg(long = "deadline-secs")]
    deadline_secs: Option<u64>,

    /// Write results as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Serve the discovery HTTP API on this address instead of scanning once.
    #[arg(long)]
    serve: Option<String>,
}

impl Cli {
    fn scan_config(&self) -> ScanConfig {
        ScanConfig::default()
            .with_concurrency(self.concurrency)
            .with_connect_timeout(Duration::from_millis(self.timeout_ms))
            .with_http_timeout(Duration::from_millis(self.http_timeout_ms))
            .with_progress_interval(Duration::from_millis(self.progress_ms))
            .with_deadline(self.deadline_secs.map(Duration::from_secs))
    }

    fn resolver(&self) -> Arc<dyn SubnetResolver> {
        match &self.subnet {
            Some(prefix) => Arc::new(StaticSubnet(prefix.clone())),
            None => Arc::new(InterfaceResolver),
        }
    }
}

#[derive(Debug, Serialize)]
struct ScanReport<'a> {
    subnet: Option<String>,
    finished_at: String,
    servers: &'a [DiscoveredServer],
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.scan_config();
    tracing::debug!(?config, "scan configuration");

    let resolver = cli.resolver();
    if let Some(bind) = cli.serve.as_deref() {
        let template = ScanSession::with_resolver(resolver, &config)?;
        return server::spawn_server(bind, template).await;
    }

    let pinned = StaticSubnet::snapshot(resolver.as_ref());
    let subnet = pinned.as_ref().map(|p| p.0.clone());
    let session = ScanSession::with_resolver(Arc::new(pinned), &config)?;

    // Ctrl-C cancels the scan.
    let cancel = CancellationToken::new();
    let cancel_ctrlc = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        cancel_ctrlc.cancel();
    });

    let states = session.with_cancel(cancel).scan();
    futures::pin_mut!(states);
    let mut servers = None;
    while let Some(state) = states.next().await {
        match state {
            ScanState::Scanning { progress } => {
                tracing::info!("scanning: {:>3.0}%", progress * 100.0);
            }
            ScanState::Completed { servers: found } => servers = Some(found),
            ScanState::Error { message } => anyhow::bail!(message),
        }
    }

    let Some(servers) = servers else {
        tracing::warn!("scan cancelled");
        return Ok(());
    };

    print_servers_table(&servers);
    if let Some(path) = cli.output.as_deref() {
        let report = ScanReport {
            subnet,
            finished_at: now_rfc3339(),
            servers: &servers,
        };
        write_report_json(path, &report)?;
        println!("Wrote JSON results to {}", path.display());
    }

    Ok(())
}

fn print_servers_table(servers: &[DiscoveredServer]) {
    let mut addr_w = "address".len();
    let mut models_w = "models".len();
    let listed: Vec<String> = servers.iter().map(|s| s.models.join(", ")).collect();
    for (s, models) in servers.iter().zip(&listed) {
        addr_w = addr_w.max(s.address.len());
        models_w = models_w.max(models.len().min(60));
    }
    let port_w = 5usize;
    let kind_w = "openai-compatible".len();
    let runtime_w = "lmstudio".len();

    println!("\nInference servers found: {}", servers.len());
    println!(
        "{:<addr_w$}  {:>port_w$}  {:<kind_w$}  {:<runtime_w$}  {:<models_w$}",
        "address", "port", "kind", "runtime", "models"
    );
    println!(
        "{:-<addr_w$}  {:-<port_w$}  {:-<kind_w$}  {:-<runtime_w$}  {:-<models_w$}",
        "", "", "", "", ""
    );
    for (s, models) in servers.iter().zip(listed) {
        let mut snip = models;
        if snip.len() > 60 {
            let cut = (0..=60).rev().find(|&i| snip.is_char_boundary(i)).unwrap_or(0);
            snip.truncate(cut);
        }
        println!(
            "{:<addr_w$}  {:>port_w$}  {:<kind_w$}  {:<runtime_w$}  {:<models_w$}",
            s.address,
            s.port,
            s.kind.label(),
            s.runtime(),
            snip
        );
    }
}

fn write_report_json(path: &Path, report: &ScanReport<'_>) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
