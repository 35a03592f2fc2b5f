use anyhow::Result;
use futures::Stream;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::ScanConfig;
use crate::identify::ServerIdentifier;
use crate::netdetect::{InterfaceResolver, SubnetResolver};
use crate::probe::TcpProbe;
use crate::scheduler::{ProbeScheduler, SharedProgress};
use crate::types::{DiscoveredServer, ScanState};

/// Message carried by [`ScanState::Error`] when no local network is available.
pub const NOT_CONNECTED: &str = "Not connected to a local network";

/// One discovery scan, observed as a stream of [`ScanState`]s.
///
/// A session is single-shot: [`ScanSession::scan`] consumes it. Clone a
/// configured session before scanning to keep a template for later scans.
#[derive(Clone)]
pub struct ScanSession {
    resolver: Arc<dyn SubnetResolver>,
    scheduler: ProbeScheduler,
    progress_interval: Duration,
    cancel: CancellationToken,
}

enum Step {
    Tick,
    Finished(Vec<DiscoveredServer>),
    Cancelled,
}

impl ScanSession {
    pub fn new(
        resolver: Arc<dyn SubnetResolver>,
        scheduler: ProbeScheduler,
        config: &ScanConfig,
    ) -> Self {
        Self {
            resolver,
            scheduler,
            progress_interval: config.progress_interval.max(Duration::from_millis(1)),
            cancel: CancellationToken::new(),
        }
    }

    /// Session over the host's interfaces, real TCP connects and a `reqwest` client.
    pub fn from_config(config: &ScanConfig) -> Result<Self> {
        Self::with_resolver(Arc::new(InterfaceResolver), config)
    }

    /// Like [`ScanSession::from_config`] but sweeping whatever `resolver` reports.
    pub fn with_resolver(resolver: Arc<dyn SubnetResolver>, config: &ScanConfig) -> Result<Self> {
        let identifier = ServerIdentifier::with_timeout(config.http_timeout)?;
        let scheduler = ProbeScheduler::new(Arc::new(TcpProbe), identifier, config);
        Ok(Self::new(resolver, scheduler, config))
    }

    /// Attach an external cancellation token. Cancelling it ends the stream
    /// without a terminal state and aborts all outstanding probes.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the scan lazily: nothing happens until the stream is polled.
    ///
    /// Emits `Error` and ends if no subnet resolves. Otherwise emits
    /// `Scanning(0.0)`, then a `Scanning` update every progress interval
    /// while probes are outstanding, then one `Completed`. Dropping the
    /// stream early tears down every probe.
    pub fn scan(self) -> impl Stream<Item = ScanState> + Send + 'static {
        async_stream::stream! {
            let Some(prefix) = self.resolver.resolve() else {
                tracing::info!("no local IPv4 network; skipping scan");
                yield ScanState::Error { message: NOT_CONNECTED.to_string() };
                return;
            };

            let total = self.scheduler.target_count();
            tracing::info!("scanning {prefix}.0/24 ({total} probes)");
            yield ScanState::Scanning { progress: 0.0 };

            let progress = SharedProgress::new();
            let run = self.scheduler.run(&prefix, &progress);
            tokio::pin!(run);

            let period = self.progress_interval;
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut last = 0.0;

            loop {
                let step = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => Step::Cancelled,
                    servers = &mut run => Step::Finished(servers),
                    _ = ticker.tick() => Step::Tick,
                };

                match step {
                    Step::Tick => {
                        let done = progress.completed();
                        if done >= total {
                            continue;
                        }
                        let fraction = done as f64 / total as f64;
                        if fraction >= last {
                            last = fraction;
                            yield ScanState::Scanning { progress: fraction };
                        }
                    }
                    Step::Finished(servers) => {
                        tracing::info!(
                            "scan of {prefix}.0/24 finished: {} inference servers",
                            servers.len()
                        );
                        yield ScanState::Completed { servers };
                        return;
                    }
                    Step::Cancelled => {
                        tracing::info!("scan of {prefix}.0/24 cancelled");
                        return;
                    }
                }
            }
        }
    }
}
