use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time;

use crate::config::ScanConfig;
use crate::identify::ServerIdentifier;
use crate::netdetect::subnet_hosts;
use crate::probe::PortProbe;
use crate::types::{DiscoveredServer, ProbeTarget};

/// Every (host, port) pair of a `/24` sweep: hosts `.1` to `.254` times `ports`.
pub fn probe_targets(prefix: &str, ports: &[u16]) -> Vec<ProbeTarget> {
    subnet_hosts(prefix)
        .into_iter()
        .flat_map(|ip| ports.iter().map(move |&port| ProbeTarget::new(ip.clone(), port)))
        .collect()
}

/// Completion counter shared between probe workers and whoever reports progress.
#[derive(Clone, Debug, Default)]
pub struct SharedProgress {
    completed: Arc<AtomicU64>,
}

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    fn record(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Fans probes out over a subnet with a bounded number in flight.
///
/// - Limits concurrent probes using a `Semaphore`; a worker holds its permit
///   through the TCP connect and any identification requests.
/// - Counts every finished probe in [`SharedProgress`], matched or not.
/// - Returns matches in the order their probes finished.
#[derive(Clone)]
pub struct ProbeScheduler {
    probe: Arc<dyn PortProbe>,
    identifier: ServerIdentifier,
    ports: Vec<u16>,
    concurrency: usize,
    connect_timeout: Duration,
    deadline: Option<Duration>,
}

impl ProbeScheduler {
    pub fn new(probe: Arc<dyn PortProbe>, identifier: ServerIdentifier, config: &ScanConfig) -> Self {
        Self {
            probe,
            identifier,
            ports: config.ports.clone(),
            concurrency: config.concurrency.max(1),
            connect_timeout: config.connect_timeout,
            deadline: config.deadline,
        }
    }

    /// Number of probes a sweep of one subnet runs.
    pub fn target_count(&self) -> u64 {
        254 * self.ports.len() as u64
    }

    /// Probe every target under `prefix` and collect the identified servers.
    ///
    /// Dropping the returned future aborts every outstanding probe. If a
    /// deadline is configured, probes still running when it passes are
    /// aborted and the servers found so far are returned.
    pub async fn run(&self, prefix: &str, progress: &SharedProgress) -> Vec<DiscoveredServer> {
        let targets = probe_targets(prefix, &self.ports);
        let sem = Arc::new(Semaphore::new(self.concurrency));
        let mut set = JoinSet::new();
        let mut found = Vec::new();

        let sweep = async {
            for target in targets {
                let permit = sem
                    .clone()
                    .acquire_owned()
                    .await
                    .expect("probe semaphore is never closed");
                let probe = self.probe.clone();
                let identifier = self.identifier.clone();
                let progress = progress.clone();
                let timeout = self.connect_timeout;

                set.spawn(async move {
                    let server = if probe.is_open(&target.ip, target.port, timeout).await {
                        identifier.identify(&target.ip, target.port).await
                    } else {
                        None
                    };
                    drop(permit);
                    progress.record();
                    server
                });

                while let Some(res) = set.try_join_next() {
                    collect(res, &mut found);
                }
            }
            while let Some(res) = set.join_next().await {
                collect(res, &mut found);
            }
        };

        match self.deadline {
            Some(deadline) => {
                if time::timeout(deadline, sweep).await.is_err() {
                    while let Some(res) = set.try_join_next() {
                        collect(res, &mut found);
                    }
                    tracing::warn!(
                        "scan deadline of {deadline:?} passed with {} probes outstanding",
                        set.len()
                    );
                    set.abort_all();
                }
            }
            None => sweep.await,
        }

        found
    }
}

fn collect(res: Result<Option<DiscoveredServer>, JoinError>, found: &mut Vec<DiscoveredServer>) {
    match res {
        Ok(Some(server)) => {
            tracing::debug!(
                "found {} server at {}:{} with {} models",
                server.kind.label(),
                server.address,
                server.port,
                server.models.len()
            );
            found.push(server);
        }
        Ok(None) => {}
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => {}
    }
}
