#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lan_infer_scan::identify::{HttpGet, ServerIdentifier};
use lan_infer_scan::netdetect::{StaticSubnet, SubnetResolver};
use lan_infer_scan::probe::PortProbe;
use lan_infer_scan::scheduler::ProbeScheduler;
use lan_infer_scan::{ScanConfig, ScanSession};

/// Resolver for a device with no network.
pub struct Offline;

impl SubnetResolver for Offline {
    fn resolve(&self) -> Option<String> {
        None
    }
}

/// Ports listed in `open` accept; everything else is closed. Every probe
/// first sleeps for `delay`, and `hang` makes closed ports never answer.
#[derive(Default)]
pub struct FakeProbe {
    pub open: HashSet<(String, u16)>,
    pub delay: Duration,
    pub hang: bool,
    pub in_flight: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
}

impl FakeProbe {
    pub fn with_open(endpoints: &[(&str, u16)]) -> Self {
        Self {
            open: endpoints.iter().map(|(h, p)| (h.to_string(), *p)).collect(),
            ..Self::default()
        }
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl PortProbe for FakeProbe {
    async fn is_open(&self, host: &str, port: u16, _timeout: Duration) -> bool {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(self.in_flight.clone());

        let open = self.open.contains(&(host.to_string(), port));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.hang && !open {
            std::future::pending::<()>().await;
        }
        open
    }
}

/// Canned HTTP bodies by URL; any other URL fails like a refused connection.
#[derive(Default)]
pub struct FakeHttp {
    pub bodies: HashMap<String, String>,
}

impl FakeHttp {
    pub fn with(mut self, url: &str, body: &str) -> Self {
        self.bodies.insert(url.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl HttpGet for FakeHttp {
    async fn get(&self, url: &str) -> Result<String> {
        self.bodies
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("connection refused: {url}"))
    }
}

pub fn fast_config() -> ScanConfig {
    ScanConfig::default().with_progress_interval(Duration::from_millis(5))
}

pub fn session(
    resolver: Arc<dyn SubnetResolver>,
    probe: FakeProbe,
    http: FakeHttp,
    config: &ScanConfig,
) -> ScanSession {
    let identifier = ServerIdentifier::new(Arc::new(http));
    let scheduler = ProbeScheduler::new(Arc::new(probe), identifier, config);
    ScanSession::new(resolver, scheduler, config)
}

pub fn lan(prefix: &str) -> Arc<dyn SubnetResolver> {
    Arc::new(StaticSubnet(prefix.to_string()))
}
