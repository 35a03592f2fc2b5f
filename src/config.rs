use std::time::Duration;

use crate::types::TARGET_PORTS;

/// Default number of probes allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 64;
/// Default TCP connect timeout per probe.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(400);
/// Default timeout for each identification HTTP request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_millis(3000);
/// Default interval between progress updates.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

/// Tunables for one discovery scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    pub ports: Vec<u16>,
    pub concurrency: usize,
    pub connect_timeout: Duration,
    pub http_timeout: Duration,
    pub progress_interval: Duration,
    /// Hard ceiling on the whole scan. `None` lets it run until every probe returns.
    pub deadline: Option<Duration>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ports: TARGET_PORTS.iter().map(|(port, _)| *port).collect(),
            concurrency: DEFAULT_CONCURRENCY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            deadline: None,
        }
    }
}

impl ScanConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        // tokio intervals panic on a zero period
        self.progress_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}
