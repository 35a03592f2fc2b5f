use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time;

/// TCP reachability check for a single endpoint.
#[async_trait]
pub trait PortProbe: Send + Sync {
    /// True iff a TCP connection to `host:port` completes within `timeout`.
    async fn is_open(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// Plain TCP connect probe.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl PortProbe for TcpProbe {
    async fn is_open(&self, host: &str, port: u16, timeout: Duration) -> bool {
        match time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => true,
            Ok(Err(e)) => {
                tracing::trace!("{host}:{port} closed: {e}");
                false
            }
            Err(_) => false,
        }
    }
}
