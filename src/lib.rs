//! Library crate for lan-infer-scan: finds Ollama and OpenAI-compatible
//! inference servers on the local IPv4 /24 network.
pub mod config;
pub mod identify;
pub mod netdetect;
pub mod probe;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod types;

pub use config::ScanConfig;
pub use session::ScanSession;
pub use types::{DiscoveredServer, ScanState, ServerKind};
