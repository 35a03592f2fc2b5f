use serde::{Deserialize, Serialize};

/// Well-known inference server ports, paired with the runtime that listens there by default.
pub const TARGET_PORTS: [(u16, &str); 4] = [
    (11434, "ollama"),
    (1234, "lmstudio"),
    (8000, "vllm"),
    (8080, "localai"),
];

/// One candidate endpoint: a subnet host and a target port.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProbeTarget {
    pub ip: String,
    pub port: u16,
}

impl ProbeTarget {
    pub fn new(ip: impl Into<String>, port: u16) -> Self {
        Self { ip: ip.into(), port }
    }
}

/// Which introspection schema an open port answered to.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ServerKind {
    Ollama,
    OpenAiCompatible,
}

impl ServerKind {
    pub fn label(self) -> &'static str {
        match self {
            ServerKind::Ollama => "ollama",
            ServerKind::OpenAiCompatible => "openai-compatible",
        }
    }
}

/// A reachable, identified inference server.
///
/// `models` keeps the order the server reported them in, duplicates included.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredServer {
    pub address: String,
    pub port: u16,
    pub kind: ServerKind,
    pub models: Vec<String>,
}

impl DiscoveredServer {
    /// OpenAI-compatible base URL for this server. Ollama exposes the same API under `/v1`.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}/v1", self.address, self.port)
    }

    /// Best guess at the runtime behind this endpoint, from its port and kind.
    pub fn runtime(&self) -> &'static str {
        if self.kind == ServerKind::Ollama {
            return "ollama";
        }
        TARGET_PORTS
            .iter()
            // 11434 without the Ollama API is someone else.
            .find(|(port, name)| *port == self.port && *name != "ollama")
            .map(|(_, name)| *name)
            .unwrap_or("custom")
    }
}

/// Observable state of one scan. A scan emits zero or more `Scanning` states
/// followed by exactly one of `Completed` or `Error`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScanState {
    Scanning { progress: f64 },
    Completed { servers: Vec<DiscoveredServer> },
    Error { message: String },
}

impl ScanState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScanState::Scanning { .. })
    }
}
