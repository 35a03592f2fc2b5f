//! Classifies an open port by asking it the introspection questions
//! inference servers answer without credentials.
//!
//! The cascade is ordered: Ollama's native `/api/tags` first, then the
//! OpenAI-compatible `/v1/models`. Ollama also serves `/v1/models`, so the
//! first match wins and an Ollama server is never reported as generic.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::types::{DiscoveredServer, ServerKind};

/// Minimal HTTP GET used by the identification cascade.
#[async_trait]
pub trait HttpGet: Send + Sync {
    /// Fetch `url` and return the body. Non-success statuses are errors.
    async fn get(&self, url: &str) -> Result<String>;
}

/// `reqwest`-backed [`HttpGet`] with per-request connect and total timeouts.
#[derive(Debug, Clone)]
pub struct ReqwestHttp {
    client: reqwest::Client,
}

impl ReqwestHttp {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpGet for ReqwestHttp {
    async fn get(&self, url: &str) -> Result<String> {
        let body = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

/// Model names from an Ollama `/api/tags` body, or `None` if the body is not
/// a JSON object with a `models` array.
pub fn parse_ollama_tags(body: &str) -> Option<Vec<String>> {
    let models = object_array(body, "models")?;
    Some(non_empty_strings(&models, "name"))
}

/// Model ids from an OpenAI-compatible `/v1/models` body, or `None` if the body
/// is not a JSON object with a `data` array.
pub fn parse_openai_models(body: &str) -> Option<Vec<String>> {
    let data = object_array(body, "data")?;
    Some(non_empty_strings(&data, "id"))
}

fn object_array(body: &str, key: &str) -> Option<Vec<Value>> {
    let mut root: Value = serde_json::from_str(body).ok()?;
    match root.as_object_mut()?.remove(key)? {
        Value::Array(entries) => Some(entries),
        _ => None,
    }
}

fn non_empty_strings(entries: &[Value], field: &str) -> Vec<String> {
    entries
        .iter()
        .filter_map(|entry| entry.get(field).and_then(Value::as_str))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Runs the identification cascade against one reachable endpoint.
#[derive(Clone)]
pub struct ServerIdentifier {
    http: Arc<dyn HttpGet>,
}

impl ServerIdentifier {
    pub fn new(http: Arc<dyn HttpGet>) -> Self {
        Self { http }
    }

    /// Identifier backed by a real HTTP client with the given per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Ok(Self::new(Arc::new(ReqwestHttp::new(timeout)?)))
    }

    pub async fn identify(&self, host: &str, port: u16) -> Option<DiscoveredServer> {
        if let Some(models) = self
            .probe(host, port, "/api/tags", parse_ollama_tags)
            .await
        {
            return Some(DiscoveredServer {
                address: host.to_string(),
                port,
                kind: ServerKind::Ollama,
                models,
            });
        }

        let models = self
            .probe(host, port, "/v1/models", parse_openai_models)
            .await?;
        Some(DiscoveredServer {
            address: host.to_string(),
            port,
            kind: ServerKind::OpenAiCompatible,
            models,
        })
    }

    async fn probe(
        &self,
        host: &str,
        port: u16,
        path: &str,
        parse: fn(&str) -> Option<Vec<String>>,
    ) -> Option<Vec<String>> {
        let url = format!("http://{host}:{port}{path}");
        let body = match self.http.get(&url).await {
            Ok(body) => body,
            Err(e) => {
                tracing::trace!("{url}: {e:#}");
                return None;
            }
        };
        let parsed = parse(&body);
        if parsed.is_none() {
            tracing::trace!("{url}: unrecognised response body");
        }
        parsed
    }
}
