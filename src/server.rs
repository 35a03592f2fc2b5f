use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::{
    session::ScanSession,
    types::{DiscoveredServer, ScanState},
};

#[derive(Clone)]
pub struct AppState {
    template: ScanSession,
    inner: Arc<RwLock<ServerState>>, // latest scan state, shared with the scan task
}

#[derive(Debug, Default)]
struct ServerState {
    latest: Option<ScanState>,
    servers: Option<Vec<DiscoveredServer>>,
    cancel: Option<CancellationToken>,
}

/// Body of `GET /api/status`: `{"state":"idle"}` before the first scan, else the latest scan state.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Status {
    Idle { state: &'static str },
    Scan(ScanState),
}

impl Status {
    fn from_latest(latest: Option<&ScanState>) -> Self {
        match latest {
            Some(state) => Status::Scan(state.clone()),
            None => Status::Idle { state: "idle" },
        }
    }
}

impl AppState {
    /// Every `POST /api/scan` runs a fresh clone of `template`.
    pub fn new(template: ScanSession) -> Self {
        Self {
            template,
            inner: Arc::new(RwLock::new(ServerState::default())),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/status", get(get_status))
        .route("/scan", axum::routing::post(post_scan).delete(delete_scan))
        .route("/servers", get(get_servers))
        .with_state(state);

    Router::new()
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
}

pub async fn spawn_server(bind: &str, template: ScanSession) -> Result<()> {
    let app = router(AppState::new(template));
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!("serving discovery API on http://{bind}/api");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn get_status(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    (StatusCode::OK, Json(Status::from_latest(s.latest.as_ref())))
}

/// Servers from the most recent completed scan. Starting a new scan clears them.
async fn get_servers(State(app): State<AppState>) -> impl IntoResponse {
    let s = app.inner.read().await;
    if let Some(servers) = s.servers.as_ref() {
        (StatusCode::OK, Json(servers.clone())).into_response()
    } else {
        StatusCode::NO_CONTENT.into_response()
    }
}

async fn delete_scan(State(app): State<AppState>) -> impl IntoResponse {
    let mut s = app.inner.write().await;
    match s.cancel.take() {
        Some(c) => {
            c.cancel();
            s.latest = None;
            StatusCode::NO_CONTENT
        }
        None => StatusCode::NOT_FOUND,
    }
}

async fn post_scan(State(app): State<AppState>) -> impl IntoResponse {
    let cancel = CancellationToken::new();
    let initial = ScanState::Scanning { progress: 0.0 };

    {
        let mut s = app.inner.write().await;
        // Cancel any existing scan
        if let Some(c) = s.cancel.take() {
            c.cancel();
        }
        s.latest = Some(initial.clone());
        s.servers = None;
        s.cancel = Some(cancel.clone());
    }

    let session = app.template.clone().with_cancel(cancel.clone());
    let inner = app.inner.clone();
    tokio::spawn(async move {
        let states = session.scan();
        futures::pin_mut!(states);
        while let Some(state) = states.next().await {
            let mut s = inner.write().await;
            // A newer scan has replaced this one.
            if cancel.is_cancelled() {
                break;
            }
            if let ScanState::Completed { servers } = &state {
                s.servers = Some(servers.clone());
            }
            if state.is_terminal() {
                s.cancel = None;
            }
            s.latest = Some(state);
        }
    });

    (StatusCode::ACCEPTED, Json(Status::Scan(initial)))
}
