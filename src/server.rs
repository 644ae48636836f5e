//! HTTP surface: liveness probe and the LINE webhook endpoint.

use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::tracker::{Dispatcher, event, signature};

pub const SIGNATURE_HEADER: &str = "x-line-signature";

/// Shared state for handlers.
#[derive(Clone)]
pub struct AppState {
    channel_secret: Arc<str>,
    dispatcher: Arc<Dispatcher>,
}

impl AppState {
    pub fn new(channel_secret: &str, dispatcher: Arc<Dispatcher>) -> Self {
        Self { channel_secret: Arc::from(channel_secret), dispatcher }
    }
}

async fn home() -> &'static str {
    "LINE Bot is running."
}

/// Verify, parse, then handle every event. Only a bad signature or body is
/// reported to the caller; per-event failures are logged and still return OK.
async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<&'static str, (StatusCode, &'static str)> {
    let Some(signature) = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()) else {
        warn!("Callback without {} header", SIGNATURE_HEADER);
        return Err((StatusCode::BAD_REQUEST, "missing signature"));
    };

    if let Err(e) = signature::verify(&state.channel_secret, &body, signature) {
        warn!("Rejected callback: {}", e);
        return Err((StatusCode::BAD_REQUEST, "invalid signature"));
    }

    let webhook = match event::parse(&body) {
        Ok(webhook) => webhook,
        Err(e) => {
            warn!("Rejected callback with unparseable body: {}", e);
            return Err((StatusCode::BAD_REQUEST, "invalid body"));
        }
    };

    debug!("Callback for {:?}", webhook.destination);
    state.dispatcher.dispatch(webhook.events).await;
    Ok("OK")
}

/// Build the axum router with shared state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(home))
        .route("/callback", post(callback))
        .layer(axum::extract::DefaultBodyLimit::max(1024 * 1024)) // 1 MB max request body
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(port: u16, state: AppState) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind to {addr}: {e}");
            return Err(e);
        }
    };

    info!("Listening on {addr}");
    axum::serve(listener, build_router(state)).await
}
