use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Router,
};
use tracing::{info, warn};

use crate::platform::line::webhook::{parse_events, raw_events, verify_signature, SIGNATURE_HEADER};
use crate::responder::Responder;

/// Shared application state
pub struct AppState {
    channel_secret: String,
    responder: Responder,
}

impl AppState {
    pub fn new(channel_secret: String, responder: Responder) -> Self {
        Self {
            channel_secret,
            responder,
        }
    }
}

pub fn router(state: Arc<AppState>, path: &str) -> Router {
    Router::new()
        .route(path, post(handle_callback))
        .with_state(state)
}

/// Serve the webhook until the process is stopped.
pub async fn run(state: Arc<AppState>, bind: &str, path: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind to {bind}"))?;

    info!("Webhook listening on http://{}{}", bind, path);

    axum::serve(listener, router(state, path))
        .await
        .context("Server error")?;

    Ok(())
}

async fn handle_callback(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !verify_signature(&state.channel_secret, &body, signature) {
        warn!("Rejected webhook request: invalid signature");
        return (StatusCode::UNAUTHORIZED, "Invalid signature");
    }

    let events = match parse_events(&body) {
        Ok(events) => events,
        Err(e) => {
            warn!("Rejected webhook request: {:#}", e);
            return (StatusCode::BAD_REQUEST, "Bad request");
        }
    };
    let raw = raw_events(&body);

    let outcome = state.responder.handle_events(&events, &raw).await;
    info!(
        "Webhook batch done: {} event(s), replied={}, skipped={}, failed={}",
        events.len(),
        outcome.replied,
        outcome.skipped,
        outcome.failed_dispatches
    );

    if outcome.failed_dispatches > 0 {
        return (StatusCode::INTERNAL_SERVER_ERROR, "Reply failed");
    }
    (StatusCode::OK, "OK")
}
