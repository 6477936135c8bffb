use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinSet;

use crate::dispatch::{drain, reap_finished, UpdateDispatcher};
use crate::update::parse_update;

const TELEGRAM_SECRET_HEADER: &str = "x-telegram-bot-api-secret-token";

pub struct WebhookState {
    dispatcher: UpdateDispatcher,
    secret: Option<String>,
    tasks: Mutex<JoinSet<()>>,
}

impl WebhookState {
    pub fn new(dispatcher: UpdateDispatcher, secret: Option<String>) -> Self {
        Self {
            dispatcher,
            secret: secret
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Waits for every command accepted so far.
    pub async fn finish_in_flight(&self) {
        let mut tasks = self.tasks.lock().await;
        drain(&mut tasks).await;
    }
}

pub fn build_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/webhooks/telegram", post(handle_telegram_webhook))
        .route("/healthz", get(handle_health))
        .with_state(state)
}

/// Serves the webhook router on `listener` until `shutdown` resolves, then
/// waits for in-flight commands.
pub async fn serve_webhook<F>(
    listener: TcpListener,
    state: Arc<WebhookState>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener
        .local_addr()
        .context("failed to resolve webhook listener address")?;
    tracing::info!(%addr, "telegram webhook listening");
    axum::serve(listener, build_webhook_router(state.clone()))
        .with_graceful_shutdown(shutdown)
        .await
        .context("webhook server failed")?;
    tracing::info!("telegram webhook stopping; waiting for in-flight commands");
    state.finish_in_flight().await;
    Ok(())
}

pub async fn bind_webhook(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind webhook listener on {addr}"))
}

async fn handle_health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status":"ok"})))
}

async fn handle_telegram_webhook(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    if let Some(expected_secret) = state.secret.as_deref() {
        let observed = headers
            .get(TELEGRAM_SECRET_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .unwrap_or("");
        if observed != expected_secret {
            tracing::warn!("telegram webhook secret mismatch");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": {"code": "auth_failed", "message": "invalid telegram webhook secret"}
                })),
            );
        }
    }

    let raw = match serde_json::from_str::<Value>(&body) {
        Ok(raw) => raw,
        Err(error) => {
            tracing::debug!(error = %error, "telegram webhook payload is not json");
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": {"code": "parse_failed", "message": "payload is not valid json"}
                })),
            );
        }
    };

    match parse_update(&raw) {
        Some(update) => {
            let mut tasks = state.tasks.lock().await;
            reap_finished(&mut tasks);
            state.dispatcher.spawn(&mut tasks, update);
            (StatusCode::OK, Json(json!({"status":"accepted"})))
        }
        None => (StatusCode::OK, Json(json!({"status":"ignored"}))),
    }
}
