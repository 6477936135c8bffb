use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const TELEGRAM_MESSAGE_MAX_CHARS: usize = 4096;
const ERROR_DETAIL_MAX_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
/// Failures talking to the chat provider.
pub enum TransportError {
    #[error("telegram {operation} transport error: {message}")]
    Network {
        operation: &'static str,
        message: String,
    },
    #[error("telegram {operation} failed with status {status}: {message}")]
    Rejected {
        operation: &'static str,
        status: u16,
        message: String,
    },
    #[error("telegram {operation} response parse error: {message}")]
    Parse {
        operation: &'static str,
        message: String,
    },
    #[error("failed to build telegram client: {0}")]
    Client(String),
}

/// Outbound half of a chat transport.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_reply(&self, chat_id: &str, text: &str) -> Result<(), TransportError>;
}

#[derive(Debug, Clone)]
pub struct TelegramApiConfig {
    pub api_base: String,
    pub bot_token: String,
    pub request_timeout_ms: u64,
}

impl TelegramApiConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
            bot_token: bot_token.into(),
            request_timeout_ms: 15_000,
        }
    }
}

#[derive(Clone)]
pub struct TelegramApiClient {
    http: reqwest::Client,
    bot_base: String,
    request_timeout: Duration,
}

impl std::fmt::Debug for TelegramApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramApiClient")
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl TelegramApiClient {
    pub fn new(config: TelegramApiConfig) -> Result<Self, TransportError> {
        let base = config.api_base.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(TransportError::Client(
                "telegram api base cannot be empty".to_string(),
            ));
        }
        let token = config.bot_token.trim();
        if token.is_empty() {
            return Err(TransportError::Client(
                "telegram bot token cannot be empty".to_string(),
            ));
        }
        let http = reqwest::Client::builder()
            .user_agent("ghrun-workflow-bot")
            .build()
            .map_err(|error| TransportError::Client(error.to_string()))?;
        Ok(Self {
            http,
            bot_base: format!("{base}/bot{token}"),
            request_timeout: Duration::from_millis(config.request_timeout_ms.max(1)),
        })
    }

    /// Long-polls for updates after `offset`. The request deadline is the
    /// poll window plus the regular request timeout.
    pub async fn get_updates(
        &self,
        offset: Option<u64>,
        timeout_seconds: u64,
    ) -> Result<Vec<Value>, TransportError> {
        let mut query = vec![("timeout", timeout_seconds.to_string())];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }
        let request = self
            .http
            .get(format!("{}/getUpdates", self.bot_base))
            .query(&query)
            .timeout(self.request_timeout + Duration::from_secs(timeout_seconds));
        let payload = self.call("getUpdates", request).await?;
        match payload.get("result") {
            Some(Value::Array(updates)) => Ok(updates.clone()),
            _ => Err(TransportError::Parse {
                operation: "getUpdates",
                message: "response missing result[]".to_string(),
            }),
        }
    }

    pub async fn send_message(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
        let request = self
            .http
            .post(format!("{}/sendMessage", self.bot_base))
            .timeout(self.request_timeout)
            .json(&json!({
                "chat_id": chat_id.trim(),
                "text": truncate_message(text),
                "disable_web_page_preview": true
            }));
        self.call("sendMessage", request).await.map(|_| ())
    }

    async fn call(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, TransportError> {
        // The token is part of the URL; reqwest errors would echo it.
        let response = request.send().await.map_err(|error| TransportError::Network {
            operation,
            message: describe_reqwest_error(error),
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|error| TransportError::Network {
            operation,
            message: describe_reqwest_error(error),
        })?;
        let parsed = serde_json::from_str::<Value>(&body);
        if !status.is_success() {
            let message = parsed
                .ok()
                .as_ref()
                .and_then(|value| value.get("description"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| truncate_detail(&body));
            return Err(TransportError::Rejected {
                operation,
                status: status.as_u16(),
                message,
            });
        }
        let parsed = parsed.map_err(|error| TransportError::Parse {
            operation,
            message: error.to_string(),
        })?;
        if parsed.get("ok").and_then(Value::as_bool) == Some(false) {
            return Err(TransportError::Rejected {
                operation,
                status: status.as_u16(),
                message: parsed
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("ok=false")
                    .to_string(),
            });
        }
        Ok(parsed)
    }
}

#[async_trait]
impl ChatTransport for TelegramApiClient {
    async fn send_reply(&self, chat_id: &str, text: &str) -> Result<(), TransportError> {
        self.send_message(chat_id, text).await
    }
}

fn describe_reqwest_error(error: reqwest::Error) -> String {
    if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        "connection failed".to_string()
    } else {
        error.without_url().to_string()
    }
}

fn truncate_message(text: &str) -> &str {
    match text.char_indices().nth(TELEGRAM_MESSAGE_MAX_CHARS) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

fn truncate_detail(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.char_indices().nth(ERROR_DETAIL_MAX_CHARS) {
        Some((index, _)) => format!("{}...", &trimmed[..index]),
        None => trimmed.to_string(),
    }
}
