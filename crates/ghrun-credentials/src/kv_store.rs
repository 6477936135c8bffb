use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};

use crate::cipher::EncryptedCredential;
use crate::token_store::{normalize_user_id, StoreError, TokenStore};

pub const DEFAULT_CLOUDFLARE_API_BASE: &str = "https://api.cloudflare.com/client/v4";

#[derive(Debug, Clone)]
/// Connection settings for a Workers KV namespace.
pub struct CloudflareKvConfig {
    pub api_base: String,
    pub account_id: String,
    pub namespace_id: String,
    pub api_token: String,
    pub request_timeout_ms: u64,
}

/// Token store backed by a Cloudflare Workers KV namespace, one key per user.
#[derive(Debug, Clone)]
pub struct CloudflareKvTokenStore {
    http: reqwest::Client,
    values_base: Url,
}

impl CloudflareKvTokenStore {
    pub fn new(config: CloudflareKvConfig) -> Result<Self, StoreError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("ghrun-token-store"),
        );
        let auth_header = format!("Bearer {}", config.api_token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .map_err(|_| remote_error(None, "invalid cloudflare api token header"))?,
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()
            .map_err(|error| remote_error(None, format!("failed to build http client: {error}")))?;

        let mut values_base = Url::parse(config.api_base.trim().trim_end_matches('/'))
            .map_err(|error| remote_error(None, format!("invalid cloudflare api base: {error}")))?;
        values_base
            .path_segments_mut()
            .map_err(|_| remote_error(None, "cloudflare api base cannot carry a path"))?
            .pop_if_empty()
            .extend([
                "accounts",
                config.account_id.trim(),
                "storage",
                "kv",
                "namespaces",
                config.namespace_id.trim(),
                "values",
            ]);
        Ok(Self { http, values_base })
    }

    fn value_url(&self, user_id: &str) -> Result<Url, StoreError> {
        let mut url = self.values_base.clone();
        url.path_segments_mut()
            .map_err(|_| remote_error(None, "cloudflare api base cannot carry a path"))?
            .push(user_id);
        Ok(url)
    }
}

fn remote_error(status: Option<u16>, message: impl Into<String>) -> StoreError {
    StoreError::Remote {
        status,
        message: message.into(),
    }
}

async fn failure_from_response(operation: &str, response: reqwest::Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(200).collect();
    remote_error(Some(status), format!("{operation} rejected: {body}"))
}

#[async_trait]
impl TokenStore for CloudflareKvTokenStore {
    fn backend(&self) -> &'static str {
        "cloudflare_kv"
    }

    async fn get(&self, user_id: &str) -> Result<Option<EncryptedCredential>, StoreError> {
        let url = self.value_url(normalize_user_id(user_id)?)?;
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|error| remote_error(None, format!("kv read failed: {error}")))?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(failure_from_response("kv read", response).await);
        }
        let value = response
            .text()
            .await
            .map_err(|error| remote_error(None, format!("kv read body failed: {error}")))?;
        if value.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(EncryptedCredential::from_stored(value)))
    }

    async fn put(&self, user_id: &str, credential: EncryptedCredential) -> Result<(), StoreError> {
        let url = self.value_url(normalize_user_id(user_id)?)?;
        let response = self
            .http
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, "text/plain")
            .body(credential.into_inner())
            .send()
            .await
            .map_err(|error| remote_error(None, format!("kv write failed: {error}")))?;
        if !response.status().is_success() {
            return Err(failure_from_response("kv write", response).await);
        }
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        let url = self.value_url(normalize_user_id(user_id)?)?;
        let response = self
            .http
            .delete(url)
            .send()
            .await
            .map_err(|error| remote_error(None, format!("kv delete failed: {error}")))?;
        if response.status() == StatusCode::NOT_FOUND || response.status().is_success() {
            return Ok(());
        }
        Err(failure_from_response("kv delete", response).await)
    }
}
