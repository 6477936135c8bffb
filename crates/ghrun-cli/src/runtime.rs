use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use ghrun_commands::CommandHandler;
use ghrun_credentials::{
    CloudflareKvTokenStore, CredentialCipher, DeploymentKey, FileTokenStore, InMemoryTokenStore,
    TokenStore,
};
use ghrun_github::{GithubWorkflowClient, GithubWorkflowClientConfig};
use ghrun_telegram::{
    bind_webhook, serve_webhook, PollingConfig, TelegramApiClient, TelegramApiConfig,
    TelegramPoller, UpdateDispatcher, WebhookState,
};

use crate::settings::{BotSettings, TokenStoreSettings, TransportSettings};

pub fn build_token_store(settings: &BotSettings) -> Result<Arc<dyn TokenStore>> {
    let store: Arc<dyn TokenStore> = match &settings.token_store {
        TokenStoreSettings::File { path } => Arc::new(FileTokenStore::new(path.clone())),
        TokenStoreSettings::CloudflareKv(kv) => Arc::new(
            CloudflareKvTokenStore::new(kv.to_store_config(settings.http_timeout_ms))
                .context("failed to configure cloudflare kv token store")?,
        ),
        TokenStoreSettings::Memory => {
            tracing::warn!("memory token store selected; stored tokens are lost on restart");
            Arc::new(InMemoryTokenStore::new())
        }
    };
    Ok(store)
}

/// Derives the deployment key and wires store, cipher and workflow client
/// into one handler.
pub fn build_command_handler(settings: &BotSettings) -> Result<CommandHandler> {
    let key = DeploymentKey::derive(&settings.bot_secret);
    tracing::info!(
        key_fingerprint = %key.fingerprint(),
        key_source = key.source().as_str(),
        "deployment key ready"
    );
    if !key.source().is_full_strength() {
        tracing::warn!(
            key_source = key.source().as_str(),
            "bot secret is not 32 bytes (raw or base64); it was padded or truncated into a key"
        );
    }
    let cipher = Arc::new(CredentialCipher::new(key));
    let store = build_token_store(settings)?;
    tracing::info!(store = store.backend(), "token store ready");

    let mut github = GithubWorkflowClientConfig::new(settings.target.clone());
    github.api_base = settings.github_api_base.clone();
    github.request_timeout_ms = settings.http_timeout_ms;
    let workflows =
        Arc::new(GithubWorkflowClient::new(github).context("failed to build github client")?);

    Ok(
        CommandHandler::new(settings.allow_list.clone(), cipher, store, workflows)
            .with_global_token(settings.global_github_token.clone())
            .with_default_ref(settings.default_ref.clone()),
    )
}

/// Runs the configured transport until `shutdown` resolves.
pub async fn run_bot<F>(settings: BotSettings, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let handler = Arc::new(build_command_handler(&settings)?);
    let telegram = Arc::new(
        TelegramApiClient::new(TelegramApiConfig {
            api_base: settings.telegram_api_base.clone(),
            bot_token: settings.telegram_token.clone(),
            request_timeout_ms: settings.http_timeout_ms,
        })
        .context("failed to build telegram client")?,
    );
    let dispatcher = UpdateDispatcher::new(handler.clone(), telegram.clone());
    tracing::info!(
        workflow = %settings.target.slug(),
        allow_list_len = settings.allow_list.len(),
        has_global_token = settings.global_github_token.is_some(),
        "ghrun starting"
    );

    match settings.transport {
        TransportSettings::Polling {
            poll_timeout_seconds,
        } => {
            let poller = TelegramPoller::new(
                telegram,
                dispatcher,
                PollingConfig {
                    poll_timeout_seconds,
                    ..PollingConfig::default()
                },
            );
            poller.run(shutdown).await
        }
        TransportSettings::Webhook { bind, secret } => {
            if secret.is_none() {
                tracing::warn!("webhook secret not configured; accepting unauthenticated updates");
            }
            let listener = bind_webhook(bind).await?;
            let state = Arc::new(WebhookState::new(dispatcher, secret));
            serve_webhook(listener, state, shutdown).await
        }
    }
}

/// Resolves on ctrl-c. A failure to install the handler is logged and the
/// future never resolves.
pub async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("shutdown requested"),
        Err(error) => {
            tracing::error!(error = %error, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    }
}
