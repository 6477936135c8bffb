use std::net::SocketAddr;
use std::path::PathBuf;

use ghrun_access::AllowList;
use ghrun_credentials::CloudflareKvConfig;
use ghrun_github::WorkflowTarget;

use crate::cli_args::Cli;
use crate::cli_types::{CliTokenStoreBackend, CliTransportMode};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
/// Startup configuration problems. All of them are fatal.
pub enum ConfigError {
    #[error("missing required setting {flag} (env {env})")]
    Missing {
        flag: &'static str,
        env: &'static str,
    },
    #[error("{flag} must not be blank")]
    Blank { flag: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStoreSettings {
    File { path: PathBuf },
    CloudflareKv(KvSettings),
    Memory,
}

#[derive(Clone, PartialEq, Eq)]
pub struct KvSettings {
    pub api_base: String,
    pub account_id: String,
    pub namespace_id: String,
    pub api_token: String,
}

impl std::fmt::Debug for KvSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvSettings")
            .field("api_base", &self.api_base)
            .field("account_id", &self.account_id)
            .field("namespace_id", &self.namespace_id)
            .field("api_token", &"[REDACTED]")
            .finish()
    }
}

impl KvSettings {
    pub fn to_store_config(&self, request_timeout_ms: u64) -> CloudflareKvConfig {
        CloudflareKvConfig {
            api_base: self.api_base.clone(),
            account_id: self.account_id.clone(),
            namespace_id: self.namespace_id.clone(),
            api_token: self.api_token.clone(),
            request_timeout_ms,
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum TransportSettings {
    Polling { poll_timeout_seconds: u64 },
    Webhook {
        bind: SocketAddr,
        secret: Option<String>,
    },
}

impl std::fmt::Debug for TransportSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Polling {
                poll_timeout_seconds,
            } => f
                .debug_struct("Polling")
                .field("poll_timeout_seconds", poll_timeout_seconds)
                .finish(),
            Self::Webhook { bind, secret } => f
                .debug_struct("Webhook")
                .field("bind", bind)
                .field("has_secret", &secret.is_some())
                .finish(),
        }
    }
}

/// Validated, immutable process configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct BotSettings {
    pub telegram_token: String,
    pub bot_secret: String,
    pub global_github_token: Option<String>,
    pub allow_list: AllowList,
    pub target: WorkflowTarget,
    pub default_ref: String,
    pub token_store: TokenStoreSettings,
    pub transport: TransportSettings,
    pub telegram_api_base: String,
    pub github_api_base: String,
    pub http_timeout_ms: u64,
}

impl std::fmt::Debug for BotSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotSettings")
            .field("telegram_token", &"[REDACTED]")
            .field("bot_secret", &"[REDACTED]")
            .field("has_global_github_token", &self.global_github_token.is_some())
            .field("allow_list", &self.allow_list)
            .field("target", &self.target)
            .field("default_ref", &self.default_ref)
            .field("token_store", &self.token_store)
            .field("transport", &self.transport)
            .field("telegram_api_base", &self.telegram_api_base)
            .field("github_api_base", &self.github_api_base)
            .field("http_timeout_ms", &self.http_timeout_ms)
            .finish()
    }
}

impl BotSettings {
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let telegram_token = required(&cli.telegram_token, "--telegram-token", "TELEGRAM_TOKEN")?;
        let bot_secret = required_verbatim(&cli.bot_secret, "--bot-secret", "BOT_SECRET")?;
        let target = WorkflowTarget {
            owner: required(&cli.repo_owner, "--repo-owner", "REPO_OWNER")?,
            repo: required(&cli.repo_name, "--repo-name", "REPO_NAME")?,
            workflow: required(&cli.workflow_id, "--workflow-id", "WORKFLOW_ID")?,
        };

        let token_store = match cli.token_store {
            CliTokenStoreBackend::File => {
                if cli.tokens_file.as_os_str().is_empty() {
                    return Err(ConfigError::Blank {
                        flag: "--tokens-file",
                    });
                }
                TokenStoreSettings::File {
                    path: cli.tokens_file.clone(),
                }
            }
            CliTokenStoreBackend::CloudflareKv => TokenStoreSettings::CloudflareKv(KvSettings {
                api_base: non_blank(&cli.kv_api_base, "--kv-api-base")?,
                account_id: required(&cli.kv_account_id, "--kv-account-id", "CF_ACCOUNT_ID")?,
                namespace_id: required(
                    &cli.kv_namespace_id,
                    "--kv-namespace-id",
                    "CF_KV_NAMESPACE_ID",
                )?,
                api_token: required(&cli.kv_api_token, "--kv-api-token", "CF_API_TOKEN")?,
            }),
            CliTokenStoreBackend::Memory => TokenStoreSettings::Memory,
        };

        let transport = match cli.transport {
            CliTransportMode::Polling => TransportSettings::Polling {
                poll_timeout_seconds: cli.poll_timeout_seconds,
            },
            CliTransportMode::Webhook => TransportSettings::Webhook {
                bind: cli.webhook_bind,
                secret: optional(&cli.webhook_secret),
            },
        };

        Ok(Self {
            telegram_token,
            bot_secret,
            global_github_token: optional(&cli.github_token),
            allow_list: AllowList::parse(&cli.allowed_users),
            target,
            default_ref: non_blank(&cli.default_ref, "--default-ref")?,
            token_store,
            transport,
            telegram_api_base: non_blank(&cli.telegram_api_base, "--telegram-api-base")?,
            github_api_base: non_blank(&cli.github_api_base, "--github-api-base")?,
            http_timeout_ms: cli.http_timeout_ms,
        })
    }
}

fn required(
    value: &Option<String>,
    flag: &'static str,
    env: &'static str,
) -> Result<String, ConfigError> {
    match value.as_deref().map(str::trim) {
        None => Err(ConfigError::Missing { flag, env }),
        Some("") => Err(ConfigError::Blank { flag }),
        Some(value) => Ok(value.to_string()),
    }
}

/// Like `required`, but keeps surrounding whitespace. Key material must reach
/// the deriver byte for byte.
fn required_verbatim(
    value: &Option<String>,
    flag: &'static str,
    env: &'static str,
) -> Result<String, ConfigError> {
    required(value, flag, env)?;
    Ok(value.clone().unwrap_or_default())
}

fn optional(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn non_blank(value: &str, flag: &'static str) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Blank { flag });
    }
    Ok(trimmed.to_string())
}
