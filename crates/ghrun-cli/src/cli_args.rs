use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use crate::cli_types::{CliTokenStoreBackend, CliTransportMode};

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "ghrun",
    about = "Telegram bot that starts and inspects a GitHub Actions workflow",
    version
)]
pub struct Cli {
    #[arg(
        long = "telegram-token",
        env = "TELEGRAM_TOKEN",
        hide_env_values = true,
        help = "Telegram Bot API token"
    )]
    pub telegram_token: Option<String>,

    #[arg(
        long = "bot-secret",
        env = "BOT_SECRET",
        hide_env_values = true,
        help = "Secret the token encryption key is derived from (base64 of 32 bytes recommended)"
    )]
    pub bot_secret: Option<String>,

    #[arg(
        long = "github-token",
        env = "GITHUB_TOKEN",
        hide_env_values = true,
        help = "Optional shared GitHub token used when a user has none stored"
    )]
    pub github_token: Option<String>,

    #[arg(
        long = "allowed-users",
        env = "ALLOWED_USERS",
        default_value = "",
        help = "Comma-separated Telegram user ids allowed to use the bot. Empty allows everyone."
    )]
    pub allowed_users: String,

    #[arg(long = "repo-owner", env = "REPO_OWNER", help = "Repository owner")]
    pub repo_owner: Option<String>,

    #[arg(long = "repo-name", env = "REPO_NAME", help = "Repository name")]
    pub repo_name: Option<String>,

    #[arg(
        long = "workflow-id",
        env = "WORKFLOW_ID",
        help = "Workflow file name or numeric id"
    )]
    pub workflow_id: Option<String>,

    #[arg(
        long = "default-ref",
        env = "GHRUN_DEFAULT_REF",
        default_value = "main",
        help = "Git ref dispatched when /run names none"
    )]
    pub default_ref: String,

    #[arg(
        long = "token-store",
        env = "GHRUN_TOKEN_STORE",
        value_enum,
        default_value = "file",
        help = "Backend for encrypted per-user tokens"
    )]
    pub token_store: CliTokenStoreBackend,

    #[arg(
        long = "tokens-file",
        env = "TOKENS_FILE",
        default_value = "tokens.json",
        help = "Token file used by the file backend"
    )]
    pub tokens_file: PathBuf,

    #[arg(
        long = "kv-account-id",
        env = "CF_ACCOUNT_ID",
        help = "Cloudflare account id for the cloudflare-kv backend"
    )]
    pub kv_account_id: Option<String>,

    #[arg(
        long = "kv-namespace-id",
        env = "CF_KV_NAMESPACE_ID",
        help = "Workers KV namespace id for the cloudflare-kv backend"
    )]
    pub kv_namespace_id: Option<String>,

    #[arg(
        long = "kv-api-token",
        env = "CF_API_TOKEN",
        hide_env_values = true,
        help = "Cloudflare API token with KV read/write access"
    )]
    pub kv_api_token: Option<String>,

    #[arg(
        long = "kv-api-base",
        env = "CF_API_BASE",
        default_value = "https://api.cloudflare.com/client/v4",
        help = "Cloudflare API base URL"
    )]
    pub kv_api_base: String,

    #[arg(
        long = "transport",
        env = "GHRUN_TRANSPORT",
        value_enum,
        default_value = "polling",
        help = "How updates are received from Telegram"
    )]
    pub transport: CliTransportMode,

    #[arg(
        long = "webhook-bind",
        env = "GHRUN_WEBHOOK_BIND",
        default_value = "0.0.0.0:8080",
        help = "Listen address for the webhook transport"
    )]
    pub webhook_bind: SocketAddr,

    #[arg(
        long = "webhook-secret",
        env = "TELEGRAM_WEBHOOK_SECRET",
        hide_env_values = true,
        help = "Expected X-Telegram-Bot-Api-Secret-Token header on webhook requests"
    )]
    pub webhook_secret: Option<String>,

    #[arg(
        long = "telegram-api-base",
        env = "TELEGRAM_API_BASE",
        default_value = "https://api.telegram.org",
        help = "Telegram Bot API base URL"
    )]
    pub telegram_api_base: String,

    #[arg(
        long = "github-api-base",
        env = "GITHUB_API_BASE",
        default_value = "https://api.github.com",
        help = "GitHub REST API base URL"
    )]
    pub github_api_base: String,

    #[arg(
        long = "http-timeout-ms",
        env = "GHRUN_HTTP_TIMEOUT_MS",
        default_value_t = 15_000,
        value_parser = parse_positive_u64,
        help = "Timeout for every outbound HTTP request"
    )]
    pub http_timeout_ms: u64,

    #[arg(
        long = "poll-timeout-seconds",
        env = "GHRUN_POLL_TIMEOUT_SECONDS",
        default_value_t = 30,
        help = "Long-poll window passed to getUpdates"
    )]
    pub poll_timeout_seconds: u64,
}
