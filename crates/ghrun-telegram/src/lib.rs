//! Telegram transport for the workflow runner bot: Bot API client, long-poll
//! receiver and webhook server. Both receivers feed the same command handler.

pub mod dispatch;
pub mod polling;
pub mod telegram_api;
pub mod update;
pub mod webhook;

pub use dispatch::{handle_and_reply, UpdateDispatcher};
pub use polling::{PollCycleSummary, PollingConfig, TelegramPoller};
pub use telegram_api::{
    ChatTransport, TelegramApiClient, TelegramApiConfig, TransportError,
    DEFAULT_TELEGRAM_API_BASE,
};
pub use update::{next_offset, parse_update};
pub use webhook::{bind_webhook, build_webhook_router, serve_webhook, WebhookState};
