use ghrun_commands::InboundUpdate;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    #[serde(default)]
    update_id: u64,
    #[serde(default)]
    message: Option<TelegramMessage>,
    #[serde(default)]
    edited_message: Option<TelegramMessage>,
    #[serde(default)]
    callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    chat: TelegramChat,
    #[serde(default)]
    from: Option<TelegramUser>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramCallbackQuery {
    from: TelegramUser,
    #[serde(default)]
    message: Option<TelegramMessage>,
    #[serde(default)]
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
}

/// Offset that acknowledges `update`, i.e. its `update_id + 1`.
pub fn next_offset(update: &Value) -> Option<u64> {
    update
        .get("update_id")
        .and_then(Value::as_u64)
        .map(|id| id.saturating_add(1))
}

/// Extracts the sender, chat and text from a raw Bot API update.
///
/// Returns `None` for update kinds the bot does not act on (joins, stickers,
/// channel posts, messages without a sender).
pub fn parse_update(raw: &Value) -> Option<InboundUpdate> {
    let update = TelegramUpdate::deserialize(raw).ok()?;
    if let Some(message) = update.message.or(update.edited_message) {
        let sender = message.from?;
        let text = message.text.filter(|text| !text.trim().is_empty())?;
        return Some(InboundUpdate {
            sender_id: sender.id.to_string(),
            chat_id: message.chat.id.to_string(),
            text,
        });
    }
    if let Some(query) = update.callback_query {
        let chat_id = query
            .message
            .map(|message| message.chat.id)
            .unwrap_or(query.from.id);
        let text = query.data.filter(|data| !data.trim().is_empty())?;
        return Some(InboundUpdate {
            sender_id: query.from.id.to_string(),
            chat_id: chat_id.to_string(),
            text,
        });
    }
    tracing::debug!(update_id = update.update_id, "ignoring update without text");
    None
}
