use std::sync::Arc;

use ghrun_commands::{CommandHandler, InboundUpdate};
use tokio::task::JoinSet;

use crate::telegram_api::ChatTransport;

/// Runs one update through the handler and sends the reply. Delivery
/// failures are logged; there is no redelivery.
pub async fn handle_and_reply(
    handler: &CommandHandler,
    transport: &dyn ChatTransport,
    update: InboundUpdate,
) {
    let reply = handler.handle(&update).await;
    if let Err(error) = transport.send_reply(&update.chat_id, &reply).await {
        tracing::warn!(
            chat_id = %update.chat_id,
            user_id = %update.sender_id,
            error = %error,
            "failed to deliver reply"
        );
    }
}

/// Spawns each update as its own task so a slow command never blocks the
/// receiver.
#[derive(Clone)]
pub struct UpdateDispatcher {
    handler: Arc<CommandHandler>,
    transport: Arc<dyn ChatTransport>,
}

impl UpdateDispatcher {
    pub fn new(handler: Arc<CommandHandler>, transport: Arc<dyn ChatTransport>) -> Self {
        Self { handler, transport }
    }

    pub fn spawn(&self, tasks: &mut JoinSet<()>, update: InboundUpdate) {
        let handler = self.handler.clone();
        let transport = self.transport.clone();
        tasks.spawn(async move {
            handle_and_reply(&handler, transport.as_ref(), update).await;
        });
    }
}

/// Drops finished tasks, logging any that panicked.
pub fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        log_join_result(result);
    }
}

/// Waits for every in-flight task.
pub async fn drain(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.join_next().await {
        log_join_result(result);
    }
}

fn log_join_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(error) = result {
        if error.is_panic() {
            tracing::error!(error = %error, "command task panicked");
        }
    }
}
