use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::dispatch::{drain, reap_finished, UpdateDispatcher};
use crate::telegram_api::{TelegramApiClient, TransportError};
use crate::update::{next_offset, parse_update};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    pub poll_timeout_seconds: u64,
    pub error_backoff_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_timeout_seconds: 30,
            error_backoff_ms: 3_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollCycleSummary {
    pub received: usize,
    pub dispatched: usize,
    pub skipped: usize,
}

/// Long-poll receiver. Holds the next update offset across cycles.
pub struct TelegramPoller {
    api: Arc<TelegramApiClient>,
    dispatcher: UpdateDispatcher,
    config: PollingConfig,
    next_offset: Option<u64>,
    tasks: JoinSet<()>,
}

impl TelegramPoller {
    pub fn new(
        api: Arc<TelegramApiClient>,
        dispatcher: UpdateDispatcher,
        config: PollingConfig,
    ) -> Self {
        Self {
            api,
            dispatcher,
            config,
            next_offset: None,
            tasks: JoinSet::new(),
        }
    }

    pub fn next_offset(&self) -> Option<u64> {
        self.next_offset
    }

    /// Fetches one batch, advances the offset past every update in it and
    /// spawns a task per actionable update.
    pub async fn poll_cycle(&mut self) -> Result<PollCycleSummary, TransportError> {
        reap_finished(&mut self.tasks);
        let updates = self
            .api
            .get_updates(self.next_offset, self.config.poll_timeout_seconds)
            .await?;

        let mut summary = PollCycleSummary {
            received: updates.len(),
            ..PollCycleSummary::default()
        };
        for raw in &updates {
            if let Some(offset) = next_offset(raw) {
                self.next_offset = Some(self.next_offset.unwrap_or(0).max(offset));
            }
            match parse_update(raw) {
                Some(update) => {
                    self.dispatcher.spawn(&mut self.tasks, update);
                    summary.dispatched += 1;
                }
                None => summary.skipped += 1,
            }
        }
        Ok(summary)
    }

    /// Waits for the commands spawned so far to finish.
    pub async fn finish_in_flight(&mut self) {
        drain(&mut self.tasks).await;
    }

    /// Polls until `shutdown` resolves. Transport errors are logged and the
    /// loop retries after the configured backoff.
    pub async fn run<F>(mut self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(
            poll_timeout_seconds = self.config.poll_timeout_seconds,
            "telegram polling started"
        );
        loop {
            let cycle = tokio::select! {
                _ = &mut shutdown => break,
                cycle = self.poll_cycle() => cycle,
            };
            match cycle {
                Ok(summary) if summary.received > 0 => tracing::debug!(
                    received = summary.received,
                    dispatched = summary.dispatched,
                    skipped = summary.skipped,
                    next_offset = ?self.next_offset,
                    "telegram poll cycle"
                ),
                Ok(_) => {}
                Err(error) => {
                    tracing::warn!(
                        error = %error,
                        backoff_ms = self.config.error_backoff_ms,
                        "telegram poll failed"
                    );
                    let backoff = Duration::from_millis(self.config.error_backoff_ms);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
        tracing::info!("telegram polling stopping; waiting for in-flight commands");
        self.finish_in_flight().await;
        Ok(())
    }
}
