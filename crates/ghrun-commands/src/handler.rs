//! Turns one inbound chat message into one reply.
//!
//! Order of work per message: access check, command parse, credential
//! resolution (stored token, then global token), workflow call, reply text.
//! Nothing is remembered between messages.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use ghrun_access::AllowList;
use ghrun_credentials::{CipherError, CredentialCipher, StoreError, TokenStore};
use ghrun_github::{WorkflowApi, WorkflowClientError};

use crate::command::Command;
use crate::replies;

pub const DEFAULT_GIT_REF: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq)]
/// A text message delivered by the chat transport.
pub struct InboundUpdate {
    pub sender_id: String,
    pub chat_id: String,
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
/// Per-command failures. None of these outlive the message that caused them.
pub enum CommandError {
    #[error("access denied")]
    AccessDenied,
    #[error("no credential available")]
    NoCredential,
    #[error("token store failure: {0}")]
    Storage(#[from] StoreError),
    #[error("credential sealing failed: {0}")]
    Cipher(#[from] CipherError),
    #[error(transparent)]
    Upstream(#[from] WorkflowClientError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    User,
    Global,
}

impl CredentialSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Global => "global",
        }
    }
}

/// The bearer token a command will act with.
#[derive(Clone, PartialEq, Eq)]
pub struct ResolvedCredential {
    token: String,
    source: CredentialSource,
}

impl ResolvedCredential {
    pub fn expose(&self) -> &str {
        &self.token
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for ResolvedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedCredential")
            .field("token", &"[REDACTED]")
            .field("source", &self.source)
            .finish()
    }
}

pub struct CommandHandler {
    allow_list: AllowList,
    cipher: Arc<CredentialCipher>,
    store: Arc<dyn TokenStore>,
    workflows: Arc<dyn WorkflowApi>,
    global_token: Option<String>,
    default_ref: String,
}

impl fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHandler")
            .field("allow_list_len", &self.allow_list.len())
            .field("store", &self.store.backend())
            .field("has_global_token", &self.global_token.is_some())
            .field("default_ref", &self.default_ref)
            .finish_non_exhaustive()
    }
}

impl CommandHandler {
    pub fn new(
        allow_list: AllowList,
        cipher: Arc<CredentialCipher>,
        store: Arc<dyn TokenStore>,
        workflows: Arc<dyn WorkflowApi>,
    ) -> Self {
        Self {
            allow_list,
            cipher,
            store,
            workflows,
            global_token: None,
            default_ref: DEFAULT_GIT_REF.to_string(),
        }
    }

    /// Shared fallback token used when the sender has none stored.
    pub fn with_global_token(mut self, token: Option<String>) -> Self {
        self.global_token = token
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty());
        self
    }

    pub fn with_default_ref(mut self, git_ref: impl Into<String>) -> Self {
        let git_ref = git_ref.into();
        if !git_ref.trim().is_empty() {
            self.default_ref = git_ref.trim().to_string();
        }
        self
    }

    /// Handles one message and returns the reply text. Never fails: every
    /// error becomes a user-facing reply.
    pub async fn handle(&self, update: &InboundUpdate) -> String {
        let command = Command::parse(&update.text);
        match self.execute(&update.sender_id, &command).await {
            Ok(reply) => {
                tracing::info!(
                    user_id = %update.sender_id,
                    chat_id = %update.chat_id,
                    command = command.name(),
                    "command handled"
                );
                reply
            }
            Err(error) => {
                self.log_failure(update, &command, &error);
                reply_for_error(&error)
            }
        }
    }

    async fn execute(&self, user_id: &str, command: &Command) -> Result<String, CommandError> {
        let decision = self.allow_list.evaluate(user_id);
        if !decision.is_allowed() {
            tracing::debug!(user_id, reason_code = decision.reason_code(), "access denied");
            return Err(CommandError::AccessDenied);
        }

        match command {
            Command::Start | Command::Help => Ok(replies::render_usage()),
            Command::AddToken { token } => {
                let sealed = self.cipher.encrypt(token)?;
                self.store.put(user_id, sealed).await?;
                Ok(replies::TOKEN_SAVED.to_string())
            }
            Command::DelToken => {
                self.store.delete(user_id).await?;
                Ok(replies::TOKEN_DELETED.to_string())
            }
            Command::TokenStatus => self.token_status(user_id).await,
            Command::Run { git_ref, inputs } => {
                let git_ref = git_ref.as_deref().unwrap_or(&self.default_ref);
                self.run_workflow(user_id, git_ref, inputs).await
            }
            Command::Malformed { usage } => Ok((*usage).to_string()),
            Command::Unknown => Ok(replies::UNKNOWN_COMMAND.to_string()),
        }
    }

    /// Stored token first, then the global one. A stored blob that fails to
    /// decrypt is skipped rather than surfaced.
    pub async fn resolve_credential(
        &self,
        user_id: &str,
    ) -> Result<ResolvedCredential, CommandError> {
        if let Some(sealed) = self.store.get(user_id).await? {
            match self.cipher.decrypt(&sealed) {
                Ok(token) if !token.trim().is_empty() => {
                    return Ok(ResolvedCredential {
                        token: token.trim().to_string(),
                        source: CredentialSource::User,
                    });
                }
                Ok(_) => {
                    tracing::warn!(user_id, "stored credential is empty; ignoring it");
                }
                Err(error) => {
                    tracing::warn!(
                        user_id,
                        error = %error,
                        "stored credential could not be opened; ignoring it"
                    );
                }
            }
        }
        self.global_token
            .as_ref()
            .map(|token| ResolvedCredential {
                token: token.clone(),
                source: CredentialSource::Global,
            })
            .ok_or(CommandError::NoCredential)
    }

    async fn token_status(&self, user_id: &str) -> Result<String, CommandError> {
        let credential = self.resolve_credential(user_id).await?;
        let runs = self.workflows.list_runs(credential.expose()).await?;
        if runs.is_empty() {
            return Ok(replies::NO_RUNS_FOUND.to_string());
        }
        Ok(runs
            .latest()
            .map(replies::render_latest_run)
            .unwrap_or_else(|| replies::NO_RUNS_FOUND.to_string()))
    }

    async fn run_workflow(
        &self,
        user_id: &str,
        git_ref: &str,
        inputs: &BTreeMap<String, String>,
    ) -> Result<String, CommandError> {
        let credential = self.resolve_credential(user_id).await?;
        let token = credential.expose();
        let runs = self.workflows.list_runs(token).await?;
        let latest = runs.latest().cloned();
        if let Some(run) = latest.as_ref().filter(|run| run.status.is_active()) {
            return Ok(replies::render_already_running(run));
        }

        let dispatch = self.workflows.dispatch(token, git_ref, inputs).await?;
        if dispatch.accepted {
            tracing::info!(
                user_id,
                git_ref,
                credential = credential.source().as_str(),
                "workflow dispatched"
            );
            return Ok(replies::render_dispatched(git_ref));
        }

        let Some(run) = latest else {
            return Ok(replies::render_dispatch_failed(dispatch.status));
        };
        tracing::warn!(
            user_id,
            git_ref,
            status = dispatch.status,
            run_id = run.id,
            "workflow dispatch rejected; rerunning latest run"
        );
        let rerun = self.workflows.rerun(token, run.id).await?;
        if rerun.accepted {
            Ok(replies::render_rerun_started(run.id))
        } else {
            Ok(replies::render_rerun_failed(rerun.status))
        }
    }

    fn log_failure(&self, update: &InboundUpdate, command: &Command, error: &CommandError) {
        match error {
            CommandError::AccessDenied | CommandError::NoCredential => tracing::info!(
                user_id = %update.sender_id,
                chat_id = %update.chat_id,
                command = command.name(),
                error = %error,
                "command refused"
            ),
            CommandError::Storage(_) | CommandError::Cipher(_) => tracing::error!(
                user_id = %update.sender_id,
                chat_id = %update.chat_id,
                command = command.name(),
                store = self.store.backend(),
                error = %error,
                "command failed"
            ),
            CommandError::Upstream(_) => tracing::warn!(
                user_id = %update.sender_id,
                chat_id = %update.chat_id,
                command = command.name(),
                status = ?error_status(error),
                error = %error,
                "workflow api call failed"
            ),
        }
    }
}

fn error_status(error: &CommandError) -> Option<u16> {
    match error {
        CommandError::Upstream(error) => error.status(),
        _ => None,
    }
}

fn reply_for_error(error: &CommandError) -> String {
    match error {
        CommandError::AccessDenied => replies::ACCESS_DENIED.to_string(),
        CommandError::NoCredential => replies::NO_TOKEN_AVAILABLE.to_string(),
        CommandError::Storage(_) => replies::STORAGE_UNAVAILABLE.to_string(),
        CommandError::Cipher(_) => replies::TOKEN_NOT_SAVED.to_string(),
        CommandError::Upstream(error) => replies::render_upstream_error(error),
    }
}
