//! Chat command parsing and execution for the workflow runner bot.

pub mod command;
pub mod handler;
pub mod replies;

pub use command::{Command, ADDTOKEN_USAGE, RUN_USAGE};
pub use handler::{
    CommandError, CommandHandler, CredentialSource, InboundUpdate, ResolvedCredential,
    DEFAULT_GIT_REF,
};
