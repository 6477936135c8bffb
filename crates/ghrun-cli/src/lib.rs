//! Configuration and process wiring for the `ghrun` binary.

pub mod bootstrap;
pub mod cli_args;
pub mod cli_types;
pub mod runtime;
pub mod settings;

pub use bootstrap::{init_tracing, load_dotenv};
pub use cli_args::Cli;
pub use cli_types::{CliTokenStoreBackend, CliTransportMode};
pub use runtime::{build_command_handler, build_token_store, run_bot, shutdown_signal};
pub use settings::{BotSettings, ConfigError, KvSettings, TokenStoreSettings, TransportSettings};
