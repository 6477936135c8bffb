use anyhow::Result;
use clap::Parser;
use ghrun_cli::{init_tracing, load_dotenv, run_bot, shutdown_signal, BotSettings, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    // Before tracing so RUST_LOG from .env applies.
    let dotenv = load_dotenv();
    init_tracing();
    match dotenv {
        Ok(Some(path)) => tracing::debug!(path = %path.display(), "loaded .env"),
        Ok(None) => {}
        Err(error) => tracing::warn!(error = %error, "ignoring unreadable .env file"),
    }

    let cli = Cli::parse();
    let settings = BotSettings::from_cli(&cli)?;
    run_bot(settings, shutdown_signal()).await
}
