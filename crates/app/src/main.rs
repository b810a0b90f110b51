//! Courier command-line entry point.

use anyhow::Result;
use clap::Parser;
use courier::cli::Cli;
use courier_application::ports::CancellationToken;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn filter() -> EnvFilter {
    EnvFilter::try_from_env("COURIER_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(filter())
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            on_interrupt.cancel();
        }
    });

    if !courier::execute(cli.command, cancel).await? {
        std::process::exit(1);
    }
    Ok(())
}
