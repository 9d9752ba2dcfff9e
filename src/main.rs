//! Foreman CLI entry point.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use foreman::cli::{Cli, Commands};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Cycle(args) => foreman::cli::run_cycle(args, cli.config.as_ref(), cli.json).await,
        Commands::Schedule(args) => foreman::cli::run_scheduler(args, cli.config.as_ref()).await,
    };

    if let Err(err) = result {
        foreman::cli::handle_error(&err, cli.json);
    }
}
