//! Xalo CLI - the `xalo` binary.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xalo_cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.config();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        match cli.command {
            Commands::List => xalo_cli::commands::schedules::list(&config).await,
            Commands::Create(args) => xalo_cli::commands::schedules::create(args, &config).await,
            Commands::Edit(args) => xalo_cli::commands::schedules::edit(args, &config).await,
            Commands::Delete(args) => xalo_cli::commands::schedules::delete(&args, &config).await,
            Commands::Upload(args) => xalo_cli::commands::uploads::upload(args, &config).await,
            Commands::Sweep(args) => xalo_cli::commands::uploads::sweep(&args, &config).await,
        }
    })
}
