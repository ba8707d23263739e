mod cli;
mod commands;
mod config;
mod observability;
mod output;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};
use output::print_error;

/// Exit code when a user is not compliant.
const EXIT_REJECTED: i32 = 3;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    observability::init_tracing_with_level(if cli.debug { "debug" } else { "info" });

    match run(cli).await {
        Ok(0) => {}
        Ok(code) => std::process::exit(code),
        Err(e) => {
            print_error(&format!("{e:#}"));
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let config = config::resolve(&cli)?;
    tracing::debug!(
        base_url = %config.base_url,
        publisher_namespace = %config.publisher_namespace,
        "configuration resolved"
    );

    let code = match &cli.command {
        Commands::Policies(args) => {
            commands::policies::list(&config, args.scope.as_deref()).await?;
            0
        }
        Commands::Check(args) => {
            if commands::check::check(config, args).await? {
                0
            } else {
                EXIT_REJECTED
            }
        }
        Commands::Health => {
            if commands::health::health(config).await? {
                0
            } else {
                1
            }
        }
    };

    Ok(code)
}
