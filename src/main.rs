use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use getstats::{config, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::Cli::parse();

    let command = args.get_command();
    if let cli::Commands::Version = command {
        println!("getstats v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let cfg = config::load_config(&args.config)?;

    // Offline commands only log warnings so their output stays readable
    match command {
        cli::Commands::Start => init_tracing(&cfg.server.log_level, &cfg.server.log_format),
        _ => init_tracing("warn", &cfg.server.log_format),
    }

    // Dispatch to appropriate command handler
    match command {
        cli::Commands::Start => {
            commands::start::execute(cfg).await?;
        }
        cli::Commands::Series { name, from, to, json } => {
            commands::series::show(&cfg, &name, from.as_deref(), to.as_deref(), json).await?;
        }
        cli::Commands::List { json } => {
            commands::series::list(&cfg, json).await?;
        }
        cli::Commands::Migrate => {
            commands::database::migrate(&cfg).await?;
        }
        cli::Commands::Status => {
            commands::database::status(&cfg).await?;
        }
        cli::Commands::Version => {}
    }

    Ok(())
}
