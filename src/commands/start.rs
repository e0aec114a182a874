use anyhow::Result;
use colored::Colorize;
use getstats::{config::Config, server};
use tracing::info;

/// Execute the start command
///
/// Blocks until a shutdown signal arrives or database initialization fails.
pub async fn execute(cfg: Config) -> Result<()> {
    println!("{}", "Starting getstats in foreground mode...".green());
    println!(
        "  Listening on {}:{}, database {}",
        cfg.server.host, cfg.server.port, cfg.database.path
    );

    info!("Starting getstats v{}", env!("CARGO_PKG_VERSION"));

    server::start_server(cfg).await?;

    Ok(())
}
