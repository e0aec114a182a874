use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "getstats", version, about = "Embedded time-series stats for a Lightning node")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start the stats service (default)
    Start,

    /// Print the stored points of one timeseries
    Series {
        /// Timeseries name, e.g. getinfo_num_peers
        name: String,

        /// Lower bound (RFC 3339 or YYYY-MM-DD), inclusive
        #[arg(long)]
        from: Option<String>,

        /// Upper bound (RFC 3339 or YYYY-MM-DD), inclusive
        #[arg(long)]
        to: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List all known timeseries
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Apply pending schema migrations and exit
    Migrate,

    /// Show database statistics
    Status,

    /// Show version information
    Version,
}

impl Cli {
    /// Get the command to execute, defaulting to Start if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Start)
    }
}
