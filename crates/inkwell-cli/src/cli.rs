use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use inkwell_core::models::ResolutionStrategy;

#[derive(Parser)]
#[command(name = "inkwell")]
#[command(about = "Offline-first chapter editing and sync for Inkwell")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Work offline: never contact the content service
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Save chapter content (direct when online, queued otherwise)
    Save {
        /// Chapter ID
        chapter: String,
        /// Owning project ID
        #[arg(short, long, value_name = "ID")]
        project: String,
        /// Chapter text (read from stdin or $EDITOR when omitted)
        content: Vec<String>,
    },
    /// Show a chapter, refreshing from the server when online
    Show {
        /// Chapter ID
        chapter: String,
        /// Owning project ID, required to fetch from the server
        #[arg(short, long, value_name = "ID")]
        project: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List queued changes awaiting sync
    Pending {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Give failed changes a fresh retry budget
    Retry,
    /// Drop a queued change without syncing it
    Discard {
        /// Change ID as shown by `pending`
        change_id: String,
    },
    /// Run one sync pass against the content service
    Sync,
    /// Keep syncing on an interval until interrupted
    Watch {
        /// Override the configured interval in seconds
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
    },
    /// List unresolved sync conflicts
    Conflicts {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a sync conflict
    Resolve {
        /// Chapter ID with a conflict
        chapter: String,
        /// Resolution strategy
        #[arg(short, long, value_enum)]
        strategy: StrategyArg,
        /// Merged text for `merge` (read from stdin or $EDITOR when omitted)
        content: Vec<String>,
    },
    /// Hide a conflict and leave its change queued for a later pass
    Dismiss {
        /// Chapter ID with a conflict
        chapter: String,
    },
    /// Show offline and sync status
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Manage client configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum StrategyArg {
    KeepLocal,
    KeepServer,
    Merge,
}

impl From<StrategyArg> for ResolutionStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::KeepLocal => Self::KeepLocal,
            StrategyArg::KeepServer => Self::KeepServer,
            StrategyArg::Merge => Self::Merge,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
    #[value(name = "powershell")]
    PowerShell,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update the config file
    Init {
        /// Content service base URL
        #[arg(long, value_name = "URL")]
        api_url: Option<String>,
        /// API bearer token
        #[arg(long, value_name = "TOKEN")]
        token: Option<String>,
        /// Auto-sync interval in seconds
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,
        /// Start in offline mode
        #[arg(long)]
        start_offline: Option<bool>,
    },
    /// Print the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}
