//! Inkwell CLI - offline-first chapter editing from the terminal
//!
//! Edits land in the local store first and sync to the content service when
//! it is reachable.

mod cli;
mod commands;
mod error;


use clap::Parser;
use inkwell_core::config::default_config_path;

use crate::cli::{Cli, Commands};
use crate::commands::common::{resolve_db_path, Session};
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::conflicts::{run_conflicts, run_dismiss, run_resolve};
use crate::commands::content::{run_save, run_show};
use crate::commands::pending::{run_discard, run_pending, run_retry};
use crate::commands::status::run_status;
use crate::commands::sync::{run_sync, run_watch};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(
        "inkwell=info"
            .parse()
            .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?,
    );
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that never touch the local store.
    let command = match cli.command {
        Commands::Completions { shell, output } => {
            return run_completions(shell, output.as_deref());
        }
        Commands::Config { command } => {
            return run_config(command, &default_config_path()?);
        }
        command => command,
    };

    let db_path = resolve_db_path(cli.db_path)?;
    let mut session = Session::open(&db_path, cli.offline).await?;

    match command {
        Commands::Save {
            chapter,
            project,
            content,
        } => {
            run_save(&mut session, &chapter, &project, &content).await?;
        }
        Commands::Show {
            chapter,
            project,
            json,
        } => run_show(&mut session, &chapter, project.as_deref(), json).await?,
        Commands::Pending { json } => run_pending(&session, json).await?,
        Commands::Retry => {
            run_retry(&session).await?;
        }
        Commands::Discard { change_id } => run_discard(&session, &change_id).await?,
        Commands::Sync => {
            run_sync(&mut session).await?;
        }
        Commands::Watch { interval } => run_watch(&mut session, interval).await?,
        Commands::Conflicts { json } => run_conflicts(&session, json)?,
        Commands::Resolve {
            chapter,
            strategy,
            content,
        } => run_resolve(&mut session, &chapter, strategy.into(), &content).await?,
        Commands::Dismiss { chapter } => run_dismiss(&mut session, &chapter).await?,
        Commands::Status { json } => run_status(&session, json)?,
        Commands::Completions { .. } | Commands::Config { .. } => {}
    }

    Ok(())
}
