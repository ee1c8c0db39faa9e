//! boardwatch: watches Weeek boards and reports every change to Telegram.
//!
//! Column moves are also posted to the time-tracking backend so the time a
//! task spent in each column can be reported per assignee.

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use boardwatch::bot;
use boardwatch::config::{Config, DEFAULT_CONFIG_PATH};
use boardwatch::weeek::{TaskSource, WeeekClient};

/// Watch Weeek boards from Telegram and log column transitions.
#[derive(Parser)]
#[command(name = "boardwatch", version, about)]
struct Cli {
    /// Path to the config file.
    #[arg(short, long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the Telegram bot in the foreground.
    Run,

    /// Print the projects, boards and columns the token can see.
    Projects,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;

    // RUST_LOG overrides the default filter.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("boardwatch=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Run => bot::run(config).await,
        Command::Projects => cmd_projects(&config).await,
    }
}

/// Print every project with its boards and their columns.
async fn cmd_projects(config: &Config) -> Result<()> {
    let client = WeeekClient::new(&config.weeek.base_url, &config.weeek.token)?;

    let projects = client.list_projects().await?;
    if projects.is_empty() {
        println!("No projects visible with this token.");
        return Ok(());
    }

    for project in &projects {
        println!("{} (project {})", project.name, project.id);
        for board in client.list_boards(project.id).await? {
            println!("  {} (board {})", board.name, board.id);
            println!("    /watch {} {}", project.id, board.id);
            for column in client.list_columns(board.id).await? {
                println!("    - {} (column {})", column.name, column.id);
            }
        }
    }
    Ok(())
}
