use std::path::PathBuf;

use anyhow::Context;
use axum::extract::FromRef;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod controllers;
mod db;
mod error;
mod id;
mod models;
pub(crate) mod types;

use config::Config;
use db::Database;
pub(crate) use error::ApiResult;

#[derive(Debug, Parser)]
#[command(version, about = "Share text through short, expiring links")]
struct Cli {
    /// Path to the config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve,
    /// Deactivate every paste that expired or ran out of views, then exit.
    Sweep,
}

/// Shared state handed to every request and command.
#[derive(Clone, FromRef)]
pub struct App {
    pub config: Config,
    pub database: Database,
}

impl App {
    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: Config) -> anyhow::Result<Self> {
        let database = Database::connect(&config.database.url, config.database.max_connections)
            .await
            .context("failed to connect to database")?;
        database
            .init_schema()
            .await
            .context("failed to initialize database")?;

        Ok(App { config, database })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load config")?;
    let app = App::open(config).await?;
    let database = app.database.clone();

    let result = match cli.command {
        Command::Serve => commands::serve::run(app).await,
        Command::Sweep => commands::sweep::run(app).await,
    };

    database.close().await;

    result
}

#[cfg(test)]
pub(crate) async fn test_app() -> App {
    let config = Config {
        test_mode: true,
        ..Config::default()
    };
    App {
        config,
        database: db::memory().await,
    }
}
