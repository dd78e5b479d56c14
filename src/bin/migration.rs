use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use storefront_api::{
    config,
    db::{establish_connection_with_config, DbConfig},
    migrator::Migrator,
};

#[derive(Parser)]
#[command(name = "migration", about = "Apply or roll back the storefront schema", version)]
struct Cli {
    #[arg(
        long,
        help = "Database URL; defaults to DATABASE_URL, then the application configuration"
    )]
    database_url: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Apply pending migrations (default)
    Up {
        #[arg(long, help = "Apply at most this many migrations")]
        steps: Option<u32>,
    },
    /// Roll back applied migrations
    Down {
        #[arg(long, default_value_t = 1)]
        steps: u32,
    },
    /// Show which migrations are applied
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    config::init_tracing("info", false);
    let cli = Cli::parse();

    let database_url = match cli
        .database_url
        .or_else(|| std::env::var("DATABASE_URL").ok())
    {
        Some(url) => url,
        None => {
            config::load_config()
                .context("no --database-url given and configuration failed to load")?
                .database_url
        }
    };

    let db = establish_connection_with_config(&DbConfig {
        url: database_url,
        ..DbConfig::default()
    })
    .await
    .context("failed to connect to database")?;

    match cli.command.unwrap_or(Command::Up { steps: None }) {
        Command::Up { steps } => {
            Migrator::up(&db, steps).await?;
            info!("Migrations applied");
        }
        Command::Down { steps } => {
            Migrator::down(&db, Some(steps)).await?;
            info!(steps, "Migrations rolled back");
        }
        Command::Status => {
            Migrator::status(&db).await?;
        }
    }

    Ok(())
}
