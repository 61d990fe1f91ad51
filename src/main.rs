use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use easy_repository::{config::Config, database::Database, entities};

#[derive(Parser)]
#[command(name = "easy-repository")]
#[command(version)]
#[command(about = "Schema and metadata tooling for the generic SeaORM repository")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Database URL (overrides config file)
    #[arg(short = 'd', long, value_name = "URL")]
    database_url: Option<String>,

    /// Log level (overrides config file)
    #[arg(short = 'v', long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply the sample schema migrations
    Migrate {
        /// Revert every applied migration instead
        #[arg(long)]
        down: bool,
    },
    /// List the registered entities and their primary keys
    Entities,
    /// Write the default configuration file if it does not exist
    InitConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_from(&cli.config)?;
    if let Some(database_url) = cli.database_url {
        config.database.url = database_url;
    }
    let log_level = cli.log_level.unwrap_or_else(|| config.logging.level.clone());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("easy_repository={log_level},sea_orm={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting easy-repository v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Migrate { down } => {
            info!("Using database: {}", config.database.url);
            let database = Database::new(&config.database).await?;
            if down {
                database.rollback().await?;
            } else {
                database.migrate().await?;
            }
        }
        Command::Entities => {
            let metadata = entities::metadata()?;
            println!("{:<12} {:<8} {:<12} {}", "TABLE", "KEY", "KIND", "AUTO INCREMENT");
            for descriptor in metadata.descriptors() {
                println!(
                    "{:<12} {:<8} {:<12} {}",
                    descriptor.table,
                    descriptor.column_name,
                    descriptor.kind,
                    descriptor.auto_increment
                );
            }
            println!("\nUnits of work: {}", config.repository.service_lifetime);
        }
        Command::InitConfig => {
            if Config::write_default(&cli.config)? {
                println!("Wrote {}", cli.config);
            } else {
                println!("{} already exists", cli.config);
            }
        }
    }

    Ok(())
}
