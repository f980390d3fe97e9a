mod harvest;
mod query;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::harvest::HarvestCommands;

#[derive(Debug, Parser)]
#[command(name = "hvst")]
#[command(about = "Delivery marketplace harvester")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance
    Db {
        #[command(subcommand)]
        command: DbCommands,
    },
    /// Harvest the category index for the configured city
    Discover,
    /// Harvest merchant listings or merchant menus
    Harvest {
        #[command(subcommand)]
        command: HarvestCommands,
    },
    /// Show recent collection runs
    Runs {
        /// Maximum number of runs to show
        #[arg(long, default_value = "20")]
        limit: i64,
    },
    /// Show the price history of one item
    History {
        /// Item id as stored in the database
        item_id: i64,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check that the database is reachable
    Ping,
    /// Apply pending migrations
    Migrate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("hvst: no command given, see `hvst --help`");
        return Ok(());
    };

    let config = hvst_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let pool_config = hvst_db::PoolConfig::from_app_config(&config);
    let pool = hvst_db::connect_pool(&config.database_url, pool_config).await?;

    match command {
        Commands::Db {
            command: DbCommands::Ping,
        } => {
            hvst_db::ping(&pool).await?;
            println!("database ok");
        }
        Commands::Db {
            command: DbCommands::Migrate,
        } => {
            let applied = hvst_db::run_migrations(&pool).await?;
            println!("applied {applied} migration(s)");
        }
        Commands::Discover => harvest::run_discover(&pool, &config).await?,
        Commands::Harvest {
            command: HarvestCommands::Merchants { category, limit },
        } => harvest::run_harvest_merchants(&pool, &config, category.as_deref(), limit).await?,
        Commands::Harvest {
            command: HarvestCommands::Items { limit },
        } => harvest::run_harvest_items(&pool, &config, limit).await?,
        Commands::Runs { limit } => query::run_runs(&pool, limit).await?,
        Commands::History { item_id } => query::run_history(&pool, item_id).await?,
    }

    Ok(())
}
