mod browse;
mod db;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::browse::{BrowseArgs, SessionCommands};

#[derive(Debug, Parser)]
#[command(name = "bazaar-cli")]
#[command(about = "Bazaar marketplace command line interface")]
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
    /// Reveal a listing page by page against a running server
    Browse(BrowseArgs),
    /// Manage the saved API session
    Session {
        /// Base URL of the bazaar API
        #[arg(long, env = "BAZAAR_API_URL", default_value = "http://localhost:3000")]
        api_url: String,
        /// Where the signed-in session is stored
        #[arg(long, env = "BAZAAR_TOKEN_FILE", default_value = ".bazaar/session.json")]
        token_file: PathBuf,
        #[command(subcommand)]
        command: SessionCommands,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommands {
    /// Check database connectivity
    Ping,
    /// Apply pending migrations
    Migrate,
    /// Load the YAML catalog seed
    Seed {
        #[arg(long, env = "BAZAAR_SEED_PATH", default_value = "./config/catalog.yaml")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Db { command }) => {
            let pool = bazaar_db::connect_pool_from_env().await?;
            match command {
                DbCommands::Ping => db::run_ping(&pool).await?,
                DbCommands::Migrate => db::run_migrate(&pool).await?,
                DbCommands::Seed { path } => db::run_seed(&pool, &path).await?,
            }
        }
        Some(Commands::Browse(args)) => browse::run_browse(&args).await?,
        Some(Commands::Session {
            api_url,
            token_file,
            command,
        }) => browse::run_session(&api_url, token_file, command).await?,
        None => println!("bazaar-cli ready; see --help"),
    }

    Ok(())
}

#[cfg(test)]
mod tests;
