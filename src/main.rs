use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

mod agent;
mod config;
mod domain;
mod error;
mod models;
mod seed;
mod server;
mod session;
mod storage;

use agent::engine::ChatEngine;
use agent::planner::LlmPlanner;
use agent::tools::ToolRegistry;

#[derive(Debug, Parser)]
#[command(name = "front_desk")]
#[command(about = "Chat front desk for a library bookstore", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Start {
        #[arg(long, default_value = "127.0.0.1:7171")]
        listen: String,
        #[arg(long)]
        database_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start {
            listen,
            database_url,
        } => {
            let addr: SocketAddr = listen.parse()?;
            let config = config::Config::from_env()?;
            let store =
                storage::LibraryStore::initialize(database_url.or(config.database_url)).await?;
            let model = models::OpenAICompatible::new(
                config.model_base_url,
                config.model_api_key,
                config.model_timeout,
            )?;
            let planner = Arc::new(LlmPlanner::new(Arc::new(model), config.model_name));
            let registry = Arc::new(ToolRegistry::with_default_tools());
            let engine = Arc::new(ChatEngine::new(
                store.clone(),
                planner,
                registry.clone(),
                config.low_stock_threshold,
            ));
            let state = server::AppState {
                store,
                engine,
                registry,
                low_stock_threshold: config.low_stock_threshold,
            };
            server::serve(addr, state).await?;
        }
    }
    Ok(())
}
