use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

use ui_forge::engine::Workbench;
use ui_forge::generation::GenerationClient;
use ui_forge::history::HistoryStack;
use ui_forge::models::OpenAICompatible;
use ui_forge::server;
use ui_forge::session::SessionStore;
use ui_forge::settings::{self, ConfigLayer};
use ui_forge::storage::{FileKvStore, PersistentStore};

#[derive(Debug, Parser)]
#[command(name = "ui_forge")]
#[command(about = "Turns prompts into UI components through an LLM", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Start {
        #[arg(long, default_value = "127.0.0.1:7272")]
        listen: String,
        #[arg(long)]
        api_base_url: Option<String>,
        #[arg(long)]
        database_url: Option<String>,
        #[arg(long)]
        fallback_path: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Start { listen, api_base_url, database_url, fallback_path } => {
            let addr: SocketAddr = listen.parse()?;
            let flags = ConfigLayer { api_base_url, database_url, fallback_path };
            let config = settings::resolve_config(&flags, &ConfigLayer::from_env(), settings::default_config());
            if let Some(parent) = config.fallback_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::create_dir_all(settings::data_dir())?;

            let kv = Arc::new(FileKvStore::new(&config.fallback_path));
            let store = PersistentStore::initialize(Some(config.database_url.as_str()), kv).await;
            let client = GenerationClient::new(Arc::new(OpenAICompatible::new(config.api_base_url.clone())));
            let workbench = Arc::new(Workbench::new(client, SessionStore::new(), HistoryStack::new(), store));
            workbench.restore().await;

            server::serve(addr, server::AppState { workbench }).await?;
        }
    }
    Ok(())
}
