//! Mnemograph server entry point
//!
//! Serves the memory store over MCP on stdio. Logs go to stderr so stdout
//! carries nothing but JSON-RPC.

use clap::Parser;
use mnemograph_server::config::{default_data_dir, EmbedderKind, ServerConfig, VectorBackend};
use mnemograph_server::McpServer;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "mnemograph")]
#[command(about = "Knowledge-graph memory server for MCP clients")]
#[command(version)]
struct Args {
    /// Directory holding the memory database [default: ~/.mnemograph/memory]
    #[arg(long, env = "MNEMOGRAPH_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Similarity primitive exposed to search
    #[arg(long, value_enum, default_value_t = VectorBackend::Native)]
    vector_backend: VectorBackend,

    /// Disable the fulltext index over metadata and observations
    #[arg(long)]
    no_fulltext: bool,

    /// Minimum tag similarity for semantic tag matches
    #[arg(long, default_value_t = 0.6)]
    tag_threshold: f32,

    /// Embedding model
    #[arg(long, value_enum, default_value_t = EmbedderKind::Hashed)]
    embedder: EmbedderKind,

    /// Model cache directory for the fastembed embedder
    #[arg(long, env = "MNEMOGRAPH_MODELS_PATH")]
    models_path: Option<PathBuf>,

    /// Debug logging
    #[arg(long, short)]
    verbose: bool,
}

impl Args {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            data_dir: self.data_dir.unwrap_or_else(default_data_dir),
            vector_backend: self.vector_backend,
            fulltext: !self.no_fulltext,
            tag_threshold: self.tag_threshold,
            embedder: self.embedder,
            models_path: self.models_path,
        }
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let log_filter = if args.verbose {
        "mnemograph_server=debug,mnemograph_memory=debug"
    } else {
        "mnemograph_server=info,mnemograph_memory=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = args.into_config();
    tracing::info!("Starting Mnemograph MCP server");
    tracing::info!("Data directory: {:?}", config.data_dir);

    let mut server = McpServer::new(config);
    if let Err(e) = server.run().await {
        tracing::error!("MCP server error: {}", e);
        std::process::exit(1);
    }
}
