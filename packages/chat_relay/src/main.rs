use anyhow::{Context, Result};
use chat_relay::config::{CliOverrides, FileConfig, RelayConfig, load_config};
use chat_relay::registry::Registry;
use chat_relay::{AppState, create_router};
use clap::Parser;
use ollama_client::OllamaClient;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;

#[derive(Parser)]
#[command(name = "relay")]
#[command(about = "Relays browser chat conversations to a local Ollama endpoint")]
struct Args {
    /// Provider base URL, e.g. http://localhost:11434
    #[arg(long)]
    base_url: Option<String>,

    /// Generate endpoint path appended to the base URL
    #[arg(long)]
    path: Option<String>,

    /// Default system prompt for new conversations
    #[arg(long)]
    system: Option<String>,

    /// Host to bind to
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Port for the web server
    #[arg(short, long)]
    port: Option<u16>,

    /// Directory holding index.html, chat.html and style.css
    #[arg(long)]
    public_dir: Option<PathBuf>,

    /// Config file (missing is fine)
    #[arg(short, long, default_value = "relay.toml")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            base_url: self.base_url.clone(),
            path: self.path.clone(),
            system: self.system.clone(),
            host: self.host.clone(),
            port: self.port,
            public_dir: self.public_dir.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let default_directive = if args.debug {
        "chat_relay=debug,ollama_client=debug,tower_http=debug,info"
    } else {
        "chat_relay=info,ollama_client=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let file_config: FileConfig = load_config(&args.config)
        .extract()
        .with_context(|| format!("Invalid configuration ({})", args.config.display()))?;
    let config = RelayConfig::from_file(&file_config.with_overrides(&args.overrides()));

    info!("Fetching model catalog from {}", config.generation.base_url);
    let registry = Arc::new(
        Registry::initialize(OllamaClient::new(), config.generation.clone())
            .await
            .context("Cannot serve conversations")?,
    );

    let app = create_router(AppState {
        registry: registry.clone(),
        public_dir: config.public_dir.clone(),
    });

    let addr = config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let actual_addr = listener.local_addr()?;

    info!("Chat relay listening on http://{}", actual_addr);
    info!("  GET /          - chat UI (WebSocket upgrade accepted)");
    info!("  GET /ws        - multiplexed conversation socket");
    info!("  GET /models    - model catalog");
    info!("  GET /health    - relay status");

    // Create shutdown signal handler
    let shutdown_signal = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
        info!("Received shutdown signal, cleaning up...");
    };

    let server_result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await
        .context("Server error");

    registry.shutdown().await;

    info!("Shutdown complete");
    server_result
}
