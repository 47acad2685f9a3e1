//! reqguard Server Entry Point

use anyhow::Context;
use clap::Parser;
use reqguard::auth::password::BcryptHasher;
use reqguard::cli::serve::ServeArgs;
use reqguard::cli::{Cli, Commands};
use reqguard::config::AppConfig;
use reqguard::logging::clock::{SharedClock, SystemClock};
use reqguard::logging::{AppLogger, LogLayer};
use reqguard::observability::Observability;
use reqguard::store::InMemoryUserStore;
use reqguard::AppState;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Sign(args)) => match reqguard::cli::sign::execute(&args) {
            Ok(query) => println!("{}", query),
            Err(e) => {
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        },
        Some(Commands::Serve(args)) => serve(args).await,
        None => {
            // No subcommand - default to serve
            serve(ServeArgs::default()).await;
        }
    }
}

async fn serve(args: ServeArgs) {
    if let Err(e) = run_server(args).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    // ロガー構築前の警告（非推奨の環境変数など）は標準エラーへ
    let bootstrap = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .finish();
    let mut config = tracing::subscriber::with_default(bootstrap, AppConfig::from_env)
        .context("Failed to load configuration")?;
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host {
        config.server.host = host;
    }

    let clock: SharedClock = Arc::new(SystemClock);
    let logger = Arc::new(
        AppLogger::new(&config.logger, clock.clone()).context("Failed to initialize logging")?,
    );
    let filter = EnvFilter::try_from_env("REQGUARD_LOG_LEVEL")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(LogLayer::new(logger.clone()))
        .try_init()
        .context("Failed to install tracing subscriber")?;

    info!("reqguard v{}", env!("CARGO_PKG_VERSION"));

    let observability = Observability::with_logger(&config.logger, clock, logger)
        .context("Failed to initialize audit log")?;
    let bind_addr = config.server.bind_addr();
    info!(
        mode = ?config.server.mode,
        signature_enabled = config.signature.enabled,
        nonce_cache = config.signature.nonce_cache,
        "Authentication pipeline initialized"
    );

    let state = AppState::new(
        config,
        observability,
        Arc::new(InMemoryUserStore::new()),
        Arc::new(BcryptHasher::default()),
    );
    reqguard::server::run(state, &bind_addr)
        .await
        .with_context(|| format!("Server error on {}", bind_addr))
}
