use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tvrelay::api::{create_router, AppState};
use tvrelay::config::{AppConfig, LoggingConfig};
use tvrelay::error::{RelayError, Result};
use tvrelay::exchange::build_adapter_registry;
use tvrelay::services::{NotificationSink, NullSink};
use tvrelay::TelegramNotifier;

#[derive(Parser)]
#[command(name = "tvrelay", about = "TradingView alert webhook to exchange order relay")]
struct Cli {
    /// Configuration directory
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Override the webhook server port
    #[arg(long)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the webhook server (default)
    Serve,
    /// Load and validate configuration, then exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)?;
    init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("config: {}", e);
        }
        return Err(RelayError::Validation(format!(
            "invalid configuration: {}",
            errors.join("; ")
        )));
    }

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::CheckConfig => {
            info!("configuration OK");
            Ok(())
        }
        Commands::Serve => serve(config, cli.port).await,
    }
}

async fn serve(mut config: AppConfig, port_override: Option<u16>) -> Result<()> {
    if let Some(port) = port_override {
        config.server.port = port;
    }
    let config = Arc::new(config);

    let adapters = build_adapter_registry(&config)?;

    let notifier: Arc<dyn NotificationSink> =
        match TelegramNotifier::from_config(&config.notification) {
            Some(notifier) => notifier,
            None => {
                info!("no notification channel configured; events go to the log only");
                Arc::new(NullSink)
            }
        };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let state = AppState::new(config.clone(), adapters, notifier, shutdown_rx);
    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| RelayError::Validation(format!("invalid server address: {}", e)))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("webhook server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown requested; stopping server and retry loops");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    info!("shutdown complete");
    Ok(())
}

fn init_logging(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tvrelay=debug", cfg.level)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if cfg.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
