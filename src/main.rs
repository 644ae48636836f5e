use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::prelude::*;

use lurker::config::Config;
use lurker::server::{self, AppState};
use lurker::tracker::{Database, Dispatcher, LineClient, Platform};

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = match Config::load(config_path.as_deref(), |name| std::env::var(name).ok()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            std::process::exit(1);
        }
    };

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("lurker.log"))
    {
        Ok(file) => file,
        Err(e) => {
            eprintln!("Failed to open log file in {}: {e}", log_dir.display());
            std::process::exit(1);
        }
    };
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    info!("🚀 Starting lurker...");
    if let Some(ref path) = config_path {
        info!("Loaded config from {}", path.display());
    }
    info!(
        "Inactivity threshold: {}s, sync attempts: {}",
        config.inactive_threshold.num_seconds(),
        config.sync_attempts
    );
    if config.bot_user_id.is_none() {
        warn!("LINE_BOT_USER_ID not set; the bot will be tracked as a group member");
    }

    let database = match Database::open(&config.database_path()) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to open database {:?}: {}", config.database_path(), e);
            std::process::exit(1);
        }
    };

    let platform: Arc<dyn Platform> =
        match LineClient::new(config.channel_access_token.clone(), config.api_base.clone()) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!("Failed to build LINE client: {}", e);
                std::process::exit(1);
            }
        };

    let dispatcher = Arc::new(Dispatcher::new(database, platform, config.tracker_config()));
    let state = AppState::new(&config.channel_secret, dispatcher);

    if let Err(e) = server::serve(config.port, state).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}
