mod bot;
mod config;
mod monitor;
mod platform;
mod storage;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bot::AppState;
use crate::config::Config;
use crate::monitor::Monitor;
use crate::platform::telegram::{TelegramClient, TelegramNotifier};
use crate::storage::Store;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,groupwatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Static admins: {:?}", config.telegram.admin_ids);
    info!("  Database: {}", config.storage.database_path.display());
    info!("  Join delay: {}s", config.monitor.join_delay_secs);

    let store = Store::open(&config.storage.database_path)?;

    let admin_bot = teloxide::Bot::new(&config.telegram.bot_token);
    let notifier = Arc::new(TelegramNotifier::new(admin_bot.clone()));
    let client = Arc::new(TelegramClient::new(&config.watcher.bot_token)?);

    let mut monitor = Monitor::new(
        client,
        notifier,
        store.clone(),
        config.telegram.admin_ids.clone(),
        config.monitor.clone(),
    );
    // The monitor halts only when nothing can be monitored; the admin bot keeps
    // running so groups can still be added before a restart.
    let monitor_task = tokio::spawn(async move {
        if let Err(e) = monitor.run().await {
            error!("Monitor stopped ({:?}): {}", monitor.state(), e);
        }
    });

    let state = Arc::new(AppState::new(store, config.telegram.admin_ids.clone()));

    tokio::select! {
        result = bot::run(admin_bot, state) => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
    }

    monitor_task.abort();
    info!("Stopped");
    Ok(())
}
