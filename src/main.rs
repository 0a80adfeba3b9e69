use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, bail};
use clap::Parser;
use tokio::sync::{RwLock, broadcast};
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod dispatch;
mod engine;
mod feed;
mod runner;

use api::server::{AppState, SharedWatchlist};
use config::{AppConfig, LoggingConfig};
use dispatch::AlertDispatcher;
use dispatch::supabase::SupabaseSink;
use dispatch::telegram::TelegramNotifier;
use engine::AlertRecord;
use feed::DexScreenerClient;
use runner::Runner;

const DEFAULT_CONFIG: &str = "config.toml";
const EXAMPLE_CONFIG: &str = "config.example.toml";

#[derive(Parser, Debug)]
#[command(author, version, about = "Watches DEX pairs and alerts on volume, momentum and buy-pressure spikes")]
struct Cli {
    /// Path to the TOML config
    #[arg(long, default_value = DEFAULT_CONFIG)]
    config: PathBuf,

    /// Run a single poll cycle and exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Insert a test row into Supabase and exit
    #[arg(long, default_value_t = false)]
    test_supabase: bool,

    /// Send a test Telegram message and exit
    #[arg(long, num_args = 0..=1, default_missing_value = "dex-pulse test message")]
    test_telegram: Option<String>,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    if logging.json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Falls back to the bundled example when the default config is missing.
fn resolve_config_path(requested: &Path) -> &Path {
    let example = Path::new(EXAMPLE_CONFIG);
    if requested == Path::new(DEFAULT_CONFIG) && !requested.exists() && example.exists() {
        example
    } else {
        requested
    }
}

async fn test_supabase(config: &AppConfig) -> anyhow::Result<()> {
    let Some(sink) = SupabaseSink::from_config(&config.supabase, reqwest::Client::new()) else {
        bail!("supabase is disabled or missing url/anon_key");
    };
    let record = AlertRecord {
        ts: chrono::Utc::now().timestamp(),
        network: "test".into(),
        pair_address: Some("0xtest".into()),
        symbol: Some("TEST/USD".into()),
        price_usd: 1.0,
        liquidity_usd: 0.0,
        score: 0,
        reasons: "manual test".into(),
        link: None,
    };
    sink.insert(&record).await?;
    tracing::info!("Supabase test row inserted into {}", sink.endpoint());
    Ok(())
}

async fn test_telegram(config: &AppConfig, text: &str) -> anyhow::Result<()> {
    let mut telegram = config.telegram.clone();
    telegram.enabled = true;
    let mut notifier = TelegramNotifier::new(&telegram, reqwest::Client::new());

    if notifier.chat_id().is_none() {
        let Some(chat_id) = notifier.discover_chat_id().await? else {
            bail!("no chat_id configured and none found; message the bot first");
        };
        tracing::info!("Discovered Telegram chat_id {chat_id}, set TELEGRAM_CHAT_ID to keep it");
        notifier = notifier.with_chat_id(chat_id);
    }

    if !notifier.send(text).await? {
        bail!("telegram bot_token missing");
    }
    tracing::info!("Telegram test message sent");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let path = resolve_config_path(&cli.config);
    let config =
        AppConfig::load(path).with_context(|| format!("loading config {}", path.display()))?;
    init_tracing(&config.logging);
    tracing::info!("Loaded config from {}", path.display());

    if cli.test_supabase {
        return test_supabase(&config).await;
    }
    if let Some(text) = cli.test_telegram.as_deref() {
        return test_telegram(&config, text).await;
    }

    let store = if config.store.enabled {
        let conn = dispatch::store::open_store(&config.store.path)
            .with_context(|| format!("opening alert log {}", config.store.path))?;
        Some(Arc::new(Mutex::new(conn)))
    } else {
        None
    };

    let (alert_tx, _) = broadcast::channel::<AlertRecord>(256);
    let published: SharedWatchlist = Arc::new(RwLock::new(config.watchlist.clone()));

    if let (true, Some(db)) = (config.api.enabled, &store) {
        let state = AppState {
            db: Arc::clone(db),
            alert_tx: alert_tx.clone(),
            watchlist: Arc::clone(&published),
            started_at: chrono::Utc::now().timestamp(),
        };
        let port = config.api.port;
        tokio::spawn(async move {
            if let Err(e) = api::server::run(state, port).await {
                tracing::error!("API server failed: {e}");
            }
        });
    }

    let client = DexScreenerClient::new(&config.provider)?;
    let dispatcher = AlertDispatcher::from_config(&config, store, alert_tx)?;

    tracing::info!(
        "Watching {} static pairs every {}s (discovery {})",
        config.watchlist.len(),
        config.poll_seconds,
        if config.discovery.enabled { "on" } else { "off" }
    );
    Runner::new(config, client, dispatcher, published)?
        .run(cli.once)
        .await;
    Ok(())
}
