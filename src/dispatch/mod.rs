//! Fan-out of emitted alerts: Telegram, Supabase, the local SQLite log and
//! the live WebSocket stream. Sinks fail independently and are never retried.

pub mod store;
pub mod supabase;
pub mod telegram;

use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::AppConfig;
use crate::engine::AlertRecord;
use store::AlertDb;
use supabase::SupabaseSink;
use telegram::TelegramNotifier;

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{sink} rejected the alert ({status}): {body}")]
    Rejected {
        sink: &'static str,
        status: u16,
        body: String,
    },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("sqlite: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub struct AlertDispatcher {
    telegram: TelegramNotifier,
    supabase: Option<SupabaseSink>,
    store: Option<AlertDb>,
    alert_tx: broadcast::Sender<AlertRecord>,
    priority_score: f64,
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

impl AlertDispatcher {
    pub fn new(
        telegram: TelegramNotifier,
        supabase: Option<SupabaseSink>,
        store: Option<AlertDb>,
        alert_tx: broadcast::Sender<AlertRecord>,
        priority_score: f64,
    ) -> Self {
        Self {
            telegram,
            supabase,
            store,
            alert_tx,
            priority_score,
        }
    }

    pub fn from_config(
        config: &AppConfig,
        store: Option<AlertDb>,
        alert_tx: broadcast::Sender<AlertRecord>,
    ) -> Result<Self, DispatchError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        let telegram = TelegramNotifier::new(&config.telegram, http.clone());
        let supabase = SupabaseSink::from_config(&config.supabase, http);
        tracing::info!(
            "Alert sinks: telegram {}, supabase {}, local log {}",
            on_off(telegram.is_ready()),
            on_off(supabase.is_some()),
            on_off(store.is_some()),
        );
        Ok(Self::new(
            telegram,
            supabase,
            store,
            alert_tx,
            config.signal.priority_score,
        ))
    }

    /// Delivers one record to every sink. Failures are logged and returned;
    /// they never stop the remaining sinks.
    pub async fn dispatch(&self, record: &AlertRecord) -> Vec<DispatchError> {
        let mut failures = Vec::new();
        let name = record.display_name();

        let text = telegram::render_message(record, self.priority_score);
        if let Err(e) = self.telegram.send(&text).await {
            tracing::warn!("{name}: telegram delivery failed: {e}");
            failures.push(e);
        }

        if let Some(sink) = &self.supabase {
            if let Err(e) = sink.insert(record).await {
                tracing::warn!("{name}: supabase insert failed: {e}");
                failures.push(e);
            }
        }

        if let Some(db) = &self.store {
            let conn = db.lock().unwrap_or_else(|p| p.into_inner());
            if let Err(e) = store::insert_alert(&conn, record) {
                tracing::warn!("{name}: alert log insert failed: {e}");
                failures.push(e.into());
            }
        }

        // No subscribers is normal when the API is off
        if self.alert_tx.send(record.clone()).is_err() {
            tracing::debug!("{name}: no live subscribers");
        }

        failures
    }
}
