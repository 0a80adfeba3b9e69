use std::time::Duration;

use crate::api::server::SharedWatchlist;
use crate::config::{AppConfig, ConfigError};
use crate::dispatch::AlertDispatcher;
use crate::engine::{CycleReport, SignalEngine};
use crate::feed::{DexScreenerClient, Watchlist, discovery};

/// Drives poll cycles: refresh discovery, fetch snapshots, evaluate, dispatch.
pub struct Runner {
    config: AppConfig,
    engine: SignalEngine,
    client: DexScreenerClient,
    watchlist: Watchlist,
    dispatcher: AlertDispatcher,
    published: SharedWatchlist,
}

impl Runner {
    pub fn new(
        config: AppConfig,
        client: DexScreenerClient,
        dispatcher: AlertDispatcher,
        published: SharedWatchlist,
    ) -> Result<Self, ConfigError> {
        let engine = SignalEngine::new(config.signal.clone())?;
        let watchlist = Watchlist::new(config.watchlist.clone(), config.discovery.refresh_seconds);
        Ok(Self {
            config,
            engine,
            client,
            watchlist,
            dispatcher,
            published,
        })
    }

    pub async fn cycle(&mut self, now: i64) -> CycleReport {
        if self.config.discovery.enabled && self.watchlist.refresh_due(now) {
            let found = discovery::discover(&self.client, &self.config.discovery).await;
            self.watchlist.set_discovered(found, now);
        }

        let entries = self.watchlist.entries();
        *self.published.write().await = entries.clone();
        if entries.is_empty() {
            tracing::warn!("Watchlist is empty, nothing to poll");
            return CycleReport::default();
        }

        let mut snapshots = Vec::with_capacity(entries.len());
        let mut fetch_failures = 0;
        for (watch, result) in self.client.fetch_all(&entries, now).await {
            match result {
                Ok(snapshot) => {
                    self.watchlist.record_resolution(&watch, &snapshot.pair_id);
                    snapshots.push(snapshot);
                }
                Err(e) => {
                    fetch_failures += 1;
                    tracing::warn!("{}: fetch failed, skipped this cycle: {e}", watch.key());
                }
            }
        }

        self.engine.retain_pairs(&self.watchlist.pair_ids(), now);
        let report = self.engine.run_cycle(snapshots, now);

        for record in &report.alerts {
            self.dispatcher.dispatch(record).await;
        }

        tracing::info!(
            "Cycle done: {} watched, {} evaluated, {} warming up, {} suppressed, {} alerts, {} failed",
            entries.len(),
            report.evaluated,
            report.warming_up,
            report.suppressed,
            report.alerts.len(),
            fetch_failures + report.skipped,
        );
        tracing::debug!(
            "Engine state: {} pair histories, {} pairs with alert state",
            self.engine.tracked_pairs(),
            self.engine.alerted_pairs()
        );
        report
    }

    /// Runs until Ctrl-C, which is only observed between cycles.
    pub async fn run(mut self, once: bool) {
        let poll = Duration::from_secs(self.config.poll_seconds);
        loop {
            self.cycle(chrono::Utc::now().timestamp()).await;
            if once {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl-C received, shutting down");
                    break;
                }
            }
        }
    }
}
