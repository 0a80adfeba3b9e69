use serde::{Deserialize, Serialize};

use super::scorer::Signal;

/// Final emitted unit. Field names match the persisted `alerts` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlertRecord {
    pub ts: i64,
    pub network: String,
    pub pair_address: Option<String>,
    pub symbol: Option<String>,
    pub price_usd: f64,
    pub liquidity_usd: f64,
    pub score: i64,
    pub reasons: String,
    pub link: Option<String>,
}

impl AlertRecord {
    pub fn from_signal(signal: &Signal, ts: i64) -> Self {
        let snap = &signal.snapshot;
        Self {
            ts,
            network: snap.network.clone(),
            pair_address: snap.pair_address.clone(),
            symbol: snap.symbol.clone(),
            price_usd: snap.price_usd,
            liquidity_usd: snap.liquidity_usd,
            score: signal.score.round() as i64,
            reasons: signal.reasons_text(),
            link: snap.link.clone(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.symbol
            .as_deref()
            .or(self.pair_address.as_deref())
            .unwrap_or("unknown")
    }
}
