use serde::Serialize;

/// One observation of a pair at a point in time.
///
/// `volume_m5`, `buys_m5` and `sells_m5` are the provider's own rolling
/// 5-minute figures, not cumulative counters.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Snapshot {
    pub pair_id: String,
    pub network: String,
    pub pair_address: Option<String>,
    pub symbol: Option<String>,
    pub price_usd: f64,
    pub liquidity_usd: f64,
    pub volume_m5: f64,
    pub buys_m5: u64,
    pub sells_m5: u64,
    /// Epoch seconds.
    pub observed_at: i64,
    pub link: Option<String>,
}

impl Snapshot {
    /// Pair identifier used to key history and alert state.
    pub fn pair_key(network: &str, pair_address: &str) -> String {
        format!("{network}:{}", pair_address.to_lowercase())
    }

    pub fn txns(&self) -> u64 {
        self.buys_m5 + self.sells_m5
    }

    /// Clamps negative or non-finite provider values to zero so that stored
    /// history never carries a negative price or liquidity.
    pub fn sanitized(mut self) -> Self {
        self.price_usd = non_negative(self.price_usd);
        self.liquidity_usd = non_negative(self.liquidity_usd);
        self.volume_m5 = non_negative(self.volume_m5);
        self
    }
}

fn non_negative(v: f64) -> f64 {
    if v.is_finite() && v > 0.0 { v } else { 0.0 }
}

#[cfg(test)]
pub(crate) fn test_snapshot(pair: &str, ts: i64, price: f64, volume: f64) -> Snapshot {
    Snapshot {
        pair_id: pair.to_string(),
        network: "bsc".into(),
        pair_address: Some(pair.trim_start_matches("bsc:").to_string()),
        symbol: Some("TEST/WBNB".into()),
        price_usd: price,
        liquidity_usd: 500_000.0,
        volume_m5: volume,
        buys_m5: 30,
        sells_m5: 30,
        observed_at: ts,
        link: None,
    }
}
