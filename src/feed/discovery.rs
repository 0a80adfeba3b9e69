use super::dexscreener::{DexScreenerClient, PairDto};
use crate::config::{DiscoveryConfig, PairWatch};

/// Applies the discovery filters to a trending listing. Every filter must
/// hold; the first `top_n` survivors are returned in listing order.
pub fn select_pairs(pairs: &[PairDto], config: &DiscoveryConfig) -> Vec<PairWatch> {
    let excluded = |symbol: Option<&str>| {
        symbol.is_some_and(|s| {
            config
                .exclude_symbols
                .iter()
                .any(|x| x.eq_ignore_ascii_case(s))
        })
    };

    pairs
        .iter()
        .filter(|p| config.networks.is_empty() || config.networks.contains(&p.chain_id))
        .filter(|p| !excluded(p.base_symbol()) && !excluded(p.quote_symbol()))
        .filter(|p| p.liquidity_usd() >= config.min_liquidity_usd)
        .filter(|p| p.volume_m5() >= config.min_volume_m5_usd)
        .filter(|p| {
            let (buys, sells) = p.txns_m5();
            buys + sells >= config.min_txns_m5
        })
        .filter_map(|p| {
            let pair_address = p.pair_address.clone().filter(|a| !a.is_empty())?;
            Some(PairWatch {
                network: p.chain_id.clone(),
                token_address: None,
                pair_address: Some(pair_address),
                note: p.base_symbol().map(String::from),
            })
        })
        .take(config.top_n)
        .collect()
}

/// Fetches the trending listing and filters it. A failed fetch yields an
/// empty set so the static watchlist keeps running.
pub async fn discover(client: &DexScreenerClient, config: &DiscoveryConfig) -> Vec<PairWatch> {
    if !config.enabled {
        return Vec::new();
    }
    match client.fetch_listing(&config.path).await {
        Ok(pairs) => {
            let found = select_pairs(&pairs, config);
            tracing::info!(
                "Discovery: {} of {} listed pairs passed filters",
                found.len(),
                pairs.len()
            );
            found
        }
        Err(e) => {
            tracing::warn!("Discovery failed: {e}");
            Vec::new()
        }
    }
}
