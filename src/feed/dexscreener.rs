use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;

use super::FeedError;
use crate::config::{PairWatch, ProviderConfig};
use crate::engine::Snapshot;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// DexScreener sometimes sends numbers as strings (`priceUsd`) and sometimes
/// as plain numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Num {
    Float(f64),
    Text(String),
}

impl Num {
    pub fn value(&self) -> f64 {
        match self {
            Num::Float(v) => *v,
            Num::Text(s) => s.trim().parse().unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PairDto {
    #[serde(rename = "chainId", alias = "chain", default)]
    pub chain_id: String,
    #[serde(rename = "pairAddress", default)]
    pub pair_address: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "baseToken", default)]
    pub base_token: Option<TokenDto>,
    #[serde(rename = "quoteToken", default)]
    pub quote_token: Option<TokenDto>,
    #[serde(rename = "priceUsd", default)]
    pub price_usd: Option<Num>,
    #[serde(default)]
    pub txns: Option<TxnsDto>,
    #[serde(default)]
    pub volume: Option<VolumeDto>,
    #[serde(default)]
    pub liquidity: Option<LiquidityDto>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenDto {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub symbol: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxnsDto {
    #[serde(default)]
    pub m5: Option<TxnCountDto>,
}

/// Counts are sometimes `null` on fresh pairs.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TxnCountDto {
    #[serde(default)]
    pub buys: Option<u64>,
    #[serde(default)]
    pub sells: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VolumeDto {
    #[serde(default)]
    pub m5: Option<Num>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LiquidityDto {
    #[serde(default)]
    pub usd: Option<Num>,
}

/// Envelope shared by the pairs, tokens and trending endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PairsResponse {
    #[serde(default)]
    pub pairs: Option<Vec<PairDto>>,
    #[serde(default)]
    pub pair: Option<PairDto>,
    #[serde(rename = "trendingPairs", default)]
    pub trending_pairs: Option<Vec<PairDto>>,
}

impl PairsResponse {
    pub fn into_pairs(self) -> Vec<PairDto> {
        match (self.pairs, self.trending_pairs, self.pair) {
            (Some(pairs), _, _) if !pairs.is_empty() => pairs,
            (_, Some(trending), _) if !trending.is_empty() => trending,
            (_, _, Some(pair)) => vec![pair],
            _ => Vec::new(),
        }
    }
}

impl PairDto {
    pub fn liquidity_usd(&self) -> f64 {
        self.liquidity
            .as_ref()
            .and_then(|l| l.usd.as_ref())
            .map_or(0.0, Num::value)
    }

    pub fn volume_m5(&self) -> f64 {
        self.volume
            .as_ref()
            .and_then(|v| v.m5.as_ref())
            .map_or(0.0, Num::value)
    }

    pub fn txns_m5(&self) -> (u64, u64) {
        self.txns
            .as_ref()
            .and_then(|t| t.m5.as_ref())
            .map_or((0, 0), |c| (c.buys.unwrap_or(0), c.sells.unwrap_or(0)))
    }

    pub fn price_usd(&self) -> f64 {
        self.price_usd.as_ref().map_or(0.0, Num::value)
    }

    pub fn base_symbol(&self) -> Option<&str> {
        self.base_token.as_ref()?.symbol.as_deref()
    }

    pub fn quote_symbol(&self) -> Option<&str> {
        self.quote_token.as_ref()?.symbol.as_deref()
    }

    /// `BASE/QUOTE`, or whichever half is known.
    pub fn symbol(&self) -> Option<String> {
        match (self.base_symbol(), self.quote_symbol()) {
            (Some(base), Some(quote)) => Some(format!("{base}/{quote}")),
            (Some(one), None) | (None, Some(one)) => Some(one.to_string()),
            (None, None) => None,
        }
    }

    pub fn to_snapshot(&self, fallback_network: &str, observed_at: i64) -> Result<Snapshot, FeedError> {
        let network = if self.chain_id.is_empty() {
            fallback_network
        } else {
            self.chain_id.as_str()
        };
        let pair_address = self
            .pair_address
            .clone()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| FeedError::MissingPairAddress(network.to_string()))?;
        let link = self
            .url
            .clone()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| format!("https://dexscreener.com/{network}/{pair_address}"));
        let (buys_m5, sells_m5) = self.txns_m5();

        let snapshot = Snapshot {
            pair_id: Snapshot::pair_key(network, &pair_address),
            network: network.to_string(),
            pair_address: Some(pair_address),
            symbol: self.symbol(),
            price_usd: self.price_usd(),
            liquidity_usd: self.liquidity_usd(),
            volume_m5: self.volume_m5(),
            buys_m5,
            sells_m5,
            observed_at,
            link: Some(link),
        };
        Ok(snapshot.sanitized())
    }
}

/// Picks the most liquid pair, preferring pairs on the watched network.
pub fn most_liquid(pairs: Vec<PairDto>, network: &str) -> Option<PairDto> {
    let on_network = pairs.iter().any(|p| p.chain_id == network);
    pairs
        .into_iter()
        .filter(|p| !on_network || p.chain_id == network)
        .max_by(|a, b| a.liquidity_usd().total_cmp(&b.liquidity_usd()))
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct DexScreenerClient {
    http: reqwest::Client,
    base_url: String,
    retries: u32,
    retry_delay: Duration,
    max_concurrency: usize,
}

impl DexScreenerClient {
    pub fn new(config: &ProviderConfig) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.as_str())
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retries: config.retries.max(1),
            retry_delay: Duration::from_secs(1),
            max_concurrency: config.max_concurrency.max(1),
        })
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn watch_url(&self, watch: &PairWatch) -> Result<String, FeedError> {
        let base = &self.base_url;
        if let Some(pair) = watch.pair_address.as_deref().filter(|a| !a.is_empty()) {
            return Ok(format!("{base}/latest/dex/pairs/{}/{pair}", watch.network));
        }
        if let Some(token) = watch.token_address.as_deref().filter(|a| !a.is_empty()) {
            return Ok(format!("{base}/latest/dex/tokens/{token}"));
        }
        Err(FeedError::MissingAddress(watch.network.clone()))
    }

    async fn try_get<T: DeserializeOwned>(&self, url: &str) -> Result<T, FeedError> {
        let resp = self.http.get(url).send().await?.error_for_status()?;
        Ok(resp.json::<T>().await?)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FeedError> {
        let mut attempt = 1;
        loop {
            match self.try_get(url).await {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.retries => {
                    tracing::warn!("GET {url} failed (attempt {attempt}/{}): {e}", self.retries);
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn fetch_pair(&self, watch: &PairWatch) -> Result<PairDto, FeedError> {
        let url = self.watch_url(watch)?;
        let response: PairsResponse = self.get_json(&url).await?;
        most_liquid(response.into_pairs(), &watch.network).ok_or(FeedError::NoPairs(url))
    }

    pub async fn fetch_snapshot(&self, watch: &PairWatch, observed_at: i64) -> Result<Snapshot, FeedError> {
        let pair = self.fetch_pair(watch).await?;
        pair.to_snapshot(&watch.network, observed_at)
    }

    /// Fetches every watch concurrently, at most `max_concurrency` in flight.
    /// Results keep the order of `watches`; all snapshots carry `observed_at`.
    pub async fn fetch_all(
        &self,
        watches: &[PairWatch],
        observed_at: i64,
    ) -> Vec<(PairWatch, Result<Snapshot, FeedError>)> {
        let sem = Arc::new(Semaphore::new(self.max_concurrency));
        let mut handles = Vec::with_capacity(watches.len());

        for watch in watches {
            let client = self.clone();
            let watch = watch.clone();
            let sem = Arc::clone(&sem);
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                let result = client.fetch_snapshot(&watch, observed_at).await;
                (watch, result)
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!("fetch task failed: {e}"),
            }
        }
        results
    }

    pub async fn fetch_listing(&self, path: &str) -> Result<Vec<PairDto>, FeedError> {
        let url = format!("{}{path}", self.base_url);
        let response: PairsResponse = self.get_json(&url).await?;
        Ok(response.into_pairs())
    }
}
