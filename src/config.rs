use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Span of the provider's rolling transaction counts (`txns.m5`).
pub const PROVIDER_WINDOW_SECS: u64 = 300;

/// The volume z-score looks back at least this many polls.
pub const ZSCORE_SAMPLES: usize = 30;

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_poll_seconds")]
    pub poll_seconds: u64,
    #[serde(default)]
    pub watchlist: Vec<PairWatch>,
    #[serde(default)]
    pub signal: SignalConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub supabase: SupabaseConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_poll_seconds() -> u64 {
    20
}

/// One statically configured pair. Either `pair_address` or `token_address`
/// must be set; a token lookup resolves to its most liquid pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PairWatch {
    pub network: String,
    #[serde(default, alias = "tokenAddress")]
    pub token_address: Option<String>,
    #[serde(default, alias = "pairAddress")]
    pub pair_address: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

impl PairWatch {
    /// Dedup key for the watchlist: network plus whichever address is known.
    pub fn key(&self) -> String {
        let addr = self
            .pair_address
            .as_deref()
            .or(self.token_address.as_deref())
            .unwrap_or("");
        format!("{}:{}", self.network, addr.to_lowercase())
    }
}

// ---------------------------------------------------------------------------
// Signal engine config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct SignalConfig {
    #[serde(default = "default_windows")]
    pub windows: Vec<WindowThresholds>,
    #[serde(default)]
    pub weights: Weights,
    #[serde(default)]
    pub floors: Floors,
    #[serde(default)]
    pub anomaly: AnomalyConfig,
    /// Composite score (0-100) at or above which a pair is alert-worthy.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Alerts at or above this score are rendered as priority.
    #[serde(default = "default_priority_score")]
    pub priority_score: f64,
    /// Upper bound on each normalized component (metric / threshold).
    #[serde(default = "default_score_cap")]
    pub score_cap: f64,
    #[serde(default = "default_cooldown_seconds")]
    pub cooldown_seconds: u64,
}

fn default_min_score() -> f64 {
    45.0
}
fn default_priority_score() -> f64 {
    70.0
}
fn default_score_cap() -> f64 {
    3.0
}
fn default_cooldown_seconds() -> u64 {
    600
}

fn default_windows() -> Vec<WindowThresholds> {
    vec![
        WindowThresholds {
            seconds: 60,
            volume_ratio: 1.5,
            momentum_pct: 2.5,
            imbalance: 0.3,
            hard_volume_ratio: Some(4.0),
            hard_momentum_pct: Some(8.0),
            hard_imbalance: None,
        },
        WindowThresholds {
            seconds: 300,
            volume_ratio: 2.0,
            momentum_pct: 6.0,
            imbalance: 0.3,
            hard_volume_ratio: Some(4.0),
            hard_momentum_pct: Some(15.0),
            hard_imbalance: Some(0.8),
        },
    ]
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            weights: Weights::default(),
            floors: Floors::default(),
            anomaly: AnomalyConfig::default(),
            min_score: default_min_score(),
            priority_score: default_priority_score(),
            score_cap: default_score_cap(),
            cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

/// Thresholds for a single lookback window. Reaching `volume_ratio`,
/// `momentum_pct` or `imbalance` adds a reason; reaching a `hard_*` value
/// makes the pair alert-worthy on its own. The imbalance thresholds only
/// apply on the window chosen by [`SignalConfig::pressure_window`].
#[derive(Debug, Clone, Deserialize)]
pub struct WindowThresholds {
    pub seconds: u64,
    pub volume_ratio: f64,
    pub momentum_pct: f64,
    pub imbalance: f64,
    #[serde(default)]
    pub hard_volume_ratio: Option<f64>,
    #[serde(default)]
    pub hard_momentum_pct: Option<f64>,
    #[serde(default)]
    pub hard_imbalance: Option<f64>,
}

impl WindowThresholds {
    /// Short label used in reason text, e.g. `1m`, `5m`, `90s`.
    pub fn label(&self) -> String {
        window_label(self.seconds)
    }
}

pub fn window_label(seconds: u64) -> String {
    if seconds % 60 == 0 {
        format!("{}m", seconds / 60)
    } else {
        format!("{seconds}s")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Weights {
    pub volume: f64,
    pub momentum: f64,
    pub imbalance: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            volume: 0.4,
            momentum: 0.35,
            imbalance: 0.25,
        }
    }
}

impl Weights {
    pub fn total(&self) -> f64 {
        self.volume + self.momentum + self.imbalance
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Floors {
    #[serde(default = "default_min_liquidity_usd")]
    pub min_liquidity_usd: f64,
    #[serde(default)]
    pub min_volume_usd: f64,
    /// Buy/sell imbalance is ignored below this many transactions.
    #[serde(default = "default_min_txns")]
    pub min_txns: u64,
}

fn default_min_liquidity_usd() -> f64 {
    200_000.0
}
fn default_min_txns() -> u64 {
    20
}

impl Default for Floors {
    fn default() -> Self {
        Self {
            min_liquidity_usd: default_min_liquidity_usd(),
            min_volume_usd: 0.0,
            min_txns: default_min_txns(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnomalyConfig {
    /// z-score of the latest volume against retained history; 0 disables.
    #[serde(default = "default_volume_zscore")]
    pub volume_zscore: f64,
    #[serde(default)]
    pub hard_zscore: Option<f64>,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

fn default_volume_zscore() -> f64 {
    3.0
}
fn default_min_samples() -> usize {
    10
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            volume_zscore: default_volume_zscore(),
            hard_zscore: None,
            min_samples: default_min_samples(),
        }
    }
}

impl SignalConfig {
    /// Longest configured window in seconds; bounds the retained history.
    pub fn max_window_secs(&self) -> u64 {
        self.windows.iter().map(|w| w.seconds).max().unwrap_or(0)
    }

    /// Window whose thresholds judge buy pressure: the one closest to the
    /// provider's 5-minute transaction counts, the longer one on a tie.
    pub fn pressure_window(&self) -> Option<&WindowThresholds> {
        self.windows
            .iter()
            .min_by_key(|w| (w.seconds.abs_diff(PROVIDER_WINDOW_SECS), u64::MAX - w.seconds))
    }

    /// Snapshots kept per pair for the volume z-score.
    pub fn zscore_samples(&self) -> usize {
        self.anomaly.min_samples.max(ZSCORE_SAMPLES)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.windows.is_empty() {
            return Err(invalid("signal.windows must not be empty"));
        }
        let mut seen = HashSet::new();
        for w in &self.windows {
            let label = w.label();
            if w.seconds == 0 {
                return Err(invalid("window seconds must be positive"));
            }
            if !seen.insert(w.seconds) {
                return Err(invalid(format!("duplicate window {label}")));
            }
            for (name, value) in [
                ("volume_ratio", w.volume_ratio),
                ("momentum_pct", w.momentum_pct),
                ("imbalance", w.imbalance),
            ] {
                if !value.is_finite() || value <= 0.0 {
                    return Err(invalid(format!(
                        "window {label}: {name} must be positive, got {value}"
                    )));
                }
            }
            for (name, value) in [
                ("hard_volume_ratio", w.hard_volume_ratio),
                ("hard_momentum_pct", w.hard_momentum_pct),
                ("hard_imbalance", w.hard_imbalance),
            ] {
                if let Some(v) = value {
                    if !v.is_finite() || v <= 0.0 {
                        return Err(invalid(format!(
                            "window {label}: {name} must be positive, got {v}"
                        )));
                    }
                }
            }
        }

        let pressure = self.pressure_window().map(|w| w.seconds);
        if let Some(w) = self
            .windows
            .iter()
            .find(|w| w.hard_imbalance.is_some() && Some(w.seconds) != pressure)
        {
            return Err(invalid(format!(
                "window {}: hard_imbalance only applies on the buy pressure window {}",
                w.label(),
                window_label(pressure.unwrap_or(PROVIDER_WINDOW_SECS))
            )));
        }

        let w = &self.weights;
        for (name, value) in [
            ("volume", w.volume),
            ("momentum", w.momentum),
            ("imbalance", w.imbalance),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(invalid(format!("weight {name} must be positive, got {value}")));
            }
        }

        if !self.score_cap.is_finite() || self.score_cap <= 0.0 {
            return Err(invalid("score_cap must be positive"));
        }
        if !(0.0..=100.0).contains(&self.min_score) {
            return Err(invalid("min_score must be within 0..=100"));
        }
        if self.cooldown_seconds == 0 {
            return Err(invalid("cooldown_seconds must be positive"));
        }
        if self.floors.min_liquidity_usd < 0.0 || self.floors.min_volume_usd < 0.0 {
            return Err(invalid("floors must be non-negative"));
        }
        if self.anomaly.volume_zscore < 0.0 {
            return Err(invalid("anomaly.volume_zscore must be >= 0"));
        }
        if self.anomaly.min_samples < 2 {
            return Err(invalid("anomaly.min_samples must be at least 2"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Collaborator config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_discovery_networks")]
    pub networks: Vec<String>,
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    #[serde(default = "default_discovery_liquidity")]
    pub min_liquidity_usd: f64,
    #[serde(default = "default_discovery_volume")]
    pub min_volume_m5_usd: f64,
    #[serde(default = "default_min_txns")]
    pub min_txns_m5: u64,
    #[serde(default = "default_exclude_symbols")]
    pub exclude_symbols: Vec<String>,
    #[serde(default = "default_refresh_seconds")]
    pub refresh_seconds: u64,
    #[serde(default = "default_discovery_path")]
    pub path: String,
}

fn default_discovery_networks() -> Vec<String> {
    vec!["bsc".into()]
}
fn default_top_n() -> usize {
    50
}
fn default_discovery_liquidity() -> f64 {
    100_000.0
}
fn default_discovery_volume() -> f64 {
    10_000.0
}
fn default_exclude_symbols() -> Vec<String> {
    ["USDT", "USDC", "BUSD", "DAI", "FDUSD", "TUSD"]
        .into_iter()
        .map(String::from)
        .collect()
}
fn default_refresh_seconds() -> u64 {
    120
}
fn default_discovery_path() -> String {
    "/latest/dex/trending".into()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            networks: default_discovery_networks(),
            top_n: default_top_n(),
            min_liquidity_usd: default_discovery_liquidity(),
            min_volume_m5_usd: default_discovery_volume(),
            min_txns_m5: default_min_txns(),
            exclude_symbols: default_exclude_symbols(),
            refresh_seconds: default_refresh_seconds(),
            path: default_discovery_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "https://api.dexscreener.com".into()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_retries() -> u32 {
    3
}
fn default_max_concurrency() -> usize {
    8
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (compatible; dex-pulse/0.1)".into()
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            retries: default_retries(),
            max_concurrency: default_max_concurrency(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub anon_key: Option<String>,
    #[serde(default = "default_table")]
    pub table_alerts: String,
}

fn default_table() -> String {
    "alerts".into()
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            anon_key: None,
            table_alerts: default_table(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "data/alerts.db".into()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    3001
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Secrets and deployment knobs may come from the environment (or `.env`)
    /// instead of the config file.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup("TELEGRAM_BOT_TOKEN") {
            self.telegram.bot_token = Some(token);
        }
        if let Some(chat) = lookup("TELEGRAM_CHAT_ID") {
            self.telegram.chat_id = Some(chat);
        }
        if let Some(url) = lookup("SUPABASE_URL") {
            self.supabase.url = Some(url);
        }
        if let Some(key) = lookup("SUPABASE_ANON_KEY") {
            self.supabase.anon_key = Some(key);
        }
        if let Some(path) = lookup("ALERT_DB_PATH") {
            self.store.path = path;
        }
        if let Some(port) = lookup("API_PORT").and_then(|p| p.parse().ok()) {
            self.api.port = port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_seconds == 0 {
            return Err(invalid("poll_seconds must be positive"));
        }
        self.signal.validate()?;
        for w in &self.watchlist {
            if w.pair_address.is_none() && w.token_address.is_none() {
                return Err(invalid(format!(
                    "watchlist entry on {} needs pair_address or token_address",
                    w.network
                )));
            }
        }
        if self.discovery.enabled && self.discovery.refresh_seconds == 0 {
            return Err(invalid("discovery.refresh_seconds must be positive"));
        }
        if self.provider.max_concurrency == 0 {
            return Err(invalid("provider.max_concurrency must be positive"));
        }
        if self.api.enabled && !self.store.enabled {
            return Err(invalid("api.enabled requires store.enabled"));
        }
        Ok(())
    }
}
