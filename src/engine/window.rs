use std::collections::{HashMap, HashSet, VecDeque};

use statrs::statistics::Statistics;

use super::snapshot::Snapshot;
use crate::config::{AnomalyConfig, SignalConfig};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AggregateError {
    #[error("snapshot for {pair_id} at {observed_at} is not newer than stored {latest}")]
    OutOfOrder {
        pair_id: String,
        observed_at: i64,
        latest: i64,
    },
}

// ---------------------------------------------------------------------------
// Derived metrics
// ---------------------------------------------------------------------------

/// Deltas over one lookback window. All zero when fewer than two snapshots
/// fall inside the window.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowMetrics {
    pub window_secs: u64,
    /// Snapshots inside the window, current one included.
    pub samples: usize,
    /// Seconds between the reference snapshot and the current one.
    pub span_secs: i64,
    pub volume_delta: f64,
    pub volume_ratio: f64,
    pub momentum_pct: f64,
}

impl WindowMetrics {
    fn neutral(window_secs: u64, samples: usize) -> Self {
        Self {
            window_secs,
            samples,
            span_secs: 0,
            volume_delta: 0.0,
            volume_ratio: 0.0,
            momentum_pct: 0.0,
        }
    }

    pub fn is_warm(&self) -> bool {
        self.samples >= 2
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DerivedMetrics {
    pub pair_id: String,
    /// Same order as the configured windows.
    pub windows: Vec<WindowMetrics>,
    /// (buys - sells) / (buys + sells) from the provider's 5-minute counts,
    /// within [-1, 1]. The same for every window, so it is judged once.
    pub imbalance: f64,
    /// z-score of the latest volume against the last polls.
    pub volume_zscore: f64,
    pub snapshot: Snapshot,
}

impl DerivedMetrics {
    pub fn txns(&self) -> u64 {
        self.snapshot.txns()
    }
}

// ---------------------------------------------------------------------------
// Per-pair history
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
pub struct PairHistory {
    entries: VecDeque<Snapshot>,
    /// Latest volumes, bounded by count rather than age.
    volumes: VecDeque<f64>,
}

impl PairHistory {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn latest(&self) -> Option<&Snapshot> {
        self.entries.back()
    }

    fn push(&mut self, snapshot: Snapshot, retention_secs: i64, volume_samples: usize) {
        let now = snapshot.observed_at;
        self.volumes.push_back(snapshot.volume_m5);
        while self.volumes.len() > volume_samples {
            self.volumes.pop_front();
        }
        self.entries.push_back(snapshot);
        while let Some(front) = self.entries.front() {
            if now - front.observed_at > retention_secs {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    fn window_metrics(&self, window_secs: u64) -> WindowMetrics {
        let Some(current) = self.entries.back() else {
            return WindowMetrics::neutral(window_secs, 0);
        };
        let now = current.observed_at;
        let in_window: Vec<&Snapshot> = self
            .entries
            .iter()
            .filter(|s| now - s.observed_at <= window_secs as i64)
            .collect();

        if in_window.len() < 2 {
            return WindowMetrics::neutral(window_secs, in_window.len());
        }

        // Oldest retained snapshot still inside the window
        let reference = in_window[0];

        let volume_ratio = if reference.volume_m5 > 0.0 {
            current.volume_m5 / reference.volume_m5
        } else {
            0.0
        };
        let momentum_pct = if reference.price_usd > 0.0 {
            (current.price_usd - reference.price_usd) / reference.price_usd * 100.0
        } else {
            0.0
        };

        WindowMetrics {
            window_secs,
            samples: in_window.len(),
            span_secs: now - reference.observed_at,
            volume_delta: current.volume_m5 - reference.volume_m5,
            volume_ratio,
            momentum_pct,
        }
    }

    fn volume_zscore(&self, anomaly: &AnomalyConfig) -> f64 {
        if self.volumes.len() < anomaly.min_samples {
            return 0.0;
        }
        let Some(&last) = self.volumes.back() else {
            return 0.0;
        };
        let mean = self.volumes.iter().mean();
        let mut sd = self.volumes.iter().population_std_dev();
        if !sd.is_finite() || sd == 0.0 {
            sd = 1e-9;
        }
        (last - mean) / sd
    }
}

pub fn imbalance(buys: u64, sells: u64) -> f64 {
    let total = buys + sells;
    if total == 0 {
        return 0.0;
    }
    ((buys as f64 - sells as f64) / total as f64).clamp(-1.0, 1.0)
}

// ---------------------------------------------------------------------------
// Aggregator
// ---------------------------------------------------------------------------

/// Owns every pair's bounded history and derives windowed metrics on ingest.
pub struct WindowAggregator {
    windows: Vec<u64>,
    retention_secs: i64,
    volume_samples: usize,
    anomaly: AnomalyConfig,
    histories: HashMap<String, PairHistory>,
}

impl WindowAggregator {
    pub fn new(config: &SignalConfig) -> Self {
        Self {
            windows: config.windows.iter().map(|w| w.seconds).collect(),
            retention_secs: config.max_window_secs() as i64,
            volume_samples: config.zscore_samples(),
            anomaly: config.anomaly.clone(),
            histories: HashMap::new(),
        }
    }

    pub fn ingest(
        &mut self,
        pair_id: &str,
        snapshot: Snapshot,
    ) -> Result<DerivedMetrics, AggregateError> {
        let history = self.histories.entry(pair_id.to_string()).or_default();

        if let Some(latest) = history.latest() {
            if snapshot.observed_at <= latest.observed_at {
                return Err(AggregateError::OutOfOrder {
                    pair_id: pair_id.to_string(),
                    observed_at: snapshot.observed_at,
                    latest: latest.observed_at,
                });
            }
        }

        let current = snapshot.clone();
        history.push(snapshot, self.retention_secs, self.volume_samples);

        let windows: Vec<WindowMetrics> = self
            .windows
            .iter()
            .map(|&w| history.window_metrics(w))
            .collect();

        if windows.iter().all(|w| !w.is_warm()) {
            tracing::debug!(
                "{pair_id}: warming up ({} snapshot(s) retained)",
                history.len()
            );
        }

        Ok(DerivedMetrics {
            pair_id: pair_id.to_string(),
            windows,
            imbalance: imbalance(current.buys_m5, current.sells_m5),
            volume_zscore: history.volume_zscore(&self.anomaly),
            snapshot: current,
        })
    }

    #[cfg(test)]
    pub fn history(&self, pair_id: &str) -> Option<&PairHistory> {
        self.histories.get(pair_id)
    }

    /// Drops histories of pairs that are no longer watched.
    pub fn retain_pairs(&mut self, keep: &HashSet<String>) {
        self.histories.retain(|pair, _| keep.contains(pair));
    }

    pub fn tracked_pairs(&self) -> usize {
        self.histories.len()
    }
}
