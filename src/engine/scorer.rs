//! Composite scoring of windowed metrics.
//!
//! Each metric is normalized against its own threshold (`metric / threshold`,
//! capped at `score_cap`), the strongest window wins per component, and the
//! weighted components are scaled to 0-100. Reasons are collected per window
//! whenever a single metric reaches its threshold, whatever the composite.
//! Buy pressure comes from the provider's 5-minute counts, so it is judged
//! once, on the pressure window, and reported as `5m`.

use std::fmt;

use serde::Serialize;

use super::snapshot::Snapshot;
use super::window::DerivedMetrics;
use crate::config::{PROVIDER_WINDOW_SECS, SignalConfig, window_label};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonKind {
    VolumeSpike,
    Momentum,
    BuyPressure,
    VolumeAnomaly,
}

impl ReasonKind {
    pub fn label(self) -> &'static str {
        match self {
            ReasonKind::VolumeSpike => "volume spike",
            ReasonKind::Momentum => "momentum",
            ReasonKind::BuyPressure => "buy pressure",
            ReasonKind::VolumeAnomaly => "volume anomaly",
        }
    }

    /// Inverse of [`ReasonKind::label`], matched on the start of a reason.
    pub fn from_text(text: &str) -> Option<Self> {
        [
            ReasonKind::VolumeSpike,
            ReasonKind::Momentum,
            ReasonKind::BuyPressure,
            ReasonKind::VolumeAnomaly,
        ]
        .into_iter()
        .find(|kind| text.trim_start().starts_with(kind.label()))
    }
}

/// A single metric that reached its threshold. `window_secs` is `None` for
/// history-wide metrics such as the volume z-score.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Reason {
    pub kind: ReasonKind,
    pub window_secs: Option<u64>,
    pub value: f64,
    pub threshold: f64,
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let window = match self.window_secs {
            Some(secs) => format!(" {}", window_label(secs)),
            None => String::new(),
        };
        let kind = self.kind.label();
        match self.kind {
            ReasonKind::VolumeSpike => write!(
                f,
                "{kind}{window} {:.1}x >= {:.1}x",
                self.value, self.threshold
            ),
            ReasonKind::Momentum => write!(
                f,
                "{kind}{window} {:+.1}% >= {:.1}%",
                self.value, self.threshold
            ),
            ReasonKind::BuyPressure => write!(
                f,
                "{kind}{window} {:.2} >= {:.2}",
                self.value, self.threshold
            ),
            ReasonKind::VolumeAnomaly => write!(
                f,
                "{kind}{window} z={:.1} >= {:.1}",
                self.value, self.threshold
            ),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Signal {
    pub pair_id: String,
    /// Composite score, 0-100.
    pub score: f64,
    pub reasons: Vec<Reason>,
    pub snapshot: Snapshot,
}

impl Signal {
    #[cfg(test)]
    pub fn has(&self, kind: ReasonKind) -> bool {
        self.reasons.iter().any(|r| r.kind == kind)
    }

    pub fn reason_kinds(&self) -> Vec<ReasonKind> {
        let mut kinds: Vec<ReasonKind> = self.reasons.iter().map(|r| r.kind).collect();
        kinds.dedup();
        kinds
    }

    pub fn reasons_text(&self) -> String {
        self.reasons
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn normalize(value: f64, threshold: f64, cap: f64) -> f64 {
    if value <= 0.0 || threshold <= 0.0 {
        return 0.0;
    }
    (value / threshold).min(cap)
}

pub fn score(metrics: &DerivedMetrics, config: &SignalConfig) -> Signal {
    let cap = config.score_cap;
    let imbalance_counts = metrics.txns() >= config.floors.min_txns;

    let mut volume_n: f64 = 0.0;
    let mut momentum_n: f64 = 0.0;
    let mut imbalance_n: f64 = 0.0;
    let mut reasons = Vec::new();

    for (wm, wt) in metrics.windows.iter().zip(&config.windows) {
        if !wm.is_warm() {
            continue;
        }
        let window_secs = Some(wt.seconds);

        volume_n = volume_n.max(normalize(wm.volume_ratio, wt.volume_ratio, cap));
        if wm.volume_ratio >= wt.volume_ratio {
            reasons.push(Reason {
                kind: ReasonKind::VolumeSpike,
                window_secs,
                value: wm.volume_ratio,
                threshold: wt.volume_ratio,
            });
        }

        momentum_n = momentum_n.max(normalize(wm.momentum_pct, wt.momentum_pct, cap));
        if wm.momentum_pct >= wt.momentum_pct {
            reasons.push(Reason {
                kind: ReasonKind::Momentum,
                window_secs,
                value: wm.momentum_pct,
                threshold: wt.momentum_pct,
            });
        }
    }

    let pressure = config.pressure_window().and_then(|p| {
        config
            .windows
            .iter()
            .zip(&metrics.windows)
            .find(|(wt, wm)| wt.seconds == p.seconds && wm.is_warm())
            .map(|(wt, _)| wt)
    });
    if let Some(wt) = pressure.filter(|_| imbalance_counts) {
        imbalance_n = normalize(metrics.imbalance, wt.imbalance, cap);
        if metrics.imbalance >= wt.imbalance {
            reasons.push(Reason {
                kind: ReasonKind::BuyPressure,
                window_secs: Some(PROVIDER_WINDOW_SECS),
                value: metrics.imbalance,
                threshold: wt.imbalance,
            });
        }
    }

    let z_threshold = config.anomaly.volume_zscore;
    if z_threshold > 0.0 && metrics.volume_zscore >= z_threshold {
        reasons.push(Reason {
            kind: ReasonKind::VolumeAnomaly,
            window_secs: None,
            value: metrics.volume_zscore,
            threshold: z_threshold,
        });
    }

    reasons.sort_by_key(|r| (r.kind, r.window_secs));

    let w = &config.weights;
    let weighted = w.volume * volume_n + w.momentum * momentum_n + w.imbalance * imbalance_n;
    let composite = 100.0 * weighted / (w.total() * cap);

    Signal {
        pair_id: metrics.pair_id.clone(),
        score: composite.clamp(0.0, 100.0),
        reasons,
        snapshot: metrics.snapshot.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::snapshot::test_snapshot;
    use crate::engine::window::WindowMetrics;

    const PAIR: &str = "bsc:0xpair";

    fn window(secs: u64, volume_ratio: f64, momentum_pct: f64) -> WindowMetrics {
        WindowMetrics {
            window_secs: secs,
            samples: 2,
            span_secs: secs as i64,
            volume_delta: 0.0,
            volume_ratio,
            momentum_pct,
        }
    }

    fn cold(secs: u64) -> WindowMetrics {
        WindowMetrics {
            samples: 1,
            ..window(secs, 0.0, 0.0)
        }
    }

    fn metrics(w1: WindowMetrics, w5: WindowMetrics) -> DerivedMetrics {
        let mut snapshot = test_snapshot(PAIR, 300, 1.08, 50_000.0);
        snapshot.buys_m5 = 80;
        snapshot.sells_m5 = 20;
        DerivedMetrics {
            pair_id: PAIR.into(),
            windows: vec![w1, w5],
            imbalance: 0.6,
            volume_zscore: 0.0,
            snapshot,
        }
    }

    #[test]
    fn example_scenario_reasons() {
        let config = SignalConfig::default();
        let m = metrics(cold(60), window(300, 5.0, 8.0));
        let signal = score(&m, &config);

        assert!(signal.has(ReasonKind::VolumeSpike));
        assert!(signal.has(ReasonKind::Momentum));
        assert!(signal.has(ReasonKind::BuyPressure));
        assert!(!signal.has(ReasonKind::VolumeAnomaly));

        let labels: Vec<&str> = signal.reasons.iter().map(|r| r.kind.label()).collect();
        assert_eq!(labels, vec!["volume spike", "momentum", "buy pressure"]);

        // volume 2.5, momentum 8/6, imbalance 2.0 over a 3.0 cap
        let expected = 100.0 * (0.4 * 2.5 + 0.35 * (8.0 / 6.0) + 0.25 * 2.0) / 3.0;
        assert!((signal.score - expected).abs() < 1e-9);
    }

    #[test]
    fn deterministic() {
        let config = SignalConfig::default();
        let m = metrics(window(60, 1.7, 3.0), window(300, 2.4, 7.0));
        assert_eq!(score(&m, &config), score(&m, &config));
    }

    #[test]
    fn cold_windows_score_zero() {
        let config = SignalConfig::default();
        let signal = score(&metrics(cold(60), cold(300)), &config);
        assert_eq!(signal.score, 0.0);
        assert!(signal.reasons.is_empty());
    }

    #[test]
    fn components_are_capped() {
        let config = SignalConfig::default();
        let mut m = metrics(cold(60), window(300, 1_000.0, 900.0));
        m.imbalance = 1.0;
        let signal = score(&m, &config);
        assert!((signal.score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn reason_without_composite() {
        let config = SignalConfig::default();
        // only imbalance reaches its threshold
        let mut m = metrics(cold(60), window(300, 1.0, 0.5));
        m.imbalance = 0.4;
        let signal = score(&m, &config);
        assert_eq!(signal.reason_kinds(), vec![ReasonKind::BuyPressure]);
        assert!(signal.score < config.min_score);
    }

    #[test]
    fn imbalance_ignored_below_min_txns() {
        let config = SignalConfig::default();
        let mut m = metrics(cold(60), window(300, 1.0, 0.0));
        m.imbalance = 1.0;
        m.snapshot.buys_m5 = 5;
        m.snapshot.sells_m5 = 0;
        let signal = score(&m, &config);
        assert!(!signal.has(ReasonKind::BuyPressure));
        assert!((signal.score - 100.0 * 0.4 * 0.5 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn negative_momentum_contributes_nothing() {
        let config = SignalConfig::default();
        let mut m = metrics(cold(60), window(300, 0.0, -40.0));
        m.imbalance = -0.9;
        let signal = score(&m, &config);
        assert_eq!(signal.score, 0.0);
        assert!(signal.reasons.is_empty());
    }

    #[test]
    fn reasons_ordered_by_kind_then_window() {
        let config = SignalConfig::default();
        let mut m = metrics(window(60, 3.0, 3.0), window(300, 3.0, 7.0));
        m.imbalance = 0.0;
        m.volume_zscore = 4.0;
        let signal = score(&m, &config);

        let order: Vec<(ReasonKind, Option<u64>)> =
            signal.reasons.iter().map(|r| (r.kind, r.window_secs)).collect();
        assert_eq!(
            order,
            vec![
                (ReasonKind::VolumeSpike, Some(60)),
                (ReasonKind::VolumeSpike, Some(300)),
                (ReasonKind::Momentum, Some(60)),
                (ReasonKind::Momentum, Some(300)),
                (ReasonKind::VolumeAnomaly, None),
            ]
        );
    }

    #[test]
    fn buy_pressure_reported_once_across_warm_windows() {
        let config = SignalConfig::default();
        let signal = score(&metrics(window(60, 0.0, 0.0), window(300, 0.0, 0.0)), &config);

        assert_eq!(signal.reason_kinds(), vec![ReasonKind::BuyPressure]);
        assert_eq!(signal.reasons.len(), 1);
        assert_eq!(signal.reasons_text(), "buy pressure 5m 0.60 >= 0.30");
        assert!((signal.score - 100.0 * 0.25 * 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn buy_pressure_waits_for_pressure_window() {
        let mut config = SignalConfig::default();
        config.windows[0].seconds = 600;
        // 300s stays the pressure window, and it is still cold
        let signal = score(&metrics(window(600, 0.0, 0.0), cold(300)), &config);
        assert!(signal.reasons.is_empty());
        assert_eq!(signal.score, 0.0);
    }

    #[test]
    fn reason_text() {
        let reason = Reason {
            kind: ReasonKind::Momentum,
            window_secs: Some(300),
            value: 8.0,
            threshold: 6.0,
        };
        assert_eq!(reason.to_string(), "momentum 5m +8.0% >= 6.0%");
        assert_eq!(ReasonKind::from_text(&reason.to_string()), Some(ReasonKind::Momentum));
        assert_eq!(ReasonKind::from_text("unrelated"), None);
    }
}
