//! Signal detection and alert deduplication.
//!
//! Per poll cycle each snapshot flows through
//! `WindowAggregator -> scorer -> threshold -> DeduplicationGate` and comes
//! out as an [`AlertRecord`] or nothing. Pure computation: no I/O, no clock.

pub mod alert;
pub mod dedup;
pub mod scorer;
pub mod snapshot;
pub mod threshold;
pub mod window;

use std::collections::HashSet;
use std::sync::Arc;

pub use alert::AlertRecord;
pub use dedup::DeduplicationGate;
pub use scorer::Signal;
pub use snapshot::Snapshot;
pub use window::{AggregateError, WindowAggregator};

use crate::config::{ConfigError, SignalConfig};
use threshold::Verdict;

/// What happened to one pair in one cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum Evaluation {
    /// Fewer than two snapshots in every window.
    WarmingUp,
    /// Scored but not alert-worthy.
    Quiet { signal: Signal, verdict: Verdict },
    /// Alert-worthy but inside the pair's cooldown.
    Suppressed { signal: Signal },
    Alert { record: AlertRecord, signal: Signal },
}

#[derive(Debug, Default)]
pub struct CycleReport {
    pub alerts: Vec<AlertRecord>,
    pub evaluated: usize,
    pub warming_up: usize,
    pub suppressed: usize,
    pub skipped: usize,
}

pub struct SignalEngine {
    config: Arc<SignalConfig>,
    aggregator: WindowAggregator,
    gate: DeduplicationGate,
}

impl SignalEngine {
    /// Refuses to build from an invalid config rather than defaulting.
    pub fn new(config: SignalConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let aggregator = WindowAggregator::new(&config);
        let gate = DeduplicationGate::new(config.cooldown_seconds);
        Ok(Self {
            config: Arc::new(config),
            aggregator,
            gate,
        })
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Runs one pair through the whole pipeline. On error nothing about the
    /// pair has changed.
    pub fn evaluate(&mut self, snapshot: Snapshot, now: i64) -> Result<Evaluation, AggregateError> {
        let pair_id = snapshot.pair_id.clone();
        let metrics = self.aggregator.ingest(&pair_id, snapshot)?;

        if metrics.windows.iter().all(|w| !w.is_warm()) {
            return Ok(Evaluation::WarmingUp);
        }

        let signal = scorer::score(&metrics, &self.config);
        let verdict = threshold::assess(&signal, &self.config);
        if !verdict.is_alert_worthy() {
            return Ok(Evaluation::Quiet { signal, verdict });
        }

        if !self.gate.should_emit(&pair_id, &signal, now) {
            return Ok(Evaluation::Suppressed { signal });
        }

        let record = AlertRecord::from_signal(&signal, now);
        Ok(Evaluation::Alert { record, signal })
    }

    /// Evaluates every snapshot of a cycle, one pair at a time. A pair that
    /// appears twice in the same cycle is only evaluated once.
    pub fn run_cycle(&mut self, snapshots: Vec<Snapshot>, now: i64) -> CycleReport {
        let mut report = CycleReport::default();
        let mut seen = HashSet::new();

        for snapshot in snapshots {
            if !seen.insert(snapshot.pair_id.clone()) {
                tracing::debug!("{}: duplicate snapshot in cycle, skipped", snapshot.pair_id);
                continue;
            }
            let pair_id = snapshot.pair_id.clone();

            match self.evaluate(snapshot, now) {
                Ok(Evaluation::WarmingUp) => report.warming_up += 1,
                Ok(Evaluation::Quiet { signal, verdict }) => {
                    report.evaluated += 1;
                    tracing::debug!(
                        "{pair_id}: score={:.1} reasons=[{}] verdict={verdict:?}",
                        signal.score,
                        signal.reasons_text()
                    );
                }
                Ok(Evaluation::Suppressed { signal }) => {
                    report.evaluated += 1;
                    report.suppressed += 1;
                    tracing::debug!("{pair_id}: alert suppressed (score={:.1})", signal.score);
                }
                Ok(Evaluation::Alert { record, signal }) => {
                    report.evaluated += 1;
                    tracing::info!(
                        "{pair_id}: ALERT score={} reasons=[{}]",
                        record.score,
                        signal.reasons_text()
                    );
                    report.alerts.push(record);
                }
                Err(e) => {
                    report.skipped += 1;
                    tracing::warn!("{pair_id}: skipped this cycle: {e}");
                }
            }
        }

        report
    }

    /// Drops histories of pairs no longer watched. Their alert states are
    /// only released once cooled down, so a pair that leaves and comes back
    /// still honours its cooldown.
    pub fn retain_pairs(&mut self, keep: &HashSet<String>, now: i64) {
        self.aggregator.retain_pairs(keep);
        let released = self.gate.release_unwatched(keep, now);
        if released > 0 {
            tracing::debug!("Released alert state of {released} unwatched pair(s)");
        }
    }

    /// Pairs with a retained history.
    pub fn tracked_pairs(&self) -> usize {
        self.aggregator.tracked_pairs()
    }

    /// Pairs that have alerted at least once, cooling down or not.
    pub fn alerted_pairs(&self) -> usize {
        self.gate.tracked_pairs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Floors, WindowThresholds};
    use crate::engine::scorer::ReasonKind;
    use crate::engine::snapshot::test_snapshot;

    const PAIR: &str = "bsc:0xpair";

    fn five_minute_config() -> SignalConfig {
        SignalConfig {
            windows: vec![WindowThresholds {
                seconds: 300,
                volume_ratio: 2.0,
                momentum_pct: 5.0,
                imbalance: 0.3,
                hard_volume_ratio: None,
                hard_momentum_pct: None,
                hard_imbalance: None,
            }],
            floors: Floors {
                min_liquidity_usd: 1_000.0,
                min_volume_usd: 0.0,
                min_txns: 20,
            },
            min_score: 45.0,
            cooldown_seconds: 300,
            ..SignalConfig::default()
        }
    }

    /// Every warm cycle is alert-worthy through the hard imbalance trigger.
    fn sustained_config() -> SignalConfig {
        let mut config = five_minute_config();
        config.min_score = 100.0;
        config.windows[0].hard_imbalance = Some(0.5);
        config
    }

    fn pressured(ts: i64) -> Snapshot {
        let mut s = test_snapshot(PAIR, ts, 1.0, 10_000.0);
        s.buys_m5 = 80;
        s.sells_m5 = 20;
        s
    }

    fn example_pair(liquidity: f64) -> (Snapshot, Snapshot) {
        let t0 = 1_700_000_000;
        let mut before = test_snapshot(PAIR, t0, 1.00, 10_000.0);
        before.liquidity_usd = liquidity;
        let mut after = test_snapshot(PAIR, t0 + 300, 1.08, 50_000.0);
        after.liquidity_usd = liquidity;
        after.buys_m5 = 80;
        after.sells_m5 = 20;
        (before, after)
    }

    #[test]
    fn refuses_invalid_config() {
        let mut config = five_minute_config();
        config.cooldown_seconds = 0;
        assert!(SignalEngine::new(config).is_err());

        let mut config = five_minute_config();
        config.weights.volume = -1.0;
        assert!(SignalEngine::new(config).is_err());
    }

    #[test]
    fn first_snapshot_warms_up() {
        let mut engine = SignalEngine::new(five_minute_config()).unwrap();
        let (before, _) = example_pair(500_000.0);
        let ts = before.observed_at;
        assert_eq!(engine.evaluate(before, ts).unwrap(), Evaluation::WarmingUp);
    }

    #[test]
    fn example_scenario_alerts() {
        let mut engine = SignalEngine::new(five_minute_config()).unwrap();
        let (before, after) = example_pair(500_000.0);
        let now = after.observed_at;
        engine.evaluate(before, now - 300).unwrap();

        let Evaluation::Alert { record, signal } = engine.evaluate(after, now).unwrap() else {
            panic!("expected an alert");
        };
        assert!(signal.has(ReasonKind::VolumeSpike));
        assert!(signal.has(ReasonKind::Momentum));
        assert!(signal.has(ReasonKind::BuyPressure));
        assert!(threshold::evaluate(&signal, engine.config()));

        assert_eq!(record.ts, now);
        assert_eq!(record.network, "bsc");
        assert_eq!(record.pair_address.as_deref(), Some("0xpair"));
        assert!(record.reasons.contains("volume spike 5m 5.0x"));
        assert!(record.reasons.contains("momentum 5m +8.0%"));
        assert!(record.reasons.contains("buy pressure 5m 0.60"));
        assert!(record.score >= 45);
    }

    #[test]
    fn example_scenario_below_liquidity_floor() {
        let mut engine = SignalEngine::new(five_minute_config()).unwrap();
        let (before, after) = example_pair(50.0);
        let now = after.observed_at;
        engine.evaluate(before, now - 300).unwrap();

        match engine.evaluate(after, now).unwrap() {
            Evaluation::Quiet { signal, verdict } => {
                assert!(signal.score >= engine.config().min_score);
                assert!(!threshold::evaluate(&signal, engine.config()));
                assert!(matches!(verdict, Verdict::BelowLiquidityFloor { .. }));
            }
            other => panic!("expected quiet, got {other:?}"),
        }
    }

    #[test]
    fn one_alert_per_cooldown_then_re_arm() {
        let mut engine = SignalEngine::new(sustained_config()).unwrap();

        let mut alerts_at = Vec::new();
        for ts in (0..=320).step_by(20) {
            let report = engine.run_cycle(vec![pressured(ts)], ts);
            if !report.alerts.is_empty() {
                alerts_at.push(ts);
            }
        }

        // first warm cycle at t=20, re-armed once 300s have passed
        assert_eq!(alerts_at, vec![20, 320]);
    }

    #[test]
    fn illiquid_pair_never_alerts() {
        let mut engine = SignalEngine::new(sustained_config()).unwrap();
        let mut total = 0;
        for ts in (0..=1_200).step_by(20) {
            let mut s = pressured(ts);
            s.liquidity_usd = 999.0;
            total += engine.run_cycle(vec![s], ts).alerts.len();
        }
        assert_eq!(total, 0);
    }

    #[test]
    fn cycle_report_counts() {
        let mut engine = SignalEngine::new(sustained_config()).unwrap();
        let report = engine.run_cycle(vec![pressured(0), pressured(0)], 0);
        assert_eq!(report.warming_up, 1);
        assert_eq!(report.evaluated, 0);

        let report = engine.run_cycle(vec![pressured(20)], 20);
        assert_eq!(report.alerts.len(), 1);

        let report = engine.run_cycle(vec![pressured(40)], 40);
        assert_eq!(report.suppressed, 1);
        assert!(report.alerts.is_empty());

        // stale snapshot is skipped, not fatal
        let report = engine.run_cycle(vec![pressured(40)], 60);
        assert_eq!(report.skipped, 1);
    }

    #[test]
    fn pair_appearing_mid_run_starts_cold() {
        let mut engine = SignalEngine::new(sustained_config()).unwrap();
        engine.run_cycle(vec![pressured(0)], 0);

        let mut newcomer = pressured(20);
        newcomer.pair_id = "bsc:0xnew".into();
        let report = engine.run_cycle(vec![pressured(20), newcomer], 20);
        assert_eq!(report.alerts.len(), 1);
        assert_eq!(report.warming_up, 1);
        assert_eq!(engine.tracked_pairs(), 2);
    }

    #[test]
    fn retained_cooldown_survives_history_pruning() {
        let mut engine = SignalEngine::new(sustained_config()).unwrap();
        engine.run_cycle(vec![pressured(0)], 0);
        assert_eq!(engine.run_cycle(vec![pressured(20)], 20).alerts.len(), 1);

        engine.retain_pairs(&HashSet::new(), 20);
        assert_eq!(engine.tracked_pairs(), 0);

        engine.run_cycle(vec![pressured(40)], 40);
        assert!(engine.run_cycle(vec![pressured(60)], 60).alerts.is_empty());
        assert_eq!(engine.alerted_pairs(), 1);

        // re-armed once the cooldown has passed
        assert_eq!(engine.run_cycle(vec![pressured(320)], 320).alerts.len(), 1);

        engine.retain_pairs(&HashSet::new(), 619);
        assert_eq!(engine.alerted_pairs(), 1);
        engine.retain_pairs(&HashSet::new(), 620);
        assert_eq!(engine.alerted_pairs(), 0);
    }
}
