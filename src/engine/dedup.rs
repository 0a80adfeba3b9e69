use std::collections::{HashMap, HashSet};

use super::scorer::{ReasonKind, Signal};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GatePhase {
    /// No prior alert, or cooldown expired.
    Cold,
    /// Alerted within the cooldown.
    Hot,
}

/// What the pair looked like when it last alerted. Advisory only: re-arming
/// is purely time based.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fingerprint {
    pub score: i64,
    pub reasons: Vec<ReasonKind>,
}

impl Fingerprint {
    pub fn of(signal: &Signal) -> Self {
        Self {
            score: signal.score.round() as i64,
            reasons: signal.reason_kinds(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AlertState {
    pub last_alerted_at: i64,
    pub fingerprint: Fingerprint,
    pub cooldown_until: i64,
}

/// Per-pair cooldown gate. State is keyed by pair id, so pairs never
/// observe each other.
pub struct DeduplicationGate {
    cooldown_secs: i64,
    states: HashMap<String, AlertState>,
}

impl DeduplicationGate {
    pub fn new(cooldown_secs: u64) -> Self {
        Self {
            cooldown_secs: cooldown_secs as i64,
            states: HashMap::new(),
        }
    }

    pub fn phase(&self, pair_id: &str, now: i64) -> GatePhase {
        match self.states.get(pair_id) {
            Some(state) if now < state.cooldown_until => GatePhase::Hot,
            _ => GatePhase::Cold,
        }
    }

    /// Called with an alert-worthy signal. Returns true (and records the
    /// alert) when the pair is cold; a hot pair is suppressed until
    /// `now - last_alerted_at >= cooldown`, after which it re-arms.
    pub fn should_emit(&mut self, pair_id: &str, signal: &Signal, now: i64) -> bool {
        if self.phase(pair_id, now) == GatePhase::Hot {
            tracing::debug!("{pair_id}: suppressed, still in cooldown");
            return false;
        }

        let fingerprint = Fingerprint::of(signal);
        if let Some(prev) = self.states.get(pair_id) {
            if prev.fingerprint.reasons != fingerprint.reasons {
                tracing::debug!(
                    "{pair_id}: re-armed with changed reasons {:?} -> {:?}",
                    prev.fingerprint.reasons,
                    fingerprint.reasons
                );
            }
        }

        self.states.insert(
            pair_id.to_string(),
            AlertState {
                last_alerted_at: now,
                fingerprint,
                cooldown_until: now + self.cooldown_secs,
            },
        );
        true
    }

    #[cfg(test)]
    pub fn state(&self, pair_id: &str) -> Option<&AlertState> {
        self.states.get(pair_id)
    }

    /// Resets pairs that left the watchlist and are past their cooldown.
    /// Returns how many were released.
    pub fn release_unwatched(&mut self, keep: &HashSet<String>, now: i64) -> usize {
        let before = self.states.len();
        self.states
            .retain(|pair, state| keep.contains(pair) || now < state.cooldown_until);
        before - self.states.len()
    }

    pub fn tracked_pairs(&self) -> usize {
        self.states.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::scorer::Reason;
    use crate::engine::snapshot::test_snapshot;

    const PAIR: &str = "bsc:0xpair";

    fn signal(score: f64, kinds: &[ReasonKind]) -> Signal {
        Signal {
            pair_id: PAIR.into(),
            score,
            reasons: kinds
                .iter()
                .map(|&kind| Reason {
                    kind,
                    window_secs: Some(300),
                    value: 1.0,
                    threshold: 1.0,
                })
                .collect(),
            snapshot: test_snapshot(PAIR, 0, 1.0, 1.0),
        }
    }

    #[test]
    fn second_cycle_thirty_seconds_later_is_suppressed() {
        let mut gate = DeduplicationGate::new(300);
        let s = signal(70.0, &[ReasonKind::VolumeSpike]);
        assert!(gate.should_emit(PAIR, &s, 1_000));
        assert!(!gate.should_emit(PAIR, &s, 1_030));
    }

    #[test]
    fn one_alert_per_cooldown() {
        let mut gate = DeduplicationGate::new(300);
        let s = signal(70.0, &[ReasonKind::Momentum]);
        let emitted = (0..10)
            .filter(|i| gate.should_emit(PAIR, &s, 1_000 + i * 20))
            .count();
        assert_eq!(emitted, 1);
    }

    #[test]
    fn re_arms_after_cooldown() {
        let mut gate = DeduplicationGate::new(300);
        let s = signal(70.0, &[ReasonKind::Momentum]);
        assert!(gate.should_emit(PAIR, &s, 1_000));
        assert_eq!(gate.phase(PAIR, 1_299), GatePhase::Hot);
        assert!(!gate.should_emit(PAIR, &s, 1_299));

        assert_eq!(gate.phase(PAIR, 1_300), GatePhase::Cold);
        assert!(gate.should_emit(PAIR, &s, 1_300));
        assert!(!gate.should_emit(PAIR, &s, 1_320));

        let state = gate.state(PAIR).unwrap();
        assert_eq!(state.last_alerted_at, 1_300);
        assert_eq!(state.cooldown_until, 1_600);
    }

    #[test]
    fn records_fingerprint() {
        let mut gate = DeduplicationGate::new(60);
        gate.should_emit(PAIR, &signal(66.6, &[ReasonKind::VolumeSpike, ReasonKind::BuyPressure]), 0);
        assert_eq!(
            gate.state(PAIR).unwrap().fingerprint,
            Fingerprint {
                score: 67,
                reasons: vec![ReasonKind::VolumeSpike, ReasonKind::BuyPressure],
            }
        );

        // changed reasons do not bypass the cooldown
        assert!(!gate.should_emit(PAIR, &signal(90.0, &[ReasonKind::Momentum]), 30));
    }

    #[test]
    fn releases_unwatched_pairs_after_cooldown() {
        let mut gate = DeduplicationGate::new(300);
        let s = signal(70.0, &[]);
        gate.should_emit("bsc:a", &s, 0);
        gate.should_emit("bsc:b", &s, 100);
        let keep = HashSet::from(["bsc:b".to_string()]);

        assert_eq!(gate.release_unwatched(&keep, 299), 0);
        assert_eq!(gate.release_unwatched(&keep, 300), 1);
        assert!(gate.state("bsc:a").is_none());
        assert_eq!(gate.release_unwatched(&keep, 10_000), 0);
        assert_eq!(gate.tracked_pairs(), 1);
    }

    #[test]
    fn pairs_are_independent() {
        let mut gate = DeduplicationGate::new(300);
        let s = signal(70.0, &[]);
        assert!(gate.should_emit("bsc:a", &s, 0));
        assert!(gate.should_emit("bsc:b", &s, 10));
        assert_eq!(gate.tracked_pairs(), 2);

        assert!(!gate.should_emit("bsc:a", &s, 20));
        assert!(gate.should_emit("bsc:a", &s, 300));
        assert!(!gate.should_emit("bsc:b", &s, 300));
        assert!(gate.should_emit("bsc:b", &s, 310));
    }
}
