use super::scorer::{Reason, ReasonKind, Signal};
use crate::config::SignalConfig;

/// Outcome of threshold evaluation, kept for logging.
#[derive(Clone, Debug, PartialEq)]
pub enum Verdict {
    BelowLiquidityFloor { liquidity_usd: f64, min: f64 },
    BelowVolumeFloor { volume_usd: f64, min: f64 },
    ScorePassed { score: f64 },
    HardTrigger { reason: Reason },
    BelowThreshold { score: f64 },
}

impl Verdict {
    pub fn is_alert_worthy(&self) -> bool {
        matches!(self, Verdict::ScorePassed { .. } | Verdict::HardTrigger { .. })
    }
}

pub fn evaluate(signal: &Signal, config: &SignalConfig) -> bool {
    assess(signal, config).is_alert_worthy()
}

pub fn assess(signal: &Signal, config: &SignalConfig) -> Verdict {
    let floors = &config.floors;
    let snap = &signal.snapshot;

    // Illiquid pairs can show extreme ratios on negligible trade volume
    if snap.liquidity_usd < floors.min_liquidity_usd {
        return Verdict::BelowLiquidityFloor {
            liquidity_usd: snap.liquidity_usd,
            min: floors.min_liquidity_usd,
        };
    }
    if snap.volume_m5 < floors.min_volume_usd {
        return Verdict::BelowVolumeFloor {
            volume_usd: snap.volume_m5,
            min: floors.min_volume_usd,
        };
    }

    if signal.score >= config.min_score {
        return Verdict::ScorePassed {
            score: signal.score,
        };
    }

    if let Some(reason) = signal
        .reasons
        .iter()
        .find(|r| hard_threshold(r, config).is_some_and(|hard| r.value >= hard))
    {
        return Verdict::HardTrigger {
            reason: reason.clone(),
        };
    }

    Verdict::BelowThreshold {
        score: signal.score,
    }
}

fn hard_threshold(reason: &Reason, config: &SignalConfig) -> Option<f64> {
    match reason.kind {
        ReasonKind::VolumeAnomaly => return config.anomaly.hard_zscore,
        ReasonKind::BuyPressure => return config.pressure_window()?.hard_imbalance,
        _ => {}
    }
    let window = config
        .windows
        .iter()
        .find(|w| Some(w.seconds) == reason.window_secs)?;
    match reason.kind {
        ReasonKind::VolumeSpike => window.hard_volume_ratio,
        ReasonKind::Momentum => window.hard_momentum_pct,
        ReasonKind::BuyPressure | ReasonKind::VolumeAnomaly => None,
    }
}
