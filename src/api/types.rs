use serde::{Deserialize, Serialize};

use crate::dispatch::store::StoredAlert;
use crate::engine::scorer::ReasonKind;

#[derive(Deserialize)]
pub struct AlertsParams {
    pub limit: Option<u32>,
    pub network: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct ReasonTag {
    pub label: String,
    pub detail: String,
    pub level: &'static str,
}

#[derive(Serialize)]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: StoredAlert,
    pub reason_tags: Vec<ReasonTag>,
}

#[derive(Serialize)]
pub struct AlertsResponse {
    pub alerts: Vec<AlertView>,
    pub limit: u32,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub alert_count: u64,
    pub latest_alert_ts: Option<i64>,
    pub watched_pairs: usize,
    pub uptime_secs: i64,
}

// -- Reason tags --

fn window_secs(label: &str) -> Option<u64> {
    if let Some(m) = label.strip_suffix('m') {
        return m.parse::<u64>().ok().map(|m| m * 60);
    }
    label.strip_suffix('s')?.parse().ok()
}

fn tag(detail: &str) -> ReasonTag {
    let detail = detail.trim();
    let Some(kind) = ReasonKind::from_text(detail) else {
        return ReasonTag {
            label: detail.to_string(),
            detail: detail.to_string(),
            level: "low",
        };
    };
    let window = detail[kind.label().len()..]
        .split_whitespace()
        .next()
        .filter(|w| window_secs(w).is_some());

    let (label, level) = match kind {
        ReasonKind::VolumeSpike => (format!("Volume spike {}", window.unwrap_or("")), "med"),
        ReasonKind::VolumeAnomaly => ("Volume anomaly".to_string(), "med"),
        ReasonKind::BuyPressure => (format!("Buy pressure {}", window.unwrap_or("")), "med"),
        ReasonKind::Momentum => {
            let long = window.and_then(window_secs).is_some_and(|s| s >= 300);
            (
                format!("+Price {}", window.unwrap_or("")),
                if long { "high" } else { "low" },
            )
        }
    };
    ReasonTag {
        label: label.trim_end().to_string(),
        detail: detail.to_string(),
        level,
    }
}

/// Splits a stored `reasons` string into display tags.
pub fn reason_tags(reasons: &str) -> Vec<ReasonTag> {
    reasons
        .split(", ")
        .filter(|p| !p.trim().is_empty())
        .map(tag)
        .collect()
}
