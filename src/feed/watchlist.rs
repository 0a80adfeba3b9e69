use std::collections::{HashMap, HashSet};

use crate::config::PairWatch;
use crate::engine::Snapshot;

/// Static entries from the config plus the latest discovered set.
pub struct Watchlist {
    static_entries: Vec<PairWatch>,
    discovered: Vec<PairWatch>,
    refresh_secs: i64,
    last_refresh: Option<i64>,
    /// watch key -> pair id, learned from fetches. Token watches only know
    /// their pair once the provider has resolved it.
    resolved: HashMap<String, String>,
}

impl Watchlist {
    pub fn new(static_entries: Vec<PairWatch>, refresh_secs: u64) -> Self {
        Self {
            static_entries,
            discovered: Vec::new(),
            refresh_secs: refresh_secs as i64,
            last_refresh: None,
            resolved: HashMap::new(),
        }
    }

    /// Static entries first, then discovered ones not already listed.
    pub fn entries(&self) -> Vec<PairWatch> {
        let mut seen = HashSet::new();
        self.static_entries
            .iter()
            .chain(&self.discovered)
            .filter(|w| seen.insert(w.key()))
            .cloned()
            .collect()
    }

    pub fn refresh_due(&self, now: i64) -> bool {
        match self.last_refresh {
            None => true,
            Some(at) => now - at >= self.refresh_secs,
        }
    }

    pub fn set_discovered(&mut self, discovered: Vec<PairWatch>, now: i64) {
        let before: HashSet<String> = self.discovered.iter().map(PairWatch::key).collect();
        let added = discovered.iter().filter(|w| !before.contains(&w.key())).count();
        let dropped = before.len().saturating_sub(discovered.len() - added);
        if added > 0 || dropped > 0 {
            tracing::info!("Watchlist: +{added} -{dropped} discovered pairs");
        }

        self.discovered = discovered;
        self.last_refresh = Some(now);
        let live: HashSet<String> = self.entries().iter().map(PairWatch::key).collect();
        self.resolved.retain(|key, _| live.contains(key));
    }

    pub fn record_resolution(&mut self, watch: &PairWatch, pair_id: &str) {
        self.resolved.insert(watch.key(), pair_id.to_string());
    }

    /// Pair ids currently in use: explicit pair watches plus every token
    /// watch that has been resolved.
    pub fn pair_ids(&self) -> HashSet<String> {
        self.entries()
            .iter()
            .filter_map(|w| match (&w.pair_address, self.resolved.get(&w.key())) {
                (_, Some(resolved)) => Some(resolved.clone()),
                (Some(pair), None) => Some(Snapshot::pair_key(&w.network, pair)),
                (None, None) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(network: &str, addr: &str) -> PairWatch {
        PairWatch {
            network: network.into(),
            token_address: None,
            pair_address: Some(addr.into()),
            note: None,
        }
    }

    fn token(addr: &str) -> PairWatch {
        PairWatch {
            network: "bsc".into(),
            token_address: Some(addr.into()),
            pair_address: None,
            note: None,
        }
    }

    #[test]
    fn dedups_static_and_discovered() {
        let mut list = Watchlist::new(vec![pair("bsc", "0xAA"), token("0xtok")], 120);
        list.set_discovered(vec![pair("bsc", "0xaa"), pair("bsc", "0xbb")], 0);

        let entries = list.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].pair_address.as_deref(), Some("0xAA"));
        assert_eq!(entries[2].pair_address.as_deref(), Some("0xbb"));
    }

    #[test]
    fn refresh_schedule() {
        let mut list = Watchlist::new(Vec::new(), 120);
        assert!(list.refresh_due(1_000));
        list.set_discovered(Vec::new(), 1_000);
        assert!(!list.refresh_due(1_119));
        assert!(list.refresh_due(1_120));
    }

    #[test]
    fn pair_ids_include_resolved_tokens() {
        let tok = token("0xtok");
        let mut list = Watchlist::new(vec![pair("bsc", "0xAA"), tok.clone()], 120);
        assert_eq!(list.pair_ids(), HashSet::from(["bsc:0xaa".to_string()]));

        list.record_resolution(&tok, "bsc:0xresolved");
        assert_eq!(
            list.pair_ids(),
            HashSet::from(["bsc:0xaa".to_string(), "bsc:0xresolved".to_string()])
        );
    }

    #[test]
    fn dropped_discoveries_leave_pair_ids() {
        let mut list = Watchlist::new(Vec::new(), 60);
        list.set_discovered(vec![pair("bsc", "0x1"), pair("bsc", "0x2")], 0);
        assert_eq!(list.pair_ids().len(), 2);

        list.set_discovered(vec![pair("bsc", "0x2")], 60);
        assert_eq!(list.pair_ids(), HashSet::from(["bsc:0x2".to_string()]));
        assert_eq!(list.entries().len(), 1);
    }
}
