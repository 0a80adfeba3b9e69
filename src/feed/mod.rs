//! Market data: DexScreener snapshots, trending-pair discovery and the
//! watchlist that ties them together.

pub mod dexscreener;
pub mod discovery;
pub mod watchlist;

pub use dexscreener::DexScreenerClient;
pub use watchlist::Watchlist;

#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("watch entry on {0} has neither pair_address nor token_address")]
    MissingAddress(String),

    #[error("no pairs returned by {0}")]
    NoPairs(String),

    #[error("pair on {0} has no pair address")]
    MissingPairAddress(String),
}
