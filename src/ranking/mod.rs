//! League leaderboards: live standings, immutable per-event snapshots and
//! the rank deltas derived from them.

// Public API - what other modules can use
pub use handlers::{
    consolidate_event, league_standings, list_snapshots, user_totals, ConsolidateResponse,
};
pub use service::RankingSnapshotService;
pub use standings::{rank_delta, rank_standings};

// Internal modules
mod handlers;
pub mod models;
mod service;
mod standings;
