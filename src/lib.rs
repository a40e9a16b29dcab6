// Library crate for the fight-picks scoring service
// This file exposes the public API for the binary and integration tests

pub mod app;
pub mod auth;
pub mod completion;
pub mod config;
pub mod errors;
pub mod fights;
pub mod ranking;
pub mod scoring;
pub mod shared;
pub mod store;

// Re-export commonly used types for easier access in tests
pub use app::build_router;
pub use config::{AppConfig, ScoringConfig};
pub use errors::ScoringError;
pub use fights::{FightResolutionService, FightResultRequest, ResolutionSummary};
pub use ranking::RankingSnapshotService;
pub use scoring::calculate_points;
pub use shared::{AppError, AppState};
pub use store::{InMemoryScoringRepository, PostgresScoringRepository, ScoringRepository};
