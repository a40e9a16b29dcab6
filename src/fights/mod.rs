// Public API - what other modules can use
pub use handlers::{preview_points, resolve_fight};
pub use rescore::{rescore_picks, Rescore};
pub use service::{FightResolutionService, ResolutionSummary};
pub use types::{FightResultRequest, PreviewFight, PreviewRequest, PreviewResponse};

// Internal modules
mod handlers;
mod rescore;
mod service;
mod types;
