mod engine;
pub mod view;

pub use engine::{calculate_points, normalize_method, score_breakdown, PointsBreakdown};
pub use view::ResolvedFightView;

/// Point values awarded per scoring tier.
pub mod points {
    pub const BASE_WIN: i32 = 30;
    pub const TITLE_BONUS: i32 = 60;
    pub const MAIN_EVENT_BONUS: i32 = 30;
    /// "Mitada": the pick went with a winner few others believed in.
    pub const UPSET_BONUS: i32 = 90;
    pub const METHOD_BONUS: i32 = 20;
    pub const ROUND_BONUS: i32 = 10;
    /// "Gabarito": every winner on the card called correctly.
    pub const PERFECT_CARD_BONUS: i64 = 90;

    /// Share of picks on the winner, in percent, at or below which the
    /// upset bonus applies.
    pub const UPSET_THRESHOLD_PERCENT: f64 = 10.0;
    pub const MAIN_EVENT_CATEGORY: &str = "Main Event";
}
