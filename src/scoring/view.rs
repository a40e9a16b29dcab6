use serde::Serialize;

use super::normalize_method;
use crate::store::models::{EventId, Fight, FightId, FightResult, FighterId};

/// Immutable picture of a fight as the scoring engine sees it: the stored
/// row with the official result (if any) laid over it. Built once per
/// resolution and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFightView {
    pub fight_id: FightId,
    pub event_id: EventId,
    pub is_title: bool,
    pub category: String,
    pub winner_id: Option<FighterId>,
    /// Normalized with [`normalize_method`].
    pub method: Option<String>,
    pub round_end: Option<String>,
}

impl ResolvedFightView {
    /// View of the fight once `result` has been applied.
    pub fn with_result(fight: &Fight, result: &FightResult) -> Self {
        Self {
            fight_id: fight.id,
            event_id: fight.event_id,
            is_title: result.is_title,
            category: result.category.clone(),
            winner_id: Some(result.winner_id),
            method: Some(normalize_method(&result.method)),
            round_end: Some(result.round_end.clone()),
        }
    }
}
