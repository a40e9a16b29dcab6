use serde::{Deserialize, Serialize};

use crate::errors::ScoringError;
use crate::scoring::{normalize_method, PointsBreakdown};
use crate::store::models::{Fight, FightResult, FighterId, Prediction};

/// Request payload for submitting an official fight result
#[derive(Debug, Clone, Deserialize)]
pub struct FightResultRequest {
    pub winner_id: FighterId,
    pub method: String,
    /// Round number, or the decision type for decisions.
    pub round_end: String,
    /// Overrides the stored value when present.
    pub is_title: Option<bool>,
    pub category: Option<String>,
}

impl FightResultRequest {
    /// Checks the payload against the fight it targets. Nothing is written
    /// if this fails.
    pub fn validate_for(&self, fight: &Fight) -> Result<FightResult, ScoringError> {
        if !fight.has_competitor(self.winner_id) {
            return Err(ScoringError::Validation(format!(
                "winner {} is not a competitor in fight {}",
                self.winner_id, fight.id
            )));
        }

        let method = normalize_method(&self.method);
        if method.is_empty() {
            return Err(ScoringError::Validation("method is required".to_string()));
        }

        let round_end = self.round_end.trim().to_string();
        if round_end.is_empty() {
            return Err(ScoringError::Validation("round_end is required".to_string()));
        }
        if let Ok(round) = round_end.parse::<i32>() {
            if !(1..=fight.rounds).contains(&round) {
                return Err(ScoringError::Validation(format!(
                    "round {round} outside 1..={} for fight {}",
                    fight.rounds, fight.id
                )));
            }
        }

        Ok(FightResult {
            winner_id: self.winner_id,
            method,
            round_end,
            is_title: self.is_title.unwrap_or(fight.is_title),
            category: self
                .category
                .clone()
                .unwrap_or_else(|| fight.category.clone()),
        })
    }
}

/// Request payload for a dry-run score
#[derive(Debug, Deserialize)]
pub struct PreviewRequest {
    #[serde(flatten)]
    pub prediction: Prediction,
    pub fight: PreviewFight,
    pub total_picks: usize,
    pub winner_picks: usize,
}

#[derive(Debug, Deserialize)]
pub struct PreviewFight {
    pub winner_id: Option<FighterId>,
    pub method: Option<String>,
    pub round_end: Option<String>,
    #[serde(default)]
    pub is_title: bool,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PreviewResponse {
    pub points: i32,
    pub breakdown: PointsBreakdown,
}
