use axum::{
    extract::{Path, State},
    Json,
};
use tracing::{info, instrument};

use super::service::ResolutionSummary;
use super::types::{FightResultRequest, PreviewRequest, PreviewResponse};
use crate::scoring::{normalize_method, score_breakdown, ResolvedFightView};
use crate::shared::{AppError, AppState};
use crate::store::models::FightId;
use uuid::Uuid;

/// HTTP handler for submitting an official fight result
///
/// POST /admin/fights/:fight_id/result
/// Rescores every pick on the fight and returns what changed
#[instrument(name = "resolve_fight", skip(state, request))]
pub async fn resolve_fight(
    State(state): State<AppState>,
    Path(fight_id): Path<FightId>,
    Json(request): Json<FightResultRequest>,
) -> Result<Json<ResolutionSummary>, AppError> {
    info!(%fight_id, winner_id = %request.winner_id, "Submitting fight result");

    let summary = state
        .resolution_service
        .resolve_fight(fight_id, request)
        .await?;

    Ok(Json(summary))
}

/// HTTP handler for a dry-run score
///
/// POST /admin/scoring/preview
/// Scores a hypothetical pick without touching the store
#[instrument(name = "preview_points", skip_all)]
pub async fn preview_points(
    Json(request): Json<PreviewRequest>,
) -> Result<Json<PreviewResponse>, AppError> {
    if request.winner_picks > request.total_picks {
        return Err(AppError::Validation(format!(
            "winner_picks ({}) exceeds total_picks ({})",
            request.winner_picks, request.total_picks
        )));
    }

    let fight = ResolvedFightView {
        fight_id: Uuid::nil(),
        event_id: Uuid::nil(),
        is_title: request.fight.is_title,
        category: request.fight.category,
        winner_id: request.fight.winner_id,
        method: request.fight.method.as_deref().map(normalize_method),
        round_end: request.fight.round_end.map(|r| r.trim().to_string()),
    };

    let breakdown = score_breakdown(
        &request.prediction,
        &fight,
        request.total_picks,
        request.winner_picks,
    );

    Ok(Json(PreviewResponse {
        points: breakdown.total(),
        breakdown,
    }))
}
