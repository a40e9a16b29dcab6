use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use super::models::{PeriodKey, RankingSnapshot, SnapshotType, Standing};
use crate::shared::{AppError, AppState};
use crate::store::models::{EventId, LeagueId, UserId, UserTotals};

#[derive(Debug, Serialize, Deserialize)]
pub struct ConsolidateResponse {
    pub snapshots_written: usize,
}

/// HTTP handler for consolidating an event's leaderboards
///
/// POST /admin/leagues/:league_id/events/:event_id/consolidate
/// Safe to repeat after a result correction
#[instrument(name = "consolidate_event", skip(state))]
pub async fn consolidate_event(
    State(state): State<AppState>,
    Path((league_id, event_id)): Path<(LeagueId, EventId)>,
) -> Result<Json<ConsolidateResponse>, AppError> {
    let snapshots_written = state
        .ranking_service
        .consolidate_event(league_id, event_id)
        .await?;

    info!(%league_id, %event_id, snapshots_written, "Consolidation finished");

    Ok(Json(ConsolidateResponse { snapshots_written }))
}

/// HTTP handler for reading leaderboard history
///
/// GET /leagues/:league_id/events/:event_id/snapshots/:snapshot_type
/// `snapshot_type` is MONTHLY_AT_EVENT or YEARLY_AT_EVENT
#[instrument(name = "list_snapshots", skip(state))]
pub async fn list_snapshots(
    State(state): State<AppState>,
    Path((league_id, event_id, snapshot_type)): Path<(LeagueId, EventId, String)>,
) -> Result<Json<Vec<RankingSnapshot>>, AppError> {
    let snapshot_type: SnapshotType = snapshot_type
        .parse()
        .map_err(|_| AppError::Validation(format!("unknown snapshot type: {snapshot_type}")))?;

    let rows = state
        .ranking_service
        .snapshot_rows(league_id, event_id, snapshot_type)
        .await?;

    Ok(Json(rows))
}

/// HTTP handler for the live leaderboard of a period
///
/// GET /leagues/:league_id/standings/:period
/// `period` is `YYYY-MM` or `YYYY`
#[instrument(name = "league_standings", skip(state))]
pub async fn league_standings(
    State(state): State<AppState>,
    Path((league_id, period)): Path<(LeagueId, String)>,
) -> Result<Json<Vec<Standing>>, AppError> {
    let period: PeriodKey = period.parse()?;

    let standings = state.ranking_service.standings(league_id, period).await?;

    Ok(Json(standings))
}

/// HTTP handler for a user's running totals
///
/// GET /users/:user_id/totals
#[instrument(name = "user_totals", skip(state))]
pub async fn user_totals(
    State(state): State<AppState>,
    Path(user_id): Path<UserId>,
) -> Result<Json<UserTotals>, AppError> {
    let totals = state.ranking_service.user_totals(user_id).await?;
    Ok(Json(totals))
}
