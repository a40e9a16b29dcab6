use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::models::{PeriodKey, RankingSnapshot, SnapshotType, Standing};
use super::standings::{baseline_ranks, rank_delta, rank_standings};
use crate::errors::ScoringError;
use crate::store::models::{Event, EventId, LeagueId, RankDeltaUpdate, UserId, UserTotals};
use crate::store::{ScoringRepository, ScoringTransaction};

const CONSOLIDATED_TYPES: [SnapshotType; 2] =
    [SnapshotType::MonthlyAtEvent, SnapshotType::YearlyAtEvent];

/// Freezes league leaderboards at an event and derives how far each member
/// moved since the previous finished event in the same month and year.
pub struct RankingSnapshotService {
    repository: Arc<dyn ScoringRepository>,
}

impl RankingSnapshotService {
    pub fn new(repository: Arc<dyn ScoringRepository>) -> Self {
        Self { repository }
    }

    /// Writes monthly and yearly snapshot rows for `event_id` and the rank
    /// deltas of every league member, replacing anything a previous run
    /// wrote for the same event. Returns the number of rows written.
    #[instrument(skip(self))]
    pub async fn consolidate_event(
        &self,
        league_id: LeagueId,
        event_id: EventId,
    ) -> Result<usize, ScoringError> {
        let mut tx = self.repository.begin().await?;

        tx.read_league(league_id)
            .await?
            .ok_or_else(|| ScoringError::not_found("league", league_id))?;
        let event = tx
            .read_event(event_id)
            .await?
            .ok_or_else(|| ScoringError::not_found("event", event_id))?;
        if !event.is_finished() {
            warn!(
                %event_id,
                status = %event.lock_status,
                "Consolidating an event that is not finished"
            );
        }

        let now = Utc::now();
        let monthly = self
            .consolidate_period(
                tx.as_mut(),
                league_id,
                &event,
                PeriodKey::month_of(event.date),
                SnapshotType::MonthlyAtEvent,
                now,
            )
            .await?;
        let yearly = self
            .consolidate_period(
                tx.as_mut(),
                league_id,
                &event,
                PeriodKey::year_of(event.date),
                SnapshotType::YearlyAtEvent,
                now,
            )
            .await?;

        let mut updates: BTreeMap<UserId, RankDeltaUpdate> = BTreeMap::new();
        for (user_id, delta) in &monthly.deltas {
            updates.entry(*user_id).or_default().monthly = Some(*delta);
        }
        for (user_id, delta) in &yearly.deltas {
            updates.entry(*user_id).or_default().yearly = Some(*delta);
        }

        let rows: Vec<RankingSnapshot> = monthly.rows.into_iter().chain(yearly.rows).collect();
        let period_key = event.id.to_string();

        let replaced = tx
            .delete_snapshot_rows(league_id, &period_key, &CONSOLIDATED_TYPES)
            .await?;
        tx.insert_snapshot_rows(&rows).await?;
        for (user_id, update) in updates {
            tx.set_rank_deltas(user_id, update).await?;
        }
        tx.commit().await?;

        info!(
            %league_id,
            %event_id,
            written = rows.len(),
            replaced,
            "Event consolidated"
        );
        Ok(rows.len())
    }

    /// Snapshot rows recorded for `event_id`, best rank first.
    #[instrument(skip(self))]
    pub async fn snapshot_rows(
        &self,
        league_id: LeagueId,
        event_id: EventId,
        snapshot_type: SnapshotType,
    ) -> Result<Vec<RankingSnapshot>, ScoringError> {
        let mut tx = self.repository.begin().await?;
        tx.read_league(league_id)
            .await?
            .ok_or_else(|| ScoringError::not_found("league", league_id))?;
        let rows = tx
            .read_snapshot_rows(league_id, &event_id.to_string(), snapshot_type)
            .await?;
        tx.commit().await?;
        Ok(rows)
    }

    /// Live leaderboard of `league_id` over `period`.
    #[instrument(skip(self))]
    pub async fn standings(
        &self,
        league_id: LeagueId,
        period: PeriodKey,
    ) -> Result<Vec<Standing>, ScoringError> {
        let window = period.window()?;
        let mut tx = self.repository.begin().await?;
        tx.read_league(league_id)
            .await?
            .ok_or_else(|| ScoringError::not_found("league", league_id))?;
        let standings = rank_standings(tx.list_league_points(league_id, &window).await?);
        tx.commit().await?;
        Ok(standings)
    }

    /// Running totals and latest rank movement of one user.
    #[instrument(skip(self))]
    pub async fn user_totals(&self, user_id: UserId) -> Result<UserTotals, ScoringError> {
        let mut tx = self.repository.begin().await?;
        let user = tx
            .read_user(user_id)
            .await?
            .ok_or_else(|| ScoringError::not_found("user", user_id))?;
        tx.commit().await?;
        Ok(user)
    }

    async fn consolidate_period(
        &self,
        tx: &mut dyn ScoringTransaction,
        league_id: LeagueId,
        event: &Event,
        period: PeriodKey,
        snapshot_type: SnapshotType,
        captured_at: DateTime<Utc>,
    ) -> Result<PeriodSnapshot, ScoringError> {
        let window = period.window()?;

        let baseline = match tx.find_latest_finished_event_before(event, &window).await? {
            Some(previous) => {
                let rows = tx
                    .read_snapshot_rows(league_id, &previous.id.to_string(), snapshot_type)
                    .await?;
                debug!(
                    %period,
                    previous_event = %previous.id,
                    baseline_rows = rows.len(),
                    "Loaded rank baseline"
                );
                baseline_ranks(&rows)
            }
            None => {
                debug!(%period, "No earlier finished event in period");
                HashMap::new()
            }
        };

        let standings = rank_standings(tx.list_league_points(league_id, &window).await?);
        Ok(PeriodSnapshot::build(
            league_id,
            event.id,
            snapshot_type,
            &standings,
            &baseline,
            captured_at,
        ))
    }
}

struct PeriodSnapshot {
    rows: Vec<RankingSnapshot>,
    deltas: Vec<(UserId, i32)>,
}

impl PeriodSnapshot {
    fn build(
        league_id: LeagueId,
        event_id: EventId,
        snapshot_type: SnapshotType,
        standings: &[Standing],
        baseline: &HashMap<UserId, i32>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        let period_key = event_id.to_string();
        let mut rows = Vec::with_capacity(standings.len());
        let mut deltas = Vec::with_capacity(standings.len());

        for standing in standings {
            deltas.push((
                standing.user_id,
                rank_delta(baseline.get(&standing.user_id).copied(), standing.rank),
            ));
            rows.push(RankingSnapshot {
                id: Uuid::new_v4(),
                league_id,
                period_key: period_key.clone(),
                snapshot_type,
                user_id: standing.user_id,
                rank: standing.rank,
                points: standing.points,
                created_at: captured_at,
            });
        }

        Self { rows, deltas }
    }
}
