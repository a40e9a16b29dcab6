use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::models::{
    BonusScope, Event, EventId, Fight, FightId, FightResult, League, LeagueId, LockStatus,
    PerfectCardAward, Pick, PickId, PointsDelta, Prediction, RankDeltaUpdate, UserId, UserTotals,
};
use super::{ScoringRepository, ScoringTransaction};
use crate::errors::ScoringError;
use crate::ranking::models::{RankingSnapshot, SnapshotType, TimeWindow};

const EVENT_COLUMNS: &str = "id, name, date, lock_status, is_calculating_points";
const FIGHT_COLUMNS: &str =
    "id, event_id, fighter_a_id, fighter_b_id, rounds, is_title, category, winner_id, method, round_end";
const PICK_COLUMNS: &str = "p.id, p.user_id, p.fight_id, p.fighter_id, p.method, p.round, p.points_earned";

/// Rows per multi-row INSERT, well under the 65535 bind parameter limit.
const SNAPSHOT_INSERT_CHUNK: usize = 1000;

/// PostgreSQL implementation of the scoring store
pub struct PostgresScoringRepository {
    pool: PgPool,
    statement_timeout: Duration,
}

impl PostgresScoringRepository {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            statement_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_statement_timeout(mut self, statement_timeout: Duration) -> Self {
        self.statement_timeout = statement_timeout;
        self
    }

    pub async fn migrate(&self) -> Result<(), ScoringError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ScoringError::Storage(e.to_string()))
    }
}

#[async_trait]
impl ScoringRepository for PostgresScoringRepository {
    #[instrument(skip(self))]
    async fn begin(&self) -> Result<Box<dyn ScoringTransaction>, ScoringError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        // SET does not accept bind parameters
        let timeout_ms = self.statement_timeout.as_millis();
        sqlx::query(&format!("SET LOCAL statement_timeout = {timeout_ms}"))
            .execute(&mut *tx)
            .await?;

        debug!(timeout_ms, "Opened serializable transaction");
        Ok(Box::new(PostgresTransaction { tx }))
    }
}

pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

fn event_from_row(row: &PgRow) -> Result<Event, ScoringError> {
    let status: String = row.try_get("lock_status")?;
    Ok(Event {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        date: row.try_get("date")?,
        lock_status: status
            .parse::<LockStatus>()
            .map_err(|_| ScoringError::Storage(format!("unknown lock status {status:?}")))?,
        is_calculating_points: row.try_get("is_calculating_points")?,
    })
}

fn fight_from_row(row: &PgRow) -> Result<Fight, ScoringError> {
    Ok(Fight {
        id: row.try_get("id")?,
        event_id: row.try_get("event_id")?,
        fighter_a_id: row.try_get("fighter_a_id")?,
        fighter_b_id: row.try_get("fighter_b_id")?,
        rounds: row.try_get("rounds")?,
        is_title: row.try_get("is_title")?,
        category: row.try_get("category")?,
        winner_id: row.try_get("winner_id")?,
        method: row.try_get("method")?,
        round_end: row.try_get("round_end")?,
    })
}

fn pick_from_row(row: &PgRow) -> Result<Pick, ScoringError> {
    Ok(Pick {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        fight_id: row.try_get("fight_id")?,
        prediction: Prediction {
            fighter_id: row.try_get("fighter_id")?,
            method: row.try_get("method")?,
            round: row.try_get("round")?,
        },
        points_earned: row.try_get("points_earned")?,
    })
}

fn snapshot_from_row(row: &PgRow) -> Result<RankingSnapshot, ScoringError> {
    let snapshot_type: String = row.try_get("snapshot_type")?;
    Ok(RankingSnapshot {
        id: row.try_get("id")?,
        league_id: row.try_get("league_id")?,
        period_key: row.try_get("period_key")?,
        snapshot_type: snapshot_type.parse().map_err(|_| {
            ScoringError::Storage(format!("unknown snapshot type {snapshot_type:?}"))
        })?,
        user_id: row.try_get("user_id")?,
        rank: row.try_get("rank")?,
        points: row.try_get("points")?,
        created_at: row.try_get("created_at")?,
    })
}

fn award_from_row(row: &PgRow) -> Result<PerfectCardAward, ScoringError> {
    let scope: String = row.try_get("scope")?;
    Ok(PerfectCardAward {
        event_id: row.try_get("event_id")?,
        user_id: row.try_get("user_id")?,
        points: row.try_get("points")?,
        scope: scope
            .parse::<BonusScope>()
            .map_err(|_| ScoringError::Storage(format!("unknown bonus scope {scope:?}")))?,
        awarded_at: row.try_get("awarded_at")?,
    })
}

#[async_trait]
impl ScoringTransaction for PostgresTransaction {
    async fn read_event(&mut self, event_id: EventId) -> Result<Option<Event>, ScoringError> {
        let row = sqlx::query(&format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = $1"))
            .bind(event_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    async fn set_event_calculating(
        &mut self,
        event_id: EventId,
        calculating: bool,
    ) -> Result<(), ScoringError> {
        let result = sqlx::query("UPDATE events SET is_calculating_points = $2 WHERE id = $1")
            .bind(event_id)
            .bind(calculating)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ScoringError::not_found("event", event_id));
        }
        Ok(())
    }

    async fn set_event_lock_status(
        &mut self,
        event_id: EventId,
        status: LockStatus,
    ) -> Result<(), ScoringError> {
        let result = sqlx::query("UPDATE events SET lock_status = $2 WHERE id = $1")
            .bind(event_id)
            .bind(status.as_ref())
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ScoringError::not_found("event", event_id));
        }
        Ok(())
    }

    async fn find_latest_finished_event_before(
        &mut self,
        event: &Event,
        window: &TimeWindow,
    ) -> Result<Option<Event>, ScoringError> {
        let row = sqlx::query(&format!(
            "SELECT {EVENT_COLUMNS} FROM events \
             WHERE id <> $1 AND lock_status = $2 AND date < $3 AND date >= $4 AND date < $5 \
             ORDER BY date DESC, id DESC LIMIT 1"
        ))
        .bind(event.id)
        .bind(LockStatus::Finished.as_ref())
        .bind(event.date)
        .bind(window.start)
        .bind(window.end)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(event_from_row).transpose()
    }

    #[instrument(skip(self))]
    async fn read_fight_for_update(
        &mut self,
        fight_id: FightId,
    ) -> Result<Option<Fight>, ScoringError> {
        let row = sqlx::query(&format!(
            "SELECT {FIGHT_COLUMNS} FROM fights WHERE id = $1 FOR UPDATE"
        ))
        .bind(fight_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        row.as_ref().map(fight_from_row).transpose()
    }

    async fn write_fight_result(
        &mut self,
        fight_id: FightId,
        result: &FightResult,
    ) -> Result<(), ScoringError> {
        let outcome = sqlx::query(
            "UPDATE fights SET winner_id = $2, method = $3, round_end = $4, is_title = $5, category = $6 \
             WHERE id = $1",
        )
        .bind(fight_id)
        .bind(result.winner_id)
        .bind(&result.method)
        .bind(&result.round_end)
        .bind(result.is_title)
        .bind(&result.category)
        .execute(&mut *self.tx)
        .await?;
        if outcome.rows_affected() == 0 {
            return Err(ScoringError::not_found("fight", fight_id));
        }
        Ok(())
    }

    async fn list_fights_for_event(
        &mut self,
        event_id: EventId,
    ) -> Result<Vec<Fight>, ScoringError> {
        let rows = sqlx::query(&format!(
            "SELECT {FIGHT_COLUMNS} FROM fights WHERE event_id = $1"
        ))
        .bind(event_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(fight_from_row).collect()
    }

    async fn list_picks_for_fight(&mut self, fight_id: FightId) -> Result<Vec<Pick>, ScoringError> {
        let rows = sqlx::query(&format!(
            "SELECT {PICK_COLUMNS} FROM picks p WHERE p.fight_id = $1 FOR UPDATE"
        ))
        .bind(fight_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(pick_from_row).collect()
    }

    async fn list_picks_for_event(&mut self, event_id: EventId) -> Result<Vec<Pick>, ScoringError> {
        let rows = sqlx::query(&format!(
            "SELECT {PICK_COLUMNS} FROM picks p JOIN fights f ON f.id = p.fight_id WHERE f.event_id = $1"
        ))
        .bind(event_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(pick_from_row).collect()
    }

    async fn write_pick_points(
        &mut self,
        pick_id: PickId,
        points: i32,
    ) -> Result<(), ScoringError> {
        let result = sqlx::query("UPDATE picks SET points_earned = $2 WHERE id = $1")
            .bind(pick_id)
            .bind(points)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(ScoringError::not_found("pick", pick_id));
        }
        Ok(())
    }

    async fn read_user(&mut self, user_id: UserId) -> Result<Option<UserTotals>, ScoringError> {
        let row = sqlx::query(
            "SELECT id, name, points, monthly_points, yearly_points, monthly_rank_delta, yearly_rank_delta \
             FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(|row| -> Result<UserTotals, ScoringError> {
            Ok(UserTotals {
                id: row.try_get("id")?,
                name: row.try_get("name")?,
                points: row.try_get("points")?,
                monthly_points: row.try_get("monthly_points")?,
                yearly_points: row.try_get("yearly_points")?,
                monthly_rank_delta: row.try_get("monthly_rank_delta")?,
                yearly_rank_delta: row.try_get("yearly_rank_delta")?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self))]
    async fn increment_user_points(
        &mut self,
        user_id: UserId,
        delta: PointsDelta,
    ) -> Result<(), ScoringError> {
        let result = sqlx::query(
            "UPDATE users SET points = points + $2, monthly_points = monthly_points + $3, \
             yearly_points = yearly_points + $4 WHERE id = $1",
        )
        .bind(user_id)
        .bind(delta.all_time)
        .bind(delta.monthly)
        .bind(delta.yearly)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            warn!(error = %e, %user_id, "Failed to increment user points");
            ScoringError::from(e)
        })?;
        if result.rows_affected() == 0 {
            return Err(ScoringError::not_found("user", user_id));
        }
        Ok(())
    }

    async fn set_rank_deltas(
        &mut self,
        user_id: UserId,
        update: RankDeltaUpdate,
    ) -> Result<(), ScoringError> {
        let result = sqlx::query(
            "UPDATE users SET monthly_rank_delta = COALESCE($2, monthly_rank_delta), \
             yearly_rank_delta = COALESCE($3, yearly_rank_delta) WHERE id = $1",
        )
        .bind(user_id)
        .bind(update.monthly)
        .bind(update.yearly)
        .execute(&mut *self.tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(ScoringError::not_found("user", user_id));
        }
        Ok(())
    }

    async fn read_league(&mut self, league_id: LeagueId) -> Result<Option<League>, ScoringError> {
        let Some(row) = sqlx::query("SELECT id, name FROM leagues WHERE id = $1")
            .bind(league_id)
            .fetch_optional(&mut *self.tx)
            .await?
        else {
            return Ok(None);
        };

        let member_ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT user_id FROM league_members WHERE league_id = $1 ORDER BY user_id",
        )
        .bind(league_id)
        .fetch_all(&mut *self.tx)
        .await?;

        Ok(Some(League {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            member_ids,
        }))
    }

    async fn list_league_points(
        &mut self,
        league_id: LeagueId,
        window: &TimeWindow,
    ) -> Result<Vec<(UserId, i64)>, ScoringError> {
        let rows = sqlx::query(
            r#"
            SELECT lm.user_id,
                   (COALESCE((
                        SELECT SUM(p.points_earned)
                        FROM picks p
                        JOIN fights f ON f.id = p.fight_id
                        JOIN events e ON e.id = f.event_id
                        WHERE p.user_id = lm.user_id AND e.date >= $2 AND e.date < $3
                    ), 0)
                  + COALESCE((
                        SELECT SUM(a.points)
                        FROM perfect_card_awards a
                        JOIN events e ON e.id = a.event_id
                        WHERE a.user_id = lm.user_id AND a.scope = $4
                          AND e.date >= $2 AND e.date < $3
                    ), 0))::BIGINT AS points
            FROM league_members lm
            WHERE lm.league_id = $1
            "#,
        )
        .bind(league_id)
        .bind(window.start)
        .bind(window.end)
        .bind(BonusScope::AllWindows.as_ref())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.iter()
            .map(|row| -> Result<(UserId, i64), ScoringError> {
                Ok((row.try_get("user_id")?, row.try_get("points")?))
            })
            .collect()
    }

    async fn read_snapshot_rows(
        &mut self,
        league_id: LeagueId,
        period_key: &str,
        snapshot_type: SnapshotType,
    ) -> Result<Vec<RankingSnapshot>, ScoringError> {
        let rows = sqlx::query(
            "SELECT id, league_id, period_key, snapshot_type, user_id, rank, points, created_at \
             FROM ranking_snapshots \
             WHERE league_id = $1 AND period_key = $2 AND snapshot_type = $3 ORDER BY rank",
        )
        .bind(league_id)
        .bind(period_key)
        .bind(snapshot_type.as_ref())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(snapshot_from_row).collect()
    }

    async fn delete_snapshot_rows(
        &mut self,
        league_id: LeagueId,
        period_key: &str,
        types: &[SnapshotType],
    ) -> Result<u64, ScoringError> {
        let types: Vec<String> = types.iter().map(|t| t.to_string()).collect();
        let result = sqlx::query(
            "DELETE FROM ranking_snapshots \
             WHERE league_id = $1 AND period_key = $2 AND snapshot_type = ANY($3)",
        )
        .bind(league_id)
        .bind(period_key)
        .bind(types)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self, rows), fields(row_count = rows.len()))]
    async fn insert_snapshot_rows(&mut self, rows: &[RankingSnapshot]) -> Result<(), ScoringError> {
        for chunk in rows.chunks(SNAPSHOT_INSERT_CHUNK) {
            let mut query = QueryBuilder::<Postgres>::new(
                "INSERT INTO ranking_snapshots \
                 (id, league_id, period_key, snapshot_type, user_id, rank, points, created_at) ",
            );
            query.push_values(chunk, |mut b, row| {
                b.push_bind(row.id)
                    .push_bind(row.league_id)
                    .push_bind(row.period_key.clone())
                    .push_bind(row.snapshot_type.to_string())
                    .push_bind(row.user_id)
                    .push_bind(row.rank)
                    .push_bind(row.points)
                    .push_bind(row.created_at);
            });
            query.build().execute(&mut *self.tx).await?;
        }
        Ok(())
    }

    async fn list_perfect_card_awards(
        &mut self,
        event_id: EventId,
    ) -> Result<Vec<PerfectCardAward>, ScoringError> {
        let rows = sqlx::query(
            "SELECT event_id, user_id, points, scope, awarded_at \
             FROM perfect_card_awards WHERE event_id = $1",
        )
        .bind(event_id)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter().map(award_from_row).collect()
    }

    async fn insert_perfect_card_award(
        &mut self,
        award: &PerfectCardAward,
    ) -> Result<(), ScoringError> {
        sqlx::query(
            "INSERT INTO perfect_card_awards (event_id, user_id, points, scope, awarded_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(award.event_id)
        .bind(award.user_id)
        .bind(award.points)
        .bind(award.scope.as_ref())
        .bind(award.awarded_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn delete_perfect_card_award(
        &mut self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<(), ScoringError> {
        sqlx::query("DELETE FROM perfect_card_awards WHERE event_id = $1 AND user_id = $2")
            .bind(event_id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), ScoringError> {
        self.tx.commit().await?;
        debug!("Transaction committed");
        Ok(())
    }
}
