//! Storage collaborator for the scoring core.
//!
//! Every mutation happens inside a [`ScoringTransaction`]. A transaction is
//! either committed as a whole or dropped, and dropping it discards every
//! write made through it.

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::InMemoryScoringRepository;
pub use postgres::PostgresScoringRepository;

use async_trait::async_trait;

use crate::errors::ScoringError;
use crate::ranking::models::{RankingSnapshot, SnapshotType, TimeWindow};
use models::{
    Event, EventId, Fight, FightId, FightResult, League, LeagueId, LockStatus, PerfectCardAward,
    Pick, PickId, PointsDelta, RankDeltaUpdate, UserId, UserTotals,
};

#[async_trait]
pub trait ScoringRepository: Send + Sync {
    /// Opens a serializable transaction.
    async fn begin(&self) -> Result<Box<dyn ScoringTransaction>, ScoringError>;
}

#[async_trait]
pub trait ScoringTransaction: Send {
    async fn read_event(&mut self, event_id: EventId) -> Result<Option<Event>, ScoringError>;
    async fn set_event_calculating(
        &mut self,
        event_id: EventId,
        calculating: bool,
    ) -> Result<(), ScoringError>;
    async fn set_event_lock_status(
        &mut self,
        event_id: EventId,
        status: LockStatus,
    ) -> Result<(), ScoringError>;

    /// Latest finished event dated strictly before `event` and inside `window`.
    async fn find_latest_finished_event_before(
        &mut self,
        event: &Event,
        window: &TimeWindow,
    ) -> Result<Option<Event>, ScoringError>;

    /// Reads a fight and holds a row lock on it until the transaction ends.
    async fn read_fight_for_update(
        &mut self,
        fight_id: FightId,
    ) -> Result<Option<Fight>, ScoringError>;
    async fn write_fight_result(
        &mut self,
        fight_id: FightId,
        result: &FightResult,
    ) -> Result<(), ScoringError>;
    async fn list_fights_for_event(&mut self, event_id: EventId)
        -> Result<Vec<Fight>, ScoringError>;

    async fn list_picks_for_fight(&mut self, fight_id: FightId) -> Result<Vec<Pick>, ScoringError>;
    async fn list_picks_for_event(&mut self, event_id: EventId) -> Result<Vec<Pick>, ScoringError>;
    async fn write_pick_points(&mut self, pick_id: PickId, points: i32)
        -> Result<(), ScoringError>;

    async fn read_user(&mut self, user_id: UserId) -> Result<Option<UserTotals>, ScoringError>;
    /// Fails with `NotFound` when the user does not exist.
    async fn increment_user_points(
        &mut self,
        user_id: UserId,
        delta: PointsDelta,
    ) -> Result<(), ScoringError>;
    async fn set_rank_deltas(
        &mut self,
        user_id: UserId,
        update: RankDeltaUpdate,
    ) -> Result<(), ScoringError>;

    async fn read_league(&mut self, league_id: LeagueId) -> Result<Option<League>, ScoringError>;
    /// Points earned by every league member on events dated inside `window`,
    /// including perfect-card awards that count toward windowed totals.
    /// Members without points are returned with zero.
    async fn list_league_points(
        &mut self,
        league_id: LeagueId,
        window: &TimeWindow,
    ) -> Result<Vec<(UserId, i64)>, ScoringError>;

    async fn read_snapshot_rows(
        &mut self,
        league_id: LeagueId,
        period_key: &str,
        snapshot_type: SnapshotType,
    ) -> Result<Vec<RankingSnapshot>, ScoringError>;
    async fn delete_snapshot_rows(
        &mut self,
        league_id: LeagueId,
        period_key: &str,
        types: &[SnapshotType],
    ) -> Result<u64, ScoringError>;
    async fn insert_snapshot_rows(&mut self, rows: &[RankingSnapshot]) -> Result<(), ScoringError>;

    async fn list_perfect_card_awards(
        &mut self,
        event_id: EventId,
    ) -> Result<Vec<PerfectCardAward>, ScoringError>;
    async fn insert_perfect_card_award(
        &mut self,
        award: &PerfectCardAward,
    ) -> Result<(), ScoringError>;
    async fn delete_perfect_card_award(
        &mut self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<(), ScoringError>;

    async fn commit(self: Box<Self>) -> Result<(), ScoringError>;
}
