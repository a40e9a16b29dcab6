use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, instrument, warn};

use super::models::{
    BonusScope, Event, EventId, Fight, FightId, FightResult, League, LeagueId, LockStatus,
    PerfectCardAward, Pick, PickId, PointsDelta, RankDeltaUpdate, UserId, UserTotals,
};
use super::{ScoringRepository, ScoringTransaction};
use crate::errors::ScoringError;
use crate::ranking::models::{RankingSnapshot, SnapshotType, TimeWindow};

#[derive(Debug, Clone, Default)]
struct StoreState {
    events: HashMap<EventId, Event>,
    fights: HashMap<FightId, Fight>,
    picks: HashMap<PickId, Pick>,
    users: HashMap<UserId, UserTotals>,
    leagues: HashMap<LeagueId, League>,
    snapshots: Vec<RankingSnapshot>,
    awards: Vec<PerfectCardAward>,
}

impl StoreState {
    fn event_of_fight(&self, fight_id: FightId) -> Option<&Event> {
        self.fights
            .get(&fight_id)
            .and_then(|fight| self.events.get(&fight.event_id))
    }
}

/// In-memory implementation of ScoringRepository for development and testing
///
/// One async mutex guards the whole store, so transactions run one at a
/// time. Each transaction mutates a private copy that replaces the shared
/// state on commit; dropping it leaves the shared state untouched.
#[derive(Default)]
pub struct InMemoryScoringRepository {
    state: Arc<AsyncMutex<StoreState>>,
    failing_users: Arc<Mutex<HashSet<UserId>>>,
}

impl InMemoryScoringRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_event(&self, event: Event) {
        self.state.lock().await.events.insert(event.id, event);
    }

    pub async fn insert_fight(&self, fight: Fight) -> Result<(), ScoringError> {
        let mut state = self.state.lock().await;
        if !state.events.contains_key(&fight.event_id) {
            return Err(ScoringError::not_found("event", fight.event_id));
        }
        state.fights.insert(fight.id, fight);
        Ok(())
    }

    pub async fn insert_user(&self, user: UserTotals) {
        self.state.lock().await.users.insert(user.id, user);
    }

    pub async fn insert_league(&self, league: League) {
        self.state.lock().await.leagues.insert(league.id, league);
    }

    /// Stores a pick, enforcing one pick per (user, fight) and that the
    /// predicted fighter is on the fight.
    pub async fn insert_pick(&self, pick: Pick) -> Result<(), ScoringError> {
        let mut state = self.state.lock().await;
        let fight = state
            .fights
            .get(&pick.fight_id)
            .ok_or_else(|| ScoringError::not_found("fight", pick.fight_id))?;
        if !fight.has_competitor(pick.prediction.fighter_id) {
            return Err(ScoringError::Validation(format!(
                "fighter {} is not on fight {}",
                pick.prediction.fighter_id, pick.fight_id
            )));
        }
        if !state.users.contains_key(&pick.user_id) {
            return Err(ScoringError::not_found("user", pick.user_id));
        }
        let duplicate = state
            .picks
            .values()
            .any(|p| p.user_id == pick.user_id && p.fight_id == pick.fight_id && p.id != pick.id);
        if duplicate {
            return Err(ScoringError::Validation(format!(
                "user {} already has a pick on fight {}",
                pick.user_id, pick.fight_id
            )));
        }
        state.picks.insert(pick.id, pick);
        Ok(())
    }

    pub async fn user(&self, user_id: UserId) -> Option<UserTotals> {
        self.state.lock().await.users.get(&user_id).cloned()
    }

    pub async fn pick(&self, pick_id: PickId) -> Option<Pick> {
        self.state.lock().await.picks.get(&pick_id).cloned()
    }

    pub async fn fight(&self, fight_id: FightId) -> Option<Fight> {
        self.state.lock().await.fights.get(&fight_id).cloned()
    }

    pub async fn event(&self, event_id: EventId) -> Option<Event> {
        self.state.lock().await.events.get(&event_id).cloned()
    }

    pub async fn snapshots(&self) -> Vec<RankingSnapshot> {
        self.state.lock().await.snapshots.clone()
    }

    pub async fn awards(&self) -> Vec<PerfectCardAward> {
        self.state.lock().await.awards.clone()
    }

    /// Sum of `points_earned` over a user's picks. Used to check the
    /// running totals against their source of truth.
    pub async fn pick_points_of(&self, user_id: UserId) -> i64 {
        self.state
            .lock()
            .await
            .picks
            .values()
            .filter(|p| p.user_id == user_id)
            .map(|p| i64::from(p.points_earned))
            .sum()
    }

    /// Makes every later `increment_user_points` for this user fail, to
    /// exercise rollback paths.
    pub fn fail_user_updates_for(&self, user_id: UserId) {
        if let Ok(mut failing) = self.failing_users.lock() {
            failing.insert(user_id);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing_users.lock() {
            failing.clear();
        }
    }
}

#[async_trait]
impl ScoringRepository for InMemoryScoringRepository {
    async fn begin(&self) -> Result<Box<dyn ScoringTransaction>, ScoringError> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = StoreState::clone(&guard);
        let failing_users = self
            .failing_users
            .lock()
            .map(|set| set.clone())
            .unwrap_or_default();

        Ok(Box::new(InMemoryTransaction {
            guard,
            working,
            failing_users,
        }))
    }
}

pub struct InMemoryTransaction {
    guard: OwnedMutexGuard<StoreState>,
    working: StoreState,
    failing_users: HashSet<UserId>,
}

impl InMemoryTransaction {
    fn event_mut(&mut self, event_id: EventId) -> Result<&mut Event, ScoringError> {
        self.working
            .events
            .get_mut(&event_id)
            .ok_or_else(|| ScoringError::not_found("event", event_id))
    }

    fn user_mut(&mut self, user_id: UserId) -> Result<&mut UserTotals, ScoringError> {
        self.working
            .users
            .get_mut(&user_id)
            .ok_or_else(|| ScoringError::not_found("user", user_id))
    }
}

#[async_trait]
impl ScoringTransaction for InMemoryTransaction {
    async fn read_event(&mut self, event_id: EventId) -> Result<Option<Event>, ScoringError> {
        Ok(self.working.events.get(&event_id).cloned())
    }

    async fn set_event_calculating(
        &mut self,
        event_id: EventId,
        calculating: bool,
    ) -> Result<(), ScoringError> {
        self.event_mut(event_id)?.is_calculating_points = calculating;
        Ok(())
    }

    async fn set_event_lock_status(
        &mut self,
        event_id: EventId,
        status: LockStatus,
    ) -> Result<(), ScoringError> {
        self.event_mut(event_id)?.lock_status = status;
        Ok(())
    }

    async fn find_latest_finished_event_before(
        &mut self,
        event: &Event,
        window: &TimeWindow,
    ) -> Result<Option<Event>, ScoringError> {
        Ok(self
            .working
            .events
            .values()
            .filter(|e| {
                e.id != event.id && e.is_finished() && e.date < event.date && window.contains(e.date)
            })
            .max_by_key(|e| (e.date, e.id))
            .cloned())
    }

    async fn read_fight_for_update(
        &mut self,
        fight_id: FightId,
    ) -> Result<Option<Fight>, ScoringError> {
        Ok(self.working.fights.get(&fight_id).cloned())
    }

    async fn write_fight_result(
        &mut self,
        fight_id: FightId,
        result: &FightResult,
    ) -> Result<(), ScoringError> {
        let fight = self
            .working
            .fights
            .get_mut(&fight_id)
            .ok_or_else(|| ScoringError::not_found("fight", fight_id))?;
        fight.winner_id = Some(result.winner_id);
        fight.method = Some(result.method.clone());
        fight.round_end = Some(result.round_end.clone());
        fight.is_title = result.is_title;
        fight.category = result.category.clone();
        Ok(())
    }

    async fn list_fights_for_event(
        &mut self,
        event_id: EventId,
    ) -> Result<Vec<Fight>, ScoringError> {
        Ok(self
            .working
            .fights
            .values()
            .filter(|f| f.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn list_picks_for_fight(&mut self, fight_id: FightId) -> Result<Vec<Pick>, ScoringError> {
        Ok(self
            .working
            .picks
            .values()
            .filter(|p| p.fight_id == fight_id)
            .cloned()
            .collect())
    }

    async fn list_picks_for_event(&mut self, event_id: EventId) -> Result<Vec<Pick>, ScoringError> {
        let state = &self.working;
        Ok(state
            .picks
            .values()
            .filter(|p| {
                state
                    .fights
                    .get(&p.fight_id)
                    .is_some_and(|f| f.event_id == event_id)
            })
            .cloned()
            .collect())
    }

    async fn write_pick_points(
        &mut self,
        pick_id: PickId,
        points: i32,
    ) -> Result<(), ScoringError> {
        let pick = self
            .working
            .picks
            .get_mut(&pick_id)
            .ok_or_else(|| ScoringError::not_found("pick", pick_id))?;
        pick.points_earned = points;
        Ok(())
    }

    async fn read_user(&mut self, user_id: UserId) -> Result<Option<UserTotals>, ScoringError> {
        Ok(self.working.users.get(&user_id).cloned())
    }

    #[instrument(skip(self))]
    async fn increment_user_points(
        &mut self,
        user_id: UserId,
        delta: PointsDelta,
    ) -> Result<(), ScoringError> {
        if self.failing_users.contains(&user_id) {
            warn!(%user_id, "Injected failure on user update");
            return Err(ScoringError::Storage(format!(
                "injected failure updating user {user_id}"
            )));
        }
        self.user_mut(user_id)?.apply(delta);
        Ok(())
    }

    async fn set_rank_deltas(
        &mut self,
        user_id: UserId,
        update: RankDeltaUpdate,
    ) -> Result<(), ScoringError> {
        let user = self.user_mut(user_id)?;
        if let Some(monthly) = update.monthly {
            user.monthly_rank_delta = monthly;
        }
        if let Some(yearly) = update.yearly {
            user.yearly_rank_delta = yearly;
        }
        Ok(())
    }

    async fn read_league(&mut self, league_id: LeagueId) -> Result<Option<League>, ScoringError> {
        Ok(self.working.leagues.get(&league_id).cloned())
    }

    async fn list_league_points(
        &mut self,
        league_id: LeagueId,
        window: &TimeWindow,
    ) -> Result<Vec<(UserId, i64)>, ScoringError> {
        let state = &self.working;
        let league = state
            .leagues
            .get(&league_id)
            .ok_or_else(|| ScoringError::not_found("league", league_id))?;

        let in_window = |event: Option<&Event>| event.is_some_and(|e| window.contains(e.date));

        let mut totals: HashMap<UserId, i64> =
            league.member_ids.iter().map(|id| (*id, 0)).collect();

        for pick in state.picks.values() {
            if let Some(total) = totals.get_mut(&pick.user_id) {
                if in_window(state.event_of_fight(pick.fight_id)) {
                    *total += i64::from(pick.points_earned);
                }
            }
        }

        for award in &state.awards {
            if award.scope != BonusScope::AllWindows {
                continue;
            }
            if let Some(total) = totals.get_mut(&award.user_id) {
                if in_window(state.events.get(&award.event_id)) {
                    *total += award.points;
                }
            }
        }

        Ok(totals.into_iter().collect())
    }

    async fn read_snapshot_rows(
        &mut self,
        league_id: LeagueId,
        period_key: &str,
        snapshot_type: SnapshotType,
    ) -> Result<Vec<RankingSnapshot>, ScoringError> {
        let mut rows: Vec<RankingSnapshot> = self
            .working
            .snapshots
            .iter()
            .filter(|s| {
                s.league_id == league_id
                    && s.period_key == period_key
                    && s.snapshot_type == snapshot_type
            })
            .cloned()
            .collect();
        rows.sort_by_key(|s| s.rank);
        Ok(rows)
    }

    async fn delete_snapshot_rows(
        &mut self,
        league_id: LeagueId,
        period_key: &str,
        types: &[SnapshotType],
    ) -> Result<u64, ScoringError> {
        let before = self.working.snapshots.len();
        self.working.snapshots.retain(|s| {
            !(s.league_id == league_id
                && s.period_key == period_key
                && types.contains(&s.snapshot_type))
        });
        Ok((before - self.working.snapshots.len()) as u64)
    }

    async fn insert_snapshot_rows(&mut self, rows: &[RankingSnapshot]) -> Result<(), ScoringError> {
        for row in rows {
            let clash = self.working.snapshots.iter().any(|s| {
                s.league_id == row.league_id
                    && s.period_key == row.period_key
                    && s.snapshot_type == row.snapshot_type
                    && s.user_id == row.user_id
            });
            if clash {
                return Err(ScoringError::Storage(format!(
                    "duplicate {} snapshot for user {} in period {}",
                    row.snapshot_type, row.user_id, row.period_key
                )));
            }
            self.working.snapshots.push(row.clone());
        }
        Ok(())
    }

    async fn list_perfect_card_awards(
        &mut self,
        event_id: EventId,
    ) -> Result<Vec<PerfectCardAward>, ScoringError> {
        Ok(self
            .working
            .awards
            .iter()
            .filter(|a| a.event_id == event_id)
            .cloned()
            .collect())
    }

    async fn insert_perfect_card_award(
        &mut self,
        award: &PerfectCardAward,
    ) -> Result<(), ScoringError> {
        let exists = self
            .working
            .awards
            .iter()
            .any(|a| a.event_id == award.event_id && a.user_id == award.user_id);
        if exists {
            return Err(ScoringError::Storage(format!(
                "perfect card already awarded to {} for event {}",
                award.user_id, award.event_id
            )));
        }
        self.working.awards.push(award.clone());
        Ok(())
    }

    async fn delete_perfect_card_award(
        &mut self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<(), ScoringError> {
        self.working
            .awards
            .retain(|a| !(a.event_id == event_id && a.user_id == user_id));
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), ScoringError> {
        let InMemoryTransaction {
            mut guard, working, ..
        } = *self;
        *guard = working;
        debug!("In-memory transaction committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::Prediction;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    async fn seeded() -> (InMemoryScoringRepository, Event, Fight, UserTotals) {
        let repo = InMemoryScoringRepository::new();
        let event = Event::new("Card", Utc.with_ymd_and_hms(2024, 5, 4, 23, 0, 0).unwrap());
        let fight = Fight::new(event.id, Uuid::new_v4(), Uuid::new_v4());
        let user = UserTotals::new("ana");
        repo.insert_event(event.clone()).await;
        repo.insert_fight(fight.clone()).await.unwrap();
        repo.insert_user(user.clone()).await;
        (repo, event, fight, user)
    }

    fn prediction(fighter_id: Uuid) -> Prediction {
        Prediction {
            fighter_id,
            method: None,
            round: None,
        }
    }

    #[tokio::test]
    async fn rejects_second_pick_on_same_fight() {
        let (repo, _, fight, user) = seeded().await;
        repo.insert_pick(Pick::new(user.id, fight.id, prediction(fight.fighter_a_id)))
            .await
            .unwrap();

        let result = repo
            .insert_pick(Pick::new(user.id, fight.id, prediction(fight.fighter_b_id)))
            .await;
        assert!(matches!(result, Err(ScoringError::Validation(_))));
    }

    #[tokio::test]
    async fn rejects_pick_on_fighter_not_in_fight() {
        let (repo, _, fight, user) = seeded().await;
        let result = repo
            .insert_pick(Pick::new(user.id, fight.id, prediction(Uuid::new_v4())))
            .await;
        assert!(matches!(result, Err(ScoringError::Validation(_))));
    }

    #[tokio::test]
    async fn committed_writes_become_visible() {
        let (repo, _, _, user) = seeded().await;

        let mut tx = repo.begin().await.unwrap();
        tx.increment_user_points(user.id, PointsDelta::uniform(40))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let stored = repo.user(user.id).await.unwrap();
        assert_eq!(stored.points, 40);
        assert_eq!(stored.monthly_points, 40);
        assert_eq!(stored.yearly_points, 40);
    }

    #[tokio::test]
    async fn dropped_transaction_discards_writes() {
        let (repo, event, _, user) = seeded().await;

        {
            let mut tx = repo.begin().await.unwrap();
            tx.increment_user_points(user.id, PointsDelta::uniform(40))
                .await
                .unwrap();
            tx.set_event_calculating(event.id, true).await.unwrap();
        }

        assert_eq!(repo.user(user.id).await.unwrap().points, 0);
        assert!(!repo.event(event.id).await.unwrap().is_calculating_points);
    }

    #[tokio::test]
    async fn increment_for_unknown_user_is_not_found() {
        let (repo, _, _, _) = seeded().await;
        let mut tx = repo.begin().await.unwrap();
        let result = tx
            .increment_user_points(Uuid::new_v4(), PointsDelta::uniform(1))
            .await;
        assert!(result.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn injected_failures_hit_only_the_marked_user() {
        let (repo, _, _, user) = seeded().await;
        repo.fail_user_updates_for(user.id);

        let mut tx = repo.begin().await.unwrap();
        let result = tx
            .increment_user_points(user.id, PointsDelta::uniform(1))
            .await;
        assert!(matches!(result, Err(ScoringError::Storage(_))));
        drop(tx);

        repo.clear_failures();
        let mut tx = repo.begin().await.unwrap();
        tx.increment_user_points(user.id, PointsDelta::uniform(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn finds_latest_finished_event_inside_window() {
        let repo = InMemoryScoringRepository::new();
        let date = |d| Utc.with_ymd_and_hms(2024, 5, d, 23, 0, 0).unwrap();

        let mut early = Event::new("early", date(4));
        early.lock_status = LockStatus::Finished;
        let mut later = Event::new("later", date(11));
        later.lock_status = LockStatus::Finished;
        let unfinished = Event::new("unfinished", date(18));
        let target = Event::new("target", date(25));

        for event in [&early, &later, &unfinished, &target] {
            repo.insert_event(event.clone()).await;
        }

        let window = TimeWindow {
            start: date(1),
            end: Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        };
        let mut tx = repo.begin().await.unwrap();
        let found = tx
            .find_latest_finished_event_before(&target, &window)
            .await
            .unwrap();
        assert_eq!(found.map(|e| e.id), Some(later.id));

        let narrow = TimeWindow {
            start: date(12),
            end: date(30),
        };
        let found = tx
            .find_latest_finished_event_before(&target, &narrow)
            .await
            .unwrap();
        assert!(found.is_none());
    }
}
