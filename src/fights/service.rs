use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tracing::{debug, info, instrument, warn};

use super::rescore::rescore_picks;
use super::types::FightResultRequest;
use crate::completion::{CompletionOutcome, PerfectCardDetector};
use crate::config::ScoringConfig;
use crate::errors::ScoringError;
use crate::scoring::ResolvedFightView;
use crate::store::models::{EventId, FightId};
use crate::store::ScoringRepository;

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionSummary {
    pub fight_id: FightId,
    pub event_id: EventId,
    pub total_picks: usize,
    pub winner_picks: usize,
    pub picks_rescored: usize,
    pub users_updated: usize,
    pub points_rolled_back: i64,
    pub points_awarded: i64,
    pub completion: CompletionOutcome,
}

/// Applies official results to fights and keeps every dependent score in
/// step with them.
///
/// User totals are running sums maintained by deltas rather than
/// aggregates computed on read. Reads stay cheap, but every resolution
/// must back out what the previous one awarded before applying new
/// points, and it all happens in one transaction so a failure leaves
/// totals exactly as they were.
pub struct FightResolutionService {
    repository: Arc<dyn ScoringRepository>,
    detector: PerfectCardDetector,
    config: ScoringConfig,
    fight_mutexes: Arc<RwLock<HashMap<FightId, Arc<AsyncMutex<()>>>>>,
}

impl FightResolutionService {
    pub fn new(repository: Arc<dyn ScoringRepository>, config: ScoringConfig) -> Self {
        Self {
            repository,
            detector: PerfectCardDetector::new(config.perfect_card_scope),
            config,
            fight_mutexes: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Writes `request` as the official result of `fight_id` and rescores
    /// every pick on it. Re-resolving replaces the previous outcome; it
    /// never accumulates.
    #[instrument(skip(self, request))]
    pub async fn resolve_fight(
        &self,
        fight_id: FightId,
        request: FightResultRequest,
    ) -> Result<ResolutionSummary, ScoringError> {
        let timeout = self.config.resolution_timeout;
        let fight_lock = self.fight_lock(fight_id).await;
        let outcome = tokio::time::timeout(timeout, async {
            let _guard = fight_lock.lock().await;
            self.resolve_in_transaction(fight_id, request).await
        })
        .await;
        self.clear_fight_lock(fight_id, fight_lock).await;

        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(%fight_id, ?timeout, "Fight resolution timed out, nothing committed");
                Err(ScoringError::Timeout(timeout))
            }
        }
    }

    /// `is_calculating_points` is set and cleared inside this transaction,
    /// so other transactions never observe it as `true`.
    async fn resolve_in_transaction(
        &self,
        fight_id: FightId,
        request: FightResultRequest,
    ) -> Result<ResolutionSummary, ScoringError> {
        let mut tx = self.repository.begin().await?;

        let fight = tx
            .read_fight_for_update(fight_id)
            .await?
            .ok_or_else(|| ScoringError::not_found("fight", fight_id))?;
        let result = request.validate_for(&fight)?;

        let event = tx
            .read_event(fight.event_id)
            .await?
            .ok_or_else(|| ScoringError::not_found("event", fight.event_id))?;

        tx.set_event_calculating(event.id, true).await?;
        tx.write_fight_result(fight_id, &result).await?;

        let view = ResolvedFightView::with_result(&fight, &result);
        let picks = tx.list_picks_for_fight(fight_id).await?;
        let rescore = rescore_picks(&view, &picks);

        for (pick_id, points) in &rescore.pick_updates {
            tx.write_pick_points(*pick_id, *points).await?;
        }
        for (user_id, delta) in &rescore.user_deltas {
            tx.increment_user_points(*user_id, *delta).await?;
        }
        debug!(
            picks = rescore.pick_updates.len(),
            users = rescore.user_deltas.len(),
            "Pick points and user totals written"
        );

        tx.set_event_calculating(event.id, false).await?;

        let completion = self.detector.evaluate(tx.as_mut(), &event, &view).await?;

        tx.commit().await?;

        info!(
            %fight_id,
            event_id = %event.id,
            total_picks = rescore.total_picks,
            winner_picks = rescore.winner_picks,
            rolled_back = rescore.points_rolled_back,
            awarded = rescore.points_awarded,
            event_complete = completion.event_complete,
            "Fight resolved"
        );

        Ok(ResolutionSummary {
            fight_id,
            event_id: event.id,
            total_picks: rescore.total_picks,
            winner_picks: rescore.winner_picks,
            picks_rescored: rescore.pick_updates.len(),
            users_updated: rescore.user_deltas.len(),
            points_rolled_back: rescore.points_rolled_back,
            points_awarded: rescore.points_awarded,
            completion,
        })
    }

    async fn fight_lock(&self, fight_id: FightId) -> Arc<AsyncMutex<()>> {
        {
            let guard = self.fight_mutexes.read().await;
            if let Some(lock) = guard.get(&fight_id) {
                return lock.clone();
            }
        }

        let mut guard = self.fight_mutexes.write().await;
        guard
            .entry(fight_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drops the map entry once no other resolution holds or waits on it.
    async fn clear_fight_lock(&self, fight_id: FightId, fight_lock: Arc<AsyncMutex<()>>) {
        let mut guard = self.fight_mutexes.write().await;
        // map + this call
        if Arc::strong_count(&fight_lock) == 2 {
            guard.remove(&fight_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::{Event, Fight, Pick, Prediction, UserTotals};
    use crate::store::InMemoryScoringRepository;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;
    use uuid::Uuid;

    struct Fixture {
        repo: Arc<InMemoryScoringRepository>,
        service: FightResolutionService,
        fight: Fight,
        alice: UserTotals,
        bob: UserTotals,
        alice_pick: Pick,
    }

    async fn fixture() -> Fixture {
        let repo = Arc::new(InMemoryScoringRepository::new());
        let event = Event::new("Fight Night", Utc.with_ymd_and_hms(2024, 6, 1, 23, 0, 0).unwrap());
        let mut fight = Fight::new(event.id, Uuid::new_v4(), Uuid::new_v4());
        fight.category = "Main Event".to_string();
        let alice = UserTotals::new("alice");
        let bob = UserTotals::new("bob");

        repo.insert_event(event).await;
        repo.insert_fight(fight.clone()).await.unwrap();
        repo.insert_user(alice.clone()).await;
        repo.insert_user(bob.clone()).await;

        let alice_pick = Pick::new(
            alice.id,
            fight.id,
            Prediction {
                fighter_id: fight.fighter_a_id,
                method: Some("KO/TKO".to_string()),
                round: Some("1".to_string()),
            },
        );
        repo.insert_pick(alice_pick.clone()).await.unwrap();
        repo.insert_pick(Pick::new(
            bob.id,
            fight.id,
            Prediction {
                fighter_id: fight.fighter_b_id,
                method: Some("SUB".to_string()),
                round: Some("2".to_string()),
            },
        ))
        .await
        .unwrap();

        let service = FightResolutionService::new(repo.clone(), ScoringConfig::default());
        Fixture {
            repo,
            service,
            fight,
            alice,
            bob,
            alice_pick,
        }
    }

    fn ko_round_one(winner_id: Uuid) -> FightResultRequest {
        FightResultRequest {
            winner_id,
            method: "KO/TKO".to_string(),
            round_end: "1".to_string(),
            is_title: None,
            category: None,
        }
    }

    #[tokio::test]
    async fn resolve_scores_picks_and_totals() {
        let f = fixture().await;

        let summary = f
            .service
            .resolve_fight(f.fight.id, ko_round_one(f.fight.fighter_a_id))
            .await
            .unwrap();

        // 30 base + 30 main event + 20 method + 10 round; 1 of 2 picks is no upset
        assert_eq!(summary.points_awarded, 90);
        assert_eq!(summary.total_picks, 2);
        assert_eq!(summary.winner_picks, 1);

        // the only fight on the card, so alice also has a perfect card
        assert!(summary.completion.event_complete);
        assert_eq!(summary.completion.perfect_cards_granted, vec![f.alice.id]);

        let alice = f.repo.user(f.alice.id).await.unwrap();
        assert_eq!(alice.points, 180);
        assert_eq!(alice.monthly_points, 90);
        assert_eq!(alice.yearly_points, 90);
        assert_eq!(f.repo.user(f.bob.id).await.unwrap().points, 0);
        assert_eq!(f.repo.pick(f.alice_pick.id).await.unwrap().points_earned, 90);

        let fight = f.repo.fight(f.fight.id).await.unwrap();
        assert_eq!(fight.winner_id, Some(f.fight.fighter_a_id));
        assert_eq!(fight.method.as_deref(), Some("KO/TKO"));
    }

    #[tokio::test]
    async fn guard_flag_is_cleared_after_resolution() {
        let f = fixture().await;
        f.service
            .resolve_fight(f.fight.id, ko_round_one(f.fight.fighter_a_id))
            .await
            .unwrap();

        let event = f.repo.event(f.fight.event_id).await.unwrap();
        assert!(!event.is_calculating_points);
    }

    #[tokio::test]
    async fn unknown_fight_is_not_found() {
        let f = fixture().await;
        let err = f
            .service
            .resolve_fight(Uuid::new_v4(), ko_round_one(f.fight.fighter_a_id))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn invalid_result_changes_nothing() {
        let f = fixture().await;
        let err = f
            .service
            .resolve_fight(f.fight.id, ko_round_one(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::Validation(_)));
        assert!(f.repo.fight(f.fight.id).await.unwrap().winner_id.is_none());
    }

    #[tokio::test]
    async fn lock_map_is_empty_after_resolutions() {
        let f = fixture().await;
        let mut fights = vec![f.fight.clone()];
        for _ in 0..4 {
            let fight = Fight::new(f.fight.event_id, Uuid::new_v4(), Uuid::new_v4());
            f.repo.insert_fight(fight.clone()).await.unwrap();
            fights.push(fight);
        }

        for fight in &fights {
            f.service
                .resolve_fight(fight.id, ko_round_one(fight.fighter_a_id))
                .await
                .unwrap();
        }
        // a failed resolution releases its entry too
        f.service
            .resolve_fight(Uuid::new_v4(), ko_round_one(Uuid::new_v4()))
            .await
            .unwrap_err();

        assert!(f.service.fight_mutexes.read().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_resolutions_share_then_release_lock() {
        let f = fixture().await;
        let (first, second) = tokio::join!(
            f.service
                .resolve_fight(f.fight.id, ko_round_one(f.fight.fighter_a_id)),
            f.service
                .resolve_fight(f.fight.id, ko_round_one(f.fight.fighter_a_id)),
        );
        first.unwrap();
        second.unwrap();

        assert!(f.service.fight_mutexes.read().await.is_empty());
        assert_eq!(f.repo.user(f.alice.id).await.unwrap().monthly_points, 90);
    }

    #[tokio::test]
    async fn zero_timeout_reports_timeout() {
        let f = fixture().await;
        let service = FightResolutionService::new(
            f.repo.clone(),
            ScoringConfig {
                resolution_timeout: Duration::ZERO,
                ..ScoringConfig::default()
            },
        );

        // hold the store so the resolution cannot start
        let _tx = f.repo.begin().await.unwrap();
        let err = service
            .resolve_fight(f.fight.id, ko_round_one(f.fight.fighter_a_id))
            .await
            .unwrap_err();
        assert!(matches!(err, ScoringError::Timeout(_)));
        assert!(service.fight_mutexes.read().await.is_empty());
    }
}
