use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use fightpicks::{
    fights::{FightResolutionService, FightResultRequest, ResolutionSummary},
    ranking::RankingSnapshotService,
    store::models::{
        BonusScope, Event, Fight, FighterId, League, LockStatus, Pick, PickId, Prediction, UserId,
        UserTotals,
    },
    InMemoryScoringRepository, ScoringConfig, ScoringError,
};

// ============================================================================
// Test Setup Infrastructure
// ============================================================================

pub struct TestSetup {
    pub repo: Arc<InMemoryScoringRepository>,
    pub resolution: FightResolutionService,
    pub ranking: RankingSnapshotService,
    pub league: League,
    users: HashMap<String, UserId>,
}

pub struct TestSetupBuilder {
    users: Vec<String>,
    config: ScoringConfig,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self {
            users: vec![],
            config: ScoringConfig::default(),
        }
    }

    pub fn with_users(mut self, users: &[&str]) -> Self {
        self.users = users.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_bonus_scope(mut self, scope: BonusScope) -> Self {
        self.config.perfect_card_scope = scope;
        self
    }

    pub async fn build(self) -> TestSetup {
        let repo = Arc::new(InMemoryScoringRepository::new());

        let mut users = HashMap::new();
        for name in &self.users {
            let user = UserTotals::new(name.as_str());
            users.insert(name.clone(), user.id);
            repo.insert_user(user).await;
        }

        let league = League::new("test league", users.values().copied().collect());
        repo.insert_league(league.clone()).await;

        TestSetup {
            resolution: FightResolutionService::new(repo.clone(), self.config),
            ranking: RankingSnapshotService::new(repo.clone()),
            repo,
            league,
            users,
        }
    }
}

impl Default for TestSetupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSetup {
    pub fn user(&self, name: &str) -> UserId {
        self.users[name]
    }

    pub async fn totals(&self, name: &str) -> UserTotals {
        self.repo
            .user(self.user(name))
            .await
            .expect("user should exist")
    }

    /// Places a pick and returns its id.
    pub async fn pick(
        &self,
        name: &str,
        fight: &Fight,
        fighter_id: FighterId,
        method: &str,
        round: &str,
    ) -> PickId {
        let pick = Pick::new(
            self.user(name),
            fight.id,
            Prediction {
                fighter_id,
                method: Some(method.to_string()),
                round: Some(round.to_string()),
            },
        );
        let id = pick.id;
        self.repo.insert_pick(pick).await.expect("pick should insert");
        id
    }

    /// Stores an already scored pick, bypassing resolution. Ranking tests
    /// use it to lay out standings directly.
    pub async fn seed_points(&self, name: &str, fight: &Fight, points: i32) {
        let mut pick = Pick::new(
            self.user(name),
            fight.id,
            Prediction {
                fighter_id: fight.fighter_a_id,
                method: None,
                round: None,
            },
        );
        pick.points_earned = points;
        self.repo.insert_pick(pick).await.expect("pick should insert");
    }

    pub async fn consolidate(&self, card: &Card) -> usize {
        self.ranking
            .consolidate_event(self.league.id, card.event.id)
            .await
            .expect("consolidation should succeed")
    }

    /// Resolves `fight` in favour of `winner_id`.
    pub async fn resolve(
        &self,
        fight: &Fight,
        winner_id: FighterId,
        method: &str,
        round_end: &str,
    ) -> Result<ResolutionSummary, ScoringError> {
        self.resolution
            .resolve_fight(
                fight.id,
                FightResultRequest {
                    winner_id,
                    method: method.to_string(),
                    round_end: round_end.to_string(),
                    is_title: None,
                    category: None,
                },
            )
            .await
    }
}

// ============================================================================
// Card Builder
// ============================================================================

pub struct Card {
    pub event: Event,
    pub fights: Vec<Fight>,
}

impl Card {
    pub fn fight(&self, index: usize) -> &Fight {
        &self.fights[index]
    }
}

pub struct CardBuilder {
    date: DateTime<Utc>,
    fights: usize,
    main_event: bool,
    title: bool,
    finished: bool,
}

impl CardBuilder {
    pub fn on(year: i32, month: u32, day: u32) -> Self {
        Self {
            date: Utc
                .with_ymd_and_hms(year, month, day, 23, 0, 0)
                .single()
                .expect("valid test date"),
            fights: 1,
            main_event: false,
            title: false,
            finished: false,
        }
    }

    pub fn with_fights(mut self, fights: usize) -> Self {
        self.fights = fights;
        self
    }

    /// Marks the first fight as the main event.
    pub fn with_main_event(mut self) -> Self {
        self.main_event = true;
        self
    }

    /// Marks the first fight as a title fight.
    pub fn with_title_fight(mut self) -> Self {
        self.title = true;
        self
    }

    /// Seeds the event as already finished, for ranking tests that do not
    /// go through fight resolution.
    pub fn finished(mut self) -> Self {
        self.finished = true;
        self
    }

    pub async fn build(self, setup: &TestSetup) -> Card {
        let mut event = Event::new(format!("Card {}", self.date.date_naive()), self.date);
        if self.finished {
            event.lock_status = LockStatus::Finished;
        }
        setup.repo.insert_event(event.clone()).await;

        let mut fights = Vec::with_capacity(self.fights);
        for index in 0..self.fights {
            let mut fight = Fight::new(event.id, Uuid::new_v4(), Uuid::new_v4());
            if index == 0 {
                fight.is_title = self.title;
                if self.main_event {
                    fight.category = "Main Event".to_string();
                    fight.rounds = 5;
                }
            }
            setup
                .repo
                .insert_fight(fight.clone())
                .await
                .expect("fight should insert");
            fights.push(fight);
        }

        Card { event, fights }
    }
}
