use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

pub type EventId = Uuid;
pub type FightId = Uuid;
pub type FighterId = Uuid;
pub type PickId = Uuid;
pub type UserId = Uuid;
pub type LeagueId = Uuid;

/// Pick lock state of an event. `Finished` means every fight on the card
/// has an official winner.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum LockStatus {
    Open,
    Locked,
    Finished,
}

/// Database model for events table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub name: String,
    pub date: DateTime<Utc>,
    pub lock_status: LockStatus,
    pub is_calculating_points: bool,
}

impl Event {
    pub fn new(name: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            date,
            lock_status: LockStatus::Open,
            is_calculating_points: false,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.lock_status == LockStatus::Finished
    }
}

/// Database model for fights table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fight {
    pub id: FightId,
    pub event_id: EventId,
    pub fighter_a_id: FighterId,
    pub fighter_b_id: FighterId,
    pub rounds: i32,
    pub is_title: bool,
    pub category: String,
    pub winner_id: Option<FighterId>,
    pub method: Option<String>,
    pub round_end: Option<String>,
}

impl Fight {
    pub fn new(event_id: EventId, fighter_a_id: FighterId, fighter_b_id: FighterId) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            fighter_a_id,
            fighter_b_id,
            rounds: 3,
            is_title: false,
            category: String::new(),
            winner_id: None,
            method: None,
            round_end: None,
        }
    }

    pub fn has_competitor(&self, fighter_id: FighterId) -> bool {
        self.fighter_a_id == fighter_id || self.fighter_b_id == fighter_id
    }
}

/// Validated official result, ready to be written onto a fight row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FightResult {
    pub winner_id: FighterId,
    pub method: String,
    pub round_end: String,
    pub is_title: bool,
    pub category: String,
}

/// What a user predicted for one fight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub fighter_id: FighterId,
    pub method: Option<String>,
    pub round: Option<String>,
}

/// Database model for picks table. At most one per (user, fight).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pick {
    pub id: PickId,
    pub user_id: UserId,
    pub fight_id: FightId,
    #[serde(flatten)]
    pub prediction: Prediction,
    pub points_earned: i32,
}

impl Pick {
    pub fn new(user_id: UserId, fight_id: FightId, prediction: Prediction) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            fight_id,
            prediction,
            points_earned: 0,
        }
    }
}

/// Database model for the aggregate columns of the users table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTotals {
    pub id: UserId,
    pub name: String,
    pub points: i64,
    pub monthly_points: i64,
    pub yearly_points: i64,
    pub monthly_rank_delta: i32,
    pub yearly_rank_delta: i32,
}

impl UserTotals {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn apply(&mut self, delta: PointsDelta) {
        self.points += delta.all_time;
        self.monthly_points += delta.monthly;
        self.yearly_points += delta.yearly;
    }
}

/// Three-way increment for a user's running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsDelta {
    pub all_time: i64,
    pub monthly: i64,
    pub yearly: i64,
}

impl PointsDelta {
    /// Same amount on all three totals.
    pub fn uniform(points: i64) -> Self {
        Self {
            all_time: points,
            monthly: points,
            yearly: points,
        }
    }

    pub fn all_time_only(points: i64) -> Self {
        Self {
            all_time: points,
            ..Self::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    pub fn negated(self) -> Self {
        Self {
            all_time: -self.all_time,
            monthly: -self.monthly,
            yearly: -self.yearly,
        }
    }
}

impl std::ops::AddAssign for PointsDelta {
    fn add_assign(&mut self, rhs: Self) {
        self.all_time += rhs.all_time;
        self.monthly += rhs.monthly;
        self.yearly += rhs.yearly;
    }
}

/// Rank movement columns written by snapshot consolidation. `None` leaves
/// the column untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RankDeltaUpdate {
    pub monthly: Option<i32>,
    pub yearly: Option<i32>,
}

/// League and its member user ids
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct League {
    pub id: LeagueId,
    pub name: String,
    pub member_ids: Vec<UserId>,
}

impl League {
    pub fn new(name: impl Into<String>, member_ids: Vec<UserId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            member_ids,
        }
    }
}

/// Which running totals a perfect-card bonus is added to.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE", ascii_case_insensitive)]
pub enum BonusScope {
    #[default]
    AllTime,
    AllWindows,
}

impl BonusScope {
    pub fn delta(self, points: i64) -> PointsDelta {
        match self {
            BonusScope::AllTime => PointsDelta::all_time_only(points),
            BonusScope::AllWindows => PointsDelta::uniform(points),
        }
    }
}

/// Marker row for a granted perfect-card bonus, one per (event, user).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerfectCardAward {
    pub event_id: EventId,
    pub user_id: UserId,
    pub points: i64,
    pub scope: BonusScope,
    pub awarded_at: DateTime<Utc>,
}

impl PerfectCardAward {
    /// Exact delta that was applied when this award was granted.
    pub fn applied_delta(&self) -> PointsDelta {
        self.scope.delta(self.points)
    }
}
