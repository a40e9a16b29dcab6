use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::errors::ScoringError;
use crate::store::models::{LeagueId, UserId};

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotType {
    MonthlyAtEvent,
    YearlyAtEvent,
}

/// Database model for ranking_snapshots table. Written once per
/// consolidation and only ever replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankingSnapshot {
    pub id: Uuid,
    pub league_id: LeagueId,
    pub period_key: String,
    pub snapshot_type: SnapshotType,
    pub user_id: UserId,
    pub rank: i32,
    pub points: i64,
    pub created_at: DateTime<Utc>,
}

/// One row of a live leaderboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Standing {
    pub user_id: UserId,
    pub rank: i32,
    pub points: i64,
}

/// Half-open UTC interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }
}

/// Calendar period a leaderboard is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeriodKey {
    Month { year: i32, month: u32 },
    Year(i32),
}

impl PeriodKey {
    pub fn month_of(date: DateTime<Utc>) -> Self {
        PeriodKey::Month {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year_of(date: DateTime<Utc>) -> Self {
        PeriodKey::Year(date.year())
    }

    pub fn window(&self) -> Result<TimeWindow, ScoringError> {
        let (start, end) = match *self {
            PeriodKey::Month { year, month } => {
                let (next_year, next_month) = if month == 12 {
                    (year + 1, 1)
                } else {
                    (year, month + 1)
                };
                (
                    month_start(year, month)?,
                    month_start(next_year, next_month)?,
                )
            }
            PeriodKey::Year(year) => (month_start(year, 1)?, month_start(year + 1, 1)?),
        };
        Ok(TimeWindow { start, end })
    }
}

fn month_start(year: i32, month: u32) -> Result<DateTime<Utc>, ScoringError> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| ScoringError::Validation(format!("invalid period {year:04}-{month:02}")))
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeriodKey::Month { year, month } => write!(f, "{year:04}-{month:02}"),
            PeriodKey::Year(year) => write!(f, "{year:04}"),
        }
    }
}

impl FromStr for PeriodKey {
    type Err = ScoringError;

    /// Accepts `YYYY` or `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ScoringError::Validation(format!("malformed period key: {s:?}"));

        let parse_year = |part: &str| -> Result<i32, ScoringError> {
            if part.len() != 4 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };

        match s.split_once('-') {
            None => Ok(PeriodKey::Year(parse_year(s)?)),
            Some((year, month)) => {
                if month.len() != 2 || !month.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                let month: u32 = month.parse().map_err(|_| invalid())?;
                if !(1..=12).contains(&month) {
                    return Err(invalid());
                }
                Ok(PeriodKey::Month {
                    year: parse_year(year)?,
                    month,
                })
            }
        }
    }
}
