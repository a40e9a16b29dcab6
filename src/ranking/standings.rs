use std::collections::HashMap;

use super::models::{RankingSnapshot, Standing};
use crate::store::models::UserId;

/// Orders `totals` into a leaderboard. Higher points rank first; equal
/// points fall back to user id ascending so re-runs give identical ranks.
pub fn rank_standings(mut totals: Vec<(UserId, i64)>) -> Vec<Standing> {
    totals.sort_by(|(a_user, a_points), (b_user, b_points)| {
        b_points.cmp(a_points).then_with(|| a_user.cmp(b_user))
    });

    totals
        .into_iter()
        .zip(1..)
        .map(|((user_id, points), rank)| Standing {
            user_id,
            rank,
            points,
        })
        .collect()
}

/// Positive when the user moved up. No baseline means no movement.
pub fn rank_delta(baseline: Option<i32>, current: i32) -> i32 {
    baseline.map_or(0, |previous| previous - current)
}

pub fn baseline_ranks(rows: &[RankingSnapshot]) -> HashMap<UserId, i32> {
    rows.iter().map(|row| (row.user_id, row.rank)).collect()
}
