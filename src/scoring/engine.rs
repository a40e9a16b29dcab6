use serde::{Deserialize, Serialize};
use tracing::trace;

use super::points;
use super::view::ResolvedFightView;
use crate::store::models::Prediction;

/// Points awarded by each scoring tier for one pick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointsBreakdown {
    pub winner: i32,
    pub importance: i32,
    pub upset: i32,
    pub method: i32,
    pub round: i32,
}

impl PointsBreakdown {
    pub fn total(&self) -> i32 {
        self.winner + self.importance + self.upset + self.method + self.round
    }
}

pub fn normalize_method(method: &str) -> String {
    method.trim().to_uppercase()
}

/// Scores a prediction against a fight. Pure: no I/O, same inputs give the
/// same total, and the total is never negative.
///
/// `total_picks` counts every pick on the fight and `winner_picks` those
/// that went with the declared winner.
pub fn calculate_points(
    prediction: &Prediction,
    fight: &ResolvedFightView,
    total_picks: usize,
    winner_picks: usize,
) -> i32 {
    score_breakdown(prediction, fight, total_picks, winner_picks).total()
}

pub fn score_breakdown(
    prediction: &Prediction,
    fight: &ResolvedFightView,
    total_picks: usize,
    winner_picks: usize,
) -> PointsBreakdown {
    let mut breakdown = PointsBreakdown::default();

    // Nothing else counts without the winner.
    match fight.winner_id {
        Some(winner) if winner == prediction.fighter_id => {}
        _ => return breakdown,
    }
    breakdown.winner = points::BASE_WIN;

    breakdown.importance = if fight.is_title {
        points::TITLE_BONUS
    } else if fight.category == points::MAIN_EVENT_CATEGORY {
        points::MAIN_EVENT_BONUS
    } else {
        0
    };

    if is_upset(total_picks, winner_picks) {
        breakdown.upset = points::UPSET_BONUS;
    }

    let method_hit = match (&prediction.method, &fight.method) {
        (Some(picked), Some(official)) => normalize_method(picked) == *official,
        _ => false,
    };
    if method_hit {
        breakdown.method = points::METHOD_BONUS;

        // Decision sub-types (e.g. UNANIME, DIVIDIDA) travel in the round field.
        let round_hit = match (&prediction.round, &fight.round_end) {
            (Some(picked), Some(official)) => picked == official,
            _ => false,
        };
        if round_hit {
            breakdown.round = points::ROUND_BONUS;
        }
    }

    trace!(
        fight_id = %fight.fight_id,
        total = breakdown.total(),
        "Scored prediction"
    );
    breakdown
}

fn is_upset(total_picks: usize, winner_picks: usize) -> bool {
    if total_picks == 0 {
        return false;
    }
    let share = (winner_picks as f64 / total_picks as f64) * 100.0;
    share <= points::UPSET_THRESHOLD_PERCENT
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use uuid::Uuid;

    struct Card {
        winner: Uuid,
        loser: Uuid,
    }

    fn card() -> Card {
        Card {
            winner: Uuid::new_v4(),
            loser: Uuid::new_v4(),
        }
    }

    fn view(card: &Card, is_title: bool, category: &str) -> ResolvedFightView {
        ResolvedFightView {
            fight_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            is_title,
            category: category.to_string(),
            winner_id: Some(card.winner),
            method: Some("KO/TKO".to_string()),
            round_end: Some("2".to_string()),
        }
    }

    fn pick(fighter_id: Uuid, method: Option<&str>, round: Option<&str>) -> Prediction {
        Prediction {
            fighter_id,
            method: method.map(str::to_string),
            round: round.map(str::to_string),
        }
    }

    #[test]
    fn title_upset_with_exact_method_and_round_scores_210() {
        let card = card();
        let fight = view(&card, true, "");
        let prediction = pick(card.winner, Some("KO/TKO"), Some("2"));

        // 5% of the field picked the winner
        assert_eq!(calculate_points(&prediction, &fight, 100, 5), 210);
    }

    #[test]
    fn plain_fight_with_wrong_method_scores_base_only() {
        let card = card();
        let fight = view(&card, false, "Prelims");
        let prediction = pick(card.winner, Some("SUB"), Some("2"));

        assert_eq!(calculate_points(&prediction, &fight, 10, 6), 30);
    }

    #[test]
    fn main_event_without_upset_scores_90() {
        let card = card();
        let fight = view(&card, false, "Main Event");
        let prediction = pick(card.winner, Some("KO/TKO"), Some("2"));

        assert_eq!(calculate_points(&prediction, &fight, 10, 6), 90);
    }

    #[rstest]
    #[case(Some("KO/TKO"), Some("2"))]
    #[case(Some("SUB"), Some("1"))]
    #[case(None, None)]
    fn wrong_winner_scores_zero_whatever_else_matches(
        #[case] method: Option<&str>,
        #[case] round: Option<&str>,
    ) {
        let card = card();
        let fight = view(&card, true, "Main Event");
        let prediction = pick(card.loser, method, round);

        assert_eq!(calculate_points(&prediction, &fight, 100, 1), 0);
        assert_eq!(
            score_breakdown(&prediction, &fight, 100, 1),
            PointsBreakdown::default()
        );
    }

    #[test]
    fn unresolved_fight_scores_zero() {
        let card = card();
        let mut fight = view(&card, true, "");
        fight.winner_id = None;

        assert_eq!(
            calculate_points(&pick(card.winner, Some("KO/TKO"), Some("2")), &fight, 10, 1),
            0
        );
    }

    #[test]
    fn title_bonus_takes_precedence_over_main_event() {
        let card = card();
        let fight = view(&card, true, "Main Event");
        let breakdown = score_breakdown(&pick(card.winner, None, None), &fight, 10, 5);

        assert_eq!(breakdown.importance, points::TITLE_BONUS);
        assert_eq!(breakdown.total(), 90);
    }

    #[rstest]
    #[case(100, 10, true)] // exactly at threshold
    #[case(100, 11, false)]
    #[case(10, 1, true)]
    #[case(3, 1, false)]
    #[case(0, 0, false)] // no distribution, no bonus
    fn upset_threshold(#[case] total: usize, #[case] on_winner: usize, #[case] upset: bool) {
        let card = card();
        let fight = view(&card, false, "");
        let breakdown = score_breakdown(&pick(card.winner, None, None), &fight, total, on_winner);

        assert_eq!(breakdown.upset > 0, upset);
    }

    #[test]
    fn method_is_case_insensitive() {
        let card = card();
        let fight = view(&card, false, "");
        let breakdown = score_breakdown(&pick(card.winner, Some(" ko/tko"), None), &fight, 10, 5);

        assert_eq!(breakdown.method, points::METHOD_BONUS);
        assert_eq!(breakdown.round, 0);
    }

    #[test]
    fn round_counts_only_after_method_matches() {
        let card = card();
        let fight = view(&card, false, "");
        let breakdown = score_breakdown(&pick(card.winner, Some("DEC"), Some("2")), &fight, 10, 5);

        assert_eq!(breakdown.method, 0);
        assert_eq!(breakdown.round, 0);
    }

    #[test]
    fn decision_subtype_is_compared_as_round() {
        let card = card();
        let mut fight = view(&card, false, "");
        fight.method = Some("DEC".to_string());
        fight.round_end = Some("UNANIME".to_string());

        let unanimous = pick(card.winner, Some("dec"), Some("UNANIME"));
        let split = pick(card.winner, Some("DEC"), Some("DIVIDIDA"));

        assert_eq!(calculate_points(&unanimous, &fight, 10, 5), 60);
        assert_eq!(calculate_points(&split, &fight, 10, 5), 50);
    }

    #[test]
    fn scoring_is_deterministic_and_non_negative() {
        let card = card();
        let fight = view(&card, true, "Main Event");
        for (total, on_winner) in [(0, 0), (1, 1), (50, 3), (50, 50)] {
            for prediction in [
                pick(card.winner, Some("KO/TKO"), Some("2")),
                pick(card.winner, None, Some("2")),
                pick(card.loser, Some("KO/TKO"), Some("2")),
            ] {
                let first = calculate_points(&prediction, &fight, total, on_winner);
                let second = calculate_points(&prediction, &fight, total, on_winner);
                assert!(first >= 0);
                assert_eq!(first, second);
            }
        }
    }
}
