use std::collections::BTreeMap;

use crate::scoring::{calculate_points, ResolvedFightView};
use crate::store::models::{Pick, PickId, PointsDelta, UserId};

/// Everything a resolution must write, computed from one consistent read
/// of the fight's picks.
#[derive(Debug, Default)]
pub struct Rescore {
    /// Picks whose stored points change.
    pub pick_updates: Vec<(PickId, i32)>,
    /// Net change per user: previously awarded points backed out, new ones added.
    pub user_deltas: BTreeMap<UserId, PointsDelta>,
    pub total_picks: usize,
    pub winner_picks: usize,
    pub points_rolled_back: i64,
    pub points_awarded: i64,
}

pub fn rescore_picks(fight: &ResolvedFightView, picks: &[Pick]) -> Rescore {
    let total_picks = picks.len();
    let winner_picks = fight
        .winner_id
        .map(|winner| {
            picks
                .iter()
                .filter(|p| p.prediction.fighter_id == winner)
                .count()
        })
        .unwrap_or(0);

    let mut rescore = Rescore {
        total_picks,
        winner_picks,
        ..Rescore::default()
    };

    for pick in picks {
        let previous = pick.points_earned;
        let current = calculate_points(&pick.prediction, fight, total_picks, winner_picks);

        let delta = rescore.user_deltas.entry(pick.user_id).or_default();
        if previous > 0 {
            *delta += PointsDelta::uniform(-i64::from(previous));
            rescore.points_rolled_back += i64::from(previous);
        }
        if current > 0 {
            *delta += PointsDelta::uniform(i64::from(current));
            rescore.points_awarded += i64::from(current);
        }

        if current != previous {
            rescore.pick_updates.push((pick.id, current));
        }
    }

    rescore.user_deltas.retain(|_, delta| !delta.is_zero());
    rescore
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::models::Prediction;
    use uuid::Uuid;

    struct Setup {
        fight: ResolvedFightView,
        a: Uuid,
        b: Uuid,
    }

    fn setup() -> Setup {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        Setup {
            fight: ResolvedFightView {
                fight_id: Uuid::new_v4(),
                event_id: Uuid::new_v4(),
                is_title: false,
                category: String::new(),
                winner_id: Some(a),
                method: Some("KO/TKO".to_string()),
                round_end: Some("1".to_string()),
            },
            a,
            b,
        }
    }

    fn pick_on(fight: &ResolvedFightView, fighter_id: Uuid, points_earned: i32) -> Pick {
        let mut pick = Pick::new(
            Uuid::new_v4(),
            fight.fight_id,
            Prediction {
                fighter_id,
                method: Some("KO/TKO".to_string()),
                round: Some("1".to_string()),
            },
        );
        pick.points_earned = points_earned;
        pick
    }

    #[test]
    fn counts_distribution_from_current_picks() {
        let s = setup();
        let picks = vec![
            pick_on(&s.fight, s.a, 0),
            pick_on(&s.fight, s.b, 0),
            pick_on(&s.fight, s.b, 0),
        ];

        let rescore = rescore_picks(&s.fight, &picks);
        assert_eq!(rescore.total_picks, 3);
        assert_eq!(rescore.winner_picks, 1);
        // only the winner pick scores: 30 + 20 + 10
        assert_eq!(rescore.points_awarded, 60);
        assert_eq!(rescore.pick_updates, vec![(picks[0].id, 60)]);
        assert_eq!(rescore.user_deltas.len(), 1);
    }

    #[test]
    fn identical_rerun_produces_no_writes() {
        let s = setup();
        let picks = vec![
            pick_on(&s.fight, s.a, 60),
            pick_on(&s.fight, s.b, 0),
            pick_on(&s.fight, s.b, 0),
        ];

        let rescore = rescore_picks(&s.fight, &picks);
        assert_eq!(rescore.points_rolled_back, 60);
        assert_eq!(rescore.points_awarded, 60);
        assert!(rescore.pick_updates.is_empty());
        assert!(rescore.user_deltas.is_empty());
    }

    #[test]
    fn correction_backs_out_stale_points() {
        let s = setup();
        let mut corrected = s.fight.clone();
        corrected.winner_id = Some(s.b);

        let picks = vec![pick_on(&s.fight, s.a, 60), pick_on(&s.fight, s.b, 0)];
        let rescore = rescore_picks(&corrected, &picks);

        assert_eq!(
            rescore.user_deltas.get(&picks[0].user_id),
            Some(&PointsDelta::uniform(-60))
        );
        assert!(rescore.pick_updates.contains(&(picks[0].id, 0)));
        assert!(rescore
            .user_deltas
            .get(&picks[1].user_id)
            .is_some_and(|d| d.all_time > 0));
    }
}
