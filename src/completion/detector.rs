use std::collections::{BTreeSet, HashMap, HashSet};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::errors::ScoringError;
use crate::scoring::{points, ResolvedFightView};
use crate::store::models::{
    BonusScope, Event, FightId, FighterId, LockStatus, PerfectCardAward, Pick, UserId,
};
use crate::store::ScoringTransaction;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletionOutcome {
    pub event_complete: bool,
    pub resolved_fights: usize,
    pub total_fights: usize,
    pub perfect_cards_granted: Vec<UserId>,
    pub perfect_cards_revoked: Vec<UserId>,
}

/// Users whose picks name the winner of every resolved fight.
///
/// `winners` holds only fights that have a winner. An empty map yields no
/// perfect users.
pub fn find_perfect_users(
    winners: &HashMap<FightId, FighterId>,
    picks: &[Pick],
) -> BTreeSet<UserId> {
    if winners.is_empty() {
        return BTreeSet::new();
    }

    let mut correct: HashMap<UserId, HashSet<FightId>> = HashMap::new();
    for pick in picks {
        if winners.get(&pick.fight_id) == Some(&pick.prediction.fighter_id) {
            correct.entry(pick.user_id).or_default().insert(pick.fight_id);
        }
    }

    correct
        .into_iter()
        .filter(|(_, fights)| fights.len() == winners.len())
        .map(|(user_id, _)| user_id)
        .collect()
}

/// Runs after each fight resolution, inside the same transaction.
#[derive(Debug, Clone, Copy)]
pub struct PerfectCardDetector {
    scope: BonusScope,
}

impl PerfectCardDetector {
    pub fn new(scope: BonusScope) -> Self {
        Self { scope }
    }

    /// Checks whether `event` is fully resolved and reconciles perfect-card
    /// awards with the current results. `resolved` is treated as the
    /// authoritative state of its fight.
    ///
    /// Each (event, user) is granted at most once; an award whose user is no
    /// longer perfect after a correction is reversed.
    #[instrument(skip(self, tx, event, resolved), fields(event_id = %event.id))]
    pub async fn evaluate(
        &self,
        tx: &mut dyn ScoringTransaction,
        event: &Event,
        resolved: &ResolvedFightView,
    ) -> Result<CompletionOutcome, ScoringError> {
        let fights = tx.list_fights_for_event(event.id).await?;

        let winners: HashMap<FightId, FighterId> = fights
            .iter()
            .filter_map(|fight| {
                let winner = if fight.id == resolved.fight_id {
                    resolved.winner_id
                } else {
                    fight.winner_id
                };
                winner.map(|w| (fight.id, w))
            })
            .collect();

        let mut outcome = CompletionOutcome {
            event_complete: !fights.is_empty() && winners.len() == fights.len(),
            resolved_fights: winners.len(),
            total_fights: fights.len(),
            ..CompletionOutcome::default()
        };

        if !outcome.event_complete {
            debug!(
                resolved = outcome.resolved_fights,
                total = outcome.total_fights,
                "Event still has unresolved fights"
            );
            return Ok(outcome);
        }

        if event.lock_status != LockStatus::Finished {
            tx.set_event_lock_status(event.id, LockStatus::Finished).await?;
            info!("All fights resolved, event finished");
        }

        let picks = tx.list_picks_for_event(event.id).await?;
        let perfect = find_perfect_users(&winners, &picks);
        let existing = tx.list_perfect_card_awards(event.id).await?;
        let already_awarded: BTreeSet<UserId> = existing.iter().map(|a| a.user_id).collect();

        for award in existing.iter().filter(|a| !perfect.contains(&a.user_id)) {
            tx.increment_user_points(award.user_id, award.applied_delta().negated())
                .await?;
            tx.delete_perfect_card_award(event.id, award.user_id).await?;
            outcome.perfect_cards_revoked.push(award.user_id);
        }

        for user_id in perfect.difference(&already_awarded) {
            let award = PerfectCardAward {
                event_id: event.id,
                user_id: *user_id,
                points: points::PERFECT_CARD_BONUS,
                scope: self.scope,
                awarded_at: Utc::now(),
            };
            tx.increment_user_points(*user_id, award.applied_delta()).await?;
            tx.insert_perfect_card_award(&award).await?;
            outcome.perfect_cards_granted.push(*user_id);
        }

        info!(
            perfect_users = perfect.len(),
            granted = outcome.perfect_cards_granted.len(),
            revoked = outcome.perfect_cards_revoked.len(),
            "Perfect cards reconciled"
        );
        Ok(outcome)
    }
}
