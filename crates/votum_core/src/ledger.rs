//! Local vote ledger.
//!
//! Holds at most one [`Vote`] per (measure, user) pair. A repeated cast
//! moves the pair's contribution between tally buckets instead of adding a
//! second vote, so `for + against + abstain` on a measure grows by exactly
//! one per distinct voter.
//!
//! A cast reads votes and measures, adjusts both, and writes them back in
//! one store transaction, so concurrent casts from other threads or
//! processes sharing the database queue up instead of overwriting each
//! other.

use crate::error::BackendError;
use crate::ids;
use crate::repository::MeasureRepository;
use crate::schema::{DeliveryStatus, Measure, Vote, VoteChoice};
use crate::store::{LocalStore, MEASURES_KEY, VOTES_KEY};
use time::OffsetDateTime;
use tracing::{info, warn};

#[derive(Clone)]
pub struct VoteLedger {
    store: LocalStore,
    measures: MeasureRepository,
}

impl VoteLedger {
    pub fn new(measures: MeasureRepository) -> Self {
        Self {
            store: measures.store().clone(),
            measures,
        }
    }

    pub fn user_vote(&self, measure_id: &str, user_id: &str) -> Option<Vote> {
        self.votes()
            .into_iter()
            .find(|vote| vote.measure_id == measure_id && vote.user_id == user_id)
    }

    pub fn votes_for_measure(&self, measure_id: &str) -> Vec<Vote> {
        self.votes()
            .into_iter()
            .filter(|vote| vote.measure_id == measure_id)
            .collect()
    }

    pub fn cast_vote(
        &self,
        measure_id: &str,
        choice: VoteChoice,
        user_id: &str,
    ) -> Result<Vote, BackendError> {
        self.store.transaction(|tx| -> Result<Vote, BackendError> {
            let mut measures = self.measures.load(tx)?;
            let measure = measures
                .iter_mut()
                .find(|measure| measure.id == measure_id)
                .ok_or_else(|| BackendError::NotFound(measure_id.to_string()))?;

            let mut votes: Vec<Vote> = tx.read(VOTES_KEY, Vec::new())?;
            let now = OffsetDateTime::now_utc();

            let vote = match votes
                .iter_mut()
                .find(|vote| vote.measure_id == measure_id && vote.user_id == user_id)
            {
                Some(existing) => {
                    let previous = existing.choice;
                    existing.choice = choice;
                    existing.created_at = now;
                    move_contribution(measure, previous, choice);
                    info!(measure_id, user_id, %previous, %choice, "vote changed");
                    existing.clone()
                }
                None => {
                    let vote = Vote {
                        id: ids::record_id("vote", now),
                        measure_id: measure_id.to_string(),
                        user_id: user_id.to_string(),
                        choice,
                        created_at: now,
                        delivery: DeliveryStatus::Confirmed,
                    };
                    measure.totals.increment(choice);
                    votes.push(vote.clone());
                    info!(measure_id, user_id, %choice, "vote cast");
                    vote
                }
            };

            tx.write(VOTES_KEY, &votes)?;
            tx.write(MEASURES_KEY, &measures)?;
            Ok(vote)
        })
    }

    fn votes(&self) -> Vec<Vote> {
        self.store.read(VOTES_KEY, Vec::new())
    }
}

fn move_contribution(measure: &mut Measure, from: VoteChoice, to: VoteChoice) {
    if !measure.totals.decrement(from) {
        warn!(
            measure_id = %measure.id,
            bucket = %from,
            "tally bucket already empty while correcting a vote"
        );
    }
    measure.totals.increment(to);
}
