//! The storage port measures and votes are read and written through.
//!
//! [`LocalBackend`] keeps everything in the local store; the remote
//! implementation lives in [`crate::remote`]. Callers hold a
//! `Box<dyn VotingBackend>` and never learn which one they got.

use crate::error::BackendError;
use crate::ledger::VoteLedger;
use crate::query::{MeasureFilter, apply_filter};
use crate::repository::MeasureRepository;
use crate::schema::{Measure, User, Vote, VoteChoice};
use tracing::debug;

pub trait VotingBackend: Send + Sync {
    /// Short name for logs and error messages.
    fn name(&self) -> &'static str;

    fn list_measures(&self, filter: &MeasureFilter) -> Result<Vec<Measure>, BackendError>;

    fn get_measure(&self, id: &str) -> Result<Option<Measure>, BackendError>;

    fn categories(&self) -> Result<Vec<String>, BackendError>;

    fn cast_vote(
        &self,
        measure_id: &str,
        choice: VoteChoice,
        user: &User,
    ) -> Result<Vote, BackendError>;

    fn user_vote(&self, measure_id: &str, user: &User) -> Result<Option<Vote>, BackendError>;

    /// Asks the backend to refresh from its upstream source.
    fn trigger_sync(&self) -> Result<(), BackendError> {
        Err(BackendError::Unsupported(self.name()))
    }
}

#[derive(Clone)]
pub struct LocalBackend {
    repository: MeasureRepository,
    ledger: VoteLedger,
}

impl LocalBackend {
    pub fn new(repository: MeasureRepository) -> Self {
        Self {
            ledger: VoteLedger::new(repository.clone()),
            repository,
        }
    }

    pub fn repository(&self) -> &MeasureRepository {
        &self.repository
    }

    pub fn ledger(&self) -> &VoteLedger {
        &self.ledger
    }
}

impl VotingBackend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn list_measures(&self, filter: &MeasureFilter) -> Result<Vec<Measure>, BackendError> {
        let measures = apply_filter(self.repository.list_all(), filter);
        debug!(count = measures.len(), "listed local measures");
        Ok(measures)
    }

    fn get_measure(&self, id: &str) -> Result<Option<Measure>, BackendError> {
        Ok(self.repository.get_by_id(id))
    }

    fn categories(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.repository.categories())
    }

    fn cast_vote(
        &self,
        measure_id: &str,
        choice: VoteChoice,
        user: &User,
    ) -> Result<Vote, BackendError> {
        self.ledger.cast_vote(measure_id, choice, &user.id)
    }

    fn user_vote(&self, measure_id: &str, user: &User) -> Result<Option<Vote>, BackendError> {
        Ok(self.ledger.user_vote(measure_id, &user.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::MeasureStatus;
    use crate::store::LocalStore;

    fn backend() -> LocalBackend {
        LocalBackend::new(MeasureRepository::new(LocalStore::in_memory()))
    }

    fn user() -> User {
        User {
            id: "user-a".to_string(),
            display_name: "Bürger A".to_string(),
        }
    }

    #[test]
    fn empty_filter_lists_everything() {
        let backend = backend();
        let listed = backend.list_measures(&MeasureFilter::default()).unwrap();
        assert_eq!(listed, backend.repository().list_all());
    }

    #[test]
    fn status_filter_returns_only_that_status() {
        let backend = backend();
        let mut draft = backend.repository().get_by_id("seed-1").unwrap();
        draft.status = MeasureStatus::Draft;
        backend.repository().upsert(draft).unwrap();

        let drafts = backend
            .list_measures(&MeasureFilter::with_status(MeasureStatus::Draft))
            .unwrap();
        assert_eq!(drafts.len(), 1);
        assert!(drafts.len() < backend.repository().list_all().len());
    }

    #[test]
    fn missing_measure_is_none_not_error() {
        assert_eq!(backend().get_measure("missing").unwrap(), None);
    }

    #[test]
    fn sync_is_unsupported_locally() {
        assert!(matches!(
            backend().trigger_sync(),
            Err(BackendError::Unsupported("local"))
        ));
    }

    #[test]
    fn votes_go_through_the_ledger() {
        let backend = backend();
        backend.cast_vote("seed-1", VoteChoice::Against, &user()).unwrap();
        let vote = backend.user_vote("seed-1", &user()).unwrap().unwrap();
        assert_eq!(vote.choice, VoteChoice::Against);
    }
}
