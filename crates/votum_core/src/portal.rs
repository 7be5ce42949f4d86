//! Wires identity, storage and the selected backend together for callers.

use crate::backend::{LocalBackend, VotingBackend};
use crate::comments::CommentLog;
use crate::config::{BackendKind, Config};
use crate::db;
use crate::documents::{DocumentSource, ImportReport, import_documents};
use crate::error::BackendError;
use crate::feed::{MeasureFeed, PollPolicy, Snapshot};
use crate::identity::IdentityProvider;
use crate::query::MeasureFilter;
use crate::remote::RemoteBackend;
use crate::repository::MeasureRepository;
use crate::schema::{Comment, Measure, ProposalDraft, User, Vote, VoteChoice};
use crate::seed;
use crate::store::{LocalStore, TOKEN_KEY};
use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

pub struct Portal {
    identity: IdentityProvider,
    local: LocalBackend,
    comments: CommentLog,
    feed: MeasureFeed,
}

impl Portal {
    /// Opens the SQLite store named in `config` and selects the backend.
    pub fn open(config: &Config) -> Result<Self> {
        let store = LocalStore::new(Arc::new(db::open(&config.db_path)?));
        let repository = match &config.seed_file {
            Some(path) => MeasureRepository::with_seed(store.clone(), seed::load_seed_file(path)?),
            None => MeasureRepository::new(store.clone()),
        };
        let policy = PollPolicy {
            interval: config.poll_interval(),
        };

        let portal = match config.backend {
            BackendKind::Local => Self::local(repository, policy),
            BackendKind::Remote => {
                let token = config
                    .remote
                    .token
                    .clone()
                    .or_else(|| store.read_scalar(TOKEN_KEY));
                let remote =
                    RemoteBackend::new(&config.remote.base_url, token, config.remote_timeout())?;
                Self::remote(repository, remote, policy)
            }
        };
        info!(
            backend = portal.backend().name(),
            db = %config.db_path.display(),
            "portal ready"
        );
        Ok(portal)
    }

    pub fn local(repository: MeasureRepository, policy: PollPolicy) -> Self {
        let local = LocalBackend::new(repository);
        Self {
            identity: IdentityProvider::new(local.repository().store().clone()),
            comments: CommentLog::new(local.repository().store().clone()),
            feed: MeasureFeed::new(Box::new(local.clone()), policy),
            local,
        }
    }

    /// Measures and votes come from `primary`; listings fall back to the
    /// local store when it is unreachable.
    pub fn remote(
        repository: MeasureRepository,
        primary: impl VotingBackend + 'static,
        policy: PollPolicy,
    ) -> Self {
        let local = LocalBackend::new(repository);
        Self {
            identity: IdentityProvider::new(local.repository().store().clone()),
            comments: CommentLog::new(local.repository().store().clone()),
            feed: MeasureFeed::new(Box::new(primary), policy).with_fallback(Box::new(local.clone())),
            local,
        }
    }

    pub fn current_user(&self) -> User {
        self.identity.current_user()
    }

    pub fn backend(&self) -> &dyn VotingBackend {
        self.feed.primary()
    }

    pub fn poll_policy(&self) -> PollPolicy {
        self.feed.policy()
    }

    pub fn list_measures(&self, filter: &MeasureFilter) -> Result<Snapshot, BackendError> {
        self.feed.current(filter)
    }

    pub fn refresh_measures(&self, filter: &MeasureFilter) -> Result<Snapshot, BackendError> {
        self.feed.refresh(filter)
    }

    /// Falls back to the local copy when the live source is unreachable.
    pub fn measure(&self, id: &str) -> Result<Option<Measure>, BackendError> {
        match self.backend().get_measure(id) {
            Err(err) if err.is_transient() && self.backend().name() != self.local.name() => {
                warn!(measure_id = id, error = %err, "measure lookup degraded to local store");
                self.local.get_measure(id)
            }
            other => other,
        }
    }

    pub fn cast_vote(&self, measure_id: &str, choice: VoteChoice) -> Result<Vote, BackendError> {
        let user = self.current_user();
        let vote = self.backend().cast_vote(measure_id, choice, &user)?;
        self.feed.invalidate();
        Ok(vote)
    }

    pub fn my_vote(&self, measure_id: &str) -> Result<Option<Vote>, BackendError> {
        let user = self.current_user();
        self.backend().user_vote(measure_id, &user)
    }

    pub fn categories(&self) -> Result<Vec<String>, BackendError> {
        self.backend().categories()
    }

    pub fn comments(&self, measure_id: &str) -> Vec<Comment> {
        self.comments.list(measure_id)
    }

    pub fn add_comment(&self, measure_id: &str, body: &str) -> Result<Comment, BackendError> {
        let user = self.current_user();
        self.comments
            .add(measure_id, body, &user.id, &user.display_name)
    }

    /// Proposals are always stored locally, whichever backend is active.
    pub fn submit_proposal(&self, draft: &ProposalDraft) -> Result<Measure, BackendError> {
        let user = self.current_user();
        let measure = self.local.repository().submit_user_measure(draft, &user)?;
        self.feed.invalidate();
        Ok(measure)
    }

    pub fn trigger_sync(&self) -> Result<(), BackendError> {
        self.backend().trigger_sync()?;
        self.feed.invalidate();
        Ok(())
    }

    /// Pulls up to `max_pages` pages of documents into the local store.
    pub fn import_documents(
        &self,
        source: &DocumentSource,
        max_pages: usize,
    ) -> Result<ImportReport, BackendError> {
        let mut total = ImportReport::default();
        let mut cursor: Option<String> = None;

        for _ in 0..max_pages {
            let page = source.fetch_bills(cursor.as_deref())?;
            let report = import_documents(self.local.repository(), &page.documents)?;
            total.imported += report.imported;
            total.updated += report.updated;
            total.skipped += report.skipped;

            // the API repeats the last cursor once the result set is exhausted
            if page.documents.is_empty() || page.cursor == cursor {
                break;
            }
            cursor = page.cursor;
        }
        self.feed.invalidate();
        Ok(total)
    }
}
