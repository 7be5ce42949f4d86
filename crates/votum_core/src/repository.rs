use crate::error::{BackendError, StoreError};
use crate::ids;
use crate::schema::{Measure, MeasureOrigin, MeasureStatus, ProposalDraft, Submitter, Tally, User};
use crate::seed;
use crate::store::{LocalStore, MEASURES_KEY, Transaction};
use crate::validation::validate_proposal;
use std::collections::BTreeSet;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

pub const USER_MEASURE_QUORUM: u64 = 100;
pub const USER_VOTING_WINDOW: Duration = Duration::days(30);

/// Measure records in the local store.
#[derive(Clone)]
pub struct MeasureRepository {
    store: LocalStore,
    seed_override: Option<Vec<Measure>>,
}

impl MeasureRepository {
    pub fn new(store: LocalStore) -> Self {
        Self {
            store,
            seed_override: None,
        }
    }

    /// Seeds an empty store from `measures` instead of the built-in set.
    pub fn with_seed(store: LocalStore, measures: Vec<Measure>) -> Self {
        Self {
            store,
            seed_override: Some(measures),
        }
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    /// Read errors degrade to an empty list.
    pub fn list_all(&self) -> Vec<Measure> {
        let measures: Vec<Measure> = self.store.read(MEASURES_KEY, Vec::new());
        if !measures.is_empty() {
            return measures;
        }
        match self.store.transaction(|tx| self.load(tx)) {
            Ok(measures) => measures,
            Err(err) => {
                warn!(error = %err, "could not load measures");
                Vec::new()
            }
        }
    }

    pub fn get_by_id(&self, id: &str) -> Option<Measure> {
        self.list_all().into_iter().find(|measure| measure.id == id)
    }

    /// Full replacement when the id exists, otherwise prepends.
    pub fn upsert(&self, measure: Measure) -> Result<Measure, StoreError> {
        self.upsert_with(measure, |_, _| {})
            .map(|(stored, _)| stored)
    }

    /// Like [`MeasureRepository::upsert`], but when the id already exists
    /// `merge` gets to copy fields from the stored measure into the
    /// replacement first. Lookup, merge and write form one transaction.
    /// The flag is true when an existing measure was replaced.
    pub fn upsert_with(
        &self,
        measure: Measure,
        merge: impl FnOnce(&Measure, &mut Measure),
    ) -> Result<(Measure, bool), StoreError> {
        self.store.transaction(|tx| -> Result<(Measure, bool), StoreError> {
            let mut measures = self.load(tx)?;
            let now = OffsetDateTime::now_utc();

            let stored = match measures.iter().position(|existing| existing.id == measure.id) {
                Some(index) => {
                    let mut replaced = measure;
                    merge(&measures[index], &mut replaced);
                    replaced.updated_at = now;
                    measures[index] = replaced.clone();
                    debug!(measure_id = %replaced.id, "replaced measure");
                    (replaced, true)
                }
                None => {
                    let created = Measure {
                        created_at: now,
                        updated_at: now,
                        ..measure
                    };
                    measures.insert(0, created.clone());
                    debug!(measure_id = %created.id, "inserted measure");
                    (created, false)
                }
            };

            tx.write(MEASURES_KEY, &measures)?;
            Ok(stored)
        })
    }

    pub fn submit_user_measure(
        &self,
        draft: &ProposalDraft,
        author: &User,
    ) -> Result<Measure, BackendError> {
        validate_proposal(draft)?;

        let now = OffsetDateTime::now_utc();
        let title = draft.title.trim().to_string();
        let summary = draft.summary.trim().to_string();
        let measure = Measure {
            id: ids::record_id("user", now),
            body_markdown: format!("# {title}\n\n{summary}"),
            title,
            summary,
            category: draft.category.trim().to_string(),
            start_at: now,
            end_at: now + USER_VOTING_WINDOW,
            status: MeasureStatus::Draft,
            quorum: USER_MEASURE_QUORUM,
            totals: Tally::default(),
            created_at: now,
            updated_at: now,
            sources: Vec::new(),
            origin: MeasureOrigin::UserSubmitted,
            submitted_by: Some(Submitter {
                user_id: author.id.clone(),
                display_name: author.display_name.clone(),
            }),
            external: None,
        };

        let stored = self.upsert(measure)?;
        info!(measure_id = %stored.id, user_id = %author.id, "user measure submitted");
        Ok(stored)
    }

    pub fn categories(&self) -> Vec<String> {
        let categories: BTreeSet<String> = self
            .list_all()
            .into_iter()
            .map(|measure| measure.category)
            .collect();
        categories.into_iter().collect()
    }

    /// Reads the collection inside `tx`, seeding it when empty.
    pub(crate) fn load(&self, tx: &mut Transaction<'_>) -> Result<Vec<Measure>, StoreError> {
        let measures: Vec<Measure> = tx.read(MEASURES_KEY, Vec::new())?;
        if !measures.is_empty() {
            return Ok(measures);
        }

        let seeded = match &self.seed_override {
            Some(measures) => measures.clone(),
            None => seed::default_measures(OffsetDateTime::now_utc()),
        };
        tx.write(MEASURES_KEY, &seeded)?;
        info!(count = seeded.len(), "seeded measure store");
        Ok(seeded)
    }
}
