//! Read-only client for the parliamentary document search API.

use crate::error::BackendError;
use crate::mapper::{DocumentPage, ExternalDocument, map_external_document};
use crate::repository::MeasureRepository;
use crate::schema::Measure;
use reqwest::blocking::Client;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_DOCUMENT_TYPE: &str = "Gesetzentwurf";
pub const DEFAULT_ASSIGNMENT: &str = "BT";

pub struct DocumentSource {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl DocumentSource {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::RequestFailed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }

    /// One page of draft bills; pass the previous page's cursor to continue.
    pub fn fetch_bills(&self, cursor: Option<&str>) -> Result<DocumentPage, BackendError> {
        let mut query = vec![
            ("f.drucksachetyp", DEFAULT_DOCUMENT_TYPE),
            ("f.zuordnung", DEFAULT_ASSIGNMENT),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor));
        }

        let mut request = self
            .http
            .get(format!("{}/drucksache", self.base_url))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&query);
        if let Some(key) = &self.api_key {
            request = request.header(reqwest::header::AUTHORIZATION, format!("ApiKey {key}"));
        }

        let response = request.send().map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                BackendError::Unreachable(format!("document API: {e}"))
            } else {
                BackendError::RequestFailed(format!("document API: {e}"))
            }
        })?;
        if !response.status().is_success() {
            return Err(BackendError::RequestFailed(format!(
                "document API error: {}",
                response.status()
            )));
        }
        response
            .json()
            .map_err(|e| BackendError::InvalidResponse(format!("document API: {e}")))
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    pub updated: usize,
    pub skipped: usize,
}

/// Maps documents into the repository. Existing measures keep their tally
/// and status, read and rewritten in the same transaction as the update so
/// concurrent votes are not lost; unmappable documents are skipped with a
/// warning.
pub fn import_documents(
    repository: &MeasureRepository,
    documents: &[ExternalDocument],
) -> Result<ImportReport, BackendError> {
    let mut report = ImportReport::default();
    for doc in documents {
        let measure = match map_external_document(doc) {
            Ok(measure) => measure,
            Err(err) => {
                warn!(error = %err, "skipping external document");
                report.skipped += 1;
                continue;
            }
        };

        let (_, replaced) = repository.upsert_with(measure, carry_over)?;
        if replaced {
            report.updated += 1;
        } else {
            report.imported += 1;
        }
    }
    info!(
        imported = report.imported,
        updated = report.updated,
        skipped = report.skipped,
        "document import finished"
    );
    Ok(report)
}

fn carry_over(existing: &Measure, measure: &mut Measure) {
    measure.totals = existing.totals;
    measure.status = existing.status;
    measure.created_at = existing.created_at;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{MeasureStatus, VoteChoice};
    use crate::ledger::VoteLedger;
    use crate::store::LocalStore;

    fn doc(id: Option<&str>) -> ExternalDocument {
        ExternalDocument {
            id: id.map(str::to_string),
            title: "Entwurf eines Gesetzes".to_string(),
            document_number: Some("20/77".to_string()),
            legislative_period: Some(20),
            date: Some("2024-02-01".to_string()),
            ..ExternalDocument::default()
        }
    }

    #[test]
    fn import_adds_new_and_skips_unmappable() {
        let repo = MeasureRepository::new(LocalStore::in_memory());
        let report = import_documents(&repo, &[doc(Some("77")), doc(None)]).unwrap();
        assert_eq!(report, ImportReport { imported: 1, updated: 0, skipped: 1 });

        let measure = repo.get_by_id("dip-77").unwrap();
        assert_eq!(measure.status, MeasureStatus::Draft);
        assert_eq!(repo.list_all()[0].id, "dip-77");
    }

    #[test]
    fn reimport_keeps_votes_and_status() {
        let repo = MeasureRepository::new(LocalStore::in_memory());
        import_documents(&repo, &[doc(Some("77"))]).unwrap();

        let mut active = repo.get_by_id("dip-77").unwrap();
        active.status = MeasureStatus::Active;
        repo.upsert(active).unwrap();
        VoteLedger::new(repo.clone())
            .cast_vote("dip-77", VoteChoice::For, "user-a")
            .unwrap();

        let report = import_documents(&repo, &[doc(Some("77"))]).unwrap();
        assert_eq!(report.updated, 1);
        let measure = repo.get_by_id("dip-77").unwrap();
        assert_eq!(measure.totals.for_votes, 1);
        assert_eq!(measure.status, MeasureStatus::Active);
    }

    #[test]
    fn import_racing_votes_keeps_every_vote_counted() {
        let repo = MeasureRepository::new(LocalStore::in_memory());
        import_documents(&repo, &[doc(Some("77"))]).unwrap();
        let ledger = VoteLedger::new(repo.clone());

        let importer = {
            let repo = repo.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    import_documents(&repo, &[doc(Some("77"))]).unwrap();
                }
            })
        };
        for i in 0..50 {
            ledger
                .cast_vote("dip-77", VoteChoice::For, &format!("user-{i}"))
                .unwrap();
        }
        importer.join().unwrap();

        let measure = repo.get_by_id("dip-77").unwrap();
        assert_eq!(measure.totals.for_votes, 50);
        assert_eq!(ledger.votes_for_measure("dip-77").len(), 50);
    }
}
