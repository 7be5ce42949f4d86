//! The one place upstream record shapes become [`Measure`]s.
//!
//! Two shapes arrive from outside: documents from the parliamentary
//! document API ([`ExternalDocument`]) and the remote backend's own records
//! ([`RemoteRecord`]), which wrap the same documents plus vote counts. Both
//! are mapped here so nothing downstream branches on where a measure came
//! from.

use crate::error::MappingError;
use crate::schema::{ExternalRef, Measure, MeasureOrigin, MeasureStatus, SourceLink, Tally};
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, Duration, OffsetDateTime};

pub const DIP_PROVIDER: &str = "dip-bundestag";
pub const DIP_PDF_LABEL: &str = "DIP Drucksache PDF";
pub const DEFAULT_CATEGORY: &str = "Gesetzentwurf";
pub const MAPPED_QUORUM: u64 = 500;
pub const VOTING_WINDOW: Duration = Duration::days(30);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fundstelle {
    #[serde(default)]
    pub pdf_url: Option<String>,
}

/// A document as served by the parliamentary document search API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalDocument {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "titel")]
    pub title: String,
    #[serde(default, rename = "dokumentart")]
    pub document_kind: Option<String>,
    #[serde(default, rename = "drucksachetyp")]
    pub document_type: Option<String>,
    #[serde(default, rename = "dokumentnummer")]
    pub document_number: Option<String>,
    #[serde(default, rename = "wahlperiode")]
    pub legislative_period: Option<u32>,
    #[serde(default, rename = "herausgeber")]
    pub publisher: Option<String>,
    #[serde(default, rename = "datum")]
    pub date: Option<String>,
    #[serde(default, rename = "aktualisiert")]
    pub updated: Option<String>,
    #[serde(default)]
    pub fundstelle: Option<Fundstelle>,
    #[serde(default, rename = "urheber")]
    pub originators: Vec<String>,
    #[serde(default)]
    pub ressort: Option<String>,
}

impl ExternalDocument {
    fn pdf_url(&self) -> Option<&str> {
        self.fundstelle
            .as_ref()
            .and_then(|fundstelle| fundstelle.pdf_url.as_deref())
            .filter(|url| !url.trim().is_empty())
    }
}

/// One page of search results from the document API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPage {
    pub num_found: u64,
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default)]
    pub documents: Vec<ExternalDocument>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVotes {
    #[serde(rename = "YES", default)]
    pub yes: u64,
    #[serde(rename = "NO", default)]
    pub no: u64,
    #[serde(rename = "ABSTAIN", default)]
    pub abstain: u64,
    #[serde(default)]
    pub total: u64,
}

/// A document record as stored by the remote backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRecord {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default)]
    pub dip_id: Option<String>,
    #[serde(default)]
    pub titel: String,
    #[serde(default)]
    pub dokumentart: Option<String>,
    #[serde(default)]
    pub drucksachetyp: Option<String>,
    #[serde(default)]
    pub datum: Option<String>,
    #[serde(default)]
    pub ressort: Option<String>,
    #[serde(default)]
    pub urheber: Vec<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default, rename = "abstract")]
    pub abstract_text: Option<String>,
    #[serde(default)]
    pub wahlperiode: Option<u32>,
    #[serde(default)]
    pub dokumentnummer: Option<String>,
    #[serde(default)]
    pub votes: RemoteVotes,
}

pub fn map_external_document(doc: &ExternalDocument) -> Result<Measure, MappingError> {
    map_external_document_at(doc, OffsetDateTime::now_utc())
}

/// Same as [`map_external_document`] with an explicit "now" for undated documents.
pub fn map_external_document_at(
    doc: &ExternalDocument,
    now: OffsetDateTime,
) -> Result<Measure, MappingError> {
    let id = doc
        .id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(MappingError::MissingId)?;

    let start_at = match non_blank(doc.date.as_deref()) {
        Some(value) => parse_document_date(value).ok_or_else(|| MappingError::InvalidDate {
            id: id.to_string(),
            value: value.to_string(),
        })?,
        None => now,
    };
    let upstream_updated = non_blank(doc.updated.as_deref()).and_then(parse_document_date);

    let pdf_url = doc.pdf_url().map(str::to_string);
    let sources = pdf_url
        .iter()
        .map(|url| SourceLink {
            label: DIP_PDF_LABEL.to_string(),
            url: url.clone(),
        })
        .collect();

    let category = non_blank(doc.document_type.as_deref())
        .unwrap_or(DEFAULT_CATEGORY)
        .to_string();

    Ok(Measure {
        id: format!("dip-{id}"),
        title: doc.title.clone(),
        summary: document_summary(doc.document_number.as_deref(), doc.legislative_period),
        body_markdown: document_body(doc, start_at),
        category,
        start_at,
        end_at: start_at + VOTING_WINDOW,
        status: MeasureStatus::Draft,
        quorum: MAPPED_QUORUM,
        totals: Tally::default(),
        created_at: start_at,
        updated_at: upstream_updated.unwrap_or(start_at),
        sources,
        origin: MeasureOrigin::OfficialSource,
        submitted_by: None,
        external: Some(ExternalRef {
            provider: DIP_PROVIDER.to_string(),
            document_id: id.to_string(),
            document_number: doc.document_number.clone(),
            legislative_period: doc.legislative_period,
            document_url: pdf_url,
            updated_at: upstream_updated,
        }),
    })
}

/// Maps a remote backend record, keeping the backend's id and vote counts.
pub fn map_remote_record(record: &RemoteRecord, now: OffsetDateTime) -> Result<Measure, MappingError> {
    let doc = ExternalDocument {
        id: record.dip_id.clone().or_else(|| Some(record.id.clone())),
        title: record.titel.clone(),
        document_kind: record.dokumentart.clone(),
        document_type: record.drucksachetyp.clone(),
        document_number: record.dokumentnummer.clone(),
        legislative_period: record.wahlperiode,
        publisher: None,
        date: record.datum.clone(),
        updated: None,
        fundstelle: record.pdf_url.clone().map(|pdf_url| Fundstelle {
            pdf_url: Some(pdf_url),
        }),
        originators: record.urheber.clone(),
        ressort: record.ressort.clone(),
    };

    let mut measure = map_external_document_at(&doc, now)?;
    measure.id = record.id.clone();
    if let Some(ressort) = non_blank(record.ressort.as_deref()) {
        measure.category = ressort.to_string();
    }
    if let Some(text) = non_blank(record.abstract_text.as_deref()) {
        measure.summary = text.to_string();
    }
    measure.totals = Tally {
        for_votes: record.votes.yes,
        against: record.votes.no,
        abstain: record.votes.abstain,
    };
    Ok(measure)
}

/// Accepts a bare `YYYY-MM-DD` (midnight UTC) or a full RFC 3339 timestamp.
pub fn parse_document_date(value: &str) -> Option<OffsetDateTime> {
    let value = value.trim();
    if let Ok(date) = Date::parse(value, format_description!("[year]-[month]-[day]")) {
        return Some(date.midnight().assume_utc());
    }
    OffsetDateTime::parse(value, &Rfc3339).ok()
}

fn document_summary(number: Option<&str>, period: Option<u32>) -> String {
    let number = number.unwrap_or("?");
    match period {
        Some(period) => format!("Drucksache {number} (WP {period})"),
        None => format!("Drucksache {number}"),
    }
}

fn document_body(doc: &ExternalDocument, start_at: OffsetDateTime) -> String {
    let mut lines = vec![format!("# {}", doc.title), String::new()];
    if let Some(number) = &doc.document_number {
        lines.push(format!("**Dokumentnummer:** {number}"));
    }
    if let Some(period) = doc.legislative_period {
        lines.push(format!("**Wahlperiode:** {period}"));
    }
    if let Some(publisher) = non_blank(doc.publisher.as_deref()) {
        lines.push(format!("**Herausgeber:** {publisher}"));
    }
    let date = start_at
        .format(format_description!("[day].[month].[year]"))
        .unwrap_or_default();
    lines.push(format!("**Datum:** {date}"));
    if !doc.originators.is_empty() {
        lines.push(format!("**Urheber:** {}", doc.originators.join(", ")));
    }
    if let Some(ressort) = non_blank(doc.ressort.as_deref()) {
        lines.push(format!("**Ressort:** {ressort}"));
    }
    lines.extend([String::new(), "---".to_string(), String::new(), doc.title.clone()]);
    lines.join("\n")
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn document() -> ExternalDocument {
        ExternalDocument {
            id: Some("281234".to_string()),
            title: "Entwurf eines Gesetzes zur Stärkung der Bahn".to_string(),
            document_kind: Some("Drucksache".to_string()),
            document_type: Some("Gesetzentwurf".to_string()),
            document_number: Some("20/9999".to_string()),
            legislative_period: Some(20),
            publisher: Some("BT".to_string()),
            date: Some("2024-01-15".to_string()),
            updated: Some("2024-01-20T10:15:02+01:00".to_string()),
            fundstelle: Some(Fundstelle {
                pdf_url: Some("https://dserver.bundestag.de/btd/20/099/2009999.pdf".to_string()),
            }),
            originators: vec!["Bundesregierung".to_string()],
            ressort: Some("Verkehr".to_string()),
        }
    }

    #[test]
    fn window_is_thirty_days_from_document_date() {
        let measure = map_external_document(&document()).unwrap();
        assert_eq!(measure.start_at, datetime!(2024-01-15 0:00 UTC));
        assert_eq!(measure.end_at - measure.start_at, Duration::days(30));
        assert_eq!(measure.status, MeasureStatus::Draft);
        assert_eq!(measure.id, "dip-281234");
        assert_eq!(measure.origin, MeasureOrigin::OfficialSource);
        assert_eq!(measure.totals, Tally::default());
    }

    #[test]
    fn pdf_link_becomes_the_only_source() {
        let measure = map_external_document(&document()).unwrap();
        assert_eq!(measure.sources.len(), 1);
        assert_eq!(measure.sources[0].label, DIP_PDF_LABEL);

        let mut doc = document();
        doc.fundstelle = None;
        let measure = map_external_document(&doc).unwrap();
        assert!(measure.sources.is_empty());
        assert_eq!(measure.external.unwrap().document_url, None);
    }

    #[test]
    fn undated_document_starts_now() {
        let now = datetime!(2025-06-01 9:30 UTC);
        let mut doc = document();
        doc.date = None;
        let measure = map_external_document_at(&doc, now).unwrap();
        assert_eq!(measure.start_at, now);
        assert_eq!(measure.end_at, datetime!(2025-07-01 9:30 UTC));
    }

    #[test]
    fn category_defaults_when_type_missing() {
        let mut doc = document();
        doc.document_type = Some("  ".to_string());
        let measure = map_external_document(&doc).unwrap();
        assert_eq!(measure.category, DEFAULT_CATEGORY);
    }

    #[test]
    fn missing_id_is_rejected() {
        let mut doc = document();
        doc.id = None;
        assert_eq!(map_external_document(&doc), Err(MappingError::MissingId));

        doc.id = Some(String::new());
        assert_eq!(map_external_document(&doc), Err(MappingError::MissingId));
    }

    #[test]
    fn garbage_date_is_rejected() {
        let mut doc = document();
        doc.date = Some("15.01.2024".to_string());
        assert!(matches!(
            map_external_document(&doc),
            Err(MappingError::InvalidDate { .. })
        ));
    }

    #[test]
    fn mapping_is_deterministic() {
        let now = datetime!(2025-06-01 9:30 UTC);
        let first = map_external_document_at(&document(), now).unwrap();
        let second = map_external_document_at(&document(), now).unwrap();
        assert_eq!(first, second);
        assert!(first.body_markdown.contains("**Datum:** 15.01.2024"));
        assert!(first.body_markdown.contains("**Urheber:** Bundesregierung"));
    }

    #[test]
    fn remote_record_keeps_backend_id_and_counts() {
        let record: RemoteRecord = serde_json::from_value(serde_json::json!({
            "_id": "65a1f0",
            "dipId": "281234",
            "titel": "Entwurf eines Gesetzes",
            "drucksachetyp": "Gesetzentwurf",
            "datum": "2024-01-15",
            "ressort": "Finanzen",
            "pdfUrl": "https://example.org/doc.pdf",
            "abstract": "Kurzfassung",
            "wahlperiode": 20,
            "dokumentnummer": "20/1",
            "votes": { "YES": 4, "NO": 2, "ABSTAIN": 1, "total": 7 }
        }))
        .unwrap();

        let measure = map_remote_record(&record, datetime!(2025-01-01 0:00 UTC)).unwrap();
        assert_eq!(measure.id, "65a1f0");
        assert_eq!(measure.category, "Finanzen");
        assert_eq!(measure.summary, "Kurzfassung");
        assert_eq!(measure.totals.total(), 7);
        assert_eq!(measure.external.unwrap().document_id, "281234");
    }
}
