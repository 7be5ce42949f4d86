//! REST client for the remote backend.
//!
//! Endpoints (relative to the configured base URL):
//! - `GET  /drucksachen` with `page`, `limit`, `search`, `ressort`, `dateFrom`, `dateTo`
//! - `GET  /drucksachen/{id}`
//! - `GET  /drucksachen/ressorts`
//! - `POST /votes` with `{"drucksacheId": .., "vote": "YES" | "NO" | "ABSTAIN"}`
//! - `GET  /votes/drucksache/{id}` returning `{"hasVoted": .., "vote": ..}`
//! - `POST /sync/trigger`
//!
//! Ids are percent-encoded as single path segments.
//! Requests carry `Authorization: Bearer <token>` when a token is known.
//! Nothing is retried; a failed call fails the operation.

use crate::backend::VotingBackend;
use crate::error::BackendError;
use crate::mapper::{RemoteRecord, map_remote_record};
use crate::query::{MeasureFilter, REMOTE_PAGE_SIZE};
use crate::schema::{DeliveryStatus, Measure, User, Vote, VoteChoice};
use reqwest::{StatusCode, Url};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::{debug, info, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Pagination {
    total: u64,
}

#[derive(Debug, Deserialize)]
struct PaginatedResponse<T> {
    data: Vec<T>,
    pagination: Pagination,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateVoteRequest<'a> {
    drucksache_id: &'a str,
    vote: &'static str,
}

#[derive(Debug, Default, Deserialize)]
struct CreateVoteResponse {
    #[serde(default, rename = "_id")]
    id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MyVoteResponse {
    has_voted: bool,
    #[serde(default)]
    vote: Option<String>,
}

pub fn choice_token(choice: VoteChoice) -> &'static str {
    match choice {
        VoteChoice::For => "YES",
        VoteChoice::Against => "NO",
        VoteChoice::Abstain => "ABSTAIN",
    }
}

pub fn parse_choice_token(token: &str) -> Option<VoteChoice> {
    match token {
        "YES" => Some(VoteChoice::For),
        "NO" => Some(VoteChoice::Against),
        "ABSTAIN" => Some(VoteChoice::Abstain),
        _ => None,
    }
}

/// Query parameters for one listing page. Status is never sent; the
/// backend does not know it, so it is filtered after retrieval.
pub fn list_query(filter: &MeasureFilter) -> Vec<(&'static str, String)> {
    let mut query = vec![("page", "1".to_string()), ("limit", REMOTE_PAGE_SIZE.to_string())];
    if let Some(search) = filter.search() {
        query.push(("search", search.to_string()));
    }
    if let Some(category) = filter.category() {
        query.push(("ressort", category.to_string()));
    }
    if let Some(range) = filter.date_range {
        if let Some(start) = range.start.and_then(|start| start.format(&Rfc3339).ok()) {
            query.push(("dateFrom", start));
        }
        if let Some(end) = range.end.and_then(|end| end.format(&Rfc3339).ok()) {
            query.push(("dateTo", end));
        }
    }
    query
}

pub struct RemoteBackend {
    http: Client,
    base_url: Url,
    token: Option<String>,
}

impl RemoteBackend {
    pub fn new(
        base_url: &str,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let parsed = Url::parse(base_url.trim())
            .map_err(|e| BackendError::RequestFailed(format!("invalid base URL {base_url}: {e}")))?;
        if parsed.cannot_be_a_base() {
            return Err(BackendError::RequestFailed(format!(
                "base URL cannot take a path: {base_url}"
            )));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BackendError::RequestFailed(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: parsed,
            token: token.filter(|token| !token.trim().is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                BackendError::RequestFailed(format!("base URL cannot take a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn get(&self, segments: &[&str]) -> Result<RequestBuilder, BackendError> {
        Ok(self.authorized(self.http.get(self.endpoint(segments)?)))
    }

    fn post(&self, segments: &[&str]) -> Result<RequestBuilder, BackendError> {
        Ok(self.authorized(self.http.post(self.endpoint(segments)?)))
    }

    fn fetch_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, BackendError> {
        let response = send(request)?;
        parse_json(response)
    }
}

fn classify(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Unreachable(format!("request timed out: {e}"))
    } else if e.is_connect() {
        BackendError::Unreachable(format!("connection failed: {e}"))
    } else {
        BackendError::RequestFailed(e.to_string())
    }
}

fn send(request: RequestBuilder) -> Result<Response, BackendError> {
    let response = request.send().map_err(classify)?;

    if !response.status().is_success() {
        return Err(BackendError::RequestFailed(format!(
            "HTTP status {}",
            response.status()
        )));
    }
    Ok(response)
}

fn parse_json<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
    response
        .json()
        .map_err(|e| BackendError::InvalidResponse(format!("failed to parse response: {e}")))
}

impl VotingBackend for RemoteBackend {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn list_measures(&self, filter: &MeasureFilter) -> Result<Vec<Measure>, BackendError> {
        let page: PaginatedResponse<RemoteRecord> =
            self.fetch_json(self.get(&["drucksachen"])?.query(&list_query(filter)))?;
        let now = OffsetDateTime::now_utc();

        let mut measures = Vec::with_capacity(page.data.len());
        let mut skipped = 0;
        for record in &page.data {
            match map_remote_record(record, now) {
                Ok(measure) => {
                    if filter.matches_status(&measure) {
                        measures.push(measure);
                    }
                }
                Err(err) => {
                    skipped += 1;
                    warn!(record_id = %record.id, error = %err, "skipping unmappable remote record");
                }
            }
        }
        debug!(
            fetched = page.data.len(),
            kept = measures.len(),
            skipped,
            total = page.pagination.total,
            "listed remote measures"
        );
        Ok(measures)
    }

    fn get_measure(&self, id: &str) -> Result<Option<Measure>, BackendError> {
        let response = self
            .get(&["drucksachen", id])?
            .send()
            .map_err(classify)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(BackendError::RequestFailed(format!(
                "HTTP status {}",
                response.status()
            )));
        }
        let record: RemoteRecord = parse_json(response)?;
        Ok(Some(map_remote_record(&record, OffsetDateTime::now_utc())?))
    }

    fn categories(&self) -> Result<Vec<String>, BackendError> {
        self.fetch_json(self.get(&["drucksachen", "ressorts"])?)
    }

    fn cast_vote(
        &self,
        measure_id: &str,
        choice: VoteChoice,
        user: &User,
    ) -> Result<Vote, BackendError> {
        let body = CreateVoteRequest {
            drucksache_id: measure_id,
            vote: choice_token(choice),
        };
        let response = send(self.post(&["votes"])?.json(&body))?;
        // The body is informational; a 2xx already means the vote was stored.
        let created: CreateVoteResponse = response.json().unwrap_or_default();
        info!(measure_id, %choice, "vote sent to remote backend");

        Ok(Vote {
            id: created.id.unwrap_or_else(|| format!("remote-{measure_id}")),
            measure_id: measure_id.to_string(),
            user_id: user.id.clone(),
            choice,
            created_at: OffsetDateTime::now_utc(),
            delivery: DeliveryStatus::Confirmed,
        })
    }

    fn user_vote(&self, measure_id: &str, user: &User) -> Result<Option<Vote>, BackendError> {
        let answer: MyVoteResponse =
            self.fetch_json(self.get(&["votes", "drucksache", measure_id])?)?;
        if !answer.has_voted {
            return Ok(None);
        }
        let token = answer.vote.unwrap_or_default();
        let choice = parse_choice_token(&token).ok_or_else(|| {
            BackendError::InvalidResponse(format!("unknown vote token: {token}"))
        })?;
        Ok(Some(Vote {
            id: format!("remote-{measure_id}"),
            measure_id: measure_id.to_string(),
            user_id: user.id.clone(),
            choice,
            created_at: OffsetDateTime::now_utc(),
            delivery: DeliveryStatus::Confirmed,
        }))
    }

    fn trigger_sync(&self) -> Result<(), BackendError> {
        send(self.post(&["sync", "trigger"])?)?;
        info!(base_url = %self.base_url, "remote sync triggered");
        Ok(())
    }
}
