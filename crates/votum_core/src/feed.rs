//! Read-through measure listing with an explicit polling policy.
//!
//! A [`MeasureFeed`] caches the last listing it fetched. The cache is served
//! while younger than the policy interval and refetched after that or when
//! the filter changes. When the backend fails, the feed answers from the
//! cache or a fallback backend and marks the snapshot degraded instead of
//! failing; it does not retry on its own.

use crate::backend::VotingBackend;
use crate::error::BackendError;
use crate::query::MeasureFilter;
use crate::schema::Measure;
use std::sync::Mutex;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::seconds(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollPolicy {
    pub fn is_stale(&self, fetched_at: OffsetDateTime, now: OffsetDateTime) -> bool {
        now - fetched_at >= self.interval
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub measures: Vec<Measure>,
    pub fetched_at: OffsetDateTime,
    /// Older than the poll interval at the time it was handed out.
    pub stale: bool,
    /// The primary backend failed; the data is cached or from the fallback.
    pub degraded: bool,
}

struct CacheEntry {
    filter: MeasureFilter,
    measures: Vec<Measure>,
    fetched_at: OffsetDateTime,
}

pub struct MeasureFeed {
    primary: Box<dyn VotingBackend>,
    fallback: Option<Box<dyn VotingBackend>>,
    policy: PollPolicy,
    cache: Mutex<Option<CacheEntry>>,
}

impl MeasureFeed {
    pub fn new(primary: Box<dyn VotingBackend>, policy: PollPolicy) -> Self {
        Self {
            primary,
            fallback: None,
            policy,
            cache: Mutex::new(None),
        }
    }

    /// Backend to list from when the primary fails and nothing is cached.
    pub fn with_fallback(mut self, fallback: Box<dyn VotingBackend>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    pub fn primary(&self) -> &dyn VotingBackend {
        self.primary.as_ref()
    }

    /// Cached listing while fresh, otherwise a refetch.
    pub fn current(&self, filter: &MeasureFilter) -> Result<Snapshot, BackendError> {
        self.current_at(filter, OffsetDateTime::now_utc())
    }

    pub fn current_at(
        &self,
        filter: &MeasureFilter,
        now: OffsetDateTime,
    ) -> Result<Snapshot, BackendError> {
        {
            let cache = self.lock_cache();
            if let Some(entry) = cache.as_ref() {
                if entry.filter == *filter && !self.policy.is_stale(entry.fetched_at, now) {
                    debug!("serving cached measures");
                    return Ok(Snapshot {
                        measures: entry.measures.clone(),
                        fetched_at: entry.fetched_at,
                        stale: false,
                        degraded: false,
                    });
                }
            }
        }
        self.refresh_at(filter, now)
    }

    /// Refetches regardless of cache age.
    pub fn refresh(&self, filter: &MeasureFilter) -> Result<Snapshot, BackendError> {
        self.refresh_at(filter, OffsetDateTime::now_utc())
    }

    pub fn refresh_at(
        &self,
        filter: &MeasureFilter,
        now: OffsetDateTime,
    ) -> Result<Snapshot, BackendError> {
        match self.primary.list_measures(filter) {
            Ok(measures) => {
                let mut cache = self.lock_cache();
                *cache = Some(CacheEntry {
                    filter: filter.clone(),
                    measures: measures.clone(),
                    fetched_at: now,
                });
                Ok(Snapshot {
                    measures,
                    fetched_at: now,
                    stale: false,
                    degraded: false,
                })
            }
            Err(err) if err.is_transient() => {
                warn!(
                    backend = self.primary.name(),
                    error = %err,
                    "live source unavailable, serving degraded data"
                );
                self.degraded(filter, now, err)
            }
            Err(err) => Err(err),
        }
    }

    /// Drops the cache so the next [`MeasureFeed::current`] refetches.
    pub fn invalidate(&self) {
        *self.lock_cache() = None;
    }

    fn degraded(
        &self,
        filter: &MeasureFilter,
        now: OffsetDateTime,
        err: BackendError,
    ) -> Result<Snapshot, BackendError> {
        {
            let cache = self.lock_cache();
            if let Some(entry) = cache.as_ref().filter(|entry| entry.filter == *filter) {
                return Ok(Snapshot {
                    measures: entry.measures.clone(),
                    fetched_at: entry.fetched_at,
                    stale: self.policy.is_stale(entry.fetched_at, now),
                    degraded: true,
                });
            }
        }

        match &self.fallback {
            Some(fallback) => Ok(Snapshot {
                measures: fallback.list_measures(filter)?,
                fetched_at: now,
                stale: false,
                degraded: true,
            }),
            None => Err(err),
        }
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, Option<CacheEntry>> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
