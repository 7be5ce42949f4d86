//! Measure filters and the client-side matching rules.

use crate::schema::{Measure, MeasureStatus};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Maximum records requested from the remote backend per listing.
pub const REMOTE_PAGE_SIZE: u32 = 50;

/// Inclusive bounds on a measure's start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end: Option<OffsetDateTime>,
}

impl DateRange {
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.start.is_none_or(|start| at >= start) && self.end.is_none_or(|end| at <= end)
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Every `None` field means "no constraint".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureFilter {
    pub search_text: Option<String>,
    pub date_range: Option<DateRange>,
    pub category: Option<String>,
    pub status: Option<MeasureStatus>,
}

impl MeasureFilter {
    pub fn with_status(status: MeasureStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Search text with surrounding whitespace removed; blank counts as unset.
    pub fn search(&self) -> Option<&str> {
        self.search_text
            .as_deref()
            .map(str::trim)
            .filter(|text| !text.is_empty())
    }

    pub fn category(&self) -> Option<&str> {
        self.category
            .as_deref()
            .map(str::trim)
            .filter(|category| !category.is_empty())
    }

    /// Full match, used by the local backend.
    pub fn matches(&self, measure: &Measure) -> bool {
        self.matches_search(measure)
            && self.matches_dates(measure)
            && self.matches_category(measure)
            && self.matches_status(measure)
    }

    /// The part the remote backend never applies for us.
    pub fn matches_status(&self, measure: &Measure) -> bool {
        self.status.is_none_or(|status| measure.status == status)
    }

    fn matches_search(&self, measure: &Measure) -> bool {
        let Some(needle) = self.search() else {
            return true;
        };
        let needle = needle.to_lowercase();
        [&measure.title, &measure.summary, &measure.body_markdown]
            .iter()
            .any(|field| field.to_lowercase().contains(&needle))
    }

    fn matches_dates(&self, measure: &Measure) -> bool {
        self.date_range
            .is_none_or(|range| range.contains(measure.start_at))
    }

    fn matches_category(&self, measure: &Measure) -> bool {
        self.category()
            .is_none_or(|category| measure.category.trim().to_lowercase() == category.to_lowercase())
    }
}

pub fn apply_filter(measures: Vec<Measure>, filter: &MeasureFilter) -> Vec<Measure> {
    measures
        .into_iter()
        .filter(|measure| filter.matches(measure))
        .collect()
}
