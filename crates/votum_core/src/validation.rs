//! Input checks that run before anything touches storage.

use crate::error::ValidationError;
use crate::schema::ProposalDraft;

pub const TITLE_MIN_CHARS: usize = 10;
pub const TITLE_MAX_CHARS: usize = 120;
pub const SUMMARY_MIN_CHARS: usize = 50;

/// Categories offered when drafting a proposal. Free text is still accepted.
pub const PROPOSAL_CATEGORIES: &[&str] = &[
    "Klima & Energie",
    "Digitales & Verwaltung",
    "Verkehr & Mobilität",
    "Soziales",
    "Bildung",
    "Gesundheit",
    "Wirtschaft",
    "Sonstiges",
];

/// Returns the first failing field.
pub fn validate_proposal(draft: &ProposalDraft) -> Result<(), ValidationError> {
    let title_len = draft.title.trim().chars().count();
    if title_len < TITLE_MIN_CHARS {
        return Err(ValidationError::new(
            "title",
            format!("must be at least {TITLE_MIN_CHARS} characters"),
        ));
    }
    if title_len > TITLE_MAX_CHARS {
        return Err(ValidationError::new(
            "title",
            format!("must be at most {TITLE_MAX_CHARS} characters"),
        ));
    }
    if draft.summary.trim().chars().count() < SUMMARY_MIN_CHARS {
        return Err(ValidationError::new(
            "summary",
            format!("must be at least {SUMMARY_MIN_CHARS} characters"),
        ));
    }
    if draft.category.trim().is_empty() {
        return Err(ValidationError::new("category", "must not be empty"));
    }
    Ok(())
}

pub fn validate_comment_body(body: &str) -> Result<(), ValidationError> {
    if body.trim().is_empty() {
        return Err(ValidationError::new("body", "must not be empty"));
    }
    Ok(())
}
