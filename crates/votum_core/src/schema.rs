use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MeasureStatus {
    Draft,
    Active,
    Resolved,
}

impl MeasureStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MeasureStatus::Draft => "draft",
            MeasureStatus::Active => "active",
            MeasureStatus::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for MeasureStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MeasureStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "draft" => Ok(MeasureStatus::Draft),
            "active" => Ok(MeasureStatus::Active),
            "resolved" => Ok(MeasureStatus::Resolved),
            other => Err(format!("unknown measure status: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum MeasureOrigin {
    #[serde(rename = "official-source", alias = "dip")]
    OfficialSource,
    #[serde(rename = "user-submitted", alias = "user")]
    UserSubmitted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum VoteChoice {
    #[serde(rename = "for", alias = "pro")]
    For,
    #[serde(rename = "against", alias = "contra")]
    Against,
    #[serde(rename = "abstain")]
    Abstain,
}

impl VoteChoice {
    pub const ALL: [VoteChoice; 3] = [VoteChoice::For, VoteChoice::Against, VoteChoice::Abstain];

    pub fn as_str(self) -> &'static str {
        match self {
            VoteChoice::For => "for",
            VoteChoice::Against => "against",
            VoteChoice::Abstain => "abstain",
        }
    }
}

impl std::fmt::Display for VoteChoice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VoteChoice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "for" | "pro" | "yes" => Ok(VoteChoice::For),
            "against" | "contra" | "no" => Ok(VoteChoice::Against),
            "abstain" => Ok(VoteChoice::Abstain),
            other => Err(format!("unknown vote choice: {other}")),
        }
    }
}

/// Three-way vote counter attached to a measure.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Tally {
    #[serde(rename = "for", alias = "pro")]
    pub for_votes: u64,
    #[serde(rename = "against", alias = "contra")]
    pub against: u64,
    pub abstain: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Majority {
    For,
    Against,
    Tie,
}

impl Tally {
    /// Saturates at `u64::MAX`.
    pub fn total(&self) -> u64 {
        self.for_votes
            .saturating_add(self.against)
            .saturating_add(self.abstain)
    }

    pub fn get(&self, choice: VoteChoice) -> u64 {
        match choice {
            VoteChoice::For => self.for_votes,
            VoteChoice::Against => self.against,
            VoteChoice::Abstain => self.abstain,
        }
    }

    pub fn increment(&mut self, choice: VoteChoice) {
        let bucket = self.bucket_mut(choice);
        *bucket = bucket.saturating_add(1);
    }

    /// Returns false when the bucket was already empty and nothing changed.
    pub fn decrement(&mut self, choice: VoteChoice) -> bool {
        let bucket = self.bucket_mut(choice);
        match bucket.checked_sub(1) {
            Some(value) => {
                *bucket = value;
                true
            }
            None => false,
        }
    }

    /// Abstentions never decide the majority.
    pub fn majority(&self) -> Majority {
        if self.for_votes > self.against {
            Majority::For
        } else if self.against > self.for_votes {
            Majority::Against
        } else {
            Majority::Tie
        }
    }

    /// Advisory only; nothing is enforced when the quorum is missed.
    pub fn quorum_reached(&self, quorum: u64) -> bool {
        self.total() >= quorum
    }

    /// Share of the total in percent, 0.0 when nobody has voted.
    pub fn percent(&self, choice: VoteChoice) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.get(choice) as f64 / total as f64 * 100.0
    }

    fn bucket_mut(&mut self, choice: VoteChoice) -> &mut u64 {
        match choice {
            VoteChoice::For => &mut self.for_votes,
            VoteChoice::Against => &mut self.against,
            VoteChoice::Abstain => &mut self.abstain,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SourceLink {
    pub label: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Submitter {
    pub user_id: String,
    pub display_name: String,
}

/// Where an officially sourced measure came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExternalRef {
    pub provider: String,
    pub document_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "dokumentnummer")]
    pub document_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "wahlperiode")]
    pub legislative_period: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "pdfUrl")]
    pub document_url: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    #[schemars(with = "Option<String>")]
    pub updated_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub body_markdown: String,
    pub category: String,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub start_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub end_at: OffsetDateTime,
    pub status: MeasureStatus,
    pub quorum: u64,
    pub totals: Tally,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub sources: Vec<SourceLink>,
    pub origin: MeasureOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_by: Option<Submitter>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "oracle")]
    pub external: Option<ExternalRef>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    #[default]
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: String,
    pub measure_id: String,
    pub user_id: String,
    pub choice: VoteChoice,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub delivery: DeliveryStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Reactions {
    pub like: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub measure_id: String,
    pub user_id: String,
    pub user_display_name: String,
    pub body: String,
    #[serde(with = "time::serde::rfc3339")]
    #[schemars(with = "String")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub reactions: Reactions,
}

/// Local pseudonymous identity. Not authenticated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub display_name: String,
}

/// A user's proposal draft before it becomes a measure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDraft {
    pub title: String,
    pub summary: String,
    pub category: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn majority_ignores_abstentions() {
        let tally = Tally { for_votes: 3, against: 3, abstain: 10 };
        assert_eq!(tally.majority(), Majority::Tie);

        let tally = Tally { for_votes: 4, against: 3, abstain: 0 };
        assert_eq!(tally.majority(), Majority::For);

        let tally = Tally { for_votes: 0, against: 1, abstain: 5 };
        assert_eq!(tally.majority(), Majority::Against);
    }

    #[test]
    fn decrement_never_goes_negative() {
        let mut tally = Tally::default();
        assert!(!tally.decrement(VoteChoice::For));
        assert_eq!(tally.for_votes, 0);

        tally.increment(VoteChoice::For);
        assert!(tally.decrement(VoteChoice::For));
        assert_eq!(tally.total(), 0);
    }

    #[test]
    fn huge_counts_saturate_instead_of_overflowing() {
        let mut tally = Tally {
            for_votes: u64::MAX,
            against: u64::MAX,
            abstain: 1,
        };
        assert_eq!(tally.total(), u64::MAX);
        assert!(tally.quorum_reached(u64::MAX));
        assert_eq!(tally.percent(VoteChoice::For), 100.0);
        assert_eq!(tally.majority(), Majority::Tie);

        tally.increment(VoteChoice::For);
        assert_eq!(tally.for_votes, u64::MAX);
    }

    #[test]
    fn percent_is_zero_without_votes() {
        let tally = Tally::default();
        assert_eq!(tally.percent(VoteChoice::For), 0.0);

        let tally = Tally { for_votes: 1, against: 1, abstain: 2 };
        assert_eq!(tally.percent(VoteChoice::Abstain), 50.0);
        assert!(tally.quorum_reached(4));
        assert!(!tally.quorum_reached(5));
    }

    #[test]
    fn tally_reads_legacy_choice_tokens() {
        let tally: Tally = serde_json::from_str(r#"{"pro":2,"contra":1,"abstain":0}"#).unwrap();
        assert_eq!(tally, Tally { for_votes: 2, against: 1, abstain: 0 });

        let written = serde_json::to_value(tally).unwrap();
        assert_eq!(written["for"], 2);
        assert_eq!(written["against"], 1);
    }

    #[test]
    fn vote_choice_parses_aliases() {
        assert_eq!("Pro".parse::<VoteChoice>().unwrap(), VoteChoice::For);
        assert_eq!("against".parse::<VoteChoice>().unwrap(), VoteChoice::Against);
        assert!("maybe".parse::<VoteChoice>().is_err());
    }
}
