use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Who wrote a record last: an API user or the scraper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Actor {
    Author,
    Scraper,
}

impl Actor {
    pub fn as_str(self) -> &'static str {
        match self {
            Actor::Author => "author",
            Actor::Scraper => "scraper",
        }
    }
}

impl FromStr for Actor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "author" => Ok(Actor::Author),
            "scraper" => Ok(Actor::Scraper),
            other => Err(format!("unknown actor {other:?}")),
        }
    }
}

/// A quote points at exactly one of a canonical or a staging author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "camelCase")]
pub enum AuthorRef {
    Author(i64),
    ScrapedAuthor(i64),
}

impl AuthorRef {
    pub fn from_columns(author_id: Option<i64>, scraped_author_id: Option<i64>) -> Option<Self> {
        match (author_id, scraped_author_id) {
            (Some(id), None) => Some(AuthorRef::Author(id)),
            (None, Some(id)) => Some(AuthorRef::ScrapedAuthor(id)),
            _ => None,
        }
    }

    pub fn author_id(self) -> Option<i64> {
        match self {
            AuthorRef::Author(id) => Some(id),
            AuthorRef::ScrapedAuthor(_) => None,
        }
    }

    pub fn scraped_author_id(self) -> Option<i64> {
        match self {
            AuthorRef::ScrapedAuthor(id) => Some(id),
            AuthorRef::Author(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub id: i64,
    #[serde(rename = "quote")]
    pub text: String,
    pub tags: Vec<String>,
    pub author: AuthorRef,
    pub created_by: Actor,
    pub updated_by: Actor,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: i64,
    pub name: String,
    pub dob: Option<NaiveDate>,
    pub country: Option<String>,
    pub description: Option<String>,
    /// Only self-registered authors carry a password digest; it never leaves the store.
    #[serde(skip)]
    pub password: Option<String>,
    pub scrape_id: Option<i64>,
    pub created_by: Actor,
    pub updated_by: Actor,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

/// Staging author harvested from the quote listing, keyed by its detail link.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedAuthor {
    pub id: i64,
    pub name: String,
    pub dob: Option<NaiveDate>,
    pub country: Option<String>,
    pub description: Option<String>,
    pub link: String,
    pub created_on: DateTime<Utc>,
    pub updated_on: DateTime<Utc>,
}

impl ScrapedAuthor {
    pub fn has_biography(&self) -> bool {
        self.dob.is_some() && self.country.is_some() && self.description.is_some()
    }
}

/// Biographical fields parsed from an author detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Biography {
    pub dob: NaiveDate,
    pub country: String,
    pub description: String,
}

/// One quote block as it comes off a listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawQuote {
    pub text: String,
    pub tags: Vec<String>,
    pub author: RawAuthor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RawAuthor {
    pub name: String,
    pub link: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseStatus {
    NotStarted,
    InProgress,
    Failed,
    Success,
}

impl PhaseStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PhaseStatus::NotStarted => "NOT_STARTED",
            PhaseStatus::InProgress => "IN_PROGRESS",
            PhaseStatus::Failed => "FAILED",
            PhaseStatus::Success => "SUCCESS",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PhaseStatus::Failed | PhaseStatus::Success)
    }
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PhaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NOT_STARTED" => Ok(PhaseStatus::NotStarted),
            "IN_PROGRESS" => Ok(PhaseStatus::InProgress),
            "FAILED" => Ok(PhaseStatus::Failed),
            "SUCCESS" => Ok(PhaseStatus::Success),
            other => Err(format!("unknown phase status {other:?}")),
        }
    }
}

/// Status of both pipeline phases. A plain value: the orchestrator persists it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPhases {
    pub quote_phase: PhaseStatus,
    pub author_phase: PhaseStatus,
}

impl Default for TaskPhases {
    fn default() -> Self {
        Self {
            quote_phase: PhaseStatus::NotStarted,
            author_phase: PhaseStatus::NotStarted,
        }
    }
}

impl TaskPhases {
    pub fn with_quote(self, status: PhaseStatus) -> Self {
        Self {
            quote_phase: status,
            ..self
        }
    }

    pub fn with_author(self, status: PhaseStatus) -> Self {
        Self {
            author_phase: status,
            ..self
        }
    }

    pub fn is_finished(&self) -> bool {
        self.quote_phase.is_terminal() && self.author_phase.is_terminal()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledTask {
    pub id: i64,
    pub job_id: Option<String>,
    pub external_task_id: Option<String>,
    pub description: String,
    pub status: TaskPhases,
    pub created_on: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_ref_requires_exactly_one_column() {
        assert_eq!(AuthorRef::from_columns(Some(1), None), Some(AuthorRef::Author(1)));
        assert_eq!(
            AuthorRef::from_columns(None, Some(2)),
            Some(AuthorRef::ScrapedAuthor(2))
        );
        assert_eq!(AuthorRef::from_columns(Some(1), Some(2)), None);
        assert_eq!(AuthorRef::from_columns(None, None), None);
    }

    #[test]
    fn phases_serialize_in_wire_form() {
        let phases = TaskPhases::default().with_quote(PhaseStatus::InProgress);
        let json = serde_json::to_value(phases).unwrap();
        assert_eq!(json["quotePhase"], "IN_PROGRESS");
        assert_eq!(json["authorPhase"], "NOT_STARTED");
        assert!(!phases.is_finished());
    }

    #[test]
    fn phase_status_round_trips_through_text() {
        for status in [
            PhaseStatus::NotStarted,
            PhaseStatus::InProgress,
            PhaseStatus::Failed,
            PhaseStatus::Success,
        ] {
            assert_eq!(status.as_str().parse::<PhaseStatus>(), Ok(status));
        }
    }
}
