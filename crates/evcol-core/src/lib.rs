//! Canonical event model shared by the collector crates.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod region;

pub use region::{Region, RegionClassifier, RegionTable, RegionTableError};

pub const CRATE_NAME: &str = "evcol-core";

/// Number of leading title characters compared by the near-duplicate check.
pub const NEAR_DUPLICATE_PREFIX_CHARS: usize = 8;

/// Longest title the store accepts.
pub const MAX_TITLE_CHARS: usize = 255;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Festival,
    Exhibition,
    Art,
    Contest,
    Concert,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Festival,
        Category::Exhibition,
        Category::Art,
        Category::Contest,
        Category::Concert,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Festival => "festival",
            Category::Exhibition => "exhibition",
            Category::Art => "art",
            Category::Contest => "contest",
            Category::Concert => "concert",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} `{value}`")]
pub struct ParseCodeError {
    pub kind: &'static str,
    pub value: String,
}

impl FromStr for Category {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s.trim())
            .ok_or_else(|| ParseCodeError {
                kind: "category",
                value: s.to_string(),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }
}

impl FromStr for ApprovalStatus {
    type Err = ParseCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(ApprovalStatus::Pending),
            "approved" => Ok(ApprovalStatus::Approved),
            "rejected" => Ok(ApprovalStatus::Rejected),
            other => Err(ParseCodeError {
                kind: "approval status",
                value: other.to_string(),
            }),
        }
    }
}

/// Something an adapter had to paper over while building a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateWarning {
    /// The listing's date text could not be parsed; the run date was used.
    DateDefaulted { raw: String },
    /// No keyword matched the location; the record falls back to `nationwide`.
    RegionDefaulted { location: String },
}

/// Not-yet-persisted listing produced by a source adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventCandidate {
    pub source_id: String,
    pub title: String,
    pub category: Category,
    pub location: String,
    pub region: Option<Region>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub image_url: Option<String>,
    pub source_url: String,
    pub description: Option<String>,
    pub organizer: Option<String>,
    pub price: Option<String>,
    pub is_free: Option<bool>,
    #[serde(default)]
    pub warnings: Vec<CandidateWarning>,
}

impl EventCandidate {
    pub fn new(
        source_id: impl Into<String>,
        category: Category,
        title: impl Into<String>,
        source_url: impl Into<String>,
        start_date: NaiveDate,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            title: title.into(),
            category,
            location: String::new(),
            region: None,
            start_date,
            end_date: None,
            image_url: None,
            source_url: source_url.into(),
            description: None,
            organizer: None,
            price: None,
            is_free: None,
            warnings: Vec::new(),
        }
    }

    pub fn end_date_or_start(&self) -> NaiveDate {
        self.end_date.unwrap_or(self.start_date)
    }

    pub fn resolved_is_free(&self) -> bool {
        self.is_free
            .unwrap_or_else(|| derive_is_free(self.price.as_deref()))
    }
}

/// Canonical persisted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub title: String,
    pub category: Category,
    pub location: String,
    pub region: Option<Region>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub image_url: Option<String>,
    pub source_url: String,
    pub website_url: Option<String>,
    pub description: Option<String>,
    pub organizer: Option<String>,
    pub price: Option<String>,
    pub is_free: bool,
    pub approval_status: Option<ApprovalStatus>,
    pub crawled_at: Option<DateTime<Utc>>,
}

impl EventRecord {
    pub fn is_frozen(&self) -> bool {
        self.approval_status == Some(ApprovalStatus::Approved)
    }

    pub fn description_len(&self) -> usize {
        self.description
            .as_deref()
            .map(|d| d.trim().chars().count())
            .unwrap_or(0)
    }
}

/// Reasons a record would be refused by the store; empty means valid.
pub fn validate_record(record: &EventRecord) -> Result<(), Vec<String>> {
    let mut reasons = Vec::new();
    if record.title.trim().is_empty() {
        reasons.push("title can't be blank".to_string());
    } else if record.title.chars().count() > MAX_TITLE_CHARS {
        reasons.push(format!(
            "title is too long (maximum is {MAX_TITLE_CHARS} characters)"
        ));
    }
    if record.source_url.trim().is_empty() {
        reasons.push("source_url can't be blank".to_string());
    } else if record.source_url.chars().any(char::is_whitespace) {
        reasons.push("source_url must not contain whitespace".to_string());
    }
    if reasons.is_empty() {
        Ok(())
    } else {
        Err(reasons)
    }
}

/// Free-entry flag from a source's price text.
pub fn derive_is_free(price: Option<&str>) -> bool {
    let Some(price) = price else {
        return false;
    };
    let trimmed = price.trim();
    if trimmed == "0" || trimmed == "0원" {
        return true;
    }
    let lower = trimmed.to_lowercase();
    lower.contains("무료") || lower.contains("free")
}

/// Leading characters used to match near-duplicate titles.
pub fn title_prefix(title: &str) -> String {
    title
        .trim()
        .chars()
        .take(NEAR_DUPLICATE_PREFIX_CHARS)
        .collect()
}
