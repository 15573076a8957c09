use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Placeholder for a declared field whose value could not be read.
pub const SENTINEL: &str = "N/A";

/// One raw listing. Field order follows the selector map declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub category: String,
    pub page_index: u32,
    pub fields: IndexMap<String, String>,
}

impl Record {
    pub fn new(category: impl Into<String>, page_index: u32) -> Self {
        Self {
            category: category.into(),
            page_index,
            fields: IndexMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn is_sentinel(&self, field: &str) -> bool {
        self.get(field).is_none_or(|v| v == SENTINEL)
    }
}

/// Digest of a page's extracted content, used to detect pagination stalls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hashes the record count followed by every field of every record in
    /// order, so same-count pages with different content never collide.
    pub fn of(records: &[Record]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((records.len() as u64).to_le_bytes());
        for record in records {
            for (key, value) in &record.fields {
                hasher.update(key.as_bytes());
                hasher.update([0x1f]);
                hasher.update(value.as_bytes());
                hasher.update([0x1e]);
            }
            hasher.update([0x1d]);
        }
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageState {
    pub index: u32,
    pub record_count: usize,
    pub fingerprint: Fingerprint,
}

impl PageState {
    pub fn new(index: u32, records: &[Record]) -> Self {
        Self {
            index,
            record_count: records.len(),
            fingerprint: Fingerprint::of(records),
        }
    }
}

/// A listing or field that could not be read. Never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionWarning {
    pub category: String,
    pub page_index: u32,
    pub listing_index: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    Navigation { url: String, reason: String },
    Obstacle { spec: String },
    Disallowed { url: String },
    Cancelled,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Navigation { url, reason } => write!(f, "navigation to {} failed: {}", url, reason),
            Self::Obstacle { spec } => write!(f, "obstacle '{}' unresolved", spec),
            Self::Disallowed { url } => write!(f, "{} rejected by policy", url),
            Self::Cancelled => write!(f, "run cancelled before category started"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CategoryOutcome {
    Completed,
    PartiallyCompleted { pages_done: u32 },
    Failed { reason: FailureReason },
}

impl CategoryOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::PartiallyCompleted { .. } => "partial",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Per-category counters reported alongside the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryReport {
    pub outcome: CategoryOutcome,
    pub records: usize,
    pub pages: Vec<PageState>,
    pub skipped_listings: usize,
    pub duplicates_dropped: usize,
    pub termination: Option<String>,
}

impl CategoryReport {
    pub fn failed(reason: FailureReason) -> Self {
        Self {
            outcome: CategoryOutcome::Failed { reason },
            records: 0,
            pages: Vec::new(),
            skipped_listings: 0,
            duplicates_dropped: 0,
            termination: None,
        }
    }

    pub fn pages_traversed(&self) -> u32 {
        self.pages.len() as u32
    }
}

/// Everything handed to the export collaborator at the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub records: Vec<Record>,
    pub categories: IndexMap<String, CategoryReport>,
    pub warnings: Vec<ExtractionWarning>,
}

impl RunResult {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            records: Vec::new(),
            categories: IndexMap::new(),
            warnings: Vec::new(),
        }
    }

    pub fn outcome(&self, category: &str) -> Option<&CategoryOutcome> {
        self.categories.get(category).map(|r| &r.outcome)
    }

    pub fn records_for<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a Record> + 'a {
        self.records.iter().filter(move |r| r.category == category)
    }

    pub fn all_completed(&self) -> bool {
        self.categories.values().all(|r| r.outcome.is_completed())
    }

    pub(crate) fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

impl Default for RunResult {
    fn default() -> Self {
        Self::new()
    }
}
