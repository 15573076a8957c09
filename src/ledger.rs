use crate::Result;
use crate::diagnostics::{DiagnosticsSink, SnapshotRef};
use crate::renderer::PageRenderer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryState {
    Pending,
    Navigating,
    ResolvingObstacles,
    Extracting,
    Paginating,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    State { state: CategoryState },
    Navigation { url: String, attempt: u32, error: Option<String> },
    ObstacleAttempt { spec: String, attempt: u32, resolved: bool, detail: Option<String> },
    PageExtracted { page: u32, records: usize, skipped: usize, fingerprint: String },
    Pagination { page: u32, decision: String },
    CategoryRecords { count: usize, duplicates_dropped: usize, outcome: String },
    Snapshot { label: String, reference: SnapshotRef },
    RunCancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(flatten)]
    pub event: LedgerEvent,
}

/// Append-only record of what happened during a run. Written by the engine,
/// read by the caller afterwards; never consulted for control decisions.
#[derive(Debug, Default)]
pub struct RunLedger {
    entries: Vec<LedgerEntry>,
}

impl RunLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, category: Option<&str>, event: LedgerEvent) {
        match &event {
            LedgerEvent::Navigation { error: Some(e), url, attempt } => {
                tracing::warn!(category, %url, attempt, "navigation failed: {}", e)
            }
            LedgerEvent::ObstacleAttempt { spec, attempt, resolved: false, .. } => {
                tracing::warn!(category, %spec, attempt, "obstacle still present")
            }
            LedgerEvent::CategoryRecords { count, outcome, .. } => {
                tracing::info!(category, count, %outcome, "category finished")
            }
            other => tracing::debug!(category, "{:?}", other),
        }

        self.entries.push(LedgerEntry {
            seq: self.entries.len() as u64,
            at: Utc::now(),
            category: category.map(str::to_string),
            event,
        });
    }

    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn for_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a LedgerEntry> + 'a {
        self.entries
            .iter()
            .filter(move |e| e.category.as_deref() == Some(category))
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &SnapshotRef> {
        self.entries.iter().filter_map(|e| match &e.event {
            LedgerEvent::Snapshot { reference, .. } => Some(reference),
            _ => None,
        })
    }

    pub fn write_ndjson(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut writer = BufWriter::new(File::create(path)?);
        for entry in &self.entries {
            serde_json::to_writer(&mut writer, entry)?;
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Ledger plus diagnostics sink, scoped to the category being processed.
pub struct Journal<'a> {
    ledger: &'a mut RunLedger,
    sink: &'a mut dyn DiagnosticsSink,
    category: Option<String>,
}

impl<'a> Journal<'a> {
    pub fn new(ledger: &'a mut RunLedger, sink: &'a mut dyn DiagnosticsSink) -> Self {
        Self {
            ledger,
            sink,
            category: None,
        }
    }

    pub fn scoped(&mut self, category: &str) -> Journal<'_> {
        Journal {
            ledger: &mut *self.ledger,
            sink: &mut *self.sink,
            category: Some(category.to_string()),
        }
    }

    pub fn record(&mut self, event: LedgerEvent) {
        self.ledger.append(self.category.as_deref(), event);
    }

    pub fn transition(&mut self, state: CategoryState) {
        self.record(LedgerEvent::State { state });
    }

    /// Captures the current page into the sink. Capture failures are logged
    /// and otherwise ignored.
    pub async fn capture<R: PageRenderer + ?Sized>(&mut self, renderer: &mut R, label: &str) {
        if !self.sink.wants_snapshots() {
            tracing::debug!("snapshot '{}' skipped, diagnostics disabled", label);
            return;
        }
        let snapshot = match renderer.snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                tracing::warn!("snapshot '{}' failed: {}", label, e);
                return;
            }
        };
        match self.sink.submit(label, &snapshot) {
            Ok(reference) => self.record(LedgerEvent::Snapshot {
                label: label.to_string(),
                reference,
            }),
            Err(e) => tracing::warn!("storing snapshot '{}' failed: {}", label, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{DiscardSink, MemorySink};
    use crate::renderer::fake::FakeRenderer;
    use tempfile::TempDir;

    #[test]
    fn test_append_is_ordered() {
        let mut ledger = RunLedger::new();
        ledger.append(Some("Foods"), LedgerEvent::State { state: CategoryState::Navigating });
        ledger.append(Some("Foods"), LedgerEvent::State { state: CategoryState::Extracting });
        ledger.append(None, LedgerEvent::RunCancelled);

        let seqs: Vec<u64> = ledger.entries().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert_eq!(ledger.for_category("Foods").count(), 2);
    }

    #[test]
    fn test_write_ndjson() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("run").join("ledger.ndjson");

        let mut ledger = RunLedger::new();
        ledger.append(
            Some("Liquor"),
            LedgerEvent::ObstacleAttempt {
                spec: "age-check".into(),
                attempt: 1,
                resolved: false,
                detail: None,
            },
        );
        ledger.append(
            Some("Liquor"),
            LedgerEvent::Pagination {
                page: 1,
                decision: "advanced".into(),
            },
        );
        ledger.write_ndjson(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["event"], "obstacle_attempt");
        assert_eq!(first["spec"], "age-check");
        assert_eq!(first["category"], "Liquor");
    }

    #[tokio::test]
    async fn test_journal_capture_records_reference() {
        let mut ledger = RunLedger::new();
        let mut sink = MemorySink::default();
        let mut renderer = FakeRenderer::new();
        {
            let mut journal = Journal::new(&mut ledger, &mut sink);
            let mut scoped = journal.scoped("Foods");
            scoped.capture(&mut renderer, "category_fail_Foods").await;
        }
        assert_eq!(renderer.snapshots, 1);
        assert_eq!(ledger.snapshots().count(), 1);
        assert_eq!(ledger.entries()[0].category.as_deref(), Some("Foods"));
        assert_eq!(sink.labels, vec!["category_fail_Foods".to_string()]);
    }

    #[tokio::test]
    async fn test_capture_skipped_when_sink_discards() {
        let mut ledger = RunLedger::new();
        let mut sink = DiscardSink;
        let mut renderer = FakeRenderer::new();
        {
            let mut journal = Journal::new(&mut ledger, &mut sink);
            journal.capture(&mut renderer, "obstacle_age-check_attempt_1").await;
        }
        assert_eq!(renderer.snapshots, 0);
        assert!(ledger.entries().is_empty());
    }
}
