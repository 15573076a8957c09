use crate::Result;
use crate::renderer::Snapshot;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Where a submitted snapshot ended up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    pub label: String,
    pub location: Option<PathBuf>,
}

/// Write-only channel for failure-path captures. The engine never reads
/// snapshots back.
pub trait DiagnosticsSink: Send {
    fn submit(&mut self, label: &str, snapshot: &Snapshot) -> Result<SnapshotRef>;

    /// When false, callers skip taking the snapshot at all.
    fn wants_snapshots(&self) -> bool {
        true
    }
}

/// Writes `<timestamp>_<label>.png` and `.html` pairs into a directory.
pub struct FileSink {
    dir: PathBuf,
}

impl FileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }
}

impl DiagnosticsSink for FileSink {
    fn submit(&mut self, label: &str, snapshot: &Snapshot) -> Result<SnapshotRef> {
        let stem = format!(
            "{}_{}",
            snapshot.captured_at.format("%Y%m%d_%H%M%S%3f"),
            sanitize_label(label)
        );

        let png_path = self.dir.join(format!("{}.png", stem));
        if !snapshot.png.is_empty() {
            fs::write(&png_path, &snapshot.png)?;
        }
        fs::write(self.dir.join(format!("{}.html", stem)), &snapshot.html)?;

        tracing::info!("Saved snapshot to {}", png_path.display());

        Ok(SnapshotRef {
            label: label.to_string(),
            location: Some(png_path),
        })
    }
}

/// Drops every snapshot. Used when diagnostics are disabled.
#[derive(Debug, Default)]
pub struct DiscardSink;

impl DiagnosticsSink for DiscardSink {
    fn submit(&mut self, label: &str, _snapshot: &Snapshot) -> Result<SnapshotRef> {
        Ok(SnapshotRef {
            label: label.to_string(),
            location: None,
        })
    }

    fn wants_snapshots(&self) -> bool {
        false
    }
}

/// Keeps submitted labels in memory.
#[cfg(test)]
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    pub(crate) labels: Vec<String>,
}

#[cfg(test)]
impl DiagnosticsSink for MemorySink {
    fn submit(&mut self, label: &str, _snapshot: &Snapshot) -> Result<SnapshotRef> {
        self.labels.push(label.to_string());
        Ok(SnapshotRef {
            label: label.to_string(),
            location: None,
        })
    }
}

fn sanitize_label(label: &str) -> String {
    label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot() -> Snapshot {
        Snapshot {
            url: "https://www.quickmart.co.ke/liquor".into(),
            captured_at: chrono::Utc::now(),
            png: vec![1, 2, 3],
            html: "<html><body>age check</body></html>".into(),
        }
    }

    #[test]
    fn test_file_sink_writes_pair() {
        let temp = TempDir::new().unwrap();
        let mut sink = FileSink::new(temp.path().join("snaps")).unwrap();

        let reference = sink.submit("age-check/attempt 1", &snapshot()).unwrap();
        let png = reference.location.unwrap();
        assert!(png.exists());
        assert!(png.to_string_lossy().ends_with("age-check_attempt_1.png"));
        assert!(png.with_extension("html").exists());
    }

    #[test]
    fn test_discard_sink_has_no_location() {
        let reference = DiscardSink.submit("x", &snapshot()).unwrap();
        assert_eq!(reference.label, "x");
        assert!(reference.location.is_none());
        assert!(!DiscardSink.wants_snapshots());
    }

    #[test]
    fn test_sanitize_label() {
        assert_eq!(sanitize_label("category_fail_Fresh Produce"), "category_fail_Fresh_Produce");
    }
}
