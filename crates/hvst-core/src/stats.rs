use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::target::HarvestTarget;

/// Page state captured when a target fails, for later inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticSnapshot {
    /// Step or phase that failed, e.g. `"location_confirmed_1"`.
    pub label: String,
    pub captured_at: DateTime<Utc>,
    pub url: Option<String>,
    pub title: Option<String>,
    /// First characters of the page's visible text.
    pub text_excerpt: Option<String>,
    /// Set only when the screenshot was written successfully.
    pub screenshot_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The browser session could not be opened.
    Browser,
    /// Navigation exhausted its fallbacks and retries.
    Navigation,
    /// Discovery found no candidate elements.
    Discovery,
    /// Elements were found but none produced a saved record.
    Extraction,
    /// A write to the identity store failed.
    Persistence,
    /// The per-target deadline elapsed.
    Deadline,
}

impl FailureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Browser => "browser",
            FailureKind::Navigation => "navigation",
            FailureKind::Discovery => "discovery",
            FailureKind::Extraction => "extraction",
            FailureKind::Persistence => "persistence",
            FailureKind::Deadline => "deadline",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a target failed, with whatever page state could be captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetFailure {
    pub kind: FailureKind,
    pub message: String,
    pub diagnostics: Option<DiagnosticSnapshot>,
}

/// Per-target counters. `success == new + duplicates`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionStats {
    /// Elements handed to the extractor.
    pub total: usize,
    pub success: usize,
    /// Element reads or writes that failed.
    pub errors: usize,
    /// Elements the extractor rejected as implausible.
    pub skipped: usize,
    pub new: usize,
    pub duplicates: usize,
    pub price_changes: usize,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub failure: Option<TargetFailure>,
}

impl ExtractionStats {
    #[must_use]
    pub fn started_now() -> Self {
        Self {
            total: 0,
            success: 0,
            errors: 0,
            skipped: 0,
            new: 0,
            duplicates: 0,
            price_changes: 0,
            started_at: Utc::now(),
            duration: Duration::ZERO,
            failure: None,
        }
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

/// Outcome of one orchestrator run.
#[derive(Debug, Clone, Serialize)]
pub struct TargetReport {
    pub target: HarvestTarget,
    pub stats: ExtractionStats,
}

/// Aggregate over every target a pool run processed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_records: usize,
    pub total_new: usize,
    pub total_duplicates: usize,
    pub duration: Duration,
}

impl PoolSummary {
    /// Folds one finished target into the summary.
    pub fn record(&mut self, report: &TargetReport) {
        let stats = &report.stats;
        self.processed += 1;
        if stats.succeeded() {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.total_records += stats.success;
        self.total_new += stats.new;
        self.total_duplicates += stats.duplicates;
    }
}
