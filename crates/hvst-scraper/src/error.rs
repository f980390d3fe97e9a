use hvst_core::{DiagnosticSnapshot, StoreError};
use thiserror::Error;

use crate::navigation::NavStep;

#[derive(Debug, Error)]
pub enum HarvestError {
    /// A page load or wait did not finish in time. Transient.
    #[error("navigation timed out during {step}: {detail}")]
    NavigationTimeout { step: String, detail: String },

    /// No element matched any of the tried selectors. Transient.
    #[error("element not found: {what}")]
    ElementNotFound { what: String },

    /// The retry budget ran out; `source` is the last transient error.
    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<HarvestError>,
    },

    #[error("navigation failed at step {step}: {reason}")]
    NavigationFailure {
        step: NavStep,
        reason: String,
        diagnostics: Option<Box<DiagnosticSnapshot>>,
    },

    #[error("data extraction failed for {target}: {reason}")]
    DataExtraction { target: String, reason: String },

    #[error("persistence failed: {0}")]
    Persistence(#[from] StoreError),

    #[error("browser error: {0}")]
    Browser(String),

    #[error("target {target} exceeded its {secs}s deadline")]
    DeadlineExceeded { target: String, secs: u64 },

    #[error("circuit breaker '{name}' is open; retry in {retry_in_secs}s")]
    CircuitOpen { name: String, retry_in_secs: u64 },

    #[error("invalid selector table: {0}")]
    SelectorTable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// `true` for the kinds [`crate::retry::RetryPolicy`] retries.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            HarvestError::NavigationTimeout { .. } | HarvestError::ElementNotFound { .. }
        )
    }

    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        HarvestError::ElementNotFound { what: what.into() }
    }

    pub(crate) fn browser(err: impl std::fmt::Display) -> Self {
        HarvestError::Browser(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_and_missing_elements_are_transient() {
        assert!(HarvestError::not_found("button").is_transient());
        assert!(HarvestError::NavigationTimeout {
            step: "site_loaded".to_string(),
            detail: "30s".to_string(),
        }
        .is_transient());
        assert!(!HarvestError::browser("crashed").is_transient());
        assert!(!HarvestError::DataExtraction {
            target: "Pizza".to_string(),
            reason: "empty".to_string(),
        }
        .is_transient());
        assert!(!HarvestError::Exhausted {
            attempts: 3,
            source: Box::new(HarvestError::not_found("button")),
        }
        .is_transient());
    }

    #[test]
    fn exhausted_message_names_last_error() {
        let err = HarvestError::Exhausted {
            attempts: 3,
            source: Box::new(HarvestError::not_found("confirm button")),
        };
        assert_eq!(
            err.to_string(),
            "gave up after 3 attempts: element not found: confirm button"
        );
    }
}
