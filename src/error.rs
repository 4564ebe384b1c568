//! Error types for the signal engine

use crate::sources::models::{LeadId, SourceKind};
use thiserror::Error;

/// Result type for signal engine operations
pub type Result<T> = std::result::Result<T, SignalError>;

/// Signal engine errors
#[derive(Debug, Clone, Error)]
pub enum SignalError {
    /// One event source failed or timed out; the signal degrades to absent
    /// and sibling sources keep contributing.
    #[error("source {source} unavailable: {reason}")]
    SourceUnavailable { source: SourceKind, reason: String },

    /// A computed score or bucket fell outside its defined range. This is a
    /// programming-error class: the lead's computation fails loudly and the
    /// previous stored score is left untouched.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A record references a lead id with no matching lead. The item is
    /// skipped; the surrounding batch continues.
    #[error("no lead found for id {0}")]
    OrphanReference(LeadId),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl SignalError {
    /// Create a source-unavailable error
    pub fn source_unavailable(source: SourceKind, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            source,
            reason: reason.into(),
        }
    }

    /// Whether this error degrades a single signal rather than failing the
    /// whole computation.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable { .. } | Self::OrphanReference(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_unavailable_display() {
        let err = SignalError::source_unavailable(SourceKind::EmailEvents, "timed out");
        assert_eq!(err.to_string(), "source email_events unavailable: timed out");
        assert!(err.is_degradable());
    }

    #[test]
    fn test_invariant_violation_is_not_degradable() {
        let err = SignalError::InvariantViolation("overall score 104.2 out of range".to_string());
        assert!(!err.is_degradable());
    }
}
