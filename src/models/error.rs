//! Error types for giftdrop.
//!
//! Two families:
//! - Domain errors: the operator can act on them (bad config, missing state,
//!   failed preflight, rejected external call, declined prompt)
//! - Unexpected errors: IO, parse and internal failures that carry full detail

use thiserror::Error;

/// Top-level error type for giftdrop.
#[derive(Debug, Error)]
pub enum GiftdropError {
    // ═══════════════════════════════════════════════════════════════════
    // Domain errors, reported to the operator as a single message
    // ═══════════════════════════════════════════════════════════════════
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Inconsistent checkpoint state: {0}")]
    StateConsistency(String),

    #[error("Column '{title}' has {actual} values but the table has {expected} rows")]
    ColumnLengthMismatch {
        title: String,
        expected: usize,
        actual: usize,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("{operation} failed: {message}")]
    External { operation: String, message: String },

    #[error("Declined: {0}")]
    UserDeclined(String),

    // ═══════════════════════════════════════════════════════════════════
    // Unexpected errors, reported with the full diagnostic chain
    // ═══════════════════════════════════════════════════════════════════
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {context}")]
    Csv {
        context: String,
        #[source]
        source: csv::Error,
    },

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GiftdropError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a CSV error with context.
    pub fn csv(context: impl Into<String>, source: csv::Error) -> Self {
        Self::Csv {
            context: context.into(),
            source,
        }
    }

    /// Create an external-operation error.
    pub fn external(operation: impl Into<String>, message: impl ToString) -> Self {
        Self::External {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Whether this is a domain error the operator can act on.
    pub fn is_domain(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::StateConsistency(_)
                | Self::ColumnLengthMismatch { .. }
                | Self::Validation(_)
                | Self::External { .. }
                | Self::UserDeclined(_)
        )
    }
}

/// Result type alias for giftdrop.
pub type Result<T> = std::result::Result<T, GiftdropError>;
