//! Error taxonomy shared by every sync step.
//!
//! Cycle-level failures ([`SyncError::Connectivity`], [`SyncError::Integrity`],
//! [`SyncError::Store`]) abort the step that raised them. Failures scoped to
//! one record ([`SyncError::PerRecord`]) are logged by the caller and the
//! record is skipped. Empty extractions and empty drift sets are not errors
//! at all; they are reported through the step reports.

use std::fmt;

use thiserror::Error;

/// Which of the three stores an error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Source,
    Mirror,
    Index,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Source => f.write_str("source"),
            StoreKind::Mirror => f.write_str("mirror"),
            StoreKind::Index => f.write_str("index"),
        }
    }
}

/// All errors that can arise from extraction, mirroring, indexing and
/// reconciliation.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The store could not be reached (network, pool, TLS, timeout).
    #[error("{store} store unreachable: {message}")]
    Connectivity { store: StoreKind, message: String },

    /// A write violated a store constraint.
    #[error("{store} store rejected write: {message}")]
    Integrity { store: StoreKind, message: String },

    /// Render, fetch or write failure scoped to a single record.
    #[error("record {id}: {message}")]
    PerRecord { id: i64, message: String },

    /// Any other failure reported by a store (malformed response, rejected request).
    #[error("{store} store error: {message}")]
    Store { store: StoreKind, message: String },
}

impl SyncError {
    pub fn connectivity(store: StoreKind, message: impl Into<String>) -> Self {
        SyncError::Connectivity {
            store,
            message: message.into(),
        }
    }

    pub fn integrity(store: StoreKind, message: impl Into<String>) -> Self {
        SyncError::Integrity {
            store,
            message: message.into(),
        }
    }

    pub fn per_record(id: i64, message: impl Into<String>) -> Self {
        SyncError::PerRecord {
            id,
            message: message.into(),
        }
    }

    pub fn store(store: StoreKind, message: impl Into<String>) -> Self {
        SyncError::Store {
            store,
            message: message.into(),
        }
    }

    /// True when the store itself is unreachable, as opposed to one request failing.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, SyncError::Connectivity { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names_the_store() {
        let err = SyncError::connectivity(StoreKind::Mirror, "connection refused");
        assert_eq!(
            err.to_string(),
            "mirror store unreachable: connection refused"
        );
        assert!(err.is_connectivity());
    }

    #[test]
    fn test_per_record_is_not_connectivity() {
        let err = SyncError::per_record(7, "upsert rejected");
        assert_eq!(err.to_string(), "record 7: upsert rejected");
        assert!(!err.is_connectivity());
    }
}
