//! Error taxonomy for the risk pipeline.
//!
//! Only identity resolution, model availability and schema faults cross
//! component boundaries. Empty aggregates are resolved inside the feature
//! builder and never surface here.

use crate::types::ClientId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    /// Unknown client id, or the id resolves to a supplier.
    #[error("client {client_id} not found or not of category 'client'")]
    NotFound { client_id: ClientId },

    /// The classifier artifact is missing, corrupt, or was never installed.
    #[error("risk model unavailable: {reason}")]
    ModelUnavailable { reason: String },

    /// Service-level view of a model outage. Callers must treat the risk as
    /// indeterminate.
    #[error("risk assessment unavailable: {reason}")]
    Unavailable { reason: String },

    /// Feature record or artifact schema does not match the canonical
    /// seven-field layout.
    #[error("feature schema mismatch: {0}")]
    Schema(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl RiskError {
    pub fn model_unavailable(reason: impl Into<String>) -> Self {
        RiskError::ModelUnavailable {
            reason: reason.into(),
        }
    }

    /// Stable machine-readable kind, used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            RiskError::NotFound { .. } => "not_found",
            RiskError::ModelUnavailable { .. } | RiskError::Unavailable { .. } => "unavailable",
            RiskError::Schema(_) => "schema",
            RiskError::Database(_) => "internal",
        }
    }
}

pub type RiskResult<T> = Result<T, RiskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(RiskError::NotFound { client_id: 7 }.kind(), "not_found");
        assert_eq!(RiskError::model_unavailable("missing").kind(), "unavailable");
        assert_eq!(RiskError::Schema("six fields".into()).kind(), "schema");
    }

    #[test]
    fn test_not_found_message_names_client() {
        let err = RiskError::NotFound { client_id: 42 };
        assert!(err.to_string().contains("42"));
    }
}
