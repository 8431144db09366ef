//! Engine error model.
//!
//! Every failure the facade reports, whatever layer it started in. Write
//! paths return these; read paths log them and degrade to zero/empty values.

use rust_decimal::Decimal;
use thiserror::Error;

use tallybook_accounting::PostingError;
use tallybook_core::{AggregateId, DomainError};
use tallybook_parties::SignConventionError;

use crate::event_store::EventStoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Journal lines failed the double-entry check; `difference` is `Σdebit − Σcredit`.
    #[error("debits and credits differ by {difference}")]
    UnbalancedPosting { difference: Decimal },

    #[error("invalid sign convention: {0}")]
    InvalidSignConvention(String),

    /// Stored running balance disagrees with the derived ledger.
    #[error("stored balance {stored} of party {party_id} differs from derived balance {derived}")]
    StaleBalance {
        party_id: AggregateId,
        stored: Decimal,
        derived: Decimal,
    },

    /// The transaction log could not be read or decoded.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// The request lacks a value the operation needs (e.g. a bank account).
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    #[error("not found")]
    NotFound,

    /// Optimistic concurrency failure or duplicate creation.
    #[error("conflict: {0}")]
    Concurrency(String),

    #[error("tenant isolation violation: {0}")]
    TenantIsolation(String),
}

impl EngineError {
    /// Text shown to the user when a write is refused.
    pub fn user_message(&self) -> String {
        format!("cannot process: {self}")
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => EngineError::Validation(msg),
            DomainError::InvariantViolation(msg) => EngineError::InvariantViolation(msg),
            DomainError::Conflict(msg) => EngineError::Concurrency(msg),
            DomainError::NotFound => EngineError::NotFound,
            DomainError::InvalidId(msg) => EngineError::Validation(msg),
        }
    }
}

impl From<EventStoreError> for EngineError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => EngineError::Concurrency(msg),
            EventStoreError::TenantIsolation(msg) => EngineError::TenantIsolation(msg),
            EventStoreError::Unavailable(msg) => EngineError::DataUnavailable(msg),
            EventStoreError::AggregateTypeMismatch(msg) | EventStoreError::InvalidAppend(msg) => {
                EngineError::InvariantViolation(msg)
            }
        }
    }
}

impl From<PostingError> for EngineError {
    fn from(value: PostingError) -> Self {
        match value {
            PostingError::Unbalanced { difference } => EngineError::UnbalancedPosting { difference },
            PostingError::Domain(e) => e.into(),
            other => EngineError::Validation(other.to_string()),
        }
    }
}

impl From<SignConventionError> for EngineError {
    fn from(value: SignConventionError) -> Self {
        EngineError::InvalidSignConvention(value.to_string())
    }
}
