//! Domain error model.

use thiserror::Error;

use crate::id::MedicationId;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// invariants, missing references, stock exhaustion). Infrastructure concerns
/// belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed or out-of-bounds input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced resource was not found (domain-level).
    #[error("not found: {0}")]
    NotFound(String),

    /// A stock check failed. Carries what was available and what the line
    /// required, so callers can surface both.
    #[error("insufficient stock for medication {medication_id}: available {available}, required {required}")]
    InsufficientStock {
        medication_id: MedicationId,
        available: i64,
        required: i64,
    },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn insufficient_stock(medication_id: MedicationId, available: i64, required: i64) -> Self {
        Self::InsufficientStock {
            medication_id,
            available,
            required,
        }
    }
}
