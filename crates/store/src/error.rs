//! Store error model.

use thiserror::Error;

use medflow_core::DomainError;

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure of a store workflow.
///
/// Domain outcomes (not found, insufficient stock, validation) pass through
/// unchanged so callers can map them to client errors; everything else is a
/// dependency failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),
}
