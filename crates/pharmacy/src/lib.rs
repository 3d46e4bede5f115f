//! Pharmacy domain module.
//!
//! This crate contains the clinical business rules for prescription
//! fulfillment, implemented purely as deterministic domain logic (no IO, no
//! HTTP, no storage): the dosage validator and the stock-unit arithmetic of
//! the reconciliation engine.

pub mod dosage;
pub mod stock;

pub use dosage::{
    DOSE_MAX_MG, DOSE_MIN_MG, FREQUENCY_MAX_DAYS, FREQUENCY_MIN_DAYS, ProposedLine, validate_lines,
};
pub use stock::{GRAMS_PER_UNIT, StockDelta, reconcile, units_for};
