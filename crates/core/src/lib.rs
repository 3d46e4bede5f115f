//! `medflow-core` — domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure
//! concerns): strongly-typed identifiers and the domain error taxonomy shared
//! by the fulfillment engine.

pub mod error;
pub mod id;

pub use error::{DomainError, DomainResult};
pub use id::{AlarmId, MedicationId, PatientId, PrescriberId, PrescriptionId, TransportId};
