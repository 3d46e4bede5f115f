//! Dosage validation against clinical bounds.
//!
//! Validation is a pure pass over the **entire** submission: no durable or
//! external action may be taken before every line has been checked.

use serde::{Deserialize, Serialize};

use medflow_core::{DomainError, MedicationId};

/// Inclusive clinical bounds for a single line.
pub const DOSE_MIN_MG: i64 = 100;
pub const DOSE_MAX_MG: i64 = 1000;
pub const FREQUENCY_MIN_DAYS: i64 = 1;
pub const FREQUENCY_MAX_DAYS: i64 = 30;

/// One proposed prescription line as submitted by the caller.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposedLine {
    pub medication_id: MedicationId,
    pub dose_mg: i64,
    pub frequency_days: i64,
}

/// Check every proposed line against the clinical bounds.
///
/// Fails with the first offending line (index and field named). Rejects an
/// empty submission. Pure: no side effects, no IO.
pub fn validate_lines(lines: &[ProposedLine]) -> Result<(), DomainError> {
    if lines.is_empty() {
        return Err(DomainError::validation("at least one medication line is required"));
    }

    for (index, line) in lines.iter().enumerate() {
        if line.medication_id.get() <= 0 {
            return Err(DomainError::validation(format!(
                "line {index}: medicationId is required"
            )));
        }
        if line.dose_mg < DOSE_MIN_MG || line.dose_mg > DOSE_MAX_MG {
            return Err(DomainError::validation(format!(
                "line {index}: dose {}mg outside {DOSE_MIN_MG}..={DOSE_MAX_MG}mg",
                line.dose_mg
            )));
        }
        if line.frequency_days < FREQUENCY_MIN_DAYS || line.frequency_days > FREQUENCY_MAX_DAYS {
            return Err(DomainError::validation(format!(
                "line {index}: frequency {} days outside {FREQUENCY_MIN_DAYS}..={FREQUENCY_MAX_DAYS} days",
                line.frequency_days
            )));
        }
    }

    Ok(())
}
