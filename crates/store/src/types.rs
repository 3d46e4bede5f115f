//! Durable records and read projections handled by the store.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use medflow_core::{
    AlarmId, DomainError, MedicationId, PatientId, PrescriberId, PrescriptionId, TransportId,
};

/// Lifecycle status of one physical dispensing attempt.
///
/// `in-progress` is the initial state; the rest are terminal. Kebab-case on
/// the wire and in storage.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportStatus {
    InProgress,
    Delivered,
    Failed,
}

impl TransportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportStatus::InProgress => "in-progress",
            TransportStatus::Delivered => "delivered",
            TransportStatus::Failed => "failed",
        }
    }
}

impl FromStr for TransportStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in-progress" => Ok(TransportStatus::InProgress),
            "delivered" => Ok(TransportStatus::Delivered),
            "failed" => Ok(TransportStatus::Failed),
            other => Err(DomainError::validation(format!(
                "unknown transport status '{other}' (expected in-progress, delivered or failed)"
            ))),
        }
    }
}

impl core::fmt::Display for TransportStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Patient projection as consumed by this core (physical location included).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientRecord {
    pub id: PatientId,
    pub name: String,
    pub ward: String,
    pub bed: String,
}

/// Medication row. `stock_units` is the sole mutable shared resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MedicationRecord {
    pub id: MedicationId,
    pub name: String,
    /// Physical tag identifier read by the dispensing robot.
    pub tag: String,
    pub stock_units: i64,
}

/// Prescription header. Immutable once created except via line revisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrescriptionRecord {
    pub id: PrescriptionId,
    pub patient_id: PatientId,
    pub prescriber_id: PrescriberId,
    pub issued_at: DateTime<Utc>,
}

/// One medication line of a prescription; unique on
/// (prescription, medication).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineRecord {
    pub prescription_id: PrescriptionId,
    pub medication_id: MedicationId,
    pub dose_mg: i64,
    pub frequency_days: i64,
}

/// Append-only log entry for a physical dispensing attempt. Only the status
/// column ever changes after insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportRecord {
    pub id: TransportId,
    pub medication_id: MedicationId,
    pub patient_id: PatientId,
    pub recorded_at: DateTime<Utc>,
    pub status: TransportStatus,
}

/// Alarm raised by the robot-side failure channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmRecord {
    pub id: AlarmId,
    pub description: String,
    pub raised_at: DateTime<Utc>,
    pub status: String,
}

/// Dispense instruction produced by a committed create, one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub medication_id: MedicationId,
    pub ward: String,
    pub bed: String,
    pub tag: String,
}

/// Outcome of a committed create workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedPrescription {
    pub prescription_id: PrescriptionId,
    /// Transport record appended for the first line; status advances are
    /// addressed by this id.
    pub transport_id: TransportId,
    pub deliveries: Vec<Delivery>,
}

/// Outcome of a committed revise workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReviseOutcome {
    /// Submitted lines that matched a stored line and were overwritten.
    pub updated: usize,
    /// Submitted lines with no stored match, silently ignored.
    pub ignored: usize,
}

/// `GET /prescriptions` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrescriptionSummary {
    pub id: PrescriptionId,
    pub patient_id: PatientId,
    pub prescriber_id: PrescriberId,
    pub issued_at: DateTime<Utc>,
    pub patient_name: String,
}

/// `GET /prescriptions/{id}/medications` row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrescriptionLineView {
    pub prescription_id: PrescriptionId,
    pub medication_id: MedicationId,
    pub medication_name: String,
    pub dose_mg: i64,
    pub frequency_days: i64,
    pub stock_units: i64,
}

/// `GET /patients/{id}/prescriptions` row (one per line, newest first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatientPrescriptionView {
    pub prescription_id: PrescriptionId,
    pub issued_at: DateTime<Utc>,
    pub medication_id: MedicationId,
    pub medication_name: String,
    pub dose_mg: i64,
    pub frequency_days: i64,
}
