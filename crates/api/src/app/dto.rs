use serde::Deserialize;

use medflow_core::MedicationId;
use medflow_pharmacy::ProposedLine;
use medflow_store::{
    AlarmRecord, PatientPrescriptionView, PrescriptionLineView, PrescriptionSummary,
    TransportRecord,
};

// -------------------------
// Request DTOs
// -------------------------
//
// Identifier fields default to 0 when absent so a missing field reads as
// "not provided" and fails validation with a 400 instead of a body-level 422.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationLineRequest {
    #[serde(default)]
    pub medication_id: i64,
    #[serde(default)]
    pub dose: i64,
    #[serde(default)]
    pub frequency: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrescriptionRequest {
    #[serde(default)]
    pub patient_id: i64,
    #[serde(default)]
    pub prescriber_id: i64,
    #[serde(default)]
    pub medications: Vec<MedicationLineRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisePrescriptionRequest {
    #[serde(default)]
    pub medications: Vec<MedicationLineRequest>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvanceTransportRequest {
    #[serde(default)]
    pub transport_id: i64,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct RobotErrorRequest {
    #[serde(default)]
    pub description: Option<String>,
}

pub fn proposed_lines(medications: &[MedicationLineRequest]) -> Vec<ProposedLine> {
    medications
        .iter()
        .map(|m| ProposedLine {
            medication_id: MedicationId::new(m.medication_id),
            dose_mg: m.dose,
            frequency_days: m.frequency,
        })
        .collect()
}

// -------------------------
// JSON mapping helpers
// -------------------------

pub fn prescription_summary_to_json(row: PrescriptionSummary) -> serde_json::Value {
    serde_json::json!({
        "id": row.id,
        "patientId": row.patient_id,
        "patientName": row.patient_name,
        "prescriberId": row.prescriber_id,
        "issuedAt": row.issued_at.to_rfc3339(),
    })
}

pub fn prescription_line_to_json(row: PrescriptionLineView) -> serde_json::Value {
    serde_json::json!({
        "prescriptionId": row.prescription_id,
        "medicationId": row.medication_id,
        "medicationName": row.medication_name,
        "dose": row.dose_mg,
        "frequency": row.frequency_days,
        "stockUnits": row.stock_units,
    })
}

pub fn patient_prescription_to_json(row: PatientPrescriptionView) -> serde_json::Value {
    serde_json::json!({
        "prescriptionId": row.prescription_id,
        "issuedAt": row.issued_at.to_rfc3339(),
        "medicationId": row.medication_id,
        "medicationName": row.medication_name,
        "dose": row.dose_mg,
        "frequency": row.frequency_days,
    })
}

pub fn transport_to_json(row: TransportRecord) -> serde_json::Value {
    serde_json::json!({
        "id": row.id,
        "medicationId": row.medication_id,
        "patientId": row.patient_id,
        "recordedAt": row.recorded_at.to_rfc3339(),
        "status": row.status.as_str(),
    })
}

pub fn alarm_to_json(row: AlarmRecord) -> serde_json::Value {
    serde_json::json!({
        "id": row.id,
        "description": row.description,
        "raisedAt": row.raised_at.to_rfc3339(),
        "status": row.status,
    })
}
