//! Durable storage for the fulfillment engine.
//!
//! The [`FulfillmentStore`] trait is the persistence orchestrator boundary:
//! it exposes the create / revise / status-advance workflows plus the read
//! projections, and each implementation guarantees that one workflow
//! invocation is atomic — [`MemoryStore`] by staging mutations under a single
//! lock, [`PostgresStore`] with one database transaction. The stock
//! check-then-decrement is a single conditional mutation in both, so
//! concurrent fulfillment can never overdraw a medication.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod types;

use async_trait::async_trait;

use medflow_core::{AlarmId, MedicationId, PatientId, PrescriberId, PrescriptionId, TransportId};
use medflow_pharmacy::ProposedLine;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use types::{
    AlarmRecord, CreatedPrescription, Delivery, LineRecord, MedicationRecord,
    PatientPrescriptionView, PatientRecord, PrescriptionLineView, PrescriptionRecord,
    PrescriptionSummary, ReviseOutcome, TransportRecord, TransportStatus,
};

/// Storage collaborator boundary for the fulfillment workflows.
///
/// Lines passed to the workflows are assumed already validated by the dosage
/// validator; the store re-checks nothing clinical, only referential
/// existence and stock.
#[async_trait]
pub trait FulfillmentStore: Send + Sync {
    /// Atomic create workflow: header, patient location lookup, then per
    /// line in submission order: medication lookup, conditional stock
    /// decrement, line insert; a transport record (`in-progress`) for the
    /// first line only. A mid-sequence failure rolls the whole write back.
    async fn create_prescription(
        &self,
        patient_id: PatientId,
        prescriber_id: PrescriberId,
        lines: &[ProposedLine],
    ) -> StoreResult<CreatedPrescription>;

    /// Atomic revise workflow: for each submitted line with a matching
    /// stored line, apply the signed stock delta between old and new
    /// consumption and overwrite the stored dose/frequency. Submitted lines
    /// with no stored match are ignored.
    async fn revise_prescription(
        &self,
        prescription_id: PrescriptionId,
        lines: &[ProposedLine],
    ) -> StoreResult<ReviseOutcome>;

    /// Advance the status of the transport record with the given id.
    async fn advance_transport(
        &self,
        transport_id: TransportId,
        status: TransportStatus,
    ) -> StoreResult<()>;

    // Read projections.

    async fn list_prescriptions(&self) -> StoreResult<Vec<PrescriptionSummary>>;

    async fn prescription_medications(
        &self,
        prescription_id: PrescriptionId,
    ) -> StoreResult<Vec<PrescriptionLineView>>;

    async fn patient_prescriptions(
        &self,
        patient_id: PatientId,
    ) -> StoreResult<Vec<PatientPrescriptionView>>;

    async fn list_transports(&self) -> StoreResult<Vec<TransportRecord>>;

    async fn get_transport(&self, transport_id: TransportId) -> StoreResult<Option<TransportRecord>>;

    // Robot-side failure channel.

    async fn raise_alarm(&self, description: &str) -> StoreResult<AlarmId>;

    async fn list_alarms(&self) -> StoreResult<Vec<AlarmRecord>>;

    // Collaborator-facing writes (provisioning is owned elsewhere; the core
    // only needs these to exist for seeding and tests).

    async fn put_patient(&self, name: &str, ward: &str, bed: &str) -> StoreResult<PatientId>;

    async fn put_medication(
        &self,
        name: &str,
        tag: &str,
        stock_units: i64,
    ) -> StoreResult<MedicationId>;

    async fn get_medication(&self, id: MedicationId) -> StoreResult<Option<MedicationRecord>>;
}
