//! Fulfillment workflows.
//!
//! [`FulfillmentService`] is the composition seam between the dosage
//! validator, the store and the robot dispatcher. Writes follow a strict
//! order: validate the whole request first, commit it atomically, and only
//! then hand dispense commands to the dispatcher as detached tasks. Dispatch
//! is best effort; its outcome never reaches the caller.

use std::sync::Arc;

use thiserror::Error;

use medflow_core::{AlarmId, DomainError, PatientId, PrescriberId, PrescriptionId, TransportId};
use medflow_dispatch::{DispenseCommand, Dispatcher};
use medflow_pharmacy::{ProposedLine, validate_lines};
use medflow_store::{
    AlarmRecord, CreatedPrescription, FulfillmentStore, PatientPrescriptionView,
    PrescriptionLineView, PrescriptionSummary, ReviseOutcome, StoreError, TransportRecord,
    TransportStatus,
};

pub type FulfillmentResult<T> = Result<T, FulfillmentError>;

/// Failure of a fulfillment operation.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// A collaborator (the database) failed; the request may be retried.
    #[error("dependency failure: {0}")]
    Dependency(String),
}

impl From<StoreError> for FulfillmentError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Domain(domain) => Self::Domain(domain),
            StoreError::Database(db) => Self::Dependency(db.to_string()),
        }
    }
}

/// Orchestrates prescription fulfillment over a store and a dispatcher.
#[derive(Clone)]
pub struct FulfillmentService {
    store: Arc<dyn FulfillmentStore>,
    dispatcher: Arc<dyn Dispatcher>,
}

impl FulfillmentService {
    pub fn new(store: Arc<dyn FulfillmentStore>, dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { store, dispatcher }
    }

    /// Create a prescription: validate everything, commit atomically, then
    /// fire one dispense command per committed line. Returns as soon as the
    /// write is durable; dispatch runs in the background.
    pub async fn create_prescription(
        &self,
        patient_id: PatientId,
        prescriber_id: PrescriberId,
        lines: &[ProposedLine],
    ) -> FulfillmentResult<CreatedPrescription> {
        if patient_id.get() <= 0 {
            return Err(DomainError::validation("patientId is required").into());
        }
        if prescriber_id.get() <= 0 {
            return Err(DomainError::validation("prescriberId is required").into());
        }
        validate_lines(lines)?;

        let created = self
            .store
            .create_prescription(patient_id, prescriber_id, lines)
            .await?;

        for delivery in &created.deliveries {
            let dispatcher = Arc::clone(&self.dispatcher);
            let medication_id = delivery.medication_id;
            let command = DispenseCommand {
                ward: delivery.ward.clone(),
                bed: delivery.bed.clone(),
                tag: delivery.tag.clone(),
            };
            tokio::spawn(async move {
                match dispatcher.dispatch(&command).await {
                    Ok(()) => {
                        tracing::info!(%medication_id, "dispense command accepted");
                    }
                    Err(error) => {
                        tracing::warn!(
                            %medication_id,
                            %error,
                            "dispense command failed; fulfillment is already committed",
                        );
                    }
                }
            });
        }

        tracing::info!(
            prescription_id = %created.prescription_id,
            transport_id = %created.transport_id,
            lines = lines.len(),
            "prescription created",
        );
        Ok(created)
    }

    /// Revise an existing prescription. Validates the whole submission, then
    /// applies the signed stock delta per matched line in one atomic write.
    /// No dispatch: revision changes paperwork and stock, not deliveries.
    pub async fn revise_prescription(
        &self,
        prescription_id: PrescriptionId,
        lines: &[ProposedLine],
    ) -> FulfillmentResult<ReviseOutcome> {
        if prescription_id.get() <= 0 {
            return Err(DomainError::validation("prescriptionId is required").into());
        }
        validate_lines(lines)?;

        let outcome = self
            .store
            .revise_prescription(prescription_id, lines)
            .await?;
        if outcome.ignored > 0 {
            tracing::warn!(
                %prescription_id,
                ignored = outcome.ignored,
                "revision lines without a stored counterpart were ignored",
            );
        }
        Ok(outcome)
    }

    pub async fn advance_transport(
        &self,
        transport_id: TransportId,
        status: TransportStatus,
    ) -> FulfillmentResult<()> {
        if transport_id.get() <= 0 {
            return Err(DomainError::validation("transportId is required").into());
        }
        self.store.advance_transport(transport_id, status).await?;
        Ok(())
    }

    /// Record a failure reported by the dispensing robot.
    pub async fn raise_alarm(&self, description: &str) -> FulfillmentResult<AlarmId> {
        let description = description.trim();
        let description = if description.is_empty() {
            "robot reported an unspecified error"
        } else {
            description
        };
        let id = self.store.raise_alarm(description).await?;
        tracing::warn!(alarm_id = %id, description, "robot alarm raised");
        Ok(id)
    }

    // Read projections pass straight through.

    pub async fn list_prescriptions(&self) -> FulfillmentResult<Vec<PrescriptionSummary>> {
        Ok(self.store.list_prescriptions().await?)
    }

    pub async fn prescription_medications(
        &self,
        prescription_id: PrescriptionId,
    ) -> FulfillmentResult<Vec<PrescriptionLineView>> {
        Ok(self.store.prescription_medications(prescription_id).await?)
    }

    pub async fn patient_prescriptions(
        &self,
        patient_id: PatientId,
    ) -> FulfillmentResult<Vec<PatientPrescriptionView>> {
        Ok(self.store.patient_prescriptions(patient_id).await?)
    }

    pub async fn list_transports(&self) -> FulfillmentResult<Vec<TransportRecord>> {
        Ok(self.store.list_transports().await?)
    }

    pub async fn get_transport(
        &self,
        transport_id: TransportId,
    ) -> FulfillmentResult<Option<TransportRecord>> {
        Ok(self.store.get_transport(transport_id).await?)
    }

    pub async fn list_alarms(&self) -> FulfillmentResult<Vec<AlarmRecord>> {
        Ok(self.store.list_alarms().await?)
    }
}
