//! In-memory store implementation (dev/test).
//!
//! One `tokio::sync::Mutex` guards all state, so a workflow invocation is a
//! single critical section: the atomicity and no-oversell guarantees hold
//! trivially. Mutations are staged on a copy of the state and swapped in
//! only when the whole workflow succeeds, mirroring the transactional
//! behavior of the Postgres backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use medflow_core::{
    AlarmId, DomainError, MedicationId, PatientId, PrescriberId, PrescriptionId, TransportId,
};
use medflow_pharmacy::{ProposedLine, StockDelta, reconcile, units_for};

use crate::error::StoreResult;
use crate::types::{
    AlarmRecord, CreatedPrescription, Delivery, LineRecord, MedicationRecord,
    PatientPrescriptionView, PatientRecord, PrescriptionLineView, PrescriptionRecord,
    PrescriptionSummary, ReviseOutcome, TransportRecord, TransportStatus,
};
use crate::FulfillmentStore;

#[derive(Debug, Default, Clone)]
struct Sequences {
    patient: i64,
    medication: i64,
    prescription: i64,
    transport: i64,
    alarm: i64,
}

fn bump(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

#[derive(Debug, Default, Clone)]
struct State {
    seq: Sequences,
    patients: BTreeMap<i64, PatientRecord>,
    medications: BTreeMap<i64, MedicationRecord>,
    prescriptions: BTreeMap<i64, PrescriptionRecord>,
    lines: Vec<LineRecord>,
    transports: BTreeMap<i64, TransportRecord>,
    alarms: Vec<AlarmRecord>,
}

/// In-memory [`FulfillmentStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FulfillmentStore for MemoryStore {
    async fn create_prescription(
        &self,
        patient_id: PatientId,
        prescriber_id: PrescriberId,
        lines: &[ProposedLine],
    ) -> StoreResult<CreatedPrescription> {
        let mut state = self.inner.lock().await;
        let mut staged = state.clone();
        let now = Utc::now();

        let prescription_id = PrescriptionId::new(bump(&mut staged.seq.prescription));
        staged.prescriptions.insert(
            prescription_id.get(),
            PrescriptionRecord {
                id: prescription_id,
                patient_id,
                prescriber_id,
                issued_at: now,
            },
        );

        let patient = staged
            .patients
            .get(&patient_id.get())
            .cloned()
            .ok_or_else(|| DomainError::not_found(format!("patient {patient_id}")))?;

        let mut transport_id = None;
        let mut deliveries = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            let required = units_for(line.dose_mg, line.frequency_days);
            let tag = {
                let med = staged
                    .medications
                    .get_mut(&line.medication_id.get())
                    .ok_or_else(|| {
                        DomainError::not_found(format!("medication {}", line.medication_id))
                    })?;
                if med.stock_units < required {
                    return Err(DomainError::insufficient_stock(
                        med.id,
                        med.stock_units,
                        required,
                    )
                    .into());
                }
                med.stock_units -= required;
                med.tag.clone()
            };

            staged.lines.push(LineRecord {
                prescription_id,
                medication_id: line.medication_id,
                dose_mg: line.dose_mg,
                frequency_days: line.frequency_days,
            });

            if index == 0 {
                let id = TransportId::new(bump(&mut staged.seq.transport));
                staged.transports.insert(
                    id.get(),
                    TransportRecord {
                        id,
                        medication_id: line.medication_id,
                        patient_id,
                        recorded_at: now,
                        status: TransportStatus::InProgress,
                    },
                );
                transport_id = Some(id);
            }

            deliveries.push(Delivery {
                medication_id: line.medication_id,
                ward: patient.ward.clone(),
                bed: patient.bed.clone(),
                tag,
            });
        }

        let Some(transport_id) = transport_id else {
            return Err(DomainError::validation("at least one medication line is required").into());
        };

        *state = staged;
        Ok(CreatedPrescription {
            prescription_id,
            transport_id,
            deliveries,
        })
    }

    async fn revise_prescription(
        &self,
        prescription_id: PrescriptionId,
        lines: &[ProposedLine],
    ) -> StoreResult<ReviseOutcome> {
        let mut state = self.inner.lock().await;
        if !state.prescriptions.contains_key(&prescription_id.get()) {
            return Err(DomainError::not_found(format!("prescription {prescription_id}")).into());
        }

        let mut staged = state.clone();
        let mut updated = 0;
        let mut ignored = 0;

        for line in lines {
            let Some(stored) = staged.lines.iter_mut().find(|l| {
                l.prescription_id == prescription_id && l.medication_id == line.medication_id
            }) else {
                // No stored match: silently ignored, no line creation on revise.
                ignored += 1;
                continue;
            };

            let old_units = units_for(stored.dose_mg, stored.frequency_days);
            let new_units = units_for(line.dose_mg, line.frequency_days);
            stored.dose_mg = line.dose_mg;
            stored.frequency_days = line.frequency_days;

            match reconcile(old_units, new_units) {
                StockDelta::Unchanged => {}
                StockDelta::Consume(delta) => {
                    let med = staged
                        .medications
                        .get_mut(&line.medication_id.get())
                        .ok_or_else(|| {
                            DomainError::not_found(format!("medication {}", line.medication_id))
                        })?;
                    if med.stock_units < delta {
                        return Err(DomainError::insufficient_stock(
                            med.id,
                            med.stock_units,
                            delta,
                        )
                        .into());
                    }
                    med.stock_units -= delta;
                }
                StockDelta::Refund(delta) => {
                    let med = staged
                        .medications
                        .get_mut(&line.medication_id.get())
                        .ok_or_else(|| {
                            DomainError::not_found(format!("medication {}", line.medication_id))
                        })?;
                    med.stock_units += delta;
                }
            }

            updated += 1;
        }

        *state = staged;
        Ok(ReviseOutcome { updated, ignored })
    }

    async fn advance_transport(
        &self,
        transport_id: TransportId,
        status: TransportStatus,
    ) -> StoreResult<()> {
        let mut state = self.inner.lock().await;
        let record = state
            .transports
            .get_mut(&transport_id.get())
            .ok_or_else(|| DomainError::not_found(format!("transport record {transport_id}")))?;
        record.status = status;
        Ok(())
    }

    async fn list_prescriptions(&self) -> StoreResult<Vec<PrescriptionSummary>> {
        let state = self.inner.lock().await;
        let mut rows: Vec<PrescriptionSummary> = state
            .prescriptions
            .values()
            .map(|p| PrescriptionSummary {
                id: p.id,
                patient_id: p.patient_id,
                prescriber_id: p.prescriber_id,
                issued_at: p.issued_at,
                patient_name: state
                    .patients
                    .get(&p.patient_id.get())
                    .map(|pa| pa.name.clone())
                    .unwrap_or_default(),
            })
            .collect();
        rows.sort_by(|a, b| b.issued_at.cmp(&a.issued_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn prescription_medications(
        &self,
        prescription_id: PrescriptionId,
    ) -> StoreResult<Vec<PrescriptionLineView>> {
        let state = self.inner.lock().await;
        Ok(state
            .lines
            .iter()
            .filter(|l| l.prescription_id == prescription_id)
            .filter_map(|l| {
                state.medications.get(&l.medication_id.get()).map(|m| {
                    PrescriptionLineView {
                        prescription_id: l.prescription_id,
                        medication_id: l.medication_id,
                        medication_name: m.name.clone(),
                        dose_mg: l.dose_mg,
                        frequency_days: l.frequency_days,
                        stock_units: m.stock_units,
                    }
                })
            })
            .collect())
    }

    async fn patient_prescriptions(
        &self,
        patient_id: PatientId,
    ) -> StoreResult<Vec<PatientPrescriptionView>> {
        let state = self.inner.lock().await;
        let mut rows: Vec<PatientPrescriptionView> = state
            .prescriptions
            .values()
            .filter(|p| p.patient_id == patient_id)
            .flat_map(|p| {
                state
                    .lines
                    .iter()
                    .filter(|l| l.prescription_id == p.id)
                    .filter_map(|l| {
                        state.medications.get(&l.medication_id.get()).map(|m| {
                            PatientPrescriptionView {
                                prescription_id: p.id,
                                issued_at: p.issued_at,
                                medication_id: l.medication_id,
                                medication_name: m.name.clone(),
                                dose_mg: l.dose_mg,
                                frequency_days: l.frequency_days,
                            }
                        })
                    })
            })
            .collect();
        rows.sort_by(|a, b| {
            b.issued_at
                .cmp(&a.issued_at)
                .then(b.prescription_id.cmp(&a.prescription_id))
        });
        Ok(rows)
    }

    async fn list_transports(&self) -> StoreResult<Vec<TransportRecord>> {
        let state = self.inner.lock().await;
        let mut rows: Vec<TransportRecord> = state.transports.values().cloned().collect();
        rows.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn get_transport(&self, transport_id: TransportId) -> StoreResult<Option<TransportRecord>> {
        let state = self.inner.lock().await;
        Ok(state.transports.get(&transport_id.get()).cloned())
    }

    async fn raise_alarm(&self, description: &str) -> StoreResult<AlarmId> {
        let mut state = self.inner.lock().await;
        let id = AlarmId::new(bump(&mut state.seq.alarm));
        state.alarms.push(AlarmRecord {
            id,
            description: description.to_string(),
            raised_at: Utc::now(),
            status: "new".to_string(),
        });
        Ok(id)
    }

    async fn list_alarms(&self) -> StoreResult<Vec<AlarmRecord>> {
        let state = self.inner.lock().await;
        Ok(state.alarms.clone())
    }

    async fn put_patient(&self, name: &str, ward: &str, bed: &str) -> StoreResult<PatientId> {
        let mut state = self.inner.lock().await;
        let id = PatientId::new(bump(&mut state.seq.patient));
        state.patients.insert(
            id.get(),
            PatientRecord {
                id,
                name: name.to_string(),
                ward: ward.to_string(),
                bed: bed.to_string(),
            },
        );
        Ok(id)
    }

    async fn put_medication(
        &self,
        name: &str,
        tag: &str,
        stock_units: i64,
    ) -> StoreResult<MedicationId> {
        let mut state = self.inner.lock().await;
        let id = MedicationId::new(bump(&mut state.seq.medication));
        state.medications.insert(
            id.get(),
            MedicationRecord {
                id,
                name: name.to_string(),
                tag: tag.to_string(),
                stock_units,
            },
        );
        Ok(id)
    }

    async fn get_medication(&self, id: MedicationId) -> StoreResult<Option<MedicationRecord>> {
        let state = self.inner.lock().await;
        Ok(state.medications.get(&id.get()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(medication_id: MedicationId, dose_mg: i64, frequency_days: i64) -> ProposedLine {
        ProposedLine {
            medication_id,
            dose_mg,
            frequency_days,
        }
    }

    #[tokio::test]
    async fn failed_create_leaves_no_trace() {
        let store = MemoryStore::new();
        let patient = store.put_patient("Pop Maria", "3", "12").await.unwrap();
        let ok_med = store.put_medication("Algocalmin", "tag-1", 10).await.unwrap();
        let empty_med = store.put_medication("Paduden", "tag-2", 0).await.unwrap();

        // Second line fails on stock; the first line's decrement and the
        // header must not survive.
        let err = store
            .create_prescription(
                patient,
                PrescriberId::new(1),
                &[line(ok_med, 500, 10), line(empty_med, 500, 10)],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::StoreError::Domain(DomainError::InsufficientStock { .. })
        ));

        assert_eq!(store.get_medication(ok_med).await.unwrap().unwrap().stock_units, 10);
        assert!(store.list_prescriptions().await.unwrap().is_empty());
        assert!(store.list_transports().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn transport_record_only_for_first_line() {
        let store = MemoryStore::new();
        let patient = store.put_patient("Pop Maria", "3", "12").await.unwrap();
        let med_a = store.put_medication("Algocalmin", "tag-1", 10).await.unwrap();
        let med_b = store.put_medication("Paduden", "tag-2", 10).await.unwrap();

        let created = store
            .create_prescription(
                patient,
                PrescriberId::new(1),
                &[line(med_a, 500, 10), line(med_b, 500, 10)],
            )
            .await
            .unwrap();

        let transports = store.list_transports().await.unwrap();
        assert_eq!(transports.len(), 1);
        assert_eq!(transports[0].id, created.transport_id);
        assert_eq!(transports[0].medication_id, med_a);
        assert_eq!(transports[0].status, TransportStatus::InProgress);
        assert_eq!(created.deliveries.len(), 2);
    }

    #[tokio::test]
    async fn revise_ignores_unmatched_lines() {
        let store = MemoryStore::new();
        let patient = store.put_patient("Pop Maria", "3", "12").await.unwrap();
        let med = store.put_medication("Algocalmin", "tag-1", 10).await.unwrap();
        let created = store
            .create_prescription(patient, PrescriberId::new(1), &[line(med, 500, 10)])
            .await
            .unwrap();

        let stranger = MedicationId::new(999);
        let outcome = store
            .revise_prescription(created.prescription_id, &[line(stranger, 500, 10)])
            .await
            .unwrap();
        assert_eq!(outcome.updated, 0);
        assert_eq!(outcome.ignored, 1);

        let views = store
            .prescription_medications(created.prescription_id)
            .await
            .unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].medication_id, med);
    }
}
