//! Postgres-backed store implementation.
//!
//! Each workflow runs inside one transaction; returning early drops the
//! transaction and rolls everything back. The stock check-then-decrement is
//! a single conditional `UPDATE .. WHERE stock_units >= n` gated on
//! `rows_affected`, so two concurrent fulfillments of the same medication
//! can never jointly overdraw it. DDL lives in `schema.sql`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};

use medflow_core::{
    AlarmId, DomainError, MedicationId, PatientId, PrescriberId, PrescriptionId, TransportId,
};
use medflow_pharmacy::{ProposedLine, StockDelta, reconcile, units_for};

use crate::error::StoreResult;
use crate::types::{
    AlarmRecord, CreatedPrescription, Delivery, MedicationRecord, PatientPrescriptionView,
    PrescriptionLineView, PrescriptionSummary, ReviseOutcome, TransportRecord, TransportStatus,
};
use crate::FulfillmentStore;

/// Postgres [`FulfillmentStore`].
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn transport_from_row(row: &PgRow) -> StoreResult<TransportRecord> {
    let status: String = row.try_get("status")?;
    Ok(TransportRecord {
        id: TransportId::new(row.try_get("id")?),
        medication_id: MedicationId::new(row.try_get("medication_id")?),
        patient_id: PatientId::new(row.try_get("patient_id")?),
        recorded_at: row.try_get("recorded_at")?,
        status: status.parse()?,
    })
}

#[async_trait]
impl FulfillmentStore for PostgresStore {
    async fn create_prescription(
        &self,
        patient_id: PatientId,
        prescriber_id: PrescriberId,
        lines: &[ProposedLine],
    ) -> StoreResult<CreatedPrescription> {
        if lines.is_empty() {
            return Err(DomainError::validation("at least one medication line is required").into());
        }

        let mut tx = self.pool.begin().await?;
        let now: DateTime<Utc> = Utc::now();

        // Resolve the patient before the header insert: an unknown id must
        // read as NotFound, not as a foreign-key failure on the INSERT.
        let patient = sqlx::query("SELECT ward, bed FROM patients WHERE id = $1")
            .bind(patient_id.get())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("patient {patient_id}")))?;
        let ward: String = patient.try_get("ward")?;
        let bed: String = patient.try_get("bed")?;

        let row = sqlx::query(
            "INSERT INTO prescriptions (patient_id, prescriber_id, issued_at) \
             VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(patient_id.get())
        .bind(prescriber_id.get())
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;
        let prescription_id = PrescriptionId::new(row.try_get("id")?);

        let mut transport_id = None;
        let mut deliveries = Vec::with_capacity(lines.len());

        for (index, line) in lines.iter().enumerate() {
            let med = sqlx::query("SELECT tag FROM medications WHERE id = $1")
                .bind(line.medication_id.get())
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| {
                    DomainError::not_found(format!("medication {}", line.medication_id))
                })?;
            let tag: String = med.try_get("tag")?;

            let required = units_for(line.dose_mg, line.frequency_days);
            let result = sqlx::query(
                "UPDATE medications SET stock_units = stock_units - $1 \
                 WHERE id = $2 AND stock_units >= $1",
            )
            .bind(required)
            .bind(line.medication_id.get())
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                let available: i64 =
                    sqlx::query_scalar("SELECT stock_units FROM medications WHERE id = $1")
                        .bind(line.medication_id.get())
                        .fetch_one(&mut *tx)
                        .await?;
                return Err(DomainError::insufficient_stock(
                    line.medication_id,
                    available,
                    required,
                )
                .into());
            }

            sqlx::query(
                "INSERT INTO prescription_lines \
                 (prescription_id, medication_id, dose_mg, frequency_days) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(prescription_id.get())
            .bind(line.medication_id.get())
            .bind(line.dose_mg)
            .bind(line.frequency_days)
            .execute(&mut *tx)
            .await?;

            if index == 0 {
                let row = sqlx::query(
                    "INSERT INTO transport_records (medication_id, patient_id, recorded_at, status) \
                     VALUES ($1, $2, $3, $4) RETURNING id",
                )
                .bind(line.medication_id.get())
                .bind(patient_id.get())
                .bind(now)
                .bind(TransportStatus::InProgress.as_str())
                .fetch_one(&mut *tx)
                .await?;
                transport_id = Some(TransportId::new(row.try_get("id")?));
            }

            deliveries.push(Delivery {
                medication_id: line.medication_id,
                ward: ward.clone(),
                bed: bed.clone(),
                tag,
            });
        }

        let Some(transport_id) = transport_id else {
            return Err(DomainError::invariant("create produced no transport record").into());
        };

        tx.commit().await?;
        tracing::debug!(%prescription_id, lines = lines.len(), "prescription committed");

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
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM prescriptions WHERE id = $1")
            .bind(prescription_id.get())
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("prescription {prescription_id}")))?;

        // Lock the stored lines so concurrent revises of one prescription
        // serialize here; the delta below must be computed against the
        // baseline the stock update will actually see.
        let stored_rows = sqlx::query(
            "SELECT medication_id, dose_mg, frequency_days \
             FROM prescription_lines WHERE prescription_id = $1 \
             FOR UPDATE",
        )
        .bind(prescription_id.get())
        .fetch_all(&mut *tx)
        .await?;

        let mut stored = std::collections::HashMap::new();
        for row in &stored_rows {
            let medication_id: i64 = row.try_get("medication_id")?;
            let dose_mg: i64 = row.try_get("dose_mg")?;
            let frequency_days: i64 = row.try_get("frequency_days")?;
            stored.insert(medication_id, (dose_mg, frequency_days));
        }

        let mut updated = 0;
        let mut ignored = 0;

        for line in lines {
            let Some(&(old_dose, old_frequency)) = stored.get(&line.medication_id.get()) else {
                ignored += 1;
                continue;
            };

            let old_units = units_for(old_dose, old_frequency);
            let new_units = units_for(line.dose_mg, line.frequency_days);

            match reconcile(old_units, new_units) {
                StockDelta::Unchanged => {}
                StockDelta::Consume(delta) => {
                    let result = sqlx::query(
                        "UPDATE medications SET stock_units = stock_units - $1 \
                         WHERE id = $2 AND stock_units >= $1",
                    )
                    .bind(delta)
                    .bind(line.medication_id.get())
                    .execute(&mut *tx)
                    .await?;
                    if result.rows_affected() == 0 {
                        let available: Option<i64> = sqlx::query_scalar(
                            "SELECT stock_units FROM medications WHERE id = $1",
                        )
                        .bind(line.medication_id.get())
                        .fetch_optional(&mut *tx)
                        .await?;
                        return Err(match available {
                            Some(available) => DomainError::insufficient_stock(
                                line.medication_id,
                                available,
                                delta,
                            ),
                            None => DomainError::not_found(format!(
                                "medication {}",
                                line.medication_id
                            )),
                        }
                        .into());
                    }
                }
                StockDelta::Refund(delta) => {
                    let result = sqlx::query(
                        "UPDATE medications SET stock_units = stock_units + $1 WHERE id = $2",
                    )
                    .bind(delta)
                    .bind(line.medication_id.get())
                    .execute(&mut *tx)
                    .await?;
                    if result.rows_affected() == 0 {
                        return Err(DomainError::not_found(format!(
                            "medication {}",
                            line.medication_id
                        ))
                        .into());
                    }
                }
            }

            sqlx::query(
                "UPDATE prescription_lines SET dose_mg = $1, frequency_days = $2 \
                 WHERE prescription_id = $3 AND medication_id = $4",
            )
            .bind(line.dose_mg)
            .bind(line.frequency_days)
            .bind(prescription_id.get())
            .bind(line.medication_id.get())
            .execute(&mut *tx)
            .await?;
            updated += 1;
        }

        tx.commit().await?;
        Ok(ReviseOutcome { updated, ignored })
    }

    async fn advance_transport(
        &self,
        transport_id: TransportId,
        status: TransportStatus,
    ) -> StoreResult<()> {
        let result = sqlx::query("UPDATE transport_records SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(transport_id.get())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found(format!("transport record {transport_id}")).into());
        }
        Ok(())
    }

    async fn list_prescriptions(&self) -> StoreResult<Vec<PrescriptionSummary>> {
        let rows = sqlx::query(
            "SELECT p.id, p.patient_id, p.prescriber_id, p.issued_at, pa.name AS patient_name \
             FROM prescriptions p \
             JOIN patients pa ON pa.id = p.patient_id \
             ORDER BY p.issued_at DESC, p.id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(PrescriptionSummary {
                    id: PrescriptionId::new(row.try_get("id")?),
                    patient_id: PatientId::new(row.try_get("patient_id")?),
                    prescriber_id: PrescriberId::new(row.try_get("prescriber_id")?),
                    issued_at: row.try_get("issued_at")?,
                    patient_name: row.try_get("patient_name")?,
                })
            })
            .collect()
    }

    async fn prescription_medications(
        &self,
        prescription_id: PrescriptionId,
    ) -> StoreResult<Vec<PrescriptionLineView>> {
        let rows = sqlx::query(
            "SELECT l.prescription_id, l.medication_id, l.dose_mg, l.frequency_days, \
                    m.name AS medication_name, m.stock_units \
             FROM prescription_lines l \
             JOIN medications m ON m.id = l.medication_id \
             WHERE l.prescription_id = $1",
        )
        .bind(prescription_id.get())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(PrescriptionLineView {
                    prescription_id: PrescriptionId::new(row.try_get("prescription_id")?),
                    medication_id: MedicationId::new(row.try_get("medication_id")?),
                    medication_name: row.try_get("medication_name")?,
                    dose_mg: row.try_get("dose_mg")?,
                    frequency_days: row.try_get("frequency_days")?,
                    stock_units: row.try_get("stock_units")?,
                })
            })
            .collect()
    }

    async fn patient_prescriptions(
        &self,
        patient_id: PatientId,
    ) -> StoreResult<Vec<PatientPrescriptionView>> {
        let rows = sqlx::query(
            "SELECT p.id AS prescription_id, p.issued_at, \
                    m.id AS medication_id, m.name AS medication_name, \
                    l.dose_mg, l.frequency_days \
             FROM prescriptions p \
             JOIN prescription_lines l ON l.prescription_id = p.id \
             JOIN medications m ON m.id = l.medication_id \
             WHERE p.patient_id = $1 \
             ORDER BY p.issued_at DESC, p.id DESC",
        )
        .bind(patient_id.get())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(PatientPrescriptionView {
                    prescription_id: PrescriptionId::new(row.try_get("prescription_id")?),
                    issued_at: row.try_get("issued_at")?,
                    medication_id: MedicationId::new(row.try_get("medication_id")?),
                    medication_name: row.try_get("medication_name")?,
                    dose_mg: row.try_get("dose_mg")?,
                    frequency_days: row.try_get("frequency_days")?,
                })
            })
            .collect()
    }

    async fn list_transports(&self) -> StoreResult<Vec<TransportRecord>> {
        let rows = sqlx::query(
            "SELECT id, medication_id, patient_id, recorded_at, status \
             FROM transport_records \
             ORDER BY recorded_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(transport_from_row).collect()
    }

    async fn get_transport(&self, transport_id: TransportId) -> StoreResult<Option<TransportRecord>> {
        let row = sqlx::query(
            "SELECT id, medication_id, patient_id, recorded_at, status \
             FROM transport_records WHERE id = $1",
        )
        .bind(transport_id.get())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(transport_from_row).transpose()
    }

    async fn raise_alarm(&self, description: &str) -> StoreResult<AlarmId> {
        let row = sqlx::query(
            "INSERT INTO alarms (description, raised_at, status) \
             VALUES ($1, $2, 'new') RETURNING id",
        )
        .bind(description)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(AlarmId::new(row.try_get("id")?))
    }

    async fn list_alarms(&self) -> StoreResult<Vec<AlarmRecord>> {
        let rows = sqlx::query("SELECT id, description, raised_at, status FROM alarms ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| {
                Ok(AlarmRecord {
                    id: AlarmId::new(row.try_get("id")?),
                    description: row.try_get("description")?,
                    raised_at: row.try_get("raised_at")?,
                    status: row.try_get("status")?,
                })
            })
            .collect()
    }

    async fn put_patient(&self, name: &str, ward: &str, bed: &str) -> StoreResult<PatientId> {
        let row = sqlx::query(
            "INSERT INTO patients (name, ward, bed) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(name)
        .bind(ward)
        .bind(bed)
        .fetch_one(&self.pool)
        .await?;
        Ok(PatientId::new(row.try_get("id")?))
    }

    async fn put_medication(
        &self,
        name: &str,
        tag: &str,
        stock_units: i64,
    ) -> StoreResult<MedicationId> {
        let row = sqlx::query(
            "INSERT INTO medications (name, tag, stock_units) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(name)
        .bind(tag)
        .bind(stock_units)
        .fetch_one(&self.pool)
        .await?;
        Ok(MedicationId::new(row.try_get("id")?))
    }

    async fn get_medication(&self, id: MedicationId) -> StoreResult<Option<MedicationRecord>> {
        let row = sqlx::query("SELECT id, name, tag, stock_units FROM medications WHERE id = $1")
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await?;
        row.map(|row| {
            Ok(MedicationRecord {
                id: MedicationId::new(row.try_get("id")?),
                name: row.try_get("name")?,
                tag: row.try_get("tag")?,
                stock_units: row.try_get("stock_units")?,
            })
        })
        .transpose()
    }
}
