use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};

use medflow_core::{PatientId, PrescriberId, PrescriptionId};
use medflow_fulfillment::FulfillmentService;

use crate::app::{dto, errors};

pub fn router() -> Router {
    Router::new()
        .route("/", post(create_prescription).get(list_prescriptions))
        .route("/:id", put(revise_prescription))
        .route("/:id/medications", get(get_prescription_medications))
}

pub async fn create_prescription(
    Extension(service): Extension<FulfillmentService>,
    Json(body): Json<dto::CreatePrescriptionRequest>,
) -> axum::response::Response {
    let lines = dto::proposed_lines(&body.medications);

    let created = match service
        .create_prescription(
            PatientId::new(body.patient_id),
            PrescriberId::new(body.prescriber_id),
            &lines,
        )
        .await
    {
        Ok(c) => c,
        Err(e) => return errors::fulfillment_error_to_response(e),
    };

    (
        StatusCode::CREATED,
        Json(serde_json::json!({
            "prescriptionId": created.prescription_id,
            "transportId": created.transport_id,
        })),
    )
        .into_response()
}

pub async fn revise_prescription(
    Extension(service): Extension<FulfillmentService>,
    Path(id): Path<String>,
    Json(body): Json<dto::RevisePrescriptionRequest>,
) -> axum::response::Response {
    let prescription_id: PrescriptionId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_id",
                "invalid prescription id",
            );
        }
    };

    let lines = dto::proposed_lines(&body.medications);
    let outcome = match service.revise_prescription(prescription_id, &lines).await {
        Ok(o) => o,
        Err(e) => return errors::fulfillment_error_to_response(e),
    };

    (
        StatusCode::OK,
        Json(serde_json::json!({
            "success": true,
            "updated": outcome.updated,
            "ignored": outcome.ignored,
        })),
    )
        .into_response()
}

pub async fn list_prescriptions(
    Extension(service): Extension<FulfillmentService>,
) -> axum::response::Response {
    match service.list_prescriptions().await {
        Ok(rows) => {
            let items = rows
                .into_iter()
                .map(dto::prescription_summary_to_json)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn get_prescription_medications(
    Extension(service): Extension<FulfillmentService>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let prescription_id: PrescriptionId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_id",
                "invalid prescription id",
            );
        }
    };

    match service.prescription_medications(prescription_id).await {
        Ok(rows) => {
            let items = rows
                .into_iter()
                .map(dto::prescription_line_to_json)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn list_for_patient(
    Extension(service): Extension<FulfillmentService>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let patient_id: PatientId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_id", "invalid patient id");
        }
    };

    match service.patient_prescriptions(patient_id).await {
        Ok(rows) => {
            let items = rows
                .into_iter()
                .map(dto::patient_prescription_to_json)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}
