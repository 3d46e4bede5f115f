use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use medflow_core::DomainError;
use medflow_fulfillment::FulfillmentError;
use medflow_store::TransportStatus;

pub fn fulfillment_error_to_response(err: FulfillmentError) -> axum::response::Response {
    match err {
        FulfillmentError::Domain(domain) => match domain {
            DomainError::Validation(msg) => {
                json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
            }
            DomainError::InvalidId(msg) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
            DomainError::NotFound(msg) => json_error(StatusCode::NOT_FOUND, "not_found", msg),
            DomainError::InsufficientStock {
                medication_id,
                available,
                required,
            } => (
                StatusCode::BAD_REQUEST,
                axum::Json(json!({
                    "error": "insufficient_stock",
                    "message": format!(
                        "insufficient stock for medication {medication_id}: available {available}, required {required}"
                    ),
                    "medicationId": medication_id,
                    "available": available,
                    "required": required,
                })),
            )
                .into_response(),
            DomainError::InvariantViolation(msg) => {
                json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
            }
        },
        FulfillmentError::Dependency(msg) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", msg)
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

pub fn parse_transport_status(s: &str) -> Result<TransportStatus, axum::response::Response> {
    s.parse().map_err(|_| {
        json_error(
            StatusCode::BAD_REQUEST,
            "invalid_status",
            "status must be one of: in-progress, delivered, failed",
        )
    })
}
