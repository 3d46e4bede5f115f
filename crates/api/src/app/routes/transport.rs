use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use medflow_core::TransportId;
use medflow_fulfillment::FulfillmentService;

use crate::app::{dto, errors};

pub fn records_router() -> Router {
    Router::new()
        .route("/", get(list_transport_records))
        .route("/:id", get(get_transport_record))
}

/// `POST /transport-status`. The transport record is addressed explicitly by
/// id, so a delivery confirmation can never land on someone else's record.
pub async fn advance_status(
    Extension(service): Extension<FulfillmentService>,
    Json(body): Json<dto::AdvanceTransportRequest>,
) -> axum::response::Response {
    let status = match errors::parse_transport_status(&body.status) {
        Ok(s) => s,
        Err(resp) => return resp,
    };

    match service
        .advance_transport(TransportId::new(body.transport_id), status)
        .await
    {
        Ok(()) => {
            (StatusCode::OK, Json(serde_json::json!({ "success": true }))).into_response()
        }
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn list_transport_records(
    Extension(service): Extension<FulfillmentService>,
) -> axum::response::Response {
    match service.list_transports().await {
        Ok(rows) => {
            let items = rows
                .into_iter()
                .map(dto::transport_to_json)
                .collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn get_transport_record(
    Extension(service): Extension<FulfillmentService>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let transport_id: TransportId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                "invalid_id",
                "invalid transport record id",
            );
        }
    };

    match service.get_transport(transport_id).await {
        Ok(Some(record)) => {
            (StatusCode::OK, Json(dto::transport_to_json(record))).into_response()
        }
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_found",
            "transport record not found",
        ),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

/// `POST /robot/errors`: failure channel for the dispensing robot.
pub async fn report_robot_error(
    Extension(service): Extension<FulfillmentService>,
    Json(body): Json<dto::RobotErrorRequest>,
) -> axum::response::Response {
    let description = body.description.unwrap_or_default();
    match service.raise_alarm(&description).await {
        Ok(alarm_id) => (
            StatusCode::CREATED,
            Json(serde_json::json!({ "alarmId": alarm_id })),
        )
            .into_response(),
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}

pub async fn list_alarms(
    Extension(service): Extension<FulfillmentService>,
) -> axum::response::Response {
    match service.list_alarms().await {
        Ok(rows) => {
            let items = rows.into_iter().map(dto::alarm_to_json).collect::<Vec<_>>();
            (StatusCode::OK, Json(serde_json::json!({ "items": items }))).into_response()
        }
        Err(e) => errors::fulfillment_error_to_response(e),
    }
}
