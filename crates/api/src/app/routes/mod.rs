use axum::{
    Router,
    routing::{get, post},
};

pub mod prescriptions;
pub mod system;
pub mod transport;

/// Router for all fulfillment endpoints.
pub fn router() -> Router {
    Router::new()
        .nest("/prescriptions", prescriptions::router())
        .route(
            "/patients/:id/prescriptions",
            get(prescriptions::list_for_patient),
        )
        .route("/transport-status", post(transport::advance_status))
        .nest("/transport-records", transport::records_router())
        .route("/robot/errors", post(transport::report_robot_error))
        .route("/alarms", get(transport::list_alarms))
}
