//! Infrastructure wiring: which store backend and which dispatcher the
//! service runs against, selected from the environment.

use std::sync::Arc;

use sqlx::PgPool;

use medflow_dispatch::{Dispatcher, RobotClient};
use medflow_fulfillment::FulfillmentService;
use medflow_store::{FulfillmentStore, MemoryStore, PostgresStore};

pub async fn build_services() -> FulfillmentService {
    let use_persistent = std::env::var("USE_PERSISTENT_STORE")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    let store: Arc<dyn FulfillmentStore> = if use_persistent {
        let database_url = std::env::var("DATABASE_URL")
            .expect("DATABASE_URL must be set when USE_PERSISTENT_STORE=true");
        let pool = PgPool::connect(&database_url)
            .await
            .expect("failed to connect to Postgres");
        Arc::new(PostgresStore::new(pool))
    } else {
        tracing::warn!("USE_PERSISTENT_STORE not enabled; using in-memory store (dev/test)");
        Arc::new(MemoryStore::new())
    };

    let robot_url = std::env::var("ROBOT_URL").unwrap_or_else(|_| {
        tracing::warn!("ROBOT_URL not set; defaulting to http://127.0.0.1:9000/commands");
        "http://127.0.0.1:9000/commands".to_string()
    });
    let dispatcher: Arc<dyn Dispatcher> =
        Arc::new(RobotClient::new(robot_url).expect("failed to build robot HTTP client"));

    FulfillmentService::new(store, dispatcher)
}
