use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::json;

use medflow_dispatch::{DispatchError, DispenseCommand, Dispatcher};
use medflow_fulfillment::FulfillmentService;
use medflow_store::{FulfillmentStore, MemoryStore};

struct RecordingDispatcher {
    commands: tokio::sync::Mutex<Vec<DispenseCommand>>,
    fail: bool,
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    async fn dispatch(&self, command: &DispenseCommand) -> Result<(), DispatchError> {
        self.commands.lock().await.push(command.clone());
        if self.fail {
            Err(DispatchError::Timeout)
        } else {
            Ok(())
        }
    }
}

struct TestServer {
    base_url: String,
    store: Arc<MemoryStore>,
    dispatcher: Arc<RecordingDispatcher>,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn(fail_dispatch: bool) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let store = Arc::new(MemoryStore::new());
        let dispatcher = Arc::new(RecordingDispatcher {
            commands: tokio::sync::Mutex::new(Vec::new()),
            fail: fail_dispatch,
        });
        let app = medflow_api::app::build_app(FulfillmentService::new(
            store.clone(),
            dispatcher.clone(),
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            store,
            dispatcher,
            handle,
        }
    }

    /// Seed one patient and one medication, returning their raw ids.
    async fn seed(&self, stock_units: i64) -> (i64, i64) {
        let patient = self
            .store
            .put_patient("Pop Maria", "B2", "14")
            .await
            .unwrap();
        let medication = self
            .store
            .put_medication("Algocalmin", "RF-0001", stock_units)
            .await
            .unwrap();
        (patient.get(), medication.get())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn dispatched_eventually(srv: &TestServer, expected: usize) -> Vec<DispenseCommand> {
    // Dispatch runs on detached tasks after the response is sent; poll
    // briefly until the commands land.
    for _ in 0..50 {
        let commands = srv.dispatcher.commands.lock().await;
        if commands.len() >= expected {
            return commands.clone();
        }
        drop(commands);
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("dispatch commands did not arrive within timeout");
}

fn line(medication_id: i64, dose: i64, frequency: i64) -> serde_json::Value {
    json!({ "medicationId": medication_id, "dose": dose, "frequency": frequency })
}

#[tokio::test]
async fn health_endpoint_is_open() {
    let srv = TestServer::spawn(false).await;

    let res = reqwest::get(format!("{}/health", srv.base_url)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn create_prescription_happy_path() {
    let srv = TestServer::spawn(false).await;
    let (patient, med_a) = srv.seed(10).await;
    let med_b = srv
        .store
        .put_medication("Paduden", "RF-0002", 10)
        .await
        .unwrap()
        .get();

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/prescriptions", srv.base_url))
        .json(&json!({
            "patientId": patient,
            "prescriberId": 7,
            "medications": [line(med_a, 500, 10), line(med_b, 1000, 30)],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let prescription_id = created["prescriptionId"].as_i64().unwrap();
    assert!(created["transportId"].as_i64().unwrap() > 0);

    // Listing shows the new prescription with the patient's name joined in.
    let body: serde_json::Value = client
        .get(format!("{}/prescriptions", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["patientName"], "Pop Maria");

    // 500mg x 10 days = 5000mg = 1 unit; 1000mg x 30 days = 30000mg = 6 units.
    let body: serde_json::Value = client
        .get(format!(
            "{}/prescriptions/{}/medications",
            srv.base_url, prescription_id
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let stock_of = |id: i64| {
        items
            .iter()
            .find(|i| i["medicationId"].as_i64() == Some(id))
            .unwrap()["stockUnits"]
            .as_i64()
            .unwrap()
    };
    assert_eq!(stock_of(med_a), 9);
    assert_eq!(stock_of(med_b), 4);

    // One dispense command per line, addressed to the patient's location.
    let commands = dispatched_eventually(&srv, 2).await;
    assert!(commands.iter().all(|c| c.ward == "B2" && c.bed == "14"));
    assert!(commands.iter().any(|c| c.tag == "RF-0001"));
    assert!(commands.iter().any(|c| c.tag == "RF-0002"));

    // The patient view lists one row per line, newest first.
    let body: serde_json::Value = client
        .get(format!("{}/patients/{}/prescriptions", srv.base_url, patient))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["items"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn dosage_bounds_are_enforced() {
    let srv = TestServer::spawn(false).await;
    let (patient, medication) = srv.seed(100).await;

    let client = reqwest::Client::new();
    let post = |meds: serde_json::Value| {
        client
            .post(format!("{}/prescriptions", srv.base_url))
            .json(&json!({ "patientId": patient, "prescriberId": 7, "medications": meds }))
            .send()
    };

    for bad in [
        line(medication, 99, 10),
        line(medication, 1001, 10),
        line(medication, 500, 0),
        line(medication, 500, 31),
    ] {
        let res = post(json!([bad])).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = res.json().await.unwrap();
        assert_eq!(body["error"], "validation_error");
    }

    // Both bounds are inclusive.
    let res = post(json!([line(medication, 100, 1)])).await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let res = post(json!([line(medication, 1000, 30)])).await.unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn missing_patient_id_is_a_validation_error() {
    let srv = TestServer::spawn(false).await;
    let (_patient, medication) = srv.seed(10).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/prescriptions", srv.base_url))
        .json(&json!({ "prescriberId": 7, "medications": [line(medication, 500, 10)] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "validation_error");
}

#[tokio::test]
async fn unknown_patient_is_not_found() {
    let srv = TestServer::spawn(false).await;
    let (_patient, medication) = srv.seed(10).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/prescriptions", srv.base_url))
        .json(&json!({
            "patientId": 9999,
            "prescriberId": 7,
            "medications": [line(medication, 500, 10)],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn insufficient_stock_rejects_whole_prescription() {
    let srv = TestServer::spawn(false).await;
    let (patient, ok_med) = srv.seed(10).await;
    let empty_med = srv
        .store
        .put_medication("Paduden", "RF-0002", 0)
        .await
        .unwrap()
        .get();

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/prescriptions", srv.base_url))
        .json(&json!({
            "patientId": patient,
            "prescriberId": 7,
            "medications": [line(ok_med, 500, 10), line(empty_med, 500, 10)],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["error"], "insufficient_stock");
    assert_eq!(body["available"], 0);
    assert_eq!(body["required"], 1);

    // Nothing committed: no prescriptions, no transport records, first
    // medication's stock untouched, nothing dispatched.
    let body: serde_json::Value = client
        .get(format!("{}/prescriptions", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["items"].as_array().unwrap().is_empty());

    let body: serde_json::Value = client
        .get(format!("{}/transport-records", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["items"].as_array().unwrap().is_empty());

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert!(srv.dispatcher.commands.lock().await.is_empty());
}

#[tokio::test]
async fn revise_applies_signed_stock_delta() {
    let srv = TestServer::spawn(false).await;
    let (patient, medication) = srv.seed(10).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/prescriptions", srv.base_url))
        .json(&json!({
            "patientId": patient,
            "prescriberId": 7,
            "medications": [line(medication, 500, 10)],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: serde_json::Value = res.json().await.unwrap();
    let prescription_id = created["prescriptionId"].as_i64().unwrap();

    let stock = |client: &reqwest::Client| {
        let url = format!(
            "{}/prescriptions/{}/medications",
            srv.base_url, prescription_id
        );
        let client = client.clone();
        async move {
            let body: serde_json::Value =
                client.get(url).send().await.unwrap().json().await.unwrap();
            body["items"][0]["stockUnits"].as_i64().unwrap()
        }
    };
    assert_eq!(stock(&client).await, 9);

    // 1 unit -> 6 units: consume 5 more.
    let res = client
        .put(format!("{}/prescriptions/{}", srv.base_url, prescription_id))
        .json(&json!({ "medications": [line(medication, 1000, 30)] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["updated"], 1);
    assert_eq!(stock(&client).await, 4);

    // 6 units -> 1 unit: refund 5.
    let res = client
        .put(format!("{}/prescriptions/{}", srv.base_url, prescription_id))
        .json(&json!({ "medications": [line(medication, 500, 10)] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(stock(&client).await, 9);

    // Same consumption again: no stock movement.
    let res = client
        .put(format!("{}/prescriptions/{}", srv.base_url, prescription_id))
        .json(&json!({ "medications": [line(medication, 500, 10)] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(stock(&client).await, 9);

    // Revision never dispatches.
    let commands = dispatched_eventually(&srv, 1).await;
    assert_eq!(commands.len(), 1);
}

#[tokio::test]
async fn revise_ignores_lines_without_a_stored_match() {
    let srv = TestServer::spawn(false).await;
    let (patient, medication) = srv.seed(10).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/prescriptions", srv.base_url))
        .json(&json!({
            "patientId": patient,
            "prescriberId": 7,
            "medications": [line(medication, 500, 10)],
        }))
        .send()
        .await
        .unwrap();
    let created: serde_json::Value = res.json().await.unwrap();
    let prescription_id = created["prescriptionId"].as_i64().unwrap();

    let res = client
        .put(format!("{}/prescriptions/{}", srv.base_url, prescription_id))
        .json(&json!({ "medications": [line(9999, 500, 10)] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["updated"], 0);
    assert_eq!(body["ignored"], 1);
}

#[tokio::test]
async fn revise_unknown_prescription_is_not_found() {
    let srv = TestServer::spawn(false).await;
    let (_patient, medication) = srv.seed(10).await;

    let client = reqwest::Client::new();
    let res = client
        .put(format!("{}/prescriptions/9999", srv.base_url))
        .json(&json!({ "medications": [line(medication, 500, 10)] }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn transport_status_advance_targets_record_by_id() {
    let srv = TestServer::spawn(false).await;
    let (patient, medication) = srv.seed(10).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/prescriptions", srv.base_url))
        .json(&json!({
            "patientId": patient,
            "prescriberId": 7,
            "medications": [line(medication, 500, 10)],
        }))
        .send()
        .await
        .unwrap();
    let created: serde_json::Value = res.json().await.unwrap();
    let transport_id = created["transportId"].as_i64().unwrap();

    let record: serde_json::Value = client
        .get(format!("{}/transport-records/{}", srv.base_url, transport_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(record["status"], "in-progress");

    let res = client
        .post(format!("{}/transport-status", srv.base_url))
        .json(&json!({ "transportId": transport_id, "status": "delivered" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let record: serde_json::Value = client
        .get(format!("{}/transport-records/{}", srv.base_url, transport_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(record["status"], "delivered");

    // Unknown status values are rejected before anything is touched.
    let res = client
        .post(format!("{}/transport-status", srv.base_url))
        .json(&json!({ "transportId": transport_id, "status": "done" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    // So are unknown record ids.
    let res = client
        .post(format!("{}/transport-status", srv.base_url))
        .json(&json!({ "transportId": 9999, "status": "failed" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dispatch_failure_does_not_fail_the_request() {
    let srv = TestServer::spawn(true).await;
    let (patient, medication) = srv.seed(10).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/prescriptions", srv.base_url))
        .json(&json!({
            "patientId": patient,
            "prescriberId": 7,
            "medications": [line(medication, 500, 10)],
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    // The command was attempted and failed; the prescription stands anyway.
    dispatched_eventually(&srv, 1).await;
    let body: serde_json::Value = client
        .get(format!("{}/prescriptions", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["items"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn concurrent_creates_never_oversell() {
    let srv = TestServer::spawn(false).await;
    let (patient, medication) = srv.seed(1).await;

    let client = reqwest::Client::new();
    let request = |prescriber: i64| {
        client
            .post(format!("{}/prescriptions", srv.base_url))
            .json(&json!({
                "patientId": patient,
                "prescriberId": prescriber,
                "medications": [line(medication, 500, 10)],
            }))
            .send()
    };

    let (a, b) = tokio::join!(request(7), request(8));
    let statuses = [a.unwrap().status(), b.unwrap().status()];
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::CREATED)
            .count(),
        1
    );
    assert_eq!(
        statuses
            .iter()
            .filter(|s| **s == StatusCode::BAD_REQUEST)
            .count(),
        1
    );
}

#[tokio::test]
async fn robot_error_raises_an_alarm() {
    let srv = TestServer::spawn(false).await;

    let client = reqwest::Client::new();
    let res = client
        .post(format!("{}/robot/errors", srv.base_url))
        .json(&json!({ "description": "gripper jam at dispenser 3" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: serde_json::Value = res.json().await.unwrap();
    assert!(body["alarmId"].as_i64().unwrap() > 0);

    let body: serde_json::Value = client
        .get(format!("{}/alarms", srv.base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["description"], "gripper jam at dispenser 3");
    assert_eq!(items[0]["status"], "new");
}
