#![allow(dead_code)]

//! In-process stand-in for the operations backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use bridgewatch_core::error::{ApiError, codes};
use bridgewatch_core::recurrence::{RecurrenceQuery, SymptomReport};
use bridgewatch_core::roles::Role;
use bridgewatch_core::situation::DeviceType;
use bridgewatch_runtime::{Dispatcher, DispatcherConfig, SessionIdentity};
use chrono::Utc;
use serde_json::{Map, Value, json};

pub const TOKEN: &str = "test-token";
pub const YACHT: &str = "Y1";

type Reply = (StatusCode, Json<Value>);

#[derive(Default)]
pub struct Backend {
    /// Every request that reached the stub, authorized or not
    pub requests: AtomicUsize,
    pub executed: Mutex<Vec<Value>>,
    pub archived: Mutex<Vec<Value>>,
    receiving: Mutex<HashMap<String, String>>,
    reports: Vec<SymptomReport>,
    next_id: AtomicUsize,
}

impl Backend {
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn last_executed(&self) -> Option<Value> {
        self.executed.lock().expect("lock should not be poisoned").last().cloned()
    }

    pub fn archived_count(&self) -> usize {
        self.archived.lock().expect("lock should not be poisoned").len()
    }
}

pub async fn spawn_backend(reports: Vec<SymptomReport>) -> (String, Arc<Backend>) {
    let backend = Arc::new(Backend {
        reports,
        ..Backend::default()
    });
    let app = Router::new()
        .route("/health", get(health))
        .route("/v1/actions/execute", post(execute))
        .route("/v1/{entity}/prepare", post(prepare))
        .route("/v1/{entity}/commit", post(commit))
        .route("/v1/rpc/check_symptom_recurrence", post(recurrence))
        .route("/v1/situations/log", post(log_situation))
        .with_state(Arc::clone(&backend));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("listener should bind");
    let addr = listener.local_addr().expect("listener should have an address");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("stub backend should serve");
    });
    (format!("http://{addr}"), backend)
}

pub fn session(role: Role) -> SessionIdentity {
    SessionIdentity {
        yacht_id: YACHT.to_string(),
        user_id: "u-42".to_string(),
        role,
        access_token: TOKEN.to_string(),
        session_id: "s-test".to_string(),
        device_type: DeviceType::Tablet,
    }
}

pub fn dispatcher(api_url: &str) -> Dispatcher {
    let config = DispatcherConfig::new(api_url).expect("stub url should parse");
    Dispatcher::new(config).expect("http client should build")
}

/// Three OVERHEAT reports on Generator 1, ten days apart.
pub fn generator_reports() -> Vec<SymptomReport> {
    [25, 15, 5]
        .into_iter()
        .map(|days_ago| SymptomReport {
            yacht_id: YACHT.to_string(),
            equipment_label: "Generator 1".to_string(),
            symptom_code: "OVERHEAT".to_string(),
            reported_at: Utc::now() - chrono::Duration::days(days_ago),
            resolved: days_ago > 20,
        })
        .collect()
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == format!("Bearer {TOKEN}"))
}

fn unauthorized() -> Reply {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Not authenticated"})),
    )
}

async fn health() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

async fn execute(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return unauthorized();
    }
    backend
        .executed
        .lock()
        .expect("lock should not be poisoned")
        .push(body.clone());

    let action = body["action"].as_str().unwrap_or_default();
    let payload = &body["payload"];
    match action {
        "accept_receiving" => {
            let id = payload["receiving_id"].as_str().unwrap_or_default().to_string();
            let mut records = backend.receiving.lock().expect("lock should not be poisoned");
            let status = records.entry(id.clone()).or_insert_with(|| "pending".to_string());
            if *status == "accepted" {
                return (
                    StatusCode::CONFLICT,
                    Json(json!({"error": {
                        "code": "already_in_terminal_state",
                        "message": "Receiving record is already accepted"
                    }})),
                );
            }
            *status = "accepted".to_string();
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": "Receiving accepted",
                    "data": {"receiving_id": id, "status": "accepted"}
                })),
            )
        }
        "sign_outgoing" if payload["signature"]["pin"].is_null() => (
            StatusCode::OK,
            Json(json!({"success": false, "error": {
                "code": "signature_required",
                "message": "Signature PIN missing"
            }})),
        ),
        "diagnose_fault" if payload["fault_id"] == "f-other-yacht" => (
            StatusCode::FORBIDDEN,
            Json(json!({"detail": "Fault belongs to another yacht"})),
        ),
        "view_part_stock" if payload["part_id"] == "slow" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            (StatusCode::OK, Json(json!({"success": true})))
        }
        _ => (
            StatusCode::OK,
            Json(json!({"success": true, "message": "done", "echo": payload})),
        ),
    }
}

async fn prepare(
    State(backend): State<Arc<Backend>>,
    Path(_entity): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return unauthorized();
    }
    let title = body["query_text"].as_str().unwrap_or_default();
    if title == "garbled" {
        return (StatusCode::OK, Json(json!({"success": true})));
    }
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "mutation_preview": {
                "title": title,
                "equipment_id": "eq-1",
                "priority": "routine",
                "field_metadata": {
                    "title": {"source": "nlp_entity"},
                    "equipment_id": {"source": "database"},
                    "priority": {"source": "derived"}
                },
                "priority_options": [
                    {"value": "routine", "label": "Routine"},
                    {"value": "critical", "label": "Critical"}
                ]
            }
        })),
    )
}

async fn commit(
    State(backend): State<Arc<Backend>>,
    Path(entity): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return unauthorized();
    }
    let payload = &body["payload"];
    if payload["title"].as_str().unwrap_or_default().trim().is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!(
                ApiError::new(codes::VALIDATION_FAILED, "title is required").with_field("title")
            )),
        );
    }
    if payload["yacht_id"] != body["context"]["yacht_id"] {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "yacht_id mismatch"})),
        );
    }

    let n = backend.next_id.fetch_add(1, Ordering::SeqCst) + 1;
    let prefix = if entity == "work_order" { "WO" } else { "F" };
    let mut reply = Map::new();
    reply.insert("success".into(), json!(true));
    reply.insert(format!("{entity}_id"), json!(format!("{entity}-{n}")));
    reply.insert(format!("{entity}_number"), json!(format!("{prefix}-{n:04}")));
    (StatusCode::OK, Json(Value::Object(reply)))
}

async fn recurrence(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(query): Json<RecurrenceQuery>,
) -> Reply {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return unauthorized();
    }
    let result = query.evaluate(&backend.reports, Utc::now());
    (StatusCode::OK, Json(json!([result])))
}

async fn log_situation(
    State(backend): State<Arc<Backend>>,
    headers: HeaderMap,
    Json(record): Json<Value>,
) -> Reply {
    backend.requests.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return unauthorized();
    }
    backend
        .archived
        .lock()
        .expect("lock should not be poisoned")
        .push(record);
    (StatusCode::OK, Json(json!({"success": true})))
}
