use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

use backend_client::{AdminClient, CleanupConfirmation, HttpBackend};
use dashboard_core::{AnalysisStatus, Classifier, FeedSource, Severity, WindowQuery};
use protocol::{AnalyzeResponse, SystemCreate};

#[derive(Clone, Default)]
struct Stub {
    seen_queries: Arc<Mutex<Vec<HashMap<String, String>>>>,
    cleanup_bodies: Arc<Mutex<Vec<Value>>>,
}

async fn logs(State(stub): State<Stub>, Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    stub.seen_queries.lock().unwrap().push(params);
    Json(json!([
        {
            "id": 12,
            "system_id": "billing",
            "content": { "message": "payment declined", "container": "worker-1" },
            "level": "ATENÇÃO",
            "created_at": "2024-05-01T10:11:12.000001"
        },
        {
            "id": 11,
            "system_id": "billing",
            "content": "plain text",
            "level": "info",
            "created_at": "2024-05-01T10:11:10+00:00"
        }
    ]))
}

async fn statuses() -> Json<Value> {
    Json(json!({ "12": "analyzing", "11": "completed", "bogus": "completed", "10": "weird" }))
}

async fn analyze(Path(log_id): Path<i64>) -> (StatusCode, Json<Value>) {
    match log_id {
        1 => (StatusCode::OK, Json(json!({ "analysis": "erro", "explanation": "disk full" }))),
        2 => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "model_unavailable", "message": "Classifier is offline" })),
        ),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "detail": "boom" }))),
    }
}

async fn daily() -> Json<Value> {
    Json(json!([
        { "date": "2024-05-01", "billing": 3 },
        { "date": "2024-05-02", "billing": 1, "auth": 4 }
    ]))
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("x-master-key").and_then(|v| v.to_str().ok()) == Some("letmein")
}

async fn update_system(
    headers: HeaderMap,
    Path(system_id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "bad key" })));
    }
    // Only the notes field is sent for a notes update
    assert_eq!(body.as_object().map(|o| o.len()), Some(1));
    (
        StatusCode::OK,
        Json(json!({
            "id": system_id,
            "name": "Billing",
            "client_email": "ops@example.com",
            "maintenance_email": "maint@example.com",
            "status": "active",
            "technical_info": body["technical_info"],
            "created_at": "2024-04-01T00:00:00"
        })),
    )
}

async fn register(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "bad key" })));
    }
    let mut record = body;
    record["id"] = json!("SYS-9");
    record["created_at"] = json!("2024-04-01T00:00:00");
    (StatusCode::OK, Json(record))
}

async fn filters(headers: HeaderMap, Path(system_id): Path<String>) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "bad key" })));
    }
    (
        StatusCode::OK,
        Json(json!([
            { "id": 1, "system_id": system_id, "pattern": "healthcheck", "created_at": "2024-04-01T00:00:00" }
        ])),
    )
}

async fn remove_filter(headers: HeaderMap, Path((_system, filter_id)): Path<(String, i64)>) -> StatusCode {
    match (authorized(&headers), filter_id) {
        (false, _) => StatusCode::UNAUTHORIZED,
        (true, 1) => StatusCode::NO_CONTENT,
        (true, _) => StatusCode::NOT_FOUND,
    }
}

async fn cleanup(
    State(stub): State<Stub>,
    headers: HeaderMap,
    Path(_system): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "detail": "bad key" })));
    }
    stub.cleanup_bodies.lock().unwrap().push(body);
    (StatusCode::OK, Json(json!({ "status": "success", "cleaned_count": 42 })))
}

async fn serve(stub: Stub) -> String {
    let app = Router::new()
        .route("/logs", get(logs))
        .route("/logs/status", get(statuses))
        .route("/analyze/:log_id", post(analyze))
        .route("/stats/daily", get(daily))
        .route("/register", post(register))
        .route("/systems/:system_id", put(update_system))
        .route("/systems/:system_id/filters", get(filters))
        .route("/systems/:system_id/filters/:filter_id", delete(remove_filter))
        .route("/systems/:system_id/cleanup", post(cleanup))
        .with_state(stub);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

#[tokio::test]
async fn test_window_is_folded_into_log_events() {
    let stub = Stub::default();
    let backend = HttpBackend::new(&serve(stub.clone()).await).unwrap();

    let query = WindowQuery { limit: 20, system_id: Some("billing".into()) };
    let events = backend.fetch_window(&query).await.unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].id, 12);
    assert_eq!(events[0].level, Severity::Attention);
    assert_eq!(events[0].container(), Some("worker-1"));
    assert_eq!(events[1].level, Severity::Normal);

    let seen = stub.seen_queries.lock().unwrap();
    assert_eq!(seen[0].get("limit").map(String::as_str), Some("20"));
    assert_eq!(seen[0].get("system_id").map(String::as_str), Some("billing"));
}

#[tokio::test]
async fn test_status_map_drops_unparseable_entries() {
    let backend = HttpBackend::new(&serve(Stub::default()).await).unwrap();
    let statuses = backend.fetch_statuses().await.unwrap();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[&12], AnalysisStatus::Analyzing);
    assert_eq!(statuses[&11], AnalysisStatus::Completed);
}

#[tokio::test]
async fn test_analysis_replies_and_failures() {
    let backend = HttpBackend::new(&serve(Stub::default()).await).unwrap();

    let ok = backend.analyze(1).await.unwrap();
    assert_eq!(
        ok,
        AnalyzeResponse::Analysis { analysis: Some("erro".into()), explanation: Some("disk full".into()) }
    );

    // An error body comes through as a backend failure, not a transport error
    let failed = backend.analyze(2).await.unwrap();
    assert!(matches!(failed, AnalyzeResponse::Failed { ref error, .. } if error == "model_unavailable"));

    let err = backend.analyze(3).await.unwrap_err();
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn test_unreachable_backend_is_an_error() {
    let backend = HttpBackend::new("http://127.0.0.1:9").unwrap();
    assert!(backend.fetch_statuses().await.is_err());
    assert!(backend.analyze(1).await.is_err());
}

#[tokio::test]
async fn test_daily_stats_rows() {
    let backend = HttpBackend::new(&serve(Stub::default()).await).unwrap();
    let rows = backend.daily_stats().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].counts.get("auth"), Some(&4));
    assert_eq!(dashboard_core::stats::system_keys(&rows), vec!["billing".to_string(), "auth".to_string()]);
}

#[tokio::test]
async fn test_admin_calls_carry_the_master_key() {
    let stub = Stub::default();
    let base = serve(stub.clone()).await;
    let admin = AdminClient::new(&base, "letmein").unwrap();

    let created = admin
        .register(&SystemCreate {
            name: "Billing".into(),
            client_name: None,
            client_email: "ops@example.com".into(),
            client_phone: None,
            maintenance_email: "maint@example.com".into(),
            status: "active".into(),
            technical_info: None,
        })
        .await
        .unwrap();
    assert_eq!(created.id, "SYS-9");
    assert!(created.client_name.is_none());

    let system = admin.update_notes("billing", "runs on k8s").await.unwrap();
    assert_eq!(system.technical_info.as_deref(), Some("runs on k8s"));

    let filters = admin.filters("billing").await.unwrap();
    assert_eq!(filters[0].pattern, "healthcheck");
    admin.remove_filter("billing", 1).await.unwrap();
    assert!(admin.remove_filter("billing", 99).await.is_err());

    let wrong = AdminClient::new(&base, "nope").unwrap();
    let err = wrong.filters("billing").await.unwrap_err();
    assert!(err.to_string().contains("401"));
}

#[tokio::test]
async fn test_cleanup_reports_count_verbatim() {
    let stub = Stub::default();
    let admin = AdminClient::new(&serve(stub.clone()).await, "letmein").unwrap();

    let reply = admin
        .cleanup("billing", "healthcheck", CleanupConfirmation::for_pattern("healthcheck"))
        .await
        .unwrap();
    assert_eq!(reply.cleaned_count, 42);
    assert_eq!(reply.status, "success");
    assert_eq!(stub.cleanup_bodies.lock().unwrap()[0], json!({ "pattern": "healthcheck" }));
}
