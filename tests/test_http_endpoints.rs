//! End-to-end tests of the HTTP endpoints over the in-memory pipeline

mod common;

use std::cmp::Ordering;
use std::io::Write;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use flate2::Compression;
use flate2::write::GzEncoder;
use http_body_util::BodyExt;
use prost::Message;
use serde_json::{Value, json};
use telemetry_ingest::EventType;
use tower::ServiceExt;

use common::{
    API_KEY, TRACE_ID_HEX, TestApp, gauge, kv, log_event, log_record, logs_request,
    metrics_request, new_event_id, observation_event, span, string_value, trace_request,
};

const PROTOBUF: &str = "application/x-protobuf";
const JSON: &str = "application/json";

fn post(path: &str, content_type: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", content_type)
        .header("authorization", format!("Bearer {API_KEY}"))
        .body(body.into())
        .unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::new();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn test_missing_credentials_rejected() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/traces")
        .header("content-type", PROTOBUF)
        .body(Body::from(trace_request(vec![span(1, None, "root")]).encode_to_vec()))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], json!("unauthenticated"));
    assert_eq!(app.stream.append_calls_count().await, 0);
}

#[tokio::test]
async fn test_unknown_key_rejected() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/logs")
        .header("content-type", PROTOBUF)
        .header("x-api-key", "sk-someone-else")
        .body(Body::from(logs_request(vec![log_record("x")]).encode_to_vec()))
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_x_api_key_accepted() {
    let app = TestApp::new();
    let request = Request::builder()
        .method("POST")
        .uri("/v1/logs")
        .header("content-type", PROTOBUF)
        .header("x-api-key", API_KEY)
        .body(Body::from(logs_request(vec![log_record("x")]).encode_to_vec()))
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_unsupported_content_type() {
    let app = TestApp::new();
    let (status, body) = send(&app, post("/v1/traces", "text/plain", "hello")).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
    assert_eq!(body["error"]["code"], json!("unsupported_media_type"));
}

#[tokio::test]
async fn test_body_over_limit() {
    let app = TestApp::new();
    let body = vec![0u8; 10 * 1024 * 1024 + 1];
    let (status, body) = send(&app, post("/v1/traces", PROTOBUF, body)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["error"]["code"], json!("payload_too_large"));
}

/// Valid trace export whose protobuf encoding is exactly `target` bytes
fn trace_body_of_size(target: usize) -> Vec<u8> {
    let mut padding = target;
    loop {
        let mut root = span(1, None, "root");
        root.attributes = vec![kv("padding", string_value(&"x".repeat(padding)))];
        let encoded = trace_request(vec![root]).encode_to_vec();
        match encoded.len().cmp(&target) {
            Ordering::Equal => return encoded,
            Ordering::Greater => padding -= encoded.len() - target,
            Ordering::Less => padding += target - encoded.len(),
        }
    }
}

#[tokio::test]
async fn test_body_at_limit_accepted() {
    let app = TestApp::new();
    let body = trace_body_of_size(10 * 1024 * 1024);
    let (status, body) = send(&app, post("/v1/traces", PROTOBUF, body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed_spans"], json!(1));
}

#[tokio::test]
async fn test_malformed_protobuf() {
    let app = TestApp::new();
    let (status, body) = send(&app, post("/v1/metrics", PROTOBUF, vec![0xffu8, 0xff])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn test_invalid_environment_header() {
    let app = TestApp::new();
    let mut request = post(
        "/v1/logs",
        PROTOBUF,
        logs_request(vec![log_record("x")]).encode_to_vec(),
    );
    request
        .headers_mut()
        .insert("x-environment", "prod env!".parse().unwrap());

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("invalid_environment"));
}

#[tokio::test]
async fn test_traces_accepted() {
    let app = TestApp::new();
    let mut root = span(1, None, "chat-completion");
    root.attributes = vec![
        kv("gen_ai.system", string_value("openai")),
        kv("gen_ai.request.model", string_value("gpt-4o")),
    ];
    let request = trace_request(vec![root, span(2, Some(1), "tool-call")]);

    let (status, body) = send(&app, post("/v1/traces", PROTOBUF, request.encode_to_vec())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("success"));
    assert_eq!(body["processed_spans"], json!(2));
    assert!(body.get("rejected_spans").is_none());
    assert_eq!(body["batch_id"].as_str().map(str::len), Some(26));

    let events = app.stream.events(&app.project_id).await;
    assert_eq!(events.len(), 3);
    assert_eq!(events[0].event_type, EventType::TraceCreate);
    assert_eq!(events[0].trace_id.as_deref(), Some(TRACE_ID_HEX));
    assert_eq!(events[1].payload["attributes"]["gen_ai.system"], json!("openai"));
}

#[tokio::test]
async fn test_traces_json_with_environment() {
    let app = TestApp::new();
    let request = trace_request(vec![span(1, None, "root")]);
    let mut http = post("/v1/traces", JSON, serde_json::to_vec(&request).unwrap());
    http.headers_mut()
        .insert("x-environment", "staging".parse().unwrap());

    let (status, _) = send(&app, http).await;
    assert_eq!(status, StatusCode::OK);

    let batches = app.stream.batches(&app.project_id).await;
    assert_eq!(
        batches[0].environment.as_ref().map(|e| e.as_str()),
        Some("staging")
    );
}

#[tokio::test]
async fn test_traces_partial_rejection() {
    let app = TestApp::new();
    let mut broken = span(2, None, "broken");
    broken.span_id = vec![0; 8];
    let request = trace_request(vec![span(1, None, "root"), broken]);

    let (status, body) = send(&app, post("/v1/traces", PROTOBUF, request.encode_to_vec())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["processed_spans"], json!(1));
    assert_eq!(body["rejected_spans"], json!(1));
    assert_eq!(body["errors"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn test_logs_accepted() {
    let app = TestApp::new();
    let request = logs_request(vec![log_record("one"), log_record("two")]);

    let (status, body) = send(&app, post("/v1/logs", PROTOBUF, request.encode_to_vec())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], json!("accepted"));
    assert_eq!(body["event_count"], json!(2));
    assert!(body.get("rejected_log_records").is_none());
}

#[tokio::test]
async fn test_metrics_gzip_json() {
    let app = TestApp::new();
    let request = metrics_request(vec![gauge("cpu", &[0.5]), gauge("mem", &[0.25])]);
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&serde_json::to_vec(&request).unwrap())
        .unwrap();
    let mut http = post("/v1/metrics", JSON, encoder.finish().unwrap());
    http.headers_mut()
        .insert("content-encoding", "gzip".parse().unwrap());

    let (status, body) = send(&app, http).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event_count"], json!(2));
    assert!(body.get("rejected_metrics").is_none());
}

#[tokio::test]
async fn test_batch_accepted() {
    let app = TestApp::new();
    let body = json!({
        "events": [observation_event(&new_event_id()), log_event(&new_event_id())],
        "metadata": {"sdk": "python"}
    });

    let (status, body) = send(
        &app,
        post("/v1/telemetry/batch", JSON, serde_json::to_vec(&body).unwrap()),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], json!("accepted"));
    assert_eq!(body["processed_events"], json!(2));
    assert_eq!(body["duplicate_events"], json!(0));
    assert_eq!(body["failed_events"], json!(0));
    assert_eq!(body["event_counts"], json!({"logs": 1, "observations": 1}));
    assert!(body["job_id"].is_string());
}

#[tokio::test]
async fn test_batch_partial_and_duplicates() {
    let app = TestApp::new();
    let id = new_event_id();
    let first = json!({"events": [observation_event(&id)]});
    send(
        &app,
        post("/v1/telemetry/batch", JSON, serde_json::to_vec(&first).unwrap()),
    )
    .await;

    let second = json!({
        "events": [
            observation_event(&id),
            {"event_id": "bogus", "event_type": "log_record", "payload": {"a": 1}},
            log_event(&new_event_id())
        ]
    });
    let (status, body) = send(
        &app,
        post("/v1/telemetry/batch", JSON, serde_json::to_vec(&second).unwrap()),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], json!("partial"));
    assert_eq!(body["processed_events"], json!(1));
    assert_eq!(body["duplicate_events"], json!(1));
    assert_eq!(body["failed_events"], json!(1));
    assert_eq!(body["duplicate_event_ids"], json!([id]));
    assert_eq!(body["errors"][0]["event_id"], json!("bogus"));
}

#[tokio::test]
async fn test_batch_fail_on_duplicate_conflict() {
    let app = TestApp::new();
    let id = new_event_id();
    let first = json!({"events": [observation_event(&id)]});
    send(
        &app,
        post("/v1/telemetry/batch", JSON, serde_json::to_vec(&first).unwrap()),
    )
    .await;

    let retry = json!({"events": [observation_event(&id)], "fail_on_duplicate": true});
    let (status, body) = send(
        &app,
        post("/v1/telemetry/batch", JSON, serde_json::to_vec(&retry).unwrap()),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], json!("duplicate_events"));
    assert_eq!(body["error"]["duplicate_event_ids"], json!([id]));
}

#[tokio::test]
async fn test_batch_all_invalid_lists_details() {
    let app = TestApp::new();
    let body = json!({"events": [{"event_type": "trace_create", "payload": {"a": 1}}]});

    let (status, body) = send(
        &app,
        post("/v1/telemetry/batch", JSON, serde_json::to_vec(&body).unwrap()),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], json!("validation_failed"));
    let fields: Vec<&str> = body["error"]["details"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|d| d["field"].as_str())
        .collect();
    assert!(fields.contains(&"events[0].event_id"));
    assert!(fields.contains(&"events[0].trace_id"));
}

#[tokio::test]
async fn test_batch_rejects_protobuf_and_bad_json() {
    let app = TestApp::new();
    let (status, _) = send(&app, post("/v1/telemetry/batch", PROTOBUF, vec![1u8, 2])).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let (status, body) = send(&app, post("/v1/telemetry/batch", JSON, "{\"events\": [")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("invalid_json"));
}

#[tokio::test]
async fn test_batch_stream_failure() {
    let app = TestApp::new();
    app.stream.set_failing(true).await;
    let body = json!({"events": [log_event(&new_event_id())]});

    let (status, body) = send(
        &app,
        post("/v1/telemetry/batch", JSON, serde_json::to_vec(&body).unwrap()),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], json!("publish_failed"));
}

#[tokio::test]
async fn test_validate_endpoint() {
    let app = TestApp::new();

    let valid = observation_event(&new_event_id());
    let (status, body) = send(
        &app,
        post("/v1/telemetry/validate", JSON, serde_json::to_vec(&valid).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"valid": true, "errors": []}));

    let invalid = json!({"event_id": new_event_id(), "event_type": "log_record", "payload": {}});
    let (status, body) = send(
        &app,
        post("/v1/telemetry/validate", JSON, serde_json::to_vec(&invalid).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], json!(false));
    assert_eq!(body["errors"][0]["code"], json!("empty_payload"));
    assert_eq!(app.stream.append_calls_count().await, 0);
}
