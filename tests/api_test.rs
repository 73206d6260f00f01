use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use serde_json::{json, Value};
use tower::ServiceExt; // for `oneshot`

use telemetry_dashboard::api;
use telemetry_dashboard::domain::StoredRecord;
use telemetry_dashboard::store::{MemoryStore, RecordStore, RemoteStore};

fn encoded(reading: &Value) -> String {
    STANDARD.encode(reading.to_string())
}

async fn store_with(records: &[(i64, Value)]) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for (ts, reading) in records {
        store
            .insert(StoredRecord { id: None, body: encoded(reading), ts: *ts })
            .await
            .unwrap();
    }
    store
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn unreachable_store() -> Arc<RemoteStore> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Arc::new(RemoteStore::new(&format!("http://127.0.0.1:{port}")).unwrap())
}

#[tokio::test]
async fn latest_data_returns_decoded_body_verbatim() {
    let reading = json!({
        "temperature": 21.3,
        "humidity": 44,
        "pressure": 1012,
        "timestamp": "2024-11-15T10:00:00.000Z",
    });
    let store = store_with(&[(1_731_664_700, json!({"temperature": 1.0})), (1_731_664_800, reading.clone())]).await;

    let (status, body) = get(api::router(store), "/latest-data").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, reading);
}

#[tokio::test]
async fn latest_data_accepts_trailing_slash() {
    let store = store_with(&[(1, json!({"temperature": 20.5}))]).await;
    let (status, body) = get(api::router(store), "/latest-data/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["temperature"], 20.5);
}

#[tokio::test]
async fn latest_data_on_empty_store_is_404() {
    let (status, body) = get(api::router(Arc::new(MemoryStore::new())), "/latest-data").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"message": "No data found"}));
}

#[tokio::test]
async fn latest_data_with_unreachable_store_is_503() {
    let (status, body) = get(api::router(unreachable_store()), "/latest-data").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body, json!({"message": "Database connection failed"}));
}

#[tokio::test]
async fn latest_data_with_slow_store_is_500() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let store = RemoteStore::with_timeout(&format!("http://{addr}"), Duration::from_millis(200)).unwrap();

    let (status, body) = get(api::router(Arc::new(store)), "/latest-data").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal Server Error");
    drop(listener);
}

#[tokio::test]
async fn latest_data_with_undecodable_body_is_500() {
    let store = Arc::new(MemoryStore::new());
    store
        .insert(StoredRecord { id: None, body: "%%%".into(), ts: 1 })
        .await
        .unwrap();

    let (status, body) = get(api::router(store), "/latest-data").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal Server Error");
    assert!(body["error"].as_str().unwrap().contains("base64"));
}

#[tokio::test]
async fn data_between_without_end_is_400() {
    let store = store_with(&[(1, json!({"temperature": 20.5}))]).await;
    let (status, body) = get(api::router(store), "/data-between?startEpoch=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"message": "Both startEpoch and endEpoch are required"}));
}

#[tokio::test]
async fn data_between_with_non_numbers_is_400() {
    let (status, body) = get(
        api::router(Arc::new(MemoryStore::new())),
        "/data-between?startEpoch=abc&endEpoch=1000",
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"message": "startEpoch and endEpoch must be valid numbers"}));
}

#[tokio::test]
async fn data_between_with_no_matches_is_404() {
    let (status, body) = get(
        api::router(Arc::new(MemoryStore::new())),
        "/data-between?startEpoch=0&endEpoch=0",
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"message": "No data found within the given time range"}));
}

#[tokio::test]
async fn data_between_builds_three_series_in_store_order() {
    let store = store_with(&[
        (1_731_664_825, json!({"temperature": 21.0, "humidity": 49.6, "pressure": 1010.2, "timestamp": "2024-11-15T10:00:25.000Z"})),
        (1_731_664_800, json!({"temperature": 20.5, "humidity": 0, "pressure": 1010.1, "timestamp": "2024-11-15T10:00:00.000Z"})),
        (1_731_664_900, json!({"temperature": 99.0, "humidity": 1.0, "pressure": 1.0, "timestamp": "2024-11-15T10:01:40.000Z"})),
    ])
    .await;

    // bounds in ms; the last record is outside
    let (status, body) = get(
        api::router(store),
        "/data-between?startEpoch=1731664800000&endEpoch=1731664825000",
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            {"name": "Temperature (°C)", "data": [[1731664825000_i64, 21.0], [1731664800000_i64, 20.5]]},
            {"name": "Pressure (m2)", "data": [[1731664825000_i64, 1010.2], [1731664800000_i64, 1010.1]]},
            {"name": "Humidity (%rh)", "data": [[1731664825000_i64, 49.6]]},
        ])
    );
}

#[tokio::test]
async fn data_between_uses_fractional_second_bounds() {
    let store = store_with(&[(100, json!({"temperature": 20.5, "timestamp": "2024-11-15T10:00:00.000Z"}))]).await;

    // 100.001 s > 100 s: nothing matches
    let (status, _) = get(api::router(store.clone()), "/data-between?startEpoch=100001&endEpoch=200000").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(api::router(store), "/data-between?startEpoch=99999&endEpoch=100000").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn data_between_with_bad_record_is_500() {
    let store = store_with(&[(10, json!({"temperature": 20.5}))]).await;
    store
        .insert(StoredRecord { id: None, body: STANDARD.encode("not json"), ts: 11 })
        .await
        .unwrap();

    let (status, body) = get(api::router(store), "/data-between?startEpoch=0&endEpoch=20000").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal Server Error");
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn data_between_with_unreachable_store_is_500() {
    let (status, body) = get(
        api::router(unreachable_store()),
        "/data-between?startEpoch=0&endEpoch=1000",
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Internal Server Error");
}
