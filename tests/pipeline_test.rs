//! end to end over real sockets: simulator readings -> http sink -> ingest
//! node -> remote store -> query backend -> dashboard client.

use std::sync::Arc;

use axum::Router;
use chrono::{Duration, TimeZone, Utc};
use serde_json::json;
use tokio::net::TcpListener;

use telemetry_dashboard::api;
use telemetry_dashboard::dashboard::{Dashboard, DashboardError};
use telemetry_dashboard::domain::{StoredRecord, HUMIDITY_SERIES, PRESSURE_SERIES, TEMPERATURE_SERIES};
use telemetry_dashboard::ingest;
use telemetry_dashboard::simulator::SimulatorState;
use telemetry_dashboard::sink::{HttpSink, MessageSink};
use telemetry_dashboard::store::{self, MemoryStore, RecordStore};

async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn readings_flow_from_simulator_to_dashboard() {
    // hub: ingest node over an in-memory store
    let hub_store = Arc::new(MemoryStore::new());
    let hub_url = spawn(ingest::router(hub_store.clone(), "output1")).await;

    // backend reads the hub's store remotely
    let remote = store::connect(&hub_url).unwrap();
    let backend_url = spawn(api::router(remote)).await;

    // publish a handful of simulated readings
    let sink = HttpSink::connect(&hub_url).await.unwrap();
    let mut state = SimulatorState::default();
    let start = Utc.with_ymd_and_hms(2024, 11, 15, 10, 0, 0).unwrap();
    for n in 0..25 {
        let reading = state.tick("sensor1", start + Duration::seconds(25 * n));
        sink.send_output_event("output1", reading.to_payload().unwrap())
            .await
            .unwrap();
    }
    assert_eq!(hub_store.len().await, 25);

    // a channel nobody routes is rejected by the hub
    assert!(sink.send_output_event("output2", b"{}".to_vec()).await.is_err());

    let mut dashboard = Dashboard::new(&backend_url, 20).unwrap();
    let latest = dashboard.poll_latest().await.unwrap();
    // ingestion seconds collide; ties go to the last insert
    assert_eq!(latest.temperature, 32.5);
    assert_eq!(dashboard.live().series()[0].data.len(), 1);

    // history over the whole ingestion window
    let now_ms = Utc::now().timestamp_millis();
    let series = dashboard
        .fetch_history_ms(now_ms - 60_000, now_ms + 60_000)
        .await
        .unwrap()
        .to_vec();
    let names: Vec<&str> = series.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec![TEMPERATURE_SERIES, PRESSURE_SERIES, HUMIDITY_SERIES]);
    for s in &series {
        assert_eq!(s.data.len(), 25);
    }
    assert_eq!(series[0].data[0].0, start.timestamp_millis());
    assert_eq!(series[0].data[0].1.as_f64(), Some(20.5));
    assert_eq!(dashboard.history().len(), 3);
}

fn record(ts: i64, reading: serde_json::Value) -> StoredRecord {
    StoredRecord::from_payload(reading.to_string().as_bytes(), ts)
}

#[tokio::test]
async fn failed_fetches_keep_previous_chart_state() {
    let store = Arc::new(MemoryStore::new());
    for (ts, temperature) in [(1_000, 20.5), (1_025, 21.0)] {
        let reading = json!({
            "temperature": temperature,
            "humidity": 49.8,
            "pressure": 1010.1,
            "timestamp": Utc.timestamp_opt(ts, 0).unwrap().to_rfc3339(),
        });
        store.insert(record(ts, reading)).await.unwrap();
    }
    let backend_url = spawn(api::router(store.clone())).await;
    let mut dashboard = Dashboard::new(&backend_url, 20).unwrap();

    dashboard.poll_latest().await.unwrap();
    dashboard.fetch_history_ms(1_000_000, 1_025_000).await.unwrap();
    let live_before = dashboard.live().series().to_vec();
    let history_before = dashboard.history().to_vec();
    assert_eq!(live_before[0].data.len(), 1);
    assert_eq!(history_before[0].data.len(), 2);

    // 404: empty range
    assert!(matches!(
        dashboard.fetch_history_ms(0, 1_000).await,
        Err(DashboardError::Status(404))
    ));
    assert_eq!(dashboard.history(), history_before.as_slice());

    // 500: an undecodable record is now both the latest and inside the range
    store
        .insert(StoredRecord { id: None, body: "%%%".into(), ts: 1_030 })
        .await
        .unwrap();
    assert!(matches!(
        dashboard.fetch_history_ms(1_000_000, 1_030_000).await,
        Err(DashboardError::Status(500))
    ));
    assert!(matches!(dashboard.poll_latest().await, Err(DashboardError::Status(500))));

    assert_eq!(dashboard.history(), history_before.as_slice());
    assert_eq!(dashboard.live().series(), live_before.as_slice());
    assert_eq!(dashboard.live().latest().map(|r| r.temperature), Some(21.0));
}

#[tokio::test]
async fn nothing_ingested_leaves_dashboard_empty() {
    let backend_url = spawn(api::router(Arc::new(MemoryStore::new()))).await;
    let mut dashboard = Dashboard::new(&backend_url, 20).unwrap();

    assert!(dashboard.poll_latest().await.is_err());
    assert!(dashboard.fetch_history_ms(0, 1_000).await.is_err());
    assert!(dashboard.history().is_empty());
    assert!(dashboard.live().latest().is_none());
}
