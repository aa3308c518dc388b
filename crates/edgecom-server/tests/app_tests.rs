use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use edgecom_ingest::{ApiPoint, ApiResponse};
use edgecom_server::config::AppConfig;
use edgecom_server::Application;
use edgecom_shutdown::{Lifecycle, LifecyclePhase, ShutdownSignal, SignalHandler};
use edgecom_timeseries::MemoryRepository;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::net::TcpListener;

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn parse_param(params: &HashMap<String, String>, name: &str) -> Option<DateTime<Utc>> {
    let raw = params.get(name)?;
    let naive = NaiveDateTime::parse_from_str(raw, TIME_FORMAT).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

/// 上游：`available` 为 false 时总是返回 503
async fn series(
    State(available): State<bool>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    if !available {
        return (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response();
    }

    let (Some(start), Some(end)) = (parse_param(&params, "start"), parse_param(&params, "end")) else {
        return (StatusCode::BAD_REQUEST, "bad time range").into_response();
    };

    let first = (start.timestamp() + 299).div_euclid(300) * 300;
    let result = (first..end.timestamp())
        .step_by(300)
        .map(|time| ApiPoint { time, value: 1.0 })
        .collect();

    Json(ApiResponse { result }).into_response()
}

async fn spawn_upstream(available: bool) -> String {
    let app = Router::new()
        .route("/timeseries", get(series))
        .with_state(available);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://{}/timeseries", addr)
}

fn test_config(upstream_url: String) -> AppConfig {
    let mut config = AppConfig::default();
    config.server.upstream_url = upstream_url;
    config.server.grace_period_secs = 5;
    config.ingest.backfill_days = 1;
    config.ingest.fallback_hours = 1;
    config
}

struct Harness {
    addr: String,
    signals: SignalHandler,
    lifecycle: Lifecycle,
    repo: Arc<MemoryRepository>,
    running: tokio::task::JoinHandle<anyhow::Result<ShutdownSignal>>,
}

async fn start_application(config: AppConfig) -> Harness {
    let repo = Arc::new(MemoryRepository::new());
    let signals = SignalHandler::default();
    let lifecycle = Lifecycle::new();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let app = Application::new(config, repo.clone(), listener)
        .with_signal_handler(signals.clone())
        .with_lifecycle(lifecycle.clone())
        .listen_for_system_signals(false);
    let addr = format!("http://{}", app.local_addr().unwrap());

    let running = tokio::spawn(app.run());

    Harness {
        addr,
        signals,
        lifecycle,
        repo,
        running,
    }
}

#[tokio::test]
async fn test_serves_queries_until_shutdown() {
    let upstream = spawn_upstream(true).await;
    let harness = start_application(test_config(upstream)).await;

    tokio::time::timeout(
        StdDuration::from_secs(10),
        harness.lifecycle.wait_for(LifecyclePhase::Running),
    )
    .await
    .unwrap();
    assert!(!harness.repo.is_empty().await);

    let client = reqwest::Client::new();
    let end = Utc::now();
    let response = client
        .post(format!("{}/timeseries.TimeSeriesService/QueryTimeSeries", harness.addr))
        .json(&json!({
            "start": (end - Duration::hours(2)).to_rfc3339(),
            "end": end.to_rfc3339(),
            "window": "1h",
            "aggregation": "AVG",
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    let data = body["data"].as_array().unwrap();
    assert!(!data.is_empty());
    assert!(data.iter().all(|p| p["value"].as_f64() == Some(1.0)));

    let health: Value = client
        .post(format!("{}/grpc.health.v1.Health/Check", harness.addr))
        .json(&json!({ "service": "" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "SERVING");

    harness.signals.trigger_shutdown();

    let signal = tokio::time::timeout(StdDuration::from_secs(10), harness.running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(signal, ShutdownSignal::Manual);
    assert_eq!(signal.exit_code(), 0);
    assert_eq!(harness.lifecycle.phase(), LifecyclePhase::Stopped);
    assert!(harness.repo.is_closed());
}

#[tokio::test]
async fn test_backfill_failure_is_fatal() {
    let upstream = spawn_upstream(false).await;
    let harness = start_application(test_config(upstream)).await;

    let signal = tokio::time::timeout(StdDuration::from_secs(10), harness.running)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(signal, ShutdownSignal::Fatal);
    assert_eq!(signal.exit_code(), 1);
    assert_eq!(harness.lifecycle.phase(), LifecyclePhase::Stopped);
    assert!(harness.repo.is_closed());
    assert!(harness.repo.is_empty().await);
}
