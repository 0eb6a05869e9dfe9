//! Integration tests for the agent API endpoints

use agent_lib::{
    collector::{JvmRegistry, SharedPressure},
    health::{Component, HealthRegistry, UNHEALTHY_AFTER},
    jvm::{GcType, JvmConfiguration, JvmVendor, ResolutionSource},
    models::{ContainerMemory, JvmSnapshot, NodePressureReport},
    node::SystemPressure,
    observability::AgentMetrics,
    oom::{OomContextCollector, OomVictim},
};
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use jvm_agent::api::{create_router, AppState};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

struct TestApp {
    router: Router,
    state: Arc<AppState>,
    _proc_root: TempDir,
}

async fn setup_test_app() -> TestApp {
    let health_registry = HealthRegistry::new();

    let proc_root = TempDir::new().unwrap();
    let state = Arc::new(AppState::new(
        health_registry,
        AgentMetrics::new(),
        Arc::new(JvmRegistry::new("node-a")),
        SharedPressure::default(),
        Arc::new(OomContextCollector::new(proc_root.path())),
    ));

    TestApp {
        router: create_router(state.clone()),
        state,
        _proc_root: proc_root,
    }
}

fn failed(message: &str) -> Result<(), String> {
    Err(message.to_string())
}

async fn fail_repeatedly(app: &TestApp, component: Component) {
    for _ in 0..UNHEALTHY_AFTER {
        app.state
            .health_registry
            .record(component, &failed("Failed to read /proc"))
            .await;
    }
}

fn snapshot(pid: u32) -> JvmSnapshot {
    JvmSnapshot {
        pid,
        process_name: "java".to_string(),
        node_name: String::new(),
        cmdline: "java -XX:MaxRAMPercentage=75 -jar orders.jar".to_string(),
        config: JvmConfiguration {
            max_heap_bytes: -1.0,
            max_heap_percentage: 75.0,
            gc_type: GcType::G1GC,
            vendor: JvmVendor::HotSpot,
            raw_extra_flags: vec!["-XX:MaxRAMPercentage=75".to_string()],
            ..Default::default()
        },
        source: ResolutionSource::Merged,
        attach_error: None,
        container: Some(ContainerMemory {
            container_id: Some("a".repeat(64)),
            cgroup_path: "/kubepods.slice/x.scope".to_string(),
            usage_bytes: 1 << 29,
            working_set_bytes: 1 << 28,
            limit_bytes: Some(1 << 30),
        }),
        perfmap_supported: false,
        first_seen: 1_700_000_000,
        last_updated: 1_700_000_030,
    }
}

async fn get(app: &TestApp, uri: &str) -> (StatusCode, String) {
    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

async fn get_json(app: &TestApp, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, body) = get(app, uri).await;
    (status, serde_json::from_str(&body).unwrap())
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let app = setup_test_app().await;

    let (status, health) = get_json(&app, "/healthz").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["discovery"].is_object());
    assert!(health["components"]["resolver"].is_object());
    assert!(health["components"]["pressure"].is_object());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let app = setup_test_app().await;
    app.state
        .health_registry
        .record(Component::Resolver, &failed("2 resolutions failed"))
        .await;

    let (status, health) = get_json(&app, "/healthz").await;

    // Degraded still returns 200 (operational)
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let app = setup_test_app().await;
    fail_repeatedly(&app, Component::Discovery).await;

    let (status, health) = get_json(&app, "/healthz").await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_registry() {
    let app = setup_test_app().await;

    let (status, readiness) = get_json(&app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(readiness["ready"], false);

    app.state.health_registry.set_ready(true).await;
    let (status, readiness) = get_json(&app, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(readiness["ready"], true);

    fail_repeatedly(&app, Component::Discovery).await;
    let (status, _) = get_json(&app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let app = setup_test_app().await;
    app.state.metrics.observe_collection_latency(0.001);
    app.state.metrics.observe_resolution_latency(0.002);
    app.state.metrics.set_jvm(&snapshot(31337));

    let response = app
        .router
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("jvm_agent_collection_latency_seconds_bucket"));
    assert!(metrics_text.contains("jvm_agent_resolution_latency_seconds_count"));
    assert!(metrics_text.contains("jvm_agent_heap_max_percentage"));
    assert!(metrics_text.contains("gc_type=\"G1GC\""));
}

#[tokio::test]
async fn test_jvm_endpoints() {
    let app = setup_test_app().await;

    let (status, jvms) = get_json(&app, "/v1/jvms").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jvms, serde_json::json!([]));

    app.state.registry.upsert(snapshot(4242));
    app.state.registry.upsert(snapshot(17));

    let (_, jvms) = get_json(&app, "/v1/jvms").await;
    let pids: Vec<u64> = jvms
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["pid"].as_u64().unwrap())
        .collect();
    assert_eq!(pids, vec![17, 4242]);

    let (status, jvm) = get_json(&app, "/v1/jvms/4242").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(jvm["node_name"], "node-a");
    assert_eq!(jvm["source"], "merged");
    assert_eq!(jvm["config"]["max_heap_bytes"], -1.0);
    assert_eq!(jvm["config"]["max_heap_percentage"], 75.0);
    assert_eq!(jvm["config"]["vendor"], "HotSpot");
    assert_eq!(jvm["container"]["limit_bytes"], 1u64 << 30);
    assert!(jvm.get("attach_error").is_none());

    let (status, error) = get_json(&app, "/v1/jvms/1").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(error["error"].as_str().unwrap().contains("1"));

    let (status, _) = get(&app, "/v1/jvms/not-a-pid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_pressure_endpoint() {
    let app = setup_test_app().await;

    let (status, _) = get_json(&app, "/v1/pressure").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let mut pressure = SystemPressure::default();
    pressure.memory.some.avg10 = 30.0;
    *app.state.pressure.write().await = Some(NodePressureReport::new("node-a", pressure, None));

    let (status, report) = get_json(&app, "/v1/pressure").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["memory_pressure_level"], "high");
    assert_eq!(report["memory_pressure_high"], true);
    assert_eq!(report["pressure"]["memory"]["some"]["avg10"], 30.0);
}

#[tokio::test]
async fn test_ooms_endpoint() {
    let app = setup_test_app().await;

    let (_, ooms) = get_json(&app, "/v1/ooms").await;
    assert_eq!(ooms, serde_json::json!([]));

    app.state
        .oom
        .record_oom(OomVictim {
            pid: 99,
            process_name: "java".to_string(),
            container_name: "orders".to_string(),
            container_mem_limit: 1 << 30,
            container_mem_usage: 1 << 30,
        })
        .await;

    let (status, ooms) = get_json(&app, "/v1/ooms").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ooms[0]["pid"], 99);
    assert_eq!(ooms[0]["oom_score"], -1);
    assert_eq!(ooms[0]["memory_pressure"], "none");
}
