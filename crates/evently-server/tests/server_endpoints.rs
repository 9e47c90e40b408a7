mod common;

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::task::JoinHandle;

use evently_server::{AppConfig, AppState, build_app, serve};

use common::{Behavior, StubProbe};

const PRINCIPAL_HEADER: &str = "x-authenticated-user";

/// Starts a server on an ephemeral port. Environment-dependent probes are
/// replaced so the aggregate is deterministic.
async fn start_server(
    cfg: AppConfig,
    extra_probe: Option<Arc<StubProbe>>,
) -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let state = AppState::from_config(&cfg).await.expect("build state");
    state.health.register(StubProbe::new("disk", Behavior::Up)).await;
    state.health.register(StubProbe::new("memory", Behavior::Up)).await;
    if let Some(probe) = extra_probe {
        state.health.register(probe).await;
    }
    let app = build_app(&cfg, state);

    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = serve(listener, app, async move {
            let _ = rx.await;
        })
        .await;
    });

    (format!("http://{addr}/api/v1"), tx, server)
}

fn unlimited() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.rate_limit.enabled = false;
    cfg
}

#[tokio::test]
async fn health_endpoints_report_aggregate_status() {
    let (base, shutdown_tx, handle) = start_server(unlimited(), None).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/health/liveness")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");

    let resp = client.get(format!("{base}/health")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "UP");
    assert_eq!(body["components"]["cache"]["status"], "UP");
    assert_eq!(body["components"]["cache"]["details"]["backend"], "memory");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["uptime"].as_str().unwrap().ends_with('s'));
    assert!(body["timestamp"].is_string());

    let resp = client.get(format!("{base}/health/readiness")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn readiness_fails_when_a_dependency_is_down() {
    let database = StubProbe::new(
        "database",
        Behavior::Down("Database ping failed: connection refused"),
    );
    let (base, shutdown_tx, handle) = start_server(unlimited(), Some(database)).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{base}/health/readiness")).send().await.unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "DOWN");
    assert_eq!(body["components"]["database"]["status"], "DOWN");

    // Liveness never consults dependencies
    let resp = client.get(format!("{base}/health/liveness")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn api_routes_are_rate_limited_per_client() {
    let mut cfg = AppConfig::default();
    cfg.rate_limit.requests = 3;
    let (base, shutdown_tx, handle) = start_server(cfg, None).await;
    let client = reqwest::Client::new();

    for remaining in (0..3).rev() {
        let resp = client.get(format!("{base}/events")).send().await.unwrap();
        assert_eq!(resp.status(), 200);
        assert_eq!(resp.headers()["x-ratelimit-limit"], "3");
        assert_eq!(
            resp.headers()["x-ratelimit-remaining"],
            remaining.to_string().as_str()
        );
    }

    let resp = client.get(format!("{base}/categories")).send().await.unwrap();
    assert_eq!(resp.status(), 429);
    assert!(resp.headers().contains_key("retry-after"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "rate_limited");

    // Health routes sit outside the quota
    let resp = client.get(format!("{base}/health/liveness")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert!(!resp.headers().contains_key("x-ratelimit-limit"));

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn event_crud_enforces_principal_and_ownership() {
    let (base, shutdown_tx, handle) = start_server(unlimited(), None).await;
    let client = reqwest::Client::new();
    let owner = uuid::Uuid::new_v4().to_string();
    let stranger = uuid::Uuid::new_v4().to_string();
    let body = json!({
        "title": "Rust meetup",
        "description": "Talks and pizza",
        "start_date": "2026-11-05T18:00:00Z",
        "end_date": "2026-11-05T21:00:00Z"
    });

    let resp = client.post(format!("{base}/events")).json(&body).send().await.unwrap();
    assert_eq!(resp.status(), 401);

    let resp = client
        .post(format!("{base}/events"))
        .header(PRINCIPAL_HEADER, &owner)
        .json(&body)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    assert!(resp.headers().contains_key("x-request-id"));
    let created: Value = resp.json().await.unwrap();
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["creator_id"], owner.as_str());

    let resp = client.get(format!("{base}/events/{id}")).send().await.unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{base}/events/search?query=meetup&page_size=5"))
        .send()
        .await
        .unwrap();
    let page: Value = resp.json().await.unwrap();
    assert_eq!(page["total_count"], 1);
    assert_eq!(page["page_size"], 5);

    let update = json!({
        "title": "Rust meetup #2",
        "start_date": "2026-11-05T18:00:00Z",
        "end_date": "2026-11-05T22:00:00Z"
    });
    let resp = client
        .put(format!("{base}/events/{id}"))
        .header(PRINCIPAL_HEADER, &stranger)
        .json(&update)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .put(format!("{base}/events/{id}"))
        .header(PRINCIPAL_HEADER, &owner)
        .json(&update)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let updated: Value = resp.json().await.unwrap();
    assert_eq!(updated["title"], "Rust meetup #2");

    let resp = client
        .delete(format!("{base}/events/{id}"))
        .header(PRINCIPAL_HEADER, &owner)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client.get(format!("{base}/events/{id}")).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let err: Value = resp.json().await.unwrap();
    assert_eq!(err["error"]["code"], "not_found");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn invalid_input_is_rejected_with_bad_request() {
    let (base, shutdown_tx, handle) = start_server(unlimited(), None).await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/events?page_size=1000"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client.get(format!("{base}/events/not-a-uuid")).send().await.unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{base}/categories"))
        .header(PRINCIPAL_HEADER, "admin")
        .json(&json!({"name": "Music"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client
        .post(format!("{base}/categories"))
        .header(PRINCIPAL_HEADER, "admin")
        .json(&json!({"name": "music"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 409);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
