//! Integration tests for the storefront HTTP surface
//!
//! Each test serves the router on an ephemeral port, backed by the in-memory
//! data backend, and talks to it over HTTP.

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use uuid::Uuid;

use raffle_storefront::cache::QueryCache;
use raffle_storefront::config::{Config, DataBackendKind};
use raffle_storefront::db::{Collection, DataClient, MemoryBackend, Operation};
use raffle_storefront::raffle::{ManagerSettings, RaffleManager};
use raffle_storefront::session::SessionHolder;
use raffle_storefront::{router, spawn_session_watcher, AppState};

const RAFFLE_ID: &str = "0b6f3c55-5d1e-4b43-9f0c-6a7e2b1c9d10";
const USER_ID: &str = "5a1c2e3d-4b5f-4a6e-8d7c-9b0a1f2e3d4c";
const USER_TOKEN: &str = "user-jwt";
const SHOP_ORIGIN: &str = "https://shop.example";

fn raffle_row(id: &str, days_left: i64) -> Value {
    json!({
        "id": id,
        "title": "Weekend in Lisbon",
        "description": "Two nights, flights included",
        "prize_image_url": null,
        "ticket_price": "25.00",
        "max_tickets": 200,
        "tickets_sold": 0,
        "start_date": (Utc::now() - Duration::days(2)).to_rfc3339(),
        "end_date": (Utc::now() + Duration::days(days_left)).to_rfc3339(),
        "status": "active",
        "prize_value": "1500.00",
        "winner_ticket_id": null,
        "created_at": Utc::now().to_rfc3339(),
        "updated_at": Utc::now().to_rfc3339()
    })
}

fn test_config() -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        supabase_url: "http://localhost:54321".to_string(),
        supabase_anon_key: "anon-key".to_string(),
        request_timeout_seconds: 5,
        query_retry_attempts: 1,
        max_tickets_per_purchase: 10,
        ticket_number_prefix: "TT".to_string(),
        cors_allowed_origin: None,
        query_cache_max_entries: 1000,
        query_cache_max_age_seconds: 300,
        data_backend: DataBackendKind::Memory,
        memory_seed_path: None,
    }
}

struct TestServer {
    base_url: String,
    backend: MemoryBackend,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(USER_TOKEN)
            .send()
            .await
            .expect("Failed to send request");
        let status = response.status().as_u16();
        (status, response.json().await.expect("Failed to parse JSON"))
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(USER_TOKEN)
            .json(&body)
            .send()
            .await
            .expect("Failed to send request");
        let status = response.status().as_u16();
        (status, response.json().await.expect("Failed to parse JSON"))
    }

    async fn post_raw(&self, path: &str, content_type: Option<&str>, body: &str) -> u16 {
        let mut request = self
            .client
            .post(self.url(path))
            .bearer_auth(USER_TOKEN)
            .body(body.to_string());
        if let Some(content_type) = content_type {
            request = request.header("content-type", content_type);
        }
        request
            .send()
            .await
            .expect("Failed to send request")
            .status()
            .as_u16()
    }

    async fn sign_in(&self) {
        let (status, _) = self
            .post(
                "/session",
                json!({"user_id": USER_ID, "access_token": USER_TOKEN, "email": "ana@example.com"}),
            )
            .await;
        assert_eq!(status, 200);
    }
}

async fn spawn_server() -> TestServer {
    spawn_server_with(test_config()).await
}

async fn spawn_server_with(config: Config) -> TestServer {
    let backend = MemoryBackend::new();
    backend.seed(Collection::Raffles, vec![raffle_row(RAFFLE_ID, 5)]);

    let session = SessionHolder::new();
    let cache = QueryCache::new(1, StdDuration::ZERO);
    let _watcher = spawn_session_watcher(&session, cache.clone());

    let raffle_manager = Arc::new(RaffleManager::new(
        DataClient::memory(backend.clone()),
        cache,
        ManagerSettings::from(&config),
    ));

    let state = Arc::new(AppState {
        raffle_manager,
        session,
        config: Arc::new(config),
    });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");

    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.expect("Server failed");
    });

    TestServer {
        base_url: format!("http://{}", addr),
        backend,
        client: reqwest::Client::builder()
            .timeout(StdDuration::from_secs(5))
            .build()
            .expect("Failed to build client"),
    }
}

#[tokio::test]
async fn test_health_check() {
    let server = spawn_server().await;

    let (status, body) = server.get("/health").await;

    assert_eq!(status, 200);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["signed_in"], false);
    assert!(body.get("timestamp").is_some());
}

#[tokio::test]
async fn test_public_config() {
    let server = spawn_server().await;

    let (status, body) = server.get("/config/public").await;

    assert_eq!(status, 200);
    assert_eq!(body["supabase_url"], "http://localhost:54321");
    assert_eq!(body["supabase_anon_key"], "anon-key");
    assert_eq!(body["max_tickets_per_purchase"], 10);
}

#[tokio::test]
async fn test_list_active_raffles() {
    let server = spawn_server().await;

    let (status, body) = server.get("/raffles").await;

    assert_eq!(status, 200);
    let raffles = body["raffles"].as_array().expect("raffles array");
    assert_eq!(raffles.len(), 1);
    assert_eq!(raffles[0]["id"], RAFFLE_ID);
    assert_eq!(raffles[0]["progress_percent"], 0.0);
    assert_eq!(raffles[0]["time_remaining"]["expired"], false);
}

#[tokio::test]
async fn test_unknown_raffle_is_404() {
    let server = spawn_server().await;

    let (status, body) = server
        .get("/raffles/00000000-0000-0000-0000-000000000000")
        .await;

    assert_eq!(status, 404);
    assert!(body.get("error").is_some());
}

#[tokio::test]
async fn test_purchase_requires_session() {
    let server = spawn_server().await;

    let (status, _) = server
        .post(&format!("/raffles/{}/purchase", RAFFLE_ID), json!({"count": 1}))
        .await;

    assert_eq!(status, 401);
    assert!(server.backend.rows(Collection::Tickets).is_empty());
}

#[tokio::test]
async fn test_purchase_then_list_my_tickets() {
    let server = spawn_server().await;

    // idle until someone signs in
    let (status, body) = server.get("/me/tickets").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "idle");

    server.sign_in().await;

    let (status, body) = server
        .post(&format!("/raffles/{}/purchase", RAFFLE_ID), json!({"count": 2}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["tickets"].as_array().map(Vec::len), Some(2));
    assert_eq!(body["total_paid"], "50.00");

    let (status, body) = server.get("/me/tickets").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ready");
    let tickets = body["data"].as_array().expect("tickets array");
    assert_eq!(tickets.len(), 2);
    assert_eq!(tickets[0]["raffles"]["id"], RAFFLE_ID);

    let (_, raffle) = server.get(&format!("/raffles/{}", RAFFLE_ID)).await;
    assert_eq!(raffle["tickets_sold"], 2);

    let (status, summary) = server.get("/me/tickets/summary").await;
    assert_eq!(status, 200);
    assert_eq!(summary["total"], 2);
    assert_eq!(summary["in_active_raffles"], 2);
}

#[tokio::test]
async fn test_partial_purchase_reports_progress() {
    let server = spawn_server().await;
    server.sign_in().await;
    server
        .backend
        .fail_after(Operation::Insert(Collection::Tickets), 1, 500, "insert failed");

    let (status, body) = server
        .post(&format!("/raffles/{}/purchase", RAFFLE_ID), json!({"count": 3}))
        .await;

    assert_eq!(status, 502);
    assert_eq!(body["purchased"], 1);
    assert_eq!(body["requested"], 3);
    assert_eq!(server.backend.rows(Collection::Tickets).len(), 1);
}

#[tokio::test]
async fn test_purchase_count_is_bounded() {
    let server = spawn_server().await;
    server.sign_in().await;

    let (status, _) = server
        .post(&format!("/raffles/{}/purchase", RAFFLE_ID), json!({"count": 11}))
        .await;

    assert_eq!(status, 400);
    assert!(server.backend.rows(Collection::Tickets).is_empty());
}

#[tokio::test]
async fn test_sign_out_clears_session() {
    let server = spawn_server().await;
    server.sign_in().await;

    let (_, body) = server.get("/session").await;
    assert_eq!(body["signed_in"], true);
    assert_eq!(body["user_id"], USER_ID);

    let response = server
        .client
        .delete(server.url("/session"))
        .bearer_auth(USER_TOKEN)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), 200);

    let (_, body) = server.get("/me/profile").await;
    assert_eq!(body["status"], "idle");

    let (status, _) = server.get("/me/tickets/summary").await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn test_malformed_purchase_body_is_rejected() {
    let server = spawn_server().await;
    server.sign_in().await;
    let path = format!("/raffles/{}/purchase", RAFFLE_ID);

    for body in [r#"{"count": -1}"#, r#"{"count": "3"}"#] {
        let status = server.post_raw(&path, Some("application/json"), body).await;
        assert_eq!(status, 400, "body {}", body);
    }

    let status = server.post_raw(&path, None, r#"{"count": 3}"#).await;
    assert_eq!(status, 400);

    assert!(server.backend.rows(Collection::Tickets).is_empty());
}

#[tokio::test]
async fn test_empty_purchase_body_buys_one_ticket() {
    let server = spawn_server().await;
    server.sign_in().await;

    let status = server
        .post_raw(&format!("/raffles/{}/purchase", RAFFLE_ID), None, "")
        .await;

    assert_eq!(status, 200);
    assert_eq!(server.backend.rows(Collection::Tickets).len(), 1);
}

#[tokio::test]
async fn test_session_token_required_once_signed_in() {
    let server = spawn_server().await;
    server.sign_in().await;
    let purchase_url = server.url(&format!("/raffles/{}/purchase", RAFFLE_ID));

    let anonymous = server
        .client
        .post(&purchase_url)
        .header("origin", "https://evil.example")
        .json(&json!({"count": 10}))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(anonymous.status(), 401);

    let wrong_token = server
        .client
        .post(&purchase_url)
        .bearer_auth("someone-elses-token")
        .json(&json!({"count": 10}))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(wrong_token.status(), 401);

    for path in ["/me/tickets", "/me/profile", "/me/tickets/summary", "/session"] {
        let response = server
            .client
            .get(server.url(path))
            .send()
            .await
            .expect("Failed to send request");
        assert_eq!(response.status(), 401, "{} without token", path);
    }

    // nobody else can replace or end the session either
    let takeover = server
        .client
        .post(server.url("/session"))
        .json(&json!({"user_id": Uuid::new_v4(), "access_token": "intruder"}))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(takeover.status(), 401);

    let sign_out = server
        .client
        .delete(server.url("/session"))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(sign_out.status(), 401);

    assert!(server.backend.rows(Collection::Tickets).is_empty());
    let (_, body) = server.get("/session").await;
    assert_eq!(body["user_id"], USER_ID);
}

#[tokio::test]
async fn test_cors_allows_only_configured_origin() {
    let server = spawn_server_with(Config {
        cors_allowed_origin: Some(SHOP_ORIGIN.to_string()),
        ..test_config()
    })
    .await;

    let foreign = server
        .client
        .get(server.url("/raffles"))
        .header("origin", "https://evil.example")
        .send()
        .await
        .expect("Failed to send request");
    assert!(foreign.headers().get("access-control-allow-origin").is_none());

    let preflight = server
        .client
        .request(reqwest::Method::OPTIONS, server.url(&format!("/raffles/{}/purchase", RAFFLE_ID)))
        .header("origin", SHOP_ORIGIN)
        .header("access-control-request-method", "POST")
        .header("access-control-request-headers", "authorization,content-type")
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(
        preflight
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some(SHOP_ORIGIN)
    );
}
