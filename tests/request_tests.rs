// tests/request_tests.rs
//
// Integration coverage for the contribution-request workflow:
// capacity limits, duplicate submissions, the status state machine,
// and the remove/re-accept cycle.

use ideaforge::{config::Config, routes, state::AppState};
use sqlx::postgres::PgPoolOptions;

async fn spawn_app() -> String {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "request_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        bind_addr: "127.0.0.1:0".to_string(),
        cors_origins: vec!["http://localhost:3000".to_string()],
    };

    let state = AppState { pool, config };
    let app = routes::create_router(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

/// Registers a fresh user and returns (token, user_id).
async fn register_and_login(client: &reqwest::Client, address: &str) -> (String, i64) {
    let username = format!("u_{}", &uuid::Uuid::new_v4().to_string()[..8]);
    let password = "password123";

    let register: serde_json::Value = client
        .post(format!("{}/api/auth/register", address))
        .json(&serde_json::json!({"username": &username, "password": password}))
        .send()
        .await
        .expect("Register failed")
        .json()
        .await
        .expect("Failed to parse register json");
    let user_id = register["id"].as_i64().expect("User id not found");

    let login: serde_json::Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({"username": &username, "password": password}))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .expect("Failed to parse login json");
    let token = login["token"].as_str().expect("Token not found").to_string();

    (token, user_id)
}

/// Creates a project with the given contributor limit, returns its id.
async fn create_project(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    max_contributors: i64,
) -> i64 {
    let response = client
        .post(format!("{}/api/projects", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "title": "Workflow fixture",
            "description": "Project used by request workflow tests",
            "difficulty": "intermediate",
            "languages": ["rust"],
            "max_contributors": max_contributors
        }))
        .send()
        .await
        .expect("Create project failed");
    assert_eq!(response.status().as_u16(), 201);

    let created: serde_json::Value = response.json().await.unwrap();
    created["id"].as_i64().expect("Project id not found")
}

/// Submits a contribution request, asserts 201, returns the request id.
async fn submit_request(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    project_id: i64,
) -> i64 {
    let response = client
        .post(format!("{}/api/projects/{}/requests", address, project_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"message": "I'd like to help"}))
        .send()
        .await
        .expect("Create request failed");
    assert_eq!(response.status().as_u16(), 201);

    let request: serde_json::Value = response.json().await.unwrap();
    assert_eq!(request["status"], "pending");
    request["id"].as_i64().expect("Request id not found")
}

async fn resolve(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    request_id: i64,
    decision: &str,
) -> reqwest::Response {
    client
        .post(format!("{}/api/requests/{}/resolve", address, request_id))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({"decision": decision}))
        .send()
        .await
        .expect("Resolve failed")
}

/// Fetches the owner's view of a project and returns its accepted_count.
async fn accepted_count(
    client: &reqwest::Client,
    address: &str,
    token: &str,
    project_id: i64,
) -> i64 {
    let mine: Vec<serde_json::Value> = client
        .get(format!("{}/api/profile/projects", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    mine.iter()
        .find(|p| p["id"].as_i64() == Some(project_id))
        .expect("Project missing from owner list")["accepted_count"]
        .as_i64()
        .expect("accepted_count missing")
}

#[tokio::test]
async fn owner_cannot_request_own_project() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register_and_login(&client, &address).await;
    let project_id = create_project(&client, &address, &owner_token, 0).await;

    let response = client
        .post(format!("{}/api/projects/{}/requests", address, project_id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .json(&serde_json::json!({"message": "Hi me"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn duplicate_request_conflicts() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register_and_login(&client, &address).await;
    let (requester_token, _) = register_and_login(&client, &address).await;
    let project_id = create_project(&client, &address, &owner_token, 0).await;

    submit_request(&client, &address, &requester_token, project_id).await;

    // Second submission while the first is still pending
    let second = client
        .post(format!("{}/api/projects/{}/requests", address, project_id))
        .header("Authorization", format!("Bearer {}", requester_token))
        .json(&serde_json::json!({"message": "Me again"}))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status().as_u16(), 409);

    // Exactly one row persisted
    let requests: Vec<serde_json::Value> = client
        .get(format!("{}/api/projects/{}/requests", address, project_id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn non_owner_cannot_resolve() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register_and_login(&client, &address).await;
    let (requester_token, _) = register_and_login(&client, &address).await;
    let (stranger_token, _) = register_and_login(&client, &address).await;
    let project_id = create_project(&client, &address, &owner_token, 0).await;
    let request_id = submit_request(&client, &address, &requester_token, project_id).await;

    let response = resolve(&client, &address, &stranger_token, request_id, "accepted").await;
    assert_eq!(response.status().as_u16(), 403);
}

// Scenario: capacity 1. X is accepted; Y may still file a request (the limit
// binds accepted, not pending, count) but accepting Y must fail.
#[tokio::test]
async fn capacity_limits_acceptance_not_requests() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register_and_login(&client, &address).await;
    let (x_token, _) = register_and_login(&client, &address).await;
    let (y_token, _) = register_and_login(&client, &address).await;
    let project_id = create_project(&client, &address, &owner_token, 1).await;

    let x_request = submit_request(&client, &address, &x_token, project_id).await;

    let accepted = resolve(&client, &address, &owner_token, x_request, "accepted").await;
    assert_eq!(accepted.status().as_u16(), 200);
    let body: serde_json::Value = accepted.json().await.unwrap();
    assert_eq!(body["status"], "accepted");
    assert_eq!(accepted_count(&client, &address, &owner_token, project_id).await, 1);

    // Y can no longer file a request against a full project.
    let y_blocked = client
        .post(format!("{}/api/projects/{}/requests", address, project_id))
        .header("Authorization", format!("Bearer {}", y_token))
        .json(&serde_json::json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(y_blocked.status().as_u16(), 409);

    // Free the slot, let Y in, fill it again, then verify acceptance of a
    // second pending request hits the capacity wall.
    let removed = client
        .post(format!("{}/api/requests/{}/remove", address, x_request))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap();
    assert_eq!(removed.status().as_u16(), 200);

    let y_request = submit_request(&client, &address, &y_token, project_id).await;

    let reaccepted = client
        .post(format!("{}/api/requests/{}/reaccept", address, x_request))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap();
    assert_eq!(reaccepted.status().as_u16(), 200);

    let over_capacity = resolve(&client, &address, &owner_token, y_request, "accepted").await;
    assert_eq!(over_capacity.status().as_u16(), 409);
    assert_eq!(accepted_count(&client, &address, &owner_token, project_id).await, 1);
}

// Two concurrent acceptances racing for a single slot: exactly one wins.
#[tokio::test]
async fn concurrent_accepts_take_only_one_slot() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register_and_login(&client, &address).await;
    let (x_token, _) = register_and_login(&client, &address).await;
    let (y_token, _) = register_and_login(&client, &address).await;
    let project_id = create_project(&client, &address, &owner_token, 1).await;

    let x_request = submit_request(&client, &address, &x_token, project_id).await;
    let y_request = submit_request(&client, &address, &y_token, project_id).await;

    let (first, second) = tokio::join!(
        resolve(&client, &address, &owner_token, x_request, "accepted"),
        resolve(&client, &address, &owner_token, y_request, "accepted"),
    );

    let mut statuses = [first.status().as_u16(), second.status().as_u16()];
    statuses.sort();
    assert_eq!(statuses, [200, 409]);
    assert_eq!(accepted_count(&client, &address, &owner_token, project_id).await, 1);
}

// Declining carries the owner's response message and leaves capacity alone.
#[tokio::test]
async fn decline_persists_response_message() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register_and_login(&client, &address).await;
    let (requester_token, _) = register_and_login(&client, &address).await;
    let project_id = create_project(&client, &address, &owner_token, 3).await;
    let request_id = submit_request(&client, &address, &requester_token, project_id).await;

    let response = client
        .post(format!("{}/api/requests/{}/resolve", address, request_id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .json(&serde_json::json!({
            "decision": "declined",
            "response_message": "Thanks, but we're looking for a different skill set."
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "declined");
    assert_eq!(
        body["response_message"],
        "Thanks, but we're looking for a different skill set."
    );
    assert_eq!(accepted_count(&client, &address, &owner_token, project_id).await, 0);

    // The requester sees the decline and the reply in their own list.
    let mine: Vec<serde_json::Value> = client
        .get(format!("{}/api/requests/mine", address))
        .header("Authorization", format!("Bearer {}", requester_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let entry = mine
        .iter()
        .find(|r| r["id"].as_i64() == Some(request_id))
        .expect("Request missing from requester list");
    assert_eq!(entry["status"], "declined");
    assert_eq!(entry["project_title"], "Workflow fixture");
}

// Remove then re-accept returns the request to accepted and restores the count.
#[tokio::test]
async fn remove_and_reaccept_round_trip() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register_and_login(&client, &address).await;
    let (requester_token, _) = register_and_login(&client, &address).await;
    let project_id = create_project(&client, &address, &owner_token, 2).await;
    let request_id = submit_request(&client, &address, &requester_token, project_id).await;

    let accepted = resolve(&client, &address, &owner_token, request_id, "accepted").await;
    assert_eq!(accepted.status().as_u16(), 200);
    assert_eq!(accepted_count(&client, &address, &owner_token, project_id).await, 1);

    let removed = client
        .post(format!("{}/api/requests/{}/remove", address, request_id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap();
    assert_eq!(removed.status().as_u16(), 200);
    let removed_body: serde_json::Value = removed.json().await.unwrap();
    assert_eq!(removed_body["status"], "removed");
    assert_eq!(accepted_count(&client, &address, &owner_token, project_id).await, 0);

    let reaccepted = client
        .post(format!("{}/api/requests/{}/reaccept", address, request_id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap();
    assert_eq!(reaccepted.status().as_u16(), 200);
    let reaccepted_body: serde_json::Value = reaccepted.json().await.unwrap();
    assert_eq!(reaccepted_body["status"], "accepted");
    assert_eq!(accepted_count(&client, &address, &owner_token, project_id).await, 1);
}

// Only pending requests can be resolved; anything else is an illegal transition.
#[tokio::test]
async fn resolve_rejects_non_pending_states() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register_and_login(&client, &address).await;
    let (requester_token, _) = register_and_login(&client, &address).await;
    let project_id = create_project(&client, &address, &owner_token, 0).await;
    let request_id = submit_request(&client, &address, &requester_token, project_id).await;

    let declined = resolve(&client, &address, &owner_token, request_id, "declined").await;
    assert_eq!(declined.status().as_u16(), 200);

    for decision in ["accepted", "declined"] {
        let retry = resolve(&client, &address, &owner_token, request_id, decision).await;
        assert_eq!(retry.status().as_u16(), 422);
    }

    // Removing a declined request is equally illegal.
    let remove = client
        .post(format!("{}/api/requests/{}/remove", address, request_id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap();
    assert_eq!(remove.status().as_u16(), 422);

    // As is re-accepting one that was never removed.
    let reaccept = client
        .post(format!("{}/api/requests/{}/reaccept", address, request_id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap();
    assert_eq!(reaccept.status().as_u16(), 422);
}

// After a decline, the requester may file a fresh request.
#[tokio::test]
async fn declined_requester_can_reapply() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register_and_login(&client, &address).await;
    let (requester_token, _) = register_and_login(&client, &address).await;
    let project_id = create_project(&client, &address, &owner_token, 0).await;
    let first = submit_request(&client, &address, &requester_token, project_id).await;

    let declined = resolve(&client, &address, &owner_token, first, "declined").await;
    assert_eq!(declined.status().as_u16(), 200);

    // The unique index only covers active statuses, so this succeeds.
    let second = submit_request(&client, &address, &requester_token, project_id).await;
    assert_ne!(first, second);
}

#[tokio::test]
async fn owner_request_list_is_private_and_joined() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register_and_login(&client, &address).await;
    let (requester_token, requester_id) = register_and_login(&client, &address).await;
    let project_id = create_project(&client, &address, &owner_token, 0).await;
    submit_request(&client, &address, &requester_token, project_id).await;

    let forbidden = client
        .get(format!("{}/api/projects/{}/requests", address, project_id))
        .header("Authorization", format!("Bearer {}", requester_token))
        .send()
        .await
        .unwrap();
    assert_eq!(forbidden.status().as_u16(), 403);

    let requests: Vec<serde_json::Value> = client
        .get(format!("{}/api/projects/{}/requests", address, project_id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0]["requester_id"], requester_id);
    assert!(requests[0]["requester_username"].is_string());
    assert_eq!(requests[0]["message"], "I'd like to help");
}

#[tokio::test]
async fn workflow_events_notify_both_sides() {
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let (owner_token, _) = register_and_login(&client, &address).await;
    let (requester_token, _) = register_and_login(&client, &address).await;
    let project_id = create_project(&client, &address, &owner_token, 0).await;
    let request_id = submit_request(&client, &address, &requester_token, project_id).await;

    let owner_feed: Vec<serde_json::Value> = client
        .get(format!("{}/api/notifications", address))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let created = owner_feed
        .iter()
        .find(|n| n["payload"]["request_id"].as_i64() == Some(request_id))
        .expect("Owner did not receive the created event");
    assert_eq!(created["event_type"], "contribution_request_created");

    let resolved = resolve(&client, &address, &owner_token, request_id, "accepted").await;
    assert_eq!(resolved.status().as_u16(), 200);

    let requester_feed: Vec<serde_json::Value> = client
        .get(format!("{}/api/notifications", address))
        .header("Authorization", format!("Bearer {}", requester_token))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let event = requester_feed
        .iter()
        .find(|n| n["payload"]["request_id"].as_i64() == Some(request_id))
        .expect("Requester did not receive the resolved event");
    assert_eq!(event["event_type"], "contribution_request_resolved");
    assert_eq!(event["payload"]["decision"], "accepted");

    // Mark it read
    let notification_id = event["id"].as_i64().unwrap();
    let read = client
        .post(format!(
            "{}/api/notifications/{}/read",
            address, notification_id
        ))
        .header("Authorization", format!("Bearer {}", requester_token))
        .send()
        .await
        .unwrap();
    assert_eq!(read.status().as_u16(), 204);

    // Another user's notification cannot be marked read.
    let not_yours = client
        .post(format!(
            "{}/api/notifications/{}/read",
            address, notification_id
        ))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap();
    assert_eq!(not_yours.status().as_u16(), 404);
}
