// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! End-to-end API flows over the in-memory store.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use gantry_core::config::Config;
use gantry_core::router::fake::FakeRouter;
use gantry_core::router::{Router as GantryRouter, RouterRegistry};
use gantry_core::store::{MemoryStore, Store};
use gantry_server::{build_router, AppState};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_router() -> Router {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let mut registry = RouterRegistry::new();
    registry.register(
        "fake",
        Arc::new(FakeRouter::new()) as Arc<dyn GantryRouter>,
    );
    let state = AppState::new(store, Arc::new(registry), Config::default());
    build_router(state)
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, token);
    }
    let request = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, value)
}

/// Create a user, log in, and return a usable token.
async fn signup(app: &Router, email: &str) -> String {
    let (status, _) = send(
        app,
        Method::POST,
        "/users",
        None,
        Some(json!({ "email": email, "password": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send(
        app,
        Method::POST,
        &format!("/users/{email}/tokens"),
        None,
        Some(json!({ "password": "pw" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn healthz_is_open() {
    let app = test_router();
    let (status, _) = send(&app, Method::GET, "/healthz", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn requests_without_token_are_unauthorized() {
    let app = test_router();
    let (status, body) = send(&app, Method::GET, "/apps", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "you must provide a token");

    let (status, _) = send(&app, Method::GET, "/apps", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_rejects_wrong_password() {
    let app = test_router();
    signup(&app, "ada@example.com").await;
    let (status, _) = send(
        &app,
        Method::POST,
        "/users/ada@example.com/tokens",
        None,
        Some(json!({ "password": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn app_lifecycle_over_http() {
    let app = test_router();
    let token = signup(&app, "dev@example.com").await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/teams",
        Some(&token),
        Some(json!({ "name": "backend" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    // The single team is inferred as owner.
    let (status, body) = send(
        &app,
        Method::POST,
        "/apps",
        Some(&token),
        Some(json!({ "name": "web", "platform": "python" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["name"], "web");
    assert_eq!(body["team_owner"], "backend");
    assert_eq!(body["state"], "created");

    let (status, body) = send(&app, Method::GET, "/apps", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    // Env vars set over the API are public and visible in the detail view.
    let (status, _) = send(
        &app,
        Method::POST,
        "/apps/web/env",
        Some(&token),
        Some(json!({ "MY_VAR": "123" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = send(&app, Method::GET, "/apps/web", Some(&token), None).await;
    assert_eq!(body["env"]["MY_VAR"], "123");

    let (status, _) = send(&app, Method::DELETE, "/apps/web", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, Method::GET, "/apps/web", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn outsiders_get_forbidden() {
    let app = test_router();
    let owner = signup(&app, "owner@example.com").await;
    let outsider = signup(&app, "outsider@example.com").await;

    send(
        &app,
        Method::POST,
        "/teams",
        Some(&owner),
        Some(json!({ "name": "backend" })),
    )
    .await;
    send(
        &app,
        Method::POST,
        "/apps",
        Some(&owner),
        Some(json!({ "name": "web", "platform": "python" })),
    )
    .await;

    let (status, _) = send(&app, Method::GET, "/apps/web", Some(&outsider), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, Method::DELETE, "/apps/web", Some(&outsider), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // The outsider's own app list is empty, not an error.
    let (status, body) = send(&app, Method::GET, "/apps", Some(&outsider), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_app_conflicts() {
    let app = test_router();
    let token = signup(&app, "dev@example.com").await;
    send(
        &app,
        Method::POST,
        "/teams",
        Some(&token),
        Some(json!({ "name": "backend" })),
    )
    .await;

    let payload = json!({ "name": "web", "platform": "python" });
    let (status, _) = send(&app, Method::POST, "/apps", Some(&token), Some(payload.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = send(&app, Method::POST, "/apps", Some(&token), Some(payload)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn bind_without_units_maps_to_412() {
    let app = test_router();
    let token = signup(&app, "dev@example.com").await;
    send(
        &app,
        Method::POST,
        "/teams",
        Some(&token),
        Some(json!({ "name": "backend" })),
    )
    .await;
    send(
        &app,
        Method::POST,
        "/apps",
        Some(&token),
        Some(json!({ "name": "painkiller", "platform": "python" })),
    )
    .await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/services",
        Some(&token),
        Some(json!({
            "name": "mysql",
            "endpoint": "http://127.0.0.1:1",
            "owner_teams": ["backend"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &app,
        Method::POST,
        "/services/instances",
        Some(&token),
        Some(json!({ "name": "my-mysql", "service_name": "mysql" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/services/instances/my-mysql/painkiller",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
    assert_eq!(body["error"], "This app does not have an IP yet.");

    let (status, _) = send(
        &app,
        Method::DELETE,
        "/services/instances/my-mysql/painkiller",
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn team_member_management() {
    let app = test_router();
    let alice = signup(&app, "alice@example.com").await;
    signup(&app, "bob@example.com").await;

    send(
        &app,
        Method::POST,
        "/teams",
        Some(&alice),
        Some(json!({ "name": "crew" })),
    )
    .await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/teams/crew/bob@example.com",
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    // Adding twice conflicts.
    let (status, _) = send(
        &app,
        Method::PUT,
        "/teams/crew/bob@example.com",
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        Method::DELETE,
        "/teams/crew/bob@example.com",
        Some(&alice),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
