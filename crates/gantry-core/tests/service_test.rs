// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service catalog and instance provisioning.

use std::sync::Arc;
use std::time::Duration;

use gantry_core::service::{InstanceState, Service, Services};
use gantry_core::store::{MemoryStore, Store};
use gantry_core::Error;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn stack() -> (Arc<dyn Store>, Services) {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let services = Services::new(Arc::clone(&store), Duration::from_millis(5));
    (store, services)
}

fn mysql(endpoint: Option<String>) -> Service {
    Service {
        name: "mysql".to_string(),
        endpoint,
        owner_teams: vec!["dba".to_string()],
        is_restricted: false,
    }
}

fn dba() -> Vec<String> {
    vec!["dba".to_string()]
}

fn consumers() -> Vec<String> {
    vec!["backend".to_string()]
}

async fn wait_for_state(
    store: &Arc<dyn Store>,
    name: &str,
    expected: InstanceState,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let instance = store.instance_by_name(name).await.unwrap().unwrap();
        if instance.state == expected {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "instance {name} stuck in {:?}",
            instance.state
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn service_creation_requires_owner_membership() {
    let (_store, services) = stack();
    let err = services
        .create_service(&mysql(None), &consumers())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    services.create_service(&mysql(None), &dba()).await.unwrap();
    let err = services
        .create_service(&mysql(None), &dba())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { .. }));
}

#[tokio::test]
async fn service_needs_owner_teams() {
    let (_store, services) = stack();
    let orphan = Service {
        name: "orphan".to_string(),
        endpoint: None,
        owner_teams: Vec::new(),
        is_restricted: false,
    };
    let err = services.create_service(&orphan, &dba()).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));
}

#[tokio::test]
async fn delete_refused_while_instances_exist() {
    let (store, services) = stack();
    services.create_service(&mysql(None), &dba()).await.unwrap();
    services
        .create_instance("my-mysql", "mysql", &consumers())
        .await
        .unwrap();

    let err = services.delete_service("mysql", &dba()).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    services
        .delete_instance("my-mysql", &consumers())
        .await
        .unwrap();
    services.delete_service("mysql", &dba()).await.unwrap();
    assert!(store.service_by_name("mysql").await.unwrap().is_none());
}

#[tokio::test]
async fn restricted_service_hidden_from_outsiders() {
    let (_store, services) = stack();
    let mut service = mysql(None);
    service.is_restricted = true;
    services.create_service(&service, &dba()).await.unwrap();

    let err = services
        .create_instance("my-mysql", "mysql", &consumers())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));

    let visible = services.list_services(&consumers()).await.unwrap();
    assert!(visible.is_empty());
    let visible = services.list_services(&dba()).await.unwrap();
    assert_eq!(visible.len(), 1);

    services
        .create_instance("own-mysql", "mysql", &dba())
        .await
        .unwrap();
}

#[tokio::test]
async fn instance_without_endpoint_runs_immediately() {
    let (store, services) = stack();
    services.create_service(&mysql(None), &dba()).await.unwrap();
    let instance = services
        .create_instance("my-mysql", "mysql", &consumers())
        .await
        .unwrap();
    assert_eq!(instance.state, InstanceState::Running);
    let _ = store;
}

#[tokio::test]
async fn provisioning_reaches_running() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/resources"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;

    let (store, services) = stack();
    services
        .create_service(&mysql(Some(server.uri())), &dba())
        .await
        .unwrap();
    let instance = services
        .create_instance("my-mysql", "mysql", &consumers())
        .await
        .unwrap();
    assert_eq!(instance.state, InstanceState::Creating);

    wait_for_state(&store, "my-mysql", InstanceState::Running).await;
}

#[tokio::test]
async fn provisioning_applies_endpoint_env() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/resources"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "DATABASE_HOST": "provisioned.example.com",
            "DATABASE_PORT": "3306",
        })))
        .mount(&server)
        .await;

    let (store, services) = stack();
    services
        .create_service(&mysql(Some(server.uri())), &dba())
        .await
        .unwrap();
    services
        .create_instance("my-mysql", "mysql", &consumers())
        .await
        .unwrap();
    wait_for_state(&store, "my-mysql", InstanceState::Running).await;

    let instance = store.instance_by_name("my-mysql").await.unwrap().unwrap();
    assert_eq!(
        instance.env.get("DATABASE_HOST").map(String::as_str),
        Some("provisioned.example.com")
    );
    assert_eq!(
        instance.env.get("DATABASE_PORT").map(String::as_str),
        Some("3306")
    );
}

#[tokio::test]
async fn provisioning_exhaustion_marks_failed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/resources"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (store, services) = stack();
    services
        .create_service(&mysql(Some(server.uri())), &dba())
        .await
        .unwrap();
    services
        .create_instance("my-mysql", "mysql", &consumers())
        .await
        .unwrap();

    wait_for_state(&store, "my-mysql", InstanceState::Failed).await;
}

#[tokio::test]
async fn destroy_failure_blocks_instance_removal() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/resources"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/resources/my-mysql"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (store, services) = stack();
    services
        .create_service(&mysql(Some(server.uri())), &dba())
        .await
        .unwrap();
    services
        .create_instance("my-mysql", "mysql", &consumers())
        .await
        .unwrap();
    wait_for_state(&store, "my-mysql", InstanceState::Running).await;

    let err = services
        .delete_instance("my-mysql", &consumers())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Endpoint(_)));
    assert!(store.instance_by_name("my-mysql").await.unwrap().is_some());
}

#[tokio::test]
async fn status_passthrough() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/resources"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/resources/my-mysql/status"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let (store, services) = stack();
    services
        .create_service(&mysql(Some(server.uri())), &dba())
        .await
        .unwrap();
    services
        .create_instance("my-mysql", "mysql", &consumers())
        .await
        .unwrap();
    wait_for_state(&store, "my-mysql", InstanceState::Running).await;

    let status = services
        .instance_status("my-mysql", &consumers())
        .await
        .unwrap();
    assert_eq!(status, "up");

    // Outsiders cannot read the status.
    let err = services
        .instance_status("my-mysql", &dba())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
}

#[tokio::test]
async fn status_body_is_reported_verbatim() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/resources"))
        .respond_with(ResponseTemplate::new(201))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/resources/my-mysql/status"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pending backup"))
        .mount(&server)
        .await;

    let (store, services) = stack();
    services
        .create_service(&mysql(Some(server.uri())), &dba())
        .await
        .unwrap();
    services
        .create_instance("my-mysql", "mysql", &consumers())
        .await
        .unwrap();
    wait_for_state(&store, "my-mysql", InstanceState::Running).await;

    let status = services
        .instance_status("my-mysql", &consumers())
        .await
        .unwrap();
    assert_eq!(status, "pending backup");
}
