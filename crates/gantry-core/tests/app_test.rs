// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! App lifecycle orchestration over the in-memory store and fake router.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gantry_core::app::{AppState, Apps, EnvVar, Unit, UnitStatus};
use gantry_core::auth::Team;
use gantry_core::queue::RebuildQueue;
use gantry_core::router::fake::FakeRouter;
use gantry_core::router::{Router, RouterRegistry};
use gantry_core::service::{InstanceState, ServiceInstance};
use gantry_core::store::{MemoryStore, Store};
use gantry_core::Error;
use url::Url;

struct Harness {
    store: Arc<dyn Store>,
    router: Arc<FakeRouter>,
    apps: Apps,
}

async fn harness() -> Harness {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let router = Arc::new(FakeRouter::new());
    let mut registry = RouterRegistry::new();
    registry.register("fake", Arc::clone(&router) as Arc<dyn Router>);
    let registry = Arc::new(registry);
    let queue = RebuildQueue::new(
        Arc::clone(&store),
        Arc::clone(&registry),
        Duration::from_millis(10),
    );
    let apps = Apps::new(Arc::clone(&store), registry, queue);
    store
        .insert_team(&Team {
            name: "ops".to_string(),
            users: vec!["op@example.com".to_string()],
        })
        .await
        .unwrap();
    Harness {
        store,
        router,
        apps,
    }
}

fn unit(id: &str, addr: &str) -> Unit {
    Unit {
        id: id.to_string(),
        address: Url::parse(addr).unwrap(),
        status: UnitStatus::Started,
    }
}

#[tokio::test]
async fn create_provisions_backend() {
    let h = harness().await;
    let app = h.apps.create("web", "python", "ops", None).await.unwrap();
    assert_eq!(app.state, AppState::Created);
    assert_eq!(app.teams, vec!["ops".to_string()]);
    assert_eq!(app.router, "fake");
    assert!(h.router.has_backend("web"));
    assert_eq!(app.public_ip.as_deref(), Some("web.fake-lb.gantry.test"));
}

#[tokio::test]
async fn create_rejects_bad_input() {
    let h = harness().await;
    let err = h.apps.create("Bad_Name", "python", "ops", None).await.unwrap_err();
    assert!(matches!(err, Error::Validation { .. }));

    let err = h.apps.create("web", "python", "ghosts", None).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    h.apps.create("web", "python", "ops", None).await.unwrap();
    let err = h.apps.create("web", "python", "ops", None).await.unwrap_err();
    assert!(matches!(err, Error::AlreadyExists { .. }));

    let err = h.apps.create("other", "python", "ops", Some("nginx")).await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn units_drive_state_and_routes() {
    let h = harness().await;
    h.apps.create("web", "python", "ops", None).await.unwrap();

    let mut building = unit("u1", "http://10.0.0.1");
    building.status = UnitStatus::Building;
    h.apps.add_unit("web", building).await.unwrap();
    let app = h.apps.get("web").await.unwrap();
    assert_eq!(app.state, AppState::Deployed);

    h.apps
        .set_unit_status("web", "u1", UnitStatus::Started)
        .await
        .unwrap();
    let app = h.apps.get("web").await.unwrap();
    assert_eq!(app.state, AppState::Running);

    h.apps.add_unit("web", unit("u2", "http://10.0.0.2")).await.unwrap();
    let routes = h.router.routes("web").await.unwrap();
    assert_eq!(routes.len(), 2);

    h.apps.remove_unit("web", "u2").await.unwrap();
    let routes = h.router.routes("web").await.unwrap();
    assert_eq!(routes.len(), 1);

    let err = h.apps.remove_unit("web", "u9").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn stop_and_restart() {
    let h = harness().await;
    h.apps.create("web", "python", "ops", None).await.unwrap();
    h.apps.add_unit("web", unit("u1", "http://10.0.0.1")).await.unwrap();

    h.apps.stop("web").await.unwrap();
    let app = h.apps.get("web").await.unwrap();
    assert_eq!(app.state, AppState::Stopped);
    // Stopped units are not routable.
    assert!(h.router.routes("web").await.unwrap().is_empty());

    h.apps.restart("web").await.unwrap();
    let app = h.apps.get("web").await.unwrap();
    assert_eq!(app.state, AppState::Running);
    assert_eq!(h.router.routes("web").await.unwrap().len(), 1);
}

#[tokio::test]
async fn delete_refused_while_bound() {
    let h = harness().await;
    h.apps.create("web", "python", "ops", None).await.unwrap();
    h.store
        .insert_instance(&ServiceInstance {
            name: "my-mysql".to_string(),
            service_name: "mysql".to_string(),
            apps: vec!["web".to_string()],
            teams: vec!["ops".to_string()],
            env: HashMap::new(),
            state: InstanceState::Running,
        })
        .await
        .unwrap();

    let err = h.apps.delete("web").await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    h.store.delete_instance("my-mysql").await.unwrap();
    h.apps.delete("web").await.unwrap();
    assert!(!h.router.has_backend("web"));
    assert!(h.store.app_by_name("web").await.unwrap().is_none());
}

#[tokio::test]
async fn grant_and_revoke_teams() {
    let h = harness().await;
    h.store
        .insert_team(&Team {
            name: "qa".to_string(),
            users: vec![],
        })
        .await
        .unwrap();
    h.apps.create("web", "python", "ops", None).await.unwrap();

    h.apps.grant_team("web", "qa").await.unwrap();
    let err = h.apps.grant_team("web", "qa").await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));
    let err = h.apps.grant_team("web", "ghosts").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));

    let err = h.apps.revoke_team("web", "ops").await.unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)));
    h.apps.revoke_team("web", "qa").await.unwrap();
    let err = h.apps.revoke_team("web", "qa").await.unwrap_err();
    assert!(matches!(err, Error::NotFound { .. }));
}

#[tokio::test]
async fn public_only_env_rules() {
    let h = harness().await;
    h.apps.create("web", "python", "ops", None).await.unwrap();

    // A service-owned variable, as the binding engine writes it.
    h.apps
        .set_envs(
            "web",
            &[EnvVar {
                name: "DATABASE_HOST".to_string(),
                value: "db".to_string(),
                public: false,
                instance_name: Some("my-mysql".to_string()),
            }],
            false,
        )
        .await
        .unwrap();

    // A user cannot overwrite or unset it through the public surface.
    h.apps
        .set_envs(
            "web",
            &[
                EnvVar {
                    name: "DATABASE_HOST".to_string(),
                    value: "hijacked".to_string(),
                    public: true,
                    instance_name: None,
                },
                EnvVar {
                    name: "MY_VAR".to_string(),
                    value: "123".to_string(),
                    public: true,
                    instance_name: None,
                },
            ],
            true,
        )
        .await
        .unwrap();
    h.apps
        .unset_envs("web", &["DATABASE_HOST".to_string()], true)
        .await
        .unwrap();

    let app = h.apps.get("web").await.unwrap();
    assert_eq!(app.env.get("DATABASE_HOST").unwrap().value, "db");
    assert_eq!(app.env.get("MY_VAR").unwrap().value, "123");

    // The binding engine can remove it.
    h.apps
        .unset_envs("web", &["DATABASE_HOST".to_string()], false)
        .await
        .unwrap();
    let app = h.apps.get("web").await.unwrap();
    assert!(app.env.get("DATABASE_HOST").is_none());
}

#[tokio::test]
async fn mutations_respect_the_app_lock() {
    let h = harness().await;
    h.apps.create("web", "python", "ops", None).await.unwrap();

    assert!(
        h.store
            .acquire_app_lock("web", "someone-else", "deploy")
            .await
            .unwrap()
    );
    let err = h
        .apps
        .set_envs(
            "web",
            &[EnvVar {
                name: "X".to_string(),
                value: "1".to_string(),
                public: true,
                instance_name: None,
            }],
            true,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    // Log appends rewrite the whole document, so they queue up behind the
    // lock like any other mutation.
    let err = h.apps.log("web", "deploy started", "gantry").await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    h.store.release_app_lock("web", "someone-else").await.unwrap();
    h.apps
        .set_envs(
            "web",
            &[EnvVar {
                name: "X".to_string(),
                value: "1".to_string(),
                public: true,
                instance_name: None,
            }],
            true,
        )
        .await
        .unwrap();
    // The operation releases its own lock on the way out.
    assert!(h.store.app_lock("web").await.unwrap().is_none());
}

#[tokio::test]
async fn faulted_app_resets_to_created() {
    let h = harness().await;
    h.apps.create("web", "python", "ops", None).await.unwrap();
    let mut app = h.apps.get("web").await.unwrap();
    app.state = AppState::Error;
    h.store.update_app(&app).await.unwrap();

    // No restart out of the faulted state; only an explicit reset.
    let err = h.apps.restart("web").await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    h.apps.reset("web").await.unwrap();
    assert_eq!(h.apps.get("web").await.unwrap().state, AppState::Created);

    h.apps.add_unit("web", unit("u1", "http://10.0.0.1")).await.unwrap();
    assert_eq!(h.apps.get("web").await.unwrap().state, AppState::Running);
}

#[tokio::test]
async fn swap_exchanges_addresses_only() {
    let h = harness().await;
    h.apps.create("blue", "python", "ops", None).await.unwrap();
    h.apps.create("green", "python", "ops", None).await.unwrap();
    h.apps.add_unit("blue", unit("b1", "http://10.0.1.1")).await.unwrap();
    h.apps.add_unit("green", unit("g1", "http://10.0.2.1")).await.unwrap();

    h.apps.swap("blue", "green", false).await.unwrap();

    let blue = h.apps.get("blue").await.unwrap();
    let green = h.apps.get("green").await.unwrap();
    assert_eq!(blue.public_ip.as_deref(), Some("green.fake-lb.gantry.test"));
    assert_eq!(green.public_ip.as_deref(), Some("blue.fake-lb.gantry.test"));

    // Unit routes stay with their own backends.
    let blue_routes = h.router.routes("blue").await.unwrap();
    assert_eq!(blue_routes[0].host_str(), Some("10.0.1.1"));
    // Locks taken for the swap are both released.
    assert!(h.store.app_lock("blue").await.unwrap().is_none());
    assert!(h.store.app_lock("green").await.unwrap().is_none());
}
