// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared handler state.

use std::sync::Arc;

use gantry_core::app::Apps;
use gantry_core::auth::Identity;
use gantry_core::config::Config;
use gantry_core::queue::RebuildQueue;
use gantry_core::router::RouterRegistry;
use gantry_core::service::bind::Binder;
use gantry_core::service::Services;
use gantry_core::store::Store;

/// Everything the HTTP handlers need, cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    /// Persistent store.
    pub store: Arc<dyn Store>,
    /// Users, teams, and tokens.
    pub identity: Arc<Identity>,
    /// App lifecycle orchestrator.
    pub apps: Arc<Apps>,
    /// Service catalog and instance provisioning.
    pub services: Arc<Services>,
    /// Binding engine.
    pub binder: Arc<Binder>,
    /// Route rebuild queue.
    pub queue: Arc<RebuildQueue>,
}

impl AppState {
    /// Wire up the full control plane over `store` and `registry`.
    pub fn new(store: Arc<dyn Store>, registry: Arc<RouterRegistry>, config: Config) -> Self {
        let queue = RebuildQueue::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            config.queue_retry_interval,
        );
        let identity = Arc::new(Identity::new(Arc::clone(&store), config.clone()));
        let apps = Arc::new(Apps::new(
            Arc::clone(&store),
            registry,
            Arc::clone(&queue),
        ));
        let services = Arc::new(Services::new(
            Arc::clone(&store),
            config.queue_retry_interval,
        ));
        let binder = Arc::new(Binder::new(Arc::clone(&store), Arc::clone(&apps)));
        Self {
            store,
            identity,
            apps,
            services,
            binder,
            queue,
        }
    }
}
