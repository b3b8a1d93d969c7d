// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Router adapter: a uniform interface over external traffic routers.
//!
//! A router holds one backend per application; each backend carries a set
//! of routes (unit URLs) and optionally CNAMEs. Drivers implement the
//! [`Router`] trait; the in-memory [`fake::FakeRouter`] backs tests and
//! the `fake` config type, [`api::ApiRouter`] drives an external L4
//! load-balancer agent over HTTP.

pub mod api;
pub mod fake;

pub use self::api::ApiRouter;
pub use self::fake::FakeRouter;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::warn;
use url::Url;

use crate::config::RouterConfig;

/// Errors from router drivers.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RouterError {
    /// The backend is already provisioned.
    #[error("Backend already exists: {0}")]
    BackendExists(String),

    /// No backend with the given name.
    #[error("Backend not found: {0}")]
    BackendNotFound(String),

    /// The backend is currently swapped with another and cannot be removed.
    #[error("Backend is swapped cannot remove: {0}")]
    BackendSwapped(String),

    /// The route is already present on the backend.
    #[error("Route already exists: {0}")]
    RouteExists(String),

    /// The route is not present on the backend.
    #[error("Route not found: {0}")]
    RouteNotFound(String),

    /// The CNAME is already set.
    #[error("CNAME already exists: {0}")]
    CNameExists(String),

    /// The CNAME is not set.
    #[error("CNAME not found: {0}")]
    CNameNotFound(String),

    /// The driver does not implement an optional capability.
    #[error("Router does not support {0}")]
    NotSupported(&'static str),

    /// Transport-level failure (timeout, 5xx, connection refused). Retryable.
    #[error("Router unavailable: {0}")]
    Unavailable(String),
}

/// Result type for router operations.
pub type RouterResult<T> = std::result::Result<T, RouterError>;

/// Driver interface for an external router.
///
/// Batch operations are transactional: on the first error, changes already
/// applied within the call are undone before the error returns. Duplicates
/// against current state are skipped on add and ignored on remove.
#[async_trait]
pub trait Router: Send + Sync {
    /// Driver type identifier (e.g. "fake", "api").
    fn router_type(&self) -> &'static str;

    /// Whether the driver implements the CNAME capability.
    fn supports_cnames(&self) -> bool {
        false
    }

    /// Create the backend; `BackendExists` if already provisioned.
    async fn add_backend(&self, name: &str) -> RouterResult<()>;

    /// Create the backend with driver-specific options.
    ///
    /// The default ignores the options and delegates to [`add_backend`].
    ///
    /// [`add_backend`]: Router::add_backend
    async fn add_backend_opts(
        &self,
        name: &str,
        _opts: &HashMap<String, String>,
    ) -> RouterResult<()> {
        self.add_backend(name).await
    }

    /// Remove the backend. `BackendNotFound` when absent, `BackendSwapped`
    /// while the backend is swapped.
    async fn remove_backend(&self, name: &str) -> RouterResult<()>;

    /// Add one route; `RouteExists` on conflict.
    async fn add_route(&self, name: &str, route: &Url) -> RouterResult<()>;

    /// Remove one route; `RouteNotFound` when absent.
    async fn remove_route(&self, name: &str, route: &Url) -> RouterResult<()>;

    /// Transactional batch add. Duplicates are skipped.
    async fn add_routes(&self, name: &str, routes: &[Url]) -> RouterResult<()> {
        let mut applied: Vec<&Url> = Vec::with_capacity(routes.len());
        for route in routes {
            match self.add_route(name, route).await {
                Ok(()) => applied.push(route),
                Err(RouterError::RouteExists(_)) => {}
                Err(err) => {
                    for done in applied.into_iter().rev() {
                        if let Err(undo_err) = self.remove_route(name, done).await {
                            warn!(backend = name, route = %done, error = %undo_err,
                                "Failed to undo route addition after batch failure");
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Transactional batch remove. Missing routes are ignored.
    async fn remove_routes(&self, name: &str, routes: &[Url]) -> RouterResult<()> {
        let mut removed: Vec<&Url> = Vec::with_capacity(routes.len());
        for route in routes {
            match self.remove_route(name, route).await {
                Ok(()) => removed.push(route),
                Err(RouterError::RouteNotFound(_)) => {}
                Err(err) => {
                    for done in removed.into_iter().rev() {
                        if let Err(undo_err) = self.add_route(name, done).await {
                            warn!(backend = name, route = %done, error = %undo_err,
                                "Failed to undo route removal after batch failure");
                        }
                    }
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Current route set. Order is unspecified.
    async fn routes(&self, name: &str) -> RouterResult<Vec<Url>>;

    /// Stable public address advertised for the backend.
    async fn addr(&self, name: &str) -> RouterResult<String>;

    /// Atomically exchange the advertised addresses of two backends
    /// (or only their CNAMEs when `cname_only`). Swapping again reverts.
    ///
    /// The backend identifier survives the swap; only the externally
    /// advertised address changes.
    async fn swap(&self, backend1: &str, backend2: &str, cname_only: bool) -> RouterResult<()>;

    /// Point `cname` at the backend; `CNameExists` if already set.
    async fn set_cname(&self, _cname: &str, _name: &str) -> RouterResult<()> {
        Err(RouterError::NotSupported("cnames"))
    }

    /// Remove `cname`; `CNameNotFound` when absent.
    async fn unset_cname(&self, _cname: &str, _name: &str) -> RouterResult<()> {
        Err(RouterError::NotSupported("cnames"))
    }

    /// CNAMEs currently pointing at the backend.
    async fn cnames(&self, _name: &str) -> RouterResult<Vec<String>> {
        Err(RouterError::NotSupported("cnames"))
    }

    /// Configure the backend healthcheck path. Optional; default no-op.
    async fn set_healthcheck(&self, _name: &str, _path: &str) -> RouterResult<()> {
        Ok(())
    }
}

/// Named router drivers available to applications.
#[derive(Clone, Default)]
pub struct RouterRegistry {
    routers: HashMap<String, Arc<dyn Router>>,
    default_name: Option<String>,
}

impl RouterRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from declarative configuration.
    ///
    /// The first configured router (by name order) becomes the default.
    pub fn from_configs(configs: &[RouterConfig]) -> crate::error::Result<Self> {
        let mut registry = Self::new();
        for config in configs {
            let driver: Arc<dyn Router> = match config.kind.as_str() {
                "fake" => Arc::new(FakeRouter::new()),
                "api" => {
                    let url = config.url.as_deref().ok_or_else(|| {
                        crate::error::Error::Internal(format!(
                            "router {:?} has no agent URL",
                            config.name
                        ))
                    })?;
                    Arc::new(ApiRouter::new(url))
                }
                other => {
                    return Err(crate::error::Error::Internal(format!(
                        "unknown router type {other:?}"
                    )));
                }
            };
            registry.register(&config.name, driver);
        }
        Ok(registry)
    }

    /// Register a driver under a name. The first registration becomes the
    /// default router.
    pub fn register(&mut self, name: &str, router: Arc<dyn Router>) {
        if self.default_name.is_none() {
            self.default_name = Some(name.to_string());
        }
        self.routers.insert(name.to_string(), router);
    }

    /// Look up a driver by name.
    pub fn get(&self, name: &str) -> crate::error::Result<Arc<dyn Router>> {
        self.routers
            .get(name)
            .cloned()
            .ok_or_else(|| crate::error::Error::not_found("router", name))
    }

    /// Name of the default router, if any is registered.
    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }
}

/// Host key used for route equality: normalized `host` or `host:port`.
///
/// Scheme is preserved on the declared URL but ignored for comparison.
pub fn host_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    }
}
