// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory router driver for tests and local development.
//!
//! Mirrors the observable contract of a real driver, including swap state
//! and per-host forced failures used to exercise the transactional batch
//! guarantees.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use url::Url;

use super::{Router, RouterError, RouterResult, host_key};

#[derive(Default)]
struct FakeState {
    /// Backend name to route set.
    backends: HashMap<String, Vec<Url>>,
    /// CNAME to backend name.
    cnames: HashMap<String, String>,
    /// Swap state: backend name to (counterpart, cname_only).
    swaps: HashMap<String, (String, bool)>,
    /// Host keys that fail route mutations, for failure-injection tests.
    fail_hosts: HashSet<String>,
    /// Backend name to healthcheck path.
    healthchecks: HashMap<String, String>,
}

/// In-memory [`Router`] implementation.
#[derive(Default)]
pub struct FakeRouter {
    state: Mutex<FakeState>,
}

impl FakeRouter {
    /// Create an empty fake router.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force route mutations touching `host` (a `host` or `host:port` key)
    /// to fail with `Unavailable`.
    pub fn fail_on(&self, host: &str) {
        self.state
            .lock()
            .expect("fake router poisoned")
            .fail_hosts
            .insert(host.to_string());
    }

    /// Clear a forced failure.
    pub fn clear_failure(&self, host: &str) {
        self.state
            .lock()
            .expect("fake router poisoned")
            .fail_hosts
            .remove(host);
    }

    /// Whether a backend exists. Test helper.
    pub fn has_backend(&self, name: &str) -> bool {
        self.state
            .lock()
            .expect("fake router poisoned")
            .backends
            .contains_key(name)
    }

    /// Configured healthcheck path for a backend. Test helper.
    pub fn healthcheck(&self, name: &str) -> Option<String> {
        self.state
            .lock()
            .expect("fake router poisoned")
            .healthchecks
            .get(name)
            .cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake router poisoned")
    }
}

#[async_trait]
impl Router for FakeRouter {
    fn router_type(&self) -> &'static str {
        "fake"
    }

    fn supports_cnames(&self) -> bool {
        true
    }

    async fn add_backend(&self, name: &str) -> RouterResult<()> {
        let mut state = self.lock();
        if state.backends.contains_key(name) {
            return Err(RouterError::BackendExists(name.to_string()));
        }
        state.backends.insert(name.to_string(), Vec::new());
        Ok(())
    }

    async fn remove_backend(&self, name: &str) -> RouterResult<()> {
        let mut state = self.lock();
        if state.swaps.contains_key(name) {
            return Err(RouterError::BackendSwapped(name.to_string()));
        }
        if state.backends.remove(name).is_none() {
            return Err(RouterError::BackendNotFound(name.to_string()));
        }
        state.cnames.retain(|_, backend| backend != name);
        state.healthchecks.remove(name);
        Ok(())
    }

    async fn add_route(&self, name: &str, route: &Url) -> RouterResult<()> {
        let mut state = self.lock();
        let key = host_key(route);
        if state.fail_hosts.contains(&key) {
            return Err(RouterError::Unavailable(format!("forced failure: {key}")));
        }
        let routes = state
            .backends
            .get_mut(name)
            .ok_or_else(|| RouterError::BackendNotFound(name.to_string()))?;
        if routes.iter().any(|r| host_key(r) == key) {
            return Err(RouterError::RouteExists(route.to_string()));
        }
        routes.push(route.clone());
        Ok(())
    }

    async fn remove_route(&self, name: &str, route: &Url) -> RouterResult<()> {
        let mut state = self.lock();
        let key = host_key(route);
        if state.fail_hosts.contains(&key) {
            return Err(RouterError::Unavailable(format!("forced failure: {key}")));
        }
        let routes = state
            .backends
            .get_mut(name)
            .ok_or_else(|| RouterError::BackendNotFound(name.to_string()))?;
        let before = routes.len();
        routes.retain(|r| host_key(r) != key);
        if routes.len() == before {
            return Err(RouterError::RouteNotFound(route.to_string()));
        }
        Ok(())
    }

    async fn routes(&self, name: &str) -> RouterResult<Vec<Url>> {
        let state = self.lock();
        state
            .backends
            .get(name)
            .cloned()
            .ok_or_else(|| RouterError::BackendNotFound(name.to_string()))
    }

    async fn addr(&self, name: &str) -> RouterResult<String> {
        let state = self.lock();
        if !state.backends.contains_key(name) {
            return Err(RouterError::BackendNotFound(name.to_string()));
        }
        // A full swap changes only the advertised address.
        let advertised = match state.swaps.get(name) {
            Some((other, false)) => other.as_str(),
            _ => name,
        };
        Ok(format!("{advertised}.fake-lb.gantry.test"))
    }

    async fn swap(&self, backend1: &str, backend2: &str, cname_only: bool) -> RouterResult<()> {
        let mut state = self.lock();
        for name in [backend1, backend2] {
            if !state.backends.contains_key(name) {
                return Err(RouterError::BackendNotFound(name.to_string()));
            }
        }
        match state.swaps.get(backend1).cloned() {
            // Swapping the same pair again reverts.
            Some((other, _)) if other == backend2 => {
                state.swaps.remove(backend1);
                state.swaps.remove(backend2);
            }
            Some(_) => return Err(RouterError::BackendSwapped(backend1.to_string())),
            None => {
                state
                    .swaps
                    .insert(backend1.to_string(), (backend2.to_string(), cname_only));
                state
                    .swaps
                    .insert(backend2.to_string(), (backend1.to_string(), cname_only));
            }
        }
        if cname_only {
            // Exchange CNAME ownership; doing it again on revert restores.
            for backend in state.cnames.values_mut() {
                if backend == backend1 {
                    *backend = backend2.to_string();
                } else if backend == backend2 {
                    *backend = backend1.to_string();
                }
            }
        }
        Ok(())
    }

    async fn set_cname(&self, cname: &str, name: &str) -> RouterResult<()> {
        let mut state = self.lock();
        if !state.backends.contains_key(name) {
            return Err(RouterError::BackendNotFound(name.to_string()));
        }
        if state.cnames.contains_key(cname) {
            return Err(RouterError::CNameExists(cname.to_string()));
        }
        state.cnames.insert(cname.to_string(), name.to_string());
        Ok(())
    }

    async fn unset_cname(&self, cname: &str, _name: &str) -> RouterResult<()> {
        let mut state = self.lock();
        if state.cnames.remove(cname).is_none() {
            return Err(RouterError::CNameNotFound(cname.to_string()));
        }
        Ok(())
    }

    async fn cnames(&self, name: &str) -> RouterResult<Vec<String>> {
        let state = self.lock();
        let mut found: Vec<String> = state
            .cnames
            .iter()
            .filter(|(_, backend)| backend.as_str() == name)
            .map(|(cname, _)| cname.clone())
            .collect();
        found.sort();
        Ok(found)
    }

    async fn set_healthcheck(&self, name: &str, path: &str) -> RouterResult<()> {
        let mut state = self.lock();
        if !state.backends.contains_key(name) {
            return Err(RouterError::BackendNotFound(name.to_string()));
        }
        state
            .healthchecks
            .insert(name.to_string(), path.to_string());
        Ok(())
    }
}
