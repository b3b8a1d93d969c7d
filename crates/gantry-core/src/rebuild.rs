// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Route reconciliation.
//!
//! [`rebuild_routes`] drives the router toward the app's declared unit set:
//! ensure the backend exists, record its advertised address, reconcile
//! custom domains, then diff declared routable addresses against the
//! router's current routes and apply additions before removals. Routes are
//! compared by `host[:port]`, so scheme differences alone never produce
//! churn. A second pass over unchanged inputs is an empty diff.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;
use url::Url;

use crate::error::Result;
use crate::router::{self, Router, RouterError, RouterRegistry};
use crate::store::Store;

/// Route changes applied (or, in dry mode, that would be applied) by one
/// reconciliation pass. Both lists are sorted for deterministic output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildResult {
    /// Routes added.
    pub added: Vec<Url>,
    /// Routes removed.
    pub removed: Vec<Url>,
}

/// Reconcile one app's routes. Returns `Ok(None)` when the app no longer
/// exists, which callers treat as successful termination. With `dry`, the
/// backend, its advertised address, and its domains are still ensured, but
/// the route diff is only reported, not applied.
pub async fn rebuild_routes(
    store: &Arc<dyn Store>,
    registry: &RouterRegistry,
    app_name: &str,
    dry: bool,
) -> Result<Option<RebuildResult>> {
    let Some(mut app) = store.app_by_name(app_name).await? else {
        return Ok(None);
    };
    let router = registry.get(&app.router)?;

    match router.add_backend(app_name).await {
        Ok(()) | Err(RouterError::BackendExists(_)) => {}
        Err(err) => return Err(err.into()),
    }

    let address = router.addr(app_name).await?;
    if app.public_ip.as_deref() != Some(address.as_str()) {
        app.public_ip = Some(address);
        store.update_app(&app).await?;
    }

    if router.supports_cnames() {
        sync_cnames(router.as_ref(), &app).await?;
    }

    let current = match router.routes(app_name).await {
        Ok(routes) => routes,
        // The backend can disappear underneath us when the router state was
        // rebuilt externally; recover by recreating it.
        Err(RouterError::BackendNotFound(_)) => {
            match router.add_backend(app_name).await {
                Ok(()) | Err(RouterError::BackendExists(_)) => {}
                Err(err) => return Err(err.into()),
            }
            router.routes(app_name).await?
        }
        Err(err) => return Err(err.into()),
    };

    let desired: HashMap<String, Url> = app
        .routable_addresses()
        .into_iter()
        .map(|u| (router::host_key(&u), u))
        .collect();
    let present: HashMap<String, Url> = current
        .into_iter()
        .map(|u| (router::host_key(&u), u))
        .collect();

    let mut added: Vec<Url> = desired
        .iter()
        .filter(|(key, _)| !present.contains_key(*key))
        .map(|(_, url)| url.clone())
        .collect();
    let mut removed: Vec<Url> = present
        .iter()
        .filter(|(key, _)| !desired.contains_key(*key))
        .map(|(_, url)| url.clone())
        .collect();
    added.sort_by_key(Url::to_string);
    removed.sort_by_key(Url::to_string);

    if !dry {
        // Additions land before removals so the backend never drops to an
        // empty route set while healthy units exist.
        if !added.is_empty() {
            router.add_routes(app_name, &added).await?;
        }
        if !removed.is_empty() {
            router.remove_routes(app_name, &removed).await?;
        }
        if !added.is_empty() || !removed.is_empty() {
            info!(
                app = %app_name,
                added = added.len(),
                removed = removed.len(),
                "routes rebuilt"
            );
        }
    }

    Ok(Some(RebuildResult { added, removed }))
}

async fn sync_cnames(router: &dyn Router, app: &crate::app::App) -> Result<()> {
    let current = router.cnames(&app.name).await?;
    for declared in &app.cnames {
        if !current.iter().any(|c| c == declared) {
            match router.set_cname(declared, &app.name).await {
                Ok(()) | Err(RouterError::CNameExists(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }
    }
    for stale in current
        .iter()
        .filter(|c| !app.cnames.iter().any(|d| d == *c))
    {
        match router.unset_cname(stale, &app.name).await {
            Ok(()) | Err(RouterError::CNameNotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
    }
    Ok(())
}
