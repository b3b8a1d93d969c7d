// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Application records and lifecycle orchestration.
//!
//! [`App`] is the unit of deployment: a named workload with an owning team,
//! granted teams, environment variables, units, and one router backend. The
//! [`Apps`] orchestrator performs every mutation under the per-app advisory
//! lock so concurrent operations on the same app serialize; operations on
//! different apps never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use url::Url;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::queue::RebuildQueue;
use crate::router::{Router, RouterRegistry};
use crate::store::Store;

static APP_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]{0,39}$").unwrap());

/// Oldest entries are dropped once an app's log exceeds this many lines.
const MAX_LOG_ENTRIES: usize = 100;

/// One environment variable attached to an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    /// Variable name as exposed to the workload.
    pub name: String,
    /// Variable value.
    pub value: String,
    /// Whether the value may be shown back to users.
    pub public: bool,
    /// Owning service instance, when the variable was injected by a bind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
}

/// Lifecycle status of a single unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    /// Provisioned, not yet serving.
    Building,
    /// Serving traffic.
    Started,
    /// Intentionally halted.
    Stopped,
    /// Crashed or failed a health check.
    Error,
    /// Scheduled for removal.
    Removed,
}

impl UnitStatus {
    /// Whether a unit in this status should receive routed traffic.
    pub fn routable(self) -> bool {
        matches!(self, UnitStatus::Building | UnitStatus::Started)
    }
}

/// One running (or pending) instance of an app.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    /// Stable unit identifier.
    pub id: String,
    /// Address the unit serves on.
    pub address: Url,
    /// Current lifecycle status.
    pub status: UnitStatus,
}

/// App-level lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppState {
    /// Record exists, nothing deployed yet.
    Created,
    /// Has units, none started.
    Deployed,
    /// At least one unit started.
    Running,
    /// Explicitly stopped; absorbing until restarted.
    Stopped,
    /// Faulted; absorbing until restarted.
    Error,
}

impl AppState {
    /// Whether the state machine permits moving from `self` to `to`.
    pub fn can_transition(self, to: AppState) -> bool {
        use AppState::*;
        match (self, to) {
            (Created, Deployed) => true,
            (Deployed, Running) => true,
            (Stopped, Running) => true,
            // Explicit reset clears a faulted app for redeployment.
            (Error, Created) => true,
            (_, Stopped) => true,
            (_, Error) => true,
            _ => false,
        }
    }
}

/// One line of an app's log ring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// Log text.
    pub message: String,
    /// Producer of the line (`gantry`, a unit id, ...).
    pub source: String,
    /// When the line was recorded.
    pub timestamp: DateTime<Utc>,
}

/// A deployed application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct App {
    /// Unique app name; doubles as the router backend identifier.
    pub name: String,
    /// Platform/runtime label (informational).
    pub platform: String,
    /// Team that owns the app; always present in `teams`.
    pub team_owner: String,
    /// Teams granted access, owner included.
    pub teams: Vec<String>,
    /// Custom domain names routed to the app's backend.
    #[serde(default)]
    pub cnames: Vec<String>,
    /// Environment variables keyed by name.
    #[serde(default)]
    pub env: HashMap<String, EnvVar>,
    /// Name of the router driving this app's backend.
    pub router: String,
    /// Last address advertised by the router, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
    /// Lifecycle state.
    pub state: AppState,
    /// Current units.
    #[serde(default)]
    pub units: Vec<Unit>,
    /// Bounded log ring.
    #[serde(default)]
    pub logs: Vec<LogEntry>,
}

impl App {
    /// Addresses of units that should be routed to.
    pub fn routable_addresses(&self) -> Vec<Url> {
        self.units
            .iter()
            .filter(|u| u.status.routable())
            .map(|u| u.address.clone())
            .collect()
    }

    /// Whether `team` has been granted access.
    pub fn grants(&self, team: &str) -> bool {
        self.teams.iter().any(|t| t == team)
    }

    fn transition(&mut self, to: AppState) -> Result<()> {
        if self.state == to {
            return Ok(());
        }
        if !self.state.can_transition(to) {
            return Err(Error::Conflict(format!(
                "app {} cannot go from {:?} to {:?}",
                self.name, self.state, to
            )));
        }
        self.state = to;
        Ok(())
    }

    /// Advance `Created`/`Deployed`/`Running` from the unit set. Only
    /// forward hops happen implicitly; the absorbing `Stopped` and `Error`
    /// states, and any downgrade, need an explicit operation.
    fn sync_state_from_units(&mut self) -> Result<()> {
        if matches!(self.state, AppState::Stopped | AppState::Error) {
            return Ok(());
        }
        if self.state == AppState::Created && !self.units.is_empty() {
            self.transition(AppState::Deployed)?;
        }
        if self.state == AppState::Deployed
            && self.units.iter().any(|u| u.status == UnitStatus::Started)
        {
            self.transition(AppState::Running)?;
        }
        Ok(())
    }
}

/// Orchestrates app mutations under the per-app advisory lock.
pub struct Apps {
    store: Arc<dyn Store>,
    registry: Arc<RouterRegistry>,
    queue: Arc<RebuildQueue>,
}

impl Apps {
    /// Build an orchestrator over the given store, routers, and queue.
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<RouterRegistry>,
        queue: Arc<RebuildQueue>,
    ) -> Self {
        Self {
            store,
            registry,
            queue,
        }
    }

    /// Create an app owned by `team_owner` and run the first reconciliation.
    pub async fn create(
        &self,
        name: &str,
        platform: &str,
        team_owner: &str,
        router: Option<&str>,
    ) -> Result<App> {
        if !APP_NAME_RE.is_match(name) {
            return Err(Error::validation(
                "name",
                "app name must start with a lowercase letter and contain only \
                 lowercase letters, digits, and dashes",
            ));
        }
        if self.store.team_by_name(team_owner).await?.is_none() {
            return Err(Error::not_found("team", team_owner));
        }
        let router_name = match router {
            Some(r) => {
                self.registry.get(r)?;
                r.to_string()
            }
            None => self
                .registry
                .default_name()
                .ok_or_else(|| Error::validation("router", "no router configured"))?
                .to_string(),
        };
        let app = App {
            name: name.to_string(),
            platform: platform.to_string(),
            team_owner: team_owner.to_string(),
            teams: vec![team_owner.to_string()],
            cnames: Vec::new(),
            env: HashMap::new(),
            router: router_name,
            public_ip: None,
            state: AppState::Created,
            units: Vec::new(),
            logs: Vec::new(),
        };
        self.store.insert_app(&app).await?;
        info!(app = %name, team = %team_owner, "app created");
        self.reconcile_or_enqueue(name).await;
        self.store
            .app_by_name(name)
            .await?
            .ok_or_else(|| Error::not_found("app", name))
    }

    /// Delete an app; refused while any service instance is bound to it.
    pub async fn delete(&self, name: &str) -> Result<()> {
        let owner = self.acquire(name, "delete-app").await?;
        let result = self.delete_locked(name).await;
        self.release(name, &owner).await;
        result
    }

    async fn delete_locked(&self, name: &str) -> Result<()> {
        let app = self.get(name).await?;
        let bound = self.store.instances_for_app(name).await?;
        if !bound.is_empty() {
            return Err(Error::Conflict(format!(
                "app {name} has service instances bound to it; unbind them first"
            )));
        }
        let router = self.registry.get(&app.router)?;
        match router.remove_backend(name).await {
            Ok(())
            | Err(crate::router::RouterError::BackendNotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        self.store.delete_app(name).await?;
        info!(app = %name, "app deleted");
        Ok(())
    }

    /// Grant `team` access to the app.
    pub async fn grant_team(&self, name: &str, team: &str) -> Result<()> {
        let owner = self.acquire(name, "grant-team").await?;
        let result = async {
            let mut app = self.get(name).await?;
            if self.store.team_by_name(team).await?.is_none() {
                return Err(Error::not_found("team", team));
            }
            if app.grants(team) {
                return Err(Error::Conflict(format!(
                    "team {team} already has access to app {name}"
                )));
            }
            app.teams.push(team.to_string());
            self.store.update_app(&app).await
        }
        .await;
        self.release(name, &owner).await;
        result
    }

    /// Revoke `team`'s access; revoking the owning team fails.
    pub async fn revoke_team(&self, name: &str, team: &str) -> Result<()> {
        let owner = self.acquire(name, "revoke-team").await?;
        let result = async {
            let mut app = self.get(name).await?;
            if app.team_owner == team {
                return Err(Error::Forbidden(format!(
                    "cannot revoke access from {team}, the team that owns app {name}"
                )));
            }
            let before = app.teams.len();
            app.teams.retain(|t| t != team);
            if app.teams.len() == before {
                return Err(Error::not_found("team", team));
            }
            self.store.update_app(&app).await
        }
        .await;
        self.release(name, &owner).await;
        result
    }

    /// Add a unit and reconcile routes.
    pub async fn add_unit(&self, name: &str, unit: Unit) -> Result<()> {
        let owner = self.acquire(name, "add-unit").await?;
        let result = async {
            let mut app = self.get(name).await?;
            if app.units.iter().any(|u| u.id == unit.id) {
                return Err(Error::already_exists("unit", &unit.id));
            }
            app.units.push(unit);
            app.sync_state_from_units()?;
            self.store.update_app(&app).await?;
            self.reconcile_locked(name).await;
            Ok(())
        }
        .await;
        self.release(name, &owner).await;
        result
    }

    /// Remove a unit by id and reconcile routes.
    pub async fn remove_unit(&self, name: &str, unit_id: &str) -> Result<()> {
        let owner = self.acquire(name, "remove-unit").await?;
        let result = async {
            let mut app = self.get(name).await?;
            let before = app.units.len();
            app.units.retain(|u| u.id != unit_id);
            if app.units.len() == before {
                return Err(Error::not_found("unit", unit_id));
            }
            self.store.update_app(&app).await?;
            self.reconcile_locked(name).await;
            Ok(())
        }
        .await;
        self.release(name, &owner).await;
        result
    }

    /// Update one unit's status, adjusting app state and routes.
    pub async fn set_unit_status(
        &self,
        name: &str,
        unit_id: &str,
        status: UnitStatus,
    ) -> Result<()> {
        let owner = self.acquire(name, "set-unit-status").await?;
        let result = async {
            let mut app = self.get(name).await?;
            let unit = app
                .units
                .iter_mut()
                .find(|u| u.id == unit_id)
                .ok_or_else(|| Error::not_found("unit", unit_id))?;
            unit.status = status;
            app.sync_state_from_units()?;
            self.store.update_app(&app).await?;
            self.reconcile_locked(name).await;
            Ok(())
        }
        .await;
        self.release(name, &owner).await;
        result
    }

    /// Set (or overwrite) environment variables.
    ///
    /// With `public_only`, variables currently owned by a service instance
    /// are left untouched; the binding engine passes `false`.
    pub async fn set_envs(&self, name: &str, envs: &[EnvVar], public_only: bool) -> Result<()> {
        let owner = self.acquire(name, "set-envs").await?;
        let result = async {
            let mut app = self.get(name).await?;
            for var in envs {
                if public_only {
                    if let Some(existing) = app.env.get(&var.name) {
                        if existing.instance_name.is_some() {
                            continue;
                        }
                    }
                }
                app.env.insert(var.name.clone(), var.clone());
            }
            self.store.update_app(&app).await
        }
        .await;
        self.release(name, &owner).await;
        result
    }

    /// Unset environment variables by name.
    ///
    /// With `public_only`, service-owned variables survive; only the binding
    /// engine removes those.
    pub async fn unset_envs(&self, name: &str, names: &[String], public_only: bool) -> Result<()> {
        let owner = self.acquire(name, "unset-envs").await?;
        let result = async {
            let mut app = self.get(name).await?;
            for key in names {
                if public_only {
                    if let Some(existing) = app.env.get(key) {
                        if existing.instance_name.is_some() {
                            continue;
                        }
                    }
                }
                app.env.remove(key);
            }
            self.store.update_app(&app).await
        }
        .await;
        self.release(name, &owner).await;
        result
    }

    /// Append a line to the app's bounded log ring.
    pub async fn log(&self, name: &str, message: &str, source: &str) -> Result<()> {
        let owner = self.acquire(name, "append-log").await?;
        let result = async {
            let mut app = self.get(name).await?;
            app.logs.push(LogEntry {
                message: message.to_string(),
                source: source.to_string(),
                timestamp: Utc::now(),
            });
            if app.logs.len() > MAX_LOG_ENTRIES {
                let excess = app.logs.len() - MAX_LOG_ENTRIES;
                app.logs.drain(..excess);
            }
            self.store.update_app(&app).await
        }
        .await;
        self.release(name, &owner).await;
        result
    }

    /// Record a run command against the app log. The execution transport is
    /// outside the control plane.
    pub async fn run(&self, name: &str, command: &str) -> Result<()> {
        let app = self.get(name).await?;
        if !matches!(app.state, AppState::Running | AppState::Deployed) {
            return Err(Error::PreconditionFailed(format!(
                "app {name} is not deployed"
            )));
        }
        self.log(name, &format!("run: {command}"), "gantry").await
    }

    /// Move the app into the absorbing `Stopped` state.
    pub async fn stop(&self, name: &str) -> Result<()> {
        let owner = self.acquire(name, "stop-app").await?;
        let result = async {
            let mut app = self.get(name).await?;
            app.transition(AppState::Stopped)?;
            for unit in &mut app.units {
                unit.status = UnitStatus::Stopped;
            }
            self.store.update_app(&app).await?;
            self.reconcile_locked(name).await;
            Ok(())
        }
        .await;
        self.release(name, &owner).await;
        result
    }

    /// Leave `Stopped`, restarting every unit. A faulted app must go
    /// through [`reset`](Apps::reset) first.
    pub async fn restart(&self, name: &str) -> Result<()> {
        let owner = self.acquire(name, "restart-app").await?;
        let result = async {
            let mut app = self.get(name).await?;
            for unit in &mut app.units {
                unit.status = UnitStatus::Started;
            }
            app.transition(AppState::Running)?;
            self.store.update_app(&app).await?;
            self.reconcile_locked(name).await;
            Ok(())
        }
        .await;
        self.release(name, &owner).await;
        result
    }

    /// Clear the absorbing `Error` state back to `Created` so the app can
    /// be deployed again.
    pub async fn reset(&self, name: &str) -> Result<()> {
        let owner = self.acquire(name, "reset-app").await?;
        let result = async {
            let mut app = self.get(name).await?;
            app.transition(AppState::Created)?;
            self.store.update_app(&app).await
        }
        .await;
        self.release(name, &owner).await;
        result
    }

    /// Exchange the advertised addresses of two apps on the same router.
    ///
    /// With `cname_only`, only custom domains move; otherwise only the
    /// advertised address does. The backend identifiers never change, so
    /// later reconciliations keep routing each app's own units.
    pub async fn swap(&self, name1: &str, name2: &str, cname_only: bool) -> Result<()> {
        // Lock in name order so two concurrent swaps cannot deadlock.
        let (first, second) = if name1 <= name2 {
            (name1, name2)
        } else {
            (name2, name1)
        };
        let owner1 = self.acquire(first, "swap-app").await?;
        let owner2 = match self.acquire(second, "swap-app").await {
            Ok(o) => o,
            Err(err) => {
                self.release(first, &owner1).await;
                return Err(err);
            }
        };
        let result = self.swap_locked(name1, name2, cname_only).await;
        self.release(second, &owner2).await;
        self.release(first, &owner1).await;
        result
    }

    async fn swap_locked(&self, name1: &str, name2: &str, cname_only: bool) -> Result<()> {
        let mut app1 = self.get(name1).await?;
        let mut app2 = self.get(name2).await?;
        if app1.router != app2.router {
            return Err(Error::PreconditionFailed(format!(
                "apps {name1} and {name2} use different routers"
            )));
        }
        let router = self.registry.get(&app1.router)?;
        router.swap(name1, name2, cname_only).await?;
        if cname_only {
            std::mem::swap(&mut app1.cnames, &mut app2.cnames);
        } else {
            std::mem::swap(&mut app1.public_ip, &mut app2.public_ip);
        }
        self.store.update_app(&app1).await?;
        self.store.update_app(&app2).await?;
        info!(app1 = %name1, app2 = %name2, cname_only, "apps swapped");
        Ok(())
    }

    /// Fetch an app, `NotFound` when absent.
    pub async fn get(&self, name: &str) -> Result<App> {
        self.store
            .app_by_name(name)
            .await?
            .ok_or_else(|| Error::not_found("app", name))
    }

    /// Apps visible to any of `teams`, sorted by name.
    pub async fn list_for_teams(&self, teams: &[String]) -> Result<Vec<App>> {
        self.store.apps_for_teams(teams).await
    }

    async fn acquire(&self, app: &str, reason: &str) -> Result<String> {
        let owner = Uuid::new_v4().to_string();
        if self.store.acquire_app_lock(app, &owner, reason).await? {
            Ok(owner)
        } else {
            Err(Error::Conflict(format!(
                "app {app} is locked by another operation"
            )))
        }
    }

    async fn release(&self, app: &str, owner: &str) {
        if let Err(err) = self.store.release_app_lock(app, owner).await {
            warn!(app = %app, error = %err, "failed to release app lock");
        }
    }

    /// Reconcile inline while already holding the app lock; fall back to the
    /// retry queue when the pass fails.
    async fn reconcile_locked(&self, app: &str) {
        if let Err(err) = self.queue.locked_try_now(app).await {
            warn!(app = %app, error = %err, "route rebuild failed, queueing retry");
            self.queue.enqueue(app);
        }
    }

    async fn reconcile_or_enqueue(&self, app: &str) {
        match self.queue.try_now(app).await {
            Ok(true) => {}
            Ok(false) => self.queue.enqueue(app),
            Err(err) => {
                warn!(app = %app, error = %err, "route rebuild failed, queueing retry");
                self.queue.enqueue(app);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_name_validation() {
        for ok in ["painkiller", "a", "web-2", "x1-y2-z3"] {
            assert!(APP_NAME_RE.is_match(ok), "{ok} should be valid");
        }
        for bad in ["", "1app", "App", "has_underscore", "-dash", "has space"] {
            assert!(!APP_NAME_RE.is_match(bad), "{bad} should be invalid");
        }
    }

    #[test]
    fn state_machine_arcs() {
        use AppState::*;
        assert!(Created.can_transition(Deployed));
        assert!(!Created.can_transition(Running));
        assert!(Deployed.can_transition(Running));
        // Explicit stop is reachable from anywhere.
        assert!(Created.can_transition(Stopped));
        assert!(Deployed.can_transition(Stopped));
        assert!(Running.can_transition(Stopped));
        assert!(Stopped.can_transition(Running));
        assert!(!Stopped.can_transition(Deployed));
        assert!(Running.can_transition(Error));
        // A faulted app resets to created, nothing else.
        assert!(Error.can_transition(Created));
        assert!(!Error.can_transition(Running));
        assert!(!Error.can_transition(Deployed));
        assert!(!Running.can_transition(Created));
    }

    #[test]
    fn routable_statuses() {
        assert!(UnitStatus::Building.routable());
        assert!(UnitStatus::Started.routable());
        assert!(!UnitStatus::Stopped.routable());
        assert!(!UnitStatus::Error.routable());
        assert!(!UnitStatus::Removed.routable());
    }

    #[test]
    fn sync_state_follows_units() {
        let mut app = App {
            name: "demo".into(),
            platform: "static".into(),
            team_owner: "ops".into(),
            teams: vec!["ops".into()],
            cnames: Vec::new(),
            env: HashMap::new(),
            router: "fake".into(),
            public_ip: None,
            state: AppState::Created,
            units: Vec::new(),
            logs: Vec::new(),
        };
        app.units.push(Unit {
            id: "u1".into(),
            address: Url::parse("http://10.0.0.1").unwrap(),
            status: UnitStatus::Building,
        });
        app.sync_state_from_units().unwrap();
        assert_eq!(app.state, AppState::Deployed);

        app.units[0].status = UnitStatus::Started;
        app.sync_state_from_units().unwrap();
        assert_eq!(app.state, AppState::Running);

        // Absorbing states are never left implicitly.
        app.state = AppState::Stopped;
        app.sync_state_from_units().unwrap();
        assert_eq!(app.state, AppState::Stopped);
    }
}
