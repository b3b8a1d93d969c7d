// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persistence interfaces and backends for gantry-core.
//!
//! The [`Store`] trait is the only component permitted to mutate persistent
//! state. It exposes collection-typed views (users, teams, apps, services,
//! service instances, app locks), each with find-by-key, insert, update,
//! delete, plus the secondary queries the control plane needs and a
//! compare-and-set primitive used exclusively for the app lock.
//!
//! Reads are consistent with the most recent successful write from the same
//! caller. I/O failures surface unchanged; there is no automatic retry.

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryStore;
pub use self::postgres::PostgresStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::App;
use crate::auth::{Team, User};
use crate::error::Result;
use crate::service::{Service, ServiceInstance};

/// Advisory lock record for one application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppLock {
    /// Application the lock belongs to.
    pub app_name: String,
    /// Opaque owner tag; release requires the same tag.
    pub owner: String,
    /// Human-readable reason the lock was taken.
    pub reason: String,
    /// When the lock was acquired.
    pub acquired_at: DateTime<Utc>,
}

/// Durable mapping of entity identifiers to entity records.
#[allow(missing_docs)]
#[async_trait]
pub trait Store: Send + Sync {
    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    /// Insert a user; `AlreadyExists` when the email is taken.
    async fn insert_user(&self, user: &User) -> Result<()>;

    async fn user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Replace the stored user record; `NotFound` when absent.
    async fn update_user(&self, user: &User) -> Result<()>;

    /// Delete a user by email; `NotFound` when absent.
    async fn delete_user(&self, email: &str) -> Result<()>;

    /// The unique user whose token set contains `value`.
    async fn user_by_token(&self, value: &str) -> Result<Option<User>>;

    // ------------------------------------------------------------------
    // Teams
    // ------------------------------------------------------------------

    async fn insert_team(&self, team: &Team) -> Result<()>;

    async fn team_by_name(&self, name: &str) -> Result<Option<Team>>;

    async fn update_team(&self, team: &Team) -> Result<()>;

    async fn delete_team(&self, name: &str) -> Result<()>;

    /// Teams whose member list contains `email`.
    async fn teams_for_user(&self, email: &str) -> Result<Vec<Team>>;

    // ------------------------------------------------------------------
    // Apps
    // ------------------------------------------------------------------

    async fn insert_app(&self, app: &App) -> Result<()>;

    async fn app_by_name(&self, name: &str) -> Result<Option<App>>;

    async fn update_app(&self, app: &App) -> Result<()>;

    async fn delete_app(&self, name: &str) -> Result<()>;

    /// Apps whose granting-team list intersects `teams`.
    async fn apps_for_teams(&self, teams: &[String]) -> Result<Vec<App>>;

    // ------------------------------------------------------------------
    // Services
    // ------------------------------------------------------------------

    async fn insert_service(&self, service: &Service) -> Result<()>;

    async fn service_by_name(&self, name: &str) -> Result<Option<Service>>;

    async fn update_service(&self, service: &Service) -> Result<()>;

    async fn delete_service(&self, name: &str) -> Result<()>;

    async fn list_services(&self) -> Result<Vec<Service>>;

    // ------------------------------------------------------------------
    // Service instances
    // ------------------------------------------------------------------

    async fn insert_instance(&self, instance: &ServiceInstance) -> Result<()>;

    async fn instance_by_name(&self, name: &str) -> Result<Option<ServiceInstance>>;

    async fn update_instance(&self, instance: &ServiceInstance) -> Result<()>;

    async fn delete_instance(&self, name: &str) -> Result<()>;

    /// Instances whose service name is in `services`.
    async fn instances_for_services(&self, services: &[String]) -> Result<Vec<ServiceInstance>>;

    /// Instances whose bound-app list contains `app`.
    async fn instances_for_app(&self, app: &str) -> Result<Vec<ServiceInstance>>;

    // ------------------------------------------------------------------
    // App locks
    // ------------------------------------------------------------------

    /// Compare-and-set acquire of the app advisory lock.
    ///
    /// Returns `true` iff the lock was free and is now held by `owner`.
    /// This is the only CAS primitive in the store.
    async fn acquire_app_lock(&self, app: &str, owner: &str, reason: &str) -> Result<bool>;

    /// Release the lock held by `owner`; a stale or missing lock is a no-op.
    async fn release_app_lock(&self, app: &str, owner: &str) -> Result<()>;

    /// Inspect the current lock holder, if any.
    async fn app_lock(&self, app: &str) -> Result<Option<AppLock>>;

    // ------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------

    /// Cheap connectivity probe for health checks.
    async fn ping(&self) -> Result<()>;
}
