// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory store for tests and embedded use.
//!
//! Collection maps guarded by one mutex each; the lock CAS runs under the
//! lock-collection mutex so acquire is atomic with respect to concurrent
//! acquirers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::app::App;
use crate::auth::{Team, User};
use crate::error::{Error, Result};
use crate::service::{Service, ServiceInstance};

use super::{AppLock, Store};

/// In-memory [`Store`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, User>>,
    teams: Mutex<HashMap<String, Team>>,
    apps: Mutex<HashMap<String, App>>,
    services: Mutex<HashMap<String, Service>>,
    instances: Mutex<HashMap<String, ServiceInstance>>,
    locks: Mutex<HashMap<String, AppLock>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.lock().await;
        if users.contains_key(&user.email) {
            return Err(Error::already_exists("user", &user.email));
        }
        users.insert(user.email.clone(), user.clone());
        Ok(())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        Ok(self.users.lock().await.get(email).cloned())
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        let mut users = self.users.lock().await;
        if !users.contains_key(&user.email) {
            return Err(Error::not_found("user", &user.email));
        }
        users.insert(user.email.clone(), user.clone());
        Ok(())
    }

    async fn delete_user(&self, email: &str) -> Result<()> {
        self.users
            .lock()
            .await
            .remove(email)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("user", email))
    }

    async fn user_by_token(&self, value: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .find(|u| u.tokens.iter().any(|t| t.value == value))
            .cloned())
    }

    async fn insert_team(&self, team: &Team) -> Result<()> {
        let mut teams = self.teams.lock().await;
        if teams.contains_key(&team.name) {
            return Err(Error::already_exists("team", &team.name));
        }
        teams.insert(team.name.clone(), team.clone());
        Ok(())
    }

    async fn team_by_name(&self, name: &str) -> Result<Option<Team>> {
        Ok(self.teams.lock().await.get(name).cloned())
    }

    async fn update_team(&self, team: &Team) -> Result<()> {
        let mut teams = self.teams.lock().await;
        if !teams.contains_key(&team.name) {
            return Err(Error::not_found("team", &team.name));
        }
        teams.insert(team.name.clone(), team.clone());
        Ok(())
    }

    async fn delete_team(&self, name: &str) -> Result<()> {
        self.teams
            .lock()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("team", name))
    }

    async fn teams_for_user(&self, email: &str) -> Result<Vec<Team>> {
        let mut found: Vec<Team> = self
            .teams
            .lock()
            .await
            .values()
            .filter(|t| t.contains_user(email))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn insert_app(&self, app: &App) -> Result<()> {
        let mut apps = self.apps.lock().await;
        if apps.contains_key(&app.name) {
            return Err(Error::already_exists("app", &app.name));
        }
        apps.insert(app.name.clone(), app.clone());
        Ok(())
    }

    async fn app_by_name(&self, name: &str) -> Result<Option<App>> {
        Ok(self.apps.lock().await.get(name).cloned())
    }

    async fn update_app(&self, app: &App) -> Result<()> {
        let mut apps = self.apps.lock().await;
        if !apps.contains_key(&app.name) {
            return Err(Error::not_found("app", &app.name));
        }
        apps.insert(app.name.clone(), app.clone());
        Ok(())
    }

    async fn delete_app(&self, name: &str) -> Result<()> {
        self.apps
            .lock()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("app", name))
    }

    async fn apps_for_teams(&self, teams: &[String]) -> Result<Vec<App>> {
        let mut found: Vec<App> = self
            .apps
            .lock()
            .await
            .values()
            .filter(|a| a.teams.iter().any(|t| teams.contains(t)))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn insert_service(&self, service: &Service) -> Result<()> {
        let mut services = self.services.lock().await;
        if services.contains_key(&service.name) {
            return Err(Error::already_exists("service", &service.name));
        }
        services.insert(service.name.clone(), service.clone());
        Ok(())
    }

    async fn service_by_name(&self, name: &str) -> Result<Option<Service>> {
        Ok(self.services.lock().await.get(name).cloned())
    }

    async fn update_service(&self, service: &Service) -> Result<()> {
        let mut services = self.services.lock().await;
        if !services.contains_key(&service.name) {
            return Err(Error::not_found("service", &service.name));
        }
        services.insert(service.name.clone(), service.clone());
        Ok(())
    }

    async fn delete_service(&self, name: &str) -> Result<()> {
        self.services
            .lock()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("service", name))
    }

    async fn list_services(&self) -> Result<Vec<Service>> {
        let mut all: Vec<Service> = self.services.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn insert_instance(&self, instance: &ServiceInstance) -> Result<()> {
        let mut instances = self.instances.lock().await;
        if instances.contains_key(&instance.name) {
            return Err(Error::already_exists("service instance", &instance.name));
        }
        instances.insert(instance.name.clone(), instance.clone());
        Ok(())
    }

    async fn instance_by_name(&self, name: &str) -> Result<Option<ServiceInstance>> {
        Ok(self.instances.lock().await.get(name).cloned())
    }

    async fn update_instance(&self, instance: &ServiceInstance) -> Result<()> {
        let mut instances = self.instances.lock().await;
        if !instances.contains_key(&instance.name) {
            return Err(Error::not_found("service instance", &instance.name));
        }
        instances.insert(instance.name.clone(), instance.clone());
        Ok(())
    }

    async fn delete_instance(&self, name: &str) -> Result<()> {
        self.instances
            .lock()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| Error::not_found("service instance", name))
    }

    async fn instances_for_services(&self, services: &[String]) -> Result<Vec<ServiceInstance>> {
        let mut found: Vec<ServiceInstance> = self
            .instances
            .lock()
            .await
            .values()
            .filter(|i| services.contains(&i.service_name))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn instances_for_app(&self, app: &str) -> Result<Vec<ServiceInstance>> {
        let mut found: Vec<ServiceInstance> = self
            .instances
            .lock()
            .await
            .values()
            .filter(|i| i.apps.iter().any(|a| a == app))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(found)
    }

    async fn acquire_app_lock(&self, app: &str, owner: &str, reason: &str) -> Result<bool> {
        let mut locks = self.locks.lock().await;
        if locks.contains_key(app) {
            return Ok(false);
        }
        locks.insert(
            app.to_string(),
            AppLock {
                app_name: app.to_string(),
                owner: owner.to_string(),
                reason: reason.to_string(),
                acquired_at: Utc::now(),
            },
        );
        Ok(true)
    }

    async fn release_app_lock(&self, app: &str, owner: &str) -> Result<()> {
        let mut locks = self.locks.lock().await;
        if locks.get(app).is_some_and(|l| l.owner == owner) {
            locks.remove(app);
        }
        Ok(())
    }

    async fn app_lock(&self, app: &str) -> Result<Option<AppLock>> {
        Ok(self.locks.lock().await.get(app).cloned())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
