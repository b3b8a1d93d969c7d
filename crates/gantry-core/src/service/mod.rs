// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Services, service instances, and the binding engine.
//!
//! A [`Service`] is a catalog entry published by a provider team; a
//! [`ServiceInstance`] is one provisioned resource of that service, owned by
//! a consumer team and bindable to apps. Provider-side provisioning goes
//! through the service's HTTP endpoint ([`endpoint`]); attaching instances
//! to apps is the binding engine's job ([`bind`]).

pub mod bind;
pub mod endpoint;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::store::Store;
use endpoint::EndpointClient;

static SERVICE_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]{0,39}$").unwrap());

/// Attempts before an instance's endpoint provisioning is abandoned.
const CREATE_ATTEMPTS: u32 = 10;

/// A catalog entry published by a provider team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Unique service name.
    pub name: String,
    /// Production endpoint base URL, when the provider has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Teams allowed to manage the service definition.
    pub owner_teams: Vec<String>,
    /// When set, only owner teams may see or instantiate the service.
    #[serde(default)]
    pub is_restricted: bool,
}

impl Service {
    /// Whether any of `teams` may see this service.
    pub fn visible_to(&self, teams: &[String]) -> bool {
        !self.is_restricted || self.owner_teams.iter().any(|t| teams.contains(t))
    }

    /// Client for the production endpoint, when one is configured.
    pub fn endpoint_client(&self) -> Option<EndpointClient> {
        self.endpoint.as_deref().map(EndpointClient::new)
    }
}

/// Provisioning state of a service instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    /// Endpoint provisioning in progress.
    Creating,
    /// Provisioned and usable.
    Running,
    /// Provisioning was abandoned after repeated failures.
    Failed,
}

/// One provisioned resource of a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInstance {
    /// Unique instance name.
    pub name: String,
    /// Service this instance belongs to.
    pub service_name: String,
    /// Apps currently bound to the instance.
    #[serde(default)]
    pub apps: Vec<String>,
    /// Teams that own the instance.
    pub teams: Vec<String>,
    /// Private environment variables applied to every bound app: the
    /// provider's provisioning response plus any statically declared pairs.
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Provisioning state.
    pub state: InstanceState,
}

impl ServiceInstance {
    /// Whether `app` is currently bound.
    pub fn bound_to(&self, app: &str) -> bool {
        self.apps.iter().any(|a| a == app)
    }

    /// Whether any of `teams` owns the instance.
    pub fn owned_by(&self, teams: &[String]) -> bool {
        self.teams.iter().any(|t| teams.contains(t))
    }
}

/// Manages the service catalog and instance provisioning.
pub struct Services {
    store: Arc<dyn Store>,
    create_retry_interval: Duration,
}

impl Services {
    /// Build a manager; `create_retry_interval` paces endpoint provisioning
    /// retries.
    pub fn new(store: Arc<dyn Store>, create_retry_interval: Duration) -> Self {
        Self {
            store,
            create_retry_interval,
        }
    }

    /// Publish a service. The caller must act for one of its owner teams.
    pub async fn create_service(&self, service: &Service, caller_teams: &[String]) -> Result<()> {
        if !SERVICE_NAME_RE.is_match(&service.name) {
            return Err(Error::validation(
                "name",
                "service name must start with a lowercase letter and contain only \
                 lowercase letters, digits, and dashes",
            ));
        }
        if service.owner_teams.is_empty() {
            return Err(Error::validation(
                "owner_teams",
                "a service needs at least one owner team",
            ));
        }
        if !service.owner_teams.iter().any(|t| caller_teams.contains(t)) {
            return Err(Error::Forbidden(
                "you must be a member of one of the service's owner teams".to_string(),
            ));
        }
        self.store.insert_service(service).await?;
        info!(service = %service.name, "service created");
        Ok(())
    }

    /// Replace a service definition; owner teams only.
    pub async fn update_service(&self, service: &Service, caller_teams: &[String]) -> Result<()> {
        let existing = self.get_service(&service.name).await?;
        if !existing.owner_teams.iter().any(|t| caller_teams.contains(t)) {
            return Err(Error::Forbidden(
                "you do not own this service".to_string(),
            ));
        }
        self.store.update_service(service).await
    }

    /// Delete a service; refused while instances of it exist.
    pub async fn delete_service(&self, name: &str, caller_teams: &[String]) -> Result<()> {
        let service = self.get_service(name).await?;
        if !service.owner_teams.iter().any(|t| caller_teams.contains(t)) {
            return Err(Error::Forbidden(
                "you do not own this service".to_string(),
            ));
        }
        let instances = self
            .store
            .instances_for_services(&[name.to_string()])
            .await?;
        if !instances.is_empty() {
            return Err(Error::Conflict(format!(
                "service {name} still has instances; remove them first"
            )));
        }
        self.store.delete_service(name).await?;
        info!(service = %name, "service deleted");
        Ok(())
    }

    /// Services visible to the caller's teams, restricted ones filtered.
    pub async fn list_services(&self, caller_teams: &[String]) -> Result<Vec<Service>> {
        let all = self.store.list_services().await?;
        Ok(all
            .into_iter()
            .filter(|s| s.visible_to(caller_teams))
            .collect())
    }

    /// Provision a new instance of `service_name`.
    ///
    /// The instance record is persisted in `creating` state; endpoint
    /// provisioning runs in the background with retries and moves the state
    /// to `running` on success or `failed` once attempts are exhausted. A
    /// service without an endpoint goes straight to `running`.
    pub async fn create_instance(
        &self,
        name: &str,
        service_name: &str,
        caller_teams: &[String],
    ) -> Result<ServiceInstance> {
        if !SERVICE_NAME_RE.is_match(name) {
            return Err(Error::validation(
                "name",
                "instance name must start with a lowercase letter and contain only \
                 lowercase letters, digits, and dashes",
            ));
        }
        let service = self.get_service(service_name).await?;
        if !service.visible_to(caller_teams) {
            return Err(Error::Forbidden(format!(
                "service {service_name} is restricted"
            )));
        }
        let has_endpoint = service.endpoint.is_some();
        let instance = ServiceInstance {
            name: name.to_string(),
            service_name: service_name.to_string(),
            apps: Vec::new(),
            teams: caller_teams.to_vec(),
            env: HashMap::new(),
            state: if has_endpoint {
                InstanceState::Creating
            } else {
                InstanceState::Running
            },
        };
        self.store.insert_instance(&instance).await?;
        info!(instance = %name, service = %service_name, "service instance created");
        if has_endpoint {
            self.spawn_provisioning(&service, name);
        }
        Ok(instance)
    }

    fn spawn_provisioning(&self, service: &Service, instance: &str) {
        let Some(client) = service.endpoint_client() else {
            return;
        };
        let store = Arc::clone(&self.store);
        let name = instance.to_string();
        let interval = self.create_retry_interval;
        tokio::spawn(async move {
            let mut outcome = InstanceState::Failed;
            let mut provisioned: HashMap<String, String> = HashMap::new();
            for attempt in 1..=CREATE_ATTEMPTS {
                match client.create(&name).await {
                    Ok(env) => {
                        provisioned = env;
                        outcome = InstanceState::Running;
                        break;
                    }
                    Err(err) => {
                        warn!(
                            instance = %name,
                            attempt,
                            error = %err,
                            "endpoint provisioning failed"
                        );
                    }
                }
                tokio::time::sleep(interval).await;
            }
            match store.instance_by_name(&name).await {
                Ok(Some(mut record)) => {
                    record.state = outcome;
                    record.env.extend(provisioned);
                    if let Err(err) = store.update_instance(&record).await {
                        warn!(instance = %name, error = %err, "failed to record instance state");
                    }
                }
                // Deleted while provisioning; nothing to record.
                Ok(None) => {}
                Err(err) => {
                    warn!(instance = %name, error = %err, "failed to load instance record");
                }
            }
        });
    }

    /// Remove an instance; refused while apps are bound, and the provider's
    /// destroy must succeed before the record goes away.
    pub async fn delete_instance(&self, name: &str, caller_teams: &[String]) -> Result<()> {
        let instance = self.get_instance(name).await?;
        if !instance.owned_by(caller_teams) {
            return Err(Error::Forbidden(
                "you do not own this service instance".to_string(),
            ));
        }
        if !instance.apps.is_empty() {
            return Err(Error::Conflict(format!(
                "service instance {name} is bound to apps; unbind them first"
            )));
        }
        let service = self.get_service(&instance.service_name).await?;
        if let Some(client) = service.endpoint_client() {
            client.destroy(name).await?;
        }
        self.store.delete_instance(name).await?;
        info!(instance = %name, "service instance deleted");
        Ok(())
    }

    /// Provider-side status of an instance; without an endpoint the stored
    /// provisioning state is reported.
    pub async fn instance_status(&self, name: &str, caller_teams: &[String]) -> Result<String> {
        let instance = self.get_instance(name).await?;
        if !instance.owned_by(caller_teams) {
            return Err(Error::Forbidden(
                "you do not own this service instance".to_string(),
            ));
        }
        let service = self.get_service(&instance.service_name).await?;
        match service.endpoint_client() {
            Some(client) => Ok(client.status(name).await?),
            None => Ok(match instance.state {
                InstanceState::Creating => "creating".to_string(),
                InstanceState::Running => "up".to_string(),
                InstanceState::Failed => "failed".to_string(),
            }),
        }
    }

    /// Fetch a service, `NotFound` when absent.
    pub async fn get_service(&self, name: &str) -> Result<Service> {
        self.store
            .service_by_name(name)
            .await?
            .ok_or_else(|| Error::not_found("service", name))
    }

    /// Fetch an instance, `NotFound` when absent.
    pub async fn get_instance(&self, name: &str) -> Result<ServiceInstance> {
        self.store
            .instance_by_name(name)
            .await?
            .ok_or_else(|| Error::not_found("service instance", name))
    }
}
