// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Binding engine: attaches service instances to apps.
//!
//! Binding is two-phase: first the provider endpoint is asked to bind (when
//! the service has one), then the membership is persisted and the resulting
//! environment variables applied to the app. A persist failure rolls the
//! endpoint bind back so no resource leaks; failures after the persist are
//! reported to the caller but not rolled back, and the next bind or unbind
//! converges the state.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::warn;

use crate::app::{Apps, EnvVar};
use crate::error::{Error, Result};
use crate::store::Store;

/// Shown when binding an instance to an app that has no units yet.
pub const NO_UNITS_MESSAGE: &str = "This app does not have an IP yet.";

/// Attaches and detaches service instances, managing app env vars.
pub struct Binder {
    store: Arc<dyn Store>,
    apps: Arc<Apps>,
}

impl Binder {
    /// Build a binder over the store and app orchestrator.
    pub fn new(store: Arc<dyn Store>, apps: Arc<Apps>) -> Self {
        Self { store, apps }
    }

    /// Bind `app_name` to the instance, returning the env vars applied.
    ///
    /// All injected variables are private and tagged with the owning
    /// instance so only an unbind can remove them.
    pub async fn bind_app(&self, instance_name: &str, app_name: &str) -> Result<Vec<EnvVar>> {
        let mut instance = self
            .store
            .instance_by_name(instance_name)
            .await?
            .ok_or_else(|| Error::not_found("service instance", instance_name))?;
        let app = self.apps.get(app_name).await?;
        if instance.bound_to(app_name) {
            return Err(Error::Conflict(
                "This app is already bound to this service instance.".to_string(),
            ));
        }
        let service = self
            .store
            .service_by_name(&instance.service_name)
            .await?
            .ok_or_else(|| Error::not_found("service", &instance.service_name))?;

        let mut values: HashMap<String, String> = instance.env.clone();
        let endpoint = service.endpoint_client();
        let mut bound_host: Option<String> = None;
        if let Some(client) = &endpoint {
            let host = app
                .units
                .first()
                .and_then(|u| u.address.host_str().map(str::to_string))
                .ok_or_else(|| Error::PreconditionFailed(NO_UNITS_MESSAGE.to_string()))?;
            let env = client.bind(instance_name, &host).await?;
            values.extend(env);
            bound_host = Some(host);
        }

        instance.apps.push(app_name.to_string());
        if let Err(persist_err) = self.store.update_instance(&instance).await {
            if let (Some(client), Some(host)) = (&endpoint, &bound_host) {
                if let Err(err) = client.unbind(instance_name, host).await {
                    warn!(
                        instance = %instance_name,
                        app = %app_name,
                        error = %err,
                        "failed to roll back endpoint bind"
                    );
                }
            }
            return Err(persist_err);
        }

        let mut vars: Vec<EnvVar> = values
            .into_iter()
            .map(|(name, value)| EnvVar {
                name,
                value,
                public: false,
                instance_name: Some(instance_name.to_string()),
            })
            .collect();
        vars.sort_by(|a, b| a.name.cmp(&b.name));
        self.apps.set_envs(app_name, &vars, false).await?;
        Ok(vars)
    }

    /// Unbind `app_name` from the instance, removing the env vars the
    /// instance owns. The endpoint unbind is best-effort and does not block
    /// the detach.
    pub async fn unbind_app(&self, instance_name: &str, app_name: &str) -> Result<()> {
        let mut instance = self
            .store
            .instance_by_name(instance_name)
            .await?
            .ok_or_else(|| Error::not_found("service instance", instance_name))?;
        let app = self.apps.get(app_name).await?;
        if !instance.bound_to(app_name) {
            return Err(Error::PreconditionFailed(
                "This app is not bound to this service instance.".to_string(),
            ));
        }
        let service = self
            .store
            .service_by_name(&instance.service_name)
            .await?
            .ok_or_else(|| Error::not_found("service", &instance.service_name))?;

        instance.apps.retain(|a| a != app_name);
        self.store.update_instance(&instance).await?;

        if let Some(client) = service.endpoint_client() {
            if let Some(host) = app
                .units
                .first()
                .and_then(|u| u.address.host_str().map(str::to_string))
            {
                let instance_name = instance_name.to_string();
                let app_name = app_name.to_string();
                tokio::spawn(async move {
                    if let Err(err) = client.unbind(&instance_name, &host).await {
                        warn!(
                            instance = %instance_name,
                            app = %app_name,
                            error = %err,
                            "endpoint unbind failed"
                        );
                    }
                });
            }
        }

        let owned: Vec<String> = app
            .env
            .values()
            .filter(|v| v.instance_name.as_deref() == Some(instance_name))
            .map(|v| v.name.clone())
            .collect();
        if !owned.is_empty() {
            self.apps.unset_envs(app_name, &owned, false).await?;
        }
        Ok(())
    }
}
