// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP client for service provider endpoints.
//!
//! A provider endpoint is a REST agent that provisions real resources
//! (databases, caches) behind a service. The wire contract is
//! form-encoded requests and JSON responses:
//!
//! - `POST /resources` with `name`: provision an instance, returns the
//!   instance's private env map
//! - `DELETE /resources/{name}`: deprovision
//! - `POST /resources/{name}/bind` with `hostname`: bind, returns an env map
//! - `DELETE /resources/{name}/hostname/{host}/`: unbind
//! - `GET /resources/{name}/status`: 204 up, 500 down, 200 with the status
//!   text in the body

use std::collections::HashMap;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Failures talking to a provider endpoint.
#[derive(Debug, Error)]
pub enum EndpointError {
    /// The service has no production endpoint configured.
    #[error("service {0} has no endpoint")]
    UnknownEndpoint(String),
    /// The endpoint answered with a non-success status.
    #[error("endpoint returned {status}: {body}")]
    Failure {
        /// HTTP status code received.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The endpoint could not be reached.
    #[error("endpoint unreachable: {0}")]
    Unreachable(String),
}

/// Result alias for endpoint operations.
pub type EndpointResult<T> = std::result::Result<T, EndpointError>;

/// Client bound to one service's production endpoint.
pub struct EndpointClient {
    base: String,
    client: reqwest::Client,
}

impl EndpointClient {
    /// Create a client for the endpoint at `base`.
    pub fn new(base: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Provision the named instance on the provider. The response body is
    /// the env map that becomes the instance's private environment.
    pub async fn create(&self, instance: &str) -> EndpointResult<HashMap<String, String>> {
        let resp = self
            .client
            .post(format!("{}/resources", self.base))
            .form(&[("name", instance)])
            .send()
            .await
            .map_err(transport)?;
        debug!(instance = %instance, status = %resp.status(), "endpoint create");
        let resp = ensure_success(resp).await?;
        let body = resp.text().await.map_err(transport)?;
        // Providers without provisioning-time variables answer with an
        // empty or non-JSON body.
        Ok(serde_json::from_str(&body).unwrap_or_default())
    }

    /// Deprovision the named instance.
    pub async fn destroy(&self, instance: &str) -> EndpointResult<()> {
        let resp = self
            .client
            .delete(format!("{}/resources/{instance}", self.base))
            .send()
            .await
            .map_err(transport)?;
        ensure_success(resp).await.map(|_| ())
    }

    /// Bind an app host to the instance; the provider answers with the
    /// environment variables the app needs to use the resource.
    pub async fn bind(
        &self,
        instance: &str,
        app_host: &str,
    ) -> EndpointResult<HashMap<String, String>> {
        let resp = self
            .client
            .post(format!("{}/resources/{instance}/bind", self.base))
            .form(&[("hostname", app_host)])
            .send()
            .await
            .map_err(transport)?;
        let resp = ensure_success(resp).await?;
        resp.json().await.map_err(transport)
    }

    /// Release the app host's bind on the instance.
    pub async fn unbind(&self, instance: &str, app_host: &str) -> EndpointResult<()> {
        let resp = self
            .client
            .delete(format!(
                "{}/resources/{instance}/hostname/{app_host}/",
                self.base
            ))
            .send()
            .await
            .map_err(transport)?;
        ensure_success(resp).await.map(|_| ())
    }

    /// Provider-side health of the instance: `up` on 204, `down` on 500,
    /// and the body's status text on 200.
    pub async fn status(&self, instance: &str) -> EndpointResult<String> {
        let resp = self
            .client
            .get(format!("{}/resources/{instance}/status", self.base))
            .send()
            .await
            .map_err(transport)?;
        match resp.status() {
            StatusCode::NO_CONTENT => Ok("up".to_string()),
            StatusCode::OK => resp.text().await.map_err(transport),
            StatusCode::INTERNAL_SERVER_ERROR => Ok("down".to_string()),
            status => Err(EndpointError::Failure {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            }),
        }
    }
}

fn transport(err: reqwest::Error) -> EndpointError {
    EndpointError::Unreachable(err.to_string())
}

async fn ensure_success(resp: reqwest::Response) -> EndpointResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(EndpointError::Failure {
            status: status.as_u16(),
            body: resp.text().await.unwrap_or_default(),
        })
    }
}
