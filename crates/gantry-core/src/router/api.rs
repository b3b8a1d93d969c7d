// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP-agent router driver.
//!
//! Drives an external layer-4 load balancer through its control agent.
//! The agent exposes one resource per backend:
//!
//! - `POST /backend/{name}`: create (409 when present)
//! - `DELETE /backend/{name}`: remove (404 absent, 412 swapped)
//! - `GET /backend/{name}`: `{"address": "host:port"}`
//! - `GET /backend/{name}/routes`: `{"addresses": [url, ...]}`
//! - `POST|DELETE /backend/{name}/routes`: transactional batch add/remove
//! - `POST /backend/{b1}/swap?target={b2}&cnameOnly={bool}`
//! - `POST|DELETE /backend/{name}/cname/{cname}`, `GET /backend/{name}/cnames`
//! - `PUT /backend/{name}/healthcheck`: `{"path": "/"}`
//!
//! Domain conflicts arrive as 4xx statuses and map onto [`RouterError`];
//! transport failures and 5xx map onto `Unavailable` and are retryable.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use super::{Router, RouterError, RouterResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Router driver backed by an external HTTP agent.
pub struct ApiRouter {
    base: String,
    client: reqwest::Client,
}

#[derive(Serialize, Deserialize)]
struct RoutesPayload {
    addresses: Vec<String>,
}

#[derive(Deserialize)]
struct AddrPayload {
    address: String,
}

#[derive(Deserialize)]
struct CNamesPayload {
    cnames: Vec<String>,
}

impl ApiRouter {
    /// Create a driver for the agent at `base` (e.g. `http://lb-agent:7070`).
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

    fn backend_url(&self, name: &str, suffix: &str) -> String {
        format!("{}/backend/{name}{suffix}", self.base)
    }

    async fn read_failure(resp: reqwest::Response) -> String {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        format!("{status}: {body}")
    }
}

fn transport(err: reqwest::Error) -> RouterError {
    RouterError::Unavailable(err.to_string())
}

#[async_trait]
impl Router for ApiRouter {
    fn router_type(&self) -> &'static str {
        "api"
    }

    fn supports_cnames(&self) -> bool {
        true
    }

    async fn add_backend(&self, name: &str) -> RouterResult<()> {
        let resp = self
            .client
            .post(self.backend_url(name, ""))
            .send()
            .await
            .map_err(transport)?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(RouterError::BackendExists(name.to_string())),
            _ => Err(RouterError::Unavailable(Self::read_failure(resp).await)),
        }
    }

    async fn remove_backend(&self, name: &str) -> RouterResult<()> {
        let resp = self
            .client
            .delete(self.backend_url(name, ""))
            .send()
            .await
            .map_err(transport)?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(RouterError::BackendNotFound(name.to_string())),
            StatusCode::PRECONDITION_FAILED => {
                Err(RouterError::BackendSwapped(name.to_string()))
            }
            _ => Err(RouterError::Unavailable(Self::read_failure(resp).await)),
        }
    }

    async fn add_route(&self, name: &str, route: &Url) -> RouterResult<()> {
        self.add_routes(name, std::slice::from_ref(route)).await
    }

    async fn remove_route(&self, name: &str, route: &Url) -> RouterResult<()> {
        self.remove_routes(name, std::slice::from_ref(route)).await
    }

    // The agent batch endpoints are transactional server-side, so the
    // client sends the whole batch in one request instead of the default
    // add-then-undo loop.
    async fn add_routes(&self, name: &str, routes: &[Url]) -> RouterResult<()> {
        let payload = RoutesPayload {
            addresses: routes.iter().map(Url::to_string).collect(),
        };
        let resp = self
            .client
            .post(self.backend_url(name, "/routes"))
            .json(&payload)
            .send()
            .await
            .map_err(transport)?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(RouterError::BackendNotFound(name.to_string())),
            StatusCode::CONFLICT => Err(RouterError::RouteExists(
                payload.addresses.join(", "),
            )),
            _ => Err(RouterError::Unavailable(Self::read_failure(resp).await)),
        }
    }

    async fn remove_routes(&self, name: &str, routes: &[Url]) -> RouterResult<()> {
        let payload = RoutesPayload {
            addresses: routes.iter().map(Url::to_string).collect(),
        };
        let resp = self
            .client
            .delete(self.backend_url(name, "/routes"))
            .json(&payload)
            .send()
            .await
            .map_err(transport)?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(RouterError::RouteNotFound(
                payload.addresses.join(", "),
            )),
            _ => Err(RouterError::Unavailable(Self::read_failure(resp).await)),
        }
    }

    async fn routes(&self, name: &str) -> RouterResult<Vec<Url>> {
        let resp = self
            .client
            .get(self.backend_url(name, "/routes"))
            .send()
            .await
            .map_err(transport)?;
        match resp.status() {
            s if s.is_success() => {
                let payload: RoutesPayload = resp.json().await.map_err(transport)?;
                payload
                    .addresses
                    .iter()
                    .map(|raw| {
                        Url::parse(raw).map_err(|e| {
                            RouterError::Unavailable(format!("bad route from agent: {e}"))
                        })
                    })
                    .collect()
            }
            StatusCode::NOT_FOUND => Err(RouterError::BackendNotFound(name.to_string())),
            _ => Err(RouterError::Unavailable(Self::read_failure(resp).await)),
        }
    }

    async fn addr(&self, name: &str) -> RouterResult<String> {
        let resp = self
            .client
            .get(self.backend_url(name, ""))
            .send()
            .await
            .map_err(transport)?;
        match resp.status() {
            s if s.is_success() => {
                let payload: AddrPayload = resp.json().await.map_err(transport)?;
                Ok(payload.address)
            }
            StatusCode::NOT_FOUND => Err(RouterError::BackendNotFound(name.to_string())),
            _ => Err(RouterError::Unavailable(Self::read_failure(resp).await)),
        }
    }

    async fn swap(&self, backend1: &str, backend2: &str, cname_only: bool) -> RouterResult<()> {
        let url = format!(
            "{}?target={backend2}&cnameOnly={cname_only}",
            self.backend_url(backend1, "/swap")
        );
        let resp = self.client.post(url).send().await.map_err(transport)?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(RouterError::BackendNotFound(backend1.to_string())),
            StatusCode::PRECONDITION_FAILED => {
                Err(RouterError::BackendSwapped(backend1.to_string()))
            }
            _ => Err(RouterError::Unavailable(Self::read_failure(resp).await)),
        }
    }

    async fn set_cname(&self, cname: &str, name: &str) -> RouterResult<()> {
        let resp = self
            .client
            .post(self.backend_url(name, &format!("/cname/{cname}")))
            .send()
            .await
            .map_err(transport)?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(RouterError::BackendNotFound(name.to_string())),
            StatusCode::CONFLICT => Err(RouterError::CNameExists(cname.to_string())),
            _ => Err(RouterError::Unavailable(Self::read_failure(resp).await)),
        }
    }

    async fn unset_cname(&self, cname: &str, name: &str) -> RouterResult<()> {
        let resp = self
            .client
            .delete(self.backend_url(name, &format!("/cname/{cname}")))
            .send()
            .await
            .map_err(transport)?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(RouterError::CNameNotFound(cname.to_string())),
            _ => Err(RouterError::Unavailable(Self::read_failure(resp).await)),
        }
    }

    async fn cnames(&self, name: &str) -> RouterResult<Vec<String>> {
        let resp = self
            .client
            .get(self.backend_url(name, "/cnames"))
            .send()
            .await
            .map_err(transport)?;
        match resp.status() {
            s if s.is_success() => {
                let payload: CNamesPayload = resp.json().await.map_err(transport)?;
                Ok(payload.cnames)
            }
            StatusCode::NOT_FOUND => Err(RouterError::BackendNotFound(name.to_string())),
            _ => Err(RouterError::Unavailable(Self::read_failure(resp).await)),
        }
    }

    async fn set_healthcheck(&self, name: &str, path: &str) -> RouterResult<()> {
        let resp = self
            .client
            .put(self.backend_url(name, "/healthcheck"))
            .json(&serde_json::json!({ "path": path }))
            .send()
            .await
            .map_err(transport)?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(RouterError::BackendNotFound(name.to_string())),
            _ => Err(RouterError::Unavailable(Self::read_failure(resp).await)),
        }
    }
}
