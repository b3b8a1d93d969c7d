// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Service catalog, instance, and binding handlers.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use gantry_core::service::{Service, ServiceInstance};
use gantry_core::Error;
use serde::{Deserialize, Serialize};

use super::{caller_teams, require_user, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub(crate) struct CreateServiceRequest {
    name: String,
    #[serde(default)]
    endpoint: Option<String>,
    owner_teams: Vec<String>,
    #[serde(default)]
    is_restricted: bool,
}

pub(crate) async fn create_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateServiceRequest>,
) -> ApiResult<StatusCode> {
    let user = require_user(&state, &headers).await?;
    let teams = caller_teams(&state, &user).await?;
    let service = Service {
        name: body.name,
        endpoint: body.endpoint,
        owner_teams: body.owner_teams,
        is_restricted: body.is_restricted,
    };
    state.services.create_service(&service, &teams).await?;
    Ok(StatusCode::CREATED)
}

pub(crate) async fn delete_service(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    let user = require_user(&state, &headers).await?;
    let teams = caller_teams(&state, &user).await?;
    state.services.delete_service(&name, &teams).await?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
pub(crate) struct CreateInstanceRequest {
    name: String,
    service_name: String,
}

#[derive(Serialize)]
pub(crate) struct InstanceView {
    name: String,
    service_name: String,
    state: String,
}

impl From<ServiceInstance> for InstanceView {
    fn from(instance: ServiceInstance) -> Self {
        let state = match instance.state {
            gantry_core::service::InstanceState::Creating => "creating",
            gantry_core::service::InstanceState::Running => "running",
            gantry_core::service::InstanceState::Failed => "failed",
        };
        Self {
            name: instance.name,
            service_name: instance.service_name,
            state: state.to_string(),
        }
    }
}

pub(crate) async fn create_instance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateInstanceRequest>,
) -> ApiResult<(StatusCode, Json<InstanceView>)> {
    let user = require_user(&state, &headers).await?;
    let teams = caller_teams(&state, &user).await?;
    let instance = state
        .services
        .create_instance(&body.name, &body.service_name, &teams)
        .await?;
    Ok((StatusCode::CREATED, Json(instance.into())))
}

pub(crate) async fn delete_instance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    let user = require_user(&state, &headers).await?;
    let teams = caller_teams(&state, &user).await?;
    state.services.delete_instance(&name, &teams).await?;
    Ok(StatusCode::OK)
}

#[derive(Serialize)]
pub(crate) struct StatusResponse {
    status: String,
}

pub(crate) async fn instance_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<Json<StatusResponse>> {
    let user = require_user(&state, &headers).await?;
    let teams = caller_teams(&state, &user).await?;
    let status = state.services.instance_status(&name, &teams).await?;
    Ok(Json(StatusResponse { status }))
}

/// 403 unless the caller owns the instance and can access the app.
async fn require_bind_access(
    state: &AppState,
    instance: &str,
    app: &str,
    headers: &HeaderMap,
) -> ApiResult<()> {
    let user = require_user(state, headers).await?;
    let teams = caller_teams(state, &user).await?;
    let record = state.services.get_instance(instance).await?;
    if !record.owned_by(&teams) {
        return Err(Error::Forbidden(
            "you do not own this service instance".to_string(),
        )
        .into());
    }
    let app_record = state.apps.get(app).await?;
    if !state.identity.check_access(&app_record.teams, &user).await? {
        return Err(Error::Forbidden(format!("you do not have access to app {app}")).into());
    }
    Ok(())
}

pub(crate) async fn bind_app(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((instance, app)): Path<(String, String)>,
) -> ApiResult<Json<HashMap<String, String>>> {
    require_bind_access(&state, &instance, &app, &headers).await?;
    let vars = state.binder.bind_app(&instance, &app).await?;
    Ok(Json(
        vars.into_iter().map(|v| (v.name, v.value)).collect(),
    ))
}

pub(crate) async fn unbind_app(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((instance, app)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    require_bind_access(&state, &instance, &app, &headers).await?;
    state.binder.unbind_app(&instance, &app).await?;
    Ok(StatusCode::OK)
}
