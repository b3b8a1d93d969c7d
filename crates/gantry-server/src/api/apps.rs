// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! App lifecycle handlers.

use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use gantry_core::app::{App, AppState as AppLifecycleState, EnvVar, Unit};
use gantry_core::auth::User;
use gantry_core::Error;
use serde::{Deserialize, Serialize};

use super::{caller_teams, require_user, ApiResult};
use crate::state::AppState;

/// App representation returned to clients; private env values are elided.
#[derive(Serialize)]
pub(crate) struct AppView {
    name: String,
    platform: String,
    team_owner: String,
    teams: Vec<String>,
    state: AppLifecycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_ip: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    cnames: Vec<String>,
    units: Vec<Unit>,
    env: HashMap<String, String>,
}

impl From<App> for AppView {
    fn from(app: App) -> Self {
        let env = app
            .env
            .values()
            .filter(|v| v.public)
            .map(|v| (v.name.clone(), v.value.clone()))
            .collect();
        Self {
            name: app.name,
            platform: app.platform,
            team_owner: app.team_owner,
            teams: app.teams,
            state: app.state,
            public_ip: app.public_ip,
            cnames: app.cnames,
            units: app.units,
            env,
        }
    }
}

/// 403 unless the caller belongs to one of the app's granted teams.
async fn require_app_access(state: &AppState, app: &App, user: &User) -> ApiResult<()> {
    if state.identity.check_access(&app.teams, user).await? {
        Ok(())
    } else {
        Err(Error::Forbidden(format!("you do not have access to app {}", app.name)).into())
    }
}

pub(crate) async fn list_apps(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<AppView>>> {
    let user = require_user(&state, &headers).await?;
    let teams = caller_teams(&state, &user).await?;
    let apps = state.apps.list_for_teams(&teams).await?;
    Ok(Json(apps.into_iter().map(AppView::from).collect()))
}

#[derive(Deserialize)]
pub(crate) struct CreateAppRequest {
    name: String,
    platform: String,
    #[serde(default)]
    team_owner: Option<String>,
    #[serde(default)]
    router: Option<String>,
}

pub(crate) async fn create_app(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateAppRequest>,
) -> ApiResult<(StatusCode, Json<AppView>)> {
    let user = require_user(&state, &headers).await?;
    let teams = caller_teams(&state, &user).await?;
    let owner = match body.team_owner {
        Some(team) => {
            if !teams.iter().any(|t| t == &team) {
                return Err(
                    Error::Forbidden(format!("you are not a member of team {team}")).into(),
                );
            }
            team
        }
        // Unambiguous when the caller belongs to exactly one team.
        None => match teams.as_slice() {
            [only] => only.clone(),
            [] => {
                return Err(Error::Forbidden(
                    "you must be a member of a team to create an app".to_string(),
                )
                .into())
            }
            _ => {
                return Err(Error::validation(
                    "team_owner",
                    "you belong to several teams, pick the owning one",
                )
                .into())
            }
        },
    };
    let app = state
        .apps
        .create(&body.name, &body.platform, &owner, body.router.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(app.into())))
}

pub(crate) async fn app_detail(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<Json<AppView>> {
    let user = require_user(&state, &headers).await?;
    let app = state.apps.get(&name).await?;
    require_app_access(&state, &app, &user).await?;
    Ok(Json(app.into()))
}

pub(crate) async fn delete_app(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    let user = require_user(&state, &headers).await?;
    let app = state.apps.get(&name).await?;
    require_app_access(&state, &app, &user).await?;
    state.apps.delete(&name).await?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
pub(crate) struct RunRequest {
    command: String,
}

pub(crate) async fn run_command(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<RunRequest>,
) -> ApiResult<StatusCode> {
    let user = require_user(&state, &headers).await?;
    let app = state.apps.get(&name).await?;
    require_app_access(&state, &app, &user).await?;
    state.apps.run(&name, &body.command).await?;
    Ok(StatusCode::OK)
}

pub(crate) async fn set_envs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(body): Json<HashMap<String, String>>,
) -> ApiResult<StatusCode> {
    let user = require_user(&state, &headers).await?;
    let app = state.apps.get(&name).await?;
    require_app_access(&state, &app, &user).await?;
    let vars: Vec<EnvVar> = body
        .into_iter()
        .map(|(name, value)| EnvVar {
            name,
            value,
            public: true,
            instance_name: None,
        })
        .collect();
    state.apps.set_envs(&name, &vars, true).await?;
    Ok(StatusCode::OK)
}

pub(crate) async fn unset_envs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(name): Path<String>,
    Json(names): Json<Vec<String>>,
) -> ApiResult<StatusCode> {
    let user = require_user(&state, &headers).await?;
    let app = state.apps.get(&name).await?;
    require_app_access(&state, &app, &user).await?;
    state.apps.unset_envs(&name, &names, true).await?;
    Ok(StatusCode::OK)
}

pub(crate) async fn grant_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((app_name, team)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let user = require_user(&state, &headers).await?;
    let app = state.apps.get(&app_name).await?;
    require_app_access(&state, &app, &user).await?;
    state.apps.grant_team(&app_name, &team).await?;
    Ok(StatusCode::OK)
}

pub(crate) async fn revoke_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((app_name, team)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let user = require_user(&state, &headers).await?;
    let app = state.apps.get(&app_name).await?;
    require_app_access(&state, &app, &user).await?;
    state.apps.revoke_team(&app_name, &team).await?;
    Ok(StatusCode::OK)
}
