// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! User, team, and token handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use gantry_core::Error;
use serde::{Deserialize, Serialize};

use super::{require_user, ApiResult};
use crate::state::AppState;

#[derive(Deserialize)]
pub(crate) struct CreateUserRequest {
    email: String,
    password: String,
}

#[derive(Serialize)]
pub(crate) struct UserResponse {
    email: String,
}

pub(crate) async fn create_user(
    State(state): State<AppState>,
    Json(body): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let user = state.identity.create_user(&body.email, &body.password).await?;
    Ok((StatusCode::CREATED, Json(UserResponse { email: user.email })))
}

pub(crate) async fn remove_user(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<StatusCode> {
    let user = require_user(&state, &headers).await?;
    state.identity.remove_user(&user.email).await?;
    Ok(StatusCode::OK)
}

#[derive(Deserialize)]
pub(crate) struct LoginRequest {
    password: String,
}

#[derive(Serialize)]
pub(crate) struct TokenResponse {
    token: String,
    valid_until: DateTime<Utc>,
}

pub(crate) async fn login(
    State(state): State<AppState>,
    Path(email): Path<String>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let user = state.identity.authenticate(&email, &body.password).await?;
    let token = state.identity.issue_token(&user).await?;
    Ok(Json(TokenResponse {
        token: token.value,
        valid_until: token.valid_until,
    }))
}

#[derive(Deserialize)]
pub(crate) struct CreateTeamRequest {
    name: String,
}

pub(crate) async fn create_team(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateTeamRequest>,
) -> ApiResult<StatusCode> {
    let user = require_user(&state, &headers).await?;
    state.identity.create_team(&body.name, &user).await?;
    Ok(StatusCode::CREATED)
}

pub(crate) async fn add_team_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((team, email)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let user = require_user(&state, &headers).await?;
    require_membership(&state, &user.email, &team).await?;
    state.identity.add_team_member(&team, &email).await?;
    Ok(StatusCode::OK)
}

pub(crate) async fn remove_team_member(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((team, email)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let user = require_user(&state, &headers).await?;
    require_membership(&state, &user.email, &team).await?;
    state.identity.remove_team_member(&team, &email).await?;
    Ok(StatusCode::OK)
}

async fn require_membership(state: &AppState, email: &str, team: &str) -> ApiResult<()> {
    let teams = state.store.teams_for_user(email).await?;
    if teams.iter().any(|t| t.name == team) {
        Ok(())
    } else {
        Err(Error::Forbidden(format!("you are not a member of team {team}")).into())
    }
}
