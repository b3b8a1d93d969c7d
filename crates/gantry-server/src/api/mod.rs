// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP route table, authentication, and error mapping.

mod apps;
mod services;
mod users;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use gantry_core::auth::User;
use gantry_core::Error;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::state::AppState;

/// Build the full API router over the given state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/users", post(users::create_user).delete(users::remove_user))
        .route("/users/{email}/tokens", post(users::login))
        .route("/teams", post(users::create_team))
        .route(
            "/teams/{team}/{user}",
            put(users::add_team_member).delete(users::remove_team_member),
        )
        .route("/apps", get(apps::list_apps).post(apps::create_app))
        .route("/apps/{name}", get(apps::app_detail).delete(apps::delete_app))
        .route("/apps/{name}/run", post(apps::run_command))
        .route(
            "/apps/{name}/env",
            post(apps::set_envs).delete(apps::unset_envs),
        )
        .route(
            "/apps/{app}/teams/{team}",
            put(apps::grant_team).delete(apps::revoke_team),
        )
        .route("/services", post(services::create_service))
        .route("/services/{name}", delete(services::delete_service))
        .route("/services/instances", post(services::create_instance))
        .route(
            "/services/instances/{name}",
            delete(services::delete_instance),
        )
        .route(
            "/services/instances/{name}/status",
            get(services::instance_status),
        )
        .route(
            "/services/instances/{instance}/{app}",
            put(services::bind_app).delete(services::unbind_app),
        )
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Core error wrapped for axum, mapping kinds onto status codes.
pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation { .. } => StatusCode::BAD_REQUEST,
            Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::AlreadyExists { .. } | Error::Conflict(_) => StatusCode::CONFLICT,
            Error::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(error = %self.0, "request failed");
        }
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// Result alias for handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Resolve the caller from the raw token in the `Authorization` header.
pub(crate) async fn require_user(state: &AppState, headers: &HeaderMap) -> ApiResult<User> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    Ok(state.identity.resolve_token(token).await?)
}

/// Names of the teams the caller belongs to.
pub(crate) async fn caller_teams(state: &AppState, user: &User) -> ApiResult<Vec<String>> {
    let teams = state.store.teams_for_user(&user.email).await?;
    Ok(teams.into_iter().map(|t| t.name).collect())
}

async fn healthz(State(state): State<AppState>) -> ApiResult<&'static str> {
    state.store.ping().await?;
    Ok("ok")
}
