// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed document store.
//!
//! One table per collection, each row holding the primary key and the
//! entity document as `jsonb`. Secondary queries run against the document
//! with jsonb operators so the collection schema never changes when an
//! entity grows a field. The app lock CAS is an `INSERT ... ON CONFLICT
//! DO NOTHING` whose row count decides the winner.

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::PgPool;
use sqlx::types::Json;

use crate::app::App;
use crate::auth::{Team, User};
use crate::error::{Error, Result};
use crate::service::{Service, ServiceInstance};

use super::{AppLock, Store};

/// PostgreSQL [`Store`] implementation.
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a store over an existing connection pool.
    ///
    /// The schema must already be in place; see [`crate::migrations`].
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_doc<T: Serialize>(
        &self,
        table: &'static str,
        kind: &'static str,
        name: &str,
        doc: &T,
    ) -> Result<()> {
        let query = format!(
            "INSERT INTO {table} (name, doc) VALUES ($1, $2) ON CONFLICT (name) DO NOTHING"
        );
        let result = sqlx::query(&query)
            .bind(name)
            .bind(Json(doc))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::already_exists(kind, name));
        }
        Ok(())
    }

    async fn fetch_doc<T: DeserializeOwned>(
        &self,
        table: &'static str,
        name: &str,
    ) -> Result<Option<T>> {
        let query = format!("SELECT doc FROM {table} WHERE name = $1");
        let row: Option<(serde_json::Value,)> = sqlx::query_as(&query)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some((doc,)) => Ok(Some(serde_json::from_value(doc)?)),
            None => Ok(None),
        }
    }

    async fn update_doc<T: Serialize>(
        &self,
        table: &'static str,
        kind: &'static str,
        name: &str,
        doc: &T,
    ) -> Result<()> {
        let query = format!("UPDATE {table} SET doc = $2 WHERE name = $1");
        let result = sqlx::query(&query)
            .bind(name)
            .bind(Json(doc))
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(kind, name));
        }
        Ok(())
    }

    async fn delete_doc(&self, table: &'static str, kind: &'static str, name: &str) -> Result<()> {
        let query = format!("DELETE FROM {table} WHERE name = $1");
        let result = sqlx::query(&query)
            .bind(name)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(kind, name));
        }
        Ok(())
    }

    async fn fetch_docs<T: DeserializeOwned>(&self, query: &str, bind: Bind<'_>) -> Result<Vec<T>> {
        let q = sqlx::query_as::<_, (serde_json::Value,)>(query);
        let q = match bind {
            Bind::Text(value) => q.bind(value),
            Bind::TextArray(values) => q.bind(values),
            Bind::None => q,
        };
        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|(doc,)| serde_json::from_value(doc).map_err(Error::from))
            .collect()
    }
}

enum Bind<'a> {
    Text(&'a str),
    TextArray(&'a [String]),
    None,
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_user(&self, user: &User) -> Result<()> {
        self.insert_doc("users", "user", &user.email, user).await
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.fetch_doc("users", email).await
    }

    async fn update_user(&self, user: &User) -> Result<()> {
        self.update_doc("users", "user", &user.email, user).await
    }

    async fn delete_user(&self, email: &str) -> Result<()> {
        self.delete_doc("users", "user", email).await
    }

    async fn user_by_token(&self, value: &str) -> Result<Option<User>> {
        let users: Vec<User> = self
            .fetch_docs(
                "SELECT doc FROM users WHERE EXISTS ( \
                   SELECT 1 FROM jsonb_array_elements(doc->'tokens') tok \
                   WHERE tok->>'value' = $1)",
                Bind::Text(value),
            )
            .await?;
        Ok(users.into_iter().next())
    }

    async fn insert_team(&self, team: &Team) -> Result<()> {
        self.insert_doc("teams", "team", &team.name, team).await
    }

    async fn team_by_name(&self, name: &str) -> Result<Option<Team>> {
        self.fetch_doc("teams", name).await
    }

    async fn update_team(&self, team: &Team) -> Result<()> {
        self.update_doc("teams", "team", &team.name, team).await
    }

    async fn delete_team(&self, name: &str) -> Result<()> {
        self.delete_doc("teams", "team", name).await
    }

    async fn teams_for_user(&self, email: &str) -> Result<Vec<Team>> {
        self.fetch_docs(
            "SELECT doc FROM teams WHERE jsonb_exists(doc->'users', $1) ORDER BY name",
            Bind::Text(email),
        )
        .await
    }

    async fn insert_app(&self, app: &App) -> Result<()> {
        self.insert_doc("apps", "app", &app.name, app).await
    }

    async fn app_by_name(&self, name: &str) -> Result<Option<App>> {
        self.fetch_doc("apps", name).await
    }

    async fn update_app(&self, app: &App) -> Result<()> {
        self.update_doc("apps", "app", &app.name, app).await
    }

    async fn delete_app(&self, name: &str) -> Result<()> {
        self.delete_doc("apps", "app", name).await
    }

    async fn apps_for_teams(&self, teams: &[String]) -> Result<Vec<App>> {
        self.fetch_docs(
            "SELECT doc FROM apps WHERE EXISTS ( \
               SELECT 1 FROM jsonb_array_elements_text(doc->'teams') t \
               WHERE t = ANY($1)) ORDER BY name",
            Bind::TextArray(teams),
        )
        .await
    }

    async fn insert_service(&self, service: &Service) -> Result<()> {
        self.insert_doc("services", "service", &service.name, service)
            .await
    }

    async fn service_by_name(&self, name: &str) -> Result<Option<Service>> {
        self.fetch_doc("services", name).await
    }

    async fn update_service(&self, service: &Service) -> Result<()> {
        self.update_doc("services", "service", &service.name, service)
            .await
    }

    async fn delete_service(&self, name: &str) -> Result<()> {
        self.delete_doc("services", "service", name).await
    }

    async fn list_services(&self) -> Result<Vec<Service>> {
        self.fetch_docs("SELECT doc FROM services ORDER BY name", Bind::None)
            .await
    }

    async fn insert_instance(&self, instance: &ServiceInstance) -> Result<()> {
        self.insert_doc("service_instances", "service instance", &instance.name, instance)
            .await
    }

    async fn instance_by_name(&self, name: &str) -> Result<Option<ServiceInstance>> {
        self.fetch_doc("service_instances", name).await
    }

    async fn update_instance(&self, instance: &ServiceInstance) -> Result<()> {
        self.update_doc("service_instances", "service instance", &instance.name, instance)
            .await
    }

    async fn delete_instance(&self, name: &str) -> Result<()> {
        self.delete_doc("service_instances", "service instance", name)
            .await
    }

    async fn instances_for_services(&self, services: &[String]) -> Result<Vec<ServiceInstance>> {
        self.fetch_docs(
            "SELECT doc FROM service_instances WHERE doc->>'service_name' = ANY($1) \
             ORDER BY name",
            Bind::TextArray(services),
        )
        .await
    }

    async fn instances_for_app(&self, app: &str) -> Result<Vec<ServiceInstance>> {
        self.fetch_docs(
            "SELECT doc FROM service_instances WHERE jsonb_exists(doc->'apps', $1) \
             ORDER BY name",
            Bind::Text(app),
        )
        .await
    }

    async fn acquire_app_lock(&self, app: &str, owner: &str, reason: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO app_locks (app_name, owner, reason, acquired_at) \
             VALUES ($1, $2, $3, $4) ON CONFLICT (app_name) DO NOTHING",
        )
        .bind(app)
        .bind(owner)
        .bind(reason)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_app_lock(&self, app: &str, owner: &str) -> Result<()> {
        sqlx::query("DELETE FROM app_locks WHERE app_name = $1 AND owner = $2")
            .bind(app)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn app_lock(&self, app: &str) -> Result<Option<AppLock>> {
        let row: Option<(String, String, String, chrono::DateTime<Utc>)> = sqlx::query_as(
            "SELECT app_name, owner, reason, acquired_at FROM app_locks WHERE app_name = $1",
        )
        .bind(app)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(app_name, owner, reason, acquired_at)| AppLock {
            app_name,
            owner,
            reason,
            acquired_at,
        }))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
