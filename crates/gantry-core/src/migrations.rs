// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Database schema management for gantry-core.
//!
//! The schema is a fixed set of document tables created idempotently at
//! startup, so a server can point at an empty database and go.

use sqlx::PgPool;

/// Apply the schema. Safe to call on every startup.
pub async fn run(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(include_str!("../migrations/schema.sql"))
        .execute(pool)
        .await?;
    Ok(())
}
