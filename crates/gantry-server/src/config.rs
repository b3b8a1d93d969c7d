// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Server-side configuration.

use gantry_core::config::ConfigError;

/// Configuration for the HTTP server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Port the HTTP API listens on.
    pub http_port: u16,
}

impl ServerConfig {
    /// Load server configuration from environment variables.
    ///
    /// Required:
    /// - `GANTRY_DATABASE_URL`: PostgreSQL connection string
    ///
    /// Optional:
    /// - `GANTRY_HTTP_PORT`: listen port (default: 8080)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("GANTRY_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("GANTRY_DATABASE_URL"))?;

        let http_port: u16 = std::env::var("GANTRY_HTTP_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("GANTRY_HTTP_PORT", "must be a port number"))?;

        Ok(Self {
            database_url,
            http_port,
        })
    }
}
