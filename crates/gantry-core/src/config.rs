// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::collections::HashMap;
use std::time::Duration;

/// Gantry core configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Password hashing salt, mixed into every PBKDF2 derivation.
    pub auth_salt: String,
    /// Secret mixed into token digests.
    pub token_key: String,
    /// Token lifetime in days.
    pub token_expire_days: i64,
    /// Sleep between retries of a queued route rebuild.
    pub queue_retry_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            auth_salt: "gantry-salt".to_string(),
            token_key: "gantry-key".to_string(),
            token_expire_days: 7,
            queue_retry_interval: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional (with defaults):
    /// - `GANTRY_AUTH_SALT`: password hashing salt (default: `gantry-salt`)
    /// - `GANTRY_AUTH_TOKEN_KEY`: token digest key (default: `gantry-key`)
    /// - `GANTRY_AUTH_TOKEN_EXPIRE_DAYS`: token lifetime (default: 7)
    /// - `GANTRY_QUEUE_RETRY_INTERVAL_SECS`: rebuild retry interval (default: 10)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let auth_salt =
            std::env::var("GANTRY_AUTH_SALT").unwrap_or(defaults.auth_salt);
        let token_key =
            std::env::var("GANTRY_AUTH_TOKEN_KEY").unwrap_or(defaults.token_key);

        let token_expire_days: i64 = std::env::var("GANTRY_AUTH_TOKEN_EXPIRE_DAYS")
            .unwrap_or_else(|_| defaults.token_expire_days.to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("GANTRY_AUTH_TOKEN_EXPIRE_DAYS", "must be an integer")
            })?;
        if token_expire_days <= 0 {
            return Err(ConfigError::Invalid(
                "GANTRY_AUTH_TOKEN_EXPIRE_DAYS",
                "must be a positive integer",
            ));
        }

        let retry_secs: u64 = std::env::var("GANTRY_QUEUE_RETRY_INTERVAL_SECS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "GANTRY_QUEUE_RETRY_INTERVAL_SECS",
                    "must be a positive integer",
                )
            })?;

        Ok(Self {
            auth_salt,
            token_key,
            token_expire_days,
            queue_retry_interval: Duration::from_secs(retry_secs),
        })
    }
}

/// Declarative configuration for one named router driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Router name, referenced by applications.
    pub name: String,
    /// Driver type: `fake` or `api`.
    pub kind: String,
    /// Agent base URL for the `api` driver.
    pub url: Option<String>,
}

/// Parse named router configurations from the environment.
///
/// Each router is declared as `GANTRY_ROUTER_<NAME>_TYPE` with an optional
/// `GANTRY_ROUTER_<NAME>_URL`. Names are lowercased. Returns routers sorted
/// by name so the default (first) choice is stable.
pub fn routers_from_env() -> Result<Vec<RouterConfig>, ConfigError> {
    let mut kinds: HashMap<String, String> = HashMap::new();
    let mut urls: HashMap<String, String> = HashMap::new();

    for (key, value) in std::env::vars() {
        let Some(rest) = key.strip_prefix("GANTRY_ROUTER_") else {
            continue;
        };
        if let Some(name) = rest.strip_suffix("_TYPE") {
            kinds.insert(name.to_lowercase(), value);
        } else if let Some(name) = rest.strip_suffix("_URL") {
            urls.insert(name.to_lowercase(), value);
        }
    }

    let mut routers = Vec::with_capacity(kinds.len());
    for (name, kind) in kinds {
        match kind.as_str() {
            "fake" => {}
            "api" => {
                if !urls.contains_key(&name) {
                    return Err(ConfigError::Invalid(
                        "GANTRY_ROUTER_*_URL",
                        "api routers require an agent URL",
                    ));
                }
            }
            _ => {
                return Err(ConfigError::Invalid(
                    "GANTRY_ROUTER_*_TYPE",
                    "must be one of: fake, api",
                ));
            }
        }
        let url = urls.remove(&name);
        routers.push(RouterConfig { name, kind, url });
    }
    routers.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(routers)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}
