// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for gantry-core.
//!
//! One error enum spans the control plane; subsystems with their own
//! failure domains (router drivers, provider endpoints) carry dedicated
//! enums that convert into this one.

use thiserror::Error;

/// Result type using the core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Control-plane errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// I/O against the persistent store failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A router driver call failed.
    #[error("Router error: {0}")]
    Router(#[from] crate::router::RouterError),

    /// A service provider endpoint call failed.
    #[error("Endpoint error: {0}")]
    Endpoint(#[from] crate::service::endpoint::EndpointError),

    /// Request validation failed.
    #[error("Invalid {field}: {message}")]
    Validation {
        /// The field that failed validation.
        field: &'static str,
        /// The validation error message.
        message: String,
    },

    /// Missing, invalid or expired credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// Credentials are valid but the caller is not in a permitted team.
    #[error("{0}")]
    Forbidden(String),

    /// Entity with the given primary key does not exist.
    #[error("{kind} \"{name}\" not found")]
    NotFound {
        /// Entity kind (e.g. "app", "user").
        kind: &'static str,
        /// The primary key that was looked up.
        name: String,
    },

    /// Uniqueness violation on a primary key.
    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists {
        /// Entity kind.
        kind: &'static str,
        /// The conflicting primary key.
        name: String,
    },

    /// The operation would violate an "already in state" invariant.
    #[error("{0}")]
    Conflict(String),

    /// The operation needs an observable prerequisite that is absent.
    #[error("{0}")]
    PreconditionFailed(String),

    /// Programming error catch-all.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Entity-not-found with a kind tag.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Duplicate primary key with a kind tag.
    pub fn already_exists(kind: &'static str, name: impl Into<String>) -> Self {
        Error::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    /// Failed input validation for a named field.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Error::Validation {
            field,
            message: message.into(),
        }
    }

    /// Whether a retry has a chance of succeeding.
    ///
    /// Router transport failures are the only retryable class; everything
    /// else either needs operator action or a different request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Router(crate::router::RouterError::Unavailable(_))
        )
    }
}
