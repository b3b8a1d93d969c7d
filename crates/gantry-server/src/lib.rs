// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP API server for the gantry control plane.
//!
//! Thin axum layer over `gantry-core`: request parsing, token
//! authentication, and the mapping from core error kinds onto HTTP status
//! codes. All domain logic lives in the core crate.

#![deny(missing_docs)]

pub mod api;
pub mod config;
pub mod state;

pub use api::build_router;
pub use config::ServerConfig;
pub use state::AppState;
