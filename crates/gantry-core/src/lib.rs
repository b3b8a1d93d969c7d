// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Gantry Core - PaaS Control Plane
//!
//! This crate is the control plane of a small platform-as-a-service: it
//! tracks users, teams, apps, and services, keeps an edge router's routes
//! converged with each app's declared units, and brokers provider-backed
//! service instances into app environment variables.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        gantry-server                            │
//! │                   (HTTP API, port 8080)                         │
//! └─────────────────────────────────────────────────────────────────┘
//!           │                   │                     │
//!           ▼                   ▼                     ▼
//! ┌──────────────────┐ ┌────────────────┐ ┌──────────────────────────┐
//! │    Identity      │ │  App Lifecycle │ │     Binding Engine       │
//! │  users / teams   │ │  (per-app lock)│ │  instances ⇄ app env     │
//! │  tokens / keys   │ │                │ │                          │
//! └──────────────────┘ └────────────────┘ └──────────────────────────┘
//!           │                   │                     │
//!           │          ┌────────┴────────┐            │
//!           │          ▼                 ▼            ▼
//!           │  ┌──────────────┐  ┌──────────────┐ ┌────────────────┐
//!           │  │  Reconciler  │  │ Rebuild Queue│ │    Provider    │
//!           │  │ (route diff) │  │ (retry loop) │ │   Endpoints    │
//!           │  └──────────────┘  └──────────────┘ └────────────────┘
//!           │          │
//!           ▼          ▼
//! ┌──────────────────────────┐  ┌─────────────────────────────────┐
//! │        Store             │  │         Router drivers          │
//! │ (PostgreSQL / in-memory) │  │        (fake / HTTP agent)      │
//! └──────────────────────────┘  └─────────────────────────────────┘
//! ```
//!
//! # Concurrency model
//!
//! Mutations on one app serialize through a store-backed advisory lock
//! acquired by compare-and-set; operations on different apps proceed
//! independently. Route reconciliation that fails is handed to the
//! [`queue::RebuildQueue`], which retries until the router converges or the
//! app is deleted.

#![deny(missing_docs)]

pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod migrations;
pub mod queue;
pub mod rebuild;
pub mod router;
pub mod service;
pub mod store;

pub use app::{App, Apps};
pub use auth::Identity;
pub use config::Config;
pub use error::{Error, Result};
pub use queue::RebuildQueue;
pub use rebuild::rebuild_routes;
pub use router::RouterRegistry;
pub use service::bind::Binder;
pub use service::Services;
pub use store::{MemoryStore, PostgresStore, Store};
