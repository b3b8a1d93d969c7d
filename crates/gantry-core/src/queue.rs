// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Background retry queue for route rebuilds.
//!
//! The queue carries a single task kind: rebuild the routes of one app. A
//! task runs under the app advisory lock with reason `rebuild-routes-task`
//! and is retried at a fixed interval until it succeeds. An app that was
//! deleted in the meantime terminates its task successfully. Duplicate
//! submissions for an app already in flight coalesce into one task.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::rebuild;
use crate::router::RouterRegistry;
use crate::store::Store;

/// Lock reason recorded while a queued rebuild holds the app lock.
pub const LOCK_REASON: &str = "rebuild-routes-task";

/// Queue of pending route rebuilds with a background retry worker.
pub struct RebuildQueue {
    store: Arc<dyn Store>,
    registry: Arc<RouterRegistry>,
    retry_interval: Duration,
    tx: UnboundedSender<String>,
    rx: Mutex<Option<UnboundedReceiver<String>>>,
    inflight: Mutex<HashSet<String>>,
    shutdown: Notify,
    stopping: AtomicBool,
}

impl RebuildQueue {
    /// Build a queue; the worker is not running until [`start`] is called.
    ///
    /// [`start`]: RebuildQueue::start
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<RouterRegistry>,
        retry_interval: Duration,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            store,
            registry,
            retry_interval,
            tx,
            rx: Mutex::new(Some(rx)),
            inflight: Mutex::new(HashSet::new()),
            shutdown: Notify::new(),
            stopping: AtomicBool::new(false),
        })
    }

    /// Submit a rebuild for background execution. A submission for an app
    /// already in flight is dropped.
    pub fn enqueue(&self, app: &str) {
        let mut inflight = self.inflight.lock().unwrap();
        if !inflight.insert(app.to_string()) {
            debug!(app = %app, "rebuild already queued");
            return;
        }
        drop(inflight);
        if self.tx.send(app.to_string()).is_err() {
            warn!(app = %app, "rebuild queue is closed, dropping task");
        }
    }

    /// Run one rebuild inline iff the app lock can be acquired.
    ///
    /// Returns `Ok(false)` without running when the lock is held elsewhere.
    pub async fn try_now(&self, app: &str) -> Result<bool> {
        let owner = Uuid::new_v4().to_string();
        if !self.store.acquire_app_lock(app, &owner, LOCK_REASON).await? {
            return Ok(false);
        }
        let result = self.locked_try_now(app).await;
        if let Err(err) = self.store.release_app_lock(app, &owner).await {
            warn!(app = %app, error = %err, "failed to release rebuild lock");
        }
        result.map(|()| true)
    }

    /// Run one rebuild inline for a caller that already holds the app lock.
    pub async fn locked_try_now(&self, app: &str) -> Result<()> {
        rebuild::rebuild_routes(&self.store, &self.registry, app, false)
            .await
            .map(|_| ())
    }

    /// Spawn the background worker. Each dequeued app gets its own retry
    /// loop so one unreachable router never stalls the rest of the queue.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let queue = Arc::clone(self);
        tokio::spawn(async move {
            let mut rx = match queue.rx.lock().unwrap().take() {
                Some(rx) => rx,
                None => {
                    warn!("rebuild queue worker already started");
                    return;
                }
            };
            info!("rebuild queue worker started");
            loop {
                tokio::select! {
                    _ = queue.shutdown.notified() => break,
                    item = rx.recv() => {
                        let Some(app) = item else { break };
                        let queue = Arc::clone(&queue);
                        tokio::spawn(async move { queue.run_until_done(&app).await });
                    }
                }
            }
            info!("rebuild queue worker stopped");
        })
    }

    /// Stop the worker and all pending retry loops.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.shutdown.notify_waiters();
    }

    async fn run_until_done(&self, app: &str) {
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                break;
            }
            match self.try_now(app).await {
                Ok(true) => {
                    debug!(app = %app, "queued rebuild finished");
                    break;
                }
                Ok(false) => {
                    debug!(app = %app, "app locked, rebuild deferred");
                }
                Err(err) => {
                    warn!(app = %app, error = %err, "queued rebuild failed, will retry");
                }
            }
            tokio::select! {
                _ = self.shutdown.notified() => break,
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
        self.inflight.lock().unwrap().remove(app);
    }
}
