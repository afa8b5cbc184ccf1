// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine: executes the side effects the manager core decides on.
//!
//! The engine owns the worker handle, the write-through persistence
//! channel, and the pump task that feeds worker events back through the
//! manager mutex. No manager lock is ever held across an await.

use std::sync::Arc;

use eq_storage::QueueImage;
use eq_wire::{SimpleReply, WorkerCommand, WorkerEvent};
use parking_lot::Mutex;
use tokio::sync::{mpsc, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::env::reattach_timeout;
use crate::lifecycle::Config;
use crate::manager::{Advance, FinishDisposition, Manager};
use crate::supervisor::{self, WorkerHandle, WorkerLink};

pub struct Engine {
    pub config: Config,
    pub manager: Arc<Mutex<Manager>>,
    worker: Mutex<Option<WorkerHandle>>,
    persist_tx: mpsc::UnboundedSender<QueueImage>,
    /// `manager_stop`: exit the restart loop.
    pub shutdown: Arc<Notify>,
    /// `manager_kill`: tear this incarnation down without replies.
    pub kill: Arc<Notify>,
    /// Cancels the listener, connections, pump, and supervisor IO.
    pub session_cancel: CancellationToken,
}

impl Engine {
    pub fn new(
        config: Config,
        manager: Manager,
        persist_tx: mpsc::UnboundedSender<QueueImage>,
        session_cancel: CancellationToken,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            manager: Arc::new(Mutex::new(manager)),
            worker: Mutex::new(None),
            persist_tx,
            shutdown: Arc::new(Notify::new()),
            kill: Arc::new(Notify::new()),
            session_cancel,
        })
    }

    /// Queue the current state for the write-through persistence task.
    pub fn persist(&self) {
        let image = self.manager.lock().snapshot_image();
        if self.persist_tx.send(image).is_err() {
            warn!("persistence task is gone, image not written");
        }
    }

    pub fn worker_attached(&self) -> bool {
        self.worker.lock().is_some()
    }

    /// Send one command to the worker, mapping failures to reply messages.
    pub async fn worker_command(&self, command: WorkerCommand) -> Result<(), String> {
        let handle = self.worker.lock().clone();
        match handle {
            None => Err("RE Worker environment does not exist".to_string()),
            Some(handle) => handle.command(command).await.map_err(|e| e.to_string()),
        }
    }

    /// Store the worker link and start pumping its events.
    fn adopt_worker(self: Arc<Self>, handle: WorkerHandle, link: WorkerLink) {
        *self.worker.lock() = Some(handle);
        let cancel = self.session_cancel.child_token();
        tokio::spawn(async move { self.pump(link.events, cancel).await });
    }

    /// Open the environment: spawn the worker and wait for its hello.
    /// Runs as a task; clients poll `status` for the transition.
    pub async fn open_environment(self: Arc<Self>) {
        let cancel = self.session_cancel.child_token();
        match supervisor::spawn(&self.config, cancel).await {
            Ok((handle, link)) => {
                Arc::clone(&self).adopt_worker(handle, link);
                self.manager.lock().on_worker_ready();
                self.persist();
            }
            Err(e) => {
                error!(error = %e, "failed to open RE Worker environment");
                self.manager.lock().on_open_failed();
                self.persist();
            }
        }
    }

    /// Re-attach to a worker that survived a manager restart.
    pub async fn reattach_worker(self: Arc<Self>) {
        let cancel = self.session_cancel.child_token();
        match supervisor::attach(&self.config, reattach_timeout(), cancel).await {
            Ok((handle, link)) => {
                let hello = link.hello.clone();
                Arc::clone(&self).adopt_worker(handle, link);
                self.manager
                    .lock()
                    .on_worker_reattached(hello.busy, hello.item_uid.as_deref());
            }
            Err(e) => {
                info!(error = %e, "no RE Worker came back, starting without environment");
                self.manager.lock().on_reattach_failed();
            }
        }
        self.persist();
    }

    /// Close the environment gracefully. The worker exits once idle; the
    /// pump observes the disconnect and finalizes the transition.
    pub async fn close_environment(self: Arc<Self>) {
        if let Err(msg) = self.worker_command(WorkerCommand::Shutdown).await {
            warn!(%msg, "graceful worker shutdown failed, killing instead");
            let handle = self.worker.lock().clone();
            match handle {
                Some(handle) => handle.kill(),
                None => {
                    // no worker to wait for; settle the state directly
                    self.manager.lock().on_worker_gone();
                    self.persist();
                }
            }
        }
    }

    /// Destroy the environment: SIGKILL the worker process. The pump
    /// observes the dead connection and commits any running item.
    pub async fn destroy_environment(self: Arc<Self>) {
        let handle = self.worker.lock().clone();
        match handle {
            Some(handle) => handle.kill(),
            None => {
                // nothing to kill; settle the state directly
                self.manager.lock().on_worker_gone();
                self.persist();
            }
        }
    }

    /// Advance the queue: consume instructions / the stop flag, or start
    /// the next plan on the worker.
    pub async fn advance_queue(self: Arc<Self>) {
        let action = self.manager.lock().advance();
        self.persist();
        if let Advance::Start(item) = action {
            let item_uid = item.item_uid.to_string();
            match self.worker_command(WorkerCommand::StartPlan { item }).await {
                Ok(()) => info!(%item_uid, "plan started"),
                Err(msg) => {
                    error!(%item_uid, %msg, "start_plan failed, returning item to the queue");
                    self.manager.lock().rollback_start();
                    self.persist();
                }
            }
        }
    }

    /// Feed worker events through the manager mutex until the worker is
    /// gone or this incarnation shuts down.
    async fn pump(self: Arc<Self>, mut events: mpsc::Receiver<WorkerEvent>, cancel: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return,
                event = events.recv() => event,
            };
            let Some(event) = event else {
                break;
            };
            match event {
                WorkerEvent::RunOpened { run_uid } => {
                    self.manager.lock().on_run_opened(run_uid);
                }
                WorkerEvent::RunClosed { run_uid } => {
                    self.manager.lock().on_run_closed(&run_uid);
                }
                WorkerEvent::PlanPaused => {
                    self.manager.lock().on_plan_paused();
                }
                WorkerEvent::PlanFinished { outcome } => {
                    let disposition = self.manager.lock().on_plan_finished(outcome);
                    self.persist();
                    if disposition == FinishDisposition::Continue {
                        Arc::clone(&self).advance_queue().await;
                    }
                }
                // acks, hellos, and heartbeats are consumed by the supervisor
                WorkerEvent::Ack { .. } | WorkerEvent::Hello { .. } | WorkerEvent::Heartbeat => {}
            }
        }

        // worker gone: the connection closed or heartbeats stopped
        *self.worker.lock() = None;
        self.manager.lock().on_worker_gone();
        self.persist();
    }

    /// Reload the permission/catalogue snapshot from disk (or rebuild the
    /// builtin one) and swap it atomically.
    pub fn permissions_reload(&self) -> SimpleReply {
        let dir = self
            .manager
            .lock()
            .catalog_dir()
            .cloned()
            .or_else(|| self.config.catalog_dir.clone());
        let loaded = match &dir {
            Some(dir) => eq_catalog::load_dir(dir),
            None => Ok(eq_catalog::Catalog::builtin()),
        };
        match loaded {
            Ok(catalog) => {
                self.manager.lock().catalog().swap(catalog);
                info!(dir = ?dir, "permissions reloaded");
                SimpleReply::ok()
            }
            Err(e) => SimpleReply::fail(format!("Failed to reload permissions: {e}")),
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
