// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manager startup: image restore, catalogue load, socket bind, worker
//! re-attach.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;

use eq_catalog::{Catalog, CatalogHandle};
use eq_storage::QueueImage;
use fs2::FileExt;
use tokio::net::UnixListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::Engine;
use crate::lifecycle::{Config, LifecycleError};
use crate::manager::Manager;

/// Everything a manager incarnation needs to run.
pub struct StartupResult {
    pub engine: Arc<Engine>,
    pub listener: UnixListener,
    pub persist_rx: mpsc::UnboundedReceiver<QueueImage>,
}

/// Acquire the exclusive daemon lock and record our pid in it.
///
/// The lock is held for the whole process lifetime, across event-loop
/// restarts.
pub fn acquire_lock(config: &Config) -> Result<File, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(false)
        .open(&config.lock_path)?;
    file.try_lock_exclusive()
        .map_err(|_| LifecycleError::LockFailed(config.lock_path.clone()))?;
    file.set_len(0)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(file)
}

/// Start one manager incarnation: restore the image, bind the client
/// socket, and re-attach a surviving worker when the persisted intent
/// says an environment existed.
pub async fn startup(
    config: &Config,
    session_cancel: CancellationToken,
) -> Result<StartupResult, LifecycleError> {
    std::fs::create_dir_all(&config.state_dir)?;

    let mut image = QueueImage::load(&config.image_path)?.unwrap_or_default();
    let environment_intent = image.settings.environment_intent;
    info!(
        queued = image.queue.len(),
        running = image.running_item.is_some(),
        history = image.history.len(),
        environment_intent,
        "queue image restored",
    );

    let catalog_dir = image.settings.catalog_dir.clone().or_else(|| config.catalog_dir.clone());
    let catalog = match &catalog_dir {
        Some(dir) => eq_catalog::load_dir(dir)?,
        None => Catalog::builtin(),
    };
    image.settings.catalog_dir = catalog_dir;

    let manager = Manager::restore(CatalogHandle::new(catalog), image);

    if config.socket_path.exists() {
        std::fs::remove_file(&config.socket_path)?;
    }
    let listener = UnixListener::bind(&config.socket_path)?;

    let (persist_tx, persist_rx) = mpsc::unbounded_channel();
    let engine = Engine::new(config.clone(), manager, persist_tx, session_cancel);

    if environment_intent {
        Arc::clone(&engine).reattach_worker().await;
    } else {
        engine.persist();
    }

    Ok(StartupResult { engine, listener, persist_rx })
}

#[cfg(test)]
#[path = "startup_tests.rs"]
mod tests;
