// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: configuration, startup, recovery.

mod startup;
pub use startup::{acquire_lock, startup, StartupResult};

use std::path::PathBuf;

use thiserror::Error;

use crate::env::state_dir;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root state directory (e.g. ~/.local/state/eq)
    pub state_dir: PathBuf,
    /// Path to the client-facing Unix socket
    pub socket_path: PathBuf,
    /// Path to the worker supervision socket
    pub worker_socket_path: PathBuf,
    /// Path to lock/PID file
    pub lock_path: PathBuf,
    /// Path to daemon log file
    pub log_path: PathBuf,
    /// Path to the persisted queue image
    pub image_path: PathBuf,
    /// Catalogue directory (plans.toml/devices.toml/groups.toml), if any
    pub catalog_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration for the manager daemon.
    ///
    /// Uses fixed paths under the state directory; one manager serves one
    /// state directory.
    pub fn load() -> Result<Self, LifecycleError> {
        let state_dir = state_dir()?;
        let catalog_dir = std::env::var("EQ_CATALOG_DIR").ok().map(PathBuf::from);

        Ok(Self {
            socket_path: state_dir.join("manager.sock"),
            worker_socket_path: state_dir.join("worker.sock"),
            lock_path: state_dir.join("manager.pid"),
            log_path: state_dir.join("manager.log"),
            image_path: state_dir.join("queue.json"),
            catalog_dir,
            state_dir,
        })
    }
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Cannot determine state directory (HOME not set)")]
    NoStateDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Another manager already holds the lock at {0}")]
    LockFailed(PathBuf),

    #[error("Image error: {0}")]
    Image(#[from] eq_storage::ImageError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] eq_catalog::CatalogError),
}
