// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;
use std::time::Duration;

use crate::lifecycle::LifecycleError;

/// Resolve state directory: EQ_STATE_DIR > XDG_STATE_HOME/eq > ~/.local/state/eq
pub fn state_dir() -> Result<PathBuf, LifecycleError> {
    if let Ok(dir) = std::env::var("EQ_STATE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Ok(PathBuf::from(xdg).join("eq"));
    }
    let home = dirs::home_dir().ok_or(LifecycleError::NoStateDir)?;
    Ok(home.join(".local/state/eq"))
}

/// Default IPC timeout for client connections
pub fn ipc_timeout() -> Duration {
    std::env::var("EQ_IPC_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Timeout for a worker command acknowledgement
pub fn worker_timeout() -> Duration {
    std::env::var("EQ_WORKER_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Timeout for the worker process to connect after being spawned
pub fn worker_spawn_timeout() -> Duration {
    std::env::var("EQ_WORKER_SPAWN_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(10))
}

/// Window to wait for a surviving worker to reconnect after a restart
pub fn reattach_timeout() -> Duration {
    std::env::var("EQ_REATTACH_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(3))
}

/// Worker heartbeats older than this mark the worker dead
pub fn liveness_timeout() -> Duration {
    std::env::var("EQ_LIVENESS_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Path to the worker binary. Defaults to `eq-worker` next to the daemon
/// executable, falling back to `$PATH` lookup.
pub fn worker_bin() -> PathBuf {
    if let Ok(bin) = std::env::var("EQ_WORKER_BIN") {
        return PathBuf::from(bin);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let sibling = dir.join("eq-worker");
            if sibling.exists() {
                return sibling;
            }
        }
    }
    PathBuf::from("eq-worker")
}
