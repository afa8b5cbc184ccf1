// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! eq-worker binary.
//!
//! Spawned by the manager's worker supervisor with `EQ_WORKER_SOCKET`
//! pointing at the supervisor's socket. Not meant to be started by hand.

use std::path::PathBuf;

use eq_worker::{run_worker, SimEngine};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("EQ_LOG").unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let socket = match std::env::var("EQ_WORKER_SOCKET") {
        Ok(path) => PathBuf::from(path),
        Err(_) => {
            eprintln!("error: EQ_WORKER_SOCKET is not set");
            eprintln!("The worker is started by the manager and should not be invoked directly.");
            std::process::exit(1);
        }
    };

    info!(socket = %socket.display(), "worker starting");
    run_worker(&socket, SimEngine).await?;
    info!("worker shut down");
    Ok(())
}
