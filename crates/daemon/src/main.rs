// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Experiment queue manager daemon (eqd)
//!
//! Background process that owns the plan queue and supervises the RE
//! Worker process.
//!
//! Architecture:
//! - Listener task: accepts client connections, dispatches requests
//! - Manager core: single mutex serializing all state changes
//! - Self-supervisor: this binary's main loop restarts the event loop
//!   after `manager_kill` or an internal failure, rehydrating the queue
//!   from the persisted image

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use eq_daemon::lifecycle::{self, Config, LifecycleError, StartupResult};
use eq_daemon::listener::Listener;
use eq_wire::WorkerCommand;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Outcome of one manager incarnation.
enum RunOutcome {
    /// `manager_stop` or a termination signal: exit the process.
    Stopped,
    /// `manager_kill`: restart the event loop.
    Killed,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("eqd {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" | "help" => {
                println!("eqd {}", env!("CARGO_PKG_VERSION"));
                println!("Experiment queue manager daemon");
                println!();
                println!("USAGE:");
                println!("    eqd");
                println!();
                println!("The daemon listens on a Unix socket under the state directory");
                println!("(EQ_STATE_DIR, default ~/.local/state/eq) for requests from the");
                println!("`eq` client.");
                println!();
                println!("OPTIONS:");
                println!("    -h, --help       Print help information");
                println!("    -v, --version    Print version information");
                return Ok(());
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: eqd [--help | --version]");
                std::process::exit(1);
            }
        }
    }

    let config = Config::load()?;
    std::fs::create_dir_all(&config.state_dir)?;

    rotate_log_if_needed(&config.log_path);
    let log_guard = setup_logging(&config)?;

    // Exclusive per-state-dir lock, held across event-loop restarts
    let _lock = match lifecycle::acquire_lock(&config) {
        Ok(lock) => lock,
        Err(LifecycleError::LockFailed(path)) => {
            let pid = std::fs::read_to_string(&path).unwrap_or_default().trim().to_string();
            eprintln!("eqd is already running");
            if !pid.is_empty() {
                eprintln!("  pid: {pid}");
            }
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    info!("Starting experiment queue manager");

    // Self-supervisor loop: restart the event loop after manager_kill or
    // an internal failure; the queue is rehydrated from the image.
    let mut ready_printed = false;
    loop {
        match run_manager(&config, &mut ready_printed).await {
            Ok(RunOutcome::Stopped) => {
                info!("manager stopped");
                break;
            }
            Ok(RunOutcome::Killed) => {
                warn!("manager event loop killed, restarting");
                continue;
            }
            Err(e) => {
                error!(error = %e, "manager failed to run, retrying");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        }
    }

    drop(log_guard);
    Ok(())
}

/// Run one manager incarnation until stop, kill, or a signal.
async fn run_manager(
    config: &Config,
    ready_printed: &mut bool,
) -> Result<RunOutcome, LifecycleError> {
    let session_cancel = CancellationToken::new();
    let StartupResult { engine, listener, mut persist_rx } =
        lifecycle::startup(config, session_cancel.clone()).await?;

    // Write-through persistence task: images arrive in mutation order.
    // On cancellation it drains what is already queued and exits; the
    // restart path awaits it so only one incarnation writes the file.
    let image_path = config.image_path.clone();
    let persist_cancel = session_cancel.child_token();
    let persist_task = tokio::spawn(async move {
        loop {
            let image = tokio::select! {
                _ = persist_cancel.cancelled() => break,
                image = persist_rx.recv() => image,
            };
            let Some(image) = image else {
                return;
            };
            if let Err(e) = image.save(&image_path) {
                error!(error = %e, "failed to save queue image");
            }
        }
        while let Ok(image) = persist_rx.try_recv() {
            if let Err(e) = image.save(&image_path) {
                error!(error = %e, "failed to save queue image");
            }
        }
    });

    tokio::spawn(
        Listener::new(listener, Arc::clone(&engine), session_cancel.child_token()).run(),
    );

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    info!(socket = %config.socket_path.display(), "manager ready");
    if !*ready_printed {
        // Startup marker for whoever launched us
        println!("READY");
        *ready_printed = true;
    }

    let shutdown = Arc::clone(&engine.shutdown);
    let kill = Arc::clone(&engine.kill);
    let outcome = tokio::select! {
        _ = shutdown.notified() => {
            graceful_worker_shutdown(&engine).await;
            RunOutcome::Stopped
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received");
            graceful_worker_shutdown(&engine).await;
            RunOutcome::Stopped
        }
        _ = sigint.recv() => {
            info!("SIGINT received");
            graceful_worker_shutdown(&engine).await;
            RunOutcome::Stopped
        }
        _ = kill.notified() => RunOutcome::Killed,
    };

    // Tear down the listener, in-flight connections, and supervisor IO.
    // After manager_kill the worker process itself stays alive and
    // reconnects to the next incarnation.
    session_cancel.cancel();
    let _ = persist_task.await;
    let _ = std::fs::remove_file(&config.socket_path);

    Ok(outcome)
}

/// Ask the worker to exit before the process goes away. Best effort.
async fn graceful_worker_shutdown(engine: &Arc<eq_daemon::engine::Engine>) {
    if engine.worker_attached() {
        if let Err(msg) = engine.worker_command(WorkerCommand::Shutdown).await {
            warn!(%msg, "worker did not acknowledge shutdown");
        }
    }
}

const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

/// Rename an oversized log to `.old` so the file never grows unbounded.
fn rotate_log_if_needed(log_path: &Path) {
    let Ok(metadata) = std::fs::metadata(log_path) else {
        return;
    };
    if metadata.len() > MAX_LOG_SIZE {
        let old = log_path.with_extension("log.old");
        let _ = std::fs::rename(log_path, old);
    }
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    use tracing_subscriber::EnvFilter;

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("EQ_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}
