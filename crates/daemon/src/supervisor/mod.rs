// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker supervisor: spawn or re-attach the worker process and own its
//! command/event channel.
//!
//! The supervisor is the only component that talks to the worker. Commands
//! go out one at a time and each is answered by a single ack; run events,
//! pause notifications, plan results, and heartbeats stream back. Silence
//! longer than the liveness timeout counts as a dead worker.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use eq_wire::{read_message, write_frame, WorkerCommand, WorkerEvent};
use thiserror::Error;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::env::{liveness_timeout, worker_bin, worker_spawn_timeout, worker_timeout};
use crate::lifecycle::Config;

/// Capacity of the worker event channel (also buffers events briefly
/// while the engine pump is busy).
const EVENT_CHANNEL: usize = 256;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to spawn RE Worker process: {0}")]
    Spawn(String),

    #[error("RE Worker did not connect in time")]
    ConnectTimeout,

    #[error("RE Worker sent an unexpected first frame")]
    BadHello,

    #[error("Timed out waiting for RE Worker to acknowledge the command")]
    CommandTimeout,

    #[error("RE Worker refused the command: {0}")]
    Refused(String),

    #[error("RE Worker is not available")]
    Gone,
}

/// First frame from a connecting worker.
#[derive(Debug, Clone)]
pub struct WorkerHello {
    pub busy: bool,
    pub item_uid: Option<String>,
}

/// Event stream handed to the engine pump.
#[derive(Debug)]
pub struct WorkerLink {
    pub hello: WorkerHello,
    pub events: mpsc::Receiver<WorkerEvent>,
}

type AckSender = oneshot::Sender<Result<(), String>>;

/// Handle for sending commands to (and killing) the worker.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    commands: mpsc::Sender<(WorkerCommand, AckSender)>,
    cancel: CancellationToken,
    pid: Option<u32>,
}

impl WorkerHandle {
    /// Send one command and wait for its acknowledgement.
    pub async fn command(&self, command: WorkerCommand) -> Result<(), SupervisorError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands
            .send((command, ack_tx))
            .await
            .map_err(|_| SupervisorError::Gone)?;
        match tokio::time::timeout(worker_timeout(), ack_rx).await {
            Err(_) => Err(SupervisorError::CommandTimeout),
            Ok(Err(_)) => Err(SupervisorError::Gone),
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(msg))) => Err(SupervisorError::Refused(msg)),
        }
    }

    /// Force-terminate the worker process and stop the IO loop.
    pub fn kill(&self) {
        if let Some(pid) = self.pid {
            let pid = nix::unistd::Pid::from_raw(pid as i32);
            if let Err(e) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGKILL) {
                warn!(error = %e, "failed to SIGKILL RE Worker");
            } else {
                info!(pid = %pid, "RE Worker process killed");
            }
        }
        self.cancel.cancel();
    }
}

/// Spawn a fresh worker process and wait for it to connect.
pub async fn spawn(
    config: &Config,
    cancel: CancellationToken,
) -> Result<(WorkerHandle, WorkerLink), SupervisorError> {
    let listener = bind(&config.worker_socket_path)?;

    let bin = worker_bin();
    let mut child = tokio::process::Command::new(&bin)
        .env("EQ_WORKER_SOCKET", &config.worker_socket_path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::inherit())
        .spawn()
        .map_err(|e| SupervisorError::Spawn(format!("{}: {e}", bin.display())))?;
    let pid = child.id();
    info!(bin = %bin.display(), pid = ?pid, "spawned RE Worker process");

    // Reap the child whenever it exits.
    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) => debug!(%status, "RE Worker process exited"),
            Err(e) => warn!(error = %e, "failed to wait on RE Worker process"),
        }
    });

    link(listener, worker_spawn_timeout(), pid, cancel).await
}

/// Wait for a surviving worker to reconnect after a manager restart.
pub async fn attach(
    config: &Config,
    window: Duration,
    cancel: CancellationToken,
) -> Result<(WorkerHandle, WorkerLink), SupervisorError> {
    let listener = bind(&config.worker_socket_path)?;
    link(listener, window, None, cancel).await
}

fn bind(path: &Path) -> Result<UnixListener, SupervisorError> {
    if path.exists() {
        std::fs::remove_file(path)?;
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(UnixListener::bind(path)?)
}

/// Accept the worker connection, read its hello, and start the IO loop.
async fn link(
    listener: UnixListener,
    window: Duration,
    pid: Option<u32>,
    cancel: CancellationToken,
) -> Result<(WorkerHandle, WorkerLink), SupervisorError> {
    let (stream, _) = tokio::time::timeout(window, listener.accept())
        .await
        .map_err(|_| SupervisorError::ConnectTimeout)??;

    let (mut reader, writer) = stream.into_split();

    let hello_bytes = tokio::time::timeout(window, read_message(&mut reader))
        .await
        .map_err(|_| SupervisorError::ConnectTimeout)?
        .map_err(|_| SupervisorError::BadHello)?;
    let hello = match eq_wire::decode::<WorkerEvent>(&hello_bytes) {
        Ok(WorkerEvent::Hello { busy, item_uid }) => WorkerHello { busy, item_uid },
        _ => return Err(SupervisorError::BadHello),
    };
    info!(busy = hello.busy, "RE Worker connected");

    let (command_tx, command_rx) = mpsc::channel(8);
    let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL);

    tokio::spawn(io_loop(reader, writer, command_rx, event_tx, cancel.clone()));

    Ok((
        WorkerHandle { commands: command_tx, cancel, pid },
        WorkerLink { hello, events: event_rx },
    ))
}

/// Pump commands out and frames in until cancellation, disconnect, or
/// heartbeat silence. Dropping `event_tx` is the worker-gone signal.
async fn io_loop(
    reader: tokio::net::unix::OwnedReadHalf,
    mut writer: tokio::net::unix::OwnedWriteHalf,
    mut commands: mpsc::Receiver<(WorkerCommand, AckSender)>,
    events: mpsc::Sender<WorkerEvent>,
    cancel: CancellationToken,
) {
    // Dedicated frame reader: select! must not cancel partial reads.
    let (frame_tx, mut frames) = mpsc::channel::<WorkerEvent>(64);
    let read_task = tokio::spawn(async move {
        let mut reader = reader;
        loop {
            let bytes = match read_message(&mut reader).await {
                Ok(bytes) => bytes,
                Err(_) => break,
            };
            match eq_wire::decode::<WorkerEvent>(&bytes) {
                Ok(event) => {
                    if frame_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "undecodable worker frame");
                    break;
                }
            }
        }
    });

    let liveness = liveness_timeout();
    let mut last_seen = Instant::now();
    let mut liveness_check = tokio::time::interval(liveness / 2);
    let mut pending: Option<AckSender> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("supervisor IO loop cancelled");
                break;
            }
            command = commands.recv() => {
                let Some((command, ack_tx)) = command else {
                    break;
                };
                if pending.is_some() {
                    let _ = ack_tx.send(Err("another command is already in flight".to_string()));
                    continue;
                }
                if let Err(e) = write_frame(&mut writer, &command, worker_timeout()).await {
                    warn!(error = %e, "failed to send command to RE Worker");
                    let _ = ack_tx.send(Err("RE Worker is not reachable".to_string()));
                    break;
                }
                pending = Some(ack_tx);
            }
            frame = frames.recv() => {
                let Some(event) = frame else {
                    debug!("RE Worker connection closed");
                    break;
                };
                last_seen = Instant::now();
                match event {
                    WorkerEvent::Ack { ok, msg } => {
                        if let Some(ack_tx) = pending.take() {
                            let result = if ok {
                                Ok(())
                            } else {
                                Err(msg.unwrap_or_else(|| "command refused".to_string()))
                            };
                            let _ = ack_tx.send(result);
                        } else {
                            warn!("unsolicited ack from RE Worker");
                        }
                    }
                    WorkerEvent::Heartbeat => {}
                    WorkerEvent::Hello { .. } => {
                        warn!("unexpected hello on an established connection");
                    }
                    other => {
                        if events.send(other).await.is_err() {
                            break;
                        }
                    }
                }
            }
            _ = liveness_check.tick() => {
                if last_seen.elapsed() > liveness {
                    error!("RE Worker heartbeat lost");
                    break;
                }
            }
        }
    }

    read_task.abort();
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
