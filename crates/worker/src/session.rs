// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker session: connect to the supervisor, execute commands, report
//! events.
//!
//! The session survives a manager restart: on disconnect the worker keeps
//! the current plan running and retries the socket with backoff for a
//! bounded window, re-sending `hello` on every new connection. Engine
//! events emitted while disconnected stay buffered in the event channel
//! and are flushed after reconnecting.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use eq_core::Item;
use eq_wire::{read_message, write_frame, ProtocolError, WorkerCommand, WorkerEvent};
use thiserror::Error;
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::{EngineControl, EngineEvent, RunEngine};

/// Engine event channel capacity; also the reconnect replay buffer.
const EVENT_BUFFER: usize = 256;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Supervisor socket {0} is not reachable")]
    Unreachable(PathBuf),
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Connection lost; the caller may reconnect.
    Disconnected,
    /// Orderly shutdown was requested.
    Shutdown,
}

fn heartbeat_interval() -> Duration {
    std::env::var("EQ_HEARTBEAT_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_millis(500))
}

fn reattach_window() -> Duration {
    std::env::var("EQ_REATTACH_WINDOW_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(10))
}

struct CurrentPlan {
    item_uid: String,
    controls: mpsc::Sender<EngineControl>,
}

/// Worker state that outlives individual socket sessions. The engine
/// event receiver lives next to it so buffered events survive reconnects.
struct Runtime<E: RunEngine> {
    engine: Arc<E>,
    current: Option<CurrentPlan>,
    events_tx: mpsc::Sender<EngineEvent>,
    shutdown_after_plan: bool,
}

impl<E: RunEngine> Runtime<E> {
    fn new(engine: E) -> (Self, mpsc::Receiver<EngineEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let runtime = Self {
            engine: Arc::new(engine),
            current: None,
            events_tx,
            shutdown_after_plan: false,
        };
        (runtime, events_rx)
    }

    fn start_plan(&mut self, item: Item) -> Result<(), String> {
        if self.current.is_some() {
            return Err("the worker is already executing a plan".to_string());
        }
        let Some(plan) = item.plan().cloned() else {
            return Err("instructions are not executable".to_string());
        };

        let (control_tx, control_rx) = mpsc::channel(8);
        let events_tx = self.events_tx.clone();
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            let outcome = engine.execute(plan, control_rx, events_tx.clone()).await;
            let _ = events_tx.send(EngineEvent::Finished(outcome)).await;
        });

        self.current =
            Some(CurrentPlan { item_uid: item.item_uid.to_string(), controls: control_tx });
        Ok(())
    }

    async fn control(&mut self, control: EngineControl) -> Result<(), String> {
        match &self.current {
            Some(plan) => plan
                .controls
                .send(control)
                .await
                .map_err(|_| "the plan is no longer accepting control signals".to_string()),
            None => Err("no plan is currently executing".to_string()),
        }
    }
}

/// Run the worker until shutdown: connect, session, reconnect with backoff.
pub async fn run_worker<E: RunEngine>(socket_path: &Path, engine: E) -> Result<(), WorkerError> {
    let (mut runtime, mut events_rx) = Runtime::new(engine);
    let window = reattach_window();
    let mut backoff = Duration::from_millis(50);

    loop {
        let deadline = tokio::time::Instant::now() + window;
        let stream = loop {
            match UnixStream::connect(socket_path).await {
                Ok(stream) => break stream,
                Err(e) => {
                    if tokio::time::Instant::now() + backoff >= deadline {
                        warn!(error = %e, "giving up on supervisor socket");
                        return Err(WorkerError::Unreachable(socket_path.to_path_buf()));
                    }
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(Duration::from_secs(1));
                }
            }
        };
        backoff = Duration::from_millis(50);
        info!(socket = %socket_path.display(), "connected to supervisor");

        match session(&mut runtime, &mut events_rx, stream).await {
            Ok(SessionEnd::Shutdown) => return Ok(()),
            Ok(SessionEnd::Disconnected) => {
                debug!("supervisor connection lost, retrying");
            }
            Err(e) => {
                warn!(error = %e, "session error, retrying");
            }
        }
    }
}

/// Drive one connection until it drops or shutdown is requested.
async fn session<E: RunEngine>(
    runtime: &mut Runtime<E>,
    events_rx: &mut mpsc::Receiver<EngineEvent>,
    stream: UnixStream,
) -> Result<SessionEnd, WorkerError> {
    let (reader, mut writer) = stream.into_split();
    let write_timeout = Duration::from_secs(5);

    let hello = WorkerEvent::Hello {
        busy: runtime.current.is_some(),
        item_uid: runtime.current.as_ref().map(|plan| plan.item_uid.clone()),
    };
    write_frame(&mut writer, &hello, write_timeout).await?;

    // Dedicated reader task: select! would cancel partial frame reads.
    let (command_tx, mut command_rx) = mpsc::channel::<WorkerCommand>(8);
    let reader_task = tokio::spawn(async move {
        let mut reader = reader;
        loop {
            let bytes = match read_message(&mut reader).await {
                Ok(bytes) => bytes,
                Err(_) => break,
            };
            match eq_wire::decode::<WorkerCommand>(&bytes) {
                Ok(command) => {
                    if command_tx.send(command).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "undecodable command frame");
                    break;
                }
            }
        }
    });

    let mut heartbeat = tokio::time::interval(heartbeat_interval());
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let end = loop {
        tokio::select! {
            command = command_rx.recv() => {
                let Some(command) = command else {
                    break SessionEnd::Disconnected;
                };
                match handle_command(runtime, command, &mut writer, write_timeout).await {
                    Ok(Some(end)) => break end,
                    Ok(None) => {}
                    Err(e) => {
                        warn!(error = %e, "failed to answer command");
                        break SessionEnd::Disconnected;
                    }
                }
            }
            event = events_rx.recv() => {
                // runtime holds events_tx, so the channel can't close
                let Some(event) = event else {
                    break SessionEnd::Disconnected;
                };
                let finished = matches!(event, EngineEvent::Finished(_));
                if let Err(e) = forward_event(event, &mut writer, write_timeout).await {
                    warn!(error = %e, "failed to forward engine event");
                    break SessionEnd::Disconnected;
                }
                if finished {
                    runtime.current = None;
                    if runtime.shutdown_after_plan {
                        break SessionEnd::Shutdown;
                    }
                }
            }
            _ = heartbeat.tick() => {
                if write_frame(&mut writer, &WorkerEvent::Heartbeat, write_timeout).await.is_err() {
                    break SessionEnd::Disconnected;
                }
            }
        }
    };

    reader_task.abort();
    Ok(end)
}

async fn ack<W: tokio::io::AsyncWriteExt + Unpin>(
    writer: &mut W,
    timeout: Duration,
    result: Result<(), String>,
) -> Result<(), ProtocolError> {
    let event = match result {
        Ok(()) => WorkerEvent::Ack { ok: true, msg: None },
        Err(msg) => WorkerEvent::Ack { ok: false, msg: Some(msg) },
    };
    write_frame(writer, &event, timeout).await
}

async fn handle_command<E: RunEngine, W: tokio::io::AsyncWriteExt + Unpin>(
    runtime: &mut Runtime<E>,
    command: WorkerCommand,
    writer: &mut W,
    timeout: Duration,
) -> Result<Option<SessionEnd>, ProtocolError> {
    match command {
        WorkerCommand::StartPlan { item } => {
            let result = runtime.start_plan(item);
            ack(writer, timeout, result).await?;
        }
        WorkerCommand::Pause { option } => {
            let result = runtime.control(EngineControl::Pause(option)).await;
            ack(writer, timeout, result).await?;
        }
        WorkerCommand::Resume => {
            let result = runtime.control(EngineControl::Resume).await;
            ack(writer, timeout, result).await?;
        }
        WorkerCommand::Stop => {
            let result = runtime.control(EngineControl::Stop).await;
            ack(writer, timeout, result).await?;
        }
        WorkerCommand::Abort => {
            let result = runtime.control(EngineControl::Abort).await;
            ack(writer, timeout, result).await?;
        }
        WorkerCommand::Halt => {
            let result = runtime.control(EngineControl::Halt).await;
            ack(writer, timeout, result).await?;
        }
        WorkerCommand::Shutdown => {
            ack(writer, timeout, Ok(())).await?;
            if runtime.current.is_some() {
                runtime.shutdown_after_plan = true;
            } else {
                return Ok(Some(SessionEnd::Shutdown));
            }
        }
        WorkerCommand::Ping => {
            ack(writer, timeout, Ok(())).await?;
        }
    }
    Ok(None)
}

async fn forward_event<W: tokio::io::AsyncWriteExt + Unpin>(
    event: EngineEvent,
    writer: &mut W,
    timeout: Duration,
) -> Result<(), ProtocolError> {
    let wire_event = match event {
        EngineEvent::RunOpened { run_uid } => WorkerEvent::RunOpened { run_uid },
        EngineEvent::RunClosed { run_uid } => WorkerEvent::RunClosed { run_uid },
        EngineEvent::Paused => WorkerEvent::PlanPaused,
        EngineEvent::Finished(outcome) => WorkerEvent::PlanFinished { outcome },
    };
    write_frame(writer, &wire_event, timeout).await
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
