// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Listener task for client connections.
//!
//! Accepts Unix socket connections and serves framed request/reply pairs
//! on spawned per-connection tasks. Read-only queries take the manager
//! lock only long enough to snapshot; mutating calls run their state
//! change under the lock and their I/O after it.

use std::sync::Arc;

use eq_wire::{
    encode, read_message, write_message, ProtocolError, RawRequest, Request, SimpleReply,
    WorkerCommand,
};
use thiserror::Error;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::Engine;
use crate::env::ipc_timeout;

#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Listener task for accepting client connections.
pub struct Listener {
    unix: UnixListener,
    engine: Arc<Engine>,
    cancel: CancellationToken,
}

impl Listener {
    pub fn new(unix: UnixListener, engine: Arc<Engine>, cancel: CancellationToken) -> Self {
        Self { unix, engine, cancel }
    }

    /// Run the accept loop until cancellation.
    pub async fn run(self) {
        info!("listener ready");
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    debug!("listener cancelled");
                    return;
                }
                result = self.unix.accept() => match result {
                    Ok((stream, _)) => {
                        let engine = Arc::clone(&self.engine);
                        let cancel = self.cancel.child_token();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, engine, cancel).await {
                                log_connection_error(e);
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "accept error"),
                },
            }
        }
    }
}

fn log_connection_error(e: ConnectionError) {
    match e {
        ConnectionError::Protocol(ProtocolError::ConnectionClosed) => {
            debug!("client disconnected")
        }
        ConnectionError::Protocol(ProtocolError::Timeout) => warn!("connection timeout"),
        _ => error!(error = %e, "connection error"),
    }
}

/// Outcome of dispatching one request.
enum Dispatch {
    Reply(Vec<u8>),
    /// `manager_stop` / `manager_kill`: the connection closes silently.
    NoReply,
}

/// Serve one client connection until it closes.
async fn handle_connection(
    stream: tokio::net::UnixStream,
    engine: Arc<Engine>,
    cancel: CancellationToken,
) -> Result<(), ConnectionError> {
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let bytes = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            bytes = read_message(&mut reader) => bytes?,
        };

        let raw: RawRequest = match eq_wire::decode(&bytes) {
            Ok(raw) => raw,
            Err(e) => {
                let reply = SimpleReply::fail(format!("Invalid request: {e}"));
                write_message(&mut writer, &encode(&reply)?).await?;
                continue;
            }
        };

        debug!(method = %raw.method, "request");
        match dispatch(&engine, raw).await? {
            Dispatch::Reply(reply) => {
                tokio::time::timeout(ipc_timeout(), write_message(&mut writer, &reply))
                    .await
                    .map_err(|_| ProtocolError::Timeout)??;
            }
            Dispatch::NoReply => return Ok(()),
        }
    }
}

fn reply<T: serde::Serialize>(value: &T) -> Result<Dispatch, ConnectionError> {
    Ok(Dispatch::Reply(encode(value)?))
}

fn simple(result: Result<(), String>) -> Result<Dispatch, ConnectionError> {
    match result {
        Ok(()) => reply(&SimpleReply::ok()),
        Err(msg) => reply(&SimpleReply::fail(msg)),
    }
}

/// Route one request to its handler.
async fn dispatch(engine: &Arc<Engine>, raw: RawRequest) -> Result<Dispatch, ConnectionError> {
    let request = match Request::from_raw(raw) {
        Ok(request) => request,
        Err(e) => return reply(&SimpleReply::fail(e.to_string())),
    };

    match request {
        // --- read-only ---------------------------------------------------
        Request::Ping | Request::Status => reply(&engine.manager.lock().status()),
        Request::QueueGet => reply(&engine.manager.lock().queue_get()),
        Request::HistoryGet => reply(&engine.manager.lock().history_get()),
        Request::ReRuns(params) => reply(&engine.manager.lock().re_runs(params.option)),
        Request::PlansAllowed(params) => reply(&engine.manager.lock().plans_allowed(&params)),
        Request::DevicesAllowed(params) => reply(&engine.manager.lock().devices_allowed(&params)),
        Request::QueueItemGet(params) => reply(&engine.manager.lock().item_get(params)),

        // --- queue mutations ---------------------------------------------
        Request::QueueItemAdd(params) => {
            let (response, dirty) = engine.manager.lock().item_add(params);
            if dirty {
                engine.persist();
            }
            reply(&response)
        }
        Request::QueueItemRemove(params) => {
            let (response, dirty) = engine.manager.lock().item_remove(params);
            if dirty {
                engine.persist();
            }
            reply(&response)
        }
        Request::QueueItemMove(params) => {
            let (response, dirty) = engine.manager.lock().item_move(params);
            if dirty {
                engine.persist();
            }
            reply(&response)
        }
        Request::QueueClear => {
            let (response, dirty) = engine.manager.lock().queue_clear();
            if dirty {
                engine.persist();
            }
            reply(&response)
        }
        Request::HistoryClear => {
            let (response, dirty) = engine.manager.lock().history_clear();
            if dirty {
                engine.persist();
            }
            reply(&response)
        }

        // --- queue control -----------------------------------------------
        Request::QueueStart => {
            let gate = engine.manager.lock().queue_start();
            match gate {
                Ok(()) => {
                    let engine = Arc::clone(engine);
                    tokio::spawn(async move { engine.advance_queue().await });
                    reply(&SimpleReply::ok())
                }
                Err(msg) => reply(&SimpleReply::fail(msg)),
            }
        }
        Request::QueueStop => reply(&engine.manager.lock().queue_stop()),
        Request::QueueStopCancel => reply(&engine.manager.lock().queue_stop_cancel()),

        // --- environment -------------------------------------------------
        Request::EnvironmentOpen => {
            let gate = engine.manager.lock().environment_open();
            match gate {
                Ok(()) => {
                    engine.persist();
                    let engine = Arc::clone(engine);
                    tokio::spawn(async move { engine.open_environment().await });
                    reply(&SimpleReply::ok())
                }
                Err(msg) => reply(&SimpleReply::fail(msg)),
            }
        }
        Request::EnvironmentClose => {
            let gate = engine.manager.lock().environment_close();
            match gate {
                Ok(()) => {
                    let engine = Arc::clone(engine);
                    tokio::spawn(async move { engine.close_environment().await });
                    reply(&SimpleReply::ok())
                }
                Err(msg) => reply(&SimpleReply::fail(msg)),
            }
        }
        Request::EnvironmentDestroy => {
            let gate = engine.manager.lock().environment_destroy();
            match gate {
                Ok(()) => {
                    let engine = Arc::clone(engine);
                    tokio::spawn(async move { engine.destroy_environment().await });
                    reply(&SimpleReply::ok())
                }
                Err(msg) => reply(&SimpleReply::fail(msg)),
            }
        }

        // --- run engine control ------------------------------------------
        Request::RePause(params) => {
            let gate = engine.manager.lock().pause_gate();
            match gate {
                Ok(()) => {
                    let command = crate::manager::Manager::pause_command(params.option);
                    simple(engine.worker_command(command).await)
                }
                Err(msg) => reply(&SimpleReply::fail(msg)),
            }
        }
        Request::ReResume => {
            let gate = engine.manager.lock().paused_gate();
            match gate {
                Ok(()) => match engine.worker_command(WorkerCommand::Resume).await {
                    Ok(()) => {
                        engine.manager.lock().note_resumed();
                        reply(&SimpleReply::ok())
                    }
                    Err(msg) => reply(&SimpleReply::fail(msg)),
                },
                Err(msg) => reply(&SimpleReply::fail(msg)),
            }
        }
        Request::ReStop => winding_down(engine, WorkerCommand::Stop).await,
        Request::ReAbort => winding_down(engine, WorkerCommand::Abort).await,
        Request::ReHalt => winding_down(engine, WorkerCommand::Halt).await,

        // --- permissions -------------------------------------------------
        Request::PermissionsReload => reply(&engine.permissions_reload()),

        // --- manager lifecycle -------------------------------------------
        Request::ManagerStop(params) => {
            let gate = engine.manager.lock().manager_stop_gate(&params);
            match gate {
                Ok(()) => {
                    info!("manager_stop accepted, shutting down");
                    engine.shutdown.notify_one();
                    Ok(Dispatch::NoReply)
                }
                Err(msg) => reply(&SimpleReply::fail(msg)),
            }
        }
        Request::ManagerKill => {
            warn!("manager_kill received, dropping the event loop");
            engine.kill.notify_one();
            Ok(Dispatch::NoReply)
        }
    }
}

/// Shared path for `re_stop`/`re_abort`/`re_halt`.
async fn winding_down(
    engine: &Arc<Engine>,
    command: WorkerCommand,
) -> Result<Dispatch, ConnectionError> {
    let gate = engine.manager.lock().paused_gate();
    match gate {
        Ok(()) => match engine.worker_command(command).await {
            Ok(()) => {
                engine.manager.lock().note_winding_down();
                reply(&SimpleReply::ok())
            }
            Err(msg) => reply(&SimpleReply::fail(msg)),
        },
        Err(msg) => reply(&SimpleReply::fail(msg)),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
