// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worker IPC: typed commands from the supervisor, acks and events back.
//!
//! The supervisor owns the only command channel to the worker; every
//! command is answered by exactly one `ack` frame. Events flow in the
//! other direction only and carry no reply expectation.

use eq_core::{ExitStatus, Item};
use serde::{Deserialize, Serialize};

use crate::request::PauseOption;

/// Command sent from the supervisor to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum WorkerCommand {
    /// Begin execution of a plan item.
    StartPlan { item: Item },
    /// Pause at the next checkpoint (`deferred`) or at once (`immediate`).
    Pause { option: PauseOption },
    /// Resume a paused plan.
    Resume,
    /// Finish the paused plan, marking it successfully ended.
    Stop,
    /// Finish the paused plan as failed, with a traceback.
    Abort,
    /// Finish the paused plan as failed without cleanup.
    Halt,
    /// Graceful termination once the current plan is done.
    Shutdown,
    /// Liveness probe.
    Ping,
}

/// How a plan execution ended, as reported by the run engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanOutcome {
    pub exit_status: ExitStatus,
    #[serde(default)]
    pub run_uids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

/// Message from the worker to the supervisor.
///
/// `ack` answers the most recent command; everything else is an
/// unsolicited event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    /// First frame after connecting (or reconnecting after a manager
    /// restart): reports whether a plan is mid-execution.
    Hello {
        busy: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_uid: Option<String>,
    },
    /// Reply to the last command.
    Ack {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        msg: Option<String>,
    },
    /// The run engine opened a new sub-run.
    RunOpened { run_uid: String },
    /// The run engine closed a sub-run.
    RunClosed { run_uid: String },
    /// The plan reached a paused state.
    PlanPaused,
    /// The plan left the running slot for good.
    PlanFinished { outcome: PlanOutcome },
    /// Periodic liveness signal.
    Heartbeat,
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
