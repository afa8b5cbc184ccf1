// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manager state enum. Transition gating lives in the daemon's manager.

use serde::{Deserialize, Serialize};

/// Authoritative state of the manager, projected into the status envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManagerState {
    #[default]
    Idle,
    CreatingEnvironment,
    ExecutingQueue,
    Paused,
    ClosingEnvironment,
    DestroyingEnvironment,
}

impl std::fmt::Display for ManagerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ManagerState::Idle => "idle",
            ManagerState::CreatingEnvironment => "creating_environment",
            ManagerState::ExecutingQueue => "executing_queue",
            ManagerState::Paused => "paused",
            ManagerState::ClosingEnvironment => "closing_environment",
            ManagerState::DestroyingEnvironment => "destroying_environment",
        };
        write!(f, "{name}")
    }
}

impl ManagerState {
    /// True while a plan may be executing in the worker.
    pub fn is_busy(&self) -> bool {
        matches!(self, ManagerState::ExecutingQueue | ManagerState::Paused)
    }

    /// True while the environment is being created, closed, or destroyed.
    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            ManagerState::CreatingEnvironment
                | ManagerState::ClosingEnvironment
                | ManagerState::DestroyingEnvironment
        )
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
