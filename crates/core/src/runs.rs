// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run tracker: ordered log of sub-runs opened by the executing plan.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::uid::RunListUid;

/// One sub-run opened by the currently executing plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunEntry {
    pub uid: String,
    pub is_open: bool,
}

/// Which subset of the run list to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunsOption {
    #[default]
    Active,
    Open,
    Closed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RunTrackerError {
    #[error("run '{0}' is already in the run list")]
    DuplicateRun(String),

    #[error("close event for unknown run '{0}'")]
    UnknownRun(String),
}

/// Ordered list of runs with a snapshot token that rotates on every
/// structural change (append, open→closed flip, clear).
#[derive(Debug)]
pub struct RunTracker {
    runs: Vec<RunEntry>,
    run_list_uid: RunListUid,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RunTracker {
    pub fn new() -> Self {
        Self { runs: Vec::new(), run_list_uid: RunListUid::new() }
    }

    pub fn run_list_uid(&self) -> RunListUid {
        self.run_list_uid
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Subset of the run list, preserving insertion order.
    pub fn snapshot(&self, option: RunsOption) -> Vec<RunEntry> {
        self.runs
            .iter()
            .filter(|run| match option {
                RunsOption::Active => true,
                RunsOption::Open => run.is_open,
                RunsOption::Closed => !run.is_open,
            })
            .cloned()
            .collect()
    }

    /// Record a newly opened run.
    pub fn open(&mut self, uid: String) -> Result<(), RunTrackerError> {
        if self.runs.iter().any(|run| run.uid == uid) {
            return Err(RunTrackerError::DuplicateRun(uid));
        }
        self.runs.push(RunEntry { uid, is_open: true });
        self.run_list_uid = RunListUid::new();
        Ok(())
    }

    /// Flip a run from open to closed.
    pub fn close(&mut self, uid: &str) -> Result<(), RunTrackerError> {
        let run = self
            .runs
            .iter_mut()
            .find(|run| run.uid == uid && run.is_open)
            .ok_or_else(|| RunTrackerError::UnknownRun(uid.to_string()))?;
        run.is_open = false;
        self.run_list_uid = RunListUid::new();
        Ok(())
    }

    /// Clear the list and rotate the token. Called when the current plan
    /// finishes or is aborted/halted.
    pub fn reset(&mut self) {
        self.runs.clear();
        self.run_list_uid = RunListUid::new();
    }
}

#[cfg(test)]
#[path = "runs_tests.rs"]
mod tests;
