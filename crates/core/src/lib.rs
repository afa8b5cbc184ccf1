// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! eq-core: Core library for the experiment queue manager.
//!
//! Holds the item model (plans and instructions), the plan queue with its
//! running slot and history, the run tracker for the currently executing
//! plan, and the manager state enum. Everything here is synchronous and
//! side-effect free; the daemon owns I/O.

pub mod item;
pub mod queue;
pub mod runs;
pub mod state;
pub mod uid;

pub use item::{
    ExitStatus, HistoryEntry, InstructionAction, InstructionSpec, Item, ItemPayload, ItemResult,
    PlanSpec, QueuePos,
};
pub use queue::{InsertSpec, ItemSelector, MoveDest, PlanQueue, QueueError};
pub use runs::{RunEntry, RunTracker, RunTrackerError, RunsOption};
pub use state::ManagerState;
pub use uid::{HistoryUid, ItemUid, QueueUid, RunListUid};
