// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! RPC protocol for manager communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + JSON payload.
//! Client requests are `{"method": ..., "params": {...}}` mappings; replies
//! are flat mappings that always carry `success` and `msg`. The worker IPC
//! channel shares the framing with its own command/event vocabulary.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod reply;
mod request;
mod worker;

pub use frame::{
    decode, encode, read_frame, read_message, write_frame, write_message, ProtocolError,
    MAX_MESSAGE_SIZE,
};
pub use reply::{
    AddItemReply, HistoryReply, ItemOpReply, ItemReply, PlansAllowedReply, DevicesAllowedReply,
    QueueGetReply, RunsReply, SimpleReply, StatusReply,
};
pub use request::{
    AddItemParams, GroupParams, MoveParams, PauseOption, PauseParams, RawRequest, Request,
    RequestError, RunsParams, SelectorParams, StopOption, StopParams,
};
pub use worker::WorkerEvent;
pub use worker::{PlanOutcome, WorkerCommand};

#[cfg(test)]
mod property_tests;
