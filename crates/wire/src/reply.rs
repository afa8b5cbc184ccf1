// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reply mappings. Every reply carries `success` and `msg`.
//!
//! Field presence is part of the contract: mutating replies always carry
//! `qsize` (`null` on failure), while `plan`/`instruction`/`item` echoes are
//! omitted entirely when the request carried no item info.

use eq_core::{HistoryEntry, Item, ManagerState, RunEntry};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Minimal reply for methods without extra result fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleReply {
    pub success: bool,
    pub msg: String,
}

impl SimpleReply {
    pub fn ok() -> Self {
        Self { success: true, msg: String::new() }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self { success: false, msg: msg.into() }
    }
}

/// Status envelope (§ status/ping).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReply {
    pub success: bool,
    pub msg: String,
    pub manager_state: ManagerState,
    pub items_in_queue: usize,
    pub items_in_history: usize,
    pub running_item_uid: Option<String>,
    pub worker_environment_exists: bool,
    pub run_list_uid: String,
    pub queue_stop_pending: bool,
    pub plan_queue_uid: String,
    pub plan_history_uid: String,
}

fn running_item_to_value(item: &Option<Item>) -> Value {
    match item {
        Some(item) => serde_json::to_value(item).unwrap_or(Value::Object(Default::default())),
        None => Value::Object(Default::default()),
    }
}

/// Queue snapshot: ordered items plus the running slot (`{}` when empty).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueGetReply {
    pub success: bool,
    pub msg: String,
    pub queue: Vec<Item>,
    pub running_item: Value,
    pub plan_queue_uid: String,
}

impl QueueGetReply {
    pub fn new(queue: Vec<Item>, running_item: Option<Item>, plan_queue_uid: String) -> Self {
        Self {
            success: true,
            msg: String::new(),
            queue,
            running_item: running_item_to_value(&running_item),
            plan_queue_uid,
        }
    }

    /// Decode the running slot; `{}` means nothing is running.
    pub fn running(&self) -> Option<Item> {
        serde_json::from_value(self.running_item.clone()).ok()
    }
}

/// Echo for `queue_item_add`: the accepted item appears under `plan` or
/// `instruction` depending on its type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddItemReply {
    pub success: bool,
    pub msg: String,
    pub qsize: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<Item>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<Item>,
}

impl AddItemReply {
    pub fn accepted(item: Item, qsize: usize) -> Self {
        let (plan, instruction) = if item.is_plan() { (Some(item), None) } else { (None, Some(item)) };
        Self { success: true, msg: String::new(), qsize: Some(qsize), plan, instruction }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self { success: false, msg: msg.into(), qsize: None, plan: None, instruction: None }
    }

    /// The accepted item, whichever key it was echoed under.
    pub fn item(&self) -> Option<&Item> {
        self.plan.as_ref().or(self.instruction.as_ref())
    }
}

/// Reply for `queue_item_get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemReply {
    pub success: bool,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,
}

impl ItemReply {
    pub fn found(item: Item) -> Self {
        Self { success: true, msg: String::new(), item: Some(item) }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self { success: false, msg: msg.into(), item: None }
    }
}

/// Reply for `queue_item_remove` / `queue_item_move`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOpReply {
    pub success: bool,
    pub msg: String,
    pub qsize: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<Item>,
}

impl ItemOpReply {
    pub fn done(item: Item, qsize: usize) -> Self {
        Self { success: true, msg: String::new(), qsize: Some(qsize), item: Some(item) }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self { success: false, msg: msg.into(), qsize: None, item: None }
    }
}

/// Reply for `history_get`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryReply {
    pub success: bool,
    pub msg: String,
    pub history: Vec<HistoryEntry>,
    pub plan_history_uid: String,
}

/// Reply for `re_runs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunsReply {
    pub success: bool,
    pub msg: String,
    pub run_list: Vec<RunEntry>,
    pub run_list_uid: String,
}

/// Reply for `plans_allowed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlansAllowedReply {
    pub success: bool,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plans_allowed: Option<Value>,
}

impl PlansAllowedReply {
    pub fn allowed(plans: Value) -> Self {
        Self { success: true, msg: String::new(), plans_allowed: Some(plans) }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self { success: false, msg: msg.into(), plans_allowed: None }
    }
}

/// Reply for `devices_allowed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DevicesAllowedReply {
    pub success: bool,
    pub msg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devices_allowed: Option<Value>,
}

impl DevicesAllowedReply {
    pub fn allowed(devices: Value) -> Self {
        Self { success: true, msg: String::new(), devices_allowed: Some(devices) }
    }

    pub fn fail(msg: impl Into<String>) -> Self {
        Self { success: false, msg: msg.into(), devices_allowed: None }
    }
}

#[cfg(test)]
#[path = "reply_tests.rs"]
mod tests;
