// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Queue item model: plans, instructions, results, and history entries.
//!
//! Items serialize flat: the `item_type` tag and the payload fields sit next
//! to `item_uid`/`user`/`user_group` in one JSON object, which is the shape
//! clients see in `queue_get`, item echoes, and history entries.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

use crate::uid::ItemUid;

/// Body of a plan item: a named executable unit for the worker's run engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSpec {
    pub name: SmolStr,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub kwargs: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

/// Control directives interpreted by the manager, never sent to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionAction {
    QueueStop,
}

impl std::fmt::Display for InstructionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstructionAction::QueueStop => write!(f, "queue_stop"),
        }
    }
}

/// Body of an instruction item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionSpec {
    pub action: InstructionAction,
}

/// Plan-or-instruction payload, tagged with `item_type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "item_type", rename_all = "snake_case")]
pub enum ItemPayload {
    Plan(PlanSpec),
    Instruction(InstructionSpec),
}

/// A queue entry: shared header plus a plan or instruction payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub item_uid: ItemUid,
    pub user: String,
    pub user_group: SmolStr,
    #[serde(flatten)]
    pub payload: ItemPayload,
}

impl Item {
    pub fn is_plan(&self) -> bool {
        matches!(self.payload, ItemPayload::Plan(_))
    }

    pub fn is_instruction(&self) -> bool {
        matches!(self.payload, ItemPayload::Instruction(_))
    }

    pub fn plan(&self) -> Option<&PlanSpec> {
        match &self.payload {
            ItemPayload::Plan(plan) => Some(plan),
            ItemPayload::Instruction(_) => None,
        }
    }

    pub fn instruction(&self) -> Option<&InstructionSpec> {
        match &self.payload {
            ItemPayload::Plan(_) => None,
            ItemPayload::Instruction(instruction) => Some(instruction),
        }
    }
}

/// Queue position: `front`, `back`, or an integer index.
///
/// Negative integers index from the back. Serializes as the literal string
/// `"front"`/`"back"` or a JSON integer, matching the wire vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuePos {
    Front,
    Back,
    Index(i64),
}

impl std::fmt::Display for QueuePos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueuePos::Front => write!(f, "front"),
            QueuePos::Back => write!(f, "back"),
            QueuePos::Index(i) => write!(f, "{i}"),
        }
    }
}

impl Serialize for QueuePos {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            QueuePos::Front => serializer.serialize_str("front"),
            QueuePos::Back => serializer.serialize_str("back"),
            QueuePos::Index(i) => serializer.serialize_i64(*i),
        }
    }
}

impl<'de> Deserialize<'de> for QueuePos {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Int(i64),
            Name(String),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Int(i) => Ok(QueuePos::Index(i)),
            Raw::Name(name) => match name.as_str() {
                "front" => Ok(QueuePos::Front),
                "back" => Ok(QueuePos::Back),
                other => Err(serde::de::Error::unknown_variant(other, &["front", "back"])),
            },
        }
    }
}

/// How a plan execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
    Completed,
    Stopped,
    Aborted,
    Halted,
    WorkerDied,
}

impl std::fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitStatus::Completed => write!(f, "completed"),
            ExitStatus::Stopped => write!(f, "stopped"),
            ExitStatus::Aborted => write!(f, "aborted"),
            ExitStatus::Halted => write!(f, "halted"),
            ExitStatus::WorkerDied => write!(f, "worker_died"),
        }
    }
}

/// Result block attached to a history entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub exit_status: ExitStatus,
    #[serde(default)]
    pub run_uids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    /// Epoch milliseconds when the item left the running slot.
    #[serde(default)]
    pub finished_at_ms: u64,
}

impl ItemResult {
    pub fn new(exit_status: ExitStatus, run_uids: Vec<String>, finished_at_ms: u64) -> Self {
        Self { exit_status, run_uids, msg: None, finished_at_ms }
    }

    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }
}

/// A completed item: the original item flattened, plus its result block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub item: Item,
    pub result: ItemResult,
}

#[cfg(test)]
#[path = "item_tests.rs"]
mod tests;
