// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Client requests: `{"method": ..., "params": {...}}` mappings.
//!
//! The server decodes a [`RawRequest`] first so an unrecognized method name
//! can be reported precisely instead of as a generic parse failure. Params
//! structs keep every field optional; structural validation (ambiguous or
//! missing selectors) is the manager's job so the error messages match the
//! wire contract.

use eq_core::{InstructionSpec, PlanSpec, QueuePos, RunsOption};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Unknown method '{0}'")]
    UnknownMethod(String),

    #[error("Incorrect request parameters: {0}")]
    BadParams(String),
}

/// Request envelope before method-specific decoding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRequest {
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

/// Pause at the next checkpoint (`deferred`) or at once (`immediate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PauseOption {
    #[default]
    Deferred,
    Immediate,
}

impl std::fmt::Display for PauseOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PauseOption::Deferred => write!(f, "deferred"),
            PauseOption::Immediate => write!(f, "immediate"),
        }
    }
}

/// `manager_stop` safety: `safe_on` requires the manager to be idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOption {
    #[default]
    SafeOn,
    SafeOff,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddItemParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<InstructionSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<QueuePos>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_uid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<QueuePos>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MoveParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<QueuePos>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos_dest: Option<QueuePos>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_uid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PauseParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<PauseOption>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RunsParams {
    #[serde(default)]
    pub option: RunsOption,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_group: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StopParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option: Option<StopOption>,
}

/// Request from a client to the manager.
///
/// `method` names are the wire contract; serialization produces the
/// `{"method": ..., "params": {...}}` envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "snake_case")]
pub enum Request {
    Ping,
    Status,
    QueueGet,
    QueueItemAdd(AddItemParams),
    QueueItemGet(SelectorParams),
    QueueItemRemove(SelectorParams),
    QueueItemMove(MoveParams),
    QueueClear,
    QueueStart,
    QueueStop,
    QueueStopCancel,
    HistoryGet,
    HistoryClear,
    EnvironmentOpen,
    EnvironmentClose,
    EnvironmentDestroy,
    RePause(PauseParams),
    ReResume,
    ReStop,
    ReAbort,
    ReHalt,
    ReRuns(RunsParams),
    PlansAllowed(GroupParams),
    DevicesAllowed(GroupParams),
    PermissionsReload,
    ManagerStop(StopParams),
    ManagerKill,
}

impl Request {
    /// Decode a raw envelope into a typed request.
    ///
    /// Absent `params` is treated as an empty mapping so clients may omit
    /// the key for methods whose parameters are all optional.
    pub fn from_raw(raw: RawRequest) -> Result<Self, RequestError> {
        fn params<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, RequestError> {
            let value = match value {
                Value::Null => Value::Object(serde_json::Map::new()),
                other => other,
            };
            serde_json::from_value(value).map_err(|e| RequestError::BadParams(e.to_string()))
        }

        match raw.method.as_str() {
            "ping" => Ok(Request::Ping),
            "status" => Ok(Request::Status),
            "queue_get" => Ok(Request::QueueGet),
            "queue_item_add" => Ok(Request::QueueItemAdd(params(raw.params)?)),
            "queue_item_get" => Ok(Request::QueueItemGet(params(raw.params)?)),
            "queue_item_remove" => Ok(Request::QueueItemRemove(params(raw.params)?)),
            "queue_item_move" => Ok(Request::QueueItemMove(params(raw.params)?)),
            "queue_clear" => Ok(Request::QueueClear),
            "queue_start" => Ok(Request::QueueStart),
            "queue_stop" => Ok(Request::QueueStop),
            "queue_stop_cancel" => Ok(Request::QueueStopCancel),
            "history_get" => Ok(Request::HistoryGet),
            "history_clear" => Ok(Request::HistoryClear),
            "environment_open" => Ok(Request::EnvironmentOpen),
            "environment_close" => Ok(Request::EnvironmentClose),
            "environment_destroy" => Ok(Request::EnvironmentDestroy),
            "re_pause" => Ok(Request::RePause(params(raw.params)?)),
            "re_resume" => Ok(Request::ReResume),
            "re_stop" => Ok(Request::ReStop),
            "re_abort" => Ok(Request::ReAbort),
            "re_halt" => Ok(Request::ReHalt),
            "re_runs" => Ok(Request::ReRuns(params(raw.params)?)),
            "plans_allowed" => Ok(Request::PlansAllowed(params(raw.params)?)),
            "devices_allowed" => Ok(Request::DevicesAllowed(params(raw.params)?)),
            "permissions_reload" => Ok(Request::PermissionsReload),
            "manager_stop" => Ok(Request::ManagerStop(params(raw.params)?)),
            "manager_kill" => Ok(Request::ManagerKill),
            other => Err(RequestError::UnknownMethod(other.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
