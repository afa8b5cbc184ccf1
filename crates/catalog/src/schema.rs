// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalogue schema types: plan signatures, devices, group permissions.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a parameter binds to call arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterKind {
    /// Bindable by position or by name.
    #[default]
    Positional,
    /// Bindable by name only.
    Keyword,
    /// Collects extra positional arguments (`*args`).
    VarPositional,
    /// Collects extra keyword arguments (`**kwargs`).
    VarKeyword,
}

/// One declared parameter of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanParameter {
    pub name: String,
    #[serde(default)]
    pub kind: ParameterKind,
    /// Default value; a parameter without one is required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl PlanParameter {
    pub fn is_required(&self) -> bool {
        self.default.is_none()
            && matches!(self.kind, ParameterKind::Positional | ParameterKind::Keyword)
    }
}

/// Declared signature of a plan the run engine can execute.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PlanSchema {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Vec<PlanParameter>,
}

/// A device exposed by the run engine.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceSchema {
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Regex allow/deny lists for one user group.
///
/// A name is permitted when it matches some allowed pattern and no
/// forbidden pattern. Empty allow-lists permit nothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupPermissions {
    #[serde(default)]
    pub allowed_plans: Vec<String>,
    #[serde(default)]
    pub forbidden_plans: Vec<String>,
    #[serde(default)]
    pub allowed_devices: Vec<String>,
    #[serde(default)]
    pub forbidden_devices: Vec<String>,
}

impl GroupPermissions {
    /// Permissions that allow every plan and device.
    pub fn allow_all() -> Self {
        Self {
            allowed_plans: vec![".*".to_string()],
            forbidden_plans: vec![],
            allowed_devices: vec![".*".to_string()],
            forbidden_devices: vec![],
        }
    }
}
