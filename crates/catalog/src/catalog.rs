// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Immutable catalogue snapshot and its atomically swappable handle.

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use regex::Regex;
use serde_json::{json, Value};
use thiserror::Error;

use crate::schema::{DeviceSchema, GroupPermissions, ParameterKind, PlanParameter, PlanSchema};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse {file}: {message}")]
    Parse { file: String, message: String },

    #[error("Invalid permission pattern '{pattern}' for group '{group}': {message}")]
    Pattern { group: String, pattern: String, message: String },
}

/// Compiled allow/deny rules for one user group.
#[derive(Debug)]
struct GroupRules {
    allowed_plans: Vec<Regex>,
    forbidden_plans: Vec<Regex>,
    allowed_devices: Vec<Regex>,
    forbidden_devices: Vec<Regex>,
}

fn compile(group: &str, patterns: &[String]) -> Result<Vec<Regex>, CatalogError> {
    patterns
        .iter()
        .map(|pattern| {
            // Anchor so 'count' does not also permit 'recount'
            Regex::new(&format!("^(?:{pattern})$")).map_err(|e| CatalogError::Pattern {
                group: group.to_string(),
                pattern: pattern.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

fn permitted(name: &str, allowed: &[Regex], forbidden: &[Regex]) -> bool {
    allowed.iter().any(|re| re.is_match(name)) && !forbidden.iter().any(|re| re.is_match(name))
}

/// Immutable snapshot of the plan/device catalogue and group permissions.
#[derive(Debug)]
pub struct Catalog {
    plans: IndexMap<String, PlanSchema>,
    devices: IndexMap<String, DeviceSchema>,
    groups: HashMap<String, GroupRules>,
}

impl Catalog {
    pub fn from_parts(
        plans: IndexMap<String, PlanSchema>,
        devices: IndexMap<String, DeviceSchema>,
        permissions: HashMap<String, GroupPermissions>,
    ) -> Result<Self, CatalogError> {
        let mut groups = HashMap::new();
        for (group, perms) in permissions {
            let rules = GroupRules {
                allowed_plans: compile(&group, &perms.allowed_plans)?,
                forbidden_plans: compile(&group, &perms.forbidden_plans)?,
                allowed_devices: compile(&group, &perms.allowed_devices)?,
                forbidden_devices: compile(&group, &perms.forbidden_devices)?,
            };
            groups.insert(group, rules);
        }
        Ok(Self { plans, devices, groups })
    }

    /// Built-in catalogue used when no catalogue directory is configured.
    ///
    /// Mirrors the startup collection the daemon ships with for tests and
    /// demos: `count`/`scan` plans, a couple of detectors and a motor, and
    /// `admin`/`primary` groups.
    pub fn builtin() -> Self {
        let detectors = PlanParameter {
            name: "detectors".to_string(),
            kind: ParameterKind::Positional,
            default: None,
        };
        let plans = IndexMap::from([
            (
                "count".to_string(),
                PlanSchema {
                    name: "count".to_string(),
                    description: Some("Read detectors a number of times".to_string()),
                    parameters: vec![
                        detectors.clone(),
                        PlanParameter {
                            name: "num".to_string(),
                            kind: ParameterKind::Keyword,
                            default: Some(json!(1)),
                        },
                        PlanParameter {
                            name: "delay".to_string(),
                            kind: ParameterKind::Keyword,
                            default: Some(json!(0)),
                        },
                    ],
                },
            ),
            (
                "scan".to_string(),
                PlanSchema {
                    name: "scan".to_string(),
                    description: Some("Scan a motor over a range".to_string()),
                    parameters: vec![
                        detectors,
                        PlanParameter {
                            name: "motor".to_string(),
                            kind: ParameterKind::Positional,
                            default: None,
                        },
                        PlanParameter {
                            name: "start".to_string(),
                            kind: ParameterKind::Positional,
                            default: None,
                        },
                        PlanParameter {
                            name: "stop".to_string(),
                            kind: ParameterKind::Positional,
                            default: None,
                        },
                        PlanParameter {
                            name: "num".to_string(),
                            kind: ParameterKind::Positional,
                            default: Some(json!(11)),
                        },
                    ],
                },
            ),
        ]);

        let devices = IndexMap::from([
            (
                "det1".to_string(),
                DeviceSchema { name: "det1".to_string(), description: None },
            ),
            (
                "det2".to_string(),
                DeviceSchema { name: "det2".to_string(), description: None },
            ),
            (
                "motor".to_string(),
                DeviceSchema { name: "motor".to_string(), description: None },
            ),
        ]);

        let permissions = HashMap::from([
            ("admin".to_string(), GroupPermissions::allow_all()),
            (
                "primary".to_string(),
                GroupPermissions {
                    allowed_plans: vec!["count".to_string(), "scan".to_string()],
                    forbidden_plans: vec![],
                    allowed_devices: vec!["det.*".to_string(), "motor".to_string()],
                    forbidden_devices: vec![],
                },
            ),
        ]);

        match Self::from_parts(plans, devices, permissions) {
            Ok(catalog) => catalog,
            Err(_) => unreachable!("builtin catalogue patterns are valid"),
        }
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.groups.contains_key(group)
    }

    pub fn plan(&self, name: &str) -> Option<&PlanSchema> {
        self.plans.get(name)
    }

    /// True when the plan exists and the group's rules permit it.
    pub fn plan_allowed(&self, group: &str, name: &str) -> bool {
        let Some(rules) = self.groups.get(group) else {
            return false;
        };
        self.plans.contains_key(name)
            && permitted(name, &rules.allowed_plans, &rules.forbidden_plans)
    }

    /// Map of plans the group may submit, as a JSON object for the reply.
    /// Returns `None` for an unknown group.
    pub fn plans_allowed(&self, group: &str) -> Option<Value> {
        self.groups.get(group)?;
        let mut map = serde_json::Map::new();
        for (name, schema) in &self.plans {
            if self.plan_allowed(group, name) {
                if let Ok(value) = serde_json::to_value(schema) {
                    map.insert(name.clone(), value);
                }
            }
        }
        Some(Value::Object(map))
    }

    /// Map of devices the group may use, as a JSON object for the reply.
    /// Returns `None` for an unknown group.
    pub fn devices_allowed(&self, group: &str) -> Option<Value> {
        let rules = self.groups.get(group)?;
        let mut map = serde_json::Map::new();
        for (name, schema) in &self.devices {
            if permitted(name, &rules.allowed_devices, &rules.forbidden_devices) {
                if let Ok(value) = serde_json::to_value(schema) {
                    map.insert(name.clone(), value);
                }
            }
        }
        Some(Value::Object(map))
    }
}

/// Shared handle over the current catalogue snapshot.
///
/// Readers clone the inner `Arc`; `swap` publishes a new snapshot without
/// blocking in-flight validations.
#[derive(Clone)]
pub struct CatalogHandle {
    inner: Arc<RwLock<Arc<Catalog>>>,
}

impl CatalogHandle {
    pub fn new(catalog: Catalog) -> Self {
        Self { inner: Arc::new(RwLock::new(Arc::new(catalog))) }
    }

    pub fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.inner.read())
    }

    pub fn swap(&self, catalog: Catalog) {
        *self.inner.write() = Arc::new(catalog);
    }
}

#[cfg(test)]
#[path = "catalog_tests.rs"]
mod tests;
