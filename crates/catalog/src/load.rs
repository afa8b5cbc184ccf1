// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Catalogue loading from a directory of TOML files.
//!
//! Layout:
//! - `plans.toml`   — `[plans.<name>]` tables with parameter lists
//! - `devices.toml` — `[devices.<name>]` tables (optional file)
//! - `groups.toml`  — `[groups.<name>]` permission tables

use std::collections::HashMap;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::info;

use crate::catalog::{Catalog, CatalogError};
use crate::schema::{DeviceSchema, GroupPermissions, PlanSchema};

#[derive(Debug, Deserialize)]
struct PlansFile {
    #[serde(default)]
    plans: IndexMap<String, PlanSchema>,
}

#[derive(Debug, Deserialize)]
struct DevicesFile {
    #[serde(default)]
    devices: IndexMap<String, DeviceSchema>,
}

#[derive(Debug, Deserialize)]
struct GroupsFile {
    #[serde(default)]
    groups: HashMap<String, GroupPermissions>,
}

fn read_toml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CatalogError> {
    let text = std::fs::read_to_string(path)?;
    toml::from_str(&text).map_err(|e| CatalogError::Parse {
        file: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Load a catalogue from `dir`. `devices.toml` may be absent.
pub fn load_dir(dir: &Path) -> Result<Catalog, CatalogError> {
    let plans_file: PlansFile = read_toml(&dir.join("plans.toml"))?;
    let groups_file: GroupsFile = read_toml(&dir.join("groups.toml"))?;

    let devices_path = dir.join("devices.toml");
    let devices_file: DevicesFile = if devices_path.exists() {
        read_toml(&devices_path)?
    } else {
        DevicesFile { devices: IndexMap::new() }
    };

    let mut plans = plans_file.plans;
    for (name, schema) in plans.iter_mut() {
        schema.name = name.clone();
    }
    let mut devices = devices_file.devices;
    for (name, schema) in devices.iter_mut() {
        schema.name = name.clone();
    }

    info!(
        plans = plans.len(),
        devices = devices.len(),
        groups = groups_file.groups.len(),
        dir = %dir.display(),
        "loaded catalogue",
    );

    Catalog::from_parts(plans, devices, groups_file.groups)
}

#[cfg(test)]
#[path = "load_tests.rs"]
mod tests;
