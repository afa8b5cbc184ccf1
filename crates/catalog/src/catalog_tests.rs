// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn builtin_catalogue_has_expected_groups() {
    let catalog = Catalog::builtin();
    assert!(catalog.has_group("admin"));
    assert!(catalog.has_group("primary"));
    assert!(!catalog.has_group("guests"));
}

#[parameterized(
    admin_count = { "admin", "count", true },
    admin_scan = { "admin", "scan", true },
    primary_count = { "primary", "count", true },
    unknown_plan = { "admin", "recount", false },
    unknown_group = { "guests", "count", false },
)]
fn plan_allowed(group: &str, plan: &str, expected: bool) {
    let catalog = Catalog::builtin();
    assert_eq!(catalog.plan_allowed(group, plan), expected);
}

#[test]
fn patterns_are_anchored() {
    let plans = IndexMap::from([
        ("count".to_string(), PlanSchema { name: "count".to_string(), ..Default::default() }),
        ("recount".to_string(), PlanSchema { name: "recount".to_string(), ..Default::default() }),
    ]);
    let permissions = HashMap::from([(
        "ops".to_string(),
        GroupPermissions {
            allowed_plans: vec!["count".to_string()],
            ..Default::default()
        },
    )]);
    let catalog = Catalog::from_parts(plans, IndexMap::new(), permissions).unwrap();
    assert!(catalog.plan_allowed("ops", "count"));
    assert!(!catalog.plan_allowed("ops", "recount"));
}

#[test]
fn forbidden_patterns_override_allowed() {
    let plans = IndexMap::from([
        ("count".to_string(), PlanSchema { name: "count".to_string(), ..Default::default() }),
        ("scan".to_string(), PlanSchema { name: "scan".to_string(), ..Default::default() }),
    ]);
    let permissions = HashMap::from([(
        "ops".to_string(),
        GroupPermissions {
            allowed_plans: vec![".*".to_string()],
            forbidden_plans: vec!["scan".to_string()],
            ..Default::default()
        },
    )]);
    let catalog = Catalog::from_parts(plans, IndexMap::new(), permissions).unwrap();
    assert!(catalog.plan_allowed("ops", "count"));
    assert!(!catalog.plan_allowed("ops", "scan"));
}

#[test]
fn plans_allowed_returns_none_for_unknown_group() {
    let catalog = Catalog::builtin();
    assert!(catalog.plans_allowed("guests").is_none());

    let allowed = catalog.plans_allowed("admin").unwrap();
    assert!(allowed.get("count").is_some());
    assert!(allowed.get("scan").is_some());
}

#[test]
fn devices_allowed_filters_by_group_rules() {
    let catalog = Catalog::builtin();
    let devices = catalog.devices_allowed("primary").unwrap();
    assert!(devices.get("det1").is_some());
    assert!(devices.get("det2").is_some());
    assert!(devices.get("motor").is_some());
}

#[test]
fn invalid_pattern_is_a_load_error() {
    let permissions = HashMap::from([(
        "ops".to_string(),
        GroupPermissions { allowed_plans: vec!["(".to_string()], ..Default::default() },
    )]);
    let err = Catalog::from_parts(IndexMap::new(), IndexMap::new(), permissions).unwrap_err();
    assert!(matches!(err, CatalogError::Pattern { .. }));
}

#[test]
fn handle_swap_publishes_new_snapshot() {
    let handle = CatalogHandle::new(Catalog::builtin());
    let before = handle.snapshot();
    assert!(before.has_group("primary"));

    let replacement =
        Catalog::from_parts(IndexMap::new(), IndexMap::new(), HashMap::new()).unwrap();
    handle.swap(replacement);

    assert!(!handle.snapshot().has_group("primary"));
    // old snapshot stays usable for in-flight validation
    assert!(before.has_group("primary"));
}
