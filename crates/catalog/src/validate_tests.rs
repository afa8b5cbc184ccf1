// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use eq_core::InstructionAction;
use serde_json::json;

fn catalog() -> Catalog {
    Catalog::builtin()
}

fn count_plan() -> PlanSpec {
    PlanSpec {
        name: "count".into(),
        args: vec![json!(["det1", "det2"])],
        kwargs: serde_json::Map::new(),
        meta: None,
    }
}

fn raw_plan(plan: PlanSpec) -> RawItem {
    RawItem {
        plan: Some(plan),
        instruction: None,
        user: Some("Testing Script".to_string()),
        user_group: Some("admin".to_string()),
    }
}

#[test]
fn accepted_plan_gets_fresh_uid_and_attribution() {
    let item = validate_item(raw_plan(count_plan()), &catalog()).unwrap();
    assert!(item.item_uid.as_str().starts_with("itm-"));
    assert_eq!(item.user, "Testing Script");
    assert_eq!(item.user_group, "admin");
    assert_eq!(item.plan().unwrap().name, "count");
}

#[test]
fn two_validations_never_share_a_uid() {
    let first = validate_item(raw_plan(count_plan()), &catalog()).unwrap();
    let second = validate_item(raw_plan(count_plan()), &catalog()).unwrap();
    assert_ne!(first.item_uid, second.item_uid);
}

#[test]
fn instruction_is_accepted_without_allow_list_check() {
    let raw = RawItem {
        plan: None,
        instruction: Some(InstructionSpec { action: InstructionAction::QueueStop }),
        user: Some("Testing Script".to_string()),
        user_group: Some("admin".to_string()),
    };
    let item = validate_item(raw, &catalog()).unwrap();
    assert!(item.is_instruction());
}

#[test]
fn missing_user_is_rejected() {
    let mut raw = raw_plan(count_plan());
    raw.user = None;
    let err = validate_item(raw, &catalog()).unwrap_err();
    assert_eq!(err, ValidateError::MissingUser);

    let mut raw = raw_plan(count_plan());
    raw.user = Some(String::new());
    let err = validate_item(raw, &catalog()).unwrap_err();
    assert_eq!(err, ValidateError::MissingUser);
}

#[test]
fn missing_user_group_is_rejected() {
    let mut raw = raw_plan(count_plan());
    raw.user_group = None;
    let err = validate_item(raw, &catalog()).unwrap_err();
    assert_eq!(err, ValidateError::MissingUserGroup);
}

#[test]
fn unknown_user_group_is_rejected() {
    let mut raw = raw_plan(count_plan());
    raw.user_group = Some("guests".to_string());
    let err = validate_item(raw, &catalog()).unwrap_err();
    assert!(err.to_string().contains("Unknown user group"));
}

#[test]
fn empty_item_is_rejected() {
    let raw = RawItem {
        plan: None,
        instruction: None,
        user: Some("Testing Script".to_string()),
        user_group: Some("admin".to_string()),
    };
    let err = validate_item(raw, &catalog()).unwrap_err();
    assert_eq!(err, ValidateError::NoItem);
}

#[test]
fn plan_and_instruction_together_are_ambiguous() {
    let mut raw = raw_plan(count_plan());
    raw.instruction = Some(InstructionSpec { action: InstructionAction::QueueStop });
    let err = validate_item(raw, &catalog()).unwrap_err();
    assert!(err.to_string().contains("Ambiguous parameters"));
}

#[test]
fn plan_outside_allow_list_is_rejected() {
    let mut plan = count_plan();
    plan.name = "open_shutter".into();
    let err = validate_item(raw_plan(plan), &catalog()).unwrap_err();
    assert!(err.to_string().contains("is not in the list of allowed plans"));
}

#[test]
fn too_many_positional_args_fail_signature_check() {
    let mut plan = count_plan();
    plan.args = vec![json!(["det1"]), json!("extra")];
    let err = validate_item(raw_plan(plan), &catalog()).unwrap_err();
    assert!(err.to_string().contains("Plan validation failed"));
    assert!(err.to_string().contains("positional argument"));
}

#[test]
fn unknown_kwarg_fails_signature_check() {
    let mut plan = count_plan();
    plan.kwargs.insert("speed".to_string(), json!(2));
    let err = validate_item(raw_plan(plan), &catalog()).unwrap_err();
    assert!(err.to_string().contains("unexpected argument 'speed'"));
}

#[test]
fn known_kwargs_pass_signature_check() {
    let mut plan = count_plan();
    plan.kwargs.insert("num".to_string(), json!(5));
    plan.kwargs.insert("delay".to_string(), json!(1));
    let item = validate_item(raw_plan(plan), &catalog()).unwrap();
    assert_eq!(item.plan().unwrap().kwargs["num"], json!(5));
}

#[test]
fn missing_required_arg_fails_signature_check() {
    let mut plan = count_plan();
    plan.args = vec![];
    let err = validate_item(raw_plan(plan), &catalog()).unwrap_err();
    assert!(err.to_string().contains("missing required argument 'detectors'"));
}

#[test]
fn positional_arg_rebound_by_keyword_fails() {
    let mut plan = count_plan();
    plan.kwargs.insert("detectors".to_string(), json!(["det1"]));
    let err = validate_item(raw_plan(plan), &catalog()).unwrap_err();
    assert!(err.to_string().contains("multiple values for argument 'detectors'"));
}

#[test]
fn scan_signature_accepts_full_positional_form() {
    let plan = PlanSpec {
        name: "scan".into(),
        args: vec![json!(["det1", "det2"]), json!("motor"), json!(-1), json!(1), json!(10)],
        kwargs: serde_json::Map::new(),
        meta: None,
    };
    let item = validate_item(raw_plan(plan), &catalog()).unwrap();
    assert_eq!(item.plan().unwrap().args.len(), 5);
}
