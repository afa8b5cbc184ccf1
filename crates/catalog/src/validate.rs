// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Item validation: raw plan/instruction + user attribution → accepted item.

use eq_core::{InstructionSpec, Item, ItemPayload, ItemUid, PlanSpec};
use serde_json::Value;
use thiserror::Error;

use crate::catalog::Catalog;
use crate::schema::{ParameterKind, PlanSchema};

/// Validation failures. `Display` output is the user-facing message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidateError {
    #[error("User name is not specified")]
    MissingUser,

    #[error("User group is not specified")]
    MissingUserGroup,

    #[error("Unknown user group: '{0}'")]
    UnknownUserGroup(String),

    #[error("Incorrect request format: request contains no item info")]
    NoItem,

    #[error("Ambiguous parameters: both 'plan' and 'instruction' are specified")]
    AmbiguousItem,

    #[error("Plan '{0}' is not in the list of allowed plans")]
    UnknownPlan(String),

    #[error("Plan validation failed: {0}")]
    BadPlanSignature(String),
}

/// Unvalidated item info as received from a client.
#[derive(Debug, Clone, Default)]
pub struct RawItem {
    pub plan: Option<PlanSpec>,
    pub instruction: Option<InstructionSpec>,
    pub user: Option<String>,
    pub user_group: Option<String>,
}

/// Validate a raw item and stamp it for the queue.
///
/// A fresh `item_uid` is always assigned; any UID a client smuggled into
/// the payload was already dropped during deserialization.
pub fn validate_item(raw: RawItem, catalog: &Catalog) -> Result<Item, ValidateError> {
    let user = raw.user.filter(|u| !u.is_empty()).ok_or(ValidateError::MissingUser)?;
    let user_group =
        raw.user_group.filter(|g| !g.is_empty()).ok_or(ValidateError::MissingUserGroup)?;
    if !catalog.has_group(&user_group) {
        return Err(ValidateError::UnknownUserGroup(user_group));
    }

    let payload = match (raw.plan, raw.instruction) {
        (Some(_), Some(_)) => return Err(ValidateError::AmbiguousItem),
        (None, None) => return Err(ValidateError::NoItem),
        (Some(plan), None) => {
            if !catalog.plan_allowed(&user_group, &plan.name) {
                return Err(ValidateError::UnknownPlan(plan.name.to_string()));
            }
            let schema = catalog
                .plan(&plan.name)
                .ok_or_else(|| ValidateError::UnknownPlan(plan.name.to_string()))?;
            check_signature(schema, &plan.args, &plan.kwargs)
                .map_err(ValidateError::BadPlanSignature)?;
            ItemPayload::Plan(plan)
        }
        (None, Some(instruction)) => ItemPayload::Instruction(instruction),
    };

    Ok(Item { item_uid: ItemUid::new(), user, user_group: user_group.into(), payload })
}

/// Check call arguments against the declared plan signature.
fn check_signature(
    schema: &PlanSchema,
    args: &[Value],
    kwargs: &serde_json::Map<String, Value>,
) -> Result<(), String> {
    let positional: Vec<_> = schema
        .parameters
        .iter()
        .filter(|p| p.kind == ParameterKind::Positional)
        .collect();
    let has_var_positional =
        schema.parameters.iter().any(|p| p.kind == ParameterKind::VarPositional);
    let has_var_keyword = schema.parameters.iter().any(|p| p.kind == ParameterKind::VarKeyword);

    if args.len() > positional.len() && !has_var_positional {
        return Err(format!(
            "plan '{}' accepts {} positional argument(s), {} given",
            schema.name,
            positional.len(),
            args.len()
        ));
    }

    // Names bound by position may not be bound again by keyword
    let bound_by_position: Vec<&str> =
        positional.iter().take(args.len()).map(|p| p.name.as_str()).collect();

    for key in kwargs.keys() {
        if bound_by_position.contains(&key.as_str()) {
            return Err(format!("plan '{}' got multiple values for argument '{key}'", schema.name));
        }
        let known = schema.parameters.iter().any(|p| {
            p.name == *key
                && matches!(p.kind, ParameterKind::Positional | ParameterKind::Keyword)
        });
        if !known && !has_var_keyword {
            return Err(format!("plan '{}' got an unexpected argument '{key}'", schema.name));
        }
    }

    for parameter in &schema.parameters {
        if !parameter.is_required() {
            continue;
        }
        let bound = bound_by_position.contains(&parameter.name.as_str())
            || kwargs.contains_key(&parameter.name);
        if !bound {
            return Err(format!(
                "plan '{}' is missing required argument '{}'",
                schema.name, parameter.name
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
