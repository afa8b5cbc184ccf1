// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    front = { "front" },
    back = { "back" },
)]
fn parse_pos_accepts_symbolic_names(pos: &str) {
    assert_eq!(parse_pos(pos).unwrap(), json!(pos));
}

#[parameterized(
    zero = { "0", 0 },
    positive = { "3", 3 },
    negative = { "-1", -1 },
)]
fn parse_pos_accepts_integers(raw: &str, expected: i64) {
    assert_eq!(parse_pos(raw).unwrap(), json!(expected));
}

#[test]
fn parse_pos_rejects_garbage() {
    let err = parse_pos("middle").unwrap_err();
    assert!(err.to_string().contains("invalid position"));
}

#[test]
fn selector_params_builds_partial_maps() {
    let params = selector_params(Some("front"), None).unwrap();
    assert_eq!(params, json!({"pos": "front"}));

    let params = selector_params(None, Some("itm-abc")).unwrap();
    assert_eq!(params, json!({"uid": "itm-abc"}));

    let params = selector_params(None, None).unwrap();
    assert_eq!(params, json!({}));
}

#[test]
fn cli_parses_queue_add_with_flags() {
    let cli = Cli::try_parse_from([
        "eq",
        "queue",
        "add",
        r#"{"name": "count", "args": [["det1", "det2"]]}"#,
        "--pos",
        "front",
        "--group",
        "primary",
    ])
    .unwrap();
    match cli.command {
        Command::Queue(QueueCommand::Add { plan, pos, group, instruction, .. }) => {
            assert!(plan.unwrap().contains("count"));
            assert_eq!(pos.as_deref(), Some("front"));
            assert_eq!(group, "primary");
            assert!(!instruction);
        }
        _ => panic!("wrong command"),
    }
}

#[test]
fn cli_parses_re_pause_immediate() {
    let cli = Cli::try_parse_from(["eq", "re", "pause", "--immediate"]).unwrap();
    match cli.command {
        Command::Re(ReCommand::Pause { immediate }) => assert!(immediate),
        _ => panic!("wrong command"),
    }
}

#[test]
fn cli_rejects_unknown_subcommands() {
    assert!(Cli::try_parse_from(["eq", "queue", "execute"]).is_err());
}
