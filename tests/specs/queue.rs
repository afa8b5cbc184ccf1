//! Queue editing specs: add/get/remove/move and their failure modes.

use crate::prelude::*;
use serde_json::{json, Value};

#[test]
fn add_then_queue_get_returns_the_echoed_plan() {
    let manager = Manager::start();

    let reply = manager.add_count_plan(Value::Null, Value::Null);
    assert_eq!(reply["qsize"], 1);
    assert_eq!(reply["plan"]["name"], "count");
    assert_eq!(reply["plan"]["args"], json!([["det1", "det2"]]));
    assert_eq!(reply["plan"]["user"], "Testing Script");
    assert_eq!(reply["plan"]["user_group"], "admin");
    let uid = reply["plan"]["item_uid"].as_str().expect("item_uid present").to_string();
    assert!(!uid.is_empty());

    let queue = manager.call("queue_get", Value::Null);
    assert_eq!(queue["queue"].as_array().unwrap().len(), 1);
    assert_eq!(queue["queue"][0], reply["plan"]);
    assert_eq!(queue["running_item"], json!({}));

    let status = manager.status();
    assert_eq!(status["items_in_queue"], 1);
    assert_eq!(status["items_in_history"], 0);
}

#[test]
fn client_supplied_uid_is_replaced() {
    let manager = Manager::start();
    let reply = manager.call(
        "queue_item_add",
        json!({
            "plan": {"name": "count", "args": [["det1", "det2"]], "item_uid": "itm-forged"},
            "user": "Testing Script",
            "user_group": "admin",
        }),
    );
    assert_eq!(reply["success"], true, "{reply}");
    assert_ne!(reply["plan"]["item_uid"], "itm-forged");
}

#[test]
fn positional_adds_follow_the_clamp_rules() {
    let manager = Manager::start();

    // pre-seed two plans
    manager.add_count_plan(Value::Null, Value::Null);
    manager.add_count_plan(Value::Null, Value::Null);

    let front = manager.call(
        "queue_item_add",
        json!({
            "plan": {"name": "count", "args": [["det1", "det2"]]},
            "user": "Testing Script", "user_group": "admin", "pos": "front",
        }),
    );
    assert_eq!(front["success"], true, "{front}");
    assert_eq!(front["qsize"], 3);
    let queue = manager.call("queue_get", Value::Null);
    assert_eq!(queue["queue"][0]["item_uid"], front["plan"]["item_uid"]);

    // pos -1 into a 3-item queue: lands at index 2, the last item shifts right
    let minus_one = manager.call(
        "queue_item_add",
        json!({
            "plan": {"name": "count", "args": [["det1", "det2"]]},
            "user": "Testing Script", "user_group": "admin", "pos": -1,
        }),
    );
    assert_eq!(minus_one["qsize"], 4);
    let queue = manager.call("queue_get", Value::Null);
    assert_eq!(queue["queue"][2]["item_uid"], minus_one["plan"]["item_uid"]);

    // positions past the end clamp to the back
    let clamped = manager.call(
        "queue_item_add",
        json!({
            "plan": {"name": "count", "args": [["det1", "det2"]]},
            "user": "Testing Script", "user_group": "admin", "pos": 100,
        }),
    );
    assert_eq!(clamped["qsize"], 5);
    let queue = manager.call("queue_get", Value::Null);
    assert_eq!(queue["queue"][4]["item_uid"], clamped["plan"]["item_uid"]);
}

#[test]
fn ambiguous_add_parameters_are_rejected() {
    let manager = Manager::start();
    let seeded = manager.add_count_plan(Value::Null, Value::Null);
    let uid = seeded["plan"]["item_uid"].as_str().unwrap();

    // both before_uid and after_uid name the same anchor
    let reply = manager.call(
        "queue_item_add",
        json!({
            "plan": {"name": "count", "args": [["det1", "det2"]]},
            "user": "Testing Script", "user_group": "admin",
            "before_uid": uid, "after_uid": uid,
        }),
    );
    assert_eq!(reply["success"], false);
    let msg = reply["msg"].as_str().unwrap();
    assert!(msg.contains("Ambiguous parameters"), "{msg}");
    assert_eq!(reply["qsize"], Value::Null);
}

#[test]
fn get_by_returned_uid_round_trips() {
    let manager = Manager::start();
    let added = manager.add_count_plan(Value::Null, Value::Null);
    let uid = added["plan"]["item_uid"].as_str().unwrap();

    let reply = manager.call("queue_item_get", json!({"uid": uid}));
    assert_eq!(reply["success"], true);
    assert_eq!(reply["item"], added["plan"]);
}

#[test]
fn remove_right_after_add_restores_the_queue() {
    let manager = Manager::start();
    manager.add_count_plan(Value::Null, Value::Null);
    let added = manager.add_count_plan(Value::Null, Value::Null);
    let uid = added["plan"]["item_uid"].as_str().unwrap();

    let reply = manager.call("queue_item_remove", json!({"uid": uid}));
    assert_eq!(reply["success"], true);
    assert_eq!(reply["qsize"], 1);
    assert_eq!(reply["item"]["item_uid"], added["plan"]["item_uid"]);

    let status = manager.status();
    assert_eq!(status["items_in_queue"], 1);
}

#[test]
fn strict_indexing_for_get_and_remove() {
    let manager = Manager::start();
    manager.add_count_plan(Value::Null, Value::Null);

    let reply = manager.call("queue_item_get", json!({"pos": 5}));
    assert_eq!(reply["success"], false);
    assert!(reply["msg"].as_str().unwrap().contains("Failed to get an item"));

    let reply = manager.call("queue_item_remove", json!({"pos": -4}));
    assert_eq!(reply["success"], false);
    assert!(reply["msg"].as_str().unwrap().contains("Failed to remove an item"));
}

#[test]
fn move_to_front_reorders_the_queue() {
    let manager = Manager::start();
    manager.add_count_plan(Value::Null, Value::Null);
    let second = manager.add_count_plan(Value::Null, Value::Null);
    let uid = second["plan"]["item_uid"].as_str().unwrap();

    let reply = manager.call("queue_item_move", json!({"uid": uid, "pos_dest": "front"}));
    assert_eq!(reply["success"], true, "{reply}");
    assert_eq!(reply["qsize"], 2);

    let queue = manager.call("queue_get", Value::Null);
    assert_eq!(queue["queue"][0]["item_uid"], second["plan"]["item_uid"]);
}

#[test]
fn queue_clear_keeps_history() {
    let manager = Manager::start();
    manager.add_count_plan(Value::Null, Value::Null);
    manager.add_count_plan(Value::Null, Value::Null);

    let reply = manager.call("queue_clear", Value::Null);
    assert_eq!(reply["success"], true);
    assert_eq!(manager.status()["items_in_queue"], 0);
}

#[test]
fn plans_allowed_requires_a_known_group() {
    let manager = Manager::start();

    let reply = manager.call("plans_allowed", json!({"user_group": "admin"}));
    assert_eq!(reply["success"], true);
    assert!(reply["plans_allowed"].get("count").is_some());

    let reply = manager.call("plans_allowed", json!({"user_group": "strangers"}));
    assert_eq!(reply["success"], false);
    assert!(reply["msg"].as_str().unwrap().contains("Unknown user group"));

    let reply = manager.call("devices_allowed", json!({"user_group": "admin"}));
    assert_eq!(reply["success"], true);
    assert!(reply["devices_allowed"].get("det1").is_some());
}

#[test]
fn unknown_plan_and_bad_signature_are_rejected() {
    let manager = Manager::start();

    let reply = manager.call(
        "queue_item_add",
        json!({
            "plan": {"name": "open_shutter"},
            "user": "Testing Script", "user_group": "admin",
        }),
    );
    assert_eq!(reply["success"], false);
    assert!(reply["msg"].as_str().unwrap().contains("not in the list of allowed plans"));

    let reply = manager.call(
        "queue_item_add",
        json!({
            "plan": {"name": "count", "args": [["det1"]], "kwargs": {"speed": 1}},
            "user": "Testing Script", "user_group": "admin",
        }),
    );
    assert_eq!(reply["success"], false);
    assert!(reply["msg"].as_str().unwrap().contains("Plan validation failed"));
}

#[test]
fn permissions_reload_succeeds_with_builtin_catalogue() {
    let manager = Manager::start();
    let reply = manager.call("permissions_reload", Value::Null);
    assert_eq!(reply["success"], true, "{reply}");
}
