//! Execution specs: queue consumption, the running slot, pause controls,
//! and run-list tracking against a real worker process.

use crate::prelude::*;
use serde_json::{json, Value};

#[test]
fn queue_executes_and_commits_to_history() {
    let manager = Manager::start();
    manager.open_environment();

    manager.add_count_plan(json!({"num": 1, "delay": 0.05}), Value::Null);
    manager.add_count_plan(json!({"num": 1, "delay": 0.05}), Value::Null);

    let reply = manager.call("queue_start", Value::Null);
    assert_eq!(reply["success"], true, "{reply}");

    manager.wait_for_status("queue to drain", |status| {
        status["manager_state"] == "idle" && status["items_in_history"] == 2
    });

    let status = manager.status();
    assert_eq!(status["items_in_queue"], 0);
    assert_eq!(status["worker_environment_exists"], true);
    assert_eq!(status["running_item_uid"], Value::Null);

    let history = manager.call("history_get", Value::Null);
    for entry in history["history"].as_array().unwrap() {
        assert_eq!(entry["result"]["exit_status"], "completed");
        assert!(!entry["result"]["run_uids"].as_array().unwrap().is_empty());
    }
}

#[test]
fn insert_before_running_plan_is_rejected() {
    let manager = Manager::start();
    manager.open_environment();

    // a plan that runs for about five seconds
    let slow = manager.add_count_plan(json!({"num": 5, "delay": 1}), Value::Null);
    let running_uid = slow["plan"]["item_uid"].as_str().unwrap().to_string();

    let reply = manager.call("queue_start", Value::Null);
    assert_eq!(reply["success"], true, "{reply}");
    manager.wait_for_status("plan to start", |status| {
        status["running_item_uid"] == json!(running_uid)
    });

    let reply = manager.call(
        "queue_item_add",
        json!({
            "plan": {"name": "count", "args": [["det1", "det2"]]},
            "user": "Testing Script", "user_group": "admin",
            "before_uid": running_uid,
        }),
    );
    assert_eq!(reply["success"], false);
    assert!(
        reply["msg"]
            .as_str()
            .unwrap()
            .contains("Can not insert a plan in the queue before a currently running plan"),
        "{reply}",
    );

    let reply = manager.call(
        "queue_item_add",
        json!({
            "plan": {"name": "count", "args": [["det1", "det2"]]},
            "user": "Testing Script", "user_group": "admin",
            "after_uid": running_uid,
        }),
    );
    assert_eq!(reply["success"], true, "{reply}");
}

#[test]
fn queue_stop_instructions_partition_the_queue() {
    let manager = Manager::start();
    manager.open_environment();

    // layout: instruction, plan A, instruction, plan B
    manager.add_stop_instruction();
    manager.add_count_plan(json!({"num": 1, "delay": 0.05}), Value::Null);
    manager.add_stop_instruction();
    manager.add_count_plan(json!({"num": 1, "delay": 0.05}), Value::Null);

    let expected = [(3, 0), (1, 1), (0, 2)];
    for (items_in_queue, items_in_history) in expected {
        let reply = manager.call("queue_start", Value::Null);
        assert_eq!(reply["success"], true, "{reply}");
        manager.wait_for_status("cycle to finish", |status| {
            status["manager_state"] == "idle"
                && status["items_in_queue"] == items_in_queue
                && status["items_in_history"] == items_in_history
        });
    }
}

#[test]
fn queue_stop_pending_stops_between_plans() {
    let manager = Manager::start();
    manager.open_environment();

    manager.add_count_plan(json!({"num": 5, "delay": 0.6}), Value::Null);
    manager.add_count_plan(json!({"num": 1, "delay": 0.05}), Value::Null);

    manager.call("queue_start", Value::Null);
    manager.wait_for_status("plan to start", |status| {
        status["running_item_uid"] != Value::Null
    });

    let reply = manager.call("queue_stop", Value::Null);
    assert_eq!(reply["success"], true, "{reply}");
    assert_eq!(manager.status()["queue_stop_pending"], true);

    manager.wait_for_status("queue to stop", |status| {
        status["manager_state"] == "idle" && status["items_in_history"] == 1
    });
    let status = manager.status();
    assert_eq!(status["items_in_queue"], 1);
    assert_eq!(status["queue_stop_pending"], false);
}

#[test]
fn pause_resume_completes_the_plan() {
    let manager = Manager::start();
    manager.open_environment();

    manager.add_count_plan(json!({"num": 4, "delay": 0.3}), Value::Null);
    manager.call("queue_start", Value::Null);
    manager.wait_for_status("plan to start", |status| {
        status["running_item_uid"] != Value::Null
    });

    let reply = manager.call("re_pause", json!({"option": "immediate"}));
    assert_eq!(reply["success"], true, "{reply}");
    manager.wait_for_status("pause", |status| status["manager_state"] == "paused");

    let reply = manager.call("re_resume", Value::Null);
    assert_eq!(reply["success"], true, "{reply}");
    manager.wait_for_status("completion", |status| {
        status["manager_state"] == "idle" && status["items_in_history"] == 1
    });

    let history = manager.call("history_get", Value::Null);
    assert_eq!(history["history"][0]["result"]["exit_status"], "completed");
}

#[test]
fn abort_from_paused_fails_the_plan() {
    let manager = Manager::start();
    manager.open_environment();

    manager.add_count_plan(json!({"num": 20, "delay": 0.3}), Value::Null);
    manager.call("queue_start", Value::Null);
    manager.wait_for_status("plan to start", |status| {
        status["running_item_uid"] != Value::Null
    });

    // control commands require a paused plan
    let reply = manager.call("re_abort", Value::Null);
    assert_eq!(reply["success"], false);
    assert!(reply["msg"].as_str().unwrap().contains("not paused"));

    manager.call("re_pause", json!({"option": "immediate"}));
    manager.wait_for_status("pause", |status| status["manager_state"] == "paused");

    let reply = manager.call("re_abort", Value::Null);
    assert_eq!(reply["success"], true, "{reply}");
    manager.wait_for_status("abort to land", |status| {
        status["manager_state"] == "idle" && status["items_in_history"] == 1
    });

    let history = manager.call("history_get", Value::Null);
    assert_eq!(history["history"][0]["result"]["exit_status"], "aborted");
    // the queue does not continue after an abort
    assert_eq!(manager.status()["items_in_queue"], 0);
}

#[test]
fn run_list_subsets_stay_consistent_across_a_multi_run_plan() {
    let manager = Manager::start();
    manager.open_environment();

    // three nested runs
    manager.add_count_plan(json!({"num": 1, "delay": 0.3}), json!({"runs": 3}));
    let baseline_uid = manager.call("re_runs", json!({}))["run_list_uid"].clone();

    manager.call("queue_start", Value::Null);

    let mut last_uid = baseline_uid.as_str().unwrap().to_string();
    let mut non_empty_uids = Vec::new();
    let mut max_active = 0;
    let deadline = std::time::Instant::now() + WAIT_MAX;
    loop {
        assert!(std::time::Instant::now() < deadline, "plan did not finish in time");

        let active = manager.call("re_runs", json!({"option": "active"}));
        let uid = active["run_list_uid"].as_str().unwrap().to_string();
        if uid != last_uid {
            // at every change the subsets partition the full list, in order
            let open = manager.call("re_runs", json!({"option": "open"}));
            let closed = manager.call("re_runs", json!({"option": "closed"}));
            let all = active["run_list"].as_array().unwrap();
            let open = open["run_list"].as_array().unwrap().clone();
            let closed = closed["run_list"].as_array().unwrap().clone();

            let expected_open: Vec<Value> =
                all.iter().filter(|run| run["is_open"] == true).cloned().collect();
            let expected_closed: Vec<Value> =
                all.iter().filter(|run| run["is_open"] == false).cloned().collect();
            // subsets read moments apart can drift by one event; require
            // consistency only when the full list still matches
            let recheck = manager.call("re_runs", json!({"option": "active"}));
            if recheck["run_list_uid"] == active["run_list_uid"] {
                assert_eq!(open, expected_open);
                assert_eq!(closed, expected_closed);
            }

            max_active = max_active.max(all.len());
            if !all.is_empty() {
                non_empty_uids.push(uid.clone());
            }
            last_uid = uid;
        }

        let status = manager.status();
        if status["manager_state"] == "idle" && status["items_in_history"] == 1 {
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }

    assert!(max_active >= 2, "expected nested runs in the run list");

    // final run list is empty with a fresh token
    let final_runs = manager.call("re_runs", json!({}));
    assert!(final_runs["run_list"].as_array().unwrap().is_empty());
    let final_uid = final_runs["run_list_uid"].as_str().unwrap().to_string();
    assert!(!non_empty_uids.contains(&final_uid));
    assert_ne!(final_uid, baseline_uid.as_str().unwrap());

    let history = manager.call("history_get", Value::Null);
    assert_eq!(history["history"][0]["result"]["run_uids"].as_array().unwrap().len(), 3);
}
