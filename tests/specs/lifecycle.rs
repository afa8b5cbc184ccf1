//! Manager and environment lifecycle specs: open/close/destroy, crash
//! restart, and rehydration from the persisted image.

use crate::prelude::*;
use serde_json::{json, Value};

#[test]
fn environment_open_twice_reports_already_exists() {
    let manager = Manager::start();
    manager.open_environment();
    manager.add_count_plan(Value::Null, Value::Null);

    let before = manager.status();
    let reply = manager.call("environment_open", Value::Null);
    assert_eq!(reply["success"], false);
    assert!(reply["msg"].as_str().unwrap().contains("already exists"), "{reply}");

    // the failed open perturbs neither the queue nor the state
    let after = manager.status();
    assert_eq!(after["items_in_queue"], before["items_in_queue"]);
    assert_eq!(after["manager_state"], before["manager_state"]);
    assert_eq!(after["plan_queue_uid"], before["plan_queue_uid"]);

    let reply = manager.call("environment_open", Value::Null);
    assert!(reply["msg"].as_str().unwrap().contains("already exists"));
}

#[test]
fn environment_close_requires_an_idle_queue() {
    let manager = Manager::start();

    let reply = manager.call("environment_close", Value::Null);
    assert_eq!(reply["success"], false);
    assert!(reply["msg"].as_str().unwrap().contains("does not exist"));

    manager.open_environment();
    manager.add_count_plan(json!({"num": 5, "delay": 1}), Value::Null);
    manager.call("queue_start", Value::Null);
    manager.wait_for_status("plan to start", |status| {
        status["running_item_uid"] != Value::Null
    });

    let reply = manager.call("environment_close", Value::Null);
    assert_eq!(reply["success"], false);
    assert!(reply["msg"].as_str().unwrap().contains("Queue execution is in progress"));
}

#[test]
fn environment_close_then_reopen() {
    let manager = Manager::start();
    manager.open_environment();

    let reply = manager.call("environment_close", Value::Null);
    assert_eq!(reply["success"], true, "{reply}");
    manager.wait_for_status("environment to close", |status| {
        status["worker_environment_exists"] == false && status["manager_state"] == "idle"
    });

    manager.open_environment();
}

#[test]
fn environment_destroy_kills_a_running_plan() {
    let manager = Manager::start();
    manager.open_environment();
    manager.add_count_plan(json!({"num": 30, "delay": 1}), Value::Null);
    manager.call("queue_start", Value::Null);
    manager.wait_for_status("plan to start", |status| {
        status["running_item_uid"] != Value::Null
    });

    let reply = manager.call("environment_destroy", Value::Null);
    assert_eq!(reply["success"], true, "{reply}");
    manager.wait_for_status("environment to be destroyed", |status| {
        status["worker_environment_exists"] == false && status["manager_state"] == "idle"
    });

    let history = manager.call("history_get", Value::Null);
    assert_eq!(history["history"].as_array().unwrap().len(), 1);
    assert_eq!(history["history"][0]["result"]["exit_status"], "worker_died");
}

#[test]
fn manager_kill_restarts_with_the_queue_intact() {
    let manager = Manager::start();

    // one plan in the queue, then kill the event loop
    manager.add_count_plan(Value::Null, Value::Null);
    manager.call_expect_no_reply("manager_kill");

    // the self-supervisor restarts the loop and rehydrates the image
    manager.wait_for_status("manager to come back", |status| {
        status["manager_state"] == "idle"
            && status["items_in_queue"] == 1
            && status["items_in_history"] == 0
    });
}

#[test]
fn manager_kill_with_an_environment_reattaches_the_worker() {
    let manager = Manager::start();
    manager.open_environment();

    manager.call_expect_no_reply("manager_kill");

    manager.wait_for_status("worker to re-attach", |status| {
        status["manager_state"] == "idle" && status["worker_environment_exists"] == true
    });

    // the re-attached environment still executes plans
    manager.add_count_plan(json!({"num": 1, "delay": 0.05}), Value::Null);
    let reply = manager.call("queue_start", Value::Null);
    assert_eq!(reply["success"], true, "{reply}");
    manager.wait_for_status("plan to complete", |status| {
        status["items_in_history"] == 1 && status["manager_state"] == "idle"
    });
}

#[test]
fn queue_survives_across_kill_while_executing() {
    let manager = Manager::start();
    manager.open_environment();
    manager.add_count_plan(json!({"num": 8, "delay": 1}), Value::Null);
    manager.add_count_plan(json!({"num": 1, "delay": 0.05}), Value::Null);
    manager.call("queue_start", Value::Null);
    manager.wait_for_status("plan to start", |status| {
        status["running_item_uid"] != Value::Null
    });

    manager.call_expect_no_reply("manager_kill");

    // the worker survives, re-attaches busy, and the plan finishes
    manager.wait_for_status("execution to resume and drain", |status| {
        status["manager_state"] == "idle" && status["items_in_history"] == 2
    });
    let history = manager.call("history_get", Value::Null);
    assert_eq!(history["history"][0]["result"]["exit_status"], "completed");
}

#[test]
fn manager_stop_exits_the_process() {
    let manager = Manager::start();
    manager.call_expect_no_reply("manager_stop");

    let deadline = std::time::Instant::now() + WAIT_MAX;
    loop {
        if manager.try_call("status", Value::Null).is_err() {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "manager did not exit");
        std::thread::sleep(std::time::Duration::from_millis(50));
    }
}
