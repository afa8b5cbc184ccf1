// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! eq: command-line client for the experiment queue manager.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod client;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};

use crate::client::Client;

#[derive(Parser)]
#[command(name = "eq", version, about = "Experiment queue manager client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Ping the manager and print its status
    Ping,
    /// Print the manager status envelope
    Status,
    /// Queue inspection and editing
    #[command(subcommand)]
    Queue(QueueCommand),
    /// Plan history
    #[command(subcommand)]
    History(HistoryCommand),
    /// Worker environment lifecycle
    #[command(subcommand)]
    Env(EnvCommand),
    /// Run engine control for the in-flight plan
    #[command(subcommand)]
    Re(ReCommand),
    /// List plans the group may submit
    PlansAllowed {
        #[arg(long, default_value = "admin")]
        group: String,
    },
    /// List devices the group may use
    DevicesAllowed {
        #[arg(long, default_value = "admin")]
        group: String,
    },
    /// Reload the permission/catalogue snapshot from disk
    PermissionsReload,
    /// Manager process lifecycle
    #[command(subcommand)]
    Manager(ManagerCommand),
}

#[derive(Subcommand)]
enum QueueCommand {
    /// Print the queue and the running item
    Get,
    /// Add a plan (JSON payload) or a queue-stop instruction
    Add {
        /// Plan payload, e.g. '{"name": "count", "args": [["det1", "det2"]]}'
        plan: Option<String>,
        /// Add a queue_stop instruction instead of a plan
        #[arg(long)]
        instruction: bool,
        /// Position: "front", "back", or an integer (negatives from the back)
        #[arg(long)]
        pos: Option<String>,
        #[arg(long)]
        before_uid: Option<String>,
        #[arg(long)]
        after_uid: Option<String>,
        #[arg(long, default_value = "CLI Client")]
        user: String,
        #[arg(long, default_value = "admin")]
        group: String,
    },
    /// Print one item
    Item {
        #[arg(long)]
        pos: Option<String>,
        #[arg(long)]
        uid: Option<String>,
    },
    /// Remove one item
    Remove {
        #[arg(long)]
        pos: Option<String>,
        #[arg(long)]
        uid: Option<String>,
    },
    /// Move one item
    Move {
        #[arg(long)]
        pos: Option<String>,
        #[arg(long)]
        uid: Option<String>,
        #[arg(long)]
        dest: Option<String>,
        #[arg(long)]
        before_uid: Option<String>,
        #[arg(long)]
        after_uid: Option<String>,
    },
    /// Remove every item from the queue
    Clear,
    /// Start executing the queue
    Start,
    /// Stop after the current plan completes
    Stop,
    /// Cancel a pending queue stop
    StopCancel,
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// Print the history of completed items
    Get,
    /// Clear the history
    Clear,
}

#[derive(Subcommand)]
enum EnvCommand {
    /// Create the worker environment
    Open,
    /// Close the worker environment gracefully
    Close,
    /// Kill the worker process (last resort)
    Destroy,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum RunsOption {
    Active,
    Open,
    Closed,
}

#[derive(Subcommand)]
enum ReCommand {
    /// Pause the running plan
    Pause {
        /// Pause immediately instead of at the next checkpoint
        #[arg(long)]
        immediate: bool,
    },
    /// Resume a paused plan
    Resume,
    /// Finish the paused plan as successfully stopped
    Stop,
    /// Finish the paused plan as failed
    Abort,
    /// Finish the paused plan as failed, skipping cleanup
    Halt,
    /// Print the run list of the current plan
    Runs {
        #[arg(long, value_enum, default_value_t = RunsOption::Active)]
        option: RunsOption,
    },
}

#[derive(Subcommand)]
enum ManagerCommand {
    /// Stop the manager process
    Stop {
        /// Stop even while the queue is executing
        #[arg(long)]
        safe_off: bool,
    },
    /// Kill the manager event loop (testing hook; it restarts itself)
    Kill,
}

/// Parse "front"/"back"/integer into a wire position value.
fn parse_pos(pos: &str) -> Result<Value> {
    match pos {
        "front" | "back" => Ok(json!(pos)),
        other => {
            let index: i64 = other
                .parse()
                .with_context(|| format!("invalid position '{other}' (front/back/integer)"))?;
            Ok(json!(index))
        }
    }
}

fn selector_params(pos: Option<&str>, uid: Option<&str>) -> Result<Value> {
    let mut params = serde_json::Map::new();
    if let Some(pos) = pos {
        params.insert("pos".to_string(), parse_pos(pos)?);
    }
    if let Some(uid) = uid {
        params.insert("uid".to_string(), json!(uid));
    }
    Ok(Value::Object(params))
}

async fn run(cli: Cli) -> Result<()> {
    let client = Client::from_env()?;

    let reply = match cli.command {
        Command::Ping => client.call("ping", Value::Null).await?,
        Command::Status => client.call("status", Value::Null).await?,
        Command::Queue(command) => match command {
            QueueCommand::Get => client.call("queue_get", Value::Null).await?,
            QueueCommand::Add { plan, instruction, pos, before_uid, after_uid, user, group } => {
                let mut params = serde_json::Map::new();
                match (plan, instruction) {
                    (Some(_), true) => bail!("pass either a plan payload or --instruction"),
                    (Some(plan), false) => {
                        let payload: Value = serde_json::from_str(&plan)
                            .context("plan payload is not valid JSON")?;
                        params.insert("plan".to_string(), payload);
                    }
                    (None, true) => {
                        params.insert("instruction".to_string(), json!({"action": "queue_stop"}));
                    }
                    (None, false) => bail!("pass a plan payload or --instruction"),
                }
                if let Some(pos) = pos {
                    params.insert("pos".to_string(), parse_pos(&pos)?);
                }
                if let Some(uid) = before_uid {
                    params.insert("before_uid".to_string(), json!(uid));
                }
                if let Some(uid) = after_uid {
                    params.insert("after_uid".to_string(), json!(uid));
                }
                params.insert("user".to_string(), json!(user));
                params.insert("user_group".to_string(), json!(group));
                client.call("queue_item_add", Value::Object(params)).await?
            }
            QueueCommand::Item { pos, uid } => {
                client
                    .call("queue_item_get", selector_params(pos.as_deref(), uid.as_deref())?)
                    .await?
            }
            QueueCommand::Remove { pos, uid } => {
                client
                    .call("queue_item_remove", selector_params(pos.as_deref(), uid.as_deref())?)
                    .await?
            }
            QueueCommand::Move { pos, uid, dest, before_uid, after_uid } => {
                let mut params = match selector_params(pos.as_deref(), uid.as_deref())? {
                    Value::Object(map) => map,
                    _ => serde_json::Map::new(),
                };
                if let Some(dest) = dest {
                    params.insert("pos_dest".to_string(), parse_pos(&dest)?);
                }
                if let Some(uid) = before_uid {
                    params.insert("before_uid".to_string(), json!(uid));
                }
                if let Some(uid) = after_uid {
                    params.insert("after_uid".to_string(), json!(uid));
                }
                client.call("queue_item_move", Value::Object(params)).await?
            }
            QueueCommand::Clear => client.call("queue_clear", Value::Null).await?,
            QueueCommand::Start => client.call("queue_start", Value::Null).await?,
            QueueCommand::Stop => client.call("queue_stop", Value::Null).await?,
            QueueCommand::StopCancel => client.call("queue_stop_cancel", Value::Null).await?,
        },
        Command::History(command) => match command {
            HistoryCommand::Get => client.call("history_get", Value::Null).await?,
            HistoryCommand::Clear => client.call("history_clear", Value::Null).await?,
        },
        Command::Env(command) => match command {
            EnvCommand::Open => client.call("environment_open", Value::Null).await?,
            EnvCommand::Close => client.call("environment_close", Value::Null).await?,
            EnvCommand::Destroy => client.call("environment_destroy", Value::Null).await?,
        },
        Command::Re(command) => match command {
            ReCommand::Pause { immediate } => {
                let option = if immediate { "immediate" } else { "deferred" };
                client.call("re_pause", json!({"option": option})).await?
            }
            ReCommand::Resume => client.call("re_resume", Value::Null).await?,
            ReCommand::Stop => client.call("re_stop", Value::Null).await?,
            ReCommand::Abort => client.call("re_abort", Value::Null).await?,
            ReCommand::Halt => client.call("re_halt", Value::Null).await?,
            ReCommand::Runs { option } => {
                let option = match option {
                    RunsOption::Active => "active",
                    RunsOption::Open => "open",
                    RunsOption::Closed => "closed",
                };
                client.call("re_runs", json!({"option": option})).await?
            }
        },
        Command::PlansAllowed { group } => {
            client.call("plans_allowed", json!({"user_group": group})).await?
        }
        Command::DevicesAllowed { group } => {
            client.call("devices_allowed", json!({"user_group": group})).await?
        }
        Command::PermissionsReload => client.call("permissions_reload", Value::Null).await?,
        Command::Manager(command) => {
            let (method, params) = match command {
                ManagerCommand::Stop { safe_off } => {
                    let option = if safe_off { "safe_off" } else { "safe_on" };
                    ("manager_stop", json!({"option": option}))
                }
                ManagerCommand::Kill => ("manager_kill", Value::Null),
            };
            match client.call_no_reply(method, params).await? {
                Some(reply) => reply,
                None => {
                    // no reply means the request took effect
                    println!("{}", json!({"success": true}));
                    return Ok(());
                }
            }
        }
    };

    println!("{}", serde_json::to_string_pretty(&reply)?);
    if reply.get("success").and_then(Value::as_bool) == Some(false) {
        std::process::exit(1);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    run(Cli::parse()).await
}

#[cfg(test)]
#[path = "main_tests.rs"]
mod tests;
