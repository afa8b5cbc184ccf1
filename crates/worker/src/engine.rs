// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Run engine seam and the simulated engine.
//!
//! A plan executes as a sequence of checkpoints. Control signals (pause,
//! resume, stop, abort, halt) are honored at checkpoints; an `immediate`
//! pause takes effect mid-sleep. The engine reports run-open/run-close
//! events and a final [`PlanOutcome`].

use std::time::Duration;

use async_trait::async_trait;
use eq_core::{ExitStatus, PlanSpec};
use eq_wire::{PauseOption, PlanOutcome};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

/// Control signals into a running plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineControl {
    Pause(PauseOption),
    Resume,
    Stop,
    Abort,
    Halt,
}

/// Events emitted by the engine while a plan runs. `Finished` is always
/// the last event for a plan.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    RunOpened { run_uid: String },
    RunClosed { run_uid: String },
    Paused,
    Finished(PlanOutcome),
}

/// The run engine behind the worker.
#[async_trait]
pub trait RunEngine: Send + Sync + 'static {
    /// Execute one plan to completion, honoring control signals.
    async fn execute(
        &self,
        plan: PlanSpec,
        controls: mpsc::Receiver<EngineControl>,
        events: mpsc::Sender<EngineEvent>,
    ) -> PlanOutcome;
}

/// Simulated run engine.
///
/// `kwargs.num` checkpoints of `kwargs.delay` seconds run inside an outer
/// run; `meta.runs = n` opens `n - 1` additional nested runs that open and
/// close sequentially while the outer run stays open. Run UIDs are uuid-v4.
#[derive(Debug, Clone, Default)]
pub struct SimEngine;

/// How an interrupted plan ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Stopped,
    Aborted,
    Halted,
}

struct PlanCtx {
    controls: mpsc::Receiver<EngineControl>,
    events: mpsc::Sender<EngineEvent>,
    run_uids: Vec<String>,
    open_runs: Vec<String>,
}

impl PlanCtx {
    async fn open_run(&mut self) -> String {
        let run_uid = Uuid::new_v4().to_string();
        self.run_uids.push(run_uid.clone());
        self.open_runs.push(run_uid.clone());
        let _ = self.events.send(EngineEvent::RunOpened { run_uid: run_uid.clone() }).await;
        run_uid
    }

    async fn close_run(&mut self, run_uid: &str) {
        self.open_runs.retain(|uid| uid != run_uid);
        let _ = self.events.send(EngineEvent::RunClosed { run_uid: run_uid.to_string() }).await;
    }

    /// Park until resumed or interrupted.
    async fn pause_here(&mut self) -> Option<Interrupt> {
        let _ = self.events.send(EngineEvent::Paused).await;
        loop {
            match self.controls.recv().await {
                Some(EngineControl::Resume) => return None,
                Some(EngineControl::Stop) => return Some(Interrupt::Stopped),
                Some(EngineControl::Abort) => return Some(Interrupt::Aborted),
                Some(EngineControl::Halt) => return Some(Interrupt::Halted),
                // repeated pause while paused is a no-op
                Some(EngineControl::Pause(_)) => {}
                // controls dropped: the worker is going away
                None => return Some(Interrupt::Aborted),
            }
        }
    }

    /// Sleep for one checkpoint interval, honoring control signals.
    async fn checkpoint(&mut self, duration: Duration) -> Option<Interrupt> {
        let deadline = Instant::now() + duration;
        let mut pause_at_checkpoint = false;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    if pause_at_checkpoint {
                        if let Some(interrupt) = self.pause_here().await {
                            return Some(interrupt);
                        }
                    }
                    return None;
                }
                control = self.controls.recv() => match control {
                    Some(EngineControl::Pause(PauseOption::Immediate)) => {
                        if let Some(interrupt) = self.pause_here().await {
                            return Some(interrupt);
                        }
                    }
                    Some(EngineControl::Pause(PauseOption::Deferred)) => {
                        pause_at_checkpoint = true;
                    }
                    Some(EngineControl::Stop) => return Some(Interrupt::Stopped),
                    Some(EngineControl::Abort) => return Some(Interrupt::Aborted),
                    Some(EngineControl::Halt) => return Some(Interrupt::Halted),
                    Some(EngineControl::Resume) => {}
                    None => return Some(Interrupt::Aborted),
                }
            }
        }
    }

    /// Wind down after an interrupt. `halt` skips run cleanup.
    async fn finish_interrupted(mut self, interrupt: Interrupt) -> PlanOutcome {
        let (exit_status, msg) = match interrupt {
            Interrupt::Stopped => (ExitStatus::Stopped, None),
            Interrupt::Aborted => {
                (ExitStatus::Aborted, Some("Plan was aborted by the user".to_string()))
            }
            Interrupt::Halted => {
                (ExitStatus::Halted, Some("Plan was halted: runs were not closed".to_string()))
            }
        };
        if interrupt != Interrupt::Halted {
            for run_uid in std::mem::take(&mut self.open_runs) {
                self.close_run(&run_uid).await;
            }
        }
        PlanOutcome { exit_status, run_uids: self.run_uids, msg }
    }
}

fn kwarg_u64(plan: &PlanSpec, key: &str, fallback: u64) -> u64 {
    plan.kwargs.get(key).and_then(Value::as_u64).unwrap_or(fallback)
}

fn kwarg_f64(plan: &PlanSpec, key: &str, fallback: f64) -> f64 {
    plan.kwargs.get(key).and_then(Value::as_f64).unwrap_or(fallback)
}

fn meta_runs(plan: &PlanSpec) -> u64 {
    plan.meta
        .as_ref()
        .and_then(|meta| meta.get("runs"))
        .and_then(Value::as_u64)
        .unwrap_or(1)
        .max(1)
}

#[async_trait]
impl RunEngine for SimEngine {
    async fn execute(
        &self,
        plan: PlanSpec,
        controls: mpsc::Receiver<EngineControl>,
        events: mpsc::Sender<EngineEvent>,
    ) -> PlanOutcome {
        let num = kwarg_u64(&plan, "num", 1).max(1);
        let delay = Duration::from_secs_f64(kwarg_f64(&plan, "delay", 0.05).max(0.0));
        let nested = meta_runs(&plan);

        debug!(plan = %plan.name, num, nested, "executing plan");

        let mut ctx = PlanCtx { controls, events, run_uids: Vec::new(), open_runs: Vec::new() };

        let outer = ctx.open_run().await;
        for _ in 0..num {
            if let Some(interrupt) = ctx.checkpoint(delay).await {
                return ctx.finish_interrupted(interrupt).await;
            }
        }
        for _ in 1..nested {
            let inner = ctx.open_run().await;
            if let Some(interrupt) = ctx.checkpoint(delay).await {
                return ctx.finish_interrupted(interrupt).await;
            }
            ctx.close_run(&inner).await;
        }
        ctx.close_run(&outer).await;

        PlanOutcome { exit_status: ExitStatus::Completed, run_uids: ctx.run_uids, msg: None }
    }
}

#[cfg(test)]
#[path = "engine_tests.rs"]
mod tests;
