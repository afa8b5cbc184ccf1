// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Manager core: the queue, the run tracker, and the state machine.
//!
//! Everything in this module is synchronous and runs under the single
//! manager mutex — the serialization point for all observable state
//! changes. I/O (persistence, worker commands, socket replies) happens in
//! the engine after the lock is released.

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use eq_catalog::{validate_item, CatalogHandle, RawItem};
use eq_core::{
    InsertSpec, Item, ItemResult, ItemSelector, ItemUid, ManagerState, MoveDest, PlanQueue,
    RunTracker, RunsOption,
};
use eq_storage::{QueueImage, Settings};
use eq_wire::{
    AddItemParams, AddItemReply, DevicesAllowedReply, GroupParams, HistoryReply, ItemOpReply,
    ItemReply, MoveParams, PlanOutcome, PlansAllowedReply, QueueGetReply, RunsReply,
    SelectorParams, SimpleReply, StatusReply, StopOption, StopParams, WorkerCommand,
};
use tracing::{error, info, warn};

fn epoch_ms_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// What the engine should do after the queue advanced.
#[derive(Debug, Clone, PartialEq)]
pub enum Advance {
    /// A plan moved into the running slot; send it to the worker.
    Start(Item),
    /// Queue drained, stop pending, or a stop instruction was consumed.
    Idle,
}

/// What happened when a plan left the running slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishDisposition {
    /// Completed normally while executing: advance the queue.
    Continue,
    /// Stopped, aborted, halted, or the queue is no longer executing.
    Finished,
}

/// Manager core state. One instance lives behind the manager mutex.
pub struct Manager {
    queue: PlanQueue,
    runs: RunTracker,
    state: ManagerState,
    env_exists: bool,
    queue_stop_pending: bool,
    catalog: CatalogHandle,
    catalog_dir: Option<PathBuf>,
}

impl Manager {
    /// Rebuild the manager from a persisted image.
    ///
    /// The environment flag starts false; worker re-attach (or its
    /// failure) settles it during startup.
    pub fn restore(catalog: CatalogHandle, image: QueueImage) -> Self {
        Self {
            queue: PlanQueue::restore(image.queue, image.running_item, image.history),
            runs: RunTracker::new(),
            state: ManagerState::Idle,
            env_exists: false,
            queue_stop_pending: false,
            catalog,
            catalog_dir: image.settings.catalog_dir,
        }
    }

    pub fn new(catalog: CatalogHandle, catalog_dir: Option<PathBuf>) -> Self {
        Self {
            queue: PlanQueue::new(),
            runs: RunTracker::new(),
            state: ManagerState::Idle,
            env_exists: false,
            queue_stop_pending: false,
            catalog,
            catalog_dir,
        }
    }

    pub fn state(&self) -> ManagerState {
        self.state
    }

    pub fn environment_exists(&self) -> bool {
        self.env_exists
    }

    pub fn catalog_dir(&self) -> Option<&PathBuf> {
        self.catalog_dir.as_ref()
    }

    pub fn catalog(&self) -> &CatalogHandle {
        &self.catalog
    }

    /// Image of the current state for the write-through persistence.
    pub fn snapshot_image(&self) -> QueueImage {
        QueueImage::new(
            self.queue.queue_snapshot(),
            self.queue.running_item().cloned(),
            self.queue.history_snapshot(),
            Settings {
                environment_intent: self.env_exists
                    || self.state == ManagerState::CreatingEnvironment,
                catalog_dir: self.catalog_dir.clone(),
            },
        )
    }

    // --- read-only views -------------------------------------------------

    /// Status envelope from one consistent instant (C9).
    pub fn status(&self) -> StatusReply {
        StatusReply {
            success: true,
            msg: "RE Manager".to_string(),
            manager_state: self.state,
            items_in_queue: self.queue.len(),
            items_in_history: self.queue.history_len(),
            running_item_uid: self.queue.running_item().map(|item| item.item_uid.to_string()),
            worker_environment_exists: self.env_exists,
            run_list_uid: self.runs.run_list_uid().to_string(),
            queue_stop_pending: self.queue_stop_pending,
            plan_queue_uid: self.queue.queue_uid().to_string(),
            plan_history_uid: self.queue.history_uid().to_string(),
        }
    }

    pub fn queue_get(&self) -> QueueGetReply {
        QueueGetReply::new(
            self.queue.queue_snapshot(),
            self.queue.running_item().cloned(),
            self.queue.queue_uid().to_string(),
        )
    }

    pub fn history_get(&self) -> HistoryReply {
        HistoryReply {
            success: true,
            msg: String::new(),
            history: self.queue.history_snapshot(),
            plan_history_uid: self.queue.history_uid().to_string(),
        }
    }

    pub fn re_runs(&self, option: RunsOption) -> RunsReply {
        RunsReply {
            success: true,
            msg: String::new(),
            run_list: self.runs.snapshot(option),
            run_list_uid: self.runs.run_list_uid().to_string(),
        }
    }

    pub fn plans_allowed(&self, params: &GroupParams) -> PlansAllowedReply {
        let Some(group) = params.user_group.as_deref().filter(|g| !g.is_empty()) else {
            return PlansAllowedReply::fail("User group is not specified");
        };
        match self.catalog.snapshot().plans_allowed(group) {
            Some(plans) => PlansAllowedReply::allowed(plans),
            None => PlansAllowedReply::fail(format!("Unknown user group: '{group}'")),
        }
    }

    pub fn devices_allowed(&self, params: &GroupParams) -> DevicesAllowedReply {
        let Some(group) = params.user_group.as_deref().filter(|g| !g.is_empty()) else {
            return DevicesAllowedReply::fail("User group is not specified");
        };
        match self.catalog.snapshot().devices_allowed(group) {
            Some(devices) => DevicesAllowedReply::allowed(devices),
            None => DevicesAllowedReply::fail(format!("Unknown user group: '{group}'")),
        }
    }

    // --- queue mutations -------------------------------------------------

    /// `queue_item_add`: validate, stamp, and insert. Returns the reply
    /// and whether the image must be persisted.
    pub fn item_add(&mut self, params: AddItemParams) -> (AddItemReply, bool) {
        let spec = match InsertSpec::from_parts(
            params.pos,
            params.before_uid.map(ItemUid::from_string),
            params.after_uid.map(ItemUid::from_string),
        ) {
            Ok(spec) => spec,
            Err(e) => return (AddItemReply::fail(format!("Failed to add an item: {e}")), false),
        };

        let raw = RawItem {
            plan: params.plan,
            instruction: params.instruction,
            user: params.user,
            user_group: params.user_group,
        };
        let item = match validate_item(raw, &self.catalog.snapshot()) {
            Ok(item) => item,
            Err(e) => return (AddItemReply::fail(format!("Failed to add an item: {e}")), false),
        };

        match self.queue.add(item, &spec) {
            Ok((stored, qsize)) => (AddItemReply::accepted(stored, qsize), true),
            Err(e) => (AddItemReply::fail(format!("Failed to add an item: {e}")), false),
        }
    }

    pub fn item_get(&self, params: SelectorParams) -> ItemReply {
        let selector =
            match ItemSelector::from_parts(params.pos, params.uid.map(ItemUid::from_string)) {
                Ok(selector) => selector,
                Err(e) => return ItemReply::fail(format!("Failed to get an item: {e}")),
            };
        match self.queue.get(&selector) {
            Ok(item) => ItemReply::found(item.clone()),
            Err(e) => ItemReply::fail(format!("Failed to get an item: {e}")),
        }
    }

    pub fn item_remove(&mut self, params: SelectorParams) -> (ItemOpReply, bool) {
        let selector =
            match ItemSelector::from_parts(params.pos, params.uid.map(ItemUid::from_string)) {
                Ok(selector) => selector,
                Err(e) => return (ItemOpReply::fail(format!("Failed to remove an item: {e}")), false),
            };
        match self.queue.remove(&selector) {
            Ok((item, qsize)) => (ItemOpReply::done(item, qsize), true),
            Err(e) => (ItemOpReply::fail(format!("Failed to remove an item: {e}")), false),
        }
    }

    pub fn item_move(&mut self, params: MoveParams) -> (ItemOpReply, bool) {
        let src = match ItemSelector::from_parts(params.pos, params.uid.map(ItemUid::from_string)) {
            Ok(selector) => selector,
            Err(e) => return (ItemOpReply::fail(format!("Failed to move the item: {e}")), false),
        };
        let dest = match MoveDest::from_parts(
            params.pos_dest,
            params.before_uid.map(ItemUid::from_string),
            params.after_uid.map(ItemUid::from_string),
        ) {
            Ok(dest) => dest,
            Err(e) => return (ItemOpReply::fail(format!("Failed to move the item: {e}")), false),
        };
        match self.queue.move_item(&src, &dest) {
            Ok((item, qsize)) => (ItemOpReply::done(item, qsize), true),
            Err(e) => (ItemOpReply::fail(format!("Failed to move the item: {e}")), false),
        }
    }

    pub fn queue_clear(&mut self) -> (SimpleReply, bool) {
        self.queue.clear();
        info!("queue cleared");
        (SimpleReply::ok(), true)
    }

    pub fn history_clear(&mut self) -> (SimpleReply, bool) {
        self.queue.clear_history();
        (SimpleReply::ok(), true)
    }

    // --- state machine gates ---------------------------------------------

    fn environment_missing_msg(&self) -> Option<String> {
        match self.state {
            ManagerState::CreatingEnvironment => {
                Some("RE Worker environment is in the process of being created".to_string())
            }
            ManagerState::ClosingEnvironment => {
                Some("RE Worker environment is in the process of being closed".to_string())
            }
            ManagerState::DestroyingEnvironment => {
                Some("RE Worker environment is in the process of being destroyed".to_string())
            }
            _ if !self.env_exists => {
                Some("RE Worker environment does not exist".to_string())
            }
            _ => None,
        }
    }

    /// `environment_open` gate: legal only from idle with no environment.
    pub fn environment_open(&mut self) -> Result<(), String> {
        if self.env_exists {
            return Err("RE Worker environment already exists".to_string());
        }
        match self.state {
            ManagerState::Idle => {
                self.state = ManagerState::CreatingEnvironment;
                Ok(())
            }
            ManagerState::CreatingEnvironment => {
                Err("RE Worker environment is in the process of being created".to_string())
            }
            other => Err(format!("Manager state is '{other}'")),
        }
    }

    /// `environment_close` gate: legal only while idle with an environment.
    pub fn environment_close(&mut self) -> Result<(), String> {
        if self.state.is_busy() {
            return Err("Queue execution is in progress".to_string());
        }
        if let Some(msg) = self.environment_missing_msg() {
            return Err(msg);
        }
        self.state = ManagerState::ClosingEnvironment;
        Ok(())
    }

    /// `environment_destroy` gate: legal whenever a worker may exist.
    pub fn environment_destroy(&mut self) -> Result<(), String> {
        let worker_may_exist = self.env_exists
            || matches!(
                self.state,
                ManagerState::CreatingEnvironment | ManagerState::ClosingEnvironment
            );
        if !worker_may_exist {
            return Err("RE Worker environment does not exist".to_string());
        }
        self.state = ManagerState::DestroyingEnvironment;
        Ok(())
    }

    /// `queue_start` gate: sets `executing_queue`; the engine advances.
    pub fn queue_start(&mut self) -> Result<(), String> {
        if self.state.is_busy() {
            return Err("Queue execution is in progress".to_string());
        }
        if let Some(msg) = self.environment_missing_msg() {
            return Err(msg);
        }
        self.state = ManagerState::ExecutingQueue;
        info!("queue execution started");
        Ok(())
    }

    pub fn queue_stop(&mut self) -> SimpleReply {
        if !self.state.is_busy() {
            return SimpleReply::fail("Queue is not running");
        }
        self.queue_stop_pending = true;
        SimpleReply::ok()
    }

    pub fn queue_stop_cancel(&mut self) -> SimpleReply {
        self.queue_stop_pending = false;
        SimpleReply::ok()
    }

    /// Gate for `re_pause`: a plan must be executing.
    pub fn pause_gate(&self) -> Result<(), String> {
        match self.state {
            ManagerState::ExecutingQueue => Ok(()),
            ManagerState::Paused => Err("Run Engine is already paused".to_string()),
            _ => Err("Run Engine is not executing a plan".to_string()),
        }
    }

    /// Gate for `re_resume`/`re_stop`/`re_abort`/`re_halt`.
    pub fn paused_gate(&self) -> Result<(), String> {
        match self.state {
            ManagerState::Paused => Ok(()),
            _ => Err("Run Engine is not paused".to_string()),
        }
    }

    /// `manager_stop` gate.
    pub fn manager_stop_gate(&self, params: &StopParams) -> Result<(), String> {
        match params.option.unwrap_or(StopOption::SafeOn) {
            StopOption::SafeOff => Ok(()),
            StopOption::SafeOn => {
                if self.state.is_busy() {
                    Err("Queue execution is in progress".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }

    // --- execution progress ----------------------------------------------

    /// Advance the queue while `executing_queue`: consume a stop
    /// instruction or the stop-pending flag, or promote the next plan.
    pub fn advance(&mut self) -> Advance {
        if self.state != ManagerState::ExecutingQueue {
            return Advance::Idle;
        }
        if self.queue_stop_pending {
            self.queue_stop_pending = false;
            self.state = ManagerState::Idle;
            info!("queue execution stopped on request");
            return Advance::Idle;
        }
        let front_is_instruction = match self.queue.front() {
            None => {
                self.state = ManagerState::Idle;
                info!("queue drained");
                return Advance::Idle;
            }
            Some(front) => front.is_instruction(),
        };
        if front_is_instruction {
            let _ = self.queue.pop_front();
            self.state = ManagerState::Idle;
            info!("queue_stop instruction consumed");
            return Advance::Idle;
        }
        match self.queue.pop_front_to_running() {
            Ok(item) => Advance::Start(item.clone()),
            Err(e) => {
                error!(error = %e, "failed to promote the front plan");
                self.state = ManagerState::Idle;
                Advance::Idle
            }
        }
    }

    /// Undo a promotion whose `start_plan` command failed.
    pub fn rollback_start(&mut self) {
        if self.queue.running_back_to_front().is_some() {
            warn!("returned unstarted plan to the queue front");
        }
        self.state = ManagerState::Idle;
    }

    /// After a `re_resume` acknowledgement.
    pub fn note_resumed(&mut self) {
        if self.state == ManagerState::Paused {
            self.state = ManagerState::ExecutingQueue;
        }
    }

    /// After a `re_stop`/`re_abort`/`re_halt` acknowledgement: the plan is
    /// winding down and will report `plan_finished`.
    pub fn note_winding_down(&mut self) {
        if self.state == ManagerState::Paused {
            self.state = ManagerState::ExecutingQueue;
        }
    }

    // --- worker feedback -------------------------------------------------

    /// Environment open finished: the worker said hello.
    pub fn on_worker_ready(&mut self) {
        self.env_exists = true;
        if self.state == ManagerState::CreatingEnvironment {
            self.state = ManagerState::Idle;
        }
        info!("RE Worker environment created");
    }

    /// Environment open failed before the worker ever connected.
    pub fn on_open_failed(&mut self) {
        self.env_exists = false;
        if self.state == ManagerState::CreatingEnvironment {
            self.state = ManagerState::Idle;
        }
    }

    /// A surviving worker reconnected after a manager restart.
    pub fn on_worker_reattached(&mut self, busy: bool, item_uid: Option<&str>) {
        self.env_exists = true;
        if busy {
            let matches = self
                .queue
                .running_item()
                .is_some_and(|item| Some(item.item_uid.as_str()) == item_uid);
            if !matches {
                warn!(?item_uid, "worker busy with an item not in the running slot");
            }
            self.state = ManagerState::ExecutingQueue;
            info!("re-attached to a busy worker");
        } else {
            if self.queue.running_back_to_front().is_some() {
                info!("stale running item returned to the queue front");
            }
            self.state = ManagerState::Idle;
            info!("re-attached to an idle worker");
        }
    }

    /// No worker came back within the re-attach window.
    pub fn on_reattach_failed(&mut self) {
        if self.queue.running_back_to_front().is_some() {
            info!("stale running item returned to the queue front");
        }
        self.env_exists = false;
        self.state = ManagerState::Idle;
    }

    pub fn on_plan_paused(&mut self) {
        if self.state == ManagerState::ExecutingQueue {
            self.state = ManagerState::Paused;
            info!("plan paused");
        }
    }

    pub fn on_run_opened(&mut self, run_uid: String) {
        if let Err(e) = self.runs.open(run_uid) {
            error!(error = %e, "run tracker rejected open event");
        }
    }

    pub fn on_run_closed(&mut self, run_uid: &str) {
        if let Err(e) = self.runs.close(run_uid) {
            error!(error = %e, "run tracker rejected close event");
        }
    }

    /// The plan left the running slot: commit to history, clear the run
    /// list, and decide whether the queue keeps going.
    pub fn on_plan_finished(&mut self, outcome: PlanOutcome) -> FinishDisposition {
        let mut result = ItemResult::new(outcome.exit_status, outcome.run_uids, epoch_ms_now());
        if let Some(msg) = outcome.msg {
            result = result.with_msg(msg);
        }
        let exit_status = result.exit_status;
        match self.queue.commit_running(result) {
            Ok(entry) => {
                info!(
                    item_uid = %entry.item.item_uid,
                    exit_status = %exit_status,
                    "plan finished",
                );
            }
            Err(e) => error!(error = %e, "plan_finished with an empty running slot"),
        }
        self.runs.reset();

        if exit_status == eq_core::ExitStatus::Completed
            && self.state == ManagerState::ExecutingQueue
        {
            FinishDisposition::Continue
        } else {
            self.state = ManagerState::Idle;
            self.queue_stop_pending = false;
            FinishDisposition::Finished
        }
    }

    /// The worker process is gone (connection lost, heartbeat silence, or
    /// a deliberate kill). Fatal only while a plan was in flight.
    pub fn on_worker_gone(&mut self) {
        // The state may already have moved on (environment_destroy), so the
        // running slot is what decides whether an item was in flight.
        let was_busy = self.queue.running_item().is_some();
        if was_busy {
            let result = ItemResult::new(eq_core::ExitStatus::WorkerDied, vec![], epoch_ms_now())
                .with_msg("RE Worker process died while executing the plan");
            if self.queue.commit_running(result).is_err() {
                warn!("worker died while executing, but no item was running");
            }
            self.runs.reset();
            error!("RE Worker process died while executing the queue");
        } else {
            match self.state {
                ManagerState::ClosingEnvironment => info!("RE Worker environment closed"),
                ManagerState::DestroyingEnvironment => info!("RE Worker environment destroyed"),
                _ => warn!("RE Worker process is gone"),
            }
        }
        self.env_exists = false;
        self.queue_stop_pending = false;
        self.state = ManagerState::Idle;
    }

    /// Build the worker command for a pause request.
    pub fn pause_command(option: Option<eq_wire::PauseOption>) -> WorkerCommand {
        WorkerCommand::Pause { option: option.unwrap_or_default() }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
