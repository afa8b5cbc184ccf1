// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Plan queue: ordered items, a single running slot, and append-only history.
//!
//! Positions address the queue excluding the running slot. Insertion clamps
//! out-of-range indices to the ends; lookup and removal are strict and fail
//! on out-of-range indices. An item is in at most one of queue, running
//! slot, or history at any time, and its UID stays unique across all three.

use std::collections::{HashSet, VecDeque};

use thiserror::Error;

use crate::item::{HistoryEntry, Item, ItemResult, QueuePos};
use crate::uid::{HistoryUid, ItemUid, QueueUid};

/// Errors from queue operations. `Display` output is the user-facing
/// message; handlers prefix it with the failed operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("Ambiguous parameters: {0}")]
    Ambiguous(&'static str),

    #[error("item position or UID is not specified")]
    SelectorMissing,

    #[error("destination position or UID is not specified")]
    DestinationMissing,

    #[error("position {0} is out of range")]
    OutOfRange(i64),

    #[error("the item with UID '{0}' is not in the queue")]
    UidNotInQueue(String),

    #[error("the item with UID '{0}' is currently running")]
    ItemRunning(String),

    #[error("Can not remove an item which is currently running")]
    CannotRemoveRunning,

    #[error("Can not insert a plan in the queue before a currently running plan")]
    CannotInsertBeforeRunning,

    #[error("the queue is empty")]
    QueueEmpty,

    #[error("the front item is an instruction, not a plan")]
    FrontIsInstruction,

    #[error("no item is currently running")]
    NothingRunning,
}

/// Addresses one queue item by position or UID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemSelector {
    Pos(QueuePos),
    Uid(ItemUid),
}

impl ItemSelector {
    /// Build a selector from optional request parameters.
    ///
    /// Exactly one of `pos`/`uid` must be supplied.
    pub fn from_parts(pos: Option<QueuePos>, uid: Option<ItemUid>) -> Result<Self, QueueError> {
        match (pos, uid) {
            (Some(_), Some(_)) => {
                Err(QueueError::Ambiguous("both position and UID are specified"))
            }
            (Some(pos), None) => Ok(ItemSelector::Pos(pos)),
            (None, Some(uid)) => Ok(ItemSelector::Uid(uid)),
            (None, None) => Err(QueueError::SelectorMissing),
        }
    }
}

/// Where to insert a new item. Defaults to the back of the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertSpec {
    Pos(QueuePos),
    Before(ItemUid),
    After(ItemUid),
}

impl InsertSpec {
    /// Build an insert spec from optional request parameters.
    ///
    /// At most one of `pos`/`before_uid`/`after_uid` may be supplied;
    /// none means append to the back.
    pub fn from_parts(
        pos: Option<QueuePos>,
        before_uid: Option<ItemUid>,
        after_uid: Option<ItemUid>,
    ) -> Result<Self, QueueError> {
        let supplied =
            usize::from(pos.is_some()) + usize::from(before_uid.is_some()) + usize::from(after_uid.is_some());
        if supplied > 1 {
            return Err(QueueError::Ambiguous(
                "more than one of 'pos', 'before_uid' and 'after_uid' is specified",
            ));
        }
        if let Some(pos) = pos {
            Ok(InsertSpec::Pos(pos))
        } else if let Some(uid) = before_uid {
            Ok(InsertSpec::Before(uid))
        } else if let Some(uid) = after_uid {
            Ok(InsertSpec::After(uid))
        } else {
            Ok(InsertSpec::Pos(QueuePos::Back))
        }
    }
}

/// Where to move an existing item. The position form names the item's
/// final index in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveDest {
    Pos(QueuePos),
    Before(ItemUid),
    After(ItemUid),
}

impl MoveDest {
    /// Build a move destination from optional request parameters.
    ///
    /// Exactly one of `pos_dest`/`before_uid`/`after_uid` must be supplied.
    pub fn from_parts(
        pos_dest: Option<QueuePos>,
        before_uid: Option<ItemUid>,
        after_uid: Option<ItemUid>,
    ) -> Result<Self, QueueError> {
        let supplied = usize::from(pos_dest.is_some())
            + usize::from(before_uid.is_some())
            + usize::from(after_uid.is_some());
        if supplied > 1 {
            return Err(QueueError::Ambiguous(
                "more than one of 'pos_dest', 'before_uid' and 'after_uid' is specified",
            ));
        }
        if let Some(pos) = pos_dest {
            Ok(MoveDest::Pos(pos))
        } else if let Some(uid) = before_uid {
            Ok(MoveDest::Before(uid))
        } else if let Some(uid) = after_uid {
            Ok(MoveDest::After(uid))
        } else {
            Err(QueueError::DestinationMissing)
        }
    }
}

/// The ordered plan queue with its running slot and history.
#[derive(Debug, Default)]
pub struct PlanQueue {
    items: VecDeque<Item>,
    running: Option<Item>,
    history: Vec<HistoryEntry>,
    /// UID uniqueness window: queue ∪ running slot ∪ history.
    uids: HashSet<ItemUid>,
    queue_uid: QueueUid,
    history_uid: HistoryUid,
}

impl PlanQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a queue from persisted parts, restoring the UID window.
    pub fn restore(queue: Vec<Item>, running: Option<Item>, history: Vec<HistoryEntry>) -> Self {
        let mut uids = HashSet::new();
        for item in queue.iter().chain(running.iter()) {
            uids.insert(item.item_uid);
        }
        for entry in &history {
            uids.insert(entry.item.item_uid);
        }
        Self {
            items: queue.into(),
            running,
            history,
            uids,
            queue_uid: QueueUid::new(),
            history_uid: HistoryUid::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    pub fn queue_uid(&self) -> QueueUid {
        self.queue_uid
    }

    pub fn history_uid(&self) -> HistoryUid {
        self.history_uid
    }

    pub fn running_item(&self) -> Option<&Item> {
        self.running.as_ref()
    }

    pub fn front(&self) -> Option<&Item> {
        self.items.front()
    }

    pub fn queue_snapshot(&self) -> Vec<Item> {
        self.items.iter().cloned().collect()
    }

    pub fn history_snapshot(&self) -> Vec<HistoryEntry> {
        self.history.clone()
    }

    /// Add an item to the queue.
    ///
    /// Integer positions are clamped to the ends; `before_uid`/`after_uid`
    /// must name an item currently in the queue. Inserting before the
    /// running item is rejected; inserting after it lands at the front.
    /// Returns the stored item and the new queue size.
    pub fn add(&mut self, mut item: Item, spec: &InsertSpec) -> Result<(Item, usize), QueueError> {
        let index = match spec {
            InsertSpec::Pos(pos) => self.clamp_insert_index(*pos),
            InsertSpec::Before(uid) | InsertSpec::After(uid) => {
                if self.running.as_ref().is_some_and(|r| r.item_uid == *uid) {
                    match spec {
                        InsertSpec::Before(_) => return Err(QueueError::CannotInsertBeforeRunning),
                        _ => 0,
                    }
                } else {
                    let at = self
                        .index_of_uid(uid)
                        .ok_or_else(|| QueueError::UidNotInQueue(uid.to_string()))?;
                    match spec {
                        InsertSpec::Before(_) => at,
                        _ => at + 1,
                    }
                }
            }
        };

        while self.uids.contains(&item.item_uid) {
            item.item_uid = ItemUid::new();
        }
        self.uids.insert(item.item_uid);
        self.items.insert(index, item);
        self.queue_uid = QueueUid::new();

        let stored = self.items[index].clone();
        Ok((stored, self.items.len()))
    }

    /// Look up an item without mutating state.
    pub fn get(&self, selector: &ItemSelector) -> Result<&Item, QueueError> {
        let index = self.resolve_selector(selector)?;
        Ok(&self.items[index])
    }

    /// Remove an item from the queue. Fails for the running item.
    pub fn remove(&mut self, selector: &ItemSelector) -> Result<(Item, usize), QueueError> {
        let index = match self.resolve_selector(selector) {
            Err(QueueError::ItemRunning(_)) => return Err(QueueError::CannotRemoveRunning),
            other => other?,
        };
        let item = match self.items.remove(index) {
            Some(item) => item,
            None => return Err(QueueError::OutOfRange(index as i64)),
        };
        self.uids.remove(&item.item_uid);
        self.queue_uid = QueueUid::new();
        Ok((item, self.items.len()))
    }

    /// Move an item to a new position. Moving onto itself is a no-op that
    /// still succeeds.
    pub fn move_item(
        &mut self,
        src: &ItemSelector,
        dest: &MoveDest,
    ) -> Result<(Item, usize), QueueError> {
        let src_index = self.resolve_selector(src)?;
        let src_uid = self.items[src_index].item_uid;

        match dest {
            MoveDest::Pos(pos) => {
                let dest_index = self.resolve_pos(*pos)?;
                if dest_index != src_index {
                    let item = match self.items.remove(src_index) {
                        Some(item) => item,
                        None => return Err(QueueError::OutOfRange(src_index as i64)),
                    };
                    self.items.insert(dest_index, item);
                    self.queue_uid = QueueUid::new();
                }
            }
            MoveDest::Before(uid) | MoveDest::After(uid) => {
                if *uid == src_uid {
                    // moving an item next to itself leaves the queue unchanged
                } else if self.running.as_ref().is_some_and(|r| r.item_uid == *uid) {
                    match dest {
                        MoveDest::Before(_) => return Err(QueueError::CannotInsertBeforeRunning),
                        _ => {
                            let item = match self.items.remove(src_index) {
                                Some(item) => item,
                                None => return Err(QueueError::OutOfRange(src_index as i64)),
                            };
                            self.items.push_front(item);
                            self.queue_uid = QueueUid::new();
                        }
                    }
                } else {
                    if self.index_of_uid(uid).is_none() {
                        return Err(QueueError::UidNotInQueue(uid.to_string()));
                    }
                    let item = match self.items.remove(src_index) {
                        Some(item) => item,
                        None => return Err(QueueError::OutOfRange(src_index as i64)),
                    };
                    // resolve again: removal may have shifted the anchor
                    let anchor = match self.index_of_uid(uid) {
                        Some(at) => at,
                        None => return Err(QueueError::UidNotInQueue(uid.to_string())),
                    };
                    let dest_index = match dest {
                        MoveDest::Before(_) => anchor,
                        _ => anchor + 1,
                    };
                    self.items.insert(dest_index, item);
                    self.queue_uid = QueueUid::new();
                }
            }
        }

        let index = self
            .index_of_uid(&src_uid)
            .ok_or_else(|| QueueError::UidNotInQueue(src_uid.to_string()))?;
        Ok((self.items[index].clone(), self.items.len()))
    }

    /// Atomically promote the front item into the running slot.
    ///
    /// Instructions are never promoted; callers consume them separately via
    /// [`PlanQueue::pop_front`].
    pub fn pop_front_to_running(&mut self) -> Result<&Item, QueueError> {
        let front = self.items.front().ok_or(QueueError::QueueEmpty)?;
        if front.is_instruction() {
            return Err(QueueError::FrontIsInstruction);
        }
        // len checked above
        if let Some(item) = self.items.pop_front() {
            self.running = Some(item);
        }
        self.queue_uid = QueueUid::new();
        self.running.as_ref().ok_or(QueueError::NothingRunning)
    }

    /// Remove and return the front item (used to consume instructions).
    pub fn pop_front(&mut self) -> Option<Item> {
        let item = self.items.pop_front()?;
        self.uids.remove(&item.item_uid);
        self.queue_uid = QueueUid::new();
        Some(item)
    }

    /// Move the running slot into history with the given result block.
    pub fn commit_running(&mut self, result: ItemResult) -> Result<&HistoryEntry, QueueError> {
        let item = self.running.take().ok_or(QueueError::NothingRunning)?;
        self.history.push(HistoryEntry { item, result });
        self.history_uid = HistoryUid::new();
        self.history.last().ok_or(QueueError::NothingRunning)
    }

    /// Return the running slot item to the front of the queue.
    ///
    /// Used during restart reconciliation when the worker that was executing
    /// the item can no longer be reached.
    pub fn running_back_to_front(&mut self) -> Option<&Item> {
        let item = self.running.take()?;
        self.items.push_front(item);
        self.queue_uid = QueueUid::new();
        self.items.front()
    }

    /// Empty the queue. The running slot and history are untouched.
    pub fn clear(&mut self) {
        for item in self.items.drain(..) {
            self.uids.remove(&item.item_uid);
        }
        self.queue_uid = QueueUid::new();
    }

    /// Drop all history entries.
    pub fn clear_history(&mut self) {
        for entry in self.history.drain(..) {
            self.uids.remove(&entry.item.item_uid);
        }
        self.history_uid = HistoryUid::new();
    }

    fn index_of_uid(&self, uid: &ItemUid) -> Option<usize> {
        self.items.iter().position(|item| item.item_uid == *uid)
    }

    /// Strict position lookup: negatives index from the back, out-of-range
    /// fails. Used by get/remove/move.
    fn resolve_pos(&self, pos: QueuePos) -> Result<usize, QueueError> {
        let len = self.items.len() as i64;
        let index = match pos {
            QueuePos::Front => 0,
            QueuePos::Back => len - 1,
            QueuePos::Index(i) if i < 0 => len + i,
            QueuePos::Index(i) => i,
        };
        if index < 0 || index >= len {
            let shown = match pos {
                QueuePos::Index(i) => i,
                _ => index,
            };
            return Err(QueueError::OutOfRange(shown));
        }
        Ok(index as usize)
    }

    /// Lenient insertion index: clamps to the ends. Used by add.
    fn clamp_insert_index(&self, pos: QueuePos) -> usize {
        let len = self.items.len() as i64;
        let index = match pos {
            QueuePos::Front => 0,
            QueuePos::Back => len,
            QueuePos::Index(i) if i < 0 => len + i,
            QueuePos::Index(i) => i,
        };
        index.clamp(0, len) as usize
    }

    fn resolve_selector(&self, selector: &ItemSelector) -> Result<usize, QueueError> {
        match selector {
            ItemSelector::Pos(pos) => self.resolve_pos(*pos),
            ItemSelector::Uid(uid) => {
                if self.running.as_ref().is_some_and(|r| r.item_uid == *uid) {
                    return Err(QueueError::ItemRunning(uid.to_string()));
                }
                self.index_of_uid(uid)
                    .ok_or_else(|| QueueError::UidNotInQueue(uid.to_string()))
            }
        }
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
