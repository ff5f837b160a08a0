// src/queue.rs - FIFO hand-off between the ingest task and the dispatch loop
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::command::Command;

/// What the ingest session hands to the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueueEntry {
    Command(Command),
    /// Clear washout history before the next movement command.
    ResetShaping,
}

impl From<Command> for QueueEntry {
    fn from(cmd: Command) -> Self {
        QueueEntry::Command(cmd)
    }
}

/// Lock-protected FIFO shared by one producer and one consumer.
///
/// Cloning yields another handle onto the same queue.
pub struct CommandQueue<T = QueueEntry> {
    items: Arc<Mutex<VecDeque<T>>>,
}

impl<T> Clone for CommandQueue<T> {
    fn clone(&self) -> Self {
        Self { items: self.items.clone() }
    }
}

impl<T> Default for CommandQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for CommandQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue").field("len", &self.len()).finish()
    }
}

impl<T> CommandQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    // Held only for a single push_back/pop_front.
    fn items(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, item: T) {
        self.items().push_back(item);
    }

    pub fn try_pop(&self) -> Option<T> {
        self.items().pop_front()
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }
}
