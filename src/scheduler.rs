//! Timer queue
//!
//! Stands in for `setTimeout`/`setInterval`. Tasks are ordered by due time,
//! then by insertion order, and only run when the host advances the clock.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::page::FormElement;

/// Deferred engine work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Task {
    /// Path-polling loop tick (periodic)
    Poll,
    /// Completion check while sessions are active (periodic)
    FallbackCheck,
    /// Session garbage collection (periodic)
    SessionGc,
    /// One-shot completion check after a submit or purchase click
    CompletionCheck,
    /// Focus probe after a focusout
    AbandonCheck { form: FormElement },
    /// End of an abandon grace window
    PurgeForm { form_id: String },
}

impl Task {
    pub fn is_periodic(&self) -> bool {
        matches!(self, Task::Poll | Task::FallbackCheck | Task::SessionGc)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    due_ms: i64,
    seq: u64,
    task: Task,
}

impl Entry {
    fn key(&self) -> (i64, u64) {
        (self.due_ms, self.seq)
    }
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Min-heap of pending tasks
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    heap: BinaryHeap<Reverse<Entry>>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` to run at `due_ms`
    pub fn schedule(&mut self, task: Task, due_ms: i64) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Reverse(Entry { due_ms, seq, task }));
    }

    /// Queue `task` to run `delay_ms` after `now_ms`
    pub fn schedule_after(&mut self, task: Task, now_ms: i64, delay_ms: u64) {
        self.schedule(task, now_ms.saturating_add(delay_ms as i64));
    }

    /// Remove and return the earliest task due at or before `now_ms`
    pub fn pop_due(&mut self, now_ms: i64) -> Option<(i64, Task)> {
        if self.heap.peek()?.0.due_ms > now_ms {
            return None;
        }
        self.heap.pop().map(|Reverse(entry)| (entry.due_ms, entry.task))
    }

    /// Due time of the next task, if any
    pub fn next_due(&self) -> Option<i64> {
        self.heap.peek().map(|Reverse(entry)| entry.due_ms)
    }

    /// Number of queued tasks matching `predicate`
    pub fn count(&self, predicate: impl Fn(&Task) -> bool) -> usize {
        self.heap
            .iter()
            .filter(|Reverse(entry)| predicate(&entry.task))
            .count()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drop every pending task
    pub fn clear(&mut self) {
        self.heap.clear();
    }
}
