//! C2 (queue half): a priority ordering over task ids.
//!
//! Higher numeric priority dequeues first; ties break by earlier
//! `created_at` (FIFO within a priority band). Kept as a sorted `Vec`
//! rather than a `BinaryHeap` because `update_priority` and `remove_by_id`
//! need to find and reposition an arbitrary entry, not just the head.

use chrono::{DateTime, Utc};

use super::model::TaskId;

#[derive(Debug, Clone)]
struct Entry {
    id: TaskId,
    priority: i32,
    created_at: DateTime<Utc>,
}

/// Entries are kept sorted descending by `(priority, -created_at)` so the
/// front of the vector is always the next task to dequeue.
fn order_key(priority: i32, created_at: DateTime<Utc>) -> (i32, std::cmp::Reverse<DateTime<Utc>>) {
    (priority, std::cmp::Reverse(created_at))
}

#[derive(Debug, Default)]
pub struct TaskQueue {
    entries: Vec<Entry>,
}

impl TaskQueue {
    #[must_use]
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    pub fn enqueue(&mut self, id: TaskId, priority: i32, created_at: DateTime<Utc>) {
        let key = order_key(priority, created_at);
        let pos = self
            .entries
            .partition_point(|e| order_key(e.priority, e.created_at) >= key);
        self.entries.insert(pos, Entry { id, priority, created_at });
    }

    /// Remove and return the head of the queue, if any.
    pub fn dequeue(&mut self) -> Option<TaskId> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0).id)
        }
    }

    #[must_use]
    pub fn peek(&self) -> Option<&TaskId> {
        self.entries.first().map(|e| &e.id)
    }

    pub fn remove_by_id(&mut self, id: &TaskId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.id != id);
        before != self.entries.len()
    }

    /// Re-sort `id` into its new position after a priority change.
    pub fn update_priority(&mut self, id: &TaskId, new_priority: i32) -> bool {
        if let Some(pos) = self.entries.iter().position(|e| &e.id == id) {
            let created_at = self.entries[pos].created_at;
            self.entries.remove(pos);
            self.enqueue(id.clone(), new_priority, created_at);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn contains(&self, id: &TaskId) -> bool {
        self.entries.iter().any(|e| &e.id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// An ordered snapshot of queued ids, head first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<TaskId> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }
}
