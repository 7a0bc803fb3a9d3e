//! Pending-task registry.
//!
//! Lookup is by hash map; traversal follows an insertion-ordered id list.
//! Because ids are allocated monotonically, insertion order is ascending id
//! order. Removing the newest id pops it straight off the list; other removed
//! ids are pruned the next time a snapshot is taken, or sooner once they
//! outnumber the live ones.

use crate::task::{TaskId, TaskKind, TaskRecord};
use std::collections::HashMap;

#[derive(Default)]
pub(crate) struct TaskRegistry {
    tasks: HashMap<TaskId, TaskRecord>,
    order: Vec<TaskId>,
}

impl TaskRegistry {
    pub(crate) fn insert(&mut self, record: TaskRecord) {
        let id = record.id;
        debug_assert!(
            self.order.last().map_or(true, |last| *last < id),
            "task ids must be inserted in ascending order"
        );
        if self.tasks.insert(id, record).is_none() {
            self.order.push(id);
        }
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskRecord> {
        self.tasks.get_mut(&id)
    }

    pub(crate) fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id)
    }

    pub(crate) fn kind_of(&self, id: TaskId) -> Option<TaskKind> {
        self.tasks.get(&id).map(TaskRecord::kind)
    }

    pub(crate) fn remove(&mut self, id: TaskId) -> Option<TaskRecord> {
        let removed = self.tasks.remove(&id)?;
        if self.order.last() == Some(&id) {
            self.order.pop();
        } else if self.order.len() > 2 * self.tasks.len() + 16 {
            self.prune();
        }
        Some(removed)
    }

    fn prune(&mut self) {
        let tasks = &self.tasks;
        self.order.retain(|id| tasks.contains_key(id));
    }

    /// Remove every task, returning the records in ascending id order.
    pub(crate) fn drain(&mut self) -> Vec<TaskRecord> {
        let mut drained = Vec::with_capacity(self.tasks.len());
        for id in self.order.drain(..) {
            if let Some(record) = self.tasks.remove(&id) {
                drained.push(record);
            }
        }
        drained
    }

    pub(crate) fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Ids pending right now, ascending.
    pub(crate) fn snapshot(&mut self) -> Vec<TaskId> {
        self.prune();
        self.order.clone()
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.order
            .iter()
            .copied()
            .filter(|id| self.tasks.contains_key(id))
    }
}
