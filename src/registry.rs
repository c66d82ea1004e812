//! # Task Table
//!
//! Fixed-capacity arena of task descriptors. Slot 0 permanently holds the
//! idle task; every other slot is filled and cleared by the process layer.
//! Scans always walk the slots in ascending index order, which is also the
//! scheduler's tie-break order.

use crate::config::NR_TASKS;
use crate::error::SchedError;
use crate::task::{Pid, Task, TaskHandle, TaskParams, TaskState};

struct Slot {
    /// Bumped whenever the slot is vacated.
    generation: u32,
    task: Option<Task>,
}

impl Slot {
    const VACANT: Slot = Slot {
        generation: 0,
        task: None,
    };
}

/// One row of the diagnostic dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskReport {
    pub slot: usize,
    pub pid: Pid,
    pub state: TaskState,
    /// Bytes at the bottom of the kernel stack never written to.
    pub stack_free: usize,
    pub stack_size: usize,
}

/// The fixed task table.
pub struct TaskTable {
    slots: [Slot; NR_TASKS],
}

impl TaskTable {
    /// A table holding only the idle task.
    pub const fn new() -> Self {
        let mut slots = [Slot::VACANT; NR_TASKS];
        slots[0].task = Some(Task::idle());
        Self { slots }
    }

    /// Place a new task in the lowest free slot.
    ///
    /// # Returns
    /// - `Ok(handle)` for the new task
    /// - `Err(SchedError::InvalidPriority)` if `params.priority <= 0`
    /// - `Err(SchedError::TableFull)` if every slot is taken
    pub fn insert(&mut self, params: TaskParams) -> Result<TaskHandle, SchedError> {
        if params.priority <= 0 {
            return Err(SchedError::InvalidPriority);
        }

        let (index, slot) = self
            .slots
            .iter_mut()
            .enumerate()
            .skip(1)
            .find(|(_, slot)| slot.task.is_none())
            .ok_or(SchedError::TableFull)?;

        slot.task = Some(Task::new(params));
        Ok(TaskHandle::new(index, slot.generation))
    }

    /// Clear the slot `handle` refers to. Outstanding handles to it go stale.
    pub fn remove(&mut self, handle: TaskHandle) -> Result<(), SchedError> {
        if handle.is_idle() {
            return Err(SchedError::IdleTask);
        }
        let slot = self
            .slots
            .get_mut(handle.index())
            .filter(|slot| slot.task.is_some() && slot.generation == handle.generation())
            .ok_or(SchedError::StaleHandle)?;

        slot.task = None;
        slot.generation = slot.generation.wrapping_add(1);
        Ok(())
    }

    pub fn get(&self, handle: TaskHandle) -> Option<&Task> {
        let slot = self.slots.get(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.task.as_ref()
    }

    pub fn get_mut(&mut self, handle: TaskHandle) -> Option<&mut Task> {
        let slot = self.slots.get_mut(handle.index())?;
        if slot.generation != handle.generation() {
            return None;
        }
        slot.task.as_mut()
    }

    pub fn idle(&self) -> &Task {
        match self.slots[0].task.as_ref() {
            Some(task) => task,
            None => unreachable!("idle slot is never vacated"),
        }
    }

    /// Present tasks in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (TaskHandle, &Task)> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.task
                .as_ref()
                .map(|task| (TaskHandle::new(index, slot.generation), task))
        })
    }

    /// Present tasks in slot order, mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (TaskHandle, &mut Task)> + '_ {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.task
                .as_mut()
                .map(|task| (TaskHandle::new(index, generation), task))
        })
    }

    /// Number of present tasks, idle included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.task.is_some()).count()
    }

    /// Never true: the idle task is always present.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Per-task diagnostic rows, in slot order.
    pub fn reports(&self) -> impl Iterator<Item = TaskReport> + '_ {
        self.iter().map(|(handle, task)| TaskReport {
            slot: handle.index(),
            pid: task.pid,
            state: task.state,
            stack_free: task.stack.unused_bytes(),
            stack_size: task.stack.size(),
        })
    }

    /// Mark `handle` runnable. Stale handles are ignored.
    pub(crate) fn make_runnable(&mut self, handle: TaskHandle) {
        if let Some(task) = self.get_mut(handle) {
            task.state = TaskState::Running;
        }
    }
}

impl Default for TaskTable {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
