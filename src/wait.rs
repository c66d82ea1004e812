//! # Wait Slots
//!
//! A [`WaitSlot`] names at most one sleeping task: the one that went to
//! sleep on it most recently. Earlier sleepers are chained behind it through
//! each task's `wait_next` link, which records the occupant the task pushed
//! out when it went to sleep:
//!
//! ```text
//!   slot ──► C ──wait_next──► B ──wait_next──► A
//! ```
//!
//! `wake_up` only touches the occupant. Each woken sleeper releases the
//! next one as it finishes its sleep primitive, so a chain drains strictly
//! LIFO, one link per resumed task. Slots are meant for a handful of
//! waiters ("device ready"), never as a fair queue.
//!
//! The sleep primitives are split around the context switch: the first half
//! queues the caller and returns the [`Switch`] to perform; the second half
//! runs once the caller is back on the CPU. `Kernel` strings them together.

use core::cell::Cell;

use log::debug;

use crate::scheduler::{Scheduler, Switch};
use crate::sync::{self, Mutex};
use crate::task::{TaskHandle, TaskState};

/// Single-occupant cell a task sleeps on. Owned by the caller (a driver's
/// request queue, a condition flag) and usable from `static`s.
pub struct WaitSlot {
    occupant: Mutex<Cell<Option<TaskHandle>>>,
}

impl WaitSlot {
    pub const fn new() -> Self {
        Self {
            occupant: Mutex::new(Cell::new(None)),
        }
    }

    /// The most recent sleeper, if any.
    pub fn occupant(&self) -> Option<TaskHandle> {
        sync::critical_section(|cs| self.occupant.borrow(cs).get())
    }

    pub fn is_empty(&self) -> bool {
        self.occupant().is_none()
    }

    fn set(&self, occupant: Option<TaskHandle>) {
        sync::critical_section(|cs| self.occupant.borrow(cs).set(occupant));
    }

    fn take(&self) -> Option<TaskHandle> {
        sync::critical_section(|cs| self.occupant.borrow(cs).take())
    }
}

impl Default for WaitSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Queue the current task on `slot` in `state` and pick someone else.
    fn enqueue_current(&mut self, slot: &WaitSlot, state: TaskState) -> Switch {
        let current = self.current();
        if current.is_idle() {
            panic!("idle task trying to sleep");
        }
        let displaced = slot.occupant();
        slot.set(Some(current));
        if let Some(task) = self.current_task_mut() {
            task.wait_next = displaced;
            task.state = state;
        }
        if let Some(displaced) = displaced {
            debug!("slot handed from {} to {}", displaced.index(), current.index());
        }
        self.schedule()
    }

    /// Release the sleeper the current task displaced, if any.
    fn release_displaced(&mut self) {
        let displaced = self.current_task_mut().and_then(|task| task.wait_next.take());
        if let Some(handle) = displaced {
            self.tasks.make_runnable(handle);
        }
    }

    /// First half of an uninterruptible sleep on `slot`.
    ///
    /// # Panics
    /// When called by the idle task.
    pub fn sleep_on(&mut self, slot: &WaitSlot) -> Switch {
        self.enqueue_current(slot, TaskState::Uninterruptible)
    }

    /// Second half of `sleep_on`, run once the sleeper is current again:
    /// wakes the sleeper it displaced, unconditionally.
    pub fn finish_sleep(&mut self) {
        self.release_displaced();
    }

    /// First half of an interruptible sleep on `slot`.
    ///
    /// # Panics
    /// When called by the idle task.
    pub fn interruptible_sleep_on(&mut self, slot: &WaitSlot) -> Switch {
        self.enqueue_current(slot, TaskState::Interruptible)
    }

    /// Run each time an interruptible sleeper is current again.
    ///
    /// If a newer sleeper holds the slot (or the caller was woken by a
    /// signal while still queued behind one), that sleeper is made runnable
    /// and the caller goes back to sleep: the returned `Switch` must be
    /// performed and this called again. Otherwise the slot is cleared, the
    /// displaced sleeper released and `None` returned.
    pub fn resume_interruptible(&mut self, slot: &WaitSlot) -> Option<Switch> {
        let current = self.current();
        match slot.occupant() {
            Some(other) if other != current => {
                self.tasks.make_runnable(other);
                if let Some(task) = self.current_task_mut() {
                    task.state = TaskState::Interruptible;
                }
                Some(self.schedule())
            }
            _ => {
                slot.set(None);
                self.release_displaced();
                None
            }
        }
    }

    /// Make the slot's occupant runnable and empty the slot. Sleepers queued
    /// behind it are released as the occupant finishes its sleep.
    pub fn wake_up(&mut self, slot: &WaitSlot) {
        if let Some(handle) = slot.take() {
            self.tasks.make_runnable(handle);
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::SigSet;
    use crate::task::TaskParams;

    fn spawn(s: &mut Scheduler, pid: i32) -> TaskHandle {
        s.tasks
            .insert(TaskParams::new(pid).with_priority(1).with_counter(10))
            .unwrap()
    }

    fn state(s: &Scheduler, h: TaskHandle) -> TaskState {
        s.tasks.get(h).unwrap().state
    }

    /// Put the CPU on `h` the way a context switch back to it would.
    fn resume(s: &mut Scheduler, h: TaskHandle) {
        assert_eq!(state(s, h), TaskState::Running, "only runnable tasks resume");
        s.set_current(h);
    }

    #[test]
    fn test_wake_releases_newest_sleeper_first() {
        let mut s = Scheduler::new();
        let slot = WaitSlot::new();
        let a = spawn(&mut s, 1);
        let b = spawn(&mut s, 2);
        let c = spawn(&mut s, 3);

        s.set_current(a);
        assert_eq!(s.sleep_on(&slot).next, b);
        assert_eq!(s.sleep_on(&slot).next, c);
        assert_eq!(s.sleep_on(&slot).next, TaskHandle::IDLE);
        assert_eq!(slot.occupant(), Some(c));

        s.wake_up(&slot);
        assert!(slot.is_empty());
        assert_eq!(state(&s, c), TaskState::Running);
        assert_eq!(state(&s, b), TaskState::Uninterruptible);
        assert_eq!(state(&s, a), TaskState::Uninterruptible);

        resume(&mut s, c);
        s.finish_sleep();
        assert_eq!(state(&s, b), TaskState::Running);
        assert_eq!(state(&s, a), TaskState::Uninterruptible);

        resume(&mut s, b);
        s.finish_sleep();
        assert_eq!(state(&s, a), TaskState::Running);

        resume(&mut s, a);
        s.finish_sleep();
        assert!(slot.is_empty());
    }

    #[test]
    fn test_wake_on_empty_slot_is_noop() {
        let mut s = Scheduler::new();
        let slot = WaitSlot::new();
        let a = spawn(&mut s, 1);
        s.wake_up(&slot);
        assert!(slot.is_empty());
        assert_eq!(state(&s, a), TaskState::Running);
    }

    #[test]
    #[should_panic(expected = "idle task trying to sleep")]
    fn test_idle_task_cannot_sleep() {
        let mut s = Scheduler::new();
        let slot = WaitSlot::new();
        s.sleep_on(&slot);
    }

    #[test]
    #[should_panic(expected = "idle task trying to sleep")]
    fn test_idle_task_cannot_sleep_interruptibly() {
        let mut s = Scheduler::new();
        let slot = WaitSlot::new();
        s.interruptible_sleep_on(&slot);
    }

    #[test]
    fn test_interruptible_sleep_woken_normally() {
        let mut s = Scheduler::new();
        let slot = WaitSlot::new();
        let a = spawn(&mut s, 1);

        s.set_current(a);
        assert_eq!(s.interruptible_sleep_on(&slot).next, TaskHandle::IDLE);
        assert_eq!(state(&s, a), TaskState::Interruptible);

        s.wake_up(&slot);
        resume(&mut s, a);
        assert_eq!(s.resume_interruptible(&slot), None);
        assert!(slot.is_empty());
    }

    #[test]
    fn test_signalled_sleeper_hands_slot_back_to_newer_waiter() {
        let mut s = Scheduler::new();
        let slot = WaitSlot::new();
        let a = spawn(&mut s, 1);
        let b = spawn(&mut s, 2);

        s.set_current(a);
        assert_eq!(s.interruptible_sleep_on(&slot).next, b);
        assert_eq!(s.interruptible_sleep_on(&slot).next, TaskHandle::IDLE);
        assert_eq!(slot.occupant(), Some(b));

        // A signal pulls A out of turn
        s.tasks.get_mut(a).unwrap().signal = SigSet::SIGINT;
        assert_eq!(s.schedule().next, a);

        // B still holds the slot: A makes B runnable and sleeps again
        let again = s.resume_interruptible(&slot).unwrap();
        assert_eq!(state(&s, b), TaskState::Running);
        assert_eq!(state(&s, a), TaskState::Running, "pending signal wakes A again");
        assert!(again.is_noop());
        assert_eq!(slot.occupant(), Some(b));

        // A's signal is handled elsewhere; park it and let B go first
        s.tasks.get_mut(a).unwrap().signal = SigSet::empty();
        s.tasks.get_mut(a).unwrap().state = TaskState::Interruptible;

        resume(&mut s, b);
        assert_eq!(s.resume_interruptible(&slot), None);
        assert!(slot.is_empty());
        assert_eq!(state(&s, a), TaskState::Running);

        resume(&mut s, a);
        assert_eq!(s.resume_interruptible(&slot), None);
        assert!(slot.is_empty());
    }

    #[test]
    fn test_interruptible_sleeper_releases_uninterruptible_one() {
        let mut s = Scheduler::new();
        let slot = WaitSlot::new();
        let a = spawn(&mut s, 1);
        let b = spawn(&mut s, 2);

        s.set_current(a);
        s.sleep_on(&slot);
        s.set_current(b);
        s.interruptible_sleep_on(&slot);

        s.wake_up(&slot);
        resume(&mut s, b);
        assert_eq!(s.resume_interruptible(&slot), None);
        assert_eq!(state(&s, a), TaskState::Running);
    }

    #[test]
    fn test_stale_displaced_handle_is_skipped() {
        let mut s = Scheduler::new();
        let slot = WaitSlot::new();
        let a = spawn(&mut s, 1);
        let b = spawn(&mut s, 2);

        s.set_current(a);
        s.sleep_on(&slot);
        s.set_current(b);
        s.sleep_on(&slot);

        // A is killed while queued; its slot is reused
        s.tasks.remove(a).unwrap();
        let reused = spawn(&mut s, 9);
        s.tasks.get_mut(reused).unwrap().state = TaskState::Stopped;

        s.wake_up(&slot);
        resume(&mut s, b);
        s.finish_sleep();
        assert_eq!(state(&s, reused), TaskState::Stopped);
    }

    #[test]
    fn test_removing_queued_sleeper_releases_the_one_behind_it() {
        let mut s = Scheduler::new();
        let slot = WaitSlot::new();
        let a = spawn(&mut s, 1);
        let b = spawn(&mut s, 2);
        let c = spawn(&mut s, 3);

        s.set_current(a);
        s.sleep_on(&slot);
        s.set_current(b);
        s.sleep_on(&slot);
        s.set_current(c);
        s.sleep_on(&slot);

        // B dies in the middle of the chain: A must not be stranded
        s.remove_task(b).unwrap();
        assert_eq!(state(&s, a), TaskState::Running);
        assert_eq!(state(&s, c), TaskState::Uninterruptible);

        s.wake_up(&slot);
        resume(&mut s, c);
        s.finish_sleep();
        assert!(slot.is_empty());
        assert_eq!(state(&s, a), TaskState::Running);
    }

    #[test]
    fn test_removing_slot_occupant_keeps_chain_alive() {
        let mut s = Scheduler::new();
        let slot = WaitSlot::new();
        let a = spawn(&mut s, 1);
        let b = spawn(&mut s, 2);

        s.set_current(a);
        s.sleep_on(&slot);
        s.set_current(b);
        s.sleep_on(&slot);

        s.remove_task(b).unwrap();
        s.wake_up(&slot);
        assert!(slot.is_empty());
        assert_eq!(state(&s, a), TaskState::Running);
        assert_eq!(s.remove_task(b), Err(crate::error::SchedError::StaleHandle));
        assert_eq!(
            s.remove_task(TaskHandle::IDLE),
            Err(crate::error::SchedError::IdleTask)
        );
    }
}
