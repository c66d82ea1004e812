//! # Scheduler
//!
//! Core scheduling logic for jiffos. Tasks compete on their remaining slice
//! credit (`counter`); when every runnable task has spent its credit, all
//! counters age (`counter / 2 + priority`) and the contest is rerun.
//!
//! ## Scheduling Algorithm
//!
//! On every `schedule()`:
//! 1. **Signal pass**: expired alarms raise `SIGALRM`; interruptible
//!    sleepers with a deliverable signal become runnable
//! 2. **Selection**: the runnable task with the largest counter wins, ties
//!    going to the lowest slot; no runnable task means the idle task
//! 3. **Aging**: if the winner's counter is not positive, age every task
//!    and go back to 2
//! 4. **Hand-off**: the winner becomes `current`; the returned [`Switch`]
//!    goes to the architecture's context-switch primitive
//!
//! Sleeping tasks keep (and age) their credit while runnable ones spend
//! theirs, so I/O-bound tasks come back with more credit than CPU-bound
//! ones without any ready queue.

use log::{debug, info, trace, warn};

use crate::config::HZ;
use crate::error::SchedError;
use crate::registry::{TaskReport, TaskTable};
use crate::signal::{self, SigSet};
use crate::task::{Pid, Task, TaskHandle, TaskState};
use crate::tick::{Countdown, PeriodicService};
use crate::timer::{TimerCallback, TimerList};

/// Callback type for timers, the beep countdown and the periodic service.
/// It runs inside the tick with the scheduler that fired it.
pub type TimerFn = TimerCallback<Scheduler>;

// ---------------------------------------------------------------------------
// Context-switch hand-off
// ---------------------------------------------------------------------------

/// Outcome of a scheduling decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Switch {
    /// The task that was current when `schedule()` was entered.
    pub prev: TaskHandle,
    /// The task selected to run.
    pub next: TaskHandle,
}

impl Switch {
    /// True when the selected task is already on the CPU.
    #[inline]
    pub fn is_noop(&self) -> bool {
        self.prev == self.next
    }
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central scheduler state: task table, current task, global tick
/// counter, timer list and tick-time device hooks.
///
/// ## Design Notes
///
/// - All tasks live inline in a fixed-size table (no heap)
/// - `current` names the task on the CPU; slot 0 is the idle task
/// - The kernel facade keeps one instance behind a critical section
pub struct Scheduler {
    /// The task table. The process layer fills and clears slots here.
    pub tasks: TaskTable,

    current: TaskHandle,

    /// Ticks since boot.
    jiffies: u64,

    pub(crate) timers: TimerList<Scheduler>,

    /// One-shot auxiliary countdown (console beep).
    pub(crate) beep: Countdown,

    /// Device service polled every tick while enabled (floppy motors).
    pub(crate) periodic: PeriodicService,
}

impl Scheduler {
    /// A scheduler with only the idle task, which is current.
    pub const fn new() -> Self {
        Self {
            tasks: TaskTable::new(),
            current: TaskHandle::IDLE,
            jiffies: 0,
            timers: TimerList::new(),
            beep: Countdown::IDLE,
            periodic: PeriodicService::NONE,
        }
    }

    /// Handle of the task on the CPU.
    #[inline]
    pub fn current(&self) -> TaskHandle {
        self.current
    }

    /// The task on the CPU, if its slot was not cleared under it.
    pub fn current_task(&self) -> Option<&Task> {
        self.tasks.get(self.current)
    }

    pub fn current_task_mut(&mut self) -> Option<&mut Task> {
        self.tasks.get_mut(self.current)
    }

    /// Pid of the current task (0 when its slot was cleared under it).
    pub fn current_pid(&self) -> Pid {
        self.current_task().map_or(0, |task| task.pid)
    }

    /// Ticks since boot.
    #[inline]
    pub fn jiffies(&self) -> u64 {
        self.jiffies
    }

    /// Called by the tick source once per interrupt, before `do_timer`.
    #[inline]
    pub fn advance_jiffies(&mut self) {
        self.jiffies += 1;
    }

    /// Pick the next task and make it current.
    ///
    /// Never fails; falls back to the idle task when nothing is runnable.
    pub fn schedule(&mut self) -> Switch {
        self.wake_signalled();

        let next = loop {
            match self.best_candidate() {
                None => break TaskHandle::IDLE,
                Some((handle, counter)) if counter > 0 => break handle,
                Some(_) => self.age_counters(),
            }
        };

        let prev = core::mem::replace(&mut self.current, next);
        if prev != next {
            trace!("switch {} -> {}", prev.index(), next.index());
        }
        Switch { prev, next }
    }

    /// Raise due alarms and wake interruptible sleepers that have a
    /// deliverable signal.
    fn wake_signalled(&mut self) {
        let now = self.jiffies;
        for (_, task) in self.tasks.iter_mut() {
            if task.alarm != 0 && task.alarm < now {
                task.signal |= SigSet::SIGALRM;
                task.alarm = 0;
            }
            if task.state == TaskState::Interruptible && signal::has_unblocked_pending(task) {
                task.state = TaskState::Running;
            }
        }
    }

    /// Runnable non-idle task with the largest counter; the first one found
    /// wins ties.
    fn best_candidate(&self) -> Option<(TaskHandle, i32)> {
        let mut best: Option<(TaskHandle, i32)> = None;
        for (handle, task) in self.tasks.iter().skip(1) {
            if task.state != TaskState::Running {
                continue;
            }
            if best.map_or(true, |(_, counter)| task.counter > counter) {
                best = Some((handle, task.counter));
            }
        }
        best
    }

    /// One aging round over every present task, whatever its state.
    fn age_counters(&mut self) {
        debug!("all runnable slices spent at jiffy {}, aging counters", self.jiffies);
        for (_, task) in self.tasks.iter_mut() {
            task.age();
        }
    }

    /// Lower `handle`'s priority by `delta`; a change that would leave it
    /// non-positive is ignored.
    ///
    /// # Returns
    /// The priority after the call, or `SchedError::StaleHandle`.
    pub fn renice(&mut self, handle: TaskHandle, delta: i32) -> Result<i32, SchedError> {
        let task = self.tasks.get_mut(handle).ok_or(SchedError::StaleHandle)?;
        if !task.renice(delta) {
            warn!(
                "pid {}: renice by {} ignored, priority stays {}",
                task.pid,
                delta,
                task.priority()
            );
        }
        Ok(task.priority())
    }

    /// Clear `handle`'s slot for the process layer.
    ///
    /// A task removed while queued on a wait slot takes its `wait_next` link
    /// with it, so the sleeper it displaced is released here instead of by
    /// the removed task's own wake-up. That sleeper may find its condition
    /// still unmet and must sleep again.
    pub fn remove_task(&mut self, handle: TaskHandle) -> Result<(), SchedError> {
        if handle.is_idle() {
            return Err(SchedError::IdleTask);
        }
        let task = self.tasks.get_mut(handle).ok_or(SchedError::StaleHandle)?;
        if task.state.is_waiting() {
            debug!("pid {} removed while waiting", task.pid);
        }
        let displaced = task.wait_next.take();
        self.tasks.remove(handle)?;
        if let Some(next) = displaced {
            self.tasks.make_runnable(next);
        }
        Ok(())
    }

    /// `renice` applied to the current task.
    pub fn nice(&mut self, increment: i32) -> Result<i32, SchedError> {
        self.renice(self.current, increment)
    }

    /// Arm (or with `seconds == 0`, disarm) the current task's alarm.
    ///
    /// # Returns
    /// Whole seconds that were left on the previous alarm.
    pub fn alarm(&mut self, seconds: u64) -> u64 {
        let now = self.jiffies;
        let Some(task) = self.current_task_mut() else {
            return 0;
        };
        let old = if task.alarm != 0 {
            task.alarm.saturating_sub(now) / HZ as u64
        } else {
            0
        };
        task.alarm = if seconds > 0 {
            now + HZ as u64 * seconds
        } else {
            0
        };
        old
    }

    /// Put the current task into an interruptible wait with no wait slot;
    /// only a signal or direct state change brings it back. The idle task
    /// just reschedules.
    pub fn pause(&mut self) -> Switch {
        if !self.current.is_idle() {
            if let Some(task) = self.current_task_mut() {
                task.state = TaskState::Interruptible;
            }
        }
        self.schedule()
    }

    /// Log one line per present task. The rows themselves come from
    /// `tasks.reports()`.
    pub fn show_stat(&self) {
        for TaskReport { slot, pid, state, stack_free, stack_size } in self.tasks.reports() {
            info!("{slot}: pid={pid}, state={state}, {stack_free} (of {stack_size}) bytes free in kernel stack");
        }
    }

    /// Make `handle` the current task without a scheduling decision.
    ///
    /// For architecture bring-up and tests that place the CPU on a task.
    pub fn set_current(&mut self, handle: TaskHandle) {
        self.current = handle;
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
