//! # Kernel
//!
//! The facade the rest of the system calls. A [`Kernel`] owns the one
//! [`Scheduler`] behind a critical section and pairs it with an
//! architecture port that performs the context switches the scheduler asks
//! for.
//!
//! A scheduling decision and the request to act on it happen in the same
//! critical section: the port is asked to switch before interrupts come
//! back, and the switch itself takes effect once they do. No tick can land
//! between `current` changing and the CPU following it.
//!
//! A task between the two halves of a sleep primitive is marked as running
//! kernel code, so a tick there is charged as system time and never
//! preempts it.
//!
//! ## Tick path
//!
//! ```text
//! tick interrupt
//!   └─► Kernel::timer_interrupt(cpl) / Kernel::tick()
//!         ├─► jiffies += 1
//!         ├─► Scheduler::do_timer(cpl)       ← timers, accounting, slice
//!         └─► schedule() + switch_to()       ← only if do_timer said so
//! ```

use core::cell::RefCell;

use log::debug;

use crate::arch::{ContextSwitch, Privilege};
use crate::error::SchedError;
use crate::scheduler::{Scheduler, Switch, TimerFn};
use crate::sync::{self, Mutex};
use crate::task::{Pid, Task, TaskHandle, TaskParams};
use crate::wait::WaitSlot;

/// Scheduler plus context-switch port. Usable as a `static`.
pub struct Kernel<A> {
    sched: Mutex<RefCell<Scheduler>>,
    arch: A,
}

impl<A: ContextSwitch> Kernel<A> {
    pub const fn new(arch: A) -> Self {
        Self {
            sched: Mutex::new(RefCell::new(Scheduler::new())),
            arch,
        }
    }

    /// Run `f` on the scheduler inside a critical section.
    ///
    /// This is how the process layer reaches task fields (`signal`,
    /// `blocked`, `state`, ...). `f` must not call back into this `Kernel`.
    pub fn with<R>(&self, f: impl FnOnce(&mut Scheduler) -> R) -> R {
        sync::critical_section(|cs| f(&mut self.sched.borrow_ref_mut(cs)))
    }

    pub fn arch(&self) -> &A {
        &self.arch
    }

    /// Hand `switch` to the port. Only called from inside `with`.
    fn switch(&self, switch: Switch) {
        if !switch.is_noop() {
            self.arch.switch_to(switch);
        }
    }

    // -----------------------------------------------------------------------
    // Task lifecycle
    // -----------------------------------------------------------------------

    /// Fill a free slot with a new runnable task.
    pub fn spawn(&self, params: TaskParams) -> Result<TaskHandle, SchedError> {
        self.spawn_with(params, |_| {})
    }

    /// Like `spawn`, with `init` run on the new descriptor before any
    /// scheduling decision can see it. Ports use it to lay out the initial
    /// stack frame.
    pub fn spawn_with(
        &self,
        params: TaskParams,
        init: impl FnOnce(&mut Task),
    ) -> Result<TaskHandle, SchedError> {
        let handle = self.with(|s| {
            let handle = s.tasks.insert(params)?;
            if let Some(task) = s.tasks.get_mut(handle) {
                init(task);
            }
            Ok::<_, SchedError>(handle)
        })?;
        debug!("spawned pid {} in slot {}", params.pid, handle.index());
        Ok(handle)
    }

    /// Clear `handle`'s slot, releasing a sleeper it had displaced. A task
    /// exiting itself gives up the CPU here.
    pub fn exit(&self, handle: TaskHandle) -> Result<(), SchedError> {
        self.with(|s| {
            s.remove_task(handle)?;
            if s.current() == handle {
                let switch = s.schedule();
                self.switch(switch);
            }
            Ok::<_, SchedError>(())
        })?;
        debug!("slot {} released", handle.index());
        Ok(())
    }

    /// `exit` for the task on the CPU.
    pub fn exit_current(&self) -> Result<(), SchedError> {
        let me = self.with(|s| s.current());
        self.exit(me)
    }

    // -----------------------------------------------------------------------
    // Scheduling and sleeping
    // -----------------------------------------------------------------------

    pub fn schedule(&self) {
        self.with(|s| self.switch(s.schedule()));
    }

    /// Sleep on `slot` until a `wake_up` reaches this task. Signals are
    /// ignored.
    ///
    /// # Panics
    /// When called by the idle task.
    pub fn sleep_on(&self, slot: &WaitSlot) {
        self.with(|s| {
            s.enter_kernel();
            self.switch(s.sleep_on(slot));
        });
        self.with(|s| {
            s.finish_sleep();
            s.leave_kernel();
        });
    }

    /// Sleep on `slot` until woken or a deliverable signal arrives. The
    /// caller checks its pending signals afterwards.
    ///
    /// # Panics
    /// When called by the idle task.
    pub fn interruptible_sleep_on(&self, slot: &WaitSlot) {
        self.with(|s| {
            s.enter_kernel();
            self.switch(s.interruptible_sleep_on(slot));
        });
        while self.with(|s| match s.resume_interruptible(slot) {
            Some(again) => {
                self.switch(again);
                true
            }
            None => {
                s.leave_kernel();
                false
            }
        }) {}
    }

    /// Make `slot`'s occupant runnable. Does not reschedule.
    pub fn wake_up(&self, slot: &WaitSlot) {
        self.with(|s| s.wake_up(slot));
    }

    /// Wait for a signal.
    pub fn pause(&self) {
        self.with(|s| self.switch(s.pause()));
    }

    // -----------------------------------------------------------------------
    // Time
    // -----------------------------------------------------------------------

    /// The tick source. `cpl` is the privilege level that was interrupted.
    pub fn timer_interrupt(&self, cpl: Privilege) {
        self.with(|s| self.run_tick(s, cpl));
    }

    /// The tick source for ports that cannot tell the interrupted privilege
    /// from hardware: a task inside a sleep primitive is in the kernel,
    /// anything else counts as user code.
    pub fn tick(&self) {
        self.with(|s| {
            let cpl = s.current_privilege();
            self.run_tick(s, cpl);
        });
    }

    fn run_tick(&self, s: &mut Scheduler, cpl: Privilege) {
        s.advance_jiffies();
        if s.do_timer(cpl) {
            self.switch(s.schedule());
        }
    }

    /// Run `callback` after `ticks` ticks, or right away for `ticks <= 0`.
    /// Callbacks run inside the tick's critical section and get the
    /// scheduler to work on.
    ///
    /// # Panics
    /// When the timer pool is exhausted.
    pub fn add_timer(&self, ticks: i64, callback: TimerFn) {
        self.with(|s| s.add_timer(ticks, callback));
    }

    /// See [`Scheduler::alarm`].
    pub fn alarm(&self, seconds: u64) -> u64 {
        self.with(|s| s.alarm(seconds))
    }

    pub fn jiffies(&self) -> u64 {
        self.with(|s| s.jiffies())
    }

    // -----------------------------------------------------------------------
    // Priorities and diagnostics
    // -----------------------------------------------------------------------

    pub fn renice(&self, handle: TaskHandle, delta: i32) -> Result<i32, SchedError> {
        self.with(|s| s.renice(handle, delta))
    }

    pub fn nice(&self, increment: i32) -> Result<i32, SchedError> {
        self.with(|s| s.nice(increment))
    }

    pub fn current_pid(&self) -> Pid {
        self.with(|s| s.current_pid())
    }

    pub fn show_stat(&self) {
        self.with(|s| s.show_stat());
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
