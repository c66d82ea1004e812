//! # Tick Handler
//!
//! The per-interrupt half of the scheduler. The tick source advances
//! `jiffies` and then calls [`Scheduler::do_timer`] once per hardware timer
//! interrupt with the privilege level it interrupted.
//!
//! ## Sequence
//!
//! ```text
//! do_timer(cpl)
//!   ├─► beep countdown        ← stop action at zero
//!   ├─► utime / stime += 1    ← by cpl
//!   ├─► timer list            ← head delta -1, fire due callbacks
//!   ├─► periodic service      ← only while enabled
//!   └─► counter -= 1          ← spent and cpl == User → reschedule
//! ```
//!
//! Kernel-mode code is never preempted here; a task whose slice ran out in
//! the kernel gives up the CPU at its next user-mode tick or sleep.

use log::trace;

use crate::arch::Privilege;
use crate::scheduler::{Scheduler, TimerFn};

// ---------------------------------------------------------------------------
// Auxiliary tick consumers
// ---------------------------------------------------------------------------

/// One-shot countdown with a stop action, e.g. the console beep duration.
#[derive(Clone, Copy)]
pub(crate) struct Countdown {
    remaining: u32,
    stop: Option<TimerFn>,
}

impl Countdown {
    pub(crate) const IDLE: Countdown = Countdown {
        remaining: 0,
        stop: None,
    };

    /// Count one tick. Returns the stop action when the count reaches zero.
    fn tick(&mut self) -> Option<TimerFn> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        if self.remaining == 0 {
            self.stop.take()
        } else {
            None
        }
    }
}

/// A device service polled every tick while its enable flag is set.
#[derive(Clone, Copy)]
pub(crate) struct PeriodicService {
    service: Option<TimerFn>,
    enabled: bool,
}

impl PeriodicService {
    pub(crate) const NONE: PeriodicService = PeriodicService {
        service: None,
        enabled: false,
    };
}

// ---------------------------------------------------------------------------
// Tick handler and timer API
// ---------------------------------------------------------------------------

impl Scheduler {
    /// Account one tick to the current task and run the tick consumers.
    ///
    /// # Returns
    /// `true` when the current task's slice is spent and the interrupted
    /// context was user mode, i.e. the caller must `schedule()`.
    pub fn do_timer(&mut self, cpl: Privilege) -> bool {
        if let Some(stop) = self.beep.tick() {
            stop(self);
        }

        if let Some(task) = self.current_task_mut() {
            match cpl {
                Privilege::User => task.utime += 1,
                Privilege::Kernel => task.stime += 1,
            }
        }

        self.service_timers();

        if self.periodic.enabled {
            if let Some(service) = self.periodic.service {
                service(self);
            }
        }

        let Some(task) = self.current_task_mut() else {
            return cpl == Privilege::User;
        };
        task.counter -= 1;
        if task.counter > 0 {
            return false;
        }
        task.counter = 0;
        cpl == Privilege::User
    }

    /// Advance the timer list one tick and fire what came due.
    ///
    /// Each node is back in the pool before its callback runs, so callbacks
    /// may queue new timers.
    fn service_timers(&mut self) {
        self.timers.tick();
        while let Some(callback) = self.timers.pop_expired() {
            trace!("timer fired at jiffy {}", self.jiffies());
            callback(self);
        }
    }

    /// Run `callback` after `ticks` ticks; `ticks <= 0` runs it right away.
    ///
    /// # Panics
    /// When all `TIME_REQUESTS` timer nodes are queued.
    pub fn add_timer(&mut self, ticks: i64, callback: TimerFn) {
        if ticks <= 0 {
            callback(self);
        } else {
            self.timers.insert(ticks, callback);
        }
    }

    /// Pending timers, head first.
    pub fn timers(&self) -> impl Iterator<Item = crate::timer::TimerEntry> + '_ {
        self.timers.iter()
    }

    /// Start the beep countdown: `stop` runs after `ticks` ticks. Replaces
    /// a countdown already running; `ticks == 0` cancels it.
    pub fn start_beep(&mut self, ticks: u32, stop: TimerFn) {
        self.beep = Countdown {
            remaining: ticks,
            stop: if ticks > 0 { Some(stop) } else { None },
        };
    }

    /// Ticks left on the beep countdown.
    pub fn beep_remaining(&self) -> u32 {
        self.beep.remaining
    }

    /// Mark the current task as executing kernel code until `leave_kernel`.
    pub fn enter_kernel(&mut self) {
        if let Some(task) = self.current_task_mut() {
            task.in_kernel = true;
        }
    }

    pub fn leave_kernel(&mut self) {
        if let Some(task) = self.current_task_mut() {
            task.in_kernel = false;
        }
    }

    /// Privilege the current task runs at, for tick sources that cannot
    /// read it from the interrupted context.
    pub fn current_privilege(&self) -> Privilege {
        match self.current_task() {
            Some(task) if task.in_kernel => Privilege::Kernel,
            _ => Privilege::User,
        }
    }

    /// Register (or with `None`, drop) the per-tick device service.
    pub fn set_periodic_service(&mut self, service: Option<TimerFn>) {
        self.periodic.service = service;
    }

    /// Gate the per-tick device service without unregistering it.
    pub fn set_periodic_enabled(&mut self, enabled: bool) {
        self.periodic.enabled = enabled;
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskHandle, TaskParams, TaskState};
    use crate::wait::WaitSlot;
    use core::sync::atomic::{AtomicUsize, Ordering};

    fn running(s: &mut Scheduler, priority: i32, counter: i32) -> TaskHandle {
        let pid = s.tasks.len() as i32;
        let h = s
            .tasks
            .insert(TaskParams::new(pid).with_priority(priority).with_counter(counter))
            .unwrap();
        s.set_current(h);
        h
    }

    #[test]
    fn test_user_and_kernel_ticks_accounted_separately() {
        let mut s = Scheduler::new();
        let a = running(&mut s, 1, 1000);
        let b = running(&mut s, 1, 1000);

        let pattern = [
            (a, Privilege::User),
            (b, Privilege::Kernel),
            (a, Privilege::Kernel),
            (a, Privilege::User),
            (b, Privilege::User),
            (a, Privilege::User),
        ];
        for (task, cpl) in pattern {
            s.set_current(task);
            s.advance_jiffies();
            s.do_timer(cpl);
        }

        let ta = s.tasks.get(a).unwrap();
        assert_eq!((ta.utime, ta.stime), (3, 1));
        let tb = s.tasks.get(b).unwrap();
        assert_eq!((tb.utime, tb.stime), (1, 1));
        assert_eq!(ta.counter, 996);
    }

    #[test]
    fn test_spent_slice_preempts_only_in_user_mode() {
        let mut s = Scheduler::new();
        let a = running(&mut s, 1, 2);

        assert!(!s.do_timer(Privilege::User));
        assert_eq!(s.tasks.get(a).unwrap().counter, 1);

        assert!(!s.do_timer(Privilege::Kernel));
        assert_eq!(s.tasks.get(a).unwrap().counter, 0);

        // Clamped at zero, user mode asks for a reschedule
        assert!(s.do_timer(Privilege::User));
        assert_eq!(s.tasks.get(a).unwrap().counter, 0);
    }

    #[test]
    fn test_task_marked_in_kernel_reports_kernel_privilege() {
        let mut s = Scheduler::new();
        let a = running(&mut s, 1, 1);
        assert_eq!(s.current_privilege(), Privilege::User);

        s.enter_kernel();
        assert_eq!(s.current_privilege(), Privilege::Kernel);
        let cpl = s.current_privilege();
        assert!(!s.do_timer(cpl));
        assert_eq!(s.tasks.get(a).unwrap().stime, 1);

        s.leave_kernel();
        let cpl = s.current_privilege();
        assert!(s.do_timer(cpl));
        assert_eq!(s.tasks.get(a).unwrap().utime, 1);
    }

    static FIRED_EARLY: AtomicUsize = AtomicUsize::new(0);
    static FIRED_LATE: AtomicUsize = AtomicUsize::new(0);

    fn early(s: &mut Scheduler) {
        assert_eq!(s.jiffies(), 3);
        FIRED_EARLY.fetch_add(1, Ordering::SeqCst);
    }

    fn late(s: &mut Scheduler) {
        assert_eq!(s.jiffies(), 5);
        FIRED_LATE.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_timers_fire_on_their_tick() {
        let mut s = Scheduler::new();
        s.add_timer(5, late);
        s.add_timer(3, early);
        let deltas: Vec<(i64, i64)> = s.timers().map(|e| (e.delta, e.remaining)).collect();
        assert_eq!(deltas, [(3, 3), (2, 5)]);

        for _ in 0..3 {
            s.advance_jiffies();
            s.do_timer(Privilege::Kernel);
        }
        assert_eq!(FIRED_EARLY.load(Ordering::SeqCst), 1);
        assert_eq!(FIRED_LATE.load(Ordering::SeqCst), 0);
        assert_eq!(s.timers().count(), 1);

        for _ in 0..2 {
            s.advance_jiffies();
            s.do_timer(Privilege::Kernel);
        }
        assert_eq!(FIRED_EARLY.load(Ordering::SeqCst), 1);
        assert_eq!(FIRED_LATE.load(Ordering::SeqCst), 1);
        assert_eq!(s.timers().count(), 0);
    }

    static INLINE: AtomicUsize = AtomicUsize::new(0);

    fn inline(_: &mut Scheduler) {
        INLINE.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_non_positive_delay_runs_inline() {
        let mut s = Scheduler::new();
        s.add_timer(0, inline);
        assert_eq!(INLINE.load(Ordering::SeqCst), 1);
        s.add_timer(-4, inline);
        assert_eq!(INLINE.load(Ordering::SeqCst), 2);
        assert_eq!(s.timers().count(), 0);
    }

    static DEVICE_READY: WaitSlot = WaitSlot::new();

    fn device_ready(s: &mut Scheduler) {
        s.wake_up(&DEVICE_READY);
    }

    #[test]
    fn test_timer_callback_wakes_sleeper() {
        let mut s = Scheduler::new();
        let a = running(&mut s, 1, 10);
        s.add_timer(2, device_ready);
        s.sleep_on(&DEVICE_READY);
        assert_eq!(s.current(), TaskHandle::IDLE);

        s.advance_jiffies();
        s.do_timer(Privilege::Kernel);
        assert_eq!(s.tasks.get(a).unwrap().state, TaskState::Uninterruptible);

        s.advance_jiffies();
        s.do_timer(Privilege::Kernel);
        assert_eq!(s.tasks.get(a).unwrap().state, TaskState::Running);
        assert!(DEVICE_READY.is_empty());
    }

    static BEEP_STOPPED: AtomicUsize = AtomicUsize::new(0);

    fn beep_off(_: &mut Scheduler) {
        BEEP_STOPPED.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_beep_countdown_stops_once() {
        let mut s = Scheduler::new();
        s.start_beep(3, beep_off);
        for _ in 0..2 {
            s.do_timer(Privilege::Kernel);
        }
        assert_eq!(s.beep_remaining(), 1);
        assert_eq!(BEEP_STOPPED.load(Ordering::SeqCst), 0);

        for _ in 0..5 {
            s.do_timer(Privilege::Kernel);
        }
        assert_eq!(s.beep_remaining(), 0);
        assert_eq!(BEEP_STOPPED.load(Ordering::SeqCst), 1);
    }

    static POLLS: AtomicUsize = AtomicUsize::new(0);

    fn poll(_: &mut Scheduler) {
        POLLS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_periodic_service_runs_only_while_enabled() {
        let mut s = Scheduler::new();
        s.set_periodic_service(Some(poll));
        s.do_timer(Privilege::Kernel);
        assert_eq!(POLLS.load(Ordering::SeqCst), 0);

        s.set_periodic_enabled(true);
        for _ in 0..4 {
            s.do_timer(Privilege::Kernel);
        }
        assert_eq!(POLLS.load(Ordering::SeqCst), 4);

        s.set_periodic_enabled(false);
        s.do_timer(Privilege::Kernel);
        assert_eq!(POLLS.load(Ordering::SeqCst), 4);
    }
}
