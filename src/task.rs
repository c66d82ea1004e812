//! # Task Descriptor
//!
//! Defines the per-task state the scheduler works with. Descriptors live in
//! the fixed task table (`registry.rs`) and are addressed by
//! generation-checked [`TaskHandle`]s, so a handle kept across a slot reuse
//! can never reach the new occupant.
//!
//! Creation and termination belong to the process layer; this core only
//! reads and updates fields during scheduling decisions, wait/wake
//! transitions and tick accounting.

use core::fmt;

use crate::config::{INIT_COUNTER, INIT_PRIORITY, KERNEL_STACK_SIZE};
use crate::signal::SigSet;

/// Process identifier.
pub type Pid = i32;

// ---------------------------------------------------------------------------
// Task state machine
// ---------------------------------------------------------------------------

/// Execution state of a task.
///
/// ```text
///                  sleep_on / interruptible_sleep_on / pause
///   ┌─────────┐  ─────────────────────────────────────────►  ┌──────────────┐
///   │ Running │                                              │ (Un)interrup- │
///   └─────────┘  ◄─────────────────────────────────────────  │ tible wait    │
///                 wake_up / cascade / unblocked signal       └──────────────┘
/// ```
///
/// `Zombie` and `Stopped` are set by the process layer. The scheduler
/// respects them (never selects them) but never enters or leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    /// Runnable, or currently on the CPU.
    Running = 0,
    /// Asleep; a deliverable signal also wakes it.
    Interruptible = 1,
    /// Asleep; only an explicit wake brings it back.
    Uninterruptible = 2,
    /// Exited, waiting for its parent.
    Zombie = 3,
    /// Stopped by job control.
    Stopped = 4,
}

impl TaskState {
    /// True for the two sleep states.
    #[inline]
    pub const fn is_waiting(self) -> bool {
        matches!(self, TaskState::Interruptible | TaskState::Uninterruptible)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as u8)
    }
}

// ---------------------------------------------------------------------------
// Handles
// ---------------------------------------------------------------------------

/// Stable reference to a task-table slot.
///
/// The generation changes every time the slot is vacated, so handles to a
/// dead task resolve to nothing instead of to the slot's next owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    index: u16,
    generation: u32,
}

impl TaskHandle {
    /// The idle task. Slot 0 is never freed, so its generation never moves.
    pub const IDLE: TaskHandle = TaskHandle {
        index: 0,
        generation: 0,
    };

    pub(crate) const fn new(index: usize, generation: u32) -> Self {
        Self {
            index: index as u16,
            generation,
        }
    }

    /// Slot index in the task table.
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    #[inline]
    pub const fn is_idle(self) -> bool {
        self.index == 0
    }
}

// ---------------------------------------------------------------------------
// Creation parameters
// ---------------------------------------------------------------------------

/// What the process layer supplies when it fills a slot.
#[derive(Debug, Clone, Copy)]
pub struct TaskParams {
    pub pid: Pid,
    /// Baseline credit re-added on every aging round. Must be positive.
    pub priority: i32,
    /// Starting slice credit.
    pub counter: i32,
    pub pgrp: Pid,
}

impl TaskParams {
    /// Parameters with the default priority and a full slice.
    pub const fn new(pid: Pid) -> Self {
        Self {
            pid,
            priority: INIT_PRIORITY,
            counter: INIT_COUNTER,
            pgrp: pid,
        }
    }

    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub const fn with_counter(mut self, counter: i32) -> Self {
        self.counter = counter;
        self
    }

    pub const fn with_pgrp(mut self, pgrp: Pid) -> Self {
        self.pgrp = pgrp;
        self
    }
}

// ---------------------------------------------------------------------------
// Kernel stack
// ---------------------------------------------------------------------------

/// A task's kernel stack. Aligned to 8 bytes as required by ARM AAPCS.
///
/// The stack grows down from `top()`, and is zero-filled when the task is
/// created, so the run of zero bytes at the low end approximates the space
/// the task has never touched.
#[repr(C, align(8))]
pub struct KernelStack([u8; KERNEL_STACK_SIZE]);

impl KernelStack {
    pub const ZEROED: KernelStack = KernelStack([0; KERNEL_STACK_SIZE]);

    /// Bytes at the bottom of the stack that are still zero.
    pub fn unused_bytes(&self) -> usize {
        self.0.iter().take_while(|&&b| b == 0).count()
    }

    pub const fn size(&self) -> usize {
        KERNEL_STACK_SIZE
    }

    /// One past the highest byte; the initial stack pointer.
    pub fn top(&mut self) -> *mut u8 {
        self.0.as_mut_ptr_range().end
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

// ---------------------------------------------------------------------------
// Task descriptor
// ---------------------------------------------------------------------------

/// One schedulable unit of execution.
pub struct Task {
    /// Process id, fixed at creation.
    pub pid: Pid,

    pub state: TaskState,

    /// Remaining slice credit. Spent by the tick handler, refilled by aging.
    pub counter: i32,

    /// Always strictly positive; only `renice` changes it.
    priority: i32,

    /// Pending signals, raised by the process layer (and by alarms).
    pub signal: SigSet,

    /// Signals the task does not want to be woken by.
    pub blocked: SigSet,

    /// Absolute jiffy at which `SIGALRM` is raised. `0` is disarmed.
    pub alarm: u64,

    /// Process group, for signal fan-out in the process layer.
    pub pgrp: Pid,

    /// Ticks charged while the CPU was in user mode.
    pub utime: u64,

    /// Ticks charged while the CPU was in kernel mode.
    pub stime: u64,

    /// The waiter this task pushed out of a wait slot when it went to sleep.
    /// Woken when this task finishes its sleep primitive.
    pub(crate) wait_next: Option<TaskHandle>,

    /// Set while the task is between the halves of a sleep primitive, where
    /// a tick must count as kernel time and never preempt it.
    pub(crate) in_kernel: bool,

    /// Saved-context word owned by the architecture port (the process stack
    /// pointer on Cortex-M). Opaque to the scheduler.
    pub context: usize,

    pub stack: KernelStack,
}

impl Task {
    /// Descriptor for a freshly created task.
    pub const fn new(params: TaskParams) -> Self {
        Self {
            pid: params.pid,
            state: TaskState::Running,
            counter: params.counter,
            priority: params.priority,
            signal: SigSet::empty(),
            blocked: SigSet::empty(),
            alarm: 0,
            pgrp: params.pgrp,
            utime: 0,
            stime: 0,
            wait_next: None,
            in_kernel: false,
            context: 0,
            stack: KernelStack::ZEROED,
        }
    }

    /// The idle task that permanently owns slot 0.
    pub const fn idle() -> Self {
        Self::new(TaskParams::new(0))
    }

    #[inline]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// Lower the priority by `delta` (raise it for a negative `delta`).
    ///
    /// A change that would leave the priority at zero or below is ignored.
    /// Returns whether the change was applied.
    pub fn renice(&mut self, delta: i32) -> bool {
        match self.priority.checked_sub(delta) {
            Some(priority) if priority > 0 => {
                self.priority = priority;
                true
            }
            _ => false,
        }
    }

    /// Aging step: halve the remaining credit and add the priority back.
    #[inline]
    pub(crate) fn age(&mut self) {
        self.counter = (self.counter / 2).saturating_add(self.priority);
    }

}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("pid", &self.pid)
            .field("state", &self.state)
            .field("counter", &self.counter)
            .field("priority", &self.priority)
            .field("signal", &self.signal)
            .field("blocked", &self.blocked)
            .field("alarm", &self.alarm)
            .field("utime", &self.utime)
            .field("stime", &self.stime)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
