//! # jiffos: tick-driven scheduler core
//!
//! The process-scheduling core of a small single-CPU kernel in the classic
//! Unix mould: priority aging instead of ready queues, one-task wait slots
//! instead of wait queues, and a delta-encoded timer list driven by a fixed
//! rate clock interrupt.
//!
//! ## Overview
//!
//! - **Scheduling**: the runnable task with the most slice credit runs.
//!   When every runnable task has spent its credit, all tasks age
//!   (`counter / 2 + priority`), which favours tasks that slept.
//! - **Sleeping**: a task sleeps on a [`wait::WaitSlot`]; sleepers on the
//!   same slot are chained and released newest first.
//! - **Time**: each tick charges the current task, fires due timers and
//!   preempts a task whose slice ran out in user mode.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │            Process layer / drivers / firmware          │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel facade (kernel.rs)              │
//! │   spawn · exit · schedule · sleep_on · wake_up · tick  │
//! ├──────────────┬───────────────┬─────────────────────────┤
//! │  Scheduler   │  Wait slots   │  Tick handler           │
//! │  scheduler.rs│  wait.rs      │  tick.rs                │
//! │  ─ schedule()│  ─ sleep_on() │  ─ do_timer()           │
//! │  ─ renice()  │  ─ wake_up()  │  ─ add_timer()          │
//! ├──────────────┴───────────────┼─────────────────────────┤
//! │  Task table (registry.rs)    │  Timer list (timer.rs)  │
//! │  Task / signals (task.rs,    │  delta-encoded, pooled  │
//! │  signal.rs)                  │                         │
//! ├──────────────────────────────┴─────────────────────────┤
//! │       Arch port (arch/): ContextSwitch, Cortex-M4      │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: the task table, kernel stacks and timer pool are inline
//!   in the `Scheduler`, which a port keeps in a `static`
//! - **Critical sections**: all shared state is reached through the
//!   `critical-section` crate (see [`sync`])
//! - **Host testable**: everything but `arch::cortex_m4` builds and tests
//!   on the host

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod error;
pub mod kernel;
pub mod registry;
pub mod scheduler;
pub mod signal;
pub mod sync;
pub mod task;
pub mod tick;
pub mod timer;
pub mod wait;
