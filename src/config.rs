//! # jiffos Configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time; nothing is allocated at run time.

/// Number of slots in the task table, idle task included.
/// Each slot carries a `KERNEL_STACK_SIZE` stack, so this bounds RAM use.
pub const NR_TASKS: usize = 16;

/// Tick frequency in Hz. One tick is one jiffy.
pub const HZ: u32 = 100;

/// Size of the timer node pool. `add_timer` panics once all are in use.
pub const TIME_REQUESTS: usize = 64;

/// Per-task kernel stack size in bytes. Must hold the deepest kernel call
/// chain plus the hardware exception frame (32 bytes) and the
/// software-saved context (32 bytes for R4–R11).
pub const KERNEL_STACK_SIZE: usize = 1024;

/// Priority given to the idle task, and the usual priority for new tasks.
pub const INIT_PRIORITY: i32 = 15;

/// Slice credit the idle task and new tasks start with.
pub const INIT_COUNTER: i32 = 15;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;
