//! # Synchronization Primitives
//!
//! The single interrupt-safe discipline of the kernel. All shared scheduler
//! state (task table, timer list, wait slots) is only touched inside a
//! critical section; there are no blocking locks, because blocking would
//! need the very scheduler being protected.
//!
//! On Cortex-M the `critical-section` implementation comes from `cortex-m`'s
//! `critical-section-single-core` feature (interrupts disabled on entry,
//! restored on exit). Host tests use the crate's `std` implementation.

pub use critical_section::{CriticalSection, Mutex};

/// Execute a closure within a critical section (interrupts disabled).
///
/// Critical sections nest: the previous interrupt state is restored on
/// exit, so a callee may open its own.
///
/// # Usage
/// ```ignore
/// sync::critical_section(|cs| {
///     // Access shared state safely
/// });
/// ```
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce(CriticalSection<'_>) -> R,
{
    ::critical_section::with(f)
}
