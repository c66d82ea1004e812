//! # Architecture Abstraction Layer
//!
//! The boundary between the portable scheduler and the CPU. The scheduler
//! only decides *who* runs next; a port decides *how* the CPU gets there.
//! Ports live in sibling modules; the Cortex-M4 port is built for bare-metal
//! ARM targets only.

use crate::scheduler::Switch;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

/// Privilege level of the code a tick interrupted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Kernel code: never preempted by the tick.
    Kernel,
    /// User code: preempted once its slice is spent.
    User,
}

/// Hand-off from a scheduling decision to the CPU.
///
/// `Kernel` calls `switch_to` inside its critical section, right after the
/// decision, and only when `switch.prev != switch.next`. The port must not
/// call back into the `Kernel`, and the switch must not take effect before
/// the critical section ends: on Cortex-M it pends an exception that fires
/// once interrupts are re-enabled. Code after the critical section runs
/// when `switch.prev` is back on the CPU.
pub trait ContextSwitch {
    fn switch_to(&self, switch: Switch);
}
