//! # Signals
//!
//! The scheduler does not deliver signals; it only needs to know whether an
//! interruptible sleeper has something deliverable pending. Delivery policy
//! belongs to the process layer, which owns `Task::signal` and
//! `Task::blocked`.

use bitflags::bitflags;

use crate::task::Task;

bitflags! {
    /// A 32-bit signal set. Signal `n` lives in bit `n - 1`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SigSet: u32 {
        const SIGHUP = 1 << 0;
        const SIGINT = 1 << 1;
        const SIGQUIT = 1 << 2;
        const SIGILL = 1 << 3;
        const SIGTRAP = 1 << 4;
        const SIGABRT = 1 << 5;
        const SIGUNUSED = 1 << 6;
        const SIGFPE = 1 << 7;
        const SIGKILL = 1 << 8;
        const SIGUSR1 = 1 << 9;
        const SIGSEGV = 1 << 10;
        const SIGUSR2 = 1 << 11;
        const SIGPIPE = 1 << 12;
        const SIGALRM = 1 << 13;
        const SIGTERM = 1 << 14;
        const SIGSTKFLT = 1 << 15;
        const SIGCHLD = 1 << 16;
        const SIGCONT = 1 << 17;
        const SIGSTOP = 1 << 18;
        const SIGTSTP = 1 << 19;
        const SIGTTIN = 1 << 20;
        const SIGTTOU = 1 << 21;

        // Unnamed signals up to 32 are still valid members.
        const _ = !0;
    }
}

impl SigSet {
    /// Signals that `blocked` has no effect on.
    pub const UNBLOCKABLE: SigSet = SigSet::SIGKILL.union(SigSet::SIGSTOP);

    /// Members of `self` that are not held back by `blocked`.
    pub fn deliverable(self, blocked: SigSet) -> SigSet {
        self.difference(blocked.difference(Self::UNBLOCKABLE))
    }
}

/// Whether `task` has a pending signal its mask lets through.
///
/// This is the only signal question the scheduler asks.
#[inline]
pub fn has_unblocked_pending(task: &Task) -> bool {
    !task.signal.deliverable(task.blocked).is_empty()
}
