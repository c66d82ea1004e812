//! Error types for the task-table collaborator surface.
//!
//! Contract violations inside the core (idle task sleeping, timer pool
//! exhausted) are fatal and panic instead; see `wait` and `timer`.

use core::fmt;

/// Errors returned to process-lifecycle code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// Every slot of the task table is taken.
    TableFull,
    /// The handle's slot is empty or was reused since the handle was issued.
    StaleHandle,
    /// The operation would remove or otherwise retire the idle task.
    IdleTask,
    /// Tasks must start with a strictly positive priority.
    InvalidPriority,
}

impl SchedError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SchedError::TableFull => "task table full",
            SchedError::StaleHandle => "stale task handle",
            SchedError::IdleTask => "operation not permitted on the idle task",
            SchedError::InvalidPriority => "priority must be positive",
        }
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
