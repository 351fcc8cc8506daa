//! Kernel error type.

use core::fmt;

use crate::config::{MAX_DELAY_TICKS, MAX_PRIORITY_LEVELS};
use crate::stack::MIN_STACK_WORDS;

/// Errors reported synchronously by the kernel API.
///
/// Every failing call leaves the scheduler exactly as it was: no task is
/// half-registered and no list is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The task entry point address was zero.
    NullEntryPoint,
    /// Priority outside `0..MAX_PRIORITY_LEVELS`.
    InvalidPriority { priority: u8 },
    /// The stack cannot hold the two canary words plus the initial frame.
    /// `words` is the usable length, after aligning the top.
    StackTooSmall { words: usize },
    /// All `MAX_TASKS` task slots are in use.
    TooManyTasks,
    /// Tasks can only be registered before the scheduler starts.
    SchedulerStarted,
    /// The operation needs a running task.
    NotStarted,
    /// The idle task must always stay runnable.
    IdleCannotDelay,
    /// Delays are limited to [`MAX_DELAY_TICKS`].
    DelayTooLong { ticks: u32 },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NullEntryPoint => f.write_str("task entry point is null"),
            Error::InvalidPriority { priority } => write!(
                f,
                "priority {} out of range (max {})",
                priority,
                MAX_PRIORITY_LEVELS - 1
            ),
            Error::StackTooSmall { words } => write!(
                f,
                "stack of {} words is smaller than the {} word minimum",
                words, MIN_STACK_WORDS
            ),
            Error::TooManyTasks => f.write_str("no free task slots"),
            Error::SchedulerStarted => f.write_str("scheduler already started"),
            Error::NotStarted => f.write_str("scheduler not started"),
            Error::IdleCannotDelay => f.write_str("idle task cannot delay"),
            Error::DelayTooLong { ticks } => write!(
                f,
                "delay of {} ticks exceeds the {} tick maximum",
                ticks, MAX_DELAY_TICKS
            ),
        }
    }
}
