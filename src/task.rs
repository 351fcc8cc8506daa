//! # Task Control Block
//!
//! Per-task descriptor and list linkage.
//!
//! A task's identity lives in its [`TaskControlBlock`]; its position in a
//! ready or blocked list lives in its [`TaskNode`]. Both are stored in the
//! scheduler's arena at the index given by the task's [`TaskId`].

use core::fmt;
use core::ptr;

// ---------------------------------------------------------------------------
// Task identity
// ---------------------------------------------------------------------------

/// Task identifier. Assigned monotonically at registration and doubles as
/// the task's arena index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u32);

impl TaskId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Task state
// ---------------------------------------------------------------------------

/// Which list a task's node currently sits in.
///
/// ```text
///   ┌──────────┐      delay()       ┌──────────┐
///   │  Ready   │ ─────────────────► │ Blocked  │
///   └──────────┘                    └──────────┘
///        ▲        wake tick reached       │
///        └────────────────────────────────┘
/// ```
///
/// The running task keeps its place in its ready list, so "running" is not
/// a separate state here. The idle task is always `Ready` and never listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Ready,
    Blocked,
}

// ---------------------------------------------------------------------------
// Task Control Block
// ---------------------------------------------------------------------------

pub struct TaskControlBlock {
    /// Saved process stack pointer, pointing at saved R4.
    ///
    /// Written only while the task is not running: by registration and by
    /// the context switch engine.
    pub stack_pointer: *mut u32,

    /// Static priority, `0..MAX_PRIORITY_LEVELS`. Higher runs first.
    pub priority: u8,

    pub id: TaskId,

    /// Tick at which a blocked task becomes ready again.
    pub delayed_until: u32,

    /// First (lowest-address) word of the stack, where the canaries live.
    pub stack_lower_bound: *mut u32,

    /// Stack length in words.
    pub stack_words: usize,

    pub state: TaskState,
}

// Safety: the raw pointers refer to caller-provided `'static` stacks (or
// test-owned arrays that outlive the scheduler), and TCBs are only touched
// inside critical sections.
unsafe impl Send for TaskControlBlock {}

impl TaskControlBlock {
    /// An unused arena slot.
    pub const EMPTY: Self = Self {
        stack_pointer: ptr::null_mut(),
        priority: 0,
        id: TaskId(0),
        delayed_until: 0,
        stack_lower_bound: ptr::null_mut(),
        stack_words: 0,
        state: TaskState::Ready,
    };

    /// Fill in a slot for a task whose stack has already been prepared.
    pub fn init(&mut self, id: TaskId, priority: u8, stack: &mut [u32], initial_sp: *mut u32) {
        self.stack_pointer = initial_sp;
        self.priority = priority;
        self.id = id;
        self.delayed_until = 0;
        self.stack_lower_bound = stack.as_mut_ptr();
        self.stack_words = stack.len();
        self.state = TaskState::Ready;
    }
}

/// List linkage for one arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskNode {
    pub next: Option<TaskId>,
}

impl TaskNode {
    pub const EMPTY: Self = Self { next: None };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tcb_initialization() {
        let mut stack = [0u32; 32];
        let mut tcb = TaskControlBlock::EMPTY;
        let sp = unsafe { stack.as_mut_ptr().add(16) };
        tcb.init(TaskId::new(3), 2, &mut stack, sp);

        assert_eq!(tcb.id, TaskId::new(3));
        assert_eq!(tcb.priority, 2);
        assert_eq!(tcb.stack_pointer, sp);
        assert_eq!(tcb.stack_lower_bound, stack.as_mut_ptr());
        assert_eq!(tcb.stack_words, 32);
        assert_eq!(tcb.state, TaskState::Ready);
    }

    #[test]
    fn test_task_id_index() {
        let id = TaskId::new(5);
        assert_eq!(id.index(), 5);
        assert_eq!(id.as_u32(), 5);
        assert!(TaskId::new(1) < TaskId::new(2));
    }
}
