//! # Scheduler
//!
//! Fixed-priority preemptive scheduling with round-robin among equal
//! priorities. This module holds all scheduling *policy* and never touches
//! a CPU register, so it runs unchanged in host unit tests. The
//! exception handlers in `arch::cortex_m4` call into it.
//!
//! ## Scheduling Algorithm
//!
//! At each SysTick interrupt:
//! 1. **Advance time**: increment the tick counter
//! 2. **Unblock**: move every blocked task whose wake tick has been reached
//!    to the tail of its ready list
//! 3. **Preempt**: if the highest ready task outranks the running one,
//!    switch to it
//! 4. **Rotate**: otherwise, if the running task has a successor in its
//!    ready list, switch to that successor; if it is the tail, switch back
//!    to the list head
//!
//! A switch request only records the target in `next_task`; PendSV performs
//! the switch later, so several requests issued before it runs collapse
//! into the latest one.
//!
//! ## Idle task
//!
//! The idle task occupies the last arena slot, has priority 0 and is never
//! put in a list. [`Scheduler::highest_ready`] falls back to it when every
//! ready list is empty.

use crate::config::{MAX_DELAY_TICKS, MAX_PRIORITY_LEVELS, MAX_TASKS};
use crate::error::Error;
use crate::list::TaskList;
use crate::mpu::Region;
use crate::stack::{self, MIN_STACK_WORDS};
use crate::task::{TaskControlBlock, TaskId, TaskNode, TaskState};

/// Application tasks plus the idle task.
const ARENA_SLOTS: usize = MAX_TASKS + 1;

/// The outgoing task's canaries were overwritten. Its saved context cannot
/// be trusted, so the switch is abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackOverflow {
    pub task: TaskId,
}

/// Wrap-safe "has `deadline` been reached at `now`".
///
/// Delays up to [`MAX_DELAY_TICKS`] are measured correctly across a wrap
/// of the tick counter.
#[inline]
fn deadline_reached(now: u32, deadline: u32) -> bool {
    now.wrapping_sub(deadline) as i32 >= 0
}

fn check_stack(stack: &[u32]) -> Result<(), Error> {
    let words = stack::usable_words(stack);
    if words < MIN_STACK_WORDS {
        return Err(Error::StackTooSmall { words });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The central scheduler state. Stored in a `KernelCell` in `kernel.rs`.
pub struct Scheduler {
    tasks: [TaskControlBlock; ARENA_SLOTS],
    nodes: [TaskNode; ARENA_SLOTS],

    /// One FIFO per priority; index = priority.
    ready: [TaskList; MAX_PRIORITY_LEVELS],

    /// Unordered list of delayed tasks.
    blocked: TaskList,

    /// Running task. `None` until [`Scheduler::start`].
    current: Option<TaskId>,

    /// Target of the outstanding switch request, consumed by PendSV.
    next_task: Option<TaskId>,

    idle: Option<TaskId>,

    /// Slots in use, including the idle task once started.
    task_count: usize,

    /// Monotonic (wrapping) tick counter.
    ticks: u32,
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [TaskControlBlock::EMPTY; ARENA_SLOTS],
            nodes: [TaskNode::EMPTY; ARENA_SLOTS],
            ready: [TaskList::EMPTY; MAX_PRIORITY_LEVELS],
            blocked: TaskList::EMPTY,
            current: None,
            next_task: None,
            idle: None,
            task_count: 0,
            ticks: 0,
        }
    }

    /// Register a new task.
    ///
    /// `entry` is the address of the task function. The stack is filled
    /// with the watermark, guarded by two canaries and given an initial
    /// exception frame; the task is then appended to its priority's ready
    /// list.
    ///
    /// # Errors
    /// Fails without touching any list if the entry is null, the scheduler
    /// has started, the priority is out of range, the stack cannot hold
    /// [`MIN_STACK_WORDS`], or every slot is taken.
    pub fn create_task(
        &mut self,
        stack: &mut [u32],
        entry: usize,
        priority: u8,
    ) -> Result<TaskId, Error> {
        if entry == 0 {
            return Err(Error::NullEntryPoint);
        }
        if self.is_started() {
            return Err(Error::SchedulerStarted);
        }
        if priority as usize >= MAX_PRIORITY_LEVELS {
            return Err(Error::InvalidPriority { priority });
        }
        check_stack(stack)?;
        if self.task_count >= MAX_TASKS {
            return Err(Error::TooManyTasks);
        }

        let region = Region::for_task_stack(stack.as_ptr(), stack.len());
        if !region.contains(stack.as_ptr() as usize as u32, (stack.len() * 4) as u32) {
            log::warn!(
                "stack at {:p} is not aligned to its {} byte MPU region",
                stack.as_ptr(),
                region.size()
            );
        }

        let id = self.install(stack, entry, priority);
        self.ready[priority as usize].push_back(&mut self.nodes, id);

        log::debug!(
            "created {} (priority {}, {} stack words)",
            id,
            priority,
            stack.len()
        );
        Ok(id)
    }

    /// Claim the next arena slot and prepare its stack.
    fn install(&mut self, stack: &mut [u32], entry: usize, priority: u8) -> TaskId {
        let id = TaskId::new(self.task_count as u32);
        let initial_sp = stack::init_stack_frame(stack, entry);
        self.tasks[id.index()].init(id, priority, stack, initial_sp);
        self.nodes[id.index()] = TaskNode::EMPTY;
        self.task_count += 1;
        id
    }

    /// Install the idle task and pick the first task to run.
    ///
    /// Returns the task the bootstrap trap should launch. Registration is
    /// closed from here on.
    pub fn start(&mut self, idle_stack: &mut [u32], idle_entry: usize) -> Result<TaskId, Error> {
        if self.is_started() {
            return Err(Error::SchedulerStarted);
        }
        if idle_entry == 0 {
            return Err(Error::NullEntryPoint);
        }
        check_stack(idle_stack)?;

        let idle = self.install(idle_stack, idle_entry, 0);
        self.idle = Some(idle);

        let first = self.highest_ready().unwrap_or(idle);
        self.current = Some(first);
        self.next_task = None;

        log::info!(
            "scheduler started: {} application tasks, first {}",
            self.task_count - 1,
            first
        );
        Ok(first)
    }

    /// Head of the highest-priority non-empty ready list, or the idle task.
    ///
    /// `None` only before [`Scheduler::start`] when no task is ready.
    pub fn highest_ready(&self) -> Option<TaskId> {
        self.ready
            .iter()
            .rev()
            .find_map(|list| list.head())
            .or(self.idle)
    }

    /// Advance time by one tick and decide whether to switch.
    ///
    /// Returns the switch target if a context switch must be pended.
    pub fn tick(&mut self) -> Option<TaskId> {
        self.ticks = self.ticks.wrapping_add(1);
        self.unblock_due_tasks();

        let current = self.current?;
        let highest = self.highest_ready()?;
        let running = &self.tasks[current.index()];

        // A running task that has just delayed itself is the tail of the
        // blocked list, so it has no `next` and falls through to `highest`.
        let target = if self.tasks[highest.index()].priority > running.priority {
            Some(highest)
        } else if let Some(sibling) = self.nodes[current.index()].next {
            Some(sibling)
        } else if highest != current {
            Some(highest)
        } else {
            None
        };

        match target {
            Some(next) => self.next_task = Some(next),
            // An outstanding request is stale: the running task should keep
            // the CPU after all (it was woken before PendSV ran).
            None if self.next_task.is_some() => self.next_task = Some(current),
            None => {}
        }
        target
    }

    /// Move every due task from the blocked list to its ready list.
    fn unblock_due_tasks(&mut self) {
        let now = self.ticks;
        let mut cursor = self.blocked.head();

        while let Some(id) = cursor {
            cursor = self.nodes[id.index()].next;

            let tcb = &mut self.tasks[id.index()];
            if !deadline_reached(now, tcb.delayed_until) {
                continue;
            }
            tcb.state = TaskState::Ready;
            let priority = tcb.priority as usize;

            self.blocked.remove(&mut self.nodes, id);
            self.ready[priority].push_back(&mut self.nodes, id);
        }
    }

    /// Block the running task for `ticks` ticks.
    ///
    /// The task leaves its ready list, joins the blocked list, and the
    /// highest ready task becomes the switch target. The caller must pend
    /// the context switch.
    pub fn delay(&mut self, ticks: u32) -> Result<TaskId, Error> {
        let current = self.current.ok_or(Error::NotStarted)?;
        if Some(current) == self.idle {
            return Err(Error::IdleCannotDelay);
        }
        if ticks > MAX_DELAY_TICKS {
            return Err(Error::DelayTooLong { ticks });
        }

        let tcb = &mut self.tasks[current.index()];
        tcb.delayed_until = self.ticks.wrapping_add(ticks);
        tcb.state = TaskState::Blocked;
        let priority = tcb.priority as usize;

        self.ready[priority].remove(&mut self.nodes, current);
        let next = self.highest_ready().unwrap_or(current);
        self.blocked.push_back(&mut self.nodes, current);
        self.next_task = Some(next);

        log::trace!("{} delayed until tick {}", current, self.ticks.wrapping_add(ticks));
        Ok(next)
    }

    /// Stack guard for the task about to be switched out.
    pub fn check_outgoing_stack(&self) -> Result<(), StackOverflow> {
        let Some(current) = self.current else {
            return Ok(());
        };
        // Safety: every installed TCB points at a stack prepared by
        // `init_stack_frame` that outlives the scheduler.
        let intact = unsafe { stack::canaries_intact(self.tasks[current.index()].stack_lower_bound) };
        if intact {
            Ok(())
        } else {
            Err(StackOverflow { task: current })
        }
    }

    /// Context switch bookkeeping, called from PendSV once R4–R11 have been
    /// pushed onto the outgoing task's stack.
    ///
    /// Saves `saved_sp` into the outgoing TCB, makes the requested task
    /// current and returns its saved stack pointer. If the outgoing stack
    /// has overflowed nothing is modified.
    pub fn switch_context(&mut self, saved_sp: *mut u32) -> Result<*mut u32, StackOverflow> {
        self.check_outgoing_stack()?;

        let Some(outgoing) = self.current else {
            return Ok(saved_sp);
        };
        self.tasks[outgoing.index()].stack_pointer = saved_sp;

        let incoming = self.next_task.take().unwrap_or(outgoing);
        self.current = Some(incoming);
        Ok(self.tasks[incoming.index()].stack_pointer)
    }

    /// Untouched stack words of `id`, a measure of its worst-case headroom.
    pub fn stack_headroom(&self, id: TaskId) -> usize {
        let tcb = &self.tasks[id.index()];
        // Safety: as in `check_outgoing_stack`.
        unsafe { stack::headroom_words(tcb.stack_lower_bound, tcb.stack_words) }
    }

    /// MPU region protecting a task's stack.
    pub fn stack_region(&self, id: TaskId) -> Region {
        let tcb = &self.tasks[id.index()];
        Region::for_task_stack(tcb.stack_lower_bound, tcb.stack_words)
    }

    /// Stack region of the running task: what the MPU must hold once a
    /// switch (or the bootstrap trap) has committed.
    pub fn current_stack_region(&self) -> Option<Region> {
        self.current.map(|id| self.stack_region(id))
    }

    pub fn task(&self, id: TaskId) -> &TaskControlBlock {
        &self.tasks[id.index()]
    }

    pub fn current(&self) -> Option<TaskId> {
        self.current
    }

    pub fn next_task(&self) -> Option<TaskId> {
        self.next_task
    }

    pub fn idle(&self) -> Option<TaskId> {
        self.idle
    }

    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    pub fn is_started(&self) -> bool {
        self.current.is_some()
    }

    /// Number of registered application tasks.
    pub fn task_count(&self) -> usize {
        self.task_count - self.idle.is_some() as usize
    }

    /// Ready tasks at `priority`, in scheduling order.
    pub fn ready_tasks(&self, priority: u8) -> impl Iterator<Item = TaskId> + '_ {
        self.ready[priority as usize].iter(&self.nodes)
    }

    pub fn is_blocked(&self, id: TaskId) -> bool {
        self.blocked.contains(&self.nodes, id)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
