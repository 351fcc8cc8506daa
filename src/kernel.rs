//! # Kernel
//!
//! The global kernel instance and the API firmware calls.
//!
//! ## Startup Sequence
//!
//! ```text
//! reset (cortex-m-rt)
//!   └─► main()
//!         ├─► board::configure_all()  ← clock, SysTick reload, GPIO, MPU map
//!         ├─► kernel::init()          ← fresh scheduler, default hooks
//!         ├─► kernel::create_task()   ← register tasks (×N)
//!         └─► kernel::start()         ← never returns
//!               ├─► exception priorities
//!               ├─► install idle task, pick the first task
//!               ├─► program its stack MPU region
//!               └─► svc #0 ──► first task, unprivileged, on PSP
//! ```
//!
//! ## Service calls
//!
//! Tasks run unprivileged, so anything that reads or writes kernel state
//! from task context traps with `svc`. The immediate selects the call and
//! r0 carries the argument and the result.
//!
//! | `svc` | Call | r0 in | r0 out |
//! |-------|------|-------|--------|
//! | 0 | [`ServiceCall::Start`] | – | – |
//! | 1 | [`ServiceCall::Delay`] | ticks | 0 |
//! | 2 | [`ServiceCall::StackHeadroom`] | – | untouched words |
//! | 3 | [`ServiceCall::Ticks`] | – | tick counter |

use num_enum::TryFromPrimitive;

use crate::error::Error;
use crate::fault::FaultFrame;
use crate::scheduler::Scheduler;
use crate::stack::TaskStack;
use crate::sync::{self, KernelCell};
use crate::task::TaskId;

#[cfg(all(target_arch = "arm", target_os = "none"))]
use crate::{arch::cortex_m4, mpu};

/// Supervisor call numbers, encoded in the `svc` immediate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum ServiceCall {
    /// Bootstrap trap: launch the first task. Only honored from the main
    /// stack; a task issuing it gets a warning and nothing else.
    Start = 0,
    Delay = 1,
    StackHeadroom = 2,
    Ticks = 3,
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Embedder callbacks for events the kernel cannot recover from.
#[derive(Clone, Copy)]
pub struct Hooks {
    /// A canary of the task being switched out was overwritten.
    pub stack_overflow: fn(TaskId) -> !,
    /// A hard fault was taken; receives the stacked registers.
    pub fault: fn(&FaultFrame) -> !,
}

impl Hooks {
    /// Log the event and spin.
    pub const HALT: Self = Self {
        stack_overflow: halt_on_overflow,
        fault: halt_on_fault,
    };
}

impl Default for Hooks {
    fn default() -> Self {
        Self::HALT
    }
}

fn halt_on_overflow(task: TaskId) -> ! {
    log::error!("stack overflow in {}", task);
    halt()
}

fn halt_on_fault(frame: &FaultFrame) -> ! {
    log::error!("hard fault: {}", frame);
    halt()
}

fn halt() -> ! {
    loop {
        core::hint::spin_loop();
    }
}

// ---------------------------------------------------------------------------
// Global kernel instance
// ---------------------------------------------------------------------------

struct Kernel {
    scheduler: Scheduler,
    hooks: Hooks,
    idle_stack: TaskStack,
}

impl Kernel {
    const fn new(hooks: Hooks) -> Self {
        Self {
            scheduler: Scheduler::new(),
            hooks,
            idle_stack: TaskStack::new(),
        }
    }
}

static KERNEL: KernelCell<Kernel> = KernelCell::new(Kernel::new(Hooks::HALT));

// ---------------------------------------------------------------------------
// Kernel API
// ---------------------------------------------------------------------------

/// Reset the kernel with the default hooks.
pub fn init() {
    init_with_hooks(Hooks::default());
}

/// Reset the kernel, routing overflow and fault events to `hooks`.
///
/// Must run before any task is registered.
pub fn init_with_hooks(hooks: Hooks) {
    sync::critical_section(|cs| {
        let kernel = KERNEL.borrow_mut(cs);
        kernel.scheduler = Scheduler::new();
        kernel.hooks = hooks;
    });
}

/// Register a task. Only valid before [`start`].
///
/// `stack` should be a [`TaskStack`] so that the MPU region protecting it
/// covers it exactly; other buffers are accepted with a warning.
pub fn create_task(
    stack: &'static mut [u32],
    entry: extern "C" fn() -> !,
    priority: u8,
) -> Result<TaskId, Error> {
    sync::critical_section(|cs| {
        KERNEL
            .borrow_mut(cs)
            .scheduler
            .create_task(stack, entry as usize, priority)
    })
}

/// Launch the scheduler. **Does not return.**
///
/// Sets the exception priorities, installs the idle task, selects the
/// highest-priority ready task and traps into it. SysTick starts counting
/// from inside the trap, so the first tick always finds a running task.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub fn start(mut core_peripherals: cortex_m::Peripherals) -> ! {
    // Safety: nothing is running yet that depends on the old priorities.
    unsafe { cortex_m4::set_interrupt_priorities(&mut core_peripherals.SCB) };

    let started = sync::critical_section(|cs| {
        let kernel = KERNEL.borrow_mut(cs);
        let first = kernel
            .scheduler
            .start(kernel.idle_stack.as_mut_slice(), idle_task as usize)?;

        let region = kernel.scheduler.stack_region(first);
        // Safety: the MPU only restricts unprivileged code, and none runs yet.
        unsafe { mpu::program_task_stack_region(region) };
        Ok::<_, Error>(first)
    });

    if let Err(err) = started {
        log::error!("cannot start scheduler: {}", err);
        halt();
    }

    // Safety: the scheduler has a current task with a prepared frame.
    unsafe { cortex_m4::launch_first_task() }
}

/// Block the calling task for at least `ticks` ticks. Delays above
/// [`MAX_DELAY_TICKS`](crate::config::MAX_DELAY_TICKS) return at once.
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[inline]
pub fn delay(ticks: u32) {
    // Safety: the SVCall handler preserves everything but r0.
    unsafe {
        core::arch::asm!(
            "svc #1",
            inout("r0") ticks => _,
        );
    }
}

/// Untouched stack words of the calling task.
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[inline]
pub fn stack_headroom() -> u32 {
    let words: u32;
    // Safety: as in `delay`.
    unsafe {
        core::arch::asm!(
            "svc #2",
            out("r0") words,
        );
    }
    words
}

/// Ticks since the scheduler started, wrapping.
#[cfg(all(target_arch = "arm", target_os = "none"))]
#[inline]
pub fn ticks() -> u32 {
    let now: u32;
    // Safety: as in `delay`.
    unsafe {
        core::arch::asm!(
            "svc #3",
            out("r0") now,
        );
    }
    now
}

/// Hand a captured fault frame to the fault hook.
pub fn handle_fault(frame: &FaultFrame) -> ! {
    let fault = sync::critical_section(|cs| KERNEL.borrow_mut(cs).hooks.fault);
    fault(frame)
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
extern "C" fn idle_task() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}

// ---------------------------------------------------------------------------
// Exception-side entry points (called by `arch`)
// ---------------------------------------------------------------------------

/// Outcome of a service call, applied by the SVCall handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ServiceReply {
    /// Written back to the caller's stacked r0.
    pub value: u32,
    /// A context switch must be pended before returning.
    pub pend_switch: bool,
}

impl ServiceReply {
    const NONE: Self = Self {
        value: 0,
        pend_switch: false,
    };

    const fn value(value: u32) -> Self {
        Self {
            value,
            pend_switch: false,
        }
    }
}

fn dispatch(scheduler: &mut Scheduler, number: u8, arg: u32) -> ServiceReply {
    let Ok(call) = ServiceCall::try_from(number) else {
        log::warn!("unknown service call #{}", number);
        return ServiceReply::NONE;
    };

    match call {
        ServiceCall::Start => {
            log::warn!("bootstrap trap from a running task ignored");
            ServiceReply::NONE
        }
        ServiceCall::Delay => match scheduler.delay(arg) {
            Ok(_) => ServiceReply {
                value: 0,
                pend_switch: true,
            },
            Err(err) => {
                log::warn!("delay rejected: {}", err);
                ServiceReply::NONE
            }
        },
        ServiceCall::StackHeadroom => {
            let words = scheduler
                .current()
                .map_or(0, |id| scheduler.stack_headroom(id));
            ServiceReply::value(words as u32)
        }
        ServiceCall::Ticks => ServiceReply::value(scheduler.ticks()),
    }
}

/// Run service call `number` for the calling task.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) fn service(number: u8, arg: u32) -> ServiceReply {
    sync::critical_section(|cs| dispatch(&mut KERNEL.borrow_mut(cs).scheduler, number, arg))
}

/// Advance the tick. Returns `true` if a context switch must be pended.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) fn tick() -> bool {
    sync::critical_section(|cs| KERNEL.borrow_mut(cs).scheduler.tick().is_some())
}

/// Saved stack pointer of the task selected by [`start`].
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) fn first_stack_pointer() -> *mut u32 {
    sync::critical_section(|cs| {
        let scheduler = &KERNEL.borrow_mut(cs).scheduler;
        match scheduler.current() {
            Some(id) => scheduler.task(id).stack_pointer,
            None => {
                log::error!("bootstrap trap before start");
                halt()
            }
        }
    })
}

/// Stack guard run by PendSV before the outgoing context is pushed.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) fn guard_outgoing_stack() {
    sync::critical_section(|cs| {
        let kernel = KERNEL.borrow_mut(cs);
        if let Err(overflow) = kernel.scheduler.check_outgoing_stack() {
            (kernel.hooks.stack_overflow)(overflow.task)
        }
    })
}

/// Commit the pending switch and return the incoming stack pointer, with
/// the stack MPU region already moved to the incoming task.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub(crate) fn switch_context(saved_sp: *mut u32) -> *mut u32 {
    sync::critical_section(|cs| {
        let kernel = KERNEL.borrow_mut(cs);
        let next_sp = match kernel.scheduler.switch_context(saved_sp) {
            Ok(sp) => sp,
            Err(overflow) => (kernel.hooks.stack_overflow)(overflow.task),
        };
        if let Some(region) = kernel.scheduler.current_stack_region() {
            // Safety: called from PendSV, which is privileged.
            unsafe { mpu::program_task_stack_region(region) };
        }
        next_sp
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn entry() -> ! {
        loop {}
    }

    #[test]
    fn test_service_call_numbers() {
        assert_eq!(ServiceCall::try_from(0u8).ok(), Some(ServiceCall::Start));
        assert_eq!(ServiceCall::try_from(1u8).ok(), Some(ServiceCall::Delay));
        assert_eq!(ServiceCall::try_from(2u8).ok(), Some(ServiceCall::StackHeadroom));
        assert_eq!(ServiceCall::try_from(3u8).ok(), Some(ServiceCall::Ticks));
        assert!(ServiceCall::try_from(4u8).is_err());
        assert!(ServiceCall::try_from(0xFFu8).is_err());
    }

    #[test]
    fn test_dispatch_delay_blocks_and_pends_switch() {
        let mut stack_a = TaskStack::new();
        let mut stack_b = TaskStack::new();
        let mut idle = TaskStack::new();
        let mut sched = Scheduler::new();
        let a = sched.create_task(stack_a.as_mut_slice(), entry as usize, 1).unwrap();
        let b = sched.create_task(stack_b.as_mut_slice(), entry as usize, 1).unwrap();
        sched.start(idle.as_mut_slice(), entry as usize).unwrap();
        assert_eq!(sched.current(), Some(a));

        let reply = dispatch(&mut sched, ServiceCall::Delay as u8, 500);
        assert!(reply.pend_switch);
        assert!(sched.is_blocked(a));
        assert_eq!(sched.next_task(), Some(b));
    }

    #[test]
    fn test_dispatch_before_start() {
        let mut sched = Scheduler::new();
        let reply = dispatch(&mut sched, ServiceCall::Delay as u8, 10);
        assert_eq!(reply, ServiceReply::NONE);

        let reply = dispatch(&mut sched, ServiceCall::StackHeadroom as u8, 0);
        assert_eq!(reply.value, 0);
    }

    #[test]
    fn test_dispatch_idle_cannot_delay() {
        let mut idle = TaskStack::new();
        let mut sched = Scheduler::new();
        let idle_id = sched.start(idle.as_mut_slice(), entry as usize).unwrap();
        assert_eq!(sched.current(), Some(idle_id));

        let reply = dispatch(&mut sched, ServiceCall::Delay as u8, 10);
        assert_eq!(reply, ServiceReply::NONE);
        assert_eq!(sched.current(), Some(idle_id));
    }

    #[test]
    fn test_dispatch_ticks_and_headroom() {
        let mut stack = TaskStack::new();
        let mut idle = TaskStack::new();
        let mut sched = Scheduler::new();
        sched.create_task(stack.as_mut_slice(), entry as usize, 2).unwrap();
        sched.start(idle.as_mut_slice(), entry as usize).unwrap();
        for _ in 0..7 {
            sched.tick();
        }

        assert_eq!(dispatch(&mut sched, ServiceCall::Ticks as u8, 0).value, 7);

        // nothing has run on the fresh stack yet
        let headroom = dispatch(&mut sched, ServiceCall::StackHeadroom as u8, 0);
        assert!(headroom.value > 0);
        assert!(!headroom.pend_switch);
    }

    #[test]
    fn test_dispatch_start_from_task_changes_nothing() {
        let mut stack_a = TaskStack::new();
        let mut stack_b = TaskStack::new();
        let mut idle = TaskStack::new();
        let mut sched = Scheduler::new();
        let a = sched.create_task(stack_a.as_mut_slice(), entry as usize, 1).unwrap();
        sched.create_task(stack_b.as_mut_slice(), entry as usize, 1).unwrap();
        sched.start(idle.as_mut_slice(), entry as usize).unwrap();
        let saved_sp = sched.task(a).stack_pointer;

        let reply = dispatch(&mut sched, ServiceCall::Start as u8, 0);
        assert_eq!(reply, ServiceReply::NONE);
        assert_eq!(sched.current(), Some(a));
        assert_eq!(sched.next_task(), None);
        assert_eq!(sched.task(a).stack_pointer, saved_sp);
        assert_eq!(sched.ticks(), 0);
    }

    #[test]
    fn test_dispatch_overlong_delay_is_rejected() {
        let mut stack = TaskStack::new();
        let mut idle = TaskStack::new();
        let mut sched = Scheduler::new();
        let a = sched.create_task(stack.as_mut_slice(), entry as usize, 1).unwrap();
        sched.start(idle.as_mut_slice(), entry as usize).unwrap();

        let reply = dispatch(&mut sched, ServiceCall::Delay as u8, u32::MAX);
        assert_eq!(reply, ServiceReply::NONE);
        assert!(!sched.is_blocked(a));
    }

    #[test]
    fn test_dispatch_unknown_and_start_are_ignored() {
        let mut sched = Scheduler::new();
        assert_eq!(dispatch(&mut sched, 9, 1), ServiceReply::NONE);
        assert_eq!(dispatch(&mut sched, ServiceCall::Start as u8, 1), ServiceReply::NONE);
    }
}
