//! # Cortex-M4 Port Layer
//!
//! Exception handlers and core-peripheral setup for the ARM Cortex-M4
//! (Thumb-2). Everything here is a thin shell around the kernel entry points;
//! scheduling decisions are made in [`crate::scheduler`].
//!
//! ## Context Switch Mechanism
//!
//! Tasks run in unprivileged Thread mode on the process stack (PSP); the
//! kernel and every handler run on the main stack (MSP).
//!
//! On exception entry the core stacks R0–R3, R12, LR, PC and xPSR onto the
//! task's PSP. PendSV pushes R4–R11 below that, so a switched-out task's
//! saved stack pointer always addresses its saved R4:
//!
//! ```text
//!   high ┌───────────┐
//!        │ xPSR      │
//!        │ PC        │
//!        │ LR        │  hardware frame
//!        │ R12       │
//!        │ R3 … R0   │
//!        ├───────────┤
//!        │ R11 … R4  │  pushed by PendSV
//!   low  └───────────┘ ◄── saved stack pointer
//! ```
//!
//! ## Exception Priorities
//!
//! | Exception | Priority | Role |
//! |-----------|----------|------|
//! | SVCall | 0x00 | bootstrap trap and service calls |
//! | SysTick | 0xE0 | scheduler tick |
//! | PendSV | 0xF0 | context switch, runs last |
//!
//! Kernel critical sections raise BASEPRI to 0xE0, masking SysTick and
//! PendSV but not SVCall or faults.

use core::arch::naked_asm;

use cortex_m::peripheral::scb::SystemHandler;
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::peripheral::{SCB, SYST};

use crate::config::{PENDSV_PRIORITY, SYSTEM_CLOCK_HZ, SYSTICK_PRIORITY, TICK_HZ};
use crate::kernel;

/// SYST_CSR: counter enable.
const SYST_CSR_ENABLE: u32 = 1 << 0;
/// SYST_CSR: raise the SysTick exception on wrap.
const SYST_CSR_TICKINT: u32 = 1 << 1;

/// CONTROL.nPRIV: Thread mode runs unprivileged.
const CONTROL_NPRIV: u32 = 1 << 0;

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Load the tick period into SysTick without starting it.
///
/// The counter is started by the bootstrap trap.
pub fn configure_systick(syst: &mut SYST) {
    syst.disable_counter();
    syst.disable_interrupt();
    syst.set_clock_source(SystClkSource::Core);
    syst.set_reload(SYSTEM_CLOCK_HZ / TICK_HZ - 1);
    syst.clear_current();
}

/// Start the tick counter with its interrupt enabled.
///
/// # Safety
/// Privileged code only; the scheduler must be able to take a tick.
unsafe fn start_systick() {
    let syst = &*SYST::PTR;
    syst.cvr.write(0);
    syst.csr
        .modify(|csr| csr | SYST_CSR_ENABLE | SYST_CSR_TICKINT);
}

// ---------------------------------------------------------------------------
// Exception priorities
// ---------------------------------------------------------------------------

/// Put SVCall, SysTick and PendSV at their kernel priorities.
///
/// # Safety
/// Changing priorities while handlers are active can break the assumptions
/// of critical sections already in progress.
pub unsafe fn set_interrupt_priorities(scb: &mut SCB) {
    scb.set_priority(SystemHandler::SVCall, 0);
    scb.set_priority(SystemHandler::SysTick, SYSTICK_PRIORITY);
    scb.set_priority(SystemHandler::PendSV, PENDSV_PRIORITY);
}

/// Request a context switch. PendSV runs once no other handler is active.
#[inline]
pub fn trigger_pendsv() {
    SCB::set_pendsv();
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// Trap into the first task. Main-line code never resumes.
///
/// # Safety
/// The scheduler must have been started so that a current task exists.
pub unsafe fn launch_first_task() -> ! {
    core::arch::asm!("svc #0", options(noreturn));
}

/// Called from SVCall for `svc #0`. Starts the tick and returns the first
/// task's saved stack pointer.
extern "C" fn bootstrap() -> *mut u32 {
    let sp = kernel::first_stack_pointer();
    // Safety: running in the SVCall handler; SysTick cannot preempt it.
    unsafe { start_systick() };
    sp
}

// ---------------------------------------------------------------------------
// SVCall handler
// ---------------------------------------------------------------------------

/// SVCall exception handler.
///
/// Finds the stacked frame (MSP before start, PSP after), reads the `svc`
/// immediate from the instruction before the stacked PC and either launches
/// the first task (`svc #0` from the main stack) or tail-branches to
/// [`service_call`], which returns straight through EXC_RETURN. Calls from
/// the process stack always go to [`service_call`], so a task cannot
/// re-enter the bootstrap path.
///
/// For `svc #0` it loads the first task's saved context, drops Thread mode
/// to unprivileged and returns onto the process stack.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub unsafe extern "C" fn SVCall() {
    naked_asm!(
        "tst    lr, #4",
        "ite    eq",
        "mrseq  r0, msp",
        "mrsne  r0, psp",

        // r1 = svc immediate, the low byte of the instruction before PC
        "ldr    r1, [r0, #24]",
        "ldrb   r1, [r1, #-2]",

        // a task (PSP) never reaches the bootstrap path, whatever it asked for
        "tst    lr, #4",
        "bne    {service}",
        "cbz    r1, 1f",

        // service_call(frame: r0, number: r1), returns via EXC_RETURN in lr
        "b      {service}",

        "1:",
        "bl     {bootstrap}",
        "ldmia  r0!, {{r4-r11}}",
        "msr    psp, r0",
        "mrs    r1, control",
        "orr    r1, r1, #{npriv}",
        "msr    control, r1",
        "isb",

        // thread mode, process stack
        "mov    lr, #0xFFFFFFFD",
        "bx     lr",

        service = sym service_call,
        bootstrap = sym bootstrap,
        npriv = const CONTROL_NPRIV,
    );
}

/// Service calls other than the bootstrap trap. `frame` is the caller's
/// hardware frame; its stacked r0 is the argument and receives the result.
unsafe extern "C" fn service_call(frame: *mut u32, number: u8) {
    let reply = kernel::service(number, frame.read());
    frame.write(reply.value);
    if reply.pend_switch {
        trigger_pendsv();
    }
}

// ---------------------------------------------------------------------------
// PendSV handler (context switch)
// ---------------------------------------------------------------------------

/// PendSV exception handler, performs the context switch.
///
/// ## Sequence
/// 1. Check the outgoing task's canaries (diverges into the overflow hook)
/// 2. Push R4–R11 onto the outgoing task's stack (PSP)
/// 3. Hand the new PSP to the kernel, which commits the pending switch,
///    moves the stack MPU region and returns the incoming task's saved SP
/// 4. Pop R4–R11 from the incoming stack and set PSP
/// 5. Return to Thread mode on PSP; hardware restores the rest
///
/// Only R0–R3 and R12 may be used before step 2 and after step 4: the
/// Rust calls preserve R4–R11 as callee-saved registers.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() {
    naked_asm!(
        "bl     {guard}",

        "mrs    r0, psp",
        "stmdb  r0!, {{r4-r11}}",

        // r0 = switch(r0)
        "bl     {switch}",

        "ldmia  r0!, {{r4-r11}}",
        "msr    psp, r0",

        "mov    lr, #0xFFFFFFFD",
        "bx     lr",

        guard = sym guard_outgoing_stack,
        switch = sym switch_context,
    );
}

extern "C" fn guard_outgoing_stack() {
    kernel::guard_outgoing_stack();
}

extern "C" fn switch_context(saved_sp: *mut u32) -> *mut u32 {
    kernel::switch_context(saved_sp)
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

/// SysTick exception handler, the scheduler tick entry point.
#[unsafe(no_mangle)]
extern "C" fn SysTick() {
    if kernel::tick() {
        trigger_pendsv();
    }
}
