//! # SRTOS Configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time; there is no dynamic allocation.

/// Maximum number of application tasks. The scheduler arena holds one
/// extra slot for the idle task.
pub const MAX_TASKS: usize = 8;

/// Number of distinct task priorities. Priorities range from `0` (lowest,
/// shared with the idle task) to `MAX_PRIORITY_LEVELS - 1` (highest).
pub const MAX_PRIORITY_LEVELS: usize = 4;

/// Default per-task stack size in 32-bit words, used by [`TaskStack`].
/// The size in bytes (`STACK_SIZE * 4`) must be a power of two so that a
/// single MPU region covers the stack exactly.
///
/// [`TaskStack`]: crate::stack::TaskStack
pub const STACK_SIZE: usize = 128;

/// SysTick frequency in Hz. One tick is one millisecond, so `delay(500)`
/// sleeps for half a second.
pub const TICK_HZ: u32 = 1000;

/// Longest accepted `delay`. Wake ticks are compared as signed distances
/// from the tick counter, which must stay below half its range.
pub const MAX_DELAY_TICKS: u32 = i32::MAX as u32;

/// System clock frequency in Hz (8 MHz HSE crystal on the STM32F4-Discovery).
pub const SYSTEM_CLOCK_HZ: u32 = 8_000_000;

/// SysTick exception priority. Only the top 4 bits are implemented on the
/// STM32F4, so this is the second-lowest level.
pub const SYSTICK_PRIORITY: u8 = 0xE0;

/// PendSV exception priority: the lowest level, so a context switch runs
/// only once every other handler has finished.
pub const PENDSV_PRIORITY: u8 = 0xF0;

/// BASEPRI value written on critical-section entry. Masks SysTick, PendSV
/// and anything at or below their priority; faults and SVCall stay live.
pub const KERNEL_BASEPRI: u8 = 0xE0;

const _: () = assert!(KERNEL_BASEPRI <= SYSTICK_PRIORITY);
const _: () = assert!(SYSTICK_PRIORITY < PENDSV_PRIORITY);
const _: () = assert!((STACK_SIZE * 4).is_power_of_two());
