//! # SRTOS: Small Real-Time Operating System
//!
//! A preemptive, fixed-priority RTOS kernel for ARM Cortex-M4
//! microcontrollers, with round-robin among equal priorities and per-task
//! stack protection.
//!
//! ## Overview
//!
//! - **Tick-driven scheduling**: every SysTick, blocked tasks whose delay has
//!   expired become ready; a higher-priority ready task preempts the running
//!   one, otherwise equal-priority tasks take turns one tick each
//! - **Deferred switching**: scheduling decisions only record a target;
//!   PendSV performs the switch once no other handler is active
//! - **Unprivileged tasks**: tasks run in unprivileged Thread mode on their
//!   own stack and reach the kernel through `svc`
//! - **Stack protection**: two canary words at the bottom of every stack are
//!   checked on each switch-out, and an MPU region confines the running task
//!   to its own stack
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! │         Led::toggle() · delay() · stack_headroom()     │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │   init() · create_task() · start() · service calls     │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │   Task lists       │  Sync Primitives  │
//! │  scheduler.rs│   list.rs          │  sync.rs          │
//! │  ─ tick()    │   ─ push_back()    │  ─ critical_section│
//! │  ─ delay()   │   ─ remove()       │  ─ KernelCell     │
//! │  ─ switch()  │                    │                   │
//! ├──────────────┴──────┬─────────────┴───────────────────┤
//! │  Task Model         │  Stack guard & MPU               │
//! │  task.rs            │  stack.rs · mpu.rs               │
//! ├─────────────────────┴─────────────────────────────────┤
//! │       Arch Port (arch/cortex_m4.rs) · board.rs          │
//! │    SVCall · PendSV · SysTick · clock · GPIO            │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M4 Hardware (Thumb-2)                │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: all kernel state is statically allocated
//! - **Fixed arena**: `[TaskControlBlock; MAX_TASKS + 1]`, the last slot
//!   reserved for the idle task
//! - **Caller-provided stacks**: `&'static mut` slices, ideally
//!   [`stack::TaskStack`] so the MPU region fits exactly
//! - **Critical sections**: BASEPRI masks SysTick and PendSV only
//!
//! Everything outside `arch` and `board` is plain Rust and is unit-tested
//! on the host.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod fault;
pub mod kernel;
pub mod list;
pub mod mpu;
pub mod scheduler;
pub mod stack;
pub mod sync;
pub mod task;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod arch;
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod board;
#[cfg(feature = "semihosting")]
pub mod logger;
