//! # SRTOS Example Firmware
//!
//! Two equal-priority tasks blink the blue and green LEDs of an
//! STM32F4-Discovery, each toggling its LED and then sleeping for 500 ticks.
//!
//! | Task | Priority | LED | Period |
//! |------|----------|-----|--------|
//! | `blue_led_task` | 1 | PD15 | 500 ms |
//! | `green_led_task` | 1 | PD12 | 500 ms |
//!
//! The orange LED (PD13) lights if the blue task ever runs low on stack.
//!
//! ## Expected behavior
//!
//! Both LEDs change state every half second, in step. While both tasks
//! sleep the idle task waits for interrupts.
//!
//! Build with `--features semihosting` and a debugger attached to see the
//! kernel's log on the host console.

#![no_std]
#![no_main]

use cortex_m_rt::{entry, exception, ExceptionFrame};
use panic_halt as _;

use srtos::board::{self, Led};
use srtos::fault::FaultFrame;
use srtos::kernel;
use srtos::stack::TaskStack;

/// LED toggle period in ticks.
const BLINK_TICKS: u32 = 500;

/// Free stack words below which the blue task raises the orange LED.
const LOW_HEADROOM_WORDS: u32 = 16;

// ---------------------------------------------------------------------------
// Task entry points
// ---------------------------------------------------------------------------

extern "C" fn blue_led_task() -> ! {
    loop {
        Led::Blue.toggle();
        if kernel::stack_headroom() < LOW_HEADROOM_WORDS {
            Led::Orange.toggle();
        }
        kernel::delay(BLINK_TICKS);
    }
}

extern "C" fn green_led_task() -> ! {
    loop {
        Led::Green.toggle();
        kernel::delay(BLINK_TICKS);
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

#[entry]
fn main() -> ! {
    let mut cp = cortex_m::Peripherals::take().unwrap();

    #[cfg(feature = "semihosting")]
    srtos::logger::init();

    board::configure_all(&mut cp);
    kernel::init();

    let blue_stack: &'static mut TaskStack =
        cortex_m::singleton!(: TaskStack = TaskStack::new()).unwrap();
    let green_stack: &'static mut TaskStack =
        cortex_m::singleton!(: TaskStack = TaskStack::new()).unwrap();

    kernel::create_task(blue_stack.as_mut_slice(), blue_led_task, 1)
        .expect("Failed to create blue_led_task");
    kernel::create_task(green_stack.as_mut_slice(), green_led_task, 1)
        .expect("Failed to create green_led_task");

    // Start the scheduler; does not return
    kernel::start(cp)
}

#[exception]
unsafe fn HardFault(ef: &ExceptionFrame) -> ! {
    kernel::handle_fault(&FaultFrame::from(ef))
}
