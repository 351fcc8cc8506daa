//! # Board bring-up
//!
//! STM32F407 Discovery: 8 MHz HSE as the system clock, the user LEDs on
//! GPIOD and the static part of the MPU map.
//!
//! The vendor peripherals are driven through raw register addresses; only
//! the core peripherals come from `cortex-m`.

use core::ptr::{read_volatile, write_volatile};

use crate::arch::cortex_m4;
use crate::mpu::{self, Region, RegionAttributes};

const RCC_BASE: u32 = 0x4002_3800;
const RCC_CR: *mut u32 = RCC_BASE as *mut u32;
const RCC_CFGR: *mut u32 = (RCC_BASE + 0x08) as *mut u32;
const RCC_AHB1ENR: *mut u32 = (RCC_BASE + 0x30) as *mut u32;

const RCC_CR_HSEON: u32 = 1 << 16;
const RCC_CR_HSERDY: u32 = 1 << 17;
const RCC_CFGR_SW_MASK: u32 = 0b11;
const RCC_CFGR_SW_HSE: u32 = 0b01;
const RCC_CFGR_SWS_MASK: u32 = 0b11 << 2;
const RCC_CFGR_SWS_HSE: u32 = 0b01 << 2;
const RCC_AHB1ENR_GPIODEN: u32 = 1 << 3;

const GPIOD_BASE: u32 = 0x4002_0C00;
/// Size of one GPIO port's register block.
const GPIO_BLOCK_SIZE: u32 = 0x400;
const GPIOD_MODER: *mut u32 = GPIOD_BASE as *mut u32;
const GPIOD_ODR: *mut u32 = (GPIOD_BASE + 0x14) as *mut u32;
const GPIOD_BSRR: *mut u32 = (GPIOD_BASE + 0x18) as *mut u32;

const FLASH_BASE: u32 = 0x0800_0000;
const FLASH_SIZE: u32 = 1024 * 1024;

/// User LEDs on GPIOD, by pin number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Led {
    Green = 12,
    Orange = 13,
    Blue = 15,
}

impl Led {
    pub const ALL: [Led; 3] = [Led::Green, Led::Orange, Led::Blue];

    #[inline]
    fn pin(self) -> u32 {
        self as u32
    }

    /// Flip the LED. Usable from unprivileged tasks: GPIOD is mapped by the
    /// peripheral MPU region, and BSRR makes the write atomic per pin.
    pub fn toggle(self) {
        let mask = 1 << self.pin();
        // Safety: GPIOD registers are always mapped; BSRR only affects the
        // pins whose bits are set.
        unsafe {
            let lit = read_volatile(GPIOD_ODR) & mask != 0;
            let bsrr = if lit { mask << 16 } else { mask };
            write_volatile(GPIOD_BSRR, bsrr);
        }
    }
}

/// Bring the board up. Call once from `main`, before `kernel::start`.
pub fn configure_all(core_peripherals: &mut cortex_m::Peripherals) {
    configure_clock();
    cortex_m4::configure_systick(&mut core_peripherals.SYST);
    configure_leds();
    configure_mpu();
    log::debug!("board configured");
}

/// Switch SYSCLK to the 8 MHz external oscillator.
fn configure_clock() {
    // Safety: RCC is always mapped; nothing else is running yet.
    unsafe {
        write_volatile(RCC_CR, read_volatile(RCC_CR) | RCC_CR_HSEON);
        while read_volatile(RCC_CR) & RCC_CR_HSERDY == 0 {}

        let cfgr = read_volatile(RCC_CFGR) & !RCC_CFGR_SW_MASK;
        write_volatile(RCC_CFGR, cfgr | RCC_CFGR_SW_HSE);
        while read_volatile(RCC_CFGR) & RCC_CFGR_SWS_MASK != RCC_CFGR_SWS_HSE {}
    }
}

fn configure_leds() {
    // Safety: as in `configure_clock`.
    unsafe {
        write_volatile(RCC_AHB1ENR, read_volatile(RCC_AHB1ENR) | RCC_AHB1ENR_GPIODEN);

        let mut moder = read_volatile(GPIOD_MODER);
        for led in Led::ALL {
            let shift = led.pin() * 2;
            moder = (moder & !(0b11 << shift)) | (0b01 << shift);
        }
        write_volatile(GPIOD_MODER, moder);
    }
}

/// Flash and GPIOD regions, then enable the MPU. The task stack region is
/// programmed by the kernel.
fn configure_mpu() {
    let code = Region::covering(FLASH_BASE, FLASH_SIZE);
    let gpiod = Region::covering(GPIOD_BASE, GPIO_BLOCK_SIZE);
    // Safety: only privileged code runs until the first task starts, and
    // PRIVDEFENA keeps the default map for it.
    unsafe {
        mpu::program_region(mpu::CODE_REGION, code, RegionAttributes::CODE);
        mpu::program_region(mpu::PERIPHERAL_REGION, gpiod, RegionAttributes::DEVICE);
        mpu::enable();
    }
}
