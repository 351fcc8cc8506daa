//! # Fault capture
//!
//! The eight-word frame the core pushes on exception entry. The HardFault
//! handler converts `cortex-m-rt`'s frame into a [`FaultFrame`] and hands it
//! to the kernel's fault hook.

use core::fmt;

/// Registers stacked by hardware, in stacking order.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaultFrame {
    pub r0: u32,
    pub r1: u32,
    pub r2: u32,
    pub r3: u32,
    pub r12: u32,
    pub lr: u32,
    pub pc: u32,
    pub xpsr: u32,
}

impl FaultFrame {
    /// Exception number from IPSR bits of the stacked xPSR. Zero means the
    /// faulting code was running in thread mode.
    pub fn exception_number(&self) -> u16 {
        (self.xpsr & 0x1FF) as u16
    }
}

impl fmt::Display for FaultFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "exception={} pc={:#010x} lr={:#010x} xpsr={:#010x} r0={:#010x} r1={:#010x} r2={:#010x} r3={:#010x} r12={:#010x}",
            self.exception_number(),
            self.pc,
            self.lr,
            self.xpsr,
            self.r0,
            self.r1,
            self.r2,
            self.r3,
            self.r12
        )
    }
}

#[cfg(all(target_arch = "arm", target_os = "none"))]
impl From<&cortex_m_rt::ExceptionFrame> for FaultFrame {
    fn from(ef: &cortex_m_rt::ExceptionFrame) -> Self {
        Self {
            r0: ef.r0(),
            r1: ef.r1(),
            r2: ef.r2(),
            r3: ef.r3(),
            r12: ef.r12(),
            lr: ef.lr(),
            pc: ef.pc(),
            xpsr: ef.xpsr(),
        }
    }
}
