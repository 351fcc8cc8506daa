//! # Memory Protection Unit
//!
//! Region sizing and attribute encoding for the ARMv7-M MPU, plus the
//! register programming used at bootstrap and on every context switch.
//!
//! An ARMv7-M region is a power of two between 32 bytes and 4 GiB, and its
//! base must be aligned to its size. The RASR SIZE field encodes a region
//! of `2^(SIZE + 1)` bytes.
//!
//! ## Region map
//!
//! | Region | Covers | Access | Execute |
//! |--------|--------|--------|---------|
//! | 0 | Flash (code + rodata) | RO, both levels | yes |
//! | 1 | GPIOD block | RW, both levels | never |
//! | 3 | Running task's stack | RW, both levels | never |

use bitflags::bitflags;

/// Flash region, programmed once during bring-up.
pub const CODE_REGION: u8 = 0;

/// Board peripheral region, programmed once during bring-up.
pub const PERIPHERAL_REGION: u8 = 1;

/// Reprogrammed for every task that is switched in.
pub const TASK_STACK_REGION: u8 = 3;

/// MPU_CTRL bits.
pub const CTRL_ENABLE: u32 = 1 << 0;
pub const CTRL_PRIVDEFENA: u32 = 1 << 2;

bitflags! {
    /// Attribute and enable bits of MPU_RASR (everything except SIZE/SRD).
    ///
    /// TEX is always `000` here, so it has no flag.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct RegionAttributes: u32 {
        const ENABLE = 1 << 0;
        const BUFFERABLE = 1 << 16;
        const CACHEABLE = 1 << 17;
        const SHAREABLE = 1 << 18;
        /// AP = 0b011: read/write for privileged and unprivileged code.
        const AP_FULL_ACCESS = 0b011 << 24;
        /// AP = 0b110: read-only for privileged and unprivileged code.
        const AP_READ_ONLY = 0b110 << 24;
        const EXECUTE_NEVER = 1 << 28;
    }
}

impl RegionAttributes {
    /// Normal memory, RW for both levels, never executable.
    pub const TASK_STACK: Self = Self::CACHEABLE
        .union(Self::SHAREABLE)
        .union(Self::AP_FULL_ACCESS)
        .union(Self::EXECUTE_NEVER)
        .union(Self::ENABLE);

    /// Normal memory, read-only for both levels, executable.
    pub const CODE: Self = Self::CACHEABLE
        .union(Self::AP_READ_ONLY)
        .union(Self::ENABLE);

    /// Shareable device memory, RW for both levels, never executable.
    pub const DEVICE: Self = Self::BUFFERABLE
        .union(Self::SHAREABLE)
        .union(Self::AP_FULL_ACCESS)
        .union(Self::EXECUTE_NEVER)
        .union(Self::ENABLE);
}

/// A naturally aligned power-of-two MPU region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub base: u32,
    /// RASR SIZE field; the region spans `2^(size_field + 1)` bytes.
    pub size_field: u8,
}

impl Region {
    /// Smallest region the hardware supports.
    pub const MIN_SIZE: u32 = 32;

    /// Smallest region at least `bytes` long, with `start` aligned down to
    /// the region size.
    ///
    /// If `start` is not already aligned, the region does not necessarily
    /// reach `start + bytes`.
    pub fn covering(start: u32, bytes: u32) -> Self {
        let size = bytes.max(Self::MIN_SIZE).next_power_of_two();
        Self {
            base: start & !(size - 1),
            size_field: (size.trailing_zeros() - 1) as u8,
        }
    }

    /// Region protecting a task stack of `words` words starting at `lower_bound`.
    pub fn for_task_stack(lower_bound: *const u32, words: usize) -> Self {
        Self::covering(lower_bound as usize as u32, (words * 4) as u32)
    }

    pub fn size(&self) -> u32 {
        1 << (self.size_field + 1)
    }

    /// Whether `[start, start + bytes)` lies entirely inside the region.
    pub fn contains(&self, start: u32, bytes: u32) -> bool {
        let end = start as u64 + bytes as u64;
        start >= self.base && end <= self.base as u64 + self.size() as u64
    }

    /// MPU_RASR value for this region with the given attributes.
    pub fn rasr(&self, attributes: RegionAttributes) -> u32 {
        attributes.bits() | ((self.size_field as u32) << 1)
    }
}

/// Write one region and make it visible to the next instruction fetch.
///
/// # Safety
/// Changing the memory map under running code can fault it; the caller must
/// know the new map covers whatever executes next.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub unsafe fn program_region(number: u8, region: Region, attributes: RegionAttributes) {
    let mpu = &*cortex_m::peripheral::MPU::PTR;
    mpu.rnr.write(number as u32);
    mpu.rbar.write(region.base);
    mpu.rasr.write(region.rasr(attributes));
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}

/// Point the task stack region at a task's stack.
///
/// # Safety
/// See [`program_region`]. Call from privileged code only.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub unsafe fn program_task_stack_region(region: Region) {
    program_region(TASK_STACK_REGION, region, RegionAttributes::TASK_STACK);
}

/// Turn the MPU on, keeping the default map as a privileged background region.
///
/// # Safety
/// Unprivileged code loses access to everything not covered by a region.
#[cfg(all(target_arch = "arm", target_os = "none"))]
pub unsafe fn enable() {
    let mpu = &*cortex_m::peripheral::MPU::PTR;
    mpu.ctrl.write(CTRL_ENABLE | CTRL_PRIVDEFENA);
    cortex_m::asm::dsb();
    cortex_m::asm::isb();
}
