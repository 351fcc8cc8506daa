//! # Task Stacks
//!
//! Stack preparation, overflow canaries and high-water-mark measurement.
//!
//! ## Layout (word indices, stack grows down)
//!
//! ```text
//! [len-1]  xPSR   (Thumb bit)            ┐
//! [len-2]  PC     (entry | 1)            │ hardware frame,
//! [len-3]  LR     (EXC_RETURN)           │ popped on exception return
//! [len-4]  R12                           │
//! [len-5..=len-8]  R3..R0                ┘
//! [len-9..=len-16] R11..R4               ← saved by PendSV, initial SP
//!   ...    WATERMARK fill
//! [1]      CANARY
//! [0]      CANARY                        ← stack_lower_bound
//! ```

use core::ptr;

use crate::config::STACK_SIZE;

/// Sentinel written to the two lowest stack words.
pub const CANARY: u32 = 0xDEAD_BEEF;

/// Fill pattern for untouched stack words.
pub const WATERMARK: u32 = 0xBAAD_F00D;

pub const CANARY_WORDS: usize = 2;

/// R4–R11 plus the 8-word hardware exception frame.
pub const INITIAL_FRAME_WORDS: usize = 16;

/// Smallest stack accepted by task registration.
pub const MIN_STACK_WORDS: usize = CANARY_WORDS + INITIAL_FRAME_WORDS;

/// EXC_RETURN: return to Thread mode, use the process stack, basic frame.
pub const EXC_RETURN_THREAD_PSP: u32 = 0xFFFF_FFFD;

/// Initial xPSR: only the Thumb state bit set.
pub const INITIAL_XPSR: u32 = 0x0100_0000;

/// A statically allocatable task stack of [`STACK_SIZE`] words.
///
/// Aligned to its own size so the per-task MPU region covers it exactly.
#[repr(C, align(512))]
pub struct TaskStack([u32; STACK_SIZE]);

const _: () = assert!(core::mem::align_of::<TaskStack>() == STACK_SIZE * 4);

impl TaskStack {
    pub const fn new() -> Self {
        Self([0; STACK_SIZE])
    }

    pub fn as_mut_slice(&mut self) -> &mut [u32] {
        &mut self.0
    }
}

impl Default for TaskStack {
    fn default() -> Self {
        Self::new()
    }
}

/// Number of words usable for the initial frame, after trimming the top so
/// that the initial stack pointer is 8-byte aligned (AAPCS).
pub fn usable_words(stack: &[u32]) -> usize {
    let top = stack.as_ptr() as usize + stack.len() * 4;
    stack.len().saturating_sub((top % 8) / 4)
}

/// Fill `stack` with the watermark, plant the canaries, and synthesize the
/// exception frame that the first switch into the task will pop.
///
/// Returns the initial saved stack pointer (pointing at saved R4).
///
/// The caller must have checked `usable_words(stack) >= MIN_STACK_WORDS`.
pub fn init_stack_frame(stack: &mut [u32], entry: usize) -> *mut u32 {
    stack.fill(WATERMARK);
    stack[0] = CANARY;
    stack[1] = CANARY;

    let top = usable_words(stack);
    let frame = &mut stack[top - INITIAL_FRAME_WORDS..top];

    // R4-R11, then R0-R3 and R12
    frame[..13].fill(0);
    frame[13] = EXC_RETURN_THREAD_PSP; // LR
    frame[14] = (entry as u32) | 1; // PC
    frame[15] = INITIAL_XPSR; // xPSR

    frame.as_mut_ptr()
}

/// Check the two canary words at the bottom of a task stack.
///
/// # Safety
/// `lower_bound` must point at the first word of a stack prepared by
/// [`init_stack_frame`].
#[inline]
pub unsafe fn canaries_intact(lower_bound: *const u32) -> bool {
    ptr::read_volatile(lower_bound) == CANARY && ptr::read_volatile(lower_bound.add(1)) == CANARY
}

/// Count the untouched watermark words directly above the canaries.
///
/// This is the minimum headroom the task has ever had: a word overwritten
/// once never reads as the watermark again (short of the task writing the
/// pattern itself).
///
/// # Safety
/// `lower_bound` must point at a prepared stack of `words` words.
pub unsafe fn headroom_words(lower_bound: *const u32, words: usize) -> usize {
    (CANARY_WORDS..words)
        .take_while(|&i| ptr::read_volatile(lower_bound.add(i)) == WATERMARK)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let mut stack = TaskStack::new();
        let words = stack.as_mut_slice();
        let sp = init_stack_frame(words, 0x0800_1234);

        let base = words.as_ptr();
        let sp_index = (sp as usize - base as usize) / 4;
        assert_eq!(sp_index, STACK_SIZE - INITIAL_FRAME_WORDS);

        let frame = &words[sp_index..];
        assert!(frame[..13].iter().all(|&w| w == 0));
        assert_eq!(frame[13], EXC_RETURN_THREAD_PSP);
        assert_eq!(frame[14], 0x0800_1235);
        assert_eq!(frame[15], INITIAL_XPSR);
    }

    #[test]
    fn test_canaries_and_watermark() {
        let mut stack = TaskStack::new();
        let words = stack.as_mut_slice();
        init_stack_frame(words, 0x0800_0000);

        assert_eq!(words[0], CANARY);
        assert_eq!(words[1], CANARY);
        assert!(words[2..STACK_SIZE - INITIAL_FRAME_WORDS]
            .iter()
            .all(|&w| w == WATERMARK));
        assert!(unsafe { canaries_intact(words.as_ptr()) });
    }

    #[test]
    fn test_corrupting_either_canary_is_detected() {
        for index in 0..CANARY_WORDS {
            let mut stack = TaskStack::new();
            let words = stack.as_mut_slice();
            init_stack_frame(words, 0x0800_0000);
            words[index] = 0;
            assert!(!unsafe { canaries_intact(words.as_ptr()) });
        }
    }

    #[test]
    fn test_headroom_counts_untouched_words() {
        let mut stack = TaskStack::new();
        let words = stack.as_mut_slice();
        init_stack_frame(words, 0x0800_0000);

        let fresh = STACK_SIZE - CANARY_WORDS - INITIAL_FRAME_WORDS;
        assert_eq!(unsafe { headroom_words(words.as_ptr(), STACK_SIZE) }, fresh);

        // Simulate deeper stack use: 10 more words below the initial frame.
        let sp = STACK_SIZE - INITIAL_FRAME_WORDS;
        for w in &mut words[sp - 10..sp] {
            *w = 0x1234_5678;
        }
        assert_eq!(
            unsafe { headroom_words(words.as_ptr(), STACK_SIZE) },
            fresh - 10
        );
    }

    #[test]
    fn test_headroom_stops_at_stack_end() {
        let mut words = [WATERMARK; 8];
        words[0] = CANARY;
        words[1] = CANARY;
        assert_eq!(unsafe { headroom_words(words.as_ptr(), words.len()) }, 6);
    }

    #[test]
    fn test_initial_sp_is_eight_byte_aligned() {
        let mut raw = [0u32; 40];
        // Odd offset into the array forces a misaligned top on one of the two.
        for start in 0..2 {
            let stack = &mut raw[start..start + 37];
            if usable_words(stack) < MIN_STACK_WORDS {
                continue;
            }
            let sp = init_stack_frame(stack, 0x0800_0000) as usize;
            assert_eq!((sp + INITIAL_FRAME_WORDS * 4) % 8, 0);
        }
    }

    #[test]
    fn test_usable_words_of_short_stacks() {
        let raw = [0u32; 4];
        for start in 0..2 {
            assert_eq!(usable_words(&raw[start..start]), 0);
            let one = usable_words(&raw[start..start + 1]);
            assert!(one <= 1);
        }
    }
}
