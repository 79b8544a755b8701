//! # Context Switch Frame
//!
//! Register image saved at the lowest address of a suspended thread's
//! stack. The trap entry code stores into it and the exit code reloads
//! from it, so the byte layout is a binary contract with the assembly in
//! `privilege::entry` and is checked at build time below.
//!
//! ```text
//! RV64 (240 bytes)              RV32 (128 bytes)
//! +0    pc                      +0    pad[0], pad[1]
//! +8    s0 .. s11               +8    pc
//! +104  ra                      +12   s0 .. s11
//! +112  tp                      +60   ra
//! +120  t0 .. t6                +64   tp
//! +176  a0 .. a7                +68   t0 .. t6
//!                               +96   a0 .. a7
//! ```

use core::mem::{offset_of, size_of};

/// Saved register width
pub type Reg = usize;

const WORD: usize = size_of::<Reg>();

/// Words in front of `pc` keeping the frame a multiple of 16 bytes
#[cfg(target_pointer_width = "32")]
pub const FRAME_PAD_WORDS: usize = 2;
/// Words in front of `pc` keeping the frame a multiple of 16 bytes
#[cfg(not(target_pointer_width = "32"))]
pub const FRAME_PAD_WORDS: usize = 0;

/// ABI stack alignment at procedure boundaries
pub const STACK_ALIGN: usize = 16;

// ============================================================================
// Frame Layout
// ============================================================================

/// Saved thread registers
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContextSwitchFrame {
    #[cfg(target_pointer_width = "32")]
    pub pad: [Reg; FRAME_PAD_WORDS],
    /// Resume address (loaded into mepc)
    pub pc: Reg,
    pub s0: Reg,
    pub s1: Reg,
    pub s2: Reg,
    pub s3: Reg,
    pub s4: Reg,
    pub s5: Reg,
    pub s6: Reg,
    pub s7: Reg,
    pub s8: Reg,
    pub s9: Reg,
    pub s10: Reg,
    pub s11: Reg,
    /// Return address
    pub ra: Reg,
    /// Thread pointer
    pub tp: Reg,
    pub t0: Reg,
    pub t1: Reg,
    pub t2: Reg,
    pub t3: Reg,
    pub t4: Reg,
    pub t5: Reg,
    pub t6: Reg,
    /// First argument / return value
    pub a0: Reg,
    pub a1: Reg,
    pub a2: Reg,
    pub a3: Reg,
    pub a4: Reg,
    pub a5: Reg,
    pub a6: Reg,
    pub a7: Reg,
}

impl ContextSwitchFrame {
    /// All registers zero
    pub const fn zeroed() -> Self {
        Self {
            #[cfg(target_pointer_width = "32")]
            pad: [0; FRAME_PAD_WORDS],
            pc: 0,
            s0: 0,
            s1: 0,
            s2: 0,
            s3: 0,
            s4: 0,
            s5: 0,
            s6: 0,
            s7: 0,
            s8: 0,
            s9: 0,
            s10: 0,
            s11: 0,
            ra: 0,
            tp: 0,
            t0: 0,
            t1: 0,
            t2: 0,
            t3: 0,
            t4: 0,
            t5: 0,
            t6: 0,
            a0: 0,
            a1: 0,
            a2: 0,
            a3: 0,
            a4: 0,
            a5: 0,
            a6: 0,
            a7: 0,
        }
    }

    /// View the frame as raw words, lowest address first
    pub fn as_words(&self) -> &[Reg; FRAME_WORDS] {
        // SAFETY: repr(C) struct made only of `Reg` fields, no padding.
        unsafe { &*(self as *const Self as *const [Reg; FRAME_WORDS]) }
    }
}

// ============================================================================
// Field Offsets
// ============================================================================

/// Byte offsets of every saved register, shared with the trap assembly
pub mod offsets {
    use super::{FRAME_PAD_WORDS, WORD};

    const fn slot(index: usize) -> usize {
        (FRAME_PAD_WORDS + index) * WORD
    }

    pub const PC: usize = slot(0);
    pub const S0: usize = slot(1);
    pub const S1: usize = slot(2);
    pub const S2: usize = slot(3);
    pub const S3: usize = slot(4);
    pub const S4: usize = slot(5);
    pub const S5: usize = slot(6);
    pub const S6: usize = slot(7);
    pub const S7: usize = slot(8);
    pub const S8: usize = slot(9);
    pub const S9: usize = slot(10);
    pub const S10: usize = slot(11);
    pub const S11: usize = slot(12);
    pub const RA: usize = slot(13);
    pub const TP: usize = slot(14);
    pub const T0: usize = slot(15);
    pub const T1: usize = slot(16);
    pub const T2: usize = slot(17);
    pub const T3: usize = slot(18);
    pub const T4: usize = slot(19);
    pub const T5: usize = slot(20);
    pub const T6: usize = slot(21);
    pub const A0: usize = slot(22);
    pub const A1: usize = slot(23);
    pub const A2: usize = slot(24);
    pub const A3: usize = slot(25);
    pub const A4: usize = slot(26);
    pub const A5: usize = slot(27);
    pub const A6: usize = slot(28);
    pub const A7: usize = slot(29);
}

/// Size of one saved frame
pub const FRAME_SIZE: usize = offsets::A7 + WORD;

/// Number of words in one saved frame
pub const FRAME_WORDS: usize = FRAME_SIZE / WORD;

static_assertions::const_assert_eq!(size_of::<ContextSwitchFrame>(), FRAME_SIZE);
static_assertions::const_assert_eq!(FRAME_SIZE % STACK_ALIGN, 0);
static_assertions::const_assert_eq!(offset_of!(ContextSwitchFrame, pc), offsets::PC);
static_assertions::const_assert_eq!(offset_of!(ContextSwitchFrame, s0), offsets::S0);
static_assertions::const_assert_eq!(offset_of!(ContextSwitchFrame, s11), offsets::S11);
static_assertions::const_assert_eq!(offset_of!(ContextSwitchFrame, ra), offsets::RA);
static_assertions::const_assert_eq!(offset_of!(ContextSwitchFrame, tp), offsets::TP);
static_assertions::const_assert_eq!(offset_of!(ContextSwitchFrame, t0), offsets::T0);
static_assertions::const_assert_eq!(offset_of!(ContextSwitchFrame, t6), offsets::T6);
static_assertions::const_assert_eq!(offset_of!(ContextSwitchFrame, a0), offsets::A0);
static_assertions::const_assert_eq!(offset_of!(ContextSwitchFrame, a7), offsets::A7);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn test_rv64_layout() {
        assert_eq!(FRAME_SIZE, 240);
        assert_eq!(offsets::PC, 0);
        assert_eq!(offsets::S0, 8);
        assert_eq!(offsets::S11, 96);
        assert_eq!(offsets::RA, 104);
        assert_eq!(offsets::TP, 112);
        assert_eq!(offsets::T0, 120);
        assert_eq!(offsets::T6, 168);
        assert_eq!(offsets::A0, 176);
        assert_eq!(offsets::A7, 232);
    }

    #[test]
    fn test_every_field_offset() {
        assert_eq!(offset_of!(ContextSwitchFrame, s5), offsets::S5);
        assert_eq!(offset_of!(ContextSwitchFrame, t3), offsets::T3);
        assert_eq!(offset_of!(ContextSwitchFrame, a4), offsets::A4);
        assert_eq!(offsets::A7 - offsets::PC, 29 * WORD);
    }

    #[test]
    fn test_words_view_matches_fields() {
        let mut frame = ContextSwitchFrame::zeroed();
        frame.pc = 0x1111;
        frame.ra = 0x2222;
        frame.a7 = 0x3333;
        let words = frame.as_words();
        assert_eq!(words[offsets::PC / WORD], 0x1111);
        assert_eq!(words[offsets::RA / WORD], 0x2222);
        assert_eq!(words[offsets::A7 / WORD], 0x3333);
        assert_eq!(words.iter().filter(|&&w| w != 0).count(), 3);
        assert_eq!(ContextSwitchFrame::default(), ContextSwitchFrame::zeroed());
    }
}
