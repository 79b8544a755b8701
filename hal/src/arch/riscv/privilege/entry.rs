//! # Trap Entry
//!
//! `trap_entry` is the direct-mode trap vector. It pushes a
//! [`ContextSwitchFrame`] onto the interrupted thread's stack, switches to
//! the interrupt stack and calls into [`CoreState::trap`]. The returned
//! stack pointer selects the frame to restore: the same one, or another
//! thread's after a context switch.
//!
//! [`ContextSwitchFrame`]: crate::arch::riscv::context::frame::ContextSwitchFrame
//! [`CoreState::trap`]: crate::arch::riscv::state::CoreState::trap

use crate::arch::riscv::context::frame::{offsets, FRAME_SIZE, STACK_ALIGN};
use crate::arch::riscv::core::csr;
use crate::arch::riscv::cpu::RocketChip;
use crate::arch::riscv::fault::TrapInfo;
use crate::arch::riscv::state::CORE;

/// Bytes reserved for trap handlers
pub const ISR_STACK_SIZE: usize = 2048;

#[repr(C, align(16))]
struct IsrStack([u8; ISR_STACK_SIZE]);

static mut ISR_STACK: IsrStack = IsrStack([0; ISR_STACK_SIZE]);

static_assertions::const_assert_eq!(ISR_STACK_SIZE % STACK_ALIGN, 0);

extern "C" fn rvrt_trap(mcause: usize, mepc: usize, sp: usize) -> usize {
    let mut hart = RocketChip::hart();
    CORE.trap(&mut hart, TrapInfo::new(mcause, mepc), sp)
}

macro_rules! trap_entry_asm {
    ($st:literal, $ld:literal) => {
        core::arch::global_asm!(
            ".section .text.trap_entry, \"ax\"",
            ".balign 4",
            ".global trap_entry",
            "trap_entry:",
            "addi sp, sp, -{size}",
            concat!($st, " ra, {ra}(sp)"),
            concat!($st, " tp, {tp}(sp)"),
            concat!($st, " t0, {t0}(sp)"),
            concat!($st, " t1, {t1}(sp)"),
            concat!($st, " t2, {t2}(sp)"),
            concat!($st, " t3, {t3}(sp)"),
            concat!($st, " t4, {t4}(sp)"),
            concat!($st, " t5, {t5}(sp)"),
            concat!($st, " t6, {t6}(sp)"),
            concat!($st, " a0, {a0}(sp)"),
            concat!($st, " a1, {a1}(sp)"),
            concat!($st, " a2, {a2}(sp)"),
            concat!($st, " a3, {a3}(sp)"),
            concat!($st, " a4, {a4}(sp)"),
            concat!($st, " a5, {a5}(sp)"),
            concat!($st, " a6, {a6}(sp)"),
            concat!($st, " a7, {a7}(sp)"),
            concat!($st, " s0, {s0}(sp)"),
            concat!($st, " s1, {s1}(sp)"),
            concat!($st, " s2, {s2}(sp)"),
            concat!($st, " s3, {s3}(sp)"),
            concat!($st, " s4, {s4}(sp)"),
            concat!($st, " s5, {s5}(sp)"),
            concat!($st, " s6, {s6}(sp)"),
            concat!($st, " s7, {s7}(sp)"),
            concat!($st, " s8, {s8}(sp)"),
            concat!($st, " s9, {s9}(sp)"),
            concat!($st, " s10, {s10}(sp)"),
            concat!($st, " s11, {s11}(sp)"),
            "csrr a1, mepc",
            concat!($st, " a1, {pc}(sp)"),
            "csrr a0, mcause",
            "mv a2, sp",
            // Handlers run on the interrupt stack
            "la sp, {isr_stack}",
            "li t0, {isr_stack_size}",
            "add sp, sp, t0",
            "call {handler}",
            "mv sp, a0",
            concat!($ld, " t0, {pc}(sp)"),
            "csrw mepc, t0",
            concat!($ld, " ra, {ra}(sp)"),
            concat!($ld, " tp, {tp}(sp)"),
            concat!($ld, " t0, {t0}(sp)"),
            concat!($ld, " t1, {t1}(sp)"),
            concat!($ld, " t2, {t2}(sp)"),
            concat!($ld, " t3, {t3}(sp)"),
            concat!($ld, " t4, {t4}(sp)"),
            concat!($ld, " t5, {t5}(sp)"),
            concat!($ld, " t6, {t6}(sp)"),
            concat!($ld, " a0, {a0}(sp)"),
            concat!($ld, " a1, {a1}(sp)"),
            concat!($ld, " a2, {a2}(sp)"),
            concat!($ld, " a3, {a3}(sp)"),
            concat!($ld, " a4, {a4}(sp)"),
            concat!($ld, " a5, {a5}(sp)"),
            concat!($ld, " a6, {a6}(sp)"),
            concat!($ld, " a7, {a7}(sp)"),
            concat!($ld, " s0, {s0}(sp)"),
            concat!($ld, " s1, {s1}(sp)"),
            concat!($ld, " s2, {s2}(sp)"),
            concat!($ld, " s3, {s3}(sp)"),
            concat!($ld, " s4, {s4}(sp)"),
            concat!($ld, " s5, {s5}(sp)"),
            concat!($ld, " s6, {s6}(sp)"),
            concat!($ld, " s7, {s7}(sp)"),
            concat!($ld, " s8, {s8}(sp)"),
            concat!($ld, " s9, {s9}(sp)"),
            concat!($ld, " s10, {s10}(sp)"),
            concat!($ld, " s11, {s11}(sp)"),
            "addi sp, sp, {size}",
            "mret",
            size = const FRAME_SIZE,
            pc = const offsets::PC,
            ra = const offsets::RA,
            tp = const offsets::TP,
            t0 = const offsets::T0,
            t1 = const offsets::T1,
            t2 = const offsets::T2,
            t3 = const offsets::T3,
            t4 = const offsets::T4,
            t5 = const offsets::T5,
            t6 = const offsets::T6,
            a0 = const offsets::A0,
            a1 = const offsets::A1,
            a2 = const offsets::A2,
            a3 = const offsets::A3,
            a4 = const offsets::A4,
            a5 = const offsets::A5,
            a6 = const offsets::A6,
            a7 = const offsets::A7,
            s0 = const offsets::S0,
            s1 = const offsets::S1,
            s2 = const offsets::S2,
            s3 = const offsets::S3,
            s4 = const offsets::S4,
            s5 = const offsets::S5,
            s6 = const offsets::S6,
            s7 = const offsets::S7,
            s8 = const offsets::S8,
            s9 = const offsets::S9,
            s10 = const offsets::S10,
            s11 = const offsets::S11,
            isr_stack = sym ISR_STACK,
            isr_stack_size = const ISR_STACK_SIZE,
            handler = sym rvrt_trap,
        );
    };
}

cfg_if::cfg_if! {
    if #[cfg(target_pointer_width = "64")] {
        trap_entry_asm!("sd", "ld");
    } else {
        trap_entry_asm!("sw", "lw");
    }
}

extern "C" {
    fn trap_entry();
}

/// Point mtvec at `trap_entry` (direct mode)
pub fn install_trap_vector() {
    csr::mtvec_write(trap_entry as *const () as usize);
}
