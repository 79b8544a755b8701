//! # Floating-Point Register File
//!
//! Per-thread floating-point save area and the two narrow interfaces the
//! lazy context manager drives:
//!
//! - [`RegisterFile`]: move the 32 `f` registers plus `fcsr` between
//!   hardware and a [`FpuContext`]
//! - [`FpuControl`]: gate the unit through `mstatus.FS`
//!
//! The default build saves 64-bit registers (D extension). The
//! `fpu-single` feature switches to 32-bit registers for F-only cores.

cfg_if::cfg_if! {
    if #[cfg(feature = "fpu-single")] {
        /// One saved floating-point register
        pub type FpuReg = u32;
    } else {
        /// One saved floating-point register
        pub type FpuReg = u64;
    }
}

/// Number of floating-point registers
pub const FPU_REG_COUNT: usize = 32;

// ============================================================================
// FPU Context
// ============================================================================

/// Saved floating-point state of one thread
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpuContext {
    /// f0 - f31
    pub regs: [FpuReg; FPU_REG_COUNT],
    /// Floating-point control and status register
    pub fcsr: usize,
}

impl FpuContext {
    /// Zeroed context
    pub const fn new() -> Self {
        Self {
            regs: [0; FPU_REG_COUNT],
            fcsr: 0,
        }
    }

    /// Reset every register and the status word to zero
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

impl Default for FpuContext {
    fn default() -> Self {
        Self::new()
    }
}

static_assertions::const_assert_eq!(
    core::mem::offset_of!(FpuContext, fcsr),
    FPU_REG_COUNT * core::mem::size_of::<FpuReg>()
);

// ============================================================================
// Hardware Interfaces
// ============================================================================

/// Bulk transfer between the hardware register file and memory
pub trait RegisterFile {
    /// Store all registers and fcsr into `ctx`
    fn save(&mut self, ctx: &mut FpuContext);

    /// Load all registers and fcsr from `ctx`
    fn load(&mut self, ctx: &FpuContext);
}

/// Access gate of the floating-point unit
pub trait FpuControl {
    /// Allow FP instructions (FS = Dirty)
    fn enable(&mut self);

    /// Make every FP instruction trap (FS = Off)
    fn disable(&mut self);

    /// Register file state may differ from the saved context (SD set)
    fn is_dirty(&self) -> bool;
}

// ============================================================================
// Machine FPU
// ============================================================================

/// The hart's own floating-point unit
#[derive(Debug, Default)]
pub struct MachineFpu;

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
impl FpuControl for MachineFpu {
    #[inline]
    fn enable(&mut self) {
        super::csr::mstatus_set(super::csr::status::FS);
    }

    #[inline]
    fn disable(&mut self) {
        super::csr::mstatus_clear(super::csr::status::FS);
    }

    #[inline]
    fn is_dirty(&self) -> bool {
        super::csr::mstatus() & super::csr::status::SD != 0
    }
}

#[allow(unused_macros)]
macro_rules! fpu_sweep {
    ($op:literal, $width:literal, $base:expr) => {
        fpu_sweep!(@regs $op, $width, $base,
            0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
            16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31)
    };
    (@regs $op:literal, $width:literal, $base:expr, $($n:literal)*) => {
        core::arch::asm!(
            $(concat!($op, " f", $n, ", ", $n, "*", $width, "({base})"),)*
            base = in(reg) $base,
            options(nostack)
        )
    };
}

cfg_if::cfg_if! {
    if #[cfg(all(
        any(target_arch = "riscv32", target_arch = "riscv64"),
        feature = "fpu-single",
        target_feature = "f"
    ))] {
        impl RegisterFile for MachineFpu {
            fn save(&mut self, ctx: &mut FpuContext) {
                let fcsr: usize;
                unsafe {
                    fpu_sweep!("fsw", "4", ctx.regs.as_mut_ptr());
                    core::arch::asm!("frcsr {}", out(reg) fcsr, options(nomem, nostack));
                }
                ctx.fcsr = fcsr;
            }

            fn load(&mut self, ctx: &FpuContext) {
                unsafe {
                    fpu_sweep!("flw", "4", ctx.regs.as_ptr());
                    core::arch::asm!("fscsr {}", in(reg) ctx.fcsr, options(nomem, nostack));
                }
            }
        }
    } else if #[cfg(all(
        any(target_arch = "riscv32", target_arch = "riscv64"),
        not(feature = "fpu-single"),
        target_feature = "d"
    ))] {
        impl RegisterFile for MachineFpu {
            fn save(&mut self, ctx: &mut FpuContext) {
                let fcsr: usize;
                unsafe {
                    fpu_sweep!("fsd", "8", ctx.regs.as_mut_ptr());
                    core::arch::asm!("frcsr {}", out(reg) fcsr, options(nomem, nostack));
                }
                ctx.fcsr = fcsr;
            }

            fn load(&mut self, ctx: &FpuContext) {
                unsafe {
                    fpu_sweep!("fld", "8", ctx.regs.as_ptr());
                    core::arch::asm!("fscsr {}", in(reg) ctx.fcsr, options(nomem, nostack));
                }
            }
        }
    }
}
