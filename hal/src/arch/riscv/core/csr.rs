//! # Machine-Mode Control and Status Registers
//!
//! The kernel runs entirely in M-mode, so only the machine-level CSRs are
//! touched here. Register width follows XLEN: every value is a `usize`,
//! which keeps the same code valid for RV32 and RV64.
//!
//! ## Cause Register Layout
//!
//! ```text
//! XLEN-1  XLEN-2                                   0
//! +------+-----------------------------------------+
//! | INT  |             exception / irq code        |
//! +------+-----------------------------------------+
//! ```

// ============================================================================
// CSR Numbers
// ============================================================================

/// Floating-point accrued exceptions
pub const FFLAGS: usize = 0x001;
/// Floating-point dynamic rounding mode
pub const FRM: usize = 0x002;
/// Floating-point control and status (frm + fflags)
pub const FCSR: usize = 0x003;

// ============================================================================
// Cause Register
// ============================================================================

/// Interrupt flag of mcause (top bit)
pub const CAUSE_INTERRUPT_BIT: usize = 1 << (usize::BITS - 1);

/// Code field of mcause
pub const CAUSE_CODE_MASK: usize = !CAUSE_INTERRUPT_BIT;

/// Machine interrupt codes
pub mod irq_cause {
    /// Machine software interrupt (yield requests)
    pub const MACHINE_SOFTWARE: usize = 3;
    /// Machine timer interrupt
    pub const MACHINE_TIMER: usize = 7;
    /// Machine external interrupt
    pub const MACHINE_EXTERNAL: usize = 11;
}

/// Synchronous exception codes
pub mod exception {
    pub const INSTRUCTION_MISALIGNED: usize = 0;
    pub const INSTRUCTION_ACCESS_FAULT: usize = 1;
    pub const ILLEGAL_INSTRUCTION: usize = 2;
    pub const BREAKPOINT: usize = 3;
    pub const LOAD_MISALIGNED: usize = 4;
    pub const LOAD_ACCESS_FAULT: usize = 5;
    pub const STORE_MISALIGNED: usize = 6;
    pub const STORE_ACCESS_FAULT: usize = 7;
    pub const ECALL_FROM_U: usize = 8;
    pub const ECALL_FROM_M: usize = 11;
}

/// Decoded trap cause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrapCause {
    /// Asynchronous interrupt with its code
    Interrupt(usize),
    /// Synchronous exception with its code
    Exception(usize),
}

impl TrapCause {
    /// Decode a raw mcause value
    pub const fn from_mcause(mcause: usize) -> Self {
        let code = mcause & CAUSE_CODE_MASK;
        if mcause & CAUSE_INTERRUPT_BIT != 0 {
            TrapCause::Interrupt(code)
        } else {
            TrapCause::Exception(code)
        }
    }

    /// Encode back into the mcause representation
    pub const fn to_mcause(self) -> usize {
        match self {
            TrapCause::Interrupt(code) => CAUSE_INTERRUPT_BIT | code,
            TrapCause::Exception(code) => code,
        }
    }

    /// Is this an interrupt?
    pub const fn is_interrupt(self) -> bool {
        matches!(self, TrapCause::Interrupt(_))
    }

    /// Cause code without the interrupt flag
    pub const fn code(self) -> usize {
        match self {
            TrapCause::Interrupt(code) | TrapCause::Exception(code) => code,
        }
    }

    /// Human readable cause name
    pub fn name(self) -> &'static str {
        match self {
            TrapCause::Interrupt(irq_cause::MACHINE_SOFTWARE) => "Machine Software Interrupt",
            TrapCause::Interrupt(irq_cause::MACHINE_TIMER) => "Machine Timer Interrupt",
            TrapCause::Interrupt(irq_cause::MACHINE_EXTERNAL) => "Machine External Interrupt",
            TrapCause::Interrupt(_) => "Unknown Interrupt",
            TrapCause::Exception(exception::INSTRUCTION_MISALIGNED) => {
                "Instruction Address Misaligned"
            },
            TrapCause::Exception(exception::INSTRUCTION_ACCESS_FAULT) => {
                "Instruction Access Fault"
            },
            TrapCause::Exception(exception::ILLEGAL_INSTRUCTION) => "Illegal Instruction",
            TrapCause::Exception(exception::BREAKPOINT) => "Breakpoint",
            TrapCause::Exception(exception::LOAD_MISALIGNED) => "Load Address Misaligned",
            TrapCause::Exception(exception::LOAD_ACCESS_FAULT) => "Load Access Fault",
            TrapCause::Exception(exception::STORE_MISALIGNED) => "Store/AMO Address Misaligned",
            TrapCause::Exception(exception::STORE_ACCESS_FAULT) => "Store/AMO Access Fault",
            TrapCause::Exception(exception::ECALL_FROM_U) => "Environment Call from U-mode",
            TrapCause::Exception(exception::ECALL_FROM_M) => "Environment Call from M-mode",
            TrapCause::Exception(_) => "Unknown Exception",
        }
    }
}

// ============================================================================
// Status Register Bits (mstatus)
// ============================================================================

/// mstatus bits
pub mod status {
    /// Machine Interrupt Enable
    pub const MIE: usize = 1 << 3;
    /// Machine Previous Interrupt Enable
    pub const MPIE: usize = 1 << 7;
    /// Machine Previous Privilege (both bits set = M-mode)
    pub const MPP: usize = 0b11 << 11;
    /// Floating-point unit status field
    pub const FS: usize = 0b11 << 13;
    /// FS = Initial
    pub const FS_INITIAL: usize = 0b01 << 13;
    /// FS = Clean
    pub const FS_CLEAN: usize = 0b10 << 13;
    /// FS = Dirty
    pub const FS_DIRTY: usize = 0b11 << 13;
    /// State dirty summary (top bit)
    pub const SD: usize = 1 << (usize::BITS - 1);

    /// Value written at boot: return to M-mode with interrupts enabled
    pub const DEFAULT: usize = MPP | MPIE;
}

bitflags::bitflags! {
    /// Machine interrupt enable bits (mie)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct MachineInterrupts: usize {
        /// Software interrupt enable
        const MSIE = 1 << 3;
        /// Timer interrupt enable
        const MTIE = 1 << 7;
        /// External interrupt enable
        const MEIE = 1 << 11;
    }
}

/// misa extension bits
pub mod misa {
    /// Single-precision floating point
    pub const F: usize = 1 << (b'F' - b'A');
    /// Double-precision floating point
    pub const D: usize = 1 << (b'D' - b'A');
    /// Compressed instructions
    pub const C: usize = 1 << (b'C' - b'A');
}

// ============================================================================
// CSR Accessors
// ============================================================================

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
mod access {
    use core::arch::asm;

    macro_rules! read_csr {
        ($csr:literal) => {{
            let value: usize;
            unsafe {
                asm!(
                    concat!("csrr {}, ", $csr),
                    out(reg) value,
                    options(nomem, nostack, preserves_flags)
                );
            }
            value
        }};
    }

    // Writes are compiler barriers: mstatus.MIE and mie bound critical sections
    macro_rules! write_csr {
        ($csr:literal, $value:expr) => {{
            unsafe {
                asm!(
                    concat!("csrw ", $csr, ", {}"),
                    in(reg) $value,
                    options(nostack)
                );
            }
        }};
    }

    macro_rules! read_set_csr {
        ($csr:literal, $bits:expr) => {{
            let old: usize;
            unsafe {
                asm!(
                    concat!("csrrs {}, ", $csr, ", {}"),
                    out(reg) old,
                    in(reg) $bits,
                    options(nostack)
                );
            }
            old
        }};
    }

    macro_rules! read_clear_csr {
        ($csr:literal, $bits:expr) => {{
            let old: usize;
            unsafe {
                asm!(
                    concat!("csrrc {}, ", $csr, ", {}"),
                    out(reg) old,
                    in(reg) $bits,
                    options(nostack)
                );
            }
            old
        }};
    }

    /// Read mcause
    #[inline(always)]
    pub fn mcause() -> usize {
        read_csr!("mcause")
    }

    /// Read mepc
    #[inline(always)]
    pub fn mepc() -> usize {
        read_csr!("mepc")
    }

    /// Read mstatus
    #[inline(always)]
    pub fn mstatus() -> usize {
        read_csr!("mstatus")
    }

    /// Set mstatus bits, returning the previous value
    #[inline(always)]
    pub fn mstatus_set(bits: usize) -> usize {
        read_set_csr!("mstatus", bits)
    }

    /// Clear mstatus bits, returning the previous value
    #[inline(always)]
    pub fn mstatus_clear(bits: usize) -> usize {
        read_clear_csr!("mstatus", bits)
    }

    /// Read mie
    #[inline(always)]
    pub fn mie() -> usize {
        read_csr!("mie")
    }

    /// Write mie
    #[inline(always)]
    pub fn mie_write(value: usize) {
        write_csr!("mie", value)
    }

    /// Set mie bits
    #[inline(always)]
    pub fn mie_set(bits: usize) -> usize {
        read_set_csr!("mie", bits)
    }

    /// Clear mie bits
    #[inline(always)]
    pub fn mie_clear(bits: usize) -> usize {
        read_clear_csr!("mie", bits)
    }

    /// Write mtvec
    #[inline(always)]
    pub fn mtvec_write(value: usize) {
        write_csr!("mtvec", value)
    }

    /// Read misa
    #[inline(always)]
    pub fn misa() -> usize {
        read_csr!("misa")
    }

    /// Read mvendorid
    #[inline(always)]
    pub fn mvendorid() -> usize {
        read_csr!("mvendorid")
    }

    /// Read marchid
    #[inline(always)]
    pub fn marchid() -> usize {
        read_csr!("marchid")
    }

    /// Read mimpid
    #[inline(always)]
    pub fn mimpid() -> usize {
        read_csr!("mimpid")
    }

    /// Wait for interrupt
    #[inline(always)]
    pub fn wfi() {
        unsafe {
            asm!("wfi", options(nostack));
        }
    }

    /// Order device I/O and memory accesses
    #[inline(always)]
    pub fn fence_iorw() {
        unsafe {
            asm!("fence iorw, iorw", options(nostack));
        }
    }
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub use access::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cause_decode() {
        let timer = TrapCause::from_mcause(CAUSE_INTERRUPT_BIT | irq_cause::MACHINE_TIMER);
        assert_eq!(timer, TrapCause::Interrupt(7));
        assert!(timer.is_interrupt());

        let illegal = TrapCause::from_mcause(exception::ILLEGAL_INSTRUCTION);
        assert_eq!(illegal, TrapCause::Exception(2));
        assert_eq!(illegal.name(), "Illegal Instruction");
    }

    #[test]
    fn test_cause_roundtrip_keeps_code() {
        let raw = CAUSE_INTERRUPT_BIT | irq_cause::MACHINE_EXTERNAL;
        assert_eq!(TrapCause::from_mcause(raw).to_mcause(), raw);
        assert_eq!(TrapCause::from_mcause(raw).code(), 11);
    }

    #[test]
    fn test_fs_field() {
        assert_eq!(status::FS, status::FS_DIRTY);
        assert_eq!(status::FS & status::FS_INITIAL, status::FS_INITIAL);
        assert_eq!(status::DEFAULT & status::MIE, 0);
    }

    #[test]
    fn test_misa_bits() {
        assert_eq!(misa::F, 1 << 5);
        assert_eq!(misa::D, 1 << 3);
    }
}
