//! # Fatal Faults
//!
//! Every unrecoverable condition the architecture layer can detect is one
//! [`Fault`] variant. Detection sites return `Err(Fault)`; the trap
//! dispatcher hands the fault to the installed [`FaultHandler`], which
//! must not return in production.

use core::fmt;

use super::core::csr::TrapCause;

// ============================================================================
// Fault Taxonomy
// ============================================================================

/// Unrecoverable architecture fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// Interrupt with a code no handler exists for
    UnhandledInterrupt {
        /// Interrupt code
        code: usize,
    },
    /// Exception other than illegal instruction
    UnhandledTrap {
        /// Exception code
        code: usize,
    },
    /// Illegal 32-bit instruction outside the floating-point classes
    IllegalInstruction(u32),
    /// Illegal 16-bit instruction outside the floating-point classes
    IllegalCompressedInstruction(u16),
    /// SYSTEM opcode that is not a CSR access
    IllegalSystemInstruction(u32),
    /// CSR access to a register other than fflags/frm/fcsr
    IllegalCsrAccess {
        /// CSR number
        csr: usize,
    },
    /// FPU trap taken while the register file is already live
    FpuAlreadyDirty,
    /// FPU instruction executed inside an interrupt handler
    FpuInInterrupt,
    /// FPU instruction in a thread without floating-point context
    FpuContextMissing,
    /// The recorded FPU owner has no context to save into
    FpuOwnerWithoutContext,
    /// misa lacks the configured floating-point extension
    MissingFloatExtension,
    /// A trap needed the scheduler before one was installed
    SchedulerMissing,
}

impl Fault {
    /// Short description used in diagnostics
    pub const fn reason(&self) -> &'static str {
        match self {
            Fault::UnhandledInterrupt { .. } => "Unhandled interrupt",
            Fault::UnhandledTrap { .. } => "Unhandled machine mode trap",
            Fault::IllegalInstruction(_) => "Illegal instruction trap",
            Fault::IllegalCompressedInstruction(_) => "Illegal compressed instruction trap",
            Fault::IllegalSystemInstruction(_) => "Illegal system instruction",
            Fault::IllegalCsrAccess { .. } => "Illegal CSR access",
            Fault::FpuAlreadyDirty => "Illegal FPU instruction",
            Fault::FpuInInterrupt => "FPU instruction in interrupt context",
            Fault::FpuContextMissing => "FPU instruction in thread without FPU context",
            Fault::FpuOwnerWithoutContext => "FPU owner without FPU context",
            Fault::MissingFloatExtension => "CPU lacks (double) float extension",
            Fault::SchedulerMissing => "No scheduler installed",
        }
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fault::UnhandledInterrupt { code } | Fault::UnhandledTrap { code } => {
                write!(f, "{} (code {})", self.reason(), code)
            },
            Fault::IllegalInstruction(insn) | Fault::IllegalSystemInstruction(insn) => {
                write!(f, "{} ({:#010x})", self.reason(), insn)
            },
            Fault::IllegalCompressedInstruction(insn) => {
                write!(f, "{} ({:#06x})", self.reason(), insn)
            },
            Fault::IllegalCsrAccess { csr } => write!(f, "{} (csr {:#05x})", self.reason(), csr),
            _ => f.write_str(self.reason()),
        }
    }
}

// ============================================================================
// Trap Information
// ============================================================================

/// Cause and address of the trap being serviced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrapInfo {
    /// Decoded mcause
    pub cause: TrapCause,
    /// Faulting or interrupted program counter (mepc)
    pub epc: usize,
}

impl TrapInfo {
    /// Build from raw mcause/mepc values
    pub const fn new(mcause: usize, mepc: usize) -> Self {
        Self {
            cause: TrapCause::from_mcause(mcause),
            epc: mepc,
        }
    }
}

// ============================================================================
// Fault Handler
// ============================================================================

/// Central sink for fatal faults
pub trait FaultHandler: Sync {
    /// Report a fatal fault. Production handlers never return.
    fn fatal(&self, fault: Fault, info: &TrapInfo);
}

/// Log the fault with its trap registers and halt the hart
#[derive(Debug, Default)]
pub struct HaltOnFault;

/// Default fault handler
pub static HALT_ON_FAULT: HaltOnFault = HaltOnFault;

impl FaultHandler for HaltOnFault {
    fn fatal(&self, fault: Fault, info: &TrapInfo) {
        log::error!("FATAL: {}", fault);
        log::error!("MCAUSE = {:#x} ({})", info.cause.to_mcause(), info.cause.name());
        log::error!("MEPC   = {:#x}", info.epc);
        halt()
    }
}

/// Park the hart forever
pub fn halt() -> ! {
    loop {
        #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
        super::core::csr::wfi();
        #[cfg(not(any(target_arch = "riscv32", target_arch = "riscv64")))]
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::riscv::core::csr::{exception, irq_cause, CAUSE_INTERRUPT_BIT};

    #[test]
    fn test_reason_strings() {
        assert_eq!(Fault::UnhandledInterrupt { code: 5 }.reason(), "Unhandled interrupt");
        assert_eq!(Fault::UnhandledTrap { code: 1 }.reason(), "Unhandled machine mode trap");
        assert_eq!(Fault::IllegalCsrAccess { csr: 0x300 }.reason(), "Illegal CSR access");
        assert_eq!(
            Fault::IllegalSystemInstruction(0x0000_0073).reason(),
            "Illegal system instruction"
        );
    }

    #[test]
    fn test_display_includes_detail() {
        let text = format!("{}", Fault::IllegalInstruction(0xdead_beef));
        assert_eq!(text, "Illegal instruction trap (0xdeadbeef)");

        let text = format!("{}", Fault::IllegalCsrAccess { csr: 0x300 });
        assert_eq!(text, "Illegal CSR access (csr 0x300)");
    }

    #[test]
    fn test_trap_info_decode() {
        let info = TrapInfo::new(CAUSE_INTERRUPT_BIT | irq_cause::MACHINE_TIMER, 0x8000_0000);
        assert_eq!(info.cause, TrapCause::Interrupt(irq_cause::MACHINE_TIMER));
        assert_eq!(info.epc, 0x8000_0000);

        let info = TrapInfo::new(exception::ILLEGAL_INSTRUCTION, 4);
        assert_eq!(info.cause, TrapCause::Exception(exception::ILLEGAL_INSTRUCTION));
    }
}
