//! # Interrupt Management
//!
//! - Global machine interrupt enable (mstatus.MIE)
//! - Machine software interrupt, used to request a context switch
//! - External interrupts through the PLIC (see [`plic`] and [`irq`])

pub mod irq;
pub mod plic;

use crate::arch::riscv::platform::PlatformConfig;

pub use irq::{null_isr, ExternalIrqTable, ExternalIsr, IrqError};
pub use plic::{InterruptController, Plic};

// ============================================================================
// Global Interrupt Enable
// ============================================================================

/// Saved global interrupt enable state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqState(bool);

impl IrqState {
    /// State with interrupts enabled or disabled
    pub const fn new(enabled: bool) -> Self {
        Self(enabled)
    }

    /// Were interrupts enabled?
    pub const fn was_enabled(self) -> bool {
        self.0
    }
}

/// Control of the global interrupt enable
pub trait IrqControl {
    /// Mask all interrupts, returning the previous state
    fn disable(&self) -> IrqState;

    /// Unmask all interrupts, returning the previous state
    fn enable(&self) -> IrqState;

    /// Return to a state obtained from `disable` or `enable`
    fn restore(&self, state: IrqState);
}

/// mstatus.MIE of the running hart
#[derive(Debug, Default, Clone, Copy)]
pub struct MachineIrq;

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
impl IrqControl for MachineIrq {
    #[inline]
    fn disable(&self) -> IrqState {
        use crate::arch::riscv::core::csr::{self, status};
        IrqState(csr::mstatus_clear(status::MIE) & status::MIE != 0)
    }

    #[inline]
    fn enable(&self) -> IrqState {
        use crate::arch::riscv::core::csr::{self, status};
        IrqState(csr::mstatus_set(status::MIE) & status::MIE != 0)
    }

    #[inline]
    fn restore(&self, state: IrqState) {
        use crate::arch::riscv::core::csr::{self, status};
        if state.was_enabled() {
            csr::mstatus_set(status::MIE);
        } else {
            csr::mstatus_clear(status::MIE);
        }
    }
}

/// Disable all maskable interrupts
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub fn irq_disable() -> IrqState {
    MachineIrq.disable()
}

/// Enable all maskable interrupts
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub fn irq_enable() -> IrqState {
    MachineIrq.enable()
}

/// Restore the global interrupt enable
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub fn irq_restore(state: IrqState) {
    MachineIrq.restore(state)
}

/// Is the hart servicing an interrupt?
pub fn irq_is_in() -> bool {
    crate::arch::riscv::state::CORE.in_isr()
}

// ============================================================================
// Software Interrupt
// ============================================================================

/// Machine software interrupt line of the hart
pub trait SoftwareInterrupt {
    /// Make the software interrupt pending
    fn raise(&mut self);

    /// Acknowledge the software interrupt
    fn clear(&mut self);
}

/// CLINT MSIP register
#[derive(Debug)]
pub struct ClintMsip {
    addr: usize,
}

impl ClintMsip {
    /// MSIP register at `addr`
    ///
    /// # Safety
    /// `addr` must be the hart's MSIP register.
    pub const unsafe fn new(addr: usize) -> Self {
        Self { addr }
    }

    /// MSIP register of the given platform
    ///
    /// # Safety
    /// `config` must describe the running hardware.
    pub const unsafe fn from_config(config: &PlatformConfig) -> Self {
        Self {
            addr: config.msip_addr(),
        }
    }
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
impl SoftwareInterrupt for ClintMsip {
    #[inline]
    fn raise(&mut self) {
        unsafe { core::ptr::write_volatile(self.addr as *mut u32, 1) };
        crate::arch::riscv::core::csr::fence_iorw();
    }

    #[inline]
    fn clear(&mut self) {
        unsafe { core::ptr::write_volatile(self.addr as *mut u32, 0) };
    }
}

/// Request a context switch on the next trap return
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub fn thread_yield_higher() {
    // SAFETY: rocketchip memory map.
    unsafe { ClintMsip::from_config(&PlatformConfig::ROCKETCHIP64) }.raise();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irq_state() {
        assert!(IrqState::new(true).was_enabled());
        assert!(!IrqState::new(false).was_enabled());
    }
}
