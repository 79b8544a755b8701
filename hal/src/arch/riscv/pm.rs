//! # Power Management
//!
//! The rocketchip core has a single low-power state: `wfi`. Off and reboot
//! are not wired to anything on this platform and park the hart instead.

/// Power state control
pub trait PowerManagement {
    /// Enter the lowest power state until the next interrupt
    fn set_lowest(&mut self);

    /// Power the system off
    fn off(&mut self) -> !;

    /// Restart the system
    fn reboot(&mut self) -> !;
}

/// Power management through `wfi`
#[derive(Debug, Default, Clone, Copy)]
pub struct Wfi;

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
impl PowerManagement for Wfi {
    #[inline]
    fn set_lowest(&mut self) {
        super::core::csr::wfi();
    }

    fn off(&mut self) -> ! {
        log::info!("pm: off");
        loop {
            super::core::csr::wfi();
        }
    }

    fn reboot(&mut self) -> ! {
        log::info!("pm: reboot not supported, halting");
        loop {
            super::core::csr::wfi();
        }
    }
}

/// Sleep until the next interrupt
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub fn pm_set_lowest() {
    Wfi.set_lowest();
}

/// Power the system off
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub fn pm_off() -> ! {
    Wfi.off()
}

/// Restart the system
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub fn pm_reboot() -> ! {
    Wfi.reboot()
}
