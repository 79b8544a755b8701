//! # CPU Bring-Up
//!
//! Boot-time initialization of the hart and the binding of the trap
//! handlers to the rocketchip devices.
//!
//! ## Boot Order
//!
//! ```text
//! cpu_init()   trap vector, interrupt enables, PLIC and timer parked
//! fpu_init()   FPU off, extension check
//! kernel_init  threads created, first context switch
//! ```

use super::core::csr::MachineInterrupts;
use super::privilege::traps::{Hart, Machine};
use super::state::CoreState;
use super::timers::mtime::TimerHw;

impl CoreState {
    /// Put the devices of the hart into their boot state: external
    /// interrupts masked and routed to the null handler, timer comparator
    /// parked so no timer interrupt fires before a deadline is set.
    pub fn reset_devices<M: Machine>(&self, hart: &mut Hart<M>) {
        self.irq().init(&mut hart.plic);
        hart.timer.set_comparator(u64::MAX);
    }
}

/// Interrupt sources enabled at boot
pub const BOOT_INTERRUPTS: MachineInterrupts = MachineInterrupts::MSIE
    .union(MachineInterrupts::MTIE)
    .union(MachineInterrupts::MEIE);

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
mod machine {
    use super::BOOT_INTERRUPTS;
    use crate::arch::riscv::core::csr::{self, status};
    use crate::arch::riscv::core::fpu::MachineFpu;
    use crate::arch::riscv::fault::TrapInfo;
    use crate::arch::riscv::interrupts::{irq_enable, thread_yield_higher, ClintMsip, Plic};
    use crate::arch::riscv::platform::PlatformConfig;
    use crate::arch::riscv::privilege::insn::RawMemory;
    use crate::arch::riscv::privilege::traps::{Hart, Machine};
    use crate::arch::riscv::state::CORE;
    use crate::arch::riscv::timers::mtime::ClintTimer;

    /// Board the kernel runs on
    pub const PLATFORM: PlatformConfig = PlatformConfig::ROCKETCHIP64;

    /// Rocketchip devices
    #[derive(Debug)]
    pub struct RocketChip;

    impl Machine for RocketChip {
        type Timer = ClintTimer;
        type Plic = Plic;
        type Fpu = MachineFpu;
        type Memory = RawMemory;
        type Ipi = ClintMsip;
    }

    impl RocketChip {
        /// Handles to the devices of the running hart
        pub fn hart() -> Hart<Self> {
            // SAFETY: PLATFORM describes the memory map of this board.
            unsafe {
                Hart {
                    timer: ClintTimer::from_config(&PLATFORM),
                    plic: Plic::from_config(&PLATFORM),
                    fpu: MachineFpu,
                    memory: RawMemory,
                    ipi: ClintMsip::from_config(&PLATFORM),
                    compressed: PLATFORM.compressed,
                }
            }
        }
    }

    /// Initialize the hart for the kernel
    pub fn cpu_init() {
        #[cfg(target_os = "none")]
        crate::arch::riscv::privilege::entry::install_trap_vector();

        csr::mie_write(0);
        CORE.reset_devices(&mut RocketChip::hart());
        csr::mie_set(BOOT_INTERRUPTS.bits());
        csr::mstatus_set(status::DEFAULT);

        log::debug!("cpu: mie {:#x}", csr::mie());
    }

    /// Disable the FPU and check the floating-point extension
    pub fn fpu_init() {
        if let Err(fault) = CORE.fpu().init(&mut MachineFpu, csr::misa()) {
            let info = TrapInfo::new(csr::mcause(), csr::mepc());
            CORE.fault_handler().fatal(fault, &info);
        }
    }

    /// Enable interrupts and switch to the first thread
    pub fn cpu_switch_context_exit() -> ! {
        irq_enable();
        thread_yield_higher();
        crate::arch::riscv::fault::halt()
    }
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub use machine::*;
