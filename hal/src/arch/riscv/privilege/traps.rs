//! # Trap Dispatch
//!
//! Every machine-mode trap ends up in [`CoreState::trap`], called by the
//! assembly entry with mcause, mepc and the stack pointer of the
//! interrupted thread.
//!
//! ```text
//! mcause
//!   ├─ interrupt
//!   │    ├─ software (3)  → context switch, returns the next thread's sp
//!   │    ├─ timer (7)     → core timer ISR
//!   │    ├─ external (11) → claim / callback / complete
//!   │    └─ other         → fatal
//!   └─ exception
//!        ├─ illegal instruction → lazy FPU activation or fatal
//!        └─ other               → fatal
//! ```
//!
//! The hardware touched by the handlers is bundled into a [`Hart`], so the
//! same dispatch code runs against the real CLINT/PLIC and against test
//! doubles.

use crate::arch::riscv::core::csr::{exception, irq_cause, TrapCause};
use crate::arch::riscv::core::fpu::{FpuControl, RegisterFile};
use crate::arch::riscv::fault::{Fault, TrapInfo};
use crate::arch::riscv::interrupts::plic::InterruptController;
use crate::arch::riscv::interrupts::SoftwareInterrupt;
use crate::arch::riscv::state::CoreState;
use crate::arch::riscv::timers::mtime::TimerHw;

use super::insn::{self, InstructionMemory};

// ============================================================================
// Hardware Bundle
// ============================================================================

/// Set of devices a board provides to the trap handlers
pub trait Machine {
    /// Core timer (mtime/mtimecmp)
    type Timer: TimerHw;
    /// External interrupt controller
    type Plic: InterruptController;
    /// Floating-point unit
    type Fpu: RegisterFile + FpuControl;
    /// Memory the faulting instruction is fetched from
    type Memory: InstructionMemory;
    /// Software interrupt used for context switches
    type Ipi: SoftwareInterrupt;
}

/// Devices of one hart
pub struct Hart<M: Machine> {
    pub timer: M::Timer,
    pub plic: M::Plic,
    pub fpu: M::Fpu,
    pub memory: M::Memory,
    pub ipi: M::Ipi,
    /// C extension present; instructions may be 2-byte aligned
    pub compressed: bool,
}

impl<M: Machine> core::fmt::Debug for Hart<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hart")
            .field("compressed", &self.compressed)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Dispatch
// ============================================================================

impl CoreState {
    /// Entry of every trap. Returns the stack pointer to resume with:
    /// `sp` unchanged, or the next thread's after a context switch.
    pub fn trap<M: Machine>(&self, hart: &mut Hart<M>, info: TrapInfo, sp: usize) -> usize {
        if info.cause != TrapCause::Interrupt(irq_cause::MACHINE_SOFTWARE) {
            self.handle_trap(hart, info);
            return sp;
        }

        hart.ipi.clear();
        let Some(scheduler) = self.scheduler() else {
            self.fault_handler().fatal(Fault::SchedulerMissing, &info);
            return sp;
        };
        let next = scheduler.switch_context(sp);

        // Only the owner may run with live registers
        if cfg!(feature = "lazy-fpu") && scheduler.active_thread() != self.fpu().owner() {
            hart.fpu.disable();
        }
        next
    }

    /// Service an interrupt or exception; faults go to the fault handler
    pub fn handle_trap<M: Machine>(&self, hart: &mut Hart<M>, info: TrapInfo) {
        if let Err(fault) = self.dispatch(hart, &info) {
            self.fault_handler().fatal(fault, &info);
        }
    }

    fn dispatch<M: Machine>(&self, hart: &mut Hart<M>, info: &TrapInfo) -> Result<(), Fault> {
        match info.cause {
            TrapCause::Interrupt(code) => self.interrupt(hart, code),
            TrapCause::Exception(exception::ILLEGAL_INSTRUCTION) => {
                self.illegal_instruction(hart, info.epc)
            },
            TrapCause::Exception(code) => Err(Fault::UnhandledTrap { code }),
        }
    }

    fn interrupt<M: Machine>(&self, hart: &mut Hart<M>, code: usize) -> Result<(), Fault> {
        self.set_in_isr(true);

        // Handlers must not use the FPU, they would corrupt the owner
        let fpu_live = cfg!(feature = "lazy-fpu") && hart.fpu.is_dirty();
        if cfg!(feature = "lazy-fpu") {
            hart.fpu.disable();
        }

        let result = match code {
            irq_cause::MACHINE_TIMER => {
                self.timer().isr(&mut hart.timer);
                Ok(())
            },
            irq_cause::MACHINE_EXTERNAL => {
                self.irq().handle(&mut hart.plic);
                Ok(())
            },
            _ => Err(Fault::UnhandledInterrupt { code }),
        };

        if fpu_live {
            hart.fpu.enable();
        }
        self.set_in_isr(false);
        result
    }

    fn illegal_instruction<M: Machine>(&self, hart: &mut Hart<M>, epc: usize) -> Result<(), Fault> {
        // SAFETY: epc is the address of the trapping instruction.
        let instruction = unsafe { insn::fetch(&hart.memory, epc, hart.compressed) };

        #[cfg(feature = "lazy-fpu")]
        {
            let access = insn::classify(instruction)?;
            log::trace!("fpu trap at {:#x}: {:?}", epc, access);
            let scheduler = self.scheduler().ok_or(Fault::SchedulerMissing)?;
            self.fpu()
                .activate(&mut hart.fpu, scheduler, self.in_isr())
                .map(|_| ())
        }

        #[cfg(not(feature = "lazy-fpu"))]
        {
            Err(match instruction {
                insn::Instruction::Standard(insn) => Fault::IllegalInstruction(insn),
                insn::Instruction::Compressed(insn) => Fault::IllegalCompressedInstruction(insn),
            })
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::arch::riscv::fpu::tests::FakeFpu;
    use crate::arch::riscv::interrupts::irq::tests::FakePlic;
    use crate::arch::riscv::privilege::insn::tests::{FakeMemory, ADD, CSRR_MSTATUS, C_FLDSP, FLD};
    use crate::arch::riscv::state::tests::{FakeScheduler, RecordingFaults};
    use crate::arch::riscv::state::{Scheduler, ThreadId};
    use crate::arch::riscv::timers::mtime::tests::FakeTimer;
    use crate::arch::riscv::timers::mtime::{TimerConfig, TimerHw};
    use core::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    pub(crate) struct FakeIpi {
        pub pending: bool,
        pub clears: usize,
    }

    impl SoftwareInterrupt for FakeIpi {
        fn raise(&mut self) {
            self.pending = true;
        }

        fn clear(&mut self) {
            self.pending = false;
            self.clears += 1;
        }
    }

    pub(crate) struct TestMachine;

    impl Machine for TestMachine {
        type Timer = FakeTimer;
        type Plic = FakePlic;
        type Fpu = FakeFpu;
        type Memory = FakeMemory;
        type Ipi = FakeIpi;
    }

    pub(crate) fn hart() -> Hart<TestMachine> {
        Hart {
            timer: FakeTimer::default(),
            plic: FakePlic::default(),
            fpu: FakeFpu::default(),
            memory: FakeMemory::default(),
            ipi: FakeIpi::default(),
            compressed: true,
        }
    }

    fn core_with(faults: &'static RecordingFaults) -> CoreState {
        let core = CoreState::new(TimerConfig::DEFAULT);
        core.install_fault_handler(faults);
        core
    }

    const MCAUSE_IRQ: usize = crate::arch::riscv::core::csr::CAUSE_INTERRUPT_BIT;

    fn irq(code: usize) -> TrapInfo {
        TrapInfo::new(MCAUSE_IRQ | code, 0x8000_0100)
    }

    fn exc(code: usize, epc: usize) -> TrapInfo {
        TrapInfo::new(code, epc)
    }

    #[test]
    fn test_unknown_causes_are_fatal() {
        let faults = RecordingFaults::leak();
        let core = core_with(faults);
        let mut hart = hart();

        core.handle_trap(&mut hart, irq(5));
        core.handle_trap(&mut hart, exc(exception::LOAD_ACCESS_FAULT, 0x100));
        assert_eq!(
            faults.take(),
            [
                Fault::UnhandledInterrupt { code: 5 },
                Fault::UnhandledTrap { code: exception::LOAD_ACCESS_FAULT },
            ]
        );
        assert!(!core.in_isr());
    }

    static TICKS: AtomicUsize = AtomicUsize::new(0);

    fn tick(_arg: *mut (), _channel: usize) {
        TICKS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_timer_interrupt_runs_callback() {
        let faults = RecordingFaults::leak();
        let core = core_with(faults);
        let mut hart = hart();
        core.timer()
            .init(&mut hart.timer, 0, TimerConfig::DEFAULT.frequency, tick, core::ptr::null_mut())
            .unwrap();
        hart.timer.now.set(500);
        core.timer().set_absolute(&mut hart.timer, 0, 0, 400).unwrap();

        core.handle_trap(&mut hart, irq(irq_cause::MACHINE_TIMER));
        assert_eq!(TICKS.load(Ordering::SeqCst), 1);
        assert_eq!(hart.timer.comparator(), u64::MAX);
        assert!(faults.take().is_empty());
    }

    #[test]
    fn test_external_interrupt_claims_and_completes() {
        let faults = RecordingFaults::leak();
        let core = core_with(faults);
        let mut hart = hart();
        hart.plic.pending = vec![9];

        core.handle_trap(&mut hart, irq(irq_cause::MACHINE_EXTERNAL));
        assert_eq!(hart.plic.completed, [9]);
        assert!(faults.take().is_empty());
        assert!(!core.in_isr());
    }

    #[cfg(feature = "lazy-fpu")]
    #[test]
    fn test_interrupt_preserves_live_fpu() {
        let core = core_with(RecordingFaults::leak());
        let mut hart = hart();
        hart.fpu.enable();

        core.handle_trap(&mut hart, irq(irq_cause::MACHINE_EXTERNAL));
        assert!(hart.fpu.enabled);
        assert!(hart.fpu.is_dirty());

        hart.fpu.disable();
        core.handle_trap(&mut hart, irq(irq_cause::MACHINE_EXTERNAL));
        assert!(!hart.fpu.enabled);
    }

    #[cfg(feature = "lazy-fpu")]
    #[test]
    fn test_fp_instruction_activates_fpu() {
        let faults = RecordingFaults::leak();
        let core = core_with(faults);
        let sched = FakeScheduler::leak(&[true]);
        sched.context(0).regs[5] = 55;
        sched.run(0);
        core.install_scheduler(sched);

        let mut hart = hart();
        hart.memory.put_u32(0x400, FLD);
        core.handle_trap(&mut hart, exc(exception::ILLEGAL_INSTRUCTION, 0x400));

        assert!(faults.take().is_empty());
        assert!(hart.fpu.enabled);
        assert_eq!(hart.fpu.hw.regs[5], 55);
        assert_eq!(core.fpu().owner(), Some(ThreadId(0)));

        // Compressed FP load at a halfword boundary
        hart.fpu.disable();
        hart.memory.put_u16(0x402, C_FLDSP);
        core.handle_trap(&mut hart, exc(exception::ILLEGAL_INSTRUCTION, 0x402));
        assert!(faults.take().is_empty());
        assert!(hart.fpu.enabled);
    }

    #[test]
    fn test_non_fp_illegal_instructions_are_fatal() {
        let faults = RecordingFaults::leak();
        let core = core_with(faults);
        let sched = FakeScheduler::leak(&[true]);
        sched.run(0);
        core.install_scheduler(sched);

        let mut hart = hart();
        hart.memory.put_u32(0x100, ADD);
        hart.memory.put_u32(0x104, CSRR_MSTATUS);
        core.handle_trap(&mut hart, exc(exception::ILLEGAL_INSTRUCTION, 0x100));
        core.handle_trap(&mut hart, exc(exception::ILLEGAL_INSTRUCTION, 0x104));

        let recorded = faults.take();
        assert_eq!(recorded[0], Fault::IllegalInstruction(ADD));
        #[cfg(feature = "lazy-fpu")]
        assert_eq!(recorded[1], Fault::IllegalCsrAccess { csr: 0x300 });
        assert!(!hart.fpu.enabled);
        assert_eq!(core.fpu().owner(), None);
    }

    #[cfg(feature = "lazy-fpu")]
    #[test]
    fn test_fp_instruction_without_scheduler_is_fatal() {
        let faults = RecordingFaults::leak();
        let core = core_with(faults);
        let mut hart = hart();
        hart.memory.put_u32(0x100, FLD);
        core.handle_trap(&mut hart, exc(exception::ILLEGAL_INSTRUCTION, 0x100));
        assert_eq!(faults.take(), [Fault::SchedulerMissing]);
    }

    #[test]
    fn test_software_interrupt_switches_context() {
        let faults = RecordingFaults::leak();
        let core = core_with(faults);
        let sched = FakeScheduler::leak(&[true, true]);
        sched.run(0);
        core.install_scheduler(sched);

        let mut hart = hart();
        // Two requests before the trap is taken collapse into one switch
        hart.ipi.raise();
        hart.ipi.raise();
        sched.state.lock().unwrap().ready = vec![1];

        let sp = core.trap(&mut hart, irq(irq_cause::MACHINE_SOFTWARE), 0x1000);
        assert_eq!(sp, 0x8000 + 0x100);
        assert!(!hart.ipi.pending);
        assert_eq!(hart.ipi.clears, 1);
        assert_eq!(sched.state.lock().unwrap().switches, 1);
        assert_eq!(sched.active_thread(), Some(ThreadId(1)));

        // Non-switch traps keep the stack pointer
        hart.plic.pending = vec![2];
        assert_eq!(core.trap(&mut hart, irq(irq_cause::MACHINE_EXTERNAL), 0x2000), 0x2000);
        assert!(faults.take().is_empty());
    }

    #[cfg(feature = "lazy-fpu")]
    #[test]
    fn test_switch_to_non_owner_disables_fpu() {
        let core = core_with(RecordingFaults::leak());
        let sched = FakeScheduler::leak(&[true, true]);
        sched.run(0);
        core.install_scheduler(sched);

        let mut hart = hart();
        hart.memory.put_u32(0x100, FLD);
        core.handle_trap(&mut hart, exc(exception::ILLEGAL_INSTRUCTION, 0x100));
        assert!(hart.fpu.enabled);

        sched.state.lock().unwrap().ready = vec![0, 1];
        core.trap(&mut hart, irq(irq_cause::MACHINE_SOFTWARE), 0x1000);
        assert!(!hart.fpu.enabled);

        // Back to the owner: registers still belong to it
        hart.fpu.enable();
        core.trap(&mut hart, irq(irq_cause::MACHINE_SOFTWARE), 0x1000);
        assert!(hart.fpu.enabled);
    }

    #[test]
    fn test_software_interrupt_without_scheduler_is_fatal() {
        let faults = RecordingFaults::leak();
        let core = core_with(faults);
        let mut hart = hart();
        assert_eq!(core.trap(&mut hart, irq(irq_cause::MACHINE_SOFTWARE), 0x40), 0x40);
        assert_eq!(faults.take(), [Fault::SchedulerMissing]);
    }
}
