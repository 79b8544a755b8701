//! # Lazy FPU Context Switching
//!
//! Threads start with the FPU switched off. The first floating-point
//! instruction of a thread traps as an illegal instruction, and only then
//! are the registers moved: the previous owner's state is saved into its
//! context and the new owner's state loaded. Threads that never touch the
//! FPU never pay for it.
//!
//! ## Ownership
//!
//! At most one thread owns the register file. The owner is tracked here;
//! the context switch path disables the unit whenever a non-owner gets the
//! CPU, so no thread can clobber registers that belong to someone else.

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::core::csr::misa;
use super::core::fpu::{FpuControl, RegisterFile};
use super::fault::Fault;
use super::state::{Scheduler, ThreadId};

const NO_OWNER: usize = usize::MAX;

/// Tracker of the thread whose state lives in the FPU registers
pub struct LazyFpu {
    owner: AtomicUsize,
}

impl fmt::Debug for LazyFpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyFpu").field("owner", &self.owner()).finish()
    }
}

impl LazyFpu {
    /// Tracker without an owner
    pub const fn new() -> Self {
        Self {
            owner: AtomicUsize::new(NO_OWNER),
        }
    }

    /// Thread owning the register file
    #[inline]
    pub fn owner(&self) -> Option<ThreadId> {
        match self.owner.load(Ordering::Acquire) {
            NO_OWNER => None,
            id => Some(ThreadId(id)),
        }
    }

    /// Forget the owner; the register contents are discarded
    #[inline]
    pub fn reset(&self) {
        self.owner.store(NO_OWNER, Ordering::Release);
    }

    /// Drop ownership if `thread` holds it
    #[inline]
    pub fn disown(&self, thread: ThreadId) {
        let _ = self.owner.compare_exchange(
            thread.0,
            NO_OWNER,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    #[cfg(test)]
    pub(crate) fn force_owner(&self, owner: Option<ThreadId>) {
        self.owner
            .store(owner.map_or(NO_OWNER, |id| id.0), Ordering::Release);
    }

    /// Switch the unit off and check that the hart has the floating-point
    /// extension the build saves registers for. A `misa` of 0 means the
    /// register is not implemented and the check is skipped.
    pub fn init<F: FpuControl>(&self, fpu: &mut F, misa: usize) -> Result<(), Fault> {
        fpu.disable();

        let required = if cfg!(feature = "fpu-single") {
            misa::F
        } else {
            misa::D
        };
        if misa != 0 && misa & required == 0 {
            return Err(Fault::MissingFloatExtension);
        }

        self.reset();
        Ok(())
    }

    /// Hand the FPU to the running thread after it trapped on a
    /// floating-point instruction.
    pub fn activate<F: RegisterFile + FpuControl>(
        &self,
        fpu: &mut F,
        scheduler: &dyn Scheduler,
        in_isr: bool,
    ) -> Result<ThreadId, Fault> {
        // A live unit cannot trap on FP instructions
        if fpu.is_dirty() {
            return Err(Fault::FpuAlreadyDirty);
        }
        if in_isr {
            return Err(Fault::FpuInInterrupt);
        }

        let active = scheduler.active_thread().ok_or(Fault::FpuContextMissing)?;
        let mut incoming = scheduler
            .fpu_context(active)
            .ok_or(Fault::FpuContextMissing)?;

        fpu.enable();

        if let Some(previous) = self.owner() {
            let mut outgoing = scheduler
                .fpu_context(previous)
                .ok_or(Fault::FpuOwnerWithoutContext)?;
            // SAFETY: contexts stay valid while their thread exists and are
            // only touched here, with interrupts masked by the trap.
            fpu.save(unsafe { outgoing.as_mut() });
        }

        self.owner.store(active.0, Ordering::Release);
        fpu.load(unsafe { incoming.as_mut() });

        log::trace!("fpu: owner {}", active);
        Ok(active)
    }
}

impl Default for LazyFpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::arch::riscv::core::fpu::{FpuContext, FPU_REG_COUNT};
    use crate::arch::riscv::state::tests::FakeScheduler;

    /// Register file in memory, with the FS gate modelled as two flags
    #[derive(Debug, Default)]
    pub(crate) struct FakeFpu {
        pub hw: FpuContext,
        pub enabled: bool,
        pub dirty: bool,
        pub saves: usize,
        pub loads: usize,
    }

    impl FakeFpu {
        /// Model a thread computing with the unit
        pub(crate) fn scribble(&mut self, value: u64) {
            assert!(self.enabled, "FP instruction with FPU off");
            for (i, reg) in self.hw.regs.iter_mut().enumerate() {
                *reg = (value + i as u64) as _;
            }
            self.hw.fcsr = (value & 0x1f) as usize;
            self.dirty = true;
        }
    }

    impl RegisterFile for FakeFpu {
        fn save(&mut self, ctx: &mut FpuContext) {
            assert!(self.enabled);
            *ctx = self.hw;
            self.saves += 1;
        }

        fn load(&mut self, ctx: &FpuContext) {
            assert!(self.enabled);
            self.hw = *ctx;
            self.loads += 1;
        }
    }

    impl FpuControl for FakeFpu {
        fn enable(&mut self) {
            self.enabled = true;
            self.dirty = true;
        }

        fn disable(&mut self) {
            self.enabled = false;
            self.dirty = false;
        }

        fn is_dirty(&self) -> bool {
            self.dirty
        }
    }

    #[test]
    fn test_first_use_loads_without_save() {
        let lazy = LazyFpu::new();
        let sched = FakeScheduler::leak(&[true, true]);
        sched.context(1).regs[0] = 9;
        sched.run(1);

        let mut fpu = FakeFpu::default();
        assert_eq!(lazy.activate(&mut fpu, sched, false), Ok(ThreadId(1)));
        assert!(fpu.enabled);
        assert_eq!((fpu.saves, fpu.loads), (0, 1));
        assert_eq!(fpu.hw.regs[0], 9);
        assert_eq!(lazy.owner(), Some(ThreadId(1)));
    }

    #[test]
    fn test_refusals() {
        let lazy = LazyFpu::new();
        let sched = FakeScheduler::leak(&[true, false]);
        let mut fpu = FakeFpu::default();

        assert_eq!(lazy.activate(&mut fpu, sched, false), Err(Fault::FpuContextMissing));

        sched.run(0);
        assert_eq!(lazy.activate(&mut fpu, sched, true), Err(Fault::FpuInInterrupt));

        fpu.dirty = true;
        assert_eq!(lazy.activate(&mut fpu, sched, false), Err(Fault::FpuAlreadyDirty));
        fpu.dirty = false;

        sched.run(1);
        assert_eq!(lazy.activate(&mut fpu, sched, false), Err(Fault::FpuContextMissing));
        assert_eq!(lazy.owner(), None);
        assert_eq!((fpu.saves, fpu.loads), (0, 0));
    }

    #[test]
    fn test_owner_without_context_is_fatal() {
        let lazy = LazyFpu::new();
        let sched = FakeScheduler::leak(&[false, true]);
        lazy.force_owner(Some(ThreadId(0)));
        sched.run(1);

        let mut fpu = FakeFpu::default();
        assert_eq!(
            lazy.activate(&mut fpu, sched, false),
            Err(Fault::FpuOwnerWithoutContext)
        );
    }

    #[test]
    fn test_init_checks_extension() {
        let lazy = LazyFpu::new();
        let mut fpu = FakeFpu { enabled: true, dirty: true, ..Default::default() };
        lazy.force_owner(Some(ThreadId(3)));

        assert_eq!(lazy.init(&mut fpu, 0), Ok(()));
        assert!(!fpu.enabled);
        assert_eq!(lazy.owner(), None);

        assert_eq!(lazy.init(&mut fpu, misa::F | misa::D | misa::C), Ok(()));
        assert_eq!(lazy.init(&mut fpu, misa::C), Err(Fault::MissingFloatExtension));
        #[cfg(not(feature = "fpu-single"))]
        assert_eq!(lazy.init(&mut fpu, misa::F), Err(Fault::MissingFloatExtension));
    }

    #[test]
    fn test_threads_never_see_each_others_registers() {
        const THREADS: usize = 4;
        let lazy = LazyFpu::new();
        let sched = FakeScheduler::leak(&[true; THREADS]);
        let mut fpu = FakeFpu::default();

        // What each thread last wrote, and so expects to read back
        let mut expected = [FpuContext::new(); THREADS];
        let mut seed: u64 = 0x2545_f491;

        for step in 0..200u64 {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            let thread = (seed >> 33) as usize % THREADS;

            // Context switch: a non-owner must find the unit off
            sched.run(thread);
            if lazy.owner() != Some(ThreadId(thread)) {
                fpu.disable();
            }

            if !fpu.enabled {
                let (saves, loads) = (fpu.saves, fpu.loads);
                let had_owner = lazy.owner().is_some();
                assert_eq!(lazy.activate(&mut fpu, sched, false), Ok(ThreadId(thread)));
                assert_eq!(fpu.saves - saves, usize::from(had_owner));
                assert_eq!(fpu.loads - loads, 1);
            }

            assert_eq!(fpu.hw, expected[thread], "thread {} at step {}", thread, step);
            fpu.scribble(step * 100 + thread as u64);
            expected[thread] = fpu.hw;
        }

        for thread in 0..THREADS {
            if lazy.owner() != Some(ThreadId(thread)) {
                assert_eq!(*sched.context(thread), expected[thread]);
            }
        }
        assert_eq!(expected[0].regs.len(), FPU_REG_COUNT);
    }

    #[test]
    fn test_pid_reuse_does_not_inherit_registers() {
        let lazy = LazyFpu::new();
        let sched = FakeScheduler::leak(&[true, true]);
        let mut fpu = FakeFpu::default();

        sched.run(0);
        lazy.activate(&mut fpu, sched, false).unwrap();
        fpu.scribble(0x1000);

        // Thread 0 exits and its id is handed to a new thread
        lazy.disown(ThreadId(0));
        sched.context(0).clear();
        fpu.disable();

        lazy.activate(&mut fpu, sched, false).unwrap();
        assert_eq!(fpu.hw, FpuContext::new());
        assert_eq!(fpu.saves, 0);

        lazy.disown(ThreadId(1));
        assert_eq!(lazy.owner(), Some(ThreadId(0)));
    }
}
