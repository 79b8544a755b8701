//! # rvrt Hardware Abstraction Layer
//!
//! Architecture substrate of the rvrt real-time kernel: trap dispatch, lazy
//! floating-point context switching, the core timer, external interrupt
//! routing and the thread stack frame.
//!
//! ## Features
//!
//! - `lazy-fpu` (default): switch FPU registers on first use instead of on
//!   every context switch
//! - `fpu-single`: save 32-bit floating-point registers (F extension only)

#![cfg_attr(not(test), no_std)]

pub mod arch;

pub use arch::riscv::{context, cpu, fault, fpu, interrupts, platform, pm, privilege, state, timers};

pub use arch::riscv::{
    stack_init, ContextSwitchFrame, CoreState, CoreTimer, Fault, FaultHandler, FpuContext,
    FpuControl, Hart, IrqControl, IrqState, LazyFpu, Machine, PlatformConfig, PowerManagement,
    RegisterFile, Scheduler, SoftwareInterrupt, StackError, TaskExit, ThreadEntry, ThreadError,
    ThreadFlags, ThreadId, ThreadParams, TimerConfig, TimerError, TrapCause, TrapInfo, CORE,
};

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub use arch::riscv::{
    cpu_init, cpu_switch_context_exit, fpu_init, irq_disable, irq_enable, irq_restore,
    thread_yield_higher, MachineIrq, RocketChip, Wfi,
};
