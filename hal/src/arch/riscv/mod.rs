//! # RISC-V Machine-Mode HAL
//!
//! Architecture layer of a single-hart, M-mode real-time kernel on RV64GC
//! (rocketchip) and RV32 cores.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         rvrt - RISC-V HAL                            │
//! ├─────────────────────────────────────────────────────────────────────┤
//! │                                                                      │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────┐ ┌─────────────┐    │
//! │  │    Core     │ │  Privilege  │ │   Context   │ │ Interrupts  │    │
//! │  │             │ │             │ │             │ │             │    │
//! │  │• CSRs       │ │• Entry asm  │ │• Frame      │ │• MIE        │    │
//! │  │• FPU regs   │ │• Dispatch   │ │• Stack init │ │• MSIP yield │    │
//! │  │• CPU id     │ │• Insn decode│ │• Stack scan │ │• PLIC       │    │
//! │  └─────────────┘ └─────────────┘ └─────────────┘ └─────────────┘    │
//! │                                                                      │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────┐                    │
//! │  │   Timers    │ │  Lazy FPU   │ │    State    │                    │
//! │  │             │ │             │ │             │                    │
//! │  │• MTIME      │ │• Ownership  │ │• CoreState  │                    │
//! │  │• MTIMECMP   │ │• Save/load  │ │• Scheduler  │                    │
//! │  │• Spurious   │ │• Ext. check │ │• Faults     │                    │
//! │  └─────────────┘ └─────────────┘ └─────────────┘                    │
//! │                                                                      │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`core`]: CSRs, floating-point register file, CPU identification
//! - [`context`]: saved thread frame and stack bootstrap
//! - [`privilege`]: trap entry, dispatch and instruction decoding
//! - [`interrupts`]: global enable, software interrupt, PLIC routing
//! - [`timers`]: core timer driver
//! - [`fpu`]: lazy FPU context switching
//! - [`state`]: shared trap state and scheduler interface
//! - [`fault`]: fatal fault taxonomy and handler
//! - [`cpu`]: boot-time initialization
//! - [`pm`]: power management

// =============================================================================
// CORE FRAMEWORK
// =============================================================================

pub mod core;

// =============================================================================
// THREAD CONTEXT
// =============================================================================

pub mod context;

// =============================================================================
// PRIVILEGE LEVEL FRAMEWORK
// =============================================================================

pub mod privilege;

// =============================================================================
// INTERRUPT FRAMEWORK
// =============================================================================

pub mod interrupts;

// =============================================================================
// TIMER FRAMEWORK
// =============================================================================

pub mod timers;

// =============================================================================
// KERNEL SERVICES
// =============================================================================

pub mod cpu;
pub mod fault;
pub mod fpu;
pub mod platform;
pub mod pm;
pub mod state;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use self::context::{stack_init, ContextSwitchFrame, StackError, TaskExit, ThreadEntry};
pub use self::core::csr::TrapCause;
pub use self::core::fpu::{FpuContext, FpuControl, RegisterFile};
pub use self::fault::{Fault, FaultHandler, TrapInfo};
pub use self::fpu::LazyFpu;
pub use self::interrupts::{irq_is_in, IrqControl, IrqState, SoftwareInterrupt};
pub use self::platform::PlatformConfig;
pub use self::pm::PowerManagement;
pub use self::privilege::{Hart, Machine};
pub use self::state::{
    CoreState, Scheduler, ThreadError, ThreadFlags, ThreadId, ThreadParams, CORE,
};
pub use self::timers::{CoreTimer, TimerConfig, TimerError};

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub use self::{
    cpu::{cpu_init, cpu_switch_context_exit, fpu_init, RocketChip},
    interrupts::{irq_disable, irq_enable, irq_restore, thread_yield_higher, MachineIrq},
    pm::Wfi,
};
