//! # Machine-Mode Trap Handling
//!
//! - [`entry`]: assembly vector saving and restoring thread frames
//! - [`traps`]: cause decoding and dispatch
//! - [`insn`]: decoding of illegal instructions for lazy FPU switching

#[cfg(all(any(target_arch = "riscv32", target_arch = "riscv64"), target_os = "none"))]
pub mod entry;
pub mod insn;
pub mod traps;

pub use insn::{FpuAccess, Instruction, InstructionMemory, RawMemory};
pub use traps::{Hart, Machine};
