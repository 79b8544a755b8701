//! # Core CPU Registers
//!
//! CSR access, floating-point register file and hart identification.

pub mod cpuid;
pub mod csr;
pub mod fpu;
