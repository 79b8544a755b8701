//! # Architecture Support
//!
//! Only RISC-V is supported. The module builds on every host so the
//! hardware-independent logic can be unit tested; instructions and CSR
//! accesses are compiled in for RISC-V targets only.

pub mod riscv;
