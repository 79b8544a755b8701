//! # rvrt Kernel Core
//!
//! Platform-independent bring-up of the rvrt real-time kernel. The core
//! creates the two threads every system has, idle and main, and hands the
//! CPU to the scheduler. Everything architecture-specific lives in
//! `rvrt-hal`.
//!
//! ## Components
//!
//! - **Boot**: `kernel_init`, the idle thread and the main trampoline
//! - **Panic Handler**: last-resort diagnostics and halt

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod boot;
pub mod panic;

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use rvrt_hal::ThreadError;

/// Kernel version reported in the boot banner
pub const KERNEL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Kernel state enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum KernelState {
    /// Before `kernel_init`
    EarlyBoot    = 0,
    /// Boot threads being created
    Initializing = 1,
    /// Main thread started
    Running      = 2,
    /// Kernel is in panic state
    Panic        = 3,
}

impl From<u32> for KernelState {
    fn from(value: u32) -> Self {
        match value {
            0 => KernelState::EarlyBoot,
            1 => KernelState::Initializing,
            2 => KernelState::Running,
            _ => KernelState::Panic,
        }
    }
}

static KERNEL_STATE: AtomicU32 = AtomicU32::new(KernelState::EarlyBoot as u32);

/// Get the current kernel state
pub fn kernel_state() -> KernelState {
    KernelState::from(KERNEL_STATE.load(Ordering::SeqCst))
}

pub(crate) fn set_kernel_state(state: KernelState) {
    KERNEL_STATE.store(state as u32, Ordering::SeqCst);
}

/// Result type for kernel operations
pub type KernelResult<T> = Result<T, KernelError>;

/// Kernel bring-up errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No scheduler installed in the core state
    SchedulerMissing,
    /// Boot stacks were already handed out
    ResourcesTaken,
    /// A boot thread could not be created
    Thread(ThreadError),
}

impl From<ThreadError> for KernelError {
    fn from(err: ThreadError) -> Self {
        KernelError::Thread(err)
    }
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KernelError::SchedulerMissing => f.write_str("no scheduler installed"),
            KernelError::ResourcesTaken => f.write_str("boot resources already taken"),
            KernelError::Thread(err) => write!(f, "thread creation failed: {}", err),
        }
    }
}
