//! # Panic Handler
//!
//! Last-resort diagnostics. A panic masks interrupts so the scheduler can
//! no longer switch away, logs where it happened and halts the hart.

use core::fmt;
use core::panic::{Location, PanicInfo};
use core::sync::atomic::{AtomicUsize, Ordering};

use crate::{set_kernel_state, KernelState};

/// Maximum number of nested panics before giving up
const MAX_PANIC_DEPTH: usize = 3;

static PANIC_DEPTH: AtomicUsize = AtomicUsize::new(0);

/// Record a panic and log it. Returns `false` when panics nest too deep
/// to log anything safely.
pub fn report_panic(location: Option<&Location<'_>>, message: &dyn fmt::Display) -> bool {
    let depth = PANIC_DEPTH.fetch_add(1, Ordering::SeqCst);
    if depth >= MAX_PANIC_DEPTH {
        return false;
    }

    set_kernel_state(KernelState::Panic);

    if let Some(location) = location {
        log::error!(
            "KERNEL PANIC at {}:{}:{}",
            location.file(),
            location.line(),
            location.column()
        );
    }
    log::error!("Message: {}", message);
    true
}

/// The kernel panic handler
pub fn kernel_panic_handler(info: &PanicInfo<'_>) -> ! {
    #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
    let _ = rvrt_hal::irq_disable();

    if report_panic(info.location(), &info.message()) {
        log::error!("System halted");
    }
    rvrt_hal::fault::halt()
}

#[cfg(all(not(test), target_os = "none"))]
#[panic_handler]
fn panic(info: &PanicInfo<'_>) -> ! {
    kernel_panic_handler(info)
}
