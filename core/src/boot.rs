//! # Kernel Bring-Up
//!
//! `kernel_init` runs once on the boot stack with the hardware already
//! initialized. It creates the idle and main threads and switches to the
//! scheduler; the boot stack is never returned to.
//!
//! ```text
//! kernel_init
//!   ├─ irq_disable
//!   ├─ create idle  (prio 15, 1024 B)   wfi forever
//!   ├─ create main  (prio 7,  9216 B)   auto init → banner → app main
//!   └─ cpu_switch_context_exit
//! ```

use core::ptr::{self, addr_of_mut};
use core::sync::atomic::{AtomicBool, Ordering};

use rvrt_hal::{
    FpuContext, IrqControl, PowerManagement, Scheduler, ThreadEntry, ThreadFlags, ThreadId,
    ThreadParams,
};

use crate::{set_kernel_state, KernelResult, KernelState, KERNEL_VERSION};

// ============================================================================
// Thread Configuration
// ============================================================================

/// Number of scheduler priority levels
pub const SCHED_PRIO_LEVELS: u8 = 16;

/// Priority of the idle thread (lowest)
pub const THREAD_PRIORITY_IDLE: u8 = SCHED_PRIO_LEVELS - 1;

/// Priority of the main thread
pub const THREAD_PRIORITY_MAIN: u8 = THREAD_PRIORITY_IDLE / 2;

/// Idle thread stack size
pub const IDLE_STACK_SIZE: usize = 1024;

/// Main thread stack size
pub const MAIN_STACK_SIZE: usize = 9216;

/// Creation flags of both boot threads
pub const BOOT_THREAD_FLAGS: ThreadFlags =
    ThreadFlags::WITHOUT_YIELD.union(ThreadFlags::STACKTEST);

/// Idle thread name
pub const IDLE_NAME: &str = "idle";

/// Main thread name
pub const MAIN_NAME: &str = "main";

// ============================================================================
// Application
// ============================================================================

/// What the main thread runs
#[derive(Debug, Clone, Copy)]
pub struct Application {
    /// Deferred module initialization, run before `main`
    pub auto_init: Option<fn()>,
    /// Application entry point
    pub main: fn(),
}

/// Entry of the main thread; `arg` is the `&'static Application`
pub extern "C" fn main_trampoline(arg: *mut ()) -> *mut () {
    // SAFETY: create_boot_threads passes a `&'static Application`.
    let app = unsafe { &*(arg as *const Application) };

    if let Some(auto_init) = app.auto_init {
        auto_init();
    }

    set_kernel_state(KernelState::Running);
    log::info!("main(): This is rvrt! (Version: {})", KERNEL_VERSION);

    (app.main)();
    ptr::null_mut()
}

/// Body of the idle thread
pub fn idle_loop<P: PowerManagement>(pm: &mut P) -> ! {
    loop {
        pm.set_lowest();
    }
}

extern "C" fn idle_thread(_arg: *mut ()) -> *mut () {
    #[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
    idle_loop(&mut rvrt_hal::Wfi);

    #[cfg(not(any(target_arch = "riscv32", target_arch = "riscv64")))]
    loop {
        core::hint::spin_loop();
    }
}

// ============================================================================
// Boot Resources
// ============================================================================

#[repr(C, align(16))]
struct Stack<const N: usize>([u8; N]);

static mut IDLE_STACK: Stack<IDLE_STACK_SIZE> = Stack([0; IDLE_STACK_SIZE]);
static mut MAIN_STACK: Stack<MAIN_STACK_SIZE> = Stack([0; MAIN_STACK_SIZE]);
static mut MAIN_FPU: FpuContext = FpuContext::new();

static RESOURCES_TAKEN: AtomicBool = AtomicBool::new(false);

/// Memory of the boot threads
pub struct BootResources {
    /// Idle thread stack
    pub idle_stack: &'static mut [u8],
    /// Main thread stack
    pub main_stack: &'static mut [u8],
    /// Floating-point save area of the main thread
    pub main_fpu: Option<&'static mut FpuContext>,
}

impl core::fmt::Debug for BootResources {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BootResources")
            .field("idle_stack", &self.idle_stack.len())
            .field("main_stack", &self.main_stack.len())
            .field("main_fpu", &self.main_fpu.is_some())
            .finish()
    }
}

impl BootResources {
    /// Hand out the static boot memory; `None` after the first call
    pub fn take() -> Option<Self> {
        if RESOURCES_TAKEN.swap(true, Ordering::AcqRel) {
            return None;
        }

        // SAFETY: the flag above grants exclusive access exactly once.
        unsafe {
            Some(Self {
                idle_stack: &mut (*addr_of_mut!(IDLE_STACK)).0,
                main_stack: &mut (*addr_of_mut!(MAIN_STACK)).0,
                main_fpu: if cfg!(feature = "lazy-fpu") {
                    Some(&mut *addr_of_mut!(MAIN_FPU))
                } else {
                    None
                },
            })
        }
    }
}

// ============================================================================
// Kernel Init
// ============================================================================

/// Create the idle and main threads with interrupts disabled.
///
/// Returns the ids of idle and main. Interrupts stay disabled; the caller
/// enables them with the first context switch.
pub fn create_boot_threads(
    scheduler: &dyn Scheduler,
    irq: &dyn IrqControl,
    resources: BootResources,
    app: &'static Application,
) -> KernelResult<(ThreadId, ThreadId)> {
    let _ = irq.disable();
    set_kernel_state(KernelState::Initializing);

    let idle = scheduler.create_thread(ThreadParams {
        name: IDLE_NAME,
        stack: resources.idle_stack,
        fpu: None,
        priority: THREAD_PRIORITY_IDLE,
        flags: BOOT_THREAD_FLAGS,
        entry: idle_thread as ThreadEntry,
        arg: ptr::null_mut(),
    })?;

    let main = scheduler.create_thread(ThreadParams {
        name: MAIN_NAME,
        stack: resources.main_stack,
        fpu: resources.main_fpu,
        priority: THREAD_PRIORITY_MAIN,
        flags: BOOT_THREAD_FLAGS,
        entry: main_trampoline as ThreadEntry,
        arg: app as *const Application as *mut (),
    })?;

    log::debug!("boot threads: idle {} main {}", idle, main);
    Ok((idle, main))
}

/// Start the kernel: create the boot threads and switch to the scheduler
#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub fn kernel_init(app: &'static Application) -> ! {
    let result = rvrt_hal::CORE
        .scheduler()
        .ok_or(crate::KernelError::SchedulerMissing)
        .and_then(|scheduler| {
            let resources = BootResources::take().ok_or(crate::KernelError::ResourcesTaken)?;
            create_boot_threads(scheduler, &rvrt_hal::MachineIrq, resources, app)
        });

    if let Err(err) = result {
        panic!("kernel_init: {}", err);
    }
    rvrt_hal::cpu_switch_context_exit()
}
