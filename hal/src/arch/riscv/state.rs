//! # Core State
//!
//! Everything the trap path shares across invocations lives in one
//! [`CoreState`]: the in-interrupt flag, the FPU owner, the external
//! interrupt table, the timer callback and the installed scheduler and
//! fault handler. The kernel uses the [`CORE`] instance; tests build a
//! fresh one per case.
//!
//! ## Lifecycle
//!
//! `cpu_init` resets the hardware-facing parts, the scheduler and fault
//! handler are installed once at boot, and from then on the state is only
//! touched by trap handlers and the thread creation hook.

use core::fmt;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicBool, Ordering};

use super::context::frame::ContextSwitchFrame;
use super::context::stack::{stack_init, StackError, TaskExit, ThreadEntry};
use super::core::fpu::FpuContext;
use super::fault::{FaultHandler, HALT_ON_FAULT};
use super::fpu::LazyFpu;
use super::interrupts::irq::{ExternalIrqTable, ExternalIsr, IrqError};
use super::platform::PlatformConfig;
use super::timers::mtime::{CoreTimer, TimerConfig};

// ============================================================================
// Threads
// ============================================================================

/// Scheduler-assigned thread identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub usize);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags::bitflags! {
    /// Thread creation flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ThreadFlags: u16 {
        /// Do not make the thread runnable
        const SLEEPING = 1 << 0;
        /// Do not yield to the new thread even if it has higher priority
        const WITHOUT_YIELD = 1 << 2;
        /// Fill the stack with a pattern to measure its usage
        const STACKTEST = 1 << 3;
    }
}

/// Everything needed to create a thread
pub struct ThreadParams {
    /// Thread name
    pub name: &'static str,
    /// Stack memory
    pub stack: &'static mut [u8],
    /// Floating-point save area, if the thread may use the FPU
    pub fpu: Option<&'static mut FpuContext>,
    /// Priority, lower value runs first
    pub priority: u8,
    /// Creation flags
    pub flags: ThreadFlags,
    /// Entry point
    pub entry: ThreadEntry,
    /// Argument passed in a0
    pub arg: *mut (),
}

impl fmt::Debug for ThreadParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadParams")
            .field("name", &self.name)
            .field("stack_size", &self.stack.len())
            .field("fpu", &self.fpu.is_some())
            .field("priority", &self.priority)
            .field("flags", &self.flags)
            .finish()
    }
}

/// Thread creation errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadError {
    /// No free thread slot
    NoFreeSlot,
    /// Priority outside the scheduler's range
    InvalidPriority(u8),
    /// Stack setup failed
    Stack(StackError),
}

impl From<StackError> for ThreadError {
    fn from(err: StackError) -> Self {
        ThreadError::Stack(err)
    }
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::NoFreeSlot => f.write_str("no free thread slot"),
            ThreadError::InvalidPriority(prio) => write!(f, "invalid priority {}", prio),
            ThreadError::Stack(err) => write!(f, "{}", err),
        }
    }
}

// ============================================================================
// Scheduler Interface
// ============================================================================

/// The kernel scheduler as seen from the architecture layer
///
/// # Safety
/// Context pointers returned by [`Scheduler::fpu_context`] must stay valid
/// while the thread exists and must not be accessed by anyone else while a
/// trap handler runs.
pub unsafe trait Scheduler: Sync {
    /// Thread currently running, `None` before threading starts
    fn active_thread(&self) -> Option<ThreadId>;

    /// Floating-point save area of `thread`
    fn fpu_context(&self, thread: ThreadId) -> Option<NonNull<FpuContext>>;

    /// Create a thread; implementations call [`CoreState::prepare_thread`]
    fn create_thread(&self, params: ThreadParams) -> Result<ThreadId, ThreadError>;

    /// Save `sp` for the running thread, pick the next one and return its
    /// stack pointer
    fn switch_context(&self, sp: usize) -> usize;

    /// Landing address for thread functions that return
    fn task_exit(&self) -> TaskExit;
}

// ============================================================================
// Core State
// ============================================================================

/// Per-hart state shared by the trap handlers
pub struct CoreState {
    in_isr: AtomicBool,
    fpu: LazyFpu,
    irq: ExternalIrqTable,
    timer: CoreTimer,
    scheduler: spin::Once<&'static dyn Scheduler>,
    fault_handler: spin::Once<&'static dyn FaultHandler>,
}

/// State of the running hart
pub static CORE: CoreState =
    CoreState::new(TimerConfig::from_platform(&PlatformConfig::ROCKETCHIP64));

impl fmt::Debug for CoreState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreState")
            .field("in_isr", &self.in_isr())
            .field("fpu", &self.fpu)
            .field("irq", &self.irq)
            .field("timer", &self.timer)
            .field("scheduler", &self.scheduler.is_completed())
            .finish()
    }
}

impl CoreState {
    /// Fresh state with nothing installed
    pub const fn new(timer: TimerConfig) -> Self {
        Self {
            in_isr: AtomicBool::new(false),
            fpu: LazyFpu::new(),
            irq: ExternalIrqTable::new(),
            timer: CoreTimer::new(timer),
            scheduler: spin::Once::new(),
            fault_handler: spin::Once::new(),
        }
    }

    /// Is an interrupt being serviced?
    #[inline]
    pub fn in_isr(&self) -> bool {
        self.in_isr.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn set_in_isr(&self, value: bool) {
        self.in_isr.store(value, Ordering::Release);
    }

    /// Lazy FPU ownership
    #[inline]
    pub fn fpu(&self) -> &LazyFpu {
        &self.fpu
    }

    /// External interrupt routing table
    #[inline]
    pub fn irq(&self) -> &ExternalIrqTable {
        &self.irq
    }

    /// Core timer driver
    #[inline]
    pub fn timer(&self) -> &CoreTimer {
        &self.timer
    }

    /// Install the scheduler; only the first call has an effect
    pub fn install_scheduler(&self, scheduler: &'static dyn Scheduler) {
        self.scheduler.call_once(|| scheduler);
    }

    /// Installed scheduler
    #[inline]
    pub fn scheduler(&self) -> Option<&'static dyn Scheduler> {
        self.scheduler.get().copied()
    }

    /// Install the fault handler; only the first call has an effect
    pub fn install_fault_handler(&self, handler: &'static dyn FaultHandler) {
        self.fault_handler.call_once(|| handler);
    }

    /// Installed fault handler, [`HALT_ON_FAULT`] by default
    #[inline]
    pub fn fault_handler(&self) -> &'static dyn FaultHandler {
        self.fault_handler.get().copied().unwrap_or(&HALT_ON_FAULT)
    }

    /// Route external interrupt `source` to `callback`
    pub fn register_external_isr(
        &self,
        source: usize,
        callback: ExternalIsr,
    ) -> Result<(), IrqError> {
        self.irq.register(source, callback)
    }

    /// Prepare the FPU save area of a thread created with id `pid`.
    ///
    /// Ownership is revoked if the previous holder of `pid` still owns the
    /// FPU, so the new thread never inherits its registers.
    pub fn thread_fpu_context_init(&self, ctx: Option<&mut FpuContext>, pid: ThreadId) {
        self.fpu.disown(pid);
        if let Some(ctx) = ctx {
            ctx.clear();
        }
    }

    /// Architecture part of thread creation: FPU area and initial frame
    pub fn prepare_thread(
        &self,
        pid: ThreadId,
        params: &mut ThreadParams,
        exit: TaskExit,
    ) -> Result<NonNull<ContextSwitchFrame>, StackError> {
        self.thread_fpu_context_init(params.fpu.as_deref_mut(), pid);
        stack_init(params.entry, params.arg, params.stack, exit)
    }
}
