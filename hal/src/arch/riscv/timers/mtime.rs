//! # Machine Timer (MTIME / MTIMECMP)
//!
//! One free-running 64-bit counter and one comparator make up the only
//! timer channel of the core. The machine timer interrupt stays pending as
//! long as `mtime >= mtimecmp`.
//!
//! ## Spurious Interrupts
//!
//! Writing the comparator can leave a stale pending edge behind, so the
//! ISR may run before the counter has reached the deadline. The ISR then
//! polls the counter for at most [`TimerConfig::spurious_spin_budget`]
//! ticks. A deadline further away than that is treated as spurious: the
//! pending condition is cleared and no callback runs.

use core::fmt;

use crate::arch::riscv::platform::{
    PlatformConfig, RV_CORE_TIMER_FREQ, SPURIOUS_TIMER_ISR_MAX_SPIN, TIMER_CHANNEL_NUMOF,
    TIMER_NUMOF,
};

// ============================================================================
// Hardware Interface
// ============================================================================

/// Register-level access to the machine timer
pub trait TimerHw {
    /// Current counter value
    fn counter(&self) -> u64;

    /// Current comparator value
    fn comparator(&self) -> u64;

    /// Program the comparator
    fn set_comparator(&mut self, value: u64);

    /// Drop a pending timer interrupt without moving the deadline
    fn clear_pending(&mut self);

    /// Set or clear the timer interrupt enable bit (mie.MTIE)
    fn set_interrupt_enabled(&mut self, enabled: bool);

    /// State of the timer interrupt enable bit
    fn interrupt_enabled(&self) -> bool;
}

/// Read a 64-bit counter exposed as two 32-bit halves.
///
/// The high half is read before and after the low half; a mismatch means
/// the low half rolled over in between and the read is repeated.
pub fn read_split_counter(mut hi: impl FnMut() -> u32, mut lo: impl FnMut() -> u32) -> u64 {
    loop {
        let high = hi();
        let low = lo();
        if hi() == high {
            return (u64::from(high) << 32) | u64::from(low);
        }
    }
}

/// Write a 64-bit comparator exposed as two 32-bit halves.
///
/// The low half is parked at its maximum first so no intermediate value
/// can lie below the counter.
pub fn write_split_comparator(value: u64, mut lo: impl FnMut(u32), mut hi: impl FnMut(u32)) {
    lo(u32::MAX);
    hi((value >> 32) as u32);
    lo(value as u32);
}

// ============================================================================
// CLINT Timer
// ============================================================================

/// Memory-mapped MTIME/MTIMECMP pair of the CLINT
#[derive(Debug)]
pub struct ClintTimer {
    mtime: usize,
    mtimecmp: usize,
}

impl ClintTimer {
    /// Create a timer for the given register addresses
    ///
    /// # Safety
    /// Both addresses must be the hart's MTIME and MTIMECMP registers.
    pub const unsafe fn new(mtime: usize, mtimecmp: usize) -> Self {
        Self { mtime, mtimecmp }
    }

    /// Timer of the given platform
    ///
    /// # Safety
    /// `config` must describe the running hardware.
    pub const unsafe fn from_config(config: &PlatformConfig) -> Self {
        Self {
            mtime: config.mtime_addr(),
            mtimecmp: config.mtimecmp_addr(),
        }
    }
}

#[cfg(all(
    any(target_arch = "riscv32", target_arch = "riscv64"),
    target_pointer_width = "64"
))]
impl ClintTimer {
    #[inline]
    fn read_mtime(&self) -> u64 {
        unsafe { core::ptr::read_volatile(self.mtime as *const u64) }
    }

    #[inline]
    fn read_mtimecmp(&self) -> u64 {
        unsafe { core::ptr::read_volatile(self.mtimecmp as *const u64) }
    }

    #[inline]
    fn write_mtimecmp(&mut self, value: u64) {
        unsafe { core::ptr::write_volatile(self.mtimecmp as *mut u64, value) }
    }

    #[inline]
    fn rewrite_mtimecmp(&mut self) {
        let value = self.read_mtimecmp();
        self.write_mtimecmp(value);
    }
}

#[cfg(all(
    any(target_arch = "riscv32", target_arch = "riscv64"),
    target_pointer_width = "32"
))]
impl ClintTimer {
    #[inline]
    fn half(addr: usize, high: bool) -> *mut u32 {
        (if high { addr + 4 } else { addr }) as *mut u32
    }

    fn read_mtime(&self) -> u64 {
        use core::ptr::read_volatile;
        read_split_counter(
            || unsafe { read_volatile(Self::half(self.mtime, true)) },
            || unsafe { read_volatile(Self::half(self.mtime, false)) },
        )
    }

    fn read_mtimecmp(&self) -> u64 {
        use core::ptr::read_volatile;
        let (hi, lo) = unsafe {
            (
                read_volatile(Self::half(self.mtimecmp, true)),
                read_volatile(Self::half(self.mtimecmp, false)),
            )
        };
        (u64::from(hi) << 32) | u64::from(lo)
    }

    fn write_mtimecmp(&mut self, value: u64) {
        use core::ptr::write_volatile;
        let cmp = self.mtimecmp;
        write_split_comparator(
            value,
            |lo| unsafe { write_volatile(Self::half(cmp, false), lo) },
            |hi| unsafe { write_volatile(Self::half(cmp, true), hi) },
        );
    }

    fn rewrite_mtimecmp(&mut self) {
        let hi = Self::half(self.mtimecmp, true);
        unsafe { core::ptr::write_volatile(hi, core::ptr::read_volatile(hi)) }
    }
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
impl TimerHw for ClintTimer {
    fn counter(&self) -> u64 {
        self.read_mtime()
    }

    fn comparator(&self) -> u64 {
        self.read_mtimecmp()
    }

    fn set_comparator(&mut self, value: u64) {
        self.write_mtimecmp(value);
    }

    fn clear_pending(&mut self) {
        self.rewrite_mtimecmp();
    }

    fn set_interrupt_enabled(&mut self, enabled: bool) {
        use crate::arch::riscv::core::csr::{self, MachineInterrupts};
        if enabled {
            csr::mie_set(MachineInterrupts::MTIE.bits());
        } else {
            csr::mie_clear(MachineInterrupts::MTIE.bits());
        }
    }

    fn interrupt_enabled(&self) -> bool {
        use crate::arch::riscv::core::csr::{self, MachineInterrupts};
        MachineInterrupts::from_bits_truncate(csr::mie()).contains(MachineInterrupts::MTIE)
    }
}

// ============================================================================
// Driver
// ============================================================================

/// Timer callback, receives the registered argument and the channel
pub type TimerCallback = fn(arg: *mut (), channel: usize);

/// Timer driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerConfig {
    /// The only frequency `init` accepts, in Hz
    pub frequency: u64,
    /// Largest distance in ticks between counter and comparator for which
    /// the ISR still waits for the deadline instead of declaring the
    /// interrupt spurious. Must cover the latency between the comparator
    /// match and the ISR's first counter read.
    pub spurious_spin_budget: u64,
}

impl TimerConfig {
    /// Rocketchip core timer
    pub const DEFAULT: Self = Self {
        frequency: RV_CORE_TIMER_FREQ,
        spurious_spin_budget: SPURIOUS_TIMER_ISR_MAX_SPIN,
    };

    /// Timer configuration of a platform
    pub const fn from_platform(config: &PlatformConfig) -> Self {
        Self {
            frequency: config.timer_frequency,
            spurious_spin_budget: config.timer_spin_budget,
        }
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Timer driver errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// No such timer device
    InvalidDevice(usize),
    /// No such channel on the device
    InvalidChannel(usize),
    /// Device cannot run at the requested frequency
    UnsupportedFrequency(u64),
}

impl TimerError {
    /// C-style status code
    pub const fn status(&self) -> i32 {
        -1
    }
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::InvalidDevice(dev) => write!(f, "invalid timer device {}", dev),
            TimerError::InvalidChannel(ch) => write!(f, "invalid timer channel {}", ch),
            TimerError::UnsupportedFrequency(hz) => write!(f, "unsupported frequency {} Hz", hz),
        }
    }
}

/// Outcome of one timer interrupt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// Deadline reached, callback invoked
    Fired,
    /// Interrupt did not correspond to a reached deadline
    Spurious,
}

#[derive(Clone, Copy)]
struct TimerSlot {
    callback: TimerCallback,
    arg: *mut (),
}

// SAFETY: the argument is only handed back to the registered callback.
unsafe impl Send for TimerSlot {}

/// Core timer driver state: the registered callback and its argument
pub struct CoreTimer {
    config: TimerConfig,
    slot: spin::Mutex<Option<TimerSlot>>,
}

impl fmt::Debug for CoreTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("CoreTimer");
        out.field("config", &self.config);
        // Never spin here, the timer ISR may hold the slot
        match self.slot.try_lock() {
            Some(slot) => out.field("registered", &slot.is_some()),
            None => out.field("registered", &format_args!("<locked>")),
        };
        out.finish()
    }
}

impl CoreTimer {
    /// Driver without a callback
    pub const fn new(config: TimerConfig) -> Self {
        Self {
            config,
            slot: spin::Mutex::new(None),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    fn check_device(dev: usize) -> Result<(), TimerError> {
        if dev < TIMER_NUMOF {
            Ok(())
        } else {
            Err(TimerError::InvalidDevice(dev))
        }
    }

    fn check_channel(dev: usize, channel: usize) -> Result<(), TimerError> {
        Self::check_device(dev)?;
        if channel < TIMER_CHANNEL_NUMOF {
            Ok(())
        } else {
            Err(TimerError::InvalidChannel(channel))
        }
    }

    /// Register the callback of timer `dev`
    pub fn init<T: TimerHw>(
        &self,
        hw: &mut T,
        dev: usize,
        frequency: u64,
        callback: TimerCallback,
        arg: *mut (),
    ) -> Result<(), TimerError> {
        Self::check_device(dev)?;
        if frequency != self.config.frequency {
            return Err(TimerError::UnsupportedFrequency(frequency));
        }

        // The ISR takes the slot lock, keep it out while the slot changes
        let enabled = hw.interrupt_enabled();
        hw.set_interrupt_enabled(false);
        *self.slot.lock() = Some(TimerSlot { callback, arg });
        hw.set_interrupt_enabled(enabled);

        log::debug!("timer {}: {} Hz", dev, frequency);
        Ok(())
    }

    /// Fire `timeout` ticks from now
    pub fn set<T: TimerHw>(
        &self,
        hw: &mut T,
        dev: usize,
        channel: usize,
        timeout: u64,
    ) -> Result<(), TimerError> {
        let then = hw.counter().wrapping_add(timeout);
        Self::check_channel(dev, channel)?;
        Self::program(hw, then);
        Ok(())
    }

    /// Fire when the counter reaches `value`
    pub fn set_absolute<T: TimerHw>(
        &self,
        hw: &mut T,
        dev: usize,
        channel: usize,
        value: u64,
    ) -> Result<(), TimerError> {
        Self::check_channel(dev, channel)?;
        Self::program(hw, value);
        Ok(())
    }

    fn program<T: TimerHw>(hw: &mut T, value: u64) {
        hw.set_interrupt_enabled(false);
        hw.set_comparator(value);
        hw.set_interrupt_enabled(true);
    }

    /// Channel clear; the comparator is left untouched
    pub fn clear(&self, dev: usize, channel: usize) -> Result<(), TimerError> {
        Self::check_channel(dev, channel)
    }

    /// Current counter value, 0 for unknown devices
    pub fn read<T: TimerHw>(&self, hw: &T, dev: usize) -> u64 {
        if Self::check_device(dev).is_err() {
            return 0;
        }
        hw.counter()
    }

    /// Unmask the timer interrupt
    pub fn start<T: TimerHw>(&self, hw: &mut T, dev: usize) {
        if Self::check_device(dev).is_ok() {
            hw.set_interrupt_enabled(true);
        }
    }

    /// Mask the timer interrupt
    pub fn stop<T: TimerHw>(&self, hw: &mut T, dev: usize) {
        if Self::check_device(dev).is_ok() {
            hw.set_interrupt_enabled(false);
        }
    }

    /// Machine timer interrupt service routine
    pub fn isr<T: TimerHw>(&self, hw: &mut T) -> TimerEvent {
        hw.set_interrupt_enabled(false);
        let mut now = hw.counter();
        let deadline = hw.comparator();

        while now < deadline {
            now = hw.counter();
            if now.saturating_add(self.config.spurious_spin_budget) < deadline {
                log::trace!("spurious timer interrupt: now {} deadline {}", now, deadline);
                hw.clear_pending();
                hw.set_interrupt_enabled(true);
                return TimerEvent::Spurious;
            }
        }

        hw.set_comparator(u64::MAX);
        let slot = *self.slot.lock();
        if let Some(slot) = slot {
            (slot.callback)(slot.arg, 0);
        }
        hw.set_interrupt_enabled(true);
        TimerEvent::Fired
    }
}
