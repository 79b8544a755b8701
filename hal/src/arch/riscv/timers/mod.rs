//! # Core Timer
//!
//! Board-facing timer API. These wrappers bind the [`mtime::CoreTimer`]
//! driver held in the global core state to the CLINT of the running board
//! and report errors as C-style status codes.

pub mod mtime;

pub use mtime::{CoreTimer, TimerCallback, TimerConfig, TimerError, TimerEvent, TimerHw};

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
mod board {
    use super::mtime::{ClintTimer, TimerCallback};
    use crate::arch::riscv::platform::PlatformConfig;
    use crate::arch::riscv::state::CORE;

    fn clint() -> ClintTimer {
        // SAFETY: the board runs on the rocketchip memory map.
        unsafe { ClintTimer::from_config(&PlatformConfig::ROCKETCHIP64) }
    }

    fn status(result: Result<(), super::TimerError>) -> i32 {
        match result {
            Ok(()) => 0,
            Err(err) => err.status(),
        }
    }

    /// Register the callback of timer `dev`
    pub fn timer_init(dev: usize, freq: u64, cb: TimerCallback, arg: *mut ()) -> i32 {
        status(CORE.timer().init(&mut clint(), dev, freq, cb, arg))
    }

    /// Fire `timeout` ticks from now
    pub fn timer_set(dev: usize, channel: usize, timeout: u64) -> i32 {
        status(CORE.timer().set(&mut clint(), dev, channel, timeout))
    }

    /// Fire at counter value `value`
    pub fn timer_set_absolute(dev: usize, channel: usize, value: u64) -> i32 {
        status(CORE.timer().set_absolute(&mut clint(), dev, channel, value))
    }

    /// Clear a channel
    pub fn timer_clear(dev: usize, channel: usize) -> i32 {
        status(CORE.timer().clear(dev, channel))
    }

    /// Current counter value
    pub fn timer_read(dev: usize) -> u64 {
        CORE.timer().read(&clint(), dev)
    }

    /// Unmask the timer interrupt
    pub fn timer_start(dev: usize) {
        CORE.timer().start(&mut clint(), dev);
    }

    /// Mask the timer interrupt
    pub fn timer_stop(dev: usize) {
        CORE.timer().stop(&mut clint(), dev);
    }
}

#[cfg(any(target_arch = "riscv32", target_arch = "riscv64"))]
pub use board::*;
