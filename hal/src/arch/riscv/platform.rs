//! # Platform Constants
//!
//! Fixed memory map and sizing of the supported boards. Everything the
//! drivers need to locate hardware is collected in one [`PlatformConfig`]
//! so a board only has to pick a configuration.

// ============================================================================
// Memory Map (rocketchip, SiFive-compatible CLINT/PLIC)
// ============================================================================

/// Core-local interruptor base
pub const CLINT_CTRL_ADDR: usize = 0x0200_0000;
/// MSIP register offset within the CLINT
pub const CLINT_MSIP: usize = 0x0000;
/// MTIMECMP register offset within the CLINT
pub const CLINT_MTIMECMP: usize = 0x4000;
/// MTIME register offset within the CLINT
pub const CLINT_MTIME: usize = 0xBFF8;

/// Platform-level interrupt controller base
pub const PLIC_CTRL_ADDR: usize = 0x0C00_0000;
/// Number of external interrupt source ids (id 0 is reserved)
pub const PLIC_NUM_INTERRUPTS: usize = 52;
/// Number of usable priority levels
pub const PLIC_NUM_PRIORITIES: u32 = 7;

/// Core timer frequency in Hz
pub const RV_CORE_TIMER_FREQ: u64 = 1_000_000;
/// Number of core timer devices
pub const TIMER_NUMOF: usize = 1;
/// Channels per core timer device
pub const TIMER_CHANNEL_NUMOF: usize = 1;

/// Ticks the timer ISR may wait for the counter to reach the comparator
pub const SPURIOUS_TIMER_ISR_MAX_SPIN: u64 = 10;

// ============================================================================
// Platform Configuration
// ============================================================================

/// Board-level hardware description
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlatformConfig {
    /// CLINT base address
    pub clint_base: usize,
    /// PLIC base address
    pub plic_base: usize,
    /// External interrupt source ids (exclusive upper bound)
    pub plic_num_interrupts: usize,
    /// Highest PLIC priority
    pub plic_num_priorities: u32,
    /// Core timer frequency in Hz
    pub timer_frequency: u64,
    /// Spurious timer interrupt spin budget in ticks
    pub timer_spin_budget: u64,
    /// Instructions may be 16-bit aligned (C extension)
    pub compressed: bool,
}

impl PlatformConfig {
    /// Rocketchip generic 64-bit SoC
    pub const ROCKETCHIP64: Self = Self {
        clint_base: CLINT_CTRL_ADDR,
        plic_base: PLIC_CTRL_ADDR,
        plic_num_interrupts: PLIC_NUM_INTERRUPTS,
        plic_num_priorities: PLIC_NUM_PRIORITIES,
        timer_frequency: RV_CORE_TIMER_FREQ,
        timer_spin_budget: SPURIOUS_TIMER_ISR_MAX_SPIN,
        compressed: true,
    };

    /// Address of the MSIP register
    pub const fn msip_addr(&self) -> usize {
        self.clint_base + CLINT_MSIP
    }

    /// Address of the MTIMECMP register
    pub const fn mtimecmp_addr(&self) -> usize {
        self.clint_base + CLINT_MTIMECMP
    }

    /// Address of the MTIME register
    pub const fn mtime_addr(&self) -> usize {
        self.clint_base + CLINT_MTIME
    }
}
