//! # Platform-Level Interrupt Controller (PLIC) Driver
//!
//! The PLIC arbitrates all external interrupt sources. The kernel runs in
//! M-mode on a single hart, so only context 0 (hart 0, M-mode) is used.
//!
//! ## Memory Map
//!
//! ```text
//! +------------------+---------+------------------------------------------+
//! | Offset           | Size    | Description                              |
//! +------------------+---------+------------------------------------------+
//! | 0x000000         | 4*N     | Priority registers (N sources)           |
//! | 0x001000         | 128     | Pending bits (1024 sources)              |
//! | 0x002000         | 128*C   | Enable bits (per context)                |
//! | 0x200000         | 0x1000*C| Threshold and Claim/Complete (per ctx)   |
//! +------------------+---------+------------------------------------------+
//! ```

use core::ptr::{read_volatile, write_volatile};

use crate::arch::riscv::platform::PlatformConfig;

// ============================================================================
// PLIC Register Offsets
// ============================================================================

/// Priority register base (4 bytes per source, source 0 is reserved)
pub const PRIORITY_OFFSET: usize = 0x00_0000;

/// Pending bits base (bit per source)
pub const PENDING_OFFSET: usize = 0x00_1000;

/// Enable bits base (bit per source, per context)
pub const ENABLE_OFFSET: usize = 0x00_2000;

/// Enable block size per context
pub const ENABLE_BLOCK_SIZE: usize = 0x80;

/// Threshold and Claim/Complete base
pub const THRESHOLD_OFFSET: usize = 0x20_0000;

/// Threshold and Claim block size per context
pub const CONTEXT_BLOCK_SIZE: usize = 0x1000;

/// Claim register offset within context block
pub const CLAIM_OFFSET: usize = 0x04;

/// Context of hart 0 in M-mode
pub const MACHINE_CONTEXT: usize = 0;

// ============================================================================
// Controller Interface
// ============================================================================

/// Claim/complete arbiter of external interrupts
pub trait InterruptController {
    /// Mask every source, zero priorities and threshold
    fn reset(&mut self, num_sources: usize);

    /// Claim the highest priority pending source (0 if none)
    fn claim(&mut self) -> u32;

    /// Signal that servicing of `source` has finished
    fn complete(&mut self, source: u32);
}

// ============================================================================
// PLIC Structure
// ============================================================================

/// PLIC interface
#[derive(Debug)]
pub struct Plic {
    base: usize,
    max_priority: u32,
}

impl Plic {
    /// Create a new PLIC instance with the given base address
    ///
    /// # Safety
    /// The base address must point to valid PLIC registers.
    pub const unsafe fn new(base: usize, max_priority: u32) -> Self {
        Self { base, max_priority }
    }

    /// PLIC of the given platform
    ///
    /// # Safety
    /// `config` must describe the running hardware.
    pub const unsafe fn from_config(config: &PlatformConfig) -> Self {
        Self {
            base: config.plic_base,
            max_priority: config.plic_num_priorities,
        }
    }

    #[inline]
    fn reg(&self, offset: usize) -> *mut u32 {
        (self.base + offset) as *mut u32
    }

    #[inline]
    fn enable_reg(&self, source: usize) -> *mut u32 {
        self.reg(ENABLE_OFFSET + MACHINE_CONTEXT * ENABLE_BLOCK_SIZE + (source / 32) * 4)
    }

    #[inline]
    fn threshold_reg(&self) -> *mut u32 {
        self.reg(THRESHOLD_OFFSET + MACHINE_CONTEXT * CONTEXT_BLOCK_SIZE)
    }

    #[inline]
    fn claim_reg(&self) -> *mut u32 {
        self.reg(THRESHOLD_OFFSET + MACHINE_CONTEXT * CONTEXT_BLOCK_SIZE + CLAIM_OFFSET)
    }

    /// Set the priority of an interrupt source (0 = never delivered)
    #[inline]
    pub fn set_priority(&self, source: usize, priority: u32) {
        let priority = priority.min(self.max_priority);
        unsafe { write_volatile(self.reg(PRIORITY_OFFSET + source * 4), priority) }
    }

    /// Check if an interrupt source is pending
    #[inline]
    pub fn is_pending(&self, source: usize) -> bool {
        let reg = unsafe { read_volatile(self.reg(PENDING_OFFSET + (source / 32) * 4)) };
        (reg >> (source % 32)) & 1 != 0
    }

    /// Enable an interrupt source
    #[inline]
    pub fn enable_source(&self, source: usize) {
        let addr = self.enable_reg(source);
        let bit = 1u32 << (source % 32);
        unsafe { write_volatile(addr, read_volatile(addr) | bit) }
    }

    /// Disable an interrupt source
    #[inline]
    pub fn disable_source(&self, source: usize) {
        let addr = self.enable_reg(source);
        let bit = 1u32 << (source % 32);
        unsafe { write_volatile(addr, read_volatile(addr) & !bit) }
    }

    /// Only interrupts with priority > threshold will be delivered
    #[inline]
    pub fn set_threshold(&self, threshold: u32) {
        let threshold = threshold.min(self.max_priority);
        unsafe { write_volatile(self.threshold_reg(), threshold) }
    }
}

impl InterruptController for Plic {
    fn reset(&mut self, num_sources: usize) {
        self.set_threshold(0);
        for word in 0..num_sources.div_ceil(32) {
            unsafe { write_volatile(self.enable_reg(word * 32), 0) }
        }
        for source in 1..num_sources {
            self.set_priority(source, 0);
        }
    }

    #[inline]
    fn claim(&mut self) -> u32 {
        unsafe { read_volatile(self.claim_reg()) }
    }

    #[inline]
    fn complete(&mut self, source: u32) {
        unsafe { write_volatile(self.claim_reg(), source) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCES: usize = 52;

    /// Plain memory laid out like the PLIC register file
    fn window() -> Vec<u32> {
        vec![0u32; (THRESHOLD_OFFSET + CONTEXT_BLOCK_SIZE) / 4]
    }

    fn word(mem: &[u32], offset: usize) -> u32 {
        mem[offset / 4]
    }

    #[test]
    fn test_enable_and_priority_registers() {
        let mut mem = window();
        let plic = unsafe { Plic::new(mem.as_mut_ptr() as usize, 7) };

        plic.set_priority(5, 3);
        plic.set_priority(6, 42);
        plic.enable_source(5);
        plic.enable_source(33);
        plic.disable_source(5);

        assert_eq!(word(&mem, PRIORITY_OFFSET + 5 * 4), 3);
        assert_eq!(word(&mem, PRIORITY_OFFSET + 6 * 4), 7);
        assert_eq!(word(&mem, ENABLE_OFFSET), 0);
        assert_eq!(word(&mem, ENABLE_OFFSET + 4), 1 << 1);
    }

    #[test]
    fn test_reset_masks_everything() {
        let mut mem = window();
        let base = mem.as_mut_ptr() as usize;
        for source in 1..SOURCES {
            mem[(PRIORITY_OFFSET + source * 4) / 4] = 5;
        }
        mem[ENABLE_OFFSET / 4] = u32::MAX;
        mem[ENABLE_OFFSET / 4 + 1] = u32::MAX;
        mem[THRESHOLD_OFFSET / 4] = 4;

        let mut plic = unsafe { Plic::new(base, 7) };
        plic.reset(SOURCES);

        assert!((1..SOURCES).all(|s| word(&mem, PRIORITY_OFFSET + s * 4) == 0));
        assert_eq!(word(&mem, ENABLE_OFFSET), 0);
        assert_eq!(word(&mem, ENABLE_OFFSET + 4), 0);
        assert_eq!(word(&mem, THRESHOLD_OFFSET), 0);
    }

    #[test]
    fn test_pending_bits() {
        let mut mem = window();
        mem[PENDING_OFFSET / 4] = 1 << 3;
        mem[PENDING_OFFSET / 4 + 1] = 1 << (40 - 32);
        let plic = unsafe { Plic::new(mem.as_mut_ptr() as usize, 7) };
        assert!(plic.is_pending(3));
        assert!(plic.is_pending(40));
        assert!(!plic.is_pending(4));
        assert!(!plic.is_pending(8));
    }

    #[test]
    fn test_claim_complete_share_register() {
        let mut mem = window();
        mem[(THRESHOLD_OFFSET + CLAIM_OFFSET) / 4] = 9;
        let mut plic = unsafe { Plic::new(mem.as_mut_ptr() as usize, 7) };
        assert_eq!(plic.claim(), 9);
        plic.complete(11);
        assert_eq!(word(&mem, THRESHOLD_OFFSET + CLAIM_OFFSET), 11);
    }
}
