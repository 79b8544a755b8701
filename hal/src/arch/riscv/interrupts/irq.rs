//! # External Interrupt Routing
//!
//! Maps PLIC source ids to driver callbacks. The table is read on every
//! external interrupt and written by drivers at initialization, so each
//! slot is an atomic function pointer and neither side ever blocks.

use core::fmt;
use core::sync::atomic::{AtomicPtr, Ordering};

use super::plic::InterruptController;
use crate::arch::riscv::platform::PLIC_NUM_INTERRUPTS;

// ============================================================================
// Handler Types
// ============================================================================

/// External interrupt callback, receives the source id
pub type ExternalIsr = fn(source: usize);

/// Handler installed in every unregistered slot
pub fn null_isr(_source: usize) {}

/// Interrupt registration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqError {
    /// Source id outside `1..PLIC_NUM_INTERRUPTS`
    InvalidIrq(usize),
}

impl IrqError {
    /// C-style status code
    pub const fn status(&self) -> i32 {
        -1
    }
}

impl fmt::Display for IrqError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrqError::InvalidIrq(source) => write!(f, "invalid interrupt source {}", source),
        }
    }
}

// ============================================================================
// IRQ Table
// ============================================================================

/// Source id to callback table
pub struct ExternalIrqTable {
    slots: [AtomicPtr<()>; PLIC_NUM_INTERRUPTS],
}

impl fmt::Debug for ExternalIrqTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered = (1..PLIC_NUM_INTERRUPTS)
            .filter(|&source| self.is_registered(source))
            .count();
        f.debug_struct("ExternalIrqTable")
            .field("registered", &registered)
            .finish()
    }
}

impl ExternalIrqTable {
    /// Table with every slot pointing at [`null_isr`]
    pub const fn new() -> Self {
        const NULL: AtomicPtr<()> = AtomicPtr::new(null_isr as *mut ());
        Self {
            slots: [NULL; PLIC_NUM_INTERRUPTS],
        }
    }

    /// Is `source` a routable id?
    #[inline]
    pub const fn in_range(source: usize) -> bool {
        source > 0 && source < PLIC_NUM_INTERRUPTS
    }

    /// Reset the controller and point every slot at [`null_isr`]
    pub fn init<C: InterruptController>(&self, controller: &mut C) {
        controller.reset(PLIC_NUM_INTERRUPTS);
        for slot in &self.slots {
            slot.store(null_isr as *mut (), Ordering::Release);
        }
        log::debug!("external interrupts: {} sources", PLIC_NUM_INTERRUPTS - 1);
    }

    /// Route `source` to `callback`. Out-of-range ids change nothing.
    pub fn register(&self, source: usize, callback: ExternalIsr) -> Result<(), IrqError> {
        if !Self::in_range(source) {
            return Err(IrqError::InvalidIrq(source));
        }
        self.slots[source].store(callback as *mut (), Ordering::Release);
        Ok(())
    }

    /// Callback currently routed for `source`
    pub fn get(&self, source: usize) -> Option<ExternalIsr> {
        if !Self::in_range(source) {
            return None;
        }
        let raw = self.slots[source].load(Ordering::Acquire);
        // SAFETY: slots only ever hold `ExternalIsr` values.
        Some(unsafe { core::mem::transmute::<*mut (), ExternalIsr>(raw) })
    }

    /// Does `source` route anywhere but [`null_isr`]?
    pub fn is_registered(&self, source: usize) -> bool {
        Self::in_range(source)
            && self.slots[source].load(Ordering::Acquire) != null_isr as *mut ()
    }

    /// Service one external interrupt.
    ///
    /// Completion is signalled for every claimed id, including the "nothing
    /// pending" id 0 and ids beyond the table. Whether the controller needs
    /// it for those is unverified; the write is harmless on the PLIC.
    pub fn handle<C: InterruptController>(&self, controller: &mut C) -> u32 {
        let source = controller.claim();
        if let Some(isr) = self.get(source as usize) {
            isr(source as usize);
        }
        controller.complete(source);
        source
    }
}

impl Default for ExternalIrqTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use core::sync::atomic::AtomicUsize;

    /// Controller that hands out a scripted sequence of claims
    #[derive(Debug, Default)]
    pub(crate) struct FakePlic {
        pub pending: Vec<u32>,
        pub completed: Vec<u32>,
        pub resets: usize,
    }

    impl InterruptController for FakePlic {
        fn reset(&mut self, num_sources: usize) {
            assert_eq!(num_sources, PLIC_NUM_INTERRUPTS);
            self.resets += 1;
        }

        fn claim(&mut self) -> u32 {
            if self.pending.is_empty() {
                0
            } else {
                self.pending.remove(0)
            }
        }

        fn complete(&mut self, source: u32) {
            self.completed.push(source);
        }
    }

    static UART_HITS: AtomicUsize = AtomicUsize::new(0);
    static UART_LAST: AtomicUsize = AtomicUsize::new(0);

    fn uart_isr(source: usize) {
        UART_HITS.fetch_add(1, Ordering::SeqCst);
        UART_LAST.store(source, Ordering::SeqCst);
    }

    static STRAY_HITS: AtomicUsize = AtomicUsize::new(0);

    fn stray_isr(_source: usize) {
        STRAY_HITS.fetch_add(1, Ordering::SeqCst);
    }

    #[test]
    fn test_registered_callback_runs_once() {
        let table = ExternalIrqTable::new();
        let mut plic = FakePlic { pending: vec![7], ..Default::default() };
        table.init(&mut plic);
        assert_eq!(plic.resets, 1);

        table.register(7, uart_isr).unwrap();
        assert_eq!(table.handle(&mut plic), 7);
        assert_eq!(UART_HITS.load(Ordering::SeqCst), 1);
        assert_eq!(UART_LAST.load(Ordering::SeqCst), 7);
        assert_eq!(plic.completed, [7]);
    }

    #[test]
    fn test_sentinel_and_out_of_range_still_complete() {
        let table = ExternalIrqTable::new();
        for source in 1..PLIC_NUM_INTERRUPTS {
            table.register(source, stray_isr).unwrap();
        }
        let mut plic = FakePlic {
            pending: vec![0, PLIC_NUM_INTERRUPTS as u32, 1000],
            ..Default::default()
        };
        table.handle(&mut plic);
        table.handle(&mut plic);
        table.handle(&mut plic);

        assert_eq!(STRAY_HITS.load(Ordering::SeqCst), 0);
        assert_eq!(plic.completed, [0, PLIC_NUM_INTERRUPTS as u32, 1000]);
    }

    #[test]
    fn test_out_of_range_registration_is_dropped() {
        let table = ExternalIrqTable::new();
        assert_eq!(table.register(0, stray_isr), Err(IrqError::InvalidIrq(0)));
        assert_eq!(
            table.register(PLIC_NUM_INTERRUPTS, stray_isr),
            Err(IrqError::InvalidIrq(PLIC_NUM_INTERRUPTS))
        );
        assert!(table.get(0).is_none());
        assert!((0..=PLIC_NUM_INTERRUPTS).all(|s| !table.is_registered(s)));
    }

    #[test]
    fn test_init_clears_previous_routes() {
        let table = ExternalIrqTable::new();
        table.register(3, stray_isr).unwrap();
        assert!(table.is_registered(3));
        table.init(&mut FakePlic::default());
        assert!(!table.is_registered(3));
    }
}
