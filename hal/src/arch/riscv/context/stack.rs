//! # Thread Stack Bootstrap
//!
//! Builds the first [`ContextSwitchFrame`] of a thread so that the trap
//! exit path can "resume" it like any other preempted thread.
//!
//! ```text
//! high  +--------------------+ <- end of region (word aligned)
//!       |   STACK_MARKER     |
//!       +--------------------+
//!       |   alignment gap    |
//!       +--------------------+ <- 16-byte aligned
//!       | ContextSwitchFrame |
//! low   +--------------------+ <- returned stack pointer
//! ```

use core::mem::size_of;
use core::ptr::NonNull;

use super::frame::{ContextSwitchFrame, Reg, FRAME_SIZE, STACK_ALIGN};

/// Watermark at the top of every thread stack
#[cfg(target_pointer_width = "64")]
pub const STACK_MARKER: Reg = 0xEEEE_EEEE_7777_7777;
/// Watermark at the top of every thread stack
#[cfg(not(target_pointer_width = "64"))]
pub const STACK_MARKER: Reg = 0x7777_7777;

const WORD: usize = size_of::<Reg>();

/// Thread entry point, receives the creation argument in a0
pub type ThreadEntry = extern "C" fn(arg: *mut ()) -> *mut ();

/// Landing address for a thread function that returns
pub type TaskExit = extern "C" fn() -> !;

/// Stack setup errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackError {
    /// Region cannot hold marker, alignment gap and frame
    TooSmall {
        /// Bytes provided
        size: usize,
    },
}

impl core::fmt::Display for StackError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            StackError::TooSmall { size } => write!(f, "stack of {} bytes is too small", size),
        }
    }
}

/// Smallest region `stack_init` accepts regardless of alignment
pub const MIN_STACK_SIZE: usize = FRAME_SIZE + STACK_ALIGN + 2 * WORD;

/// Prepare `region` as the stack of a new thread.
///
/// Returns the initial stack pointer, which is also the address of the
/// thread's saved frame. The frame resumes at `entry` with `arg` in a0 and
/// `exit` as return address.
pub fn stack_init(
    entry: ThreadEntry,
    arg: *mut (),
    region: &mut [u8],
    exit: TaskExit,
) -> Result<NonNull<ContextSwitchFrame>, StackError> {
    let size = region.len();
    let base = region.as_mut_ptr();
    let start = base as usize;

    let top = (start + size) & !(WORD - 1);
    let marker = top.checked_sub(WORD).filter(|&m| m >= start);
    let frame = marker
        .map(|m| m & !(STACK_ALIGN - 1))
        .and_then(|t| t.checked_sub(FRAME_SIZE))
        .filter(|&f| f >= start);

    let (Some(marker), Some(frame)) = (marker, frame) else {
        return Err(StackError::TooSmall { size });
    };

    let mut initial = ContextSwitchFrame::zeroed();
    initial.pc = entry as *const () as Reg;
    initial.a0 = arg as Reg;
    initial.ra = exit as *const () as Reg;

    // SAFETY: both offsets were bounds-checked against the region above and
    // are word (marker) or 16-byte (frame) aligned.
    unsafe {
        // A reused stack may still hold an old marker in the gap
        let gap = base.add(frame + FRAME_SIZE - start).cast::<Reg>();
        for i in 0..(marker - frame - FRAME_SIZE) / WORD {
            gap.add(i).write(0);
        }
        base.add(marker - start).cast::<Reg>().write(STACK_MARKER);
        let frame = base.add(frame - start).cast::<ContextSwitchFrame>();
        frame.write(initial);
        Ok(NonNull::new_unchecked(frame))
    }
}

/// Count the words between `sp` and the stack marker.
///
/// # Safety
/// `sp` must point into a stack prepared by [`stack_init`].
pub unsafe fn stack_words_in_use(sp: *const Reg) -> usize {
    let mut count = 0;
    let mut cursor = sp;
    loop {
        count += 1;
        // SAFETY: the marker bounds the walk (caller contract).
        unsafe {
            cursor = cursor.add(1);
            if cursor.read() == STACK_MARKER {
                return count;
            }
        }
    }
}

/// Log the live words of a thread stack.
///
/// # Safety
/// Same contract as [`stack_words_in_use`].
pub unsafe fn print_stack(pid: usize, sp: *const Reg) {
    log::info!("printing the current stack of thread {}", pid);
    log::info!("  address:            data:");
    // SAFETY: caller contract.
    let words = unsafe { stack_words_in_use(sp) };
    for i in 0..words {
        // SAFETY: i < words, all below the marker.
        let (addr, value) = unsafe { (sp.add(i), sp.add(i).read()) };
        log::info!("  {:#018x}:   {:#018x}", addr as usize, value);
    }
    log::info!("current stack size: {} words", words);
}
