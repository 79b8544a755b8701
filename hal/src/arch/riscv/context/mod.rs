//! # Thread Context
//!
//! Saved register frame of suspended threads and the code preparing the
//! first frame of a new thread.

pub mod frame;
pub mod stack;

pub use frame::{ContextSwitchFrame, FRAME_SIZE, STACK_ALIGN};
pub use stack::{
    print_stack, stack_init, StackError, TaskExit, ThreadEntry, MIN_STACK_SIZE, STACK_MARKER,
};
