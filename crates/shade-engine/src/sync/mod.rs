//! Frame synchronization.
//!
//! A single monotonically increasing fence paces the CPU against GPU completion.
//! Waiting on the fence is the only place the engine blocks.

mod fence;

pub use fence::{Fence, FenceValue, Timeline};
