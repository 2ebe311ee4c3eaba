//! Append-only arenas for descriptors and buffer memory.
//!
//! Nothing is freed individually. Exhaustion is reported as
//! [`EngineError::ArenaExhausted`](crate::error::EngineError::ArenaExhausted)
//! and leaves the arena untouched.

mod buffer;
mod descriptor;

pub use buffer::{BufferArena, BufferRegion, align_up};
pub use descriptor::{DescriptorArena, DescriptorEntry, DescriptorHandle};
