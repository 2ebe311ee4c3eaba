//! Command recording.
//!
//! A [`CommandList`] is a plain, backend-agnostic sequence of GPU commands.
//! A [`RecordingUnit`] pairs a list with the lifecycle state that decides when
//! the list's storage may be reused.

mod list;
mod unit;

pub use list::{
    BufferSpan, Command, CommandList, DrawIndexed, IndexBufferView, ScissorRect, VertexBufferView,
    Viewport,
};
pub use unit::{RecordingState, RecordingUnit};
