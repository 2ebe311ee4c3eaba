//! GPU command submission, synchronization and resource arenas.
//!
//! The crate is layered bottom-up:
//! - [`sync`]: the frame fence
//! - [`cmd`] and [`submit`]: command lists, recording units, submission
//! - [`arena`] and [`barrier`]: descriptor/buffer arenas and state tracking
//! - [`backend`]: the device seam, with wgpu and headless implementations
//! - [`pipeline`], [`geometry`], [`scene`]: what a frame draws
//! - [`engine`]: the facade owning all of the above
//! - [`device`], [`window`], [`core`]: the windowed runtime

pub mod arena;
pub mod backend;
pub mod barrier;
pub mod cmd;
pub mod core;
pub mod device;
pub mod engine;
pub mod error;
pub mod geometry;
pub mod logging;
pub mod pipeline;
pub mod scene;
pub mod submit;
pub mod sync;
pub mod time;
pub mod window;

pub use engine::{EngineConfig, RenderEngine};
pub use error::{EngineError, EngineResult, ErrorClass};
