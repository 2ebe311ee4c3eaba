//! Window and event loop.
//!
//! Owns the `winit` event loop and the single window the engine renders to.

mod runtime;

pub use runtime::{Runtime, RuntimeConfig, RuntimeCtx};
