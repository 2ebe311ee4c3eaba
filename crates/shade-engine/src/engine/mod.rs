//! The engine facade.
//!
//! [`RenderEngine`] owns the backend, the arenas, the state tracker and the
//! submission engine. Everything else borrows it explicitly for the duration
//! of a call.

mod config;
mod render_engine;
mod viewport;

pub use config::EngineConfig;
pub use render_engine::RenderEngine;
pub use viewport::ViewportTexture;
