use winit::window::Window;

use crate::backend::WgpuBackend;
use crate::engine::RenderEngine;
use crate::error::{EngineError, ErrorClass};
use crate::time::FrameTime;
use crate::window::RuntimeCtx;

use super::app::AppControl;

/// The engine as the runtime builds it: on top of the window's wgpu surface.
pub type NativeEngine<'w> = RenderEngine<WgpuBackend<'w>>;

/// Context for [`App::init`](super::App::init).
///
/// Lifetimes:
/// - `'a` is the duration of the callback invocation
/// - `'w` is the window borrow carried by the backend
pub struct InitCtx<'a, 'w> {
    pub window: &'a Window,
    pub engine: &'a mut NativeEngine<'w>,
}

/// Per-frame context passed to [`App::on_frame`](super::App::on_frame).
pub struct FrameCtx<'a, 'w> {
    pub window: &'a Window,
    pub engine: &'a mut NativeEngine<'w>,
    pub time: FrameTime,
    pub runtime: &'a mut RuntimeCtx,
}

impl FrameCtx<'_, '_> {
    /// Decides what a failed frame means for the loop.
    ///
    /// Surface hiccups and usage errors skip the frame; fatal errors end the loop.
    pub fn handle_error(&mut self, err: EngineError) -> AppControl {
        match err.class() {
            ErrorClass::Surface => {
                log::debug!("frame {} skipped: {err}", self.time.frame_index);
                AppControl::Continue
            }
            _ if err.is_fatal() => {
                log::error!("fatal engine error: {err:#}");
                AppControl::Exit
            }
            _ => {
                log::warn!("frame {} dropped: {err}", self.time.frame_index);
                AppControl::Continue
            }
        }
    }

    /// Physical size of the window's drawable area.
    pub fn size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}
