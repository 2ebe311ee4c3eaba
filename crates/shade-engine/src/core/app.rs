use winit::event::WindowEvent;

use super::ctx::{FrameCtx, InitCtx, NativeEngine};

/// Control directive returned by app callbacks.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AppControl {
    Continue,
    Exit,
}

/// Application contract driven by [`Runtime`](crate::window::Runtime).
pub trait App {
    /// Called once the window and engine exist, before the first frame.
    ///
    /// An error here ends the event loop.
    fn init(&mut self, ctx: &mut InitCtx<'_, '_>) -> anyhow::Result<()>;

    /// Called for every window event before the runtime handles it.
    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let _ = event;
        AppControl::Continue
    }

    /// Called after the swapchain was resized to a non-zero size.
    fn on_resize(&mut self, engine: &mut NativeEngine<'_>, width: u32, height: u32) -> anyhow::Result<()> {
        let _ = (engine, width, height);
        Ok(())
    }

    /// Called once per redraw.
    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl;
}
