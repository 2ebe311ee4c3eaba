use anyhow::{Context, Result};
use ouroboros::self_referencing;

use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};

use crate::backend::WgpuBackend;
use crate::core::{App, AppControl, FrameCtx, InitCtx};
use crate::device::{DeviceInit, Gpu};
use crate::engine::{EngineConfig, RenderEngine};
use crate::time::FrameClock;

/// Window configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub title: String,
    pub initial_size: LogicalSize<f64>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            title: "shade".to_string(),
            initial_size: LogicalSize::new(1280.0, 720.0),
        }
    }
}

/// Requests an app can make from inside a frame.
///
/// Applied after the callback returns.
#[derive(Debug, Default)]
pub struct RuntimeCtx {
    exit: bool,
    title: Option<String>,
}

impl RuntimeCtx {
    pub fn exit(&mut self) {
        self.exit = true;
    }

    pub fn set_title(&mut self, title: impl Into<String>) {
        self.title = Some(title.into());
    }
}

/// Entry point for the runtime.
pub struct Runtime;

impl Runtime {
    /// Opens one window, builds the engine on it and drives `app` until exit.
    pub fn run<A>(config: RuntimeConfig, device: DeviceInit, engine: EngineConfig, app: A) -> Result<()>
    where
        A: App + 'static,
    {
        let event_loop = EventLoop::new().context("failed to create winit EventLoop")?;
        let mut state = AppState {
            config,
            device,
            engine,
            app,
            window: None,
            exit_requested: false,
        };

        event_loop
            .run_app(&mut state)
            .context("winit event loop terminated with error")?;

        Ok(())
    }
}

#[self_referencing]
struct WindowEntry {
    clock: FrameClock,
    minimized: bool,

    window: Window,

    #[borrows(window)]
    #[not_covariant]
    engine: RenderEngine<WgpuBackend<'this>>,
}

struct AppState<A: App + 'static> {
    config: RuntimeConfig,
    device: DeviceInit,
    engine: EngineConfig,
    app: A,

    window: Option<WindowEntry>,
    exit_requested: bool,
}

impl<A: App + 'static> AppState<A> {
    fn create_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = Window::default_attributes()
            .with_title(self.config.title.clone())
            .with_inner_size(self.config.initial_size);
        let window = event_loop
            .create_window(attrs)
            .context("failed to create window")?;

        let device = self.device.clone();
        let engine_config = self.engine.clone();

        let entry: Result<WindowEntry> = WindowEntryTryBuilder {
            clock: FrameClock::default(),
            minimized: false,
            window,
            engine_builder: |window| build_engine(window, device, engine_config),
        }
        .try_build();
        let mut entry = entry.context("engine initialization failed")?;

        let app = &mut self.app;
        entry
            .with_mut(|fields| {
                app.init(&mut InitCtx {
                    window: fields.window,
                    engine: fields.engine,
                })
            })
            .context("app initialization failed")?;

        entry.with_window(|w| w.request_redraw());
        self.window = Some(entry);
        Ok(())
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(mut entry) = self.window.take() {
            entry.with_engine_mut(|engine| {
                if let Err(e) = engine.shutdown() {
                    log::error!("engine shutdown failed: {e:#}");
                }
            });
        }
        self.exit_requested = true;
        event_loop.exit();
    }

    fn resize(&mut self, width: u32, height: u32) {
        let Some(entry) = self.window.as_mut() else {
            return;
        };
        let app = &mut self.app;
        let mut failed = false;

        entry.with_mut(|fields| {
            *fields.minimized = width == 0 || height == 0;
            if *fields.minimized {
                return;
            }
            if let Err(e) = fields.engine.resize(width, height) {
                log::error!("resize to {width}x{height} failed: {e:#}");
                failed = e.is_fatal();
                return;
            }
            if let Err(e) = app.on_resize(fields.engine, width, height) {
                log::error!("app resize failed: {e:#}");
                failed = true;
            }
        });

        if failed {
            self.exit_requested = true;
        }
    }

    fn redraw(&mut self) {
        let Some(entry) = self.window.as_mut() else {
            return;
        };
        let app = &mut self.app;
        let mut runtime = RuntimeCtx::default();
        let mut control = AppControl::Continue;

        entry.with_mut(|fields| {
            if *fields.minimized {
                return;
            }
            let time = fields.clock.tick();
            let mut ctx = FrameCtx {
                window: fields.window,
                engine: fields.engine,
                time,
                runtime: &mut runtime,
            };
            control = app.on_frame(&mut ctx);
            fields.window.request_redraw();
        });

        if let Some(title) = runtime.title.take() {
            entry.with_window(|w| w.set_title(&title));
        }
        if control == AppControl::Exit || runtime.exit {
            self.exit_requested = true;
        }
    }
}

fn build_engine(window: &Window, device: DeviceInit, config: EngineConfig) -> Result<RenderEngine<WgpuBackend<'_>>> {
    let gpu = pollster::block_on(Gpu::new(window, device)).context("device initialization failed")?;
    let backend = WgpuBackend::new(gpu).context("backend creation failed")?;
    RenderEngine::new(backend, config).context("engine creation failed")
}

impl<A: App + 'static> ApplicationHandler for AppState<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.create_window(event_loop) {
            log::error!("failed to start: {e:#}");
            self.shutdown(event_loop);
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.exit_requested {
            self.shutdown(event_loop);
            return;
        }
        event_loop.set_control_flow(ControlFlow::Wait);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if self.app.on_window_event(&event) == AppControl::Exit {
            self.exit_requested = true;
        }

        match event {
            WindowEvent::CloseRequested => self.exit_requested = true,
            WindowEvent::Resized(size) => self.resize(size.width, size.height),
            WindowEvent::ScaleFactorChanged { .. } => {
                if let Some(size) = self.window.as_ref().map(|e| e.with_window(|w| w.inner_size())) {
                    self.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => self.redraw(),
            _ => {}
        }

        if self.exit_requested {
            self.shutdown(event_loop);
        }
    }
}
