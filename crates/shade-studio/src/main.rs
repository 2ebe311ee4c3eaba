use anyhow::{Context, ensure};
use glam::{Quat, Vec3};
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use shade_engine::backend::{Extent, GpuBackend};
use shade_engine::core::{App, AppControl, FrameCtx, InitCtx, NativeEngine};
use shade_engine::device::DeviceInit;
use shade_engine::engine::{EngineConfig, ViewportTexture};
use shade_engine::geometry::{DrawableId, GeometryManager, Mesh, Transform};
use shade_engine::logging::{LoggingConfig, init_logging};
use shade_engine::pipeline::{PipelineCreateInfo, PipelineState};
use shade_engine::scene::Camera;
use shade_engine::window::{Runtime, RuntimeConfig};
use shade_engine::EngineResult;

/// GPU state created once the window exists.
struct Scene {
    geometry: GeometryManager,
    pso: PipelineState,
    viewport: ViewportTexture,
    cube: DrawableId,
}

#[derive(Default)]
struct Studio {
    camera: Camera,
    scene: Option<Scene>,
    toggle_depth: bool,
}

impl Studio {
    fn draw(&mut self, ctx: &mut FrameCtx<'_, '_>) -> EngineResult<()> {
        let Some(scene) = self.scene.as_mut() else {
            return Ok(());
        };
        let engine = &mut *ctx.engine;

        if std::mem::take(&mut self.toggle_depth) {
            let depth = scene.pso.toggle_reverse_depth();
            log::info!("depth convention: {depth:?}");
            ctx.runtime.set_title(format!("shade studio ({depth:?} depth)"));
        }

        let t = ctx.time.elapsed;
        if let Some(cube) = scene.geometry.drawable_mut(scene.cube) {
            cube.transform.rotation = Quat::from_rotation_y(t) * Quat::from_rotation_x(t * 0.5);
        }
        scene.geometry.update_constants(engine)?;
        scene.pso.update_camera(engine, &self.camera)?;

        let back_buffer = engine.request_frame()?;
        scene.pso.render(engine, &scene.geometry)?;
        scene.pso.execute(engine)?;
        scene.viewport.copy_from(engine, scene.pso.render_target())?;
        scene.viewport.copy_to(engine, back_buffer)?;
        engine.present_frame()?;
        Ok(())
    }
}

impl App for Studio {
    fn init(&mut self, ctx: &mut InitCtx<'_, '_>) -> anyhow::Result<()> {
        let engine = &mut *ctx.engine;
        let usage = engine.device().gpu().surface_usage();
        ensure!(
            usage.contains(wgpu::TextureUsages::COPY_DST),
            "surface cannot be a copy destination ({usage:?})"
        );

        let swapchain = *engine.swapchain();
        let mut geometry = GeometryManager::new(engine).context("object constants")?;
        let mesh = geometry.add_mesh(engine, &Mesh::cube()).context("cube upload")?;
        let cube = geometry.add_drawable(mesh, Transform::default())?;

        let mut info = PipelineCreateInfo::mesh(swapchain.extent, swapchain.format);
        info.clear_color = [0.05, 0.06, 0.09, 1.0];
        let pso = PipelineState::init(engine, info).context("mesh pipeline")?;
        let viewport = ViewportTexture::new(engine, swapchain.extent, swapchain.format)?;

        self.camera.position = Vec3::new(0.0, 0.0, 2.5);
        self.scene = Some(Scene {
            geometry,
            pso,
            viewport,
            cube,
        });
        log::info!("studio ready on `{}`", engine.device().name());
        Ok(())
    }

    fn on_window_event(&mut self, event: &WindowEvent) -> AppControl {
        let WindowEvent::KeyboardInput { event, .. } = event else {
            return AppControl::Continue;
        };
        if event.state != ElementState::Pressed || event.repeat {
            return AppControl::Continue;
        }

        match event.physical_key {
            PhysicalKey::Code(KeyCode::Escape) => AppControl::Exit,
            PhysicalKey::Code(KeyCode::KeyR) => {
                self.toggle_depth = true;
                AppControl::Continue
            }
            _ => AppControl::Continue,
        }
    }

    fn on_resize(&mut self, engine: &mut NativeEngine<'_>, width: u32, height: u32) -> anyhow::Result<()> {
        let Some(scene) = self.scene.as_mut() else {
            return Ok(());
        };
        let extent = Extent::new(width, height);
        scene.pso.resize(engine, extent)?;
        scene.viewport.resize(engine, extent)?;
        Ok(())
    }

    fn on_frame(&mut self, ctx: &mut FrameCtx<'_, '_>) -> AppControl {
        match self.draw(ctx) {
            Ok(()) => AppControl::Continue,
            Err(e) => {
                ctx.engine.abandon_frame();
                ctx.handle_error(e)
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());

    Runtime::run(
        RuntimeConfig {
            title: "shade studio".to_string(),
            ..Default::default()
        },
        DeviceInit::default(),
        EngineConfig::default(),
        Studio::default(),
    )
}
