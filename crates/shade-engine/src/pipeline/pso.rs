use crate::arena::{BufferRegion, DescriptorHandle};
use crate::backend::{Extent, GpuBackend, PipelineId, ResourceId, TextureDesc, TextureFormat, ViewDesc};
use crate::barrier::ResourceState;
use crate::cmd::{RecordingUnit, ScissorRect, Viewport};
use crate::engine::RenderEngine;
use crate::error::{EngineError, EngineResult};
use crate::geometry::GeometryManager;
use crate::scene::{Camera, FrameConstants};
use crate::sync::FenceValue;

use super::desc::{
    BindingLayout, CullMode, DepthConvention, FixedFunction, PipelineDesc, ShaderSource,
    VertexStream,
};

/// Everything a [`PipelineState`] is built from.
#[derive(Debug, Clone)]
pub struct PipelineCreateInfo {
    pub label: String,
    pub shader: ShaderSource,
    pub layout: BindingLayout,
    pub vertex_streams: Vec<VertexStream>,
    pub extent: Extent,
    pub color_format: TextureFormat,
    pub depth_format: TextureFormat,
    pub cull: CullMode,
    pub depth: DepthConvention,
    pub clear_color: [f32; 4],
}

impl PipelineCreateInfo {
    /// The built-in mesh pipeline: positions and colors, back-face culling.
    pub fn mesh(extent: Extent, color_format: TextureFormat) -> Self {
        Self {
            label: "mesh".to_string(),
            shader: ShaderSource::mesh(),
            layout: BindingLayout::default(),
            vertex_streams: vec![VertexStream::POSITION, VertexStream::COLOR],
            extent,
            color_format,
            depth_format: TextureFormat::Depth32Float,
            cull: CullMode::Back,
            depth: DepthConvention::Forward,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum PsoPhase {
    Initialized,
    Recorded,
    Executed,
}

#[derive(Debug, Copy, Clone)]
struct Targets {
    color: ResourceId,
    depth: ResourceId,
    descriptor: DescriptorHandle,
    extent: Extent,
}

/// A render pass with its own targets and command list.
///
/// One backend pipeline exists per depth convention so switching between
/// forward and reverse depth needs no rebuild. The clear value and compare
/// function always come from the same [`DepthConvention`].
#[derive(Debug)]
pub struct PipelineState {
    label: String,
    layout: BindingLayout,
    vertex_streams: Vec<VertexStream>,
    color_format: TextureFormat,
    depth_format: TextureFormat,
    forward: PipelineId,
    reverse: PipelineId,
    unit: RecordingUnit,
    targets: Targets,
    viewport: Viewport,
    scissor: ScissorRect,
    clear_color: [f32; 4],
    depth: DepthConvention,
    frame_constants: BufferRegion,
    /// Camera behind the current frame constants and the convention it was projected with.
    camera: Option<(Camera, DepthConvention)>,
    phase: PsoPhase,
}

impl PipelineState {
    pub fn init<B: GpuBackend>(engine: &mut RenderEngine<B>, info: PipelineCreateInfo) -> EngineResult<Self> {
        if info.color_format.is_depth() || !info.depth_format.is_depth() {
            return Err(EngineError::Pipeline {
                label: info.label,
                reason: "color and depth formats are swapped".into(),
            });
        }

        let mut pipeline_for = |depth: DepthConvention| {
            let label = format!("{} ({depth:?} depth)", info.label);
            engine.create_pipeline(&PipelineDesc {
                label: &label,
                layout: info.layout,
                shader: &info.shader,
                vertex_streams: &info.vertex_streams,
                fixed: FixedFunction {
                    color_format: info.color_format,
                    depth_format: Some(info.depth_format),
                    depth_compare: depth.compare(),
                    cull: info.cull,
                },
            })
        };
        let forward = pipeline_for(DepthConvention::Forward)?;
        let reverse = pipeline_for(DepthConvention::Reverse)?;

        let targets = create_targets(engine, &info.label, info.extent, info.color_format, info.depth_format)?;
        let (frame_constants, _) = engine.allocate_upload_region(BindingLayout::CONSTANT_BLOCK_SIZE)?;
        engine.write_upload(&frame_constants, 0, bytemuck::bytes_of(&FrameConstants::default()))?;

        log::debug!(
            "pso `{}`: {}x{} targets, descriptor {}",
            info.label,
            info.extent.width,
            info.extent.height,
            targets.descriptor.index()
        );

        Ok(Self {
            unit: RecordingUnit::new(info.label.clone()),
            label: info.label,
            layout: info.layout,
            vertex_streams: info.vertex_streams,
            color_format: info.color_format,
            depth_format: info.depth_format,
            forward,
            reverse,
            targets,
            viewport: Viewport::full(info.extent.width, info.extent.height),
            scissor: ScissorRect::full(info.extent.width, info.extent.height),
            clear_color: info.clear_color,
            depth: info.depth,
            frame_constants,
            camera: None,
            phase: PsoPhase::Initialized,
        })
    }

    /// Records the pass: clear, then one draw per visible drawable. Returns the draw count.
    ///
    /// Waits for this pipeline's previous submission before reusing its list.
    pub fn render<B: GpuBackend>(
        &mut self,
        engine: &mut RenderEngine<B>,
        geometry: &GeometryManager,
    ) -> EngineResult<usize> {
        if self.layout.constant_slots <= BindingLayout::OBJECT_SLOT {
            return Err(EngineError::Pipeline {
                label: self.label.clone(),
                reason: "layout has no object constant slot".into(),
            });
        }
        if let Some(pending) = self.unit.pending() {
            engine.wait_until_signaled(pending)?;
        }

        if let Some((camera, projected)) = self.camera {
            if projected != self.depth {
                self.update_camera(engine, &camera)?;
            }
        }

        let pipeline = self.pipeline_for(self.depth);
        let targets = self.targets;
        let list = self.unit.reset(engine.completed_value())?;

        list.set_pipeline(pipeline);
        list.set_viewport(self.viewport);
        list.set_scissor(self.scissor);
        list.set_render_targets(targets.color, Some(targets.depth));
        list.clear_render_target(targets.color, self.clear_color);
        list.clear_depth(targets.depth, self.depth.clear_value());
        list.set_constants(BindingLayout::FRAME_SLOT, self.frame_constants.span());

        let mut draws = 0;
        'drawables: for drawable in geometry.visible() {
            let Some(views) = geometry.mesh(drawable.mesh) else {
                log::warn!("pso `{}`: drawable {:?} has no mesh", self.label, drawable.id);
                continue;
            };

            for stream in &self.vertex_streams {
                let view = match stream.location {
                    l if l == VertexStream::POSITION.location => views.vertex,
                    l if l == VertexStream::COLOR.location => views.color,
                    _ => match views.normal {
                        Some(normal) => normal,
                        None => {
                            log::warn!("pso `{}`: mesh of {:?} has no normals", self.label, drawable.id);
                            continue 'drawables;
                        }
                    },
                };
                list.set_vertex_buffer(stream.slot, view);
            }

            list.set_constants(BindingLayout::OBJECT_SLOT, geometry.object_constants(drawable.id));
            list.set_index_buffer(views.index);
            list.draw_indexed(views.index_count(), 1);
            draws += 1;
        }

        self.unit.close()?;
        self.phase = PsoPhase::Recorded;
        log::trace!("pso `{}` recorded {draws} draws", self.label);
        Ok(draws)
    }

    /// Submits the recorded pass.
    pub fn execute<B: GpuBackend>(&mut self, engine: &mut RenderEngine<B>) -> EngineResult<FenceValue> {
        if self.phase != PsoPhase::Recorded {
            return Err(EngineError::Frame("pso executed without a fresh render"));
        }
        let marker = engine.submit_draw_list(&mut self.unit)?;
        self.phase = PsoPhase::Executed;
        Ok(marker)
    }

    pub fn depth_convention(&self) -> DepthConvention {
        self.depth
    }

    /// Switches depth convention. Takes effect on the next render, which also
    /// re-projects the last camera passed to [`update_camera`](Self::update_camera).
    pub fn set_depth_convention(&mut self, depth: DepthConvention) {
        self.depth = depth;
    }

    /// See [`set_depth_convention`](Self::set_depth_convention).
    pub fn toggle_reverse_depth(&mut self) -> DepthConvention {
        self.depth = self.depth.toggled();
        self.depth
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    /// Writes explicit frame constants. Later depth switches leave them alone.
    pub fn set_frame_constants<B: GpuBackend>(
        &mut self,
        engine: &mut RenderEngine<B>,
        constants: &FrameConstants,
    ) -> EngineResult<()> {
        self.camera = None;
        engine.write_upload(&self.frame_constants, 0, bytemuck::bytes_of(constants))
    }

    /// Frame constants for `camera`, projected with this pipeline's depth convention.
    pub fn update_camera<B: GpuBackend>(&mut self, engine: &mut RenderEngine<B>, camera: &Camera) -> EngineResult<()> {
        let projection = camera.projection(self.targets.extent.aspect(), self.depth);
        let constants = FrameConstants::new(camera.view(), projection);
        engine.write_upload(&self.frame_constants, 0, bytemuck::bytes_of(&constants))?;
        self.camera = Some((*camera, self.depth));
        Ok(())
    }

    /// Recreates the targets at `extent`.
    ///
    /// The old targets are released after a flush, and the color target gets a
    /// fresh descriptor slot.
    pub fn resize<B: GpuBackend>(&mut self, engine: &mut RenderEngine<B>, extent: Extent) -> EngineResult<()> {
        if extent == self.targets.extent {
            return Ok(());
        }
        if extent.is_empty() {
            return Err(EngineError::Frame("pso resized to zero"));
        }

        engine.flush()?;
        self.unit.retire(engine.completed_value());
        engine.destroy_resource(self.targets.color)?;
        engine.destroy_resource(self.targets.depth)?;

        self.targets = create_targets(engine, &self.label, extent, self.color_format, self.depth_format)?;
        self.viewport = Viewport::full(extent.width, extent.height);
        self.scissor = ScissorRect::full(extent.width, extent.height);
        self.phase = PsoPhase::Initialized;
        if let Some((camera, _)) = self.camera {
            self.update_camera(engine, &camera)?;
        }
        log::debug!("pso `{}` resized to {}x{}", self.label, extent.width, extent.height);
        Ok(())
    }

    pub fn pipeline_for(&self, depth: DepthConvention) -> PipelineId {
        match depth {
            DepthConvention::Forward => self.forward,
            DepthConvention::Reverse => self.reverse,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn phase(&self) -> PsoPhase {
        self.phase
    }

    pub fn unit(&self) -> &RecordingUnit {
        &self.unit
    }

    pub fn render_target(&self) -> ResourceId {
        self.targets.color
    }

    pub fn depth_buffer(&self) -> ResourceId {
        self.targets.depth
    }

    pub fn descriptor(&self) -> DescriptorHandle {
        self.targets.descriptor
    }

    pub fn extent(&self) -> Extent {
        self.targets.extent
    }
}

fn create_targets<B: GpuBackend>(
    engine: &mut RenderEngine<B>,
    label: &str,
    extent: Extent,
    color_format: TextureFormat,
    depth_format: TextureFormat,
) -> EngineResult<Targets> {
    let color = engine.create_texture(
        &TextureDesc {
            label: &format!("{label} color"),
            extent,
            format: color_format,
        },
        ResourceState::RenderTarget,
    )?;
    let depth = engine.create_texture(
        &TextureDesc {
            label: &format!("{label} depth"),
            extent,
            format: depth_format,
        },
        ResourceState::DepthWrite,
    )?;
    let descriptor = engine.allocate_descriptor(ViewDesc::Texture2d { format: color_format }, color)?;

    Ok(Targets {
        color,
        depth,
        descriptor,
        extent,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessBackend, HeadlessConfig};
    use crate::cmd::Command;
    use crate::engine::EngineConfig;
    use crate::geometry::{Mesh, Transform};
    use crate::pipeline::CompareFunction;
    use glam::Mat4;

    fn setup() -> (RenderEngine<HeadlessBackend>, GeometryManager, PipelineState) {
        let mut engine = RenderEngine::new(
            HeadlessBackend::new(HeadlessConfig::default()),
            EngineConfig {
                upload_arena_size: 256 * 1024,
                geometry_arena_size: 64 * 1024,
                ..Default::default()
            },
        )
        .unwrap();
        let mut geometry = GeometryManager::new(&mut engine).unwrap();
        let cube = geometry.add_mesh(&mut engine, &Mesh::cube()).unwrap();
        geometry.add_drawable(cube, Transform::default()).unwrap();

        let info = PipelineCreateInfo::mesh(Extent::new(320, 240), TextureFormat::Rgba8Unorm);
        let pso = PipelineState::init(&mut engine, info).unwrap();
        (engine, geometry, pso)
    }

    fn depth_clear(engine: &RenderEngine<HeadlessBackend>) -> Option<f32> {
        engine.device().executed().last()?.commands.iter().find_map(|c| match c {
            Command::ClearDepth { depth, .. } => Some(*depth),
            _ => None,
        })
    }

    #[test]
    fn init_builds_one_pipeline_per_depth_convention() {
        let (engine, _, pso) = setup();
        assert_eq!(engine.device().pipeline_count(), 2);
        assert_ne!(pso.pipeline_for(DepthConvention::Forward), pso.pipeline_for(DepthConvention::Reverse));
        assert_eq!(pso.phase(), PsoPhase::Initialized);
        assert_eq!(
            engine.tracker().baseline(pso.depth_buffer()).unwrap(),
            ResourceState::DepthWrite
        );
    }

    #[test]
    fn render_then_execute_submits_one_draw_per_visible_drawable() {
        let (mut engine, geometry, mut pso) = setup();

        assert_eq!(pso.render(&mut engine, &geometry).unwrap(), 1);
        pso.execute(&mut engine).unwrap();

        let list = engine.device().executed().last().unwrap();
        assert_eq!(list.label, "mesh");
        let draws = list
            .commands
            .iter()
            .filter(|c| matches!(c, Command::DrawIndexed(d) if d.index_count == 36))
            .count();
        assert_eq!(draws, 1);
        assert_eq!(pso.phase(), PsoPhase::Executed);
    }

    #[test]
    fn execute_requires_a_fresh_render() {
        let (mut engine, geometry, mut pso) = setup();
        assert!(pso.execute(&mut engine).is_err());

        pso.render(&mut engine, &geometry).unwrap();
        pso.execute(&mut engine).unwrap();
        assert!(pso.execute(&mut engine).is_err());
    }

    #[test]
    fn toggling_reverse_depth_switches_clear_and_pipeline() {
        let (mut engine, geometry, mut pso) = setup();

        pso.render(&mut engine, &geometry).unwrap();
        pso.execute(&mut engine).unwrap();
        assert_eq!(depth_clear(&engine), Some(1.0));

        assert_eq!(pso.toggle_reverse_depth(), DepthConvention::Reverse);
        assert_eq!(pso.depth_convention().compare(), CompareFunction::Greater);

        pso.render(&mut engine, &geometry).unwrap();
        pso.execute(&mut engine).unwrap();
        assert_eq!(depth_clear(&engine), Some(0.0));

        let bound = engine.device().executed().last().unwrap().commands.iter().find_map(|c| match c {
            Command::SetPipeline(p) => Some(*p),
            _ => None,
        });
        assert_eq!(bound, Some(pso.pipeline_for(DepthConvention::Reverse)));
    }

    fn projection_in_use(engine: &RenderEngine<HeadlessBackend>, pso: &PipelineState) -> Mat4 {
        let region = pso.frame_constants;
        let data = engine.device().read_buffer(region.resource).unwrap();
        let start = region.offset as usize + 64;
        let floats: &[f32] = bytemuck::cast_slice(&data[start..start + 64]);
        Mat4::from_cols_slice(floats)
    }

    #[test]
    fn toggling_depth_reprojects_the_last_camera() {
        let (mut engine, geometry, mut pso) = setup();
        let camera = Camera::default();
        let aspect = pso.extent().aspect();

        pso.update_camera(&mut engine, &camera).unwrap();
        pso.render(&mut engine, &geometry).unwrap();
        pso.execute(&mut engine).unwrap();
        assert_eq!(
            projection_in_use(&engine, &pso),
            camera.projection(aspect, DepthConvention::Forward)
        );

        pso.toggle_reverse_depth();
        pso.render(&mut engine, &geometry).unwrap();
        pso.execute(&mut engine).unwrap();
        assert_eq!(
            projection_in_use(&engine, &pso),
            camera.projection(aspect, DepthConvention::Reverse)
        );
    }

    #[test]
    fn explicit_frame_constants_survive_a_depth_switch() {
        let (mut engine, geometry, mut pso) = setup();
        pso.update_camera(&mut engine, &Camera::default()).unwrap();
        pso.set_frame_constants(&mut engine, &FrameConstants::default()).unwrap();

        pso.toggle_reverse_depth();
        pso.render(&mut engine, &geometry).unwrap();
        pso.execute(&mut engine).unwrap();
        assert_eq!(projection_in_use(&engine, &pso), Mat4::IDENTITY);
    }

    #[test]
    fn resize_recreates_targets() {
        let (mut engine, _, mut pso) = setup();
        let (old_color, old_slot) = (pso.render_target(), pso.descriptor().index());

        pso.resize(&mut engine, Extent::new(640, 480)).unwrap();

        assert_ne!(pso.render_target(), old_color);
        assert!(pso.descriptor().index() > old_slot);
        assert_eq!(
            engine.device().texture_info(pso.depth_buffer()).map(|(e, _)| e),
            Some(Extent::new(640, 480))
        );
        assert!(!engine.tracker().is_tracked(old_color));
    }

    #[test]
    fn swapped_formats_are_rejected() {
        let (mut engine, _, _) = setup();
        let mut info = PipelineCreateInfo::mesh(Extent::new(8, 8), TextureFormat::Depth32Float);
        info.depth_format = TextureFormat::Rgba8Unorm;
        assert!(PipelineState::init(&mut engine, info).is_err());
    }
}
