use std::collections::{HashMap, VecDeque};
use std::num::NonZeroU64;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use winit::dpi::PhysicalSize;

use crate::cmd::{
    BufferSpan, Command, CommandList, DrawIndexed, IndexBufferView, ScissorRect, VertexBufferView,
    Viewport,
};
use crate::device::{Gpu, SurfaceErrorAction, from_wgpu_format, to_wgpu_format};
use crate::error::{EngineError, EngineResult};
use crate::pipeline::{BindingLayout, CompareFunction, CullMode, PipelineDesc, VertexFormat};
use crate::sync::{FenceValue, Timeline};

use super::GpuBackend;
use super::types::{
    BACK_BUFFER_COUNT, BufferDesc, DescriptorHeapInfo, Extent, GpuAddress, MemoryKind, PipelineId,
    ResourceId, SwapchainInfo, TextureDesc, TextureFormat, ViewDesc,
};

// wgpu has no buffer device addresses. Addresses are synthesized so that
// region arithmetic stays meaningful across backends.
const BUFFER_ADDRESS_BASE: u64 = 0x1_0000_0000;
const BUFFER_ADDRESS_ALIGNMENT: u64 = 0x1_0000;
const DESCRIPTOR_STRIDE: u32 = 32;
const DESCRIPTOR_CPU_BASE: u64 = 0x7000_0000;
const DESCRIPTOR_GPU_BASE: u64 = 0x8000_0000_0000;

enum Slot {
    Buffer {
        buffer: wgpu::Buffer,
        address: GpuAddress,
    },
    Texture {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
        extent: Extent,
    },
    BackBuffer,
    Released,
}

enum DescriptorView {
    Texture(wgpu::TextureView),
    Buffer {
        resource: ResourceId,
        offset: u64,
        size: u64,
    },
}

struct PipelineEntry {
    pipeline: wgpu::RenderPipeline,
    constant_layouts: Vec<wgpu::BindGroupLayout>,
}

/// [`GpuBackend`] on top of a wgpu device and window surface.
///
/// Command lists are translated into one encoder per list: consecutive draws
/// against the same targets become one render pass, copies are encoded between
/// passes. wgpu tracks resource usage itself, so transition barriers are
/// checked by the engine's tracker and not forwarded.
pub struct WgpuBackend<'w> {
    gpu: Gpu<'w>,
    name: String,
    surface_format: TextureFormat,

    resources: Vec<Slot>,
    next_address: u64,
    heap: Option<DescriptorHeapInfo>,
    descriptors: Vec<Option<DescriptorView>>,
    pipelines: Vec<PipelineEntry>,
    bind_groups: HashMap<(PipelineId, u32, ResourceId), wgpu::BindGroup>,

    back_buffers: [ResourceId; BACK_BUFFER_COUNT],
    current_back_buffer: usize,
    acquired: Option<(wgpu::SurfaceTexture, wgpu::TextureView)>,

    submissions: VecDeque<(FenceValue, wgpu::SubmissionIndex)>,
    completed: Arc<AtomicU64>,
}

impl<'w> WgpuBackend<'w> {
    pub fn new(gpu: Gpu<'w>) -> EngineResult<Self> {
        let surface_format = from_wgpu_format(gpu.surface_format()).ok_or_else(|| {
            EngineError::Init(format!("unsupported surface format {:?}", gpu.surface_format()))
        })?;
        let name = gpu.adapter().get_info().name;

        let mut resources = Vec::new();
        let mut back_buffers = [ResourceId::from_index(0); BACK_BUFFER_COUNT];
        for slot in back_buffers.iter_mut() {
            *slot = ResourceId::from_index(resources.len() as u32);
            resources.push(Slot::BackBuffer);
        }

        Ok(Self {
            gpu,
            name,
            surface_format,
            resources,
            next_address: BUFFER_ADDRESS_BASE,
            heap: None,
            descriptors: Vec::new(),
            pipelines: Vec::new(),
            bind_groups: HashMap::new(),
            back_buffers,
            current_back_buffer: 0,
            acquired: None,
            submissions: VecDeque::new(),
            completed: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Underlying device context, for collaborators that create their own wgpu objects.
    pub fn gpu(&self) -> &Gpu<'w> {
        &self.gpu
    }

    /// wgpu view written into a descriptor slot, if it is a texture view.
    pub fn descriptor_view(&self, slot: u32) -> Option<&wgpu::TextureView> {
        match self.descriptors.get(slot as usize)? {
            Some(DescriptorView::Texture(view)) => Some(view),
            _ => None,
        }
    }

    /// Buffer range written into a descriptor slot.
    pub fn descriptor_buffer(&self, slot: u32) -> Option<(&wgpu::Buffer, u64, u64)> {
        match self.descriptors.get(slot as usize)? {
            Some(DescriptorView::Buffer {
                resource,
                offset,
                size,
            }) => self.buffer(*resource).ok().map(|b| (b, *offset, *size)),
            _ => None,
        }
    }

    pub fn texture(&self, resource: ResourceId) -> Option<&wgpu::Texture> {
        match self.resources.get(resource.index())? {
            Slot::Texture { texture, .. } => Some(texture),
            Slot::BackBuffer => self.acquired.as_ref().map(|(st, _)| &st.texture),
            _ => None,
        }
    }

    fn buffer(&self, resource: ResourceId) -> EngineResult<&wgpu::Buffer> {
        match self.resources.get(resource.index()) {
            Some(Slot::Buffer { buffer, .. }) => Ok(buffer),
            _ => Err(EngineError::UnknownResource(resource)),
        }
    }

    fn texture_view(&self, resource: ResourceId) -> EngineResult<&wgpu::TextureView> {
        match self.resources.get(resource.index()) {
            Some(Slot::Texture { view, .. }) => Ok(view),
            Some(Slot::BackBuffer) => self
                .acquired
                .as_ref()
                .map(|(_, view)| view)
                .ok_or(EngineError::Frame("back buffer used before acquire")),
            _ => Err(EngineError::UnknownResource(resource)),
        }
    }

    fn texture_extent(&self, resource: ResourceId) -> Option<Extent> {
        match self.resources.get(resource.index())? {
            Slot::Texture { extent, .. } => Some(*extent),
            Slot::BackBuffer => {
                let size = self.gpu.size();
                Some(Extent::new(size.width, size.height))
            }
            _ => None,
        }
    }

    fn push_resource(&mut self, slot: Slot) -> ResourceId {
        let id = ResourceId::from_index(self.resources.len() as u32);
        self.resources.push(slot);
        id
    }

    fn prepare_bind_groups(&mut self, passes: &[Pass]) -> EngineResult<()> {
        for pass in passes {
            let Pass::Render(plan) = pass else { continue };
            for draw in &plan.draws {
                for &(slot, span) in &draw.constants {
                    let key = (draw.pipeline, slot, span.resource);
                    if self.bind_groups.contains_key(&key) {
                        continue;
                    }

                    let entry = self.pipelines.get(draw.pipeline.index()).ok_or_else(|| {
                        EngineError::Submit(format!("unknown pipeline {:?}", draw.pipeline))
                    })?;
                    let layout = entry.constant_layouts.get(slot as usize).ok_or_else(|| {
                        EngineError::Submit(format!("pipeline has no constant slot {slot}"))
                    })?;
                    let buffer = self.buffer(span.resource)?;

                    let group = self.gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("constants"),
                        layout,
                        entries: &[wgpu::BindGroupEntry {
                            binding: 0,
                            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                                buffer,
                                offset: 0,
                                size: NonZeroU64::new(BindingLayout::CONSTANT_BLOCK_SIZE),
                            }),
                        }],
                    });
                    self.bind_groups.insert(key, group);
                }
            }
        }
        Ok(())
    }

    fn encode_render_pass(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        plan: &RenderPlan,
    ) -> EngineResult<()> {
        let color_view = plan.color.map(|id| self.texture_view(id)).transpose()?;
        let depth_view = plan.depth.map(|id| self.texture_view(id)).transpose()?;

        let color_attachment = color_view.map(|view| wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: match plan.clear_color {
                    Some([r, g, b, a]) => wgpu::LoadOp::Clear(wgpu::Color {
                        r: r as f64,
                        g: g as f64,
                        b: b as f64,
                        a: a as f64,
                    }),
                    None => wgpu::LoadOp::Load,
                },
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        });
        let color_attachments = [color_attachment];

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: if plan.color.is_some() {
                &color_attachments[..]
            } else {
                &[]
            },
            depth_stencil_attachment: depth_view.map(|view| {
                wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: plan
                            .clear_depth
                            .map_or(wgpu::LoadOp::Load, wgpu::LoadOp::Clear),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });

        for draw in &plan.draws {
            let entry = self
                .pipelines
                .get(draw.pipeline.index())
                .ok_or_else(|| EngineError::Submit(format!("unknown pipeline {:?}", draw.pipeline)))?;
            pass.set_pipeline(&entry.pipeline);

            if let Some(vp) = draw.viewport {
                pass.set_viewport(vp.x, vp.y, vp.width, vp.height, vp.min_depth, vp.max_depth);
            }
            if let Some(sc) = draw.scissor {
                pass.set_scissor_rect(sc.x, sc.y, sc.width, sc.height);
            }

            for &(slot, span) in &draw.constants {
                let group = self
                    .bind_groups
                    .get(&(draw.pipeline, slot, span.resource))
                    .ok_or_else(|| EngineError::Submit(format!("constants for slot {slot} missing")))?;
                pass.set_bind_group(slot, group, &[span.offset as u32]);
            }

            for &(slot, view) in &draw.vertex {
                let buffer = self.buffer(view.span.resource)?;
                pass.set_vertex_buffer(slot, buffer.slice(view.span.offset..view.span.end()));
            }

            let index = draw
                .index
                .ok_or_else(|| EngineError::Submit("indexed draw without an index buffer".into()))?;
            let buffer = self.buffer(index.span.resource)?;
            pass.set_index_buffer(
                buffer.slice(index.span.offset..index.span.end()),
                wgpu::IndexFormat::Uint32,
            );

            let a = draw.args;
            pass.draw_indexed(
                a.first_index..a.first_index + a.index_count,
                a.base_vertex,
                a.first_instance..a.first_instance + a.instance_count,
            );
        }

        Ok(())
    }

    fn encode_copy(&self, encoder: &mut wgpu::CommandEncoder, command: &Command) -> EngineResult<()> {
        match *command {
            Command::CopyBufferRegion {
                dst,
                dst_offset,
                src,
                src_offset,
                size,
            } => {
                encoder.copy_buffer_to_buffer(
                    self.buffer(src)?,
                    src_offset,
                    self.buffer(dst)?,
                    dst_offset,
                    size,
                );
            }
            Command::CopyResource { dst, src } => {
                if let (Ok(src), Ok(dst)) = (self.buffer(src), self.buffer(dst)) {
                    encoder.copy_buffer_to_buffer(src, 0, dst, 0, src.size().min(dst.size()));
                    return Ok(());
                }

                let (src_tex, dst_tex) = match (self.texture(src), self.texture(dst)) {
                    (Some(s), Some(d)) => (s, d),
                    _ => return Err(EngineError::Submit(format!("cannot copy {src:?} to {dst:?}"))),
                };
                let (se, de) = (
                    self.texture_extent(src).unwrap_or(Extent::new(0, 0)),
                    self.texture_extent(dst).unwrap_or(Extent::new(0, 0)),
                );
                encoder.copy_texture_to_texture(
                    src_tex.as_image_copy(),
                    dst_tex.as_image_copy(),
                    wgpu::Extent3d {
                        width: se.width.min(de.width),
                        height: se.height.min(de.height),
                        depth_or_array_layers: 1,
                    },
                );
            }
            _ => {}
        }
        Ok(())
    }

    fn retire_submissions(&mut self) {
        let completed = self.completed.load(Ordering::Acquire);
        while self
            .submissions
            .front()
            .is_some_and(|(v, _)| v.get() <= completed)
        {
            self.submissions.pop_front();
        }
    }
}

impl Timeline for WgpuBackend<'_> {
    fn signal(&mut self, value: FenceValue) -> EngineResult<()> {
        if self.gpu.is_lost() {
            return Err(EngineError::Submit("device lost".into()));
        }
        self.retire_submissions();

        // An empty submission marks the point after all previously submitted work.
        let index = self.gpu.queue().submit(std::iter::empty());
        let completed = Arc::clone(&self.completed);
        self.gpu.queue().on_submitted_work_done(move || {
            completed.fetch_max(value.get(), Ordering::AcqRel);
        });
        self.submissions.push_back((value, index));
        Ok(())
    }

    fn completed_value(&self) -> FenceValue {
        if let Err(e) = self.gpu.device().poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {e}");
        }
        FenceValue::new(self.completed.load(Ordering::Acquire))
    }

    fn wait_for(&self, value: FenceValue) -> EngineResult<()> {
        if self.completed.load(Ordering::Acquire) >= value.get() {
            return Ok(());
        }
        if self.gpu.is_lost() {
            return Err(EngineError::DeviceLost { value });
        }

        let index = self
            .submissions
            .iter()
            .find(|(v, _)| *v >= value)
            .map(|(_, index)| index.clone());

        self.gpu
            .device()
            .poll(wgpu::PollType::Wait {
                submission_index: index,
                timeout: None,
            })
            .map_err(|e| {
                log::error!("wait for fence {value} failed: {e}");
                EngineError::DeviceLost { value }
            })?;

        self.completed.fetch_max(value.get(), Ordering::AcqRel);
        Ok(())
    }
}

impl GpuBackend for WgpuBackend<'_> {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> EngineResult<ResourceId> {
        let usage = match desc.memory {
            MemoryKind::Upload => {
                wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::INDEX
                    | wgpu::BufferUsages::UNIFORM
            }
            MemoryKind::DeviceLocal => {
                wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC
                    | wgpu::BufferUsages::VERTEX
                    | wgpu::BufferUsages::INDEX
            }
        };

        let buffer = self.gpu.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some(desc.label),
            size: desc.size,
            usage,
            mapped_at_creation: false,
        });

        let address = GpuAddress(self.next_address);
        self.next_address += crate::arena::align_up(desc.size.max(1), BUFFER_ADDRESS_ALIGNMENT);
        Ok(self.push_resource(Slot::Buffer { buffer, address }))
    }

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> EngineResult<ResourceId> {
        if desc.extent.is_empty() {
            return Err(EngineError::Init(format!("texture `{}` has zero size", desc.label)));
        }

        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC;
        if !desc.format.is_depth() {
            usage |= wgpu::TextureUsages::COPY_DST;
        }

        let texture = self.gpu.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size: wgpu::Extent3d {
                width: desc.extent.width,
                height: desc.extent.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: to_wgpu_format(desc.format),
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(self.push_resource(Slot::Texture {
            texture,
            view,
            extent: desc.extent,
        }))
    }

    fn destroy(&mut self, resource: ResourceId) -> EngineResult<()> {
        let slot = self
            .resources
            .get_mut(resource.index())
            .ok_or(EngineError::UnknownResource(resource))?;

        match std::mem::replace(slot, Slot::Released) {
            Slot::Buffer { buffer, .. } => buffer.destroy(),
            Slot::Texture { texture, .. } => texture.destroy(),
            Slot::BackBuffer => {
                *slot = Slot::BackBuffer;
                return Err(EngineError::Frame("swapchain images belong to the surface"));
            }
            Slot::Released => return Err(EngineError::UnknownResource(resource)),
        }

        self.bind_groups.retain(|(_, _, r), _| *r != resource);
        Ok(())
    }

    fn gpu_address(&self, resource: ResourceId) -> EngineResult<GpuAddress> {
        match self.resources.get(resource.index()) {
            Some(Slot::Buffer { address, .. }) => Ok(*address),
            _ => Err(EngineError::UnknownResource(resource)),
        }
    }

    fn write_buffer(&mut self, resource: ResourceId, offset: u64, data: &[u8]) -> EngineResult<()> {
        let buffer = self.buffer(resource)?;
        let end = offset + data.len() as u64;
        if end > buffer.size() {
            return Err(EngineError::OutOfBounds {
                offset,
                end,
                size: buffer.size(),
            });
        }
        self.gpu.queue().write_buffer(buffer, offset, data);
        Ok(())
    }

    fn create_descriptor_heap(&mut self, capacity: u32) -> EngineResult<DescriptorHeapInfo> {
        if self.heap.is_some() {
            return Err(EngineError::Init("descriptor heap already created".into()));
        }
        let heap = DescriptorHeapInfo {
            capacity,
            stride: DESCRIPTOR_STRIDE,
            cpu_base: DESCRIPTOR_CPU_BASE,
            gpu_base: GpuAddress(DESCRIPTOR_GPU_BASE),
        };
        self.descriptors = (0..capacity).map(|_| None).collect();
        self.heap = Some(heap);
        Ok(heap)
    }

    fn write_descriptor(
        &mut self,
        slot: u32,
        resource: ResourceId,
        view: &ViewDesc,
    ) -> EngineResult<()> {
        let written = match *view {
            ViewDesc::Texture2d { format } => {
                let texture = match self.resources.get(resource.index()) {
                    Some(Slot::Texture { texture, .. }) => texture,
                    _ => return Err(EngineError::UnknownResource(resource)),
                };
                DescriptorView::Texture(texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("descriptor view"),
                    format: Some(to_wgpu_format(format)),
                    ..Default::default()
                }))
            }
            ViewDesc::Buffer { offset, size } => {
                self.buffer(resource)?;
                DescriptorView::Buffer {
                    resource,
                    offset,
                    size,
                }
            }
        };

        let entry = self
            .descriptors
            .get_mut(slot as usize)
            .ok_or(EngineError::Frame("descriptor slot outside the heap"))?;
        *entry = Some(written);
        Ok(())
    }

    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> EngineResult<PipelineId> {
        let device = self.gpu.device();

        for (i, stream) in desc.vertex_streams.iter().enumerate() {
            if stream.slot as usize != i {
                return Err(EngineError::Pipeline {
                    label: desc.label.to_string(),
                    reason: format!("vertex stream {i} declared for slot {}", stream.slot),
                });
            }
        }

        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&desc.shader.label),
            source: wgpu::ShaderSource::Wgsl(desc.shader.wgsl.clone()),
        });

        let constant_layouts: Vec<_> = (0..desc.layout.constant_slots)
            .map(|slot| {
                device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("{} constants {slot}", desc.label)),
                    entries: &[wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: true,
                            min_binding_size: NonZeroU64::new(BindingLayout::CONSTANT_BLOCK_SIZE),
                        },
                        count: None,
                    }],
                })
            })
            .collect();
        let layout_refs: Vec<_> = constant_layouts.iter().collect();

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(desc.label),
            bind_group_layouts: &layout_refs,
            immediate_size: 0,
        });

        let attributes: Vec<[wgpu::VertexAttribute; 1]> = desc
            .vertex_streams
            .iter()
            .map(|s| {
                [wgpu::VertexAttribute {
                    format: match s.format {
                        VertexFormat::Float32x3 => wgpu::VertexFormat::Float32x3,
                        VertexFormat::Float32x4 => wgpu::VertexFormat::Float32x4,
                    },
                    offset: 0,
                    shader_location: s.location,
                }]
            })
            .collect();
        let buffers: Vec<_> = desc
            .vertex_streams
            .iter()
            .zip(&attributes)
            .map(|(s, attrs)| wgpu::VertexBufferLayout {
                array_stride: s.stride() as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: attrs,
            })
            .collect();

        let fixed = &desc.fixed;
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(desc.label),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &module,
                entry_point: Some(&desc.shader.vertex_entry),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: match fixed.cull {
                    CullMode::None => None,
                    CullMode::Front => Some(wgpu::Face::Front),
                    CullMode::Back => Some(wgpu::Face::Back),
                },
                ..Default::default()
            },
            depth_stencil: fixed.depth_format.map(|format| wgpu::DepthStencilState {
                format: to_wgpu_format(format),
                depth_write_enabled: true,
                depth_compare: match fixed.depth_compare {
                    CompareFunction::Less => wgpu::CompareFunction::Less,
                    CompareFunction::LessEqual => wgpu::CompareFunction::LessEqual,
                    CompareFunction::Greater => wgpu::CompareFunction::Greater,
                    CompareFunction::GreaterEqual => wgpu::CompareFunction::GreaterEqual,
                    CompareFunction::Always => wgpu::CompareFunction::Always,
                },
                stencil: Default::default(),
                bias: Default::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &module,
                entry_point: Some(&desc.shader.fragment_entry),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: to_wgpu_format(fixed.color_format),
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            multiview_mask: None,
            cache: None,
        });

        let id = PipelineId::from_index(self.pipelines.len() as u32);
        self.pipelines.push(PipelineEntry {
            pipeline,
            constant_layouts,
        });
        log::debug!("pipeline `{}` created as {id:?}", desc.label);
        Ok(id)
    }

    fn execute(&mut self, list: &CommandList) -> EngineResult<()> {
        let passes = plan_passes(list)?;
        self.prepare_bind_groups(&passes)?;

        let mut encoder = self
            .gpu
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(list.label()),
            });

        for pass in &passes {
            match pass {
                Pass::Render(plan) => self.encode_render_pass(&mut encoder, list.label(), plan)?,
                Pass::Copy(command) => self.encode_copy(&mut encoder, command)?,
            }
        }

        self.gpu.queue().submit(std::iter::once(encoder.finish()));
        log::trace!("submitted `{}` as {} passes", list.label(), passes.len());
        Ok(())
    }

    fn swapchain(&self) -> SwapchainInfo {
        let size = self.gpu.size();
        SwapchainInfo {
            extent: Extent::new(size.width, size.height),
            format: self.surface_format,
            back_buffers: self.back_buffers,
        }
    }

    fn acquire_back_buffer(&mut self) -> EngineResult<ResourceId> {
        if self.acquired.is_some() {
            return Err(EngineError::Frame("back buffer acquired twice"));
        }

        let surface_texture = match self.gpu.acquire() {
            Ok(t) => t,
            Err(err) => {
                let msg = err.to_string();
                return match self.gpu.handle_surface_error(err) {
                    SurfaceErrorAction::Fatal => Err(EngineError::Submit(msg)),
                    SurfaceErrorAction::Reconfigured | SurfaceErrorAction::SkipFrame => {
                        Err(EngineError::Surface(msg))
                    }
                };
            }
        };

        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.acquired = Some((surface_texture, view));
        Ok(self.back_buffers[self.current_back_buffer])
    }

    fn present(&mut self) -> EngineResult<()> {
        let (surface_texture, view) = self
            .acquired
            .take()
            .ok_or(EngineError::Frame("present without an acquired back buffer"))?;
        drop(view);
        surface_texture.present();
        self.current_back_buffer = (self.current_back_buffer + 1) % BACK_BUFFER_COUNT;
        Ok(())
    }

    fn discard_back_buffer(&mut self) {
        // Dropping a surface texture without presenting returns it to the surface.
        self.acquired = None;
    }

    fn resize_swapchain(&mut self, extent: Extent) -> EngineResult<()> {
        self.acquired = None;
        self.gpu.resize(PhysicalSize::new(extent.width, extent.height));
        self.current_back_buffer = 0;
        if extent.is_empty() {
            return Err(EngineError::Surface("zero-sized swapchain".into()));
        }
        Ok(())
    }
}

// ── list translation ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
struct PlannedDraw {
    pipeline: PipelineId,
    viewport: Option<Viewport>,
    scissor: Option<ScissorRect>,
    constants: Vec<(u32, BufferSpan)>,
    vertex: Vec<(u32, VertexBufferView)>,
    index: Option<IndexBufferView>,
    args: DrawIndexed,
}

#[derive(Debug, Clone, PartialEq)]
struct RenderPlan {
    color: Option<ResourceId>,
    depth: Option<ResourceId>,
    clear_color: Option<[f32; 4]>,
    clear_depth: Option<f32>,
    draws: Vec<PlannedDraw>,
}

impl RenderPlan {
    fn new(color: Option<ResourceId>, depth: Option<ResourceId>) -> Self {
        Self {
            color,
            depth,
            clear_color: None,
            clear_depth: None,
            draws: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Pass {
    Render(RenderPlan),
    Copy(Command),
}

/// Groups a list into render passes and copies.
///
/// Clears become load ops of the pass that follows them. Barriers carry no
/// work of their own under wgpu and are dropped here.
fn plan_passes(list: &CommandList) -> EngineResult<Vec<Pass>> {
    let mut passes = Vec::new();
    let mut plan: Option<RenderPlan> = None;
    let mut targets: Option<(ResourceId, Option<ResourceId>)> = None;

    let mut pipeline = None;
    let mut viewport = None;
    let mut scissor = None;
    let mut constants: Vec<(u32, BufferSpan)> = Vec::new();
    let mut vertex: Vec<(u32, VertexBufferView)> = Vec::new();
    let mut index = None;

    fn close(passes: &mut Vec<Pass>, plan: &mut Option<RenderPlan>) {
        if let Some(p) = plan.take() {
            passes.push(Pass::Render(p));
        }
    }

    for command in list.commands() {
        match command {
            Command::Barrier(_) => {}
            Command::SetPipeline(p) => pipeline = Some(*p),
            Command::SetViewport(v) => viewport = Some(*v),
            Command::SetScissor(s) => scissor = Some(*s),
            Command::SetConstants { slot, span } => {
                constants.retain(|(s, _)| s != slot);
                constants.push((*slot, *span));
            }
            Command::SetVertexBuffer { slot, view } => {
                vertex.retain(|(s, _)| s != slot);
                vertex.push((*slot, *view));
            }
            Command::SetIndexBuffer(view) => index = Some(*view),
            Command::SetRenderTargets { color, depth } => {
                close(&mut passes, &mut plan);
                targets = Some((*color, *depth));
            }
            Command::ClearColor { target, color } => {
                let reusable = plan
                    .as_ref()
                    .is_some_and(|p| p.color == Some(*target) && p.draws.is_empty());
                if !reusable {
                    close(&mut passes, &mut plan);
                    let depth = targets.filter(|(c, _)| c == target).and_then(|(_, d)| d);
                    plan = Some(RenderPlan::new(Some(*target), depth));
                }
                if let Some(p) = plan.as_mut() {
                    p.clear_color = Some(*color);
                }
            }
            Command::ClearDepth { target, depth } => {
                let reusable = plan
                    .as_ref()
                    .is_some_and(|p| p.depth == Some(*target) && p.draws.is_empty());
                if !reusable {
                    close(&mut passes, &mut plan);
                    let color = targets.filter(|(_, d)| *d == Some(*target)).map(|(c, _)| c);
                    plan = Some(RenderPlan::new(color, Some(*target)));
                }
                if let Some(p) = plan.as_mut() {
                    p.clear_depth = Some(*depth);
                }
            }
            Command::DrawIndexed(args) => {
                let current = match plan.as_mut() {
                    Some(p) => p,
                    None => {
                        let (color, depth) = targets.ok_or_else(|| {
                            EngineError::Submit(format!("`{}` draws without render targets", list.label()))
                        })?;
                        plan.insert(RenderPlan::new(Some(color), depth))
                    }
                };
                let pipeline = pipeline.ok_or_else(|| {
                    EngineError::Submit(format!("`{}` draws without a pipeline", list.label()))
                })?;
                current.draws.push(PlannedDraw {
                    pipeline,
                    viewport,
                    scissor,
                    constants: constants.clone(),
                    vertex: vertex.clone(),
                    index,
                    args: *args,
                });
            }
            Command::CopyResource { .. } | Command::CopyBufferRegion { .. } => {
                close(&mut passes, &mut plan);
                passes.push(Pass::Copy(command.clone()));
            }
        }
    }

    close(&mut passes, &mut plan);
    Ok(passes)
}
