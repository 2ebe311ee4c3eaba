use crate::arena::{BufferArena, BufferRegion, DescriptorArena, DescriptorHandle};
use crate::backend::{
    Extent, GpuBackend, PipelineId, ResourceId, SwapchainInfo, TextureDesc, ViewDesc,
};
use crate::barrier::{ResourceState, StateTracker};
use crate::cmd::{CommandList, RecordingUnit};
use crate::error::{EngineError, EngineResult};
use crate::geometry::{ColorFill, Mesh, MeshBufferLayout, MeshBufferViews};
use crate::pipeline::{BindingLayout, PipelineDesc};
use crate::submit::SubmissionEngine;
use crate::sync::FenceValue;

use super::config::EngineConfig;

const GEOMETRY_ALIGNMENT: u64 = 4;

#[derive(Debug, Copy, Clone)]
struct FrameState {
    back_buffer: ResourceId,
}

/// Owner of the GPU-facing state for one surface.
///
/// Frame protocol:
/// 1. [`request_frame`](Self::request_frame) waits for the frame slot, acquires
///    the back buffer and opens the frame list with it bound and cleared.
/// 2. Callers record into [`frame_list`](Self::frame_list), submit their own
///    lists through [`submit_draw_list`](Self::submit_draw_list), and copy with
///    [`copy_resource`](Self::copy_resource).
/// 3. [`present_frame`](Self::present_frame) checks that every tracked resource
///    is back at its baseline, submits and flips.
pub struct RenderEngine<B: GpuBackend> {
    backend: B,
    config: EngineConfig,
    submission: SubmissionEngine,
    descriptors: DescriptorArena,
    upload: BufferArena,
    geometry: BufferArena,
    tracker: StateTracker,
    transfer: RecordingUnit,
    swapchain: SwapchainInfo,
    frame: Option<FrameState>,
    shut_down: bool,
}

impl<B: GpuBackend> RenderEngine<B> {
    pub fn new(mut backend: B, config: EngineConfig) -> EngineResult<Self> {
        let submission = SubmissionEngine::new(config.frames_in_flight)?;
        let descriptors = DescriptorArena::create(
            &mut backend,
            config.descriptor_capacity,
            config.reserve_ui_slot,
        )?;
        let upload = BufferArena::create_upload(&mut backend, "upload arena", config.upload_arena_size)?;
        let geometry =
            BufferArena::create_geometry(&mut backend, "geometry arena", config.geometry_arena_size)?;

        let swapchain = backend.swapchain();
        let mut tracker = StateTracker::new();
        for id in swapchain.back_buffers {
            tracker.register(id, ResourceState::Present);
        }
        tracker.register(geometry.resource(), ResourceState::VertexAndConstant);

        log::info!(
            "engine on `{}`: {}x{} {:?}, {} frame(s) in flight, {} descriptors",
            backend.name(),
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.format,
            config.frames_in_flight,
            descriptors.capacity(),
        );

        let mut engine = Self {
            backend,
            config,
            submission,
            descriptors,
            upload,
            geometry,
            tracker,
            transfer: RecordingUnit::new("transfer"),
            swapchain,
            frame: None,
            shut_down: false,
        };
        engine.flush()?;
        Ok(engine)
    }

    // ── frame protocol ───────────────────────────────────────────────────

    /// Opens a frame and returns the back buffer it renders to.
    ///
    /// Blocks until the recording unit this frame reuses has been retired. The
    /// back buffer is moved to `RenderTarget`, bound, and cleared.
    pub fn request_frame(&mut self) -> EngineResult<ResourceId> {
        if self.frame.is_some() {
            return Err(EngineError::Frame("frame requested twice"));
        }

        self.submission.wait_for_unit(&self.backend)?;
        let completed = self.backend.completed_value();
        self.submission.begin_frame(completed)?;

        let back_buffer = match self.backend.acquire_back_buffer() {
            Ok(id) => id,
            Err(e) => {
                self.submission.abandon_frame();
                return Err(e);
            }
        };

        self.tracker.begin_frame();
        let list = self.submission.list_mut()?;
        self.tracker.ensure(list, back_buffer, ResourceState::RenderTarget)?;
        list.set_render_targets(back_buffer, None);
        list.clear_render_target(back_buffer, self.config.clear_color);

        self.frame = Some(FrameState { back_buffer });
        log::trace!("frame {} opened on {back_buffer:?}", self.submission.frames_submitted() + 1);
        Ok(back_buffer)
    }

    /// The open frame's command list.
    pub fn frame_list(&mut self) -> EngineResult<&mut CommandList> {
        self.frame_state()?;
        self.submission.list_mut()
    }

    pub fn back_buffer(&self) -> Option<ResourceId> {
        self.frame.map(|f| f.back_buffer)
    }

    pub fn frame_active(&self) -> bool {
        self.frame.is_some()
    }

    /// Closes, submits and presents the open frame.
    ///
    /// A frame that leaves any tracked resource away from its baseline is not
    /// submitted: its list is dropped, the tracker rolls back and
    /// [`EngineError::UnbalancedTransition`] is returned.
    pub fn present_frame(&mut self) -> EngineResult<FenceValue> {
        let frame = self.frame_state()?;
        let list = self.submission.list_mut()?;
        self.tracker.ensure(list, frame.back_buffer, ResourceState::Present)?;

        if let Err(e) = self.tracker.end_frame() {
            log::error!("frame dropped: {e}");
            self.tracker.discard_frame();
            self.submission.abandon_frame();
            self.backend.discard_back_buffer();
            self.frame = None;
            return Err(e);
        }

        self.frame = None;
        self.upload.flush(&mut self.backend)?;
        let marker = self.submission.submit(&mut self.backend)?;
        self.backend.present()?;

        if self.config.frames_in_flight == 1 {
            self.submission.wait_until_signaled(&self.backend, marker)?;
        }
        Ok(marker)
    }

    /// Drops the open frame without submitting it.
    pub fn abandon_frame(&mut self) {
        if self.frame.take().is_some() {
            self.tracker.discard_frame();
            self.submission.abandon_frame();
            self.backend.discard_back_buffer();
        }
    }

    /// Records `state` for `resource` on the frame list if it is elsewhere.
    pub fn ensure_state(&mut self, resource: ResourceId, state: ResourceState) -> EngineResult<bool> {
        self.frame_state()?;
        let list = self.submission.list_mut()?;
        self.tracker.ensure(list, resource, state)
    }

    /// Records an explicit `from -> to` barrier on the frame list.
    pub fn transition(
        &mut self,
        resource: ResourceId,
        from: ResourceState,
        to: ResourceState,
    ) -> EngineResult<()> {
        self.frame_state()?;
        let list = self.submission.list_mut()?;
        self.tracker.transition(list, resource, from, to)
    }

    /// Copies `src` into `dst` on the frame list.
    ///
    /// Both resources are moved into copy states for the copy and returned to
    /// the states they had before.
    pub fn copy_resource(&mut self, dst: ResourceId, src: ResourceId) -> EngineResult<()> {
        self.frame_state()?;
        let src_before = self.tracker.current(src)?;
        let dst_before = self.tracker.current(dst)?;

        let list = self.submission.list_mut()?;
        self.tracker.ensure(list, src, ResourceState::CopySource)?;
        self.tracker.ensure(list, dst, ResourceState::CopyDest)?;
        list.copy_resource(dst, src);
        self.tracker.ensure(list, src, src_before)?;
        self.tracker.ensure(list, dst, dst_before)?;
        Ok(())
    }

    /// Submits a list owned by another component on the engine's queue.
    ///
    /// Pending upload writes are flushed first so the list sees them.
    pub fn submit_draw_list(&mut self, unit: &mut RecordingUnit) -> EngineResult<FenceValue> {
        self.upload.flush(&mut self.backend)?;
        self.submission.execute_external(&mut self.backend, unit)
    }

    // ── synchronization ─────────────────────────────────────────────────

    pub fn completed_value(&self) -> FenceValue {
        self.backend.completed_value()
    }

    pub fn wait_until_signaled(&self, value: FenceValue) -> EngineResult<()> {
        self.submission.wait_until_signaled(&self.backend, value)
    }

    /// Waits until all submitted work has completed.
    pub fn flush(&mut self) -> EngineResult<FenceValue> {
        self.upload.flush(&mut self.backend)?;
        self.submission.flush(&mut self.backend)
    }

    /// Flushes and recreates the swapchain images.
    pub fn resize(&mut self, width: u32, height: u32) -> EngineResult<()> {
        if self.frame.is_some() {
            return Err(EngineError::Frame("resize while a frame is open"));
        }

        self.flush()?;
        self.backend.resize_swapchain(Extent::new(width, height))?;

        for id in self.swapchain.back_buffers {
            self.tracker.forget(id);
        }
        self.swapchain = self.backend.swapchain();
        for id in self.swapchain.back_buffers {
            self.tracker.register(id, ResourceState::Present);
        }

        log::info!("swapchain resized to {width}x{height}");
        Ok(())
    }

    /// Final flush. Called once on exit; dropping the engine does it too.
    pub fn shutdown(&mut self) -> EngineResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.abandon_frame();
        let value = self.flush()?;
        self.shut_down = true;
        log::info!("engine shut down at fence {value}");
        Ok(())
    }

    // ── arenas ──────────────────────────────────────────────────────────

    pub fn allocate_descriptor(
        &mut self,
        view: ViewDesc,
        resource: ResourceId,
    ) -> EngineResult<DescriptorHandle> {
        self.descriptors.allocate(&mut self.backend, view, resource)
    }

    /// Takes a constant-block aligned region of the upload arena.
    ///
    /// The returned slice is the CPU view of the region. Writes reach the GPU
    /// before the next submission.
    pub fn allocate_upload_region(&mut self, size: u64) -> EngineResult<(BufferRegion, &mut [u8])> {
        let region = self
            .upload
            .allocate_aligned(size, BindingLayout::CONSTANT_BLOCK_SIZE)?;
        let bytes = self.upload.mapped_mut(&region)?;
        Ok((region, bytes))
    }

    /// Overwrites part of an upload region, e.g. constants that change per frame.
    pub fn write_upload(&mut self, region: &BufferRegion, offset: u64, data: &[u8]) -> EngineResult<()> {
        self.upload.write(region, offset, data)
    }

    pub fn allocate_geometry_region(&mut self, size: u64) -> EngineResult<BufferRegion> {
        self.geometry.allocate_aligned(size, GEOMETRY_ALIGNMENT)
    }

    /// Rewinds the upload arena after a flush.
    ///
    /// Every region handed out before is invalid afterwards.
    pub fn reset_upload_arena(&mut self) -> EngineResult<()> {
        if self.frame.is_some() {
            return Err(EngineError::Frame("upload arena reset while a frame is open"));
        }
        self.flush()?;
        self.upload.reset();
        log::debug!("upload arena reset");
        Ok(())
    }

    /// Copies `mesh` into the geometry arena and waits for the copy.
    ///
    /// Attributes are staged through the upload arena in layout order and moved
    /// with one buffer copy, bracketed by `CopyDest` barriers on the geometry
    /// buffer.
    ///
    /// The transfer list reaches the queue ahead of the open frame's list, so
    /// uploads are only accepted between frames.
    pub fn upload_mesh(&mut self, mesh: &Mesh, fill: ColorFill) -> EngineResult<MeshBufferViews> {
        if self.frame.is_some() {
            return Err(EngineError::Frame("mesh upload while a frame is open"));
        }

        let layout = MeshBufferLayout::for_mesh(mesh);
        let bytes = layout.encode(mesh, fill);

        let staging = self.upload.allocate_with(&bytes, GEOMETRY_ALIGNMENT)?;
        let target = self.geometry.allocate_aligned(layout.total, GEOMETRY_ALIGNMENT)?;
        self.upload.flush(&mut self.backend)?;

        let completed = self.backend.completed_value();
        let list = self.transfer.reset(completed)?;
        let geometry = self.geometry.resource();
        self.tracker.ensure(list, geometry, ResourceState::CopyDest)?;
        list.copy_buffer_region(
            target.resource,
            target.offset,
            staging.resource,
            staging.offset,
            layout.total,
        );
        self.tracker.ensure(list, geometry, ResourceState::VertexAndConstant)?;

        let marker = self
            .submission
            .execute_external(&mut self.backend, &mut self.transfer)?;
        self.submission.wait_until_signaled(&self.backend, marker)?;

        log::debug!(
            "mesh `{}` uploaded: {} bytes at geometry offset {}",
            mesh.name(),
            layout.total,
            target.offset
        );
        Ok(MeshBufferViews::new(layout, target))
    }

    // ── resources ───────────────────────────────────────────────────────

    /// Creates a texture tracked with `baseline` as its end-of-frame state.
    pub fn create_texture(
        &mut self,
        desc: &TextureDesc<'_>,
        baseline: ResourceState,
    ) -> EngineResult<ResourceId> {
        let id = self.backend.create_texture(desc)?;
        self.tracker.register(id, baseline);
        Ok(id)
    }

    /// Releases a resource. The caller has flushed any work using it.
    pub fn destroy_resource(&mut self, resource: ResourceId) -> EngineResult<()> {
        self.tracker.forget(resource);
        self.backend.destroy(resource)
    }

    pub fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> EngineResult<PipelineId> {
        self.backend.create_pipeline(desc)
    }

    // ── accessors ───────────────────────────────────────────────────────

    /// The backend, and through it the native device.
    pub fn device(&self) -> &B {
        &self.backend
    }

    pub fn device_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn swapchain(&self) -> &SwapchainInfo {
        &self.swapchain
    }

    pub fn descriptors(&self) -> &DescriptorArena {
        &self.descriptors
    }

    pub fn upload_arena(&self) -> &BufferArena {
        &self.upload
    }

    pub fn geometry_arena(&self) -> &BufferArena {
        &self.geometry
    }

    pub fn tracker(&self) -> &StateTracker {
        &self.tracker
    }

    pub fn submission(&self) -> &SubmissionEngine {
        &self.submission
    }

    fn frame_state(&self) -> EngineResult<FrameState> {
        self.frame.ok_or(EngineError::Frame("no frame requested"))
    }
}

impl<B: GpuBackend> Drop for RenderEngine<B> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("engine shutdown failed: {e:#}");
        }
    }
}
