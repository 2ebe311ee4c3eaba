//! GPU backends.
//!
//! The core subsystem only talks to the GPU through [`GpuBackend`]. Two
//! implementations exist:
//! - [`WgpuBackend`]: the real device and window surface
//! - [`HeadlessBackend`]: a software timeline for tests and windowless runs

mod headless;
mod native;
mod types;

pub use headless::{ExecutedList, HeadlessBackend, HeadlessConfig, LatencyModel};
pub use native::WgpuBackend;
pub use types::{
    BACK_BUFFER_COUNT, BufferDesc, DescriptorHeapInfo, Extent, GpuAddress, MemoryKind, PipelineId,
    ResourceId, SwapchainInfo, TextureDesc, TextureFormat, ViewDesc,
};

use crate::cmd::CommandList;
use crate::error::EngineResult;
use crate::pipeline::PipelineDesc;
use crate::sync::Timeline;

/// Everything the core needs from a device.
///
/// Resources are referred to by [`ResourceId`] handles. Lists handed to
/// [`execute`](Self::execute) run in call order on a single queue, and
/// [`Timeline::signal`] is ordered behind them.
pub trait GpuBackend: Timeline {
    /// Human-readable adapter/backend name.
    fn name(&self) -> &str;

    fn create_buffer(&mut self, desc: &BufferDesc<'_>) -> EngineResult<ResourceId>;

    fn create_texture(&mut self, desc: &TextureDesc<'_>) -> EngineResult<ResourceId>;

    /// Releases a resource. The caller guarantees no pending GPU work uses it.
    fn destroy(&mut self, resource: ResourceId) -> EngineResult<()>;

    fn gpu_address(&self, resource: ResourceId) -> EngineResult<GpuAddress>;

    /// Copies CPU bytes into a buffer ahead of the next executed list.
    fn write_buffer(&mut self, resource: ResourceId, offset: u64, data: &[u8]) -> EngineResult<()>;

    fn create_descriptor_heap(&mut self, capacity: u32) -> EngineResult<DescriptorHeapInfo>;

    fn write_descriptor(
        &mut self,
        slot: u32,
        resource: ResourceId,
        view: &ViewDesc,
    ) -> EngineResult<()>;

    fn create_pipeline(&mut self, desc: &PipelineDesc<'_>) -> EngineResult<PipelineId>;

    /// Hands a closed list to the queue.
    fn execute(&mut self, list: &CommandList) -> EngineResult<()>;

    fn swapchain(&self) -> SwapchainInfo;

    /// Acquires the swapchain image for the next frame.
    fn acquire_back_buffer(&mut self) -> EngineResult<ResourceId>;

    /// Flips the acquired image to the screen.
    fn present(&mut self) -> EngineResult<()>;

    /// Gives the acquired image back without showing it.
    fn discard_back_buffer(&mut self);

    /// Recreates the swapchain images. The caller has flushed the fence.
    fn resize_swapchain(&mut self, extent: Extent) -> EngineResult<()>;
}
