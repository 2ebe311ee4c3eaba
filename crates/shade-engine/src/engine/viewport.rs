use crate::arena::DescriptorHandle;
use crate::backend::{Extent, GpuBackend, ResourceId, TextureDesc, TextureFormat, ViewDesc};
use crate::barrier::ResourceState;
use crate::error::EngineResult;

use super::render_engine::RenderEngine;

/// Shader-readable mirror of a render target.
///
/// Rests in `ShaderResource` between frames so a UI can sample it through its
/// descriptor. Copies in and out go through the engine's tracked barriers.
#[derive(Debug)]
pub struct ViewportTexture {
    resource: ResourceId,
    descriptor: DescriptorHandle,
    extent: Extent,
    format: TextureFormat,
}

impl ViewportTexture {
    pub fn new<B: GpuBackend>(
        engine: &mut RenderEngine<B>,
        extent: Extent,
        format: TextureFormat,
    ) -> EngineResult<Self> {
        let resource = engine.create_texture(
            &TextureDesc {
                label: "viewport texture",
                extent,
                format,
            },
            ResourceState::ShaderResource,
        )?;
        let descriptor = engine.allocate_descriptor(ViewDesc::Texture2d { format }, resource)?;

        Ok(Self {
            resource,
            descriptor,
            extent,
            format,
        })
    }

    pub fn resource(&self) -> ResourceId {
        self.resource
    }

    pub fn descriptor(&self) -> DescriptorHandle {
        self.descriptor
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Mirrors `src` into this texture on the open frame.
    pub fn copy_from<B: GpuBackend>(&self, engine: &mut RenderEngine<B>, src: ResourceId) -> EngineResult<()> {
        engine.copy_resource(self.resource, src)
    }

    /// Copies this texture into `dst` on the open frame.
    pub fn copy_to<B: GpuBackend>(&self, engine: &mut RenderEngine<B>, dst: ResourceId) -> EngineResult<()> {
        engine.copy_resource(dst, self.resource)
    }

    /// Recreates the texture at a new size.
    ///
    /// Descriptor slots are never reused, so this takes a fresh one.
    pub fn resize<B: GpuBackend>(&mut self, engine: &mut RenderEngine<B>, extent: Extent) -> EngineResult<()> {
        if extent == self.extent {
            return Ok(());
        }
        engine.flush()?;
        engine.destroy_resource(self.resource)?;
        *self = Self::new(engine, extent, self.format)?;
        Ok(())
    }
}
