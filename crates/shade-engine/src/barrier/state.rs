use crate::backend::ResourceId;

/// Declared access state of a GPU resource.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum ResourceState {
    Common,
    /// Swapchain image handed to (or returned from) the presentation engine.
    Present,
    RenderTarget,
    CopySource,
    CopyDest,
    /// Sampled or read from a shader.
    ShaderResource,
    DepthWrite,
    /// Bound as vertex, index or constant data.
    VertexAndConstant,
}

impl ResourceState {
    /// States a resource may be written in.
    pub fn is_write(self) -> bool {
        matches!(
            self,
            ResourceState::RenderTarget | ResourceState::CopyDest | ResourceState::DepthWrite
        )
    }
}

/// A recorded state transition.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Barrier {
    pub resource: ResourceId,
    pub before: ResourceState,
    pub after: ResourceState,
}

impl Barrier {
    /// The transition undoing this one.
    pub fn reversed(self) -> Self {
        Self {
            resource: self.resource,
            before: self.after,
            after: self.before,
        }
    }
}
