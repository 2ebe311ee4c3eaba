/// Number of swapchain images. The presentation surface is double-buffered.
pub const BACK_BUFFER_COUNT: usize = 2;

/// Handle to a buffer or texture owned by a backend.
///
/// Handles are indices into the backend's resource table and are never reused
/// within a session.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ResourceId(u32);

impl ResourceId {
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a compiled pipeline owned by a backend.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PipelineId(u32);

impl PipelineId {
    pub const fn from_index(index: u32) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Virtual address of GPU memory as seen by shaders and descriptor tables.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct GpuAddress(pub u64);

impl GpuAddress {
    pub const fn offset(self, bytes: u64) -> Self {
        Self(self.0 + bytes)
    }
}

/// Heap a buffer is committed in.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MemoryKind {
    /// CPU-writable, GPU-readable.
    Upload,
    /// GPU-only; filled by copies.
    DeviceLocal,
}

#[derive(Debug, Clone)]
pub struct BufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub memory: MemoryKind,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum TextureFormat {
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::Depth32Float)
    }

    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::Rgba16Float => 8,
            _ => 4,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect(self) -> f32 {
        self.width.max(1) as f32 / self.height.max(1) as f32
    }
}

#[derive(Debug, Clone)]
pub struct TextureDesc<'a> {
    pub label: &'a str,
    pub extent: Extent,
    pub format: TextureFormat,
}

/// Shader-visible view written into a descriptor slot.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ViewDesc {
    Texture2d { format: TextureFormat },
    Buffer { offset: u64, size: u64 },
}

/// Location and layout of the shader-visible descriptor heap.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DescriptorHeapInfo {
    pub capacity: u32,
    pub stride: u32,
    pub cpu_base: u64,
    pub gpu_base: GpuAddress,
}

/// Current swapchain configuration.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct SwapchainInfo {
    pub extent: Extent,
    pub format: TextureFormat,
    pub back_buffers: [ResourceId; BACK_BUFFER_COUNT],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_offsets_add() {
        assert_eq!(GpuAddress(0x1000).offset(0x40), GpuAddress(0x1040));
    }

    #[test]
    fn extent_aspect_ignores_zero_height() {
        assert_eq!(Extent::new(800, 400).aspect(), 2.0);
        assert!(Extent::new(0, 400).is_empty());
        assert!(Extent::new(800, 0).aspect().is_finite());
    }
}
