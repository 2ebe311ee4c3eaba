use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Frame-wide shader constants (`Frame` in the mesh shader).
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct FrameConstants {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
}

impl FrameConstants {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        Self {
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
        }
    }
}

impl Default for FrameConstants {
    fn default() -> Self {
        Self::new(Mat4::IDENTITY, Mat4::IDENTITY)
    }
}

/// Per-drawable constants, padded to one 256-byte constant block.
#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
pub struct ObjectConstants {
    pub model: [[f32; 4]; 4],
    _pad: [f32; 48],
}

impl ObjectConstants {
    pub fn new(model: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            _pad: [0.0; 48],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::BindingLayout;

    #[test]
    fn sizes_fit_constant_blocks() {
        assert_eq!(std::mem::size_of::<FrameConstants>(), 128);
        assert_eq!(
            std::mem::size_of::<ObjectConstants>() as u64,
            BindingLayout::CONSTANT_BLOCK_SIZE
        );
    }
}
