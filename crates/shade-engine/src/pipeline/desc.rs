use std::borrow::Cow;

use crate::backend::TextureFormat;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum CompareFunction {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Always,
}

/// Which end of the depth range is "near".
///
/// Clear value and comparison are both derived from this one value, so they
/// can never disagree.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum DepthConvention {
    /// Near = 0, far = 1. Clear to 1.0, pass when smaller.
    #[default]
    Forward,
    /// Near = 1, far = 0. Clear to 0.0, pass when greater.
    Reverse,
}

impl DepthConvention {
    pub fn clear_value(self) -> f32 {
        match self {
            DepthConvention::Forward => 1.0,
            DepthConvention::Reverse => 0.0,
        }
    }

    pub fn compare(self) -> CompareFunction {
        match self {
            DepthConvention::Forward => CompareFunction::Less,
            DepthConvention::Reverse => CompareFunction::Greater,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            DepthConvention::Forward => DepthConvention::Reverse,
            DepthConvention::Reverse => DepthConvention::Forward,
        }
    }

    pub fn is_reverse(self) -> bool {
        self == DepthConvention::Reverse
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum VertexFormat {
    Float32x3,
    Float32x4,
}

impl VertexFormat {
    pub fn size(self) -> u32 {
        match self {
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

/// One vertex buffer slot feeding one shader input.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct VertexStream {
    pub slot: u32,
    pub location: u32,
    pub format: VertexFormat,
}

impl VertexStream {
    pub const POSITION: VertexStream = VertexStream {
        slot: 0,
        location: 0,
        format: VertexFormat::Float32x3,
    };
    pub const COLOR: VertexStream = VertexStream {
        slot: 1,
        location: 1,
        format: VertexFormat::Float32x4,
    };
    pub const NORMAL: VertexStream = VertexStream {
        slot: 2,
        location: 2,
        format: VertexFormat::Float32x3,
    };

    pub fn stride(&self) -> u32 {
        self.format.size()
    }
}

/// Shader pair compiled by the backend.
#[derive(Debug, Clone)]
pub struct ShaderSource {
    pub label: String,
    pub wgsl: Cow<'static, str>,
    pub vertex_entry: String,
    pub fragment_entry: String,
}

impl ShaderSource {
    /// Built-in mesh shader: per-vertex color, frame and object constants.
    pub fn mesh() -> Self {
        Self {
            label: "mesh".to_string(),
            wgsl: Cow::Borrowed(include_str!("shaders/mesh.wgsl")),
            vertex_entry: "vs_main".to_string(),
            fragment_entry: "fs_main".to_string(),
        }
    }
}

/// Binding layout shared by every pipeline.
///
/// Each slot is one constant block of [`CONSTANT_BLOCK_SIZE`](Self::CONSTANT_BLOCK_SIZE)
/// bytes. Slot 0 carries frame constants, slot 1 object constants.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct BindingLayout {
    pub constant_slots: u32,
}

impl BindingLayout {
    pub const CONSTANT_BLOCK_SIZE: u64 = 256;
    pub const FRAME_SLOT: u32 = 0;
    pub const OBJECT_SLOT: u32 = 1;
}

impl Default for BindingLayout {
    fn default() -> Self {
        Self { constant_slots: 2 }
    }
}

/// Fixed-function state baked into a pipeline.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FixedFunction {
    pub color_format: TextureFormat,
    pub depth_format: Option<TextureFormat>,
    pub depth_compare: CompareFunction,
    pub cull: CullMode,
}

#[derive(Debug, Clone)]
pub struct PipelineDesc<'a> {
    pub label: &'a str,
    pub layout: BindingLayout,
    pub shader: &'a ShaderSource,
    pub vertex_streams: &'a [VertexStream],
    pub fixed: FixedFunction,
}
