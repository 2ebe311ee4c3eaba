//! Pipeline state objects.
//!
//! [`desc`] holds the backend-facing description types. [`PipelineState`]
//! bundles a pipeline pair with its targets and recording unit.

mod desc;
mod pso;

pub use desc::{
    BindingLayout, CompareFunction, CullMode, DepthConvention, FixedFunction, PipelineDesc,
    ShaderSource, VertexFormat, VertexStream,
};
pub use pso::{PipelineCreateInfo, PipelineState, PsoPhase};
