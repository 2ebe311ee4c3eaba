//! Meshes, their GPU layout, and the drawables that reference them.

mod layout;
mod loader;
mod manager;
mod mesh;
mod primitives;

pub use layout::{BufferRange, MeshBufferLayout, MeshBufferViews};
pub use loader::{MeshLoader, load_or_skip};
pub use manager::{
    Drawable, DrawableId, DrawableKind, GeometryManager, MeshId, OBJECT_CONSTANT_SLOTS, Transform,
};
pub use mesh::{ColorFill, Mesh, MeshIndices};
