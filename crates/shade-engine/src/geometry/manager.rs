use std::path::Path;

use glam::{Mat4, Quat, Vec3};

use crate::arena::BufferRegion;
use crate::backend::GpuBackend;
use crate::cmd::BufferSpan;
use crate::engine::RenderEngine;
use crate::error::{ArenaKind, EngineError, EngineResult};
use crate::pipeline::BindingLayout;
use crate::scene::ObjectConstants;

use super::layout::MeshBufferViews;
use super::loader::{MeshLoader, load_or_skip};
use super::mesh::{ColorFill, Mesh};

/// Object constant blocks reserved per manager.
pub const OBJECT_CONSTANT_SLOTS: u32 = 64;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct MeshId(u32);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct DrawableId(u32);

impl DrawableId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Scale, then rotate, then translate.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Transform {
    pub scale: Vec3,
    pub rotation: Quat,
    pub translation: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            scale: Vec3::ONE,
            rotation: Quat::IDENTITY,
            translation: Vec3::ZERO,
        }
    }
}

impl Transform {
    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Default::default()
        }
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DrawableKind {
    StaticMesh,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Drawable {
    pub id: DrawableId,
    pub mesh: MeshId,
    pub kind: DrawableKind,
    pub visible: bool,
    pub transform: Transform,
}

struct MeshEntry {
    name: String,
    views: MeshBufferViews,
}

/// Uploaded meshes plus the drawables that place them in the scene.
///
/// Each drawable owns one 256-byte object constant block, written by
/// [`update_constants`](Self::update_constants).
pub struct GeometryManager {
    meshes: Vec<MeshEntry>,
    drawables: Vec<Drawable>,
    constants: BufferRegion,
    fill: ColorFill,
}

impl GeometryManager {
    pub fn new<B: GpuBackend>(engine: &mut RenderEngine<B>) -> EngineResult<Self> {
        Self::with_fill(engine, ColorFill::default())
    }

    /// Uses `fill` for meshes that arrive without vertex colors.
    pub fn with_fill<B: GpuBackend>(engine: &mut RenderEngine<B>, fill: ColorFill) -> EngineResult<Self> {
        let size = OBJECT_CONSTANT_SLOTS as u64 * BindingLayout::CONSTANT_BLOCK_SIZE;
        let (constants, _) = engine.allocate_upload_region(size)?;

        Ok(Self {
            meshes: Vec::new(),
            drawables: Vec::new(),
            constants,
            fill,
        })
    }

    /// Uploads `mesh` into the geometry arena.
    pub fn add_mesh<B: GpuBackend>(&mut self, engine: &mut RenderEngine<B>, mesh: &Mesh) -> EngineResult<MeshId> {
        let views = engine.upload_mesh(mesh, self.fill)?;
        let id = MeshId(self.meshes.len() as u32);
        self.meshes.push(MeshEntry {
            name: mesh.name().to_owned(),
            views,
        });
        Ok(id)
    }

    /// Imports and uploads a mesh file.
    ///
    /// Import failures are logged and yield `Ok(None)`; engine failures are
    /// still returned.
    pub fn load_mesh<B, L>(
        &mut self,
        engine: &mut RenderEngine<B>,
        loader: &L,
        path: &Path,
    ) -> EngineResult<Option<MeshId>>
    where
        B: GpuBackend,
        L: MeshLoader + ?Sized,
    {
        match load_or_skip(loader, path) {
            Some(mesh) => self.add_mesh(engine, &mesh).map(Some),
            None => Ok(None),
        }
    }

    pub fn add_drawable(&mut self, mesh: MeshId, transform: Transform) -> EngineResult<DrawableId> {
        if mesh.0 as usize >= self.meshes.len() {
            return Err(EngineError::Frame("drawable references an unknown mesh"));
        }
        if self.drawables.len() as u32 >= OBJECT_CONSTANT_SLOTS {
            return Err(EngineError::ArenaExhausted {
                arena: ArenaKind::ObjectConstants,
                requested: 1,
                remaining: 0,
                capacity: OBJECT_CONSTANT_SLOTS as u64,
            });
        }

        let id = DrawableId(self.drawables.len() as u32);
        self.drawables.push(Drawable {
            id,
            mesh,
            kind: DrawableKind::StaticMesh,
            visible: true,
            transform,
        });
        Ok(id)
    }

    pub fn drawable(&self, id: DrawableId) -> Option<&Drawable> {
        self.drawables.get(id.index())
    }

    pub fn drawable_mut(&mut self, id: DrawableId) -> Option<&mut Drawable> {
        self.drawables.get_mut(id.index())
    }

    pub fn drawables(&self) -> &[Drawable] {
        &self.drawables
    }

    pub fn visible(&self) -> impl Iterator<Item = &Drawable> + '_ {
        self.drawables.iter().filter(|d| d.visible)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&MeshBufferViews> {
        self.meshes.get(id.0 as usize).map(|m| &m.views)
    }

    pub fn mesh_name(&self, id: MeshId) -> Option<&str> {
        self.meshes.get(id.0 as usize).map(|m| m.name.as_str())
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    /// The constant block of `drawable`.
    pub fn object_constants(&self, drawable: DrawableId) -> BufferSpan {
        let block = BindingLayout::CONSTANT_BLOCK_SIZE;
        BufferSpan {
            resource: self.constants.resource,
            offset: self.constants.offset + drawable.0 as u64 * block,
            size: block,
        }
    }

    /// Writes every drawable's model matrix into its constant block.
    pub fn update_constants<B: GpuBackend>(&self, engine: &mut RenderEngine<B>) -> EngineResult<()> {
        let block = BindingLayout::CONSTANT_BLOCK_SIZE;
        for d in &self.drawables {
            let constants = ObjectConstants::new(d.transform.matrix());
            engine.write_upload(&self.constants, d.id.0 as u64 * block, bytemuck::bytes_of(&constants))?;
        }
        Ok(())
    }
}
