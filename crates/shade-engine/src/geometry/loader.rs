use std::path::Path;

use crate::error::AssetError;

use super::mesh::Mesh;

/// File importer for meshes. Parsing formats lives outside the engine.
pub trait MeshLoader {
    fn load(&self, path: &Path) -> Result<Mesh, AssetError>;
}

impl<F> MeshLoader for F
where
    F: Fn(&Path) -> Result<Mesh, AssetError>,
{
    fn load(&self, path: &Path) -> Result<Mesh, AssetError> {
        self(path)
    }
}

/// Loads a mesh, logging and swallowing failures.
///
/// A mesh that fails to load is simply absent from the scene.
pub fn load_or_skip<L>(loader: &L, path: &Path) -> Option<Mesh>
where
    L: MeshLoader + ?Sized,
{
    match loader.load(path) {
        Ok(mesh) => {
            log::debug!(
                "loaded `{}` from {}: {} vertices, {} triangles",
                mesh.name(),
                path.display(),
                mesh.vertex_count(),
                mesh.triangle_count()
            );
            Some(mesh)
        }
        Err(e) => {
            log::warn!("skipping mesh {}: {e}", path.display());
            None
        }
    }
}
