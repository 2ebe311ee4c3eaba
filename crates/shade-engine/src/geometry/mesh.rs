use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::AssetError;

/// Triangle indices as they come out of an importer.
///
/// Both widths are stored as `u32` once inside a [`Mesh`].
#[derive(Debug, Clone, PartialEq)]
pub enum MeshIndices {
    U16(Vec<[u16; 3]>),
    U32(Vec<[u32; 3]>),
}

impl MeshIndices {
    fn widen(self) -> Vec<[u32; 3]> {
        match self {
            MeshIndices::U16(tris) => tris
                .into_iter()
                .map(|[a, b, c]| [a as u32, b as u32, c as u32])
                .collect(),
            MeshIndices::U32(tris) => tris,
        }
    }
}

/// Policy for meshes that carry no per-vertex color.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ColorFill {
    /// One random RGB color per vertex, alpha 1. The seed makes it repeatable.
    Random { seed: u64 },
    Solid([f32; 4]),
}

impl Default for ColorFill {
    fn default() -> Self {
        ColorFill::Random { seed: 0x5eed }
    }
}

impl ColorFill {
    pub fn colors(&self, vertex_count: usize) -> Vec<[f32; 4]> {
        match *self {
            ColorFill::Random { seed } => {
                let mut rng = StdRng::seed_from_u64(seed);
                (0..vertex_count)
                    .map(|_| {
                        [
                            rng.random_range(0.0..1.0),
                            rng.random_range(0.0..1.0),
                            rng.random_range(0.0..1.0),
                            1.0,
                        ]
                    })
                    .collect()
            }
            ColorFill::Solid(color) => vec![color; vertex_count],
        }
    }
}

/// Validated triangle mesh in CPU memory.
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    name: String,
    positions: Vec<[f32; 3]>,
    colors: Option<Vec<[f32; 4]>>,
    normals: Option<Vec<[f32; 3]>>,
    triangles: Vec<[u32; 3]>,
}

impl Mesh {
    pub fn new(
        name: impl Into<String>,
        positions: Vec<[f32; 3]>,
        indices: MeshIndices,
    ) -> Result<Self, AssetError> {
        let mesh = Self {
            name: name.into(),
            positions,
            colors: None,
            normals: None,
            triangles: indices.widen(),
        };

        if mesh.positions.is_empty() {
            return Err(mesh.invalid("mesh has no vertices"));
        }
        if mesh.triangles.is_empty() {
            return Err(mesh.invalid("mesh has no triangles"));
        }
        let n = mesh.positions.len() as u32;
        if let Some(bad) = mesh.triangles.iter().flatten().find(|&&i| i >= n) {
            return Err(mesh.invalid(format!("index {bad} out of range for {n} vertices")));
        }
        Ok(mesh)
    }

    pub fn with_colors(mut self, colors: Vec<[f32; 4]>) -> Result<Self, AssetError> {
        if colors.len() != self.positions.len() {
            return Err(self.invalid(format!(
                "{} colors for {} vertices",
                colors.len(),
                self.positions.len()
            )));
        }
        self.colors = Some(colors);
        Ok(self)
    }

    pub fn with_normals(mut self, normals: Vec<[f32; 3]>) -> Result<Self, AssetError> {
        if normals.len() != self.positions.len() {
            return Err(self.invalid(format!(
                "{} normals for {} vertices",
                normals.len(),
                self.positions.len()
            )));
        }
        self.normals = Some(normals);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn index_count(&self) -> usize {
        self.triangles.len() * 3
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn colors(&self) -> Option<&[[f32; 4]]> {
        self.colors.as_deref()
    }

    pub fn normals(&self) -> Option<&[[f32; 3]]> {
        self.normals.as_deref()
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    fn invalid(&self, reason: impl Into<String>) -> AssetError {
        AssetError::InvalidMesh {
            name: self.name.clone(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> Vec<[f32; 3]> {
        vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]
    }

    #[test]
    fn u16_indices_are_widened() {
        let mesh = Mesh::new("tri", triangle(), MeshIndices::U16(vec![[0, 1, 2]])).unwrap();
        assert_eq!(mesh.triangles(), &[[0u32, 1, 2]]);
        assert_eq!(mesh.index_count(), 3);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let err = Mesh::new("tri", triangle(), MeshIndices::U32(vec![[0, 1, 3]])).unwrap_err();
        assert!(matches!(err, AssetError::InvalidMesh { .. }));
    }

    #[test]
    fn attribute_counts_must_match() {
        let mesh = Mesh::new("tri", triangle(), MeshIndices::U32(vec![[0, 1, 2]])).unwrap();
        assert!(mesh.clone().with_colors(vec![[1.0; 4]; 2]).is_err());
        assert!(mesh.with_normals(vec![[0.0, 0.0, 1.0]; 3]).is_ok());
    }

    #[test]
    fn random_fill_is_repeatable_and_opaque() {
        let fill = ColorFill::Random { seed: 7 };
        let a = fill.colors(16);
        assert_eq!(a, fill.colors(16));
        assert!(a.iter().all(|c| c[3] == 1.0 && c[..3].iter().all(|v| (0.0..1.0).contains(v))));
    }
}
