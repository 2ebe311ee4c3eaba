use crate::arena::BufferRegion;
use crate::cmd::{BufferSpan, IndexBufferView, VertexBufferView};
use crate::pipeline::VertexStream;

use super::mesh::{ColorFill, Mesh};

/// Byte range relative to the start of a mesh's buffer region.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BufferRange {
    pub offset: u64,
    pub size: u64,
}

impl BufferRange {
    pub fn end(&self) -> u64 {
        self.offset + self.size
    }
}

/// Where each attribute of a mesh lives once uploaded.
///
/// Regions are packed back to back in a fixed order: positions, colors,
/// normals (when present), indices.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MeshBufferLayout {
    pub vertex: BufferRange,
    pub color: BufferRange,
    pub normal: Option<BufferRange>,
    pub index: BufferRange,
    pub index_count: u32,
    pub total: u64,
}

impl MeshBufferLayout {
    pub fn for_mesh(mesh: &Mesh) -> Self {
        let vertices = mesh.vertex_count() as u64;

        let vertex = BufferRange {
            offset: 0,
            size: vertices * VertexStream::POSITION.stride() as u64,
        };
        let color = BufferRange {
            offset: vertex.end(),
            size: vertices * VertexStream::COLOR.stride() as u64,
        };
        let normal = mesh.normals().map(|_| BufferRange {
            offset: color.end(),
            size: vertices * VertexStream::NORMAL.stride() as u64,
        });
        let index = BufferRange {
            offset: normal.map_or(color.end(), |n| n.end()),
            size: mesh.index_count() as u64 * 4,
        };

        Self {
            vertex,
            color,
            normal,
            index,
            index_count: mesh.index_count() as u32,
            total: index.end(),
        }
    }

    /// Serializes `mesh` in layout order. Missing colors come from `fill`.
    pub fn encode(&self, mesh: &Mesh, fill: ColorFill) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.total as usize);
        bytes.extend_from_slice(bytemuck::cast_slice(mesh.positions()));
        match mesh.colors() {
            Some(colors) => bytes.extend_from_slice(bytemuck::cast_slice(colors)),
            None => bytes.extend_from_slice(bytemuck::cast_slice(&fill.colors(mesh.vertex_count()))),
        }
        if let Some(normals) = mesh.normals() {
            bytes.extend_from_slice(bytemuck::cast_slice(normals));
        }
        bytes.extend_from_slice(bytemuck::cast_slice(mesh.triangles()));

        debug_assert_eq!(bytes.len() as u64, self.total);
        bytes
    }
}

/// Vertex and index views over an uploaded mesh.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MeshBufferViews {
    pub layout: MeshBufferLayout,
    pub region: BufferRegion,
    pub vertex: VertexBufferView,
    pub color: VertexBufferView,
    pub normal: Option<VertexBufferView>,
    pub index: IndexBufferView,
}

impl MeshBufferViews {
    pub fn new(layout: MeshBufferLayout, region: BufferRegion) -> Self {
        let span = |r: BufferRange| BufferSpan {
            resource: region.resource,
            offset: region.offset + r.offset,
            size: r.size,
        };

        Self {
            layout,
            region,
            vertex: VertexBufferView {
                span: span(layout.vertex),
                stride: VertexStream::POSITION.stride(),
            },
            color: VertexBufferView {
                span: span(layout.color),
                stride: VertexStream::COLOR.stride(),
            },
            normal: layout.normal.map(|n| VertexBufferView {
                span: span(n),
                stride: VertexStream::NORMAL.stride(),
            }),
            index: IndexBufferView {
                span: span(layout.index),
            },
        }
    }

    pub fn index_count(&self) -> u32 {
        self.layout.index_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{GpuAddress, ResourceId};

    #[test]
    fn cube_layout_is_packed_in_order() {
        let layout = MeshBufferLayout::for_mesh(&Mesh::cube());

        assert_eq!(layout.vertex, BufferRange { offset: 0, size: 96 });
        assert_eq!(layout.color, BufferRange { offset: 96, size: 128 });
        assert_eq!(layout.normal, None);
        assert_eq!(layout.index, BufferRange { offset: 224, size: 144 });
        assert_eq!(layout.total, 368);
        assert_eq!(layout.index_count, 36);
    }

    #[test]
    fn normals_sit_between_colors_and_indices() {
        let mesh = Mesh::cube().with_normals(vec![[0.0, 1.0, 0.0]; 8]).unwrap();
        let layout = MeshBufferLayout::for_mesh(&mesh);

        assert_eq!(layout.normal, Some(BufferRange { offset: 224, size: 96 }));
        assert_eq!(layout.index.offset, 320);
        assert_eq!(layout.encode(&mesh, ColorFill::default()).len() as u64, layout.total);
    }

    #[test]
    fn encoded_bytes_follow_the_layout() {
        let mesh = Mesh::cube();
        let layout = MeshBufferLayout::for_mesh(&mesh);
        let bytes = layout.encode(&mesh, ColorFill::Solid([0.5, 0.5, 0.5, 1.0]));

        let color: &[f32] = bytemuck::cast_slice(&bytes[96..112]);
        assert_eq!(color, &[0.5, 0.5, 0.5, 1.0]);

        let first_tri: &[u32] = bytemuck::cast_slice(&bytes[224..236]);
        assert_eq!(first_tri, &mesh.triangles()[0]);
    }

    #[test]
    fn views_are_offset_by_the_region() {
        let layout = MeshBufferLayout::for_mesh(&Mesh::cube());
        let region = BufferRegion {
            resource: ResourceId::from_index(4),
            offset: 1024,
            size: layout.total,
            gpu_address: GpuAddress(0x1000 + 1024),
        };
        let views = MeshBufferViews::new(layout, region);

        assert_eq!(views.vertex.span.offset, 1024);
        assert_eq!(views.color.span.offset, 1120);
        assert_eq!(views.index.span.offset, 1248);
        assert_eq!(views.index.index_count(), 36);
        assert_eq!(views.vertex.stride, 12);
    }
}
