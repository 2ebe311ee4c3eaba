use super::mesh::{Mesh, MeshIndices};

impl Mesh {
    /// Unit cube centered on the origin. 8 vertices, 12 triangles, no colors.
    pub fn cube() -> Mesh {
        let positions = vec![
            [-0.5, -0.5, -0.5],
            [0.5, -0.5, -0.5],
            [0.5, 0.5, -0.5],
            [-0.5, 0.5, -0.5],
            [-0.5, -0.5, 0.5],
            [0.5, -0.5, 0.5],
            [0.5, 0.5, 0.5],
            [-0.5, 0.5, 0.5],
        ];
        // Counter-clockwise seen from outside.
        let triangles = vec![
            [0, 2, 1],
            [0, 3, 2],
            [4, 5, 6],
            [4, 6, 7],
            [0, 1, 5],
            [0, 5, 4],
            [3, 6, 2],
            [3, 7, 6],
            [0, 4, 7],
            [0, 7, 3],
            [1, 2, 6],
            [1, 6, 5],
        ];

        match Mesh::new("cube", positions, MeshIndices::U16(triangles)) {
            Ok(mesh) => mesh,
            Err(e) => unreachable!("cube fixture is valid: {e}"),
        }
    }
}
