use crate::geometry::{Triangle, WorldPoint};

use super::SceneError;

/// Indexed triangle mesh.
#[derive(Clone, Debug)]
pub struct TriangleMesh {
    vertices: Vec<WorldPoint>,
    triangles: Vec<[u32; 3]>,
}

impl TriangleMesh {
    pub fn new(vertices: Vec<WorldPoint>, triangles: Vec<[u32; 3]>) -> Result<TriangleMesh, SceneError> {
        if let Some(&index) = triangles
            .iter()
            .flatten()
            .find(|&&index| index as usize >= vertices.len())
        {
            return Err(SceneError::VertexOutOfRange {
                index,
                count: vertices.len(),
            });
        }

        Ok(TriangleMesh {
            vertices,
            triangles,
        })
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn triangle(&self, index: usize) -> Option<Triangle<WorldPoint>> {
        let [a, b, c] = *self.triangles.get(index)?;
        Some(Triangle::new(
            self.vertices[a as usize],
            self.vertices[b as usize],
            self.vertices[c as usize],
        ))
    }
}
