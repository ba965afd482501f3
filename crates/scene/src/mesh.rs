//! CPU-side mesh data.

use glam::{Vec2, Vec3};
use lumen_rhi::vertex::Vertex;

/// Indexed triangle list.
#[derive(Clone, Debug, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Unit quad in the XY plane facing +Z, textured corner to corner.
    pub fn quad() -> Self {
        let normal = Vec3::Z;
        let vertices = vec![
            Vertex::new(Vec3::new(-0.5, -0.5, 0.0), normal, Vec2::new(1.0, 0.0)),
            Vertex::new(Vec3::new(0.5, -0.5, 0.0), normal, Vec2::new(0.0, 0.0)),
            Vertex::new(Vec3::new(0.5, 0.5, 0.0), normal, Vec2::new(0.0, 1.0)),
            Vertex::new(Vec3::new(-0.5, 0.5, 0.0), normal, Vec2::new(1.0, 1.0)),
        ];
        Self::new(vertices, vec![0, 1, 2, 2, 3, 0])
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }

    /// Every index refers to an existing vertex and triangles are complete.
    pub fn is_well_formed(&self) -> bool {
        !self.indices.is_empty()
            && self.indices.len() % 3 == 0
            && self
                .indices
                .iter()
                .all(|&i| (i as usize) < self.vertices.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_is_two_triangles() {
        let quad = Mesh::quad();
        assert_eq!(quad.vertices.len(), 4);
        assert_eq!(quad.indices, vec![0, 1, 2, 2, 3, 0]);
        assert_eq!(quad.index_count(), 6);
        assert!(quad.is_well_formed());
    }

    #[test]
    fn test_byte_views_match_layout() {
        let quad = Mesh::quad();
        assert_eq!(quad.vertex_bytes().len(), 4 * Vertex::size());
        assert_eq!(quad.index_bytes().len(), 6 * std::mem::size_of::<u32>());
    }

    #[test]
    fn test_out_of_range_index_is_malformed() {
        let mut quad = Mesh::quad();
        quad.indices[5] = 4;
        assert!(!quad.is_well_formed());

        let empty = Mesh::new(Vec::new(), Vec::new());
        assert!(!empty.is_well_formed());
    }
}
