//! Drawable scene objects.

use glam::{Mat4, Vec3};

use crate::mesh::Mesh;
use crate::transform::Transform;

/// Spin applied to every object, in degrees per second about +Z.
pub const SPIN_DEGREES_PER_SEC: f32 = 90.0;

/// A drawable object in the scene.
#[derive(Clone, Debug, PartialEq)]
pub enum GameObject {
    /// Geometry uploaded once and never modified.
    StaticMesh {
        name: String,
        transform: Transform,
        mesh: Mesh,
    },
}

impl GameObject {
    pub fn static_mesh(name: impl Into<String>, transform: Transform, mesh: Mesh) -> Self {
        GameObject::StaticMesh {
            name: name.into(),
            transform,
            mesh,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            GameObject::StaticMesh { name, .. } => name,
        }
    }

    pub fn transform(&self) -> &Transform {
        match self {
            GameObject::StaticMesh { transform, .. } => transform,
        }
    }

    pub fn mesh(&self) -> &Mesh {
        match self {
            GameObject::StaticMesh { mesh, .. } => mesh,
        }
    }

    /// Model matrix at `elapsed_secs`, spinning about Z on top of the placement.
    pub fn model_matrix(&self, elapsed_secs: f32) -> Mat4 {
        let angle = (elapsed_secs * SPIN_DEGREES_PER_SEC).to_radians();
        let spin = Mat4::from_axis_angle(Vec3::Z, angle);
        spin * self.transform().model_matrix()
    }
}

/// One textured quad at the origin.
pub fn sample_scene() -> Vec<GameObject> {
    vec![GameObject::static_mesh("quad", Transform::new(), Mesh::quad())]
}
