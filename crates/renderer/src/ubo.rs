//! Uniform data shared with the mesh shaders.
//!
//! Layout must match the `UniformBufferObject` block in `shaders/mesh.vert`.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

use lumen_scene::{Camera, GameObject};

/// Per-object, per-image transform block (binding 0).
///
/// # Memory Layout
///
/// - Offset 0: model matrix (64 bytes)
/// - Offset 64: view matrix (64 bytes)
/// - Offset 128: projection matrix (64 bytes)
/// - Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct UniformData {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl Default for UniformData {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        }
    }
}

impl UniformData {
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Uniforms for `object` at `elapsed_secs`, seen through `camera`.
    pub fn for_object(object: &GameObject, camera: &Camera, aspect: f32, elapsed_secs: f32) -> Self {
        Self {
            model: object.model_matrix(elapsed_secs),
            view: camera.view_matrix(),
            proj: camera.projection_matrix(aspect),
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}
