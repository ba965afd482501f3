//! Scene data fed to the renderer.
//!
//! - Transforms and a look-at camera
//! - Meshes and procedural textures
//! - Game objects and the built-in sample scene

pub mod camera;
pub mod mesh;
pub mod object;
pub mod texture;
pub mod transform;

pub use camera::Camera;
pub use lumen_rhi::vertex::Vertex;
pub use mesh::Mesh;
pub use object::{GameObject, sample_scene};
pub use texture::TextureData;
pub use transform::Transform;
