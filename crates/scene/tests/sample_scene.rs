//! Integration tests for the built-in sample scene.

use glam::{Vec3, Vec4};

use lumen_scene::{Camera, TextureData, sample_scene};

#[test]
fn test_sample_scene_uploads_one_quad() {
    let objects = sample_scene();
    assert_eq!(objects.len(), 1);

    let mesh = objects[0].mesh();
    assert!(mesh.is_well_formed());

    let indices: &[u32] = bytemuck::cast_slice(mesh.index_bytes());
    assert_eq!(indices, &[0, 1, 2, 2, 3, 0]);

    let corners: Vec<Vec3> = mesh.vertices.iter().map(|v| v.position).collect();
    assert_eq!(corners.len(), 4);
    assert!(corners.iter().all(|p| p.z == 0.0));
    assert!(mesh.vertices.iter().all(|v| v.normal == Vec3::Z));
}

#[test]
fn test_default_camera_sees_whole_quad() {
    let camera = Camera::default();
    let view_proj = camera.projection_matrix(800.0 / 600.0) * camera.view_matrix();

    for object in sample_scene() {
        for elapsed in [0.0, 0.5, 1.25] {
            let mvp = view_proj * object.model_matrix(elapsed);
            for vertex in &object.mesh().vertices {
                let clip = mvp * Vec4::from((vertex.position, 1.0));
                let ndc = clip.truncate() / clip.w;

                assert!(clip.w > 0.0, "vertex behind the camera");
                assert!(ndc.x.abs() < 1.0 && ndc.y.abs() < 1.0);
                assert!((0.0..=1.0).contains(&ndc.z));
            }
        }
    }
}

#[test]
fn test_sample_texture_fits_its_upload() {
    let texture = TextureData::sample();

    assert_eq!(texture.width, 256);
    assert_eq!(texture.height, 256);
    assert_eq!(texture.byte_size(), 256 * 256 * 4);
    assert_ne!(texture.texel(0, 0), texture.texel(32, 0));
    assert_eq!(texture.texel(0, 0), texture.texel(32, 32));
    assert_eq!(texture.texel(256, 0), None);
}
