// Meshes
//
// Non-indexed triangle lists. Vertices are kept on the CPU after upload
// (draws need the count) and live in a device-local vertex buffer.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use std::path::Path;

use super::registry::Id;

/// Interleaved vertex, binding 0
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub color: Vec3,
    pub uv: Vec2,
}

pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub vertex_buffer: vk::Buffer,
}

pub type MeshId = Id<Mesh>;

impl Mesh {
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }
}

/// Single colored triangle, used when no model file is available
pub fn triangle() -> Vec<Vertex> {
    let green = Vec3::new(0.0, 1.0, 0.0);
    [
        Vec3::new(1.0, 1.0, 0.0),
        Vec3::new(-1.0, 1.0, 0.0),
        Vec3::new(0.0, -1.0, 0.0),
    ]
    .into_iter()
    .map(|position| Vertex {
        position,
        color: green,
        ..Vertex::default()
    })
    .collect()
}

/// Load every shape of an OBJ file into one triangle list.
///
/// Normals double as vertex colors; texture V is flipped to Vulkan's
/// top-left origin.
pub fn load_obj(path: &Path) -> Result<Vec<Vertex>> {
    let options = tobj::LoadOptions {
        single_index: true,
        triangulate: true,
        ..Default::default()
    };
    let (models, _materials) = tobj::load_obj(path, &options)
        .with_context(|| format!("Failed to load OBJ: {}", path.display()))?;

    let mut vertices = Vec::new();
    for model in &models {
        let mesh = &model.mesh;
        for &index in &mesh.indices {
            let i = index as usize;
            let position = vec3_at(&mesh.positions, i).with_context(|| {
                format!("{}: '{}' index {} has no position", path.display(), model.name, i)
            })?;
            let normal = vec3_at(&mesh.normals, i).unwrap_or(Vec3::ZERO);
            let uv = mesh
                .texcoords
                .get(2 * i..2 * i + 2)
                .map(|t| Vec2::new(t[0], 1.0 - t[1]))
                .unwrap_or(Vec2::ZERO);

            vertices.push(Vertex {
                position,
                normal,
                color: normal,
                uv,
            });
        }
    }

    log::info!(
        "Loaded {} ({} shapes, {} vertices)",
        path.display(),
        models.len(),
        vertices.len()
    );
    Ok(vertices)
}

fn vec3_at(data: &[f32], i: usize) -> Option<Vec3> {
    data.get(3 * i..3 * i + 3).map(Vec3::from_slice)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::io::Write;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 44);
    }

    #[test]
    fn triangle_has_three_green_vertices() {
        let vertices = triangle();
        assert_eq!(vertices.len(), 3);
        assert!(vertices.iter().all(|v| v.color == Vec3::Y));
    }

    #[test]
    fn obj_quad_is_triangulated_with_flipped_uvs() {
        let mut file = tempfile::Builder::new().suffix(".obj").tempfile().unwrap();
        write!(
            file,
            "o quad\n\
             v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
             vt 0 0\nvt 1 0\nvt 1 1\nvt 0 1\n\
             vn 0 0 1\n\
             f 1/1/1 2/2/1 3/3/1 4/4/1\n"
        )
        .unwrap();

        let vertices = load_obj(file.path()).unwrap();

        assert_eq!(vertices.len(), 6);
        for v in &vertices {
            assert_eq!(v.normal, Vec3::Z);
            assert_eq!(v.color, v.normal);
            // v = 0 or 1 at the corners, so the flip maps onto the same set
            assert!(v.uv.y == 0.0 || v.uv.y == 1.0);
        }
        let origin = vertices.iter().find(|v| v.position == Vec3::ZERO).unwrap();
        assert_relative_eq!(origin.uv.y, 1.0);
    }

    #[test]
    fn missing_obj_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_obj(&dir.path().join("nope.obj")).unwrap_err();
        assert!(err.to_string().contains("nope.obj"));
    }
}
