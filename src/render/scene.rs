// Scene description and the GPU-side layouts it is written into
//
// Layouts mirror the GLSL blocks in shaders/mesh.vert and the fragment
// shaders. Everything is #[repr(C)] and Pod so it can be copied into mapped
// memory byte for byte.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use super::material::MaterialId;
use super::mesh::MeshId;

/// set 0, binding 0
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuCameraData {
    pub view: Mat4,
    pub proj: Mat4,
    pub viewproj: Mat4,
}

/// set 0, binding 1 (dynamic offset per frame slot)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuSceneData {
    pub fog_color: Vec4,
    /// x = min, y = max, zw unused
    pub fog_distances: Vec4,
    pub ambient_color: Vec4,
    /// w = sun power
    pub sunlight_direction: Vec4,
    pub sunlight_color: Vec4,
}

/// set 1, one element per drawn object
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct GpuObjectData {
    pub model: Mat4,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct MeshPushConstants {
    pub data: Vec4,
    pub render_matrix: Mat4,
}

/// One drawable: what to draw, how, and where
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderObject {
    pub mesh: MeshId,
    pub material: MaterialId,
    pub transform: Mat4,
}

/// Fixed perspective camera
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub position: Vec3,
    pub fov_y_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, -6.0, -10.0),
            fov_y_degrees: 70.0,
            near: 0.1,
            far: 200.0,
        }
    }
}

impl Camera {
    pub fn data(&self, extent: vk::Extent2D) -> GpuCameraData {
        let view = Mat4::from_translation(self.position);
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        let mut proj = Mat4::perspective_rh(self.fov_y_degrees.to_radians(), aspect, self.near, self.far);
        // Vulkan clip space has Y pointing down
        proj.y_axis.y *= -1.0;

        GpuCameraData {
            view,
            proj,
            viewproj: proj * view,
        }
    }
}

/// Scene period in frames
const SCENE_PERIOD: f32 = 120.0;

/// Time-varying scene parameters for a frame
pub fn scene_at(frame_number: u64) -> GpuSceneData {
    let t = frame_number as f32 / SCENE_PERIOD;
    GpuSceneData {
        ambient_color: Vec4::new(t.sin(), 0.0, t.cos(), 1.0),
        ..GpuSceneData::default()
    }
}

/// Clear color for a frame: blue pulses with |sin(frame / 120)|
pub fn clear_color_at(base: [f32; 4], frame_number: u64) -> [f32; 4] {
    let flash = (frame_number as f32 / SCENE_PERIOD).sin().abs();
    [base[0], base[1], base[2] * flash, base[3]]
}
