use ash::vk;

use super::registry::Id;

/// Pipeline state shared by every object drawn with it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Material {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    /// Set 2, only for textured materials
    pub texture_set: Option<vk::DescriptorSet>,
}

pub type MaterialId = Id<Material>;

impl Material {
    pub fn new(pipeline: vk::Pipeline, layout: vk::PipelineLayout) -> Self {
        Self {
            pipeline,
            layout,
            texture_set: None,
        }
    }
}
