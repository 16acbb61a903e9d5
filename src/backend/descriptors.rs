// Descriptor layouts and pool
//
// set 0 (global):  binding 0 camera  UNIFORM_BUFFER          vertex
//                  binding 1 scene   UNIFORM_BUFFER_DYNAMIC  vertex | fragment
// set 1 (object):  binding 0 objects STORAGE_BUFFER          vertex
// set 2 (texture): binding 0 sampler COMBINED_IMAGE_SAMPLER  fragment

use ash::vk;

use crate::error::{RenderResult, VkCheck};
use crate::render::deletion::{DeletionQueue, Disposal};
use crate::gpu::GpuDevice;

/// Upper bound of sets allocated from the pool
const MAX_SETS: u32 = 10;
/// Descriptors of each type the pool can hand out
const DESCRIPTORS_PER_TYPE: u32 = 10;

/// Pool and set layouts shared by every frame and material
#[derive(Debug, Clone, Copy)]
pub struct DescriptorLayouts {
    pub pool: vk::DescriptorPool,
    pub global: vk::DescriptorSetLayout,
    pub object: vk::DescriptorSetLayout,
    pub single_texture: vk::DescriptorSetLayout,
}

impl DescriptorLayouts {
    pub fn new<G: GpuDevice>(
        device: &ash::Device,
        deletion_queue: &mut DeletionQueue<G>,
    ) -> RenderResult<Self> {
        let global = create_set_layout(
            device,
            &[
                layout_binding(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
                layout_binding(
                    1,
                    vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                    vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                ),
            ],
        )?;
        deletion_queue.register(Disposal::DescriptorSetLayout(global));

        let object = create_set_layout(
            device,
            &[layout_binding(0, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::VERTEX)],
        )?;
        deletion_queue.register(Disposal::DescriptorSetLayout(object));

        let single_texture = create_set_layout(
            device,
            &[layout_binding(
                0,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            )],
        )?;
        deletion_queue.register(Disposal::DescriptorSetLayout(single_texture));

        let pool_sizes = [
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            vk::DescriptorType::STORAGE_BUFFER,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        ]
        .map(|ty| vk::DescriptorPoolSize {
            ty,
            descriptor_count: DESCRIPTORS_PER_TYPE,
        });
        let pool_info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(MAX_SETS)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { device.create_descriptor_pool(&pool_info, None) }
            .check("vkCreateDescriptorPool")?;
        deletion_queue.register(Disposal::DescriptorPool(pool));

        Ok(Self {
            pool,
            global,
            object,
            single_texture,
        })
    }
}

fn layout_binding(
    binding: u32,
    ty: vk::DescriptorType,
    stages: vk::ShaderStageFlags,
) -> vk::DescriptorSetLayoutBinding {
    vk::DescriptorSetLayoutBinding::builder()
        .binding(binding)
        .descriptor_type(ty)
        .descriptor_count(1)
        .stage_flags(stages)
        .build()
}

fn create_set_layout(
    device: &ash::Device,
    bindings: &[vk::DescriptorSetLayoutBinding],
) -> RenderResult<vk::DescriptorSetLayout> {
    let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);
    unsafe { device.create_descriptor_set_layout(&info, None) }
        .check("vkCreateDescriptorSetLayout")
}
