// Graphics pipeline creation
//
// One render pass (color + depth, single subpass) and a builder for the
// fixed-function state every material shares. Materials differ only in
// shaders and pipeline layout.

use ash::vk;
use std::ffi::CStr;
use std::mem::{offset_of, size_of};

use crate::error::{RenderResult, VkCheck};
use crate::render::mesh::Vertex;
use crate::render::scene::MeshPushConstants;
use super::swapchain::DEPTH_FORMAT;

const ENTRY_POINT: &CStr = c"main";

/// Color cleared and presented; depth cleared and kept for the frame.
/// `D32_SFLOAT` has no stencil aspect, so stencil ops are don't-care.
pub fn attachment_descriptions(color_format: vk::Format) -> [vk::AttachmentDescription; 2] {
    let color_attachment = vk::AttachmentDescription::builder()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let depth_attachment = vk::AttachmentDescription::builder()
        .format(DEPTH_FORMAT)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .build();

    [color_attachment, depth_attachment]
}

/// Create the single-subpass render pass
pub fn create_render_pass(device: &ash::Device, color_format: vk::Format) -> RenderResult<vk::RenderPass> {
    let color_attachment_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let depth_attachment_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    let color_attachments = [color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_attachments)
        .depth_stencil_attachment(&depth_attachment_ref)
        .build();

    // Color writes wait for the acquired image (present semaphore stage)
    let color_dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build();

    // Depth clear waits for the previous frame's depth tests
    let depth_stages =
        vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS;
    let depth_dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(depth_stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(depth_stages)
        .dst_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .build();

    let attachments = attachment_descriptions(color_format);
    let subpasses = [subpass];
    let dependencies = [color_dependency, depth_dependency];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe { device.create_render_pass(&render_pass_info, None) }.check("vkCreateRenderPass")
}

/// Vertex buffer layout of `Vertex`, binding 0
pub struct VertexInputDescription {
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

pub fn vertex_input_description() -> VertexInputDescription {
    let binding = vk::VertexInputBindingDescription {
        binding: 0,
        stride: size_of::<Vertex>() as u32,
        input_rate: vk::VertexInputRate::VERTEX,
    };

    let attribute = |location: u32, format: vk::Format, offset: usize| vk::VertexInputAttributeDescription {
        location,
        binding: 0,
        format,
        offset: offset as u32,
    };

    VertexInputDescription {
        bindings: vec![binding],
        attributes: vec![
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position)),
            attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, color)),
            attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Vertex, uv)),
        ],
    }
}

/// Pipeline layout with the mesh push constants and the given descriptor sets
pub fn create_pipeline_layout(
    device: &ash::Device,
    set_layouts: &[vk::DescriptorSetLayout],
) -> RenderResult<vk::PipelineLayout> {
    let push_constant_ranges = [vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: size_of::<MeshPushConstants>() as u32,
    }];

    let layout_info = vk::PipelineLayoutCreateInfo::builder()
        .set_layouts(set_layouts)
        .push_constant_ranges(&push_constant_ranges);

    unsafe { device.create_pipeline_layout(&layout_info, None) }.check("vkCreatePipelineLayout")
}

/// Fixed-function state for a material pipeline
pub struct PipelineBuilder {
    pub shader_stages: Vec<(vk::ShaderStageFlags, vk::ShaderModule)>,
    pub vertex_input: VertexInputDescription,
    pub topology: vk::PrimitiveTopology,
    pub viewport: vk::Viewport,
    pub scissor: vk::Rect2D,
    pub polygon_mode: vk::PolygonMode,
    pub depth_test: bool,
    pub depth_write: bool,
    pub depth_compare_op: vk::CompareOp,
    pub layout: vk::PipelineLayout,
}

impl PipelineBuilder {
    /// Triangle list, filled, no culling, depth test + write with LESS_OR_EQUAL
    pub fn new(extent: vk::Extent2D, layout: vk::PipelineLayout) -> Self {
        Self {
            shader_stages: Vec::new(),
            vertex_input: vertex_input_description(),
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            viewport: vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
            scissor: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            },
            polygon_mode: vk::PolygonMode::FILL,
            depth_test: true,
            depth_write: true,
            depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
            layout,
        }
    }

    pub fn stage(mut self, stage: vk::ShaderStageFlags, module: vk::ShaderModule) -> Self {
        self.shader_stages.push((stage, module));
        self
    }

    pub fn depth(mut self, test: bool, write: bool, compare_op: vk::CompareOp) -> Self {
        self.depth_test = test;
        self.depth_write = write;
        self.depth_compare_op = if test { compare_op } else { vk::CompareOp::ALWAYS };
        self
    }

    /// Create the pipeline. Failure is logged and yields `None`; the caller
    /// decides whether to go on without it.
    pub fn build(&self, device: &ash::Device, render_pass: vk::RenderPass) -> Option<vk::Pipeline> {
        let stages: Vec<vk::PipelineShaderStageCreateInfo> = self
            .shader_stages
            .iter()
            .map(|&(stage, module)| {
                vk::PipelineShaderStageCreateInfo::builder()
                    .stage(stage)
                    .module(module)
                    .name(ENTRY_POINT)
                    .build()
            })
            .collect();

        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&self.vertex_input.bindings)
            .vertex_attribute_descriptions(&self.vertex_input.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(self.topology)
            .primitive_restart_enable(false);

        let viewports = [self.viewport];
        let scissors = [self.scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(self.depth_test)
            .depth_write_enable(self.depth_write)
            .depth_compare_op(self.depth_compare_op)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false);

        // Opaque: write RGBA, no blending
        let color_blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .layout(self.layout)
            .render_pass(render_pass)
            .subpass(0)
            .build();

        let result = unsafe {
            device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };
        match result {
            Ok(pipelines) => pipelines.into_iter().next(),
            Err((_, e)) => {
                log::error!("Failed to create pipeline: {:?}", e);
                None
            }
        }
    }
}
