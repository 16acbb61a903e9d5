// Engine - builds the renderer on a real window
//
// Initialization order (each step registers what it creates with the
// deletion queue, so teardown runs in exact reverse):
//   device + surface -> swapchain, views, depth -> render pass
//   -> framebuffers -> descriptor layouts -> material pipelines
//   -> frame ring + upload channel (Renderer) -> meshes, textures -> scene

use anyhow::{Context, Result};
use ash::vk;
use glam::{Mat4, Vec3};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::collections::HashMap;
use std::path::Path;
use winit::window::Window;

use crate::backend::descriptors::DescriptorLayouts;
use crate::backend::pipeline::{self, PipelineBuilder};
use crate::backend::swapchain::PresentationChain;
use crate::backend::texture::{self, Texture};
use crate::backend::{shader, VulkanDevice};
use crate::config::Config;
use crate::error::RenderResult;
use crate::render::deletion::{DeletionQueue, Disposal};
use crate::render::mesh;
use crate::render::renderer::{RenderTarget, Renderer};
use crate::render::scene::RenderObject;

struct MaterialShaders {
    name: &'static str,
    fragment: &'static str,
    textured: bool,
}

const VERTEX_SHADER: &str = "mesh.vert.spv";

const MATERIALS: [MaterialShaders; 2] = [
    MaterialShaders {
        name: "defaultmesh",
        fragment: "default_lit.frag.spv",
        textured: false,
    },
    MaterialShaders {
        name: "texturedmesh",
        fragment: "textured_lit.frag.spv",
        textured: true,
    },
];

pub struct Engine {
    renderer: Option<Renderer<VulkanDevice>>,
    textures: HashMap<String, Texture>,
}

impl Engine {
    pub fn init(window: &Window, config: &Config) -> Result<Self> {
        let size = window.inner_size();
        let device = VulkanDevice::new(
            &config.window.title,
            window.raw_display_handle(),
            window.raw_window_handle(),
            config.validation_enabled(),
        )?;

        let mut deletion_queue = DeletionQueue::new();
        let (target, layouts, materials) = deletion_queue.build_or_flush(&device, |queue| {
            build_target(&device, config, size.width, size.height, queue)
        })?;

        let mut renderer = Renderer::new(
            device,
            deletion_queue,
            target,
            layouts,
            config.renderer_settings(),
        )?;
        for (name, pipeline, layout) in materials {
            renderer.create_material(name, pipeline, layout);
        }

        let mut engine = Self {
            renderer: Some(renderer),
            textures: HashMap::new(),
        };
        engine.load_meshes(config)?;
        engine.load_textures(config)?;
        engine.init_scene()?;

        log::info!("Engine initialized");
        Ok(engine)
    }

    fn renderer_mut(&mut self) -> Result<&mut Renderer<VulkanDevice>> {
        self.renderer.as_mut().context("Engine has been cleaned up")
    }

    /// The triangle is always there; the model file is optional
    fn load_meshes(&mut self, config: &Config) -> Result<()> {
        let renderer = self.renderer_mut()?;
        renderer.upload_mesh("triangle", mesh::triangle())?;

        match mesh::load_obj(&config.assets.mesh_path) {
            Ok(vertices) if vertices.is_empty() => {
                log::warn!("{} has no geometry", config.assets.mesh_path.display());
            }
            Ok(vertices) => {
                renderer.upload_mesh("empire", vertices)?;
            }
            Err(e) => log::warn!("{:#}", e),
        }
        Ok(())
    }

    fn load_textures(&mut self, config: &Config) -> Result<()> {
        let pixels = match texture::decode_rgba(&config.assets.texture_path) {
            Ok(pixels) => pixels,
            Err(e) => {
                log::warn!("{:#}", e);
                return Ok(());
            }
        };

        let renderer = self.renderer_mut()?;
        let loaded = texture::upload_texture(renderer, "empire_diffuse", &pixels)?;
        self.textures.insert("empire_diffuse".to_string(), loaded);
        Ok(())
    }

    /// The textured model if everything it needs loaded, a field of
    /// triangles otherwise
    fn init_scene(&mut self) -> Result<()> {
        let diffuse = self.textures.get("empire_diffuse").copied();
        let renderer = self.renderer_mut()?;

        let empire = renderer.mesh_id("empire");
        let textured = renderer.material_id("texturedmesh");
        let default = renderer.material_id("defaultmesh");

        if let (Some(empire), Some(textured), Some(diffuse)) = (empire, textured, diffuse) {
            let (gpu, _, deletion_queue) = renderer.upload_parts();
            let sampler = texture::create_nearest_sampler(&gpu.device, deletion_queue)?;
            renderer.bind_texture(textured, sampler, diffuse.view)?;
            renderer.add_object(RenderObject {
                mesh: empire,
                material: textured,
                transform: Mat4::from_translation(Vec3::new(5.0, -10.0, 0.0)),
            })?;
            return Ok(());
        }

        let (Some(triangle), Some(default)) = (renderer.mesh_id("triangle"), default) else {
            log::warn!("No usable material, the scene stays empty");
            return Ok(());
        };
        let scale = Mat4::from_scale(Vec3::splat(0.2));
        for x in -20..=20 {
            for z in -20..=20 {
                let translation = Mat4::from_translation(Vec3::new(x as f32, 0.0, z as f32));
                renderer.add_object(RenderObject {
                    mesh: triangle,
                    material: default,
                    transform: translation * scale,
                })?;
            }
        }
        Ok(())
    }

    /// Render one frame. A no-op after cleanup.
    pub fn draw(&mut self) -> RenderResult<()> {
        match self.renderer.as_mut() {
            Some(renderer) => renderer.draw(),
            None => Ok(()),
        }
    }

    /// Wait for the GPU and release everything. Safe to call more than once.
    pub fn cleanup(&mut self) {
        let Some(renderer) = self.renderer.take() else {
            return;
        };
        self.textures.clear();

        log::info!("Cleaning up after {} frames", renderer.frame_number());
        match renderer.shutdown() {
            // Device goes last
            Ok(device) => drop(device),
            Err(e) => log::error!("Cleanup failed: {}", e),
        }
        log::info!("Cleanup complete");
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.cleanup();
    }
}

type MaterialPipeline = (&'static str, vk::Pipeline, vk::PipelineLayout);

/// Everything the renderer draws through: swapchain, depth, render pass,
/// framebuffers, descriptor layouts and material pipelines
fn build_target(
    device: &VulkanDevice,
    config: &Config,
    width: u32,
    height: u32,
    deletion_queue: &mut DeletionQueue<VulkanDevice>,
) -> Result<(RenderTarget, DescriptorLayouts, Vec<MaterialPipeline>)> {
    let chain = PresentationChain::new(device, width, height, config.present_mode(), deletion_queue)
        .context("Failed to create swapchain")?;

    let render_pass = pipeline::create_render_pass(&device.device, chain.image_format)?;
    deletion_queue.register(Disposal::RenderPass(render_pass));
    let framebuffers = chain.create_framebuffers(device, render_pass, deletion_queue)?;

    let layouts = DescriptorLayouts::new(&device.device, deletion_queue)?;
    let materials = build_materials(
        &device.device,
        &layouts,
        render_pass,
        chain.extent,
        &config.assets.shader_dir,
        deletion_queue,
    )?;

    let target = RenderTarget {
        swapchain: chain.swapchain,
        render_pass,
        framebuffers,
        extent: chain.extent,
    };
    Ok((target, layouts, materials))
}

/// Build one pipeline per material whose shaders load. Missing shaders skip
/// the material; layout or pass failures are fatal.
fn build_materials(
    device: &ash::Device,
    layouts: &DescriptorLayouts,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    shader_dir: &Path,
    deletion_queue: &mut DeletionQueue<VulkanDevice>,
) -> RenderResult<Vec<MaterialPipeline>> {
    let vertex = shader::load_shader_module(device, &shader_dir.join(VERTEX_SHADER));
    let mut built = Vec::new();

    for material in &MATERIALS {
        let mut set_layouts = vec![layouts.global, layouts.object];
        if material.textured {
            set_layouts.push(layouts.single_texture);
        }
        let layout = pipeline::create_pipeline_layout(device, &set_layouts)?;
        deletion_queue.register(Disposal::PipelineLayout(layout));

        let fragment = shader::load_shader_module(device, &shader_dir.join(material.fragment));
        let (Some(vertex), Some(fragment)) = (vertex, fragment) else {
            log::warn!("Skipping material '{}': shader missing", material.name);
            if let Some(fragment) = fragment {
                unsafe { device.destroy_shader_module(fragment, None) };
            }
            continue;
        };

        let pipeline = PipelineBuilder::new(extent, layout)
            .stage(vk::ShaderStageFlags::VERTEX, vertex)
            .stage(vk::ShaderStageFlags::FRAGMENT, fragment)
            .build(device, render_pass);
        unsafe { device.destroy_shader_module(fragment, None) };

        match pipeline {
            Some(pipeline) => {
                deletion_queue.register(Disposal::Pipeline(pipeline));
                built.push((material.name, pipeline, layout));
            }
            None => log::warn!("Skipping material '{}': pipeline creation failed", material.name),
        }
    }

    if let Some(vertex) = vertex {
        unsafe { device.destroy_shader_module(vertex, None) };
    }
    Ok(built)
}
