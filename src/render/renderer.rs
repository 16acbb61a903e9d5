// Frame orchestrator
//
// Owns everything the draw loop touches: the frame ring, the upload channel,
// registries, the scene and the deletion queue. `draw` runs one tick of the
// frame protocol:
//
//   wait fence -> reset fence -> acquire image -> reset + begin cmd
//   -> write frame data -> render pass (draws) -> submit -> present
//   -> frame_number += 1
//
// Any GPU failure aborts the tick with a RenderError; the caller exits.

use ash::vk;
use glam::Vec4;
use gpu_allocator::MemoryLocation;

use super::deletion::{DeletionQueue, Disposal};
use super::frame::{FrameRing, FRAME_OVERLAP, MAX_OBJECTS};
use super::material::{Material, MaterialId};
use super::mesh::{Mesh, MeshId, Vertex};
use super::registry::Registry;
use super::scene::{self, Camera, MeshPushConstants, RenderObject};
use super::upload::UploadContext;
use crate::backend::descriptors::DescriptorLayouts;
use crate::error::{RenderError, RenderResult, VkCheck};
use crate::gpu::{BufferDesc, BufferMapping, GpuDevice, HostBuffer, RenderPassBegin, Submission};

/// What a frame renders into
#[derive(Debug, Clone)]
pub struct RenderTarget {
    pub swapchain: vk::SwapchainKHR,
    pub render_pass: vk::RenderPass,
    /// One per swapchain image, indexed by the acquired image index
    pub framebuffers: Vec<vk::Framebuffer>,
    pub extent: vk::Extent2D,
}

#[derive(Debug, Clone, Copy)]
pub struct RendererSettings {
    pub clear_color: [f32; 4],
    /// Bound on the per-frame fence wait and image acquire
    pub frame_timeout_ns: u64,
    /// Bound on immediate-submit fence waits
    pub upload_timeout_ns: u64,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 1.0, 1.0],
            frame_timeout_ns: 1_000_000_000,
            upload_timeout_ns: 9_999_999_999,
        }
    }
}

pub struct Renderer<G: GpuDevice> {
    gpu: G,
    deletion_queue: DeletionQueue<G>,
    target: RenderTarget,
    layouts: DescriptorLayouts,
    ring: FrameRing<G>,
    upload: UploadContext,
    settings: RendererSettings,

    meshes: Registry<Mesh>,
    materials: Registry<Material>,
    renderables: Vec<RenderObject>,
    camera: Camera,

    frame_number: u64,
    last_image_index: Option<u32>,
}

impl<G: GpuDevice> Renderer<G> {
    /// Build the frame ring and upload channel on top of an existing target.
    ///
    /// `deletion_queue` already holds whatever was created for the target;
    /// the renderer takes it over and flushes it in `shutdown`.
    pub fn new(
        gpu: G,
        mut deletion_queue: DeletionQueue<G>,
        target: RenderTarget,
        layouts: DescriptorLayouts,
        settings: RendererSettings,
    ) -> RenderResult<Self> {
        let (ring, upload) = deletion_queue.build_or_flush(&gpu, |queue| {
            let ring = FrameRing::new(&gpu, &layouts, queue)?;
            match UploadContext::new(&gpu, queue, settings.upload_timeout_ns) {
                Ok(upload) => Ok((ring, upload)),
                Err(e) => {
                    ring.retire(queue);
                    Err(e)
                }
            }
        })?;

        log::info!(
            "Renderer ready: {}x{}, {} swapchain images, {} frames in flight",
            target.extent.width,
            target.extent.height,
            target.framebuffers.len(),
            FRAME_OVERLAP
        );

        Ok(Self {
            gpu,
            deletion_queue,
            target,
            layouts,
            ring,
            upload,
            settings,
            meshes: Registry::new(),
            materials: Registry::new(),
            renderables: Vec::new(),
            camera: Camera::default(),
            frame_number: 0,
            last_image_index: None,
        })
    }

    pub fn gpu(&self) -> &G {
        &self.gpu
    }

    pub fn deletion_queue(&self) -> &DeletionQueue<G> {
        &self.deletion_queue
    }

    /// Split borrow for uploads that live outside the renderer (textures)
    pub fn upload_parts(&mut self) -> (&G, &UploadContext, &mut DeletionQueue<G>) {
        (&self.gpu, &self.upload, &mut self.deletion_queue)
    }

    pub fn target(&self) -> &RenderTarget {
        &self.target
    }

    pub fn ring(&self) -> &FrameRing<G> {
        &self.ring
    }

    /// Frames submitted so far
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Swapchain image used by the last completed tick
    pub fn last_image_index(&self) -> Option<u32> {
        self.last_image_index
    }

    pub fn image_count(&self) -> usize {
        self.target.framebuffers.len()
    }

    // ---- assets ------------------------------------------------------------

    /// Copy `vertices` into a new device-local vertex buffer through a
    /// staging buffer and register the mesh under `name`.
    pub fn upload_mesh(&mut self, name: &str, vertices: Vec<Vertex>) -> RenderResult<MeshId> {
        if vertices.is_empty() {
            return Err(RenderError::Allocation {
                name: name.to_string(),
                reason: "mesh has no vertices".to_string(),
            });
        }

        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        let size = bytes.len() as u64;

        let mut staging = self.gpu.create_buffer(&BufferDesc {
            name: "mesh staging",
            size,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
            location: MemoryLocation::CpuToGpu,
        })?;
        BufferMapping::new(&mut staging)?.write_bytes(0, bytes)?;

        let vertex_buffer = self.gpu.create_buffer(&BufferDesc {
            name,
            size,
            usage: vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            location: MemoryLocation::GpuOnly,
        })?;

        let (src, dst) = (staging.handle(), vertex_buffer.handle());
        let copied = self
            .upload
            .immediate_submit(&self.gpu, |cmd| self.gpu.cmd_copy_buffer(cmd, src, dst, size));
        self.deletion_queue.register(Disposal::Buffer(vertex_buffer));
        match copied {
            Ok(()) => self.gpu.dispose(Disposal::Buffer(staging)),
            // The copy may still be in flight; free staging after the idle wait
            Err(e) => {
                self.deletion_queue.register(Disposal::Buffer(staging));
                return Err(e);
            }
        }

        log::debug!("Uploaded mesh '{}' ({} vertices)", name, vertices.len());
        Ok(self.meshes.insert(
            name,
            Mesh {
                vertices,
                vertex_buffer: dst,
            },
        ))
    }

    pub fn create_material(
        &mut self,
        name: &str,
        pipeline: vk::Pipeline,
        layout: vk::PipelineLayout,
    ) -> MaterialId {
        self.materials.insert(name, Material::new(pipeline, layout))
    }

    /// Allocate a set-2 descriptor pointing at `view` and attach it to a material
    pub fn bind_texture(
        &mut self,
        material: MaterialId,
        sampler: vk::Sampler,
        view: vk::ImageView,
    ) -> RenderResult<()> {
        if !self.materials.contains(material) {
            return Err(unknown_material(material));
        }
        let set = self
            .gpu
            .allocate_descriptor_set(self.layouts.pool, self.layouts.single_texture)
            .check("vkAllocateDescriptorSets")?;
        self.gpu.write_image_descriptor(set, 0, sampler, view);

        if let Some(entry) = self.materials.get_mut(material) {
            entry.texture_set = Some(set);
        }
        Ok(())
    }

    pub fn mesh_id(&self, name: &str) -> Option<MeshId> {
        self.meshes.id(name)
    }

    pub fn material_id(&self, name: &str) -> Option<MaterialId> {
        self.materials.id(name)
    }

    pub fn mesh(&self, id: MeshId) -> Option<&Mesh> {
        self.meshes.get(id)
    }

    pub fn material(&self, id: MaterialId) -> Option<&Material> {
        self.materials.get(id)
    }

    // ---- scene -------------------------------------------------------------

    /// Append an object to the scene. Draw order is insertion order.
    pub fn add_object(&mut self, object: RenderObject) -> RenderResult<()> {
        if !self.meshes.contains(object.mesh) {
            return Err(RenderError::UnknownResource {
                kind: "mesh",
                id: object.mesh.index(),
            });
        }
        if !self.materials.contains(object.material) {
            return Err(unknown_material(object.material));
        }
        if self.renderables.len() >= MAX_OBJECTS {
            return Err(RenderError::ObjectCapacity {
                count: self.renderables.len() + 1,
                capacity: MAX_OBJECTS,
            });
        }
        self.renderables.push(object);
        Ok(())
    }

    pub fn objects(&self) -> &[RenderObject] {
        &self.renderables
    }

    // ---- frame -------------------------------------------------------------

    /// Render and present one frame
    pub fn draw(&mut self) -> RenderResult<()> {
        let timeout = self.settings.frame_timeout_ns;
        let slot = FrameRing::<G>::slot(self.frame_number);

        // The GPU is done with this slot once its fence signals
        let sync = self.ring.wait_for_slot(&self.gpu, slot, timeout)?;

        let image_index = self
            .gpu
            .acquire_next_image(self.target.swapchain, sync.present_semaphore, timeout)
            .check("vkAcquireNextImageKHR")?;
        let framebuffer = self
            .target
            .framebuffers
            .get(image_index as usize)
            .copied()
            .ok_or(RenderError::UnknownResource {
                kind: "swapchain image",
                id: image_index,
            })?;

        let cmd = sync.command_buffer;
        self.gpu.reset_command_buffer(cmd).check("vkResetCommandBuffer")?;
        self.gpu.begin_command_buffer(cmd).check("vkBeginCommandBuffer")?;

        self.write_frame_data(slot)?;

        self.gpu.cmd_begin_render_pass(
            cmd,
            &RenderPassBegin {
                render_pass: self.target.render_pass,
                framebuffer,
                extent: self.target.extent,
                clear_color: scene::clear_color_at(self.settings.clear_color, self.frame_number),
                clear_depth: 1.0,
            },
        );
        self.record_draws(cmd, slot)?;
        self.gpu.cmd_end_render_pass(cmd);
        self.gpu.end_command_buffer(cmd).check("vkEndCommandBuffer")?;

        self.gpu
            .queue_submit(&Submission {
                command_buffer: cmd,
                wait: Some((
                    sync.present_semaphore,
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                )),
                signal: Some(sync.render_semaphore),
                fence: sync.render_fence,
            })
            .check("vkQueueSubmit")?;

        self.gpu
            .queue_present(self.target.swapchain, image_index, sync.render_semaphore)
            .check("vkQueuePresentKHR")?;

        self.frame_number += 1;
        self.last_image_index = Some(image_index);
        Ok(())
    }

    /// Camera, scene parameters and object transforms for the current slot
    fn write_frame_data(&mut self, slot: usize) -> RenderResult<()> {
        let camera = self.camera.data(self.target.extent);
        self.ring.write_camera(slot, &camera)?;
        self.ring.write_scene(slot, &scene::scene_at(self.frame_number))?;
        self.ring.write_objects(slot, &self.renderables)
    }

    /// Draw the scene in order, rebinding only when material or mesh changes
    fn record_draws(&self, cmd: vk::CommandBuffer, slot: usize) -> RenderResult<()> {
        let frame = self.ring.frame(slot);
        let scene_offset = self.ring.scene_offset(slot) as u32;

        let mut last_material: Option<MaterialId> = None;
        let mut last_mesh: Option<MeshId> = None;

        for (draw_index, object) in self.renderables.iter().enumerate() {
            let material = self
                .materials
                .get(object.material)
                .ok_or_else(|| unknown_material(object.material))?;

            if last_material != Some(object.material) {
                self.gpu.cmd_bind_pipeline(cmd, material.pipeline);
                self.gpu.cmd_bind_descriptor_set(
                    cmd,
                    material.layout,
                    0,
                    frame.global_descriptor,
                    &[scene_offset],
                );
                self.gpu
                    .cmd_bind_descriptor_set(cmd, material.layout, 1, frame.object_descriptor, &[]);
                if let Some(texture_set) = material.texture_set {
                    self.gpu
                        .cmd_bind_descriptor_set(cmd, material.layout, 2, texture_set, &[]);
                }
                last_material = Some(object.material);
            }

            let constants = MeshPushConstants {
                data: Vec4::ZERO,
                render_matrix: object.transform,
            };
            self.gpu
                .cmd_push_constants(cmd, material.layout, bytemuck::bytes_of(&constants));

            let mesh = self
                .meshes
                .get(object.mesh)
                .ok_or(RenderError::UnknownResource {
                    kind: "mesh",
                    id: object.mesh.index(),
                })?;
            if last_mesh != Some(object.mesh) {
                self.gpu.cmd_bind_vertex_buffer(cmd, mesh.vertex_buffer);
                last_mesh = Some(object.mesh);
            }

            // Instance index selects the object's transform in the storage buffer
            self.gpu.cmd_draw(cmd, mesh.vertex_count(), draw_index as u32);
        }
        Ok(())
    }

    /// Wait for the GPU, destroy everything the renderer registered, and hand
    /// the device back so it can be dropped last.
    pub fn shutdown(self) -> RenderResult<G> {
        let Self {
            gpu,
            mut deletion_queue,
            ring,
            meshes,
            materials,
            ..
        } = self;
        log::info!(
            "Releasing {} meshes and {} materials",
            meshes.len(),
            materials.len()
        );
        ring.retire(&mut deletion_queue);
        deletion_queue.flush(&gpu)?;
        log::info!("Renderer shut down");
        Ok(gpu)
    }
}

fn unknown_material(id: MaterialId) -> RenderError {
    RenderError::UnknownResource {
        kind: "material",
        id: id.index(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::deletion::ResourceKind;
    use crate::testing::{fake_layouts, fake_target, Call, RecordingGpu};
    use glam::{Mat4, Vec3};

    fn renderer(width: u32, height: u32) -> Renderer<RecordingGpu> {
        let gpu = RecordingGpu::new();
        let layouts = fake_layouts(&gpu);
        let target = fake_target(&gpu, width, height);
        Renderer::new(gpu, DeletionQueue::new(), target, layouts, RendererSettings::default())
            .unwrap()
    }

    fn material(renderer: &mut Renderer<RecordingGpu>, name: &str) -> MaterialId {
        let pipeline = renderer.gpu().handle();
        let layout = renderer.gpu().handle();
        renderer.create_material(name, pipeline, layout)
    }

    fn object(mesh: MeshId, material: MaterialId) -> RenderObject {
        RenderObject {
            mesh,
            material,
            transform: Mat4::IDENTITY,
        }
    }

    fn count(calls: &[Call], pred: impl Fn(&Call) -> bool) -> usize {
        calls.iter().filter(|c| pred(c)).count()
    }

    #[test]
    fn end_to_end_single_textured_triangle() {
        let mut renderer = renderer(1700, 900);
        let mesh = renderer.upload_mesh("triangle", crate::render::mesh::triangle()).unwrap();
        let textured = material(&mut renderer, "texturedmesh");
        let (sampler, view) = (renderer.gpu().handle(), renderer.gpu().handle());
        renderer.bind_texture(textured, sampler, view).unwrap();
        renderer.add_object(object(mesh, textured)).unwrap();
        renderer.gpu().clear_calls();

        assert_eq!(renderer.frame_number(), 0);
        renderer.draw().unwrap();

        assert_eq!(renderer.frame_number(), 1);
        let index = renderer.last_image_index().unwrap();
        assert!((index as usize) < renderer.image_count());

        let calls = renderer.gpu().calls();
        let draws: Vec<&Call> = calls.iter().filter(|c| matches!(c, Call::Draw { .. })).collect();
        assert_eq!(draws, vec![&Call::Draw { vertex_count: 3, first_instance: 0 }]);
        assert!(calls.iter().any(|c| matches!(
            c,
            Call::BeginRenderPass { width: 1700, height: 900, .. }
        )));
        assert!(calls.iter().any(|c| matches!(c, Call::BindDescriptorSet { set_index: 2, .. })));
        assert_eq!(count(&calls, |c| matches!(c, Call::Present { .. })), 1);
    }

    #[test]
    fn frame_protocol_order() {
        let mut renderer = renderer(800, 600);
        renderer.gpu().clear_calls();
        renderer.draw().unwrap();

        let sync = renderer.ring().frame(0).sync;
        let calls = renderer.gpu().calls();
        let position = |wanted: &Call| calls.iter().position(|c| c == wanted).unwrap();

        let wait = position(&Call::WaitForFence(sync.render_fence));
        let reset = position(&Call::ResetFence(sync.render_fence));
        let acquire = calls
            .iter()
            .position(|c| matches!(c, Call::AcquireNextImage { semaphore, .. } if *semaphore == sync.present_semaphore))
            .unwrap();
        let reset_cmd = position(&Call::ResetCommandBuffer(sync.command_buffer));
        let begin = position(&Call::BeginCommandBuffer(sync.command_buffer));
        let submit = position(&Call::Submit {
            cmd: sync.command_buffer,
            wait: Some((sync.present_semaphore, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)),
            signal: Some(sync.render_semaphore),
            fence: sync.render_fence,
        });
        let present = calls
            .iter()
            .position(|c| matches!(c, Call::Present { wait, .. } if *wait == sync.render_semaphore))
            .unwrap();

        assert!(wait < reset);
        assert!(reset < acquire);
        assert!(acquire < reset_cmd);
        assert!(reset_cmd < begin);
        assert!(begin < submit);
        assert!(submit < present);
    }

    #[test]
    fn fence_wait_precedes_every_slot_reuse() {
        let mut renderer = renderer(800, 600);
        renderer.gpu().clear_calls();

        for _ in 0..=FRAME_OVERLAP {
            renderer.draw().unwrap();
        }

        let calls = renderer.gpu().calls();
        for frame in renderer.ring().frames() {
            let sync = frame.sync;
            let mut waited = false;
            for call in &calls {
                match call {
                    Call::WaitForFence(fence) if *fence == sync.render_fence => waited = true,
                    Call::ResetCommandBuffer(cmd) if *cmd == sync.command_buffer => {
                        assert!(waited, "command buffer reset before its fence wait");
                        waited = false;
                    }
                    _ => {}
                }
            }
        }
        assert_eq!(renderer.frame_number(), FRAME_OVERLAP as u64 + 1);
    }

    #[test]
    fn consecutive_ticks_alternate_slots() {
        let mut renderer = renderer(800, 600);
        renderer.gpu().clear_calls();
        renderer.draw().unwrap();
        renderer.draw().unwrap();

        let waited: Vec<vk::Fence> = renderer
            .gpu()
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::WaitForFence(fence) => Some(fence),
                _ => None,
            })
            .collect();
        let ring = renderer.ring();
        assert_eq!(
            waited,
            vec![ring.frame(0).sync.render_fence, ring.frame(1).sync.render_fence]
        );
    }

    #[test]
    fn fence_timeout_aborts_tick() {
        let mut renderer = renderer(800, 600);
        renderer.gpu().clear_calls();
        renderer.gpu().fail_fence_waits(vk::Result::TIMEOUT);

        let err = renderer.draw().unwrap_err();

        assert!(matches!(err, RenderError::Timeout { call: "vkWaitForFences", .. }));
        assert_eq!(renderer.frame_number(), 0);
        assert!(renderer.last_image_index().is_none());
        let calls = renderer.gpu().calls();
        assert_eq!(count(&calls, |c| matches!(c, Call::Submit { .. })), 0);
        assert_eq!(count(&calls, |c| matches!(c, Call::Present { .. })), 0);
    }

    #[test]
    fn acquire_timeout_aborts_tick() {
        let mut renderer = renderer(800, 600);
        renderer.gpu().clear_calls();
        renderer.gpu().fail_acquire(vk::Result::TIMEOUT);

        let err = renderer.draw().unwrap_err();

        assert!(matches!(err, RenderError::Timeout { call: "vkAcquireNextImageKHR", .. }));
        assert_eq!(renderer.frame_number(), 0);
        assert!(renderer.last_image_index().is_none());
        let calls = renderer.gpu().calls();
        assert_eq!(count(&calls, |c| matches!(c, Call::BeginCommandBuffer(_))), 0);
        assert_eq!(count(&calls, |c| matches!(c, Call::Submit { .. })), 0);
        assert_eq!(count(&calls, |c| matches!(c, Call::Present { .. })), 0);
    }

    #[test]
    fn frame_data_is_written_after_slot_fence() {
        let mut renderer = renderer(800, 600);
        let mesh = renderer.upload_mesh("triangle", crate::render::mesh::triangle()).unwrap();
        let m = material(&mut renderer, "defaultmesh");
        renderer.add_object(object(mesh, m)).unwrap();

        for tick in 0..=FRAME_OVERLAP {
            renderer.gpu().clear_calls();
            renderer.draw().unwrap();

            let frame = renderer.ring().frame(tick % FRAME_OVERLAP);
            let calls = renderer.gpu().calls();
            let wait = calls
                .iter()
                .position(|c| *c == Call::WaitForFence(frame.sync.render_fence))
                .unwrap();
            let first_map = calls
                .iter()
                .position(|c| matches!(c, Call::MapBuffer(_)))
                .unwrap();
            assert!(wait < first_map, "tick {} wrote frame data before its fence", tick);

            let mapped: Vec<vk::Buffer> = calls
                .iter()
                .filter_map(|c| match c {
                    Call::MapBuffer(buffer) => Some(*buffer),
                    _ => None,
                })
                .collect();
            assert_eq!(
                mapped,
                vec![
                    frame.camera_buffer.handle,
                    renderer.ring().scene_buffer().handle,
                    frame.object_buffer.handle,
                ]
            );
        }
    }

    #[test]
    fn failed_upload_keeps_staging_until_idle() {
        let mut renderer = renderer(800, 600);
        renderer.gpu().clear_calls();
        renderer.gpu().fail_fence_waits(vk::Result::TIMEOUT);

        let err = renderer
            .upload_mesh("triangle", crate::render::mesh::triangle())
            .unwrap_err();

        assert!(err.is_timeout());
        assert!(renderer.mesh_id("triangle").is_none());
        let staging = renderer
            .gpu()
            .calls()
            .iter()
            .find_map(|c| match c {
                Call::CreateBuffer { name, buffer, .. } if name == "mesh staging" => Some(*buffer),
                _ => None,
            })
            .unwrap();
        let staging_disposal = Call::Dispose(ResourceKind::Buffer, ash::vk::Handle::as_raw(staging));
        assert!(!renderer.gpu().calls().contains(&staging_disposal));

        let gpu = renderer.shutdown().unwrap();

        let calls = gpu.calls();
        let idle = calls.iter().position(|c| *c == Call::WaitIdle).unwrap();
        let disposed = calls.iter().position(|c| *c == staging_disposal).unwrap();
        assert!(idle < disposed);
    }

    #[test]
    fn batching_rebinds_only_on_material_change() {
        let mut renderer = renderer(800, 600);
        let mesh = renderer.upload_mesh("triangle", crate::render::mesh::triangle()).unwrap();
        let a = material(&mut renderer, "a");
        let b = material(&mut renderer, "b");
        for m in [a, a, b, a] {
            renderer.add_object(object(mesh, m)).unwrap();
        }
        renderer.gpu().clear_calls();

        renderer.draw().unwrap();

        let calls = renderer.gpu().calls();
        assert_eq!(count(&calls, |c| matches!(c, Call::BindPipeline(_))), 3);
        assert_eq!(count(&calls, |c| matches!(c, Call::BindVertexBuffer(_))), 1);
        assert_eq!(count(&calls, |c| matches!(c, Call::PushConstants { .. })), 4);
        let instances: Vec<u32> = calls
            .iter()
            .filter_map(|c| match c {
                Call::Draw { first_instance, .. } => Some(*first_instance),
                _ => None,
            })
            .collect();
        assert_eq!(instances, vec![0, 1, 2, 3]);
    }

    #[test]
    fn global_set_uses_slot_scene_offset() {
        let mut renderer = renderer(800, 600);
        let mesh = renderer.upload_mesh("triangle", crate::render::mesh::triangle()).unwrap();
        let m = material(&mut renderer, "defaultmesh");
        renderer.add_object(object(mesh, m)).unwrap();
        renderer.gpu().clear_calls();

        renderer.draw().unwrap();
        renderer.draw().unwrap();

        let offsets: Vec<Vec<u32>> = renderer
            .gpu()
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::BindDescriptorSet { set_index: 0, dynamic_offsets, .. } => Some(dynamic_offsets),
                _ => None,
            })
            .collect();
        let stride = renderer.ring().scene_stride() as u32;
        assert_eq!(offsets, vec![vec![0], vec![stride]]);
    }

    #[test]
    fn object_transform_written_at_draw_index() {
        let mut renderer = renderer(800, 600);
        let mesh = renderer.upload_mesh("triangle", crate::render::mesh::triangle()).unwrap();
        let m = material(&mut renderer, "defaultmesh");
        let moved = Mat4::from_translation(Vec3::new(5.0, -10.0, 0.0));
        renderer.add_object(object(mesh, m)).unwrap();
        renderer
            .add_object(RenderObject { transform: moved, ..object(mesh, m) })
            .unwrap();

        renderer.draw().unwrap();

        let bytes = &renderer.ring().frame(0).object_buffer.bytes;
        let stride = std::mem::size_of::<crate::render::scene::GpuObjectData>();
        assert_eq!(&bytes[stride..2 * stride], bytemuck::bytes_of(&moved));
    }

    #[test]
    fn upload_mesh_copies_through_staging() {
        let mut renderer = renderer(800, 600);
        renderer.gpu().clear_calls();

        let id = renderer.upload_mesh("triangle", crate::render::mesh::triangle()).unwrap();

        let calls = renderer.gpu().calls();
        let size = 3 * std::mem::size_of::<Vertex>() as u64;
        let vertex_buffer = renderer.mesh(id).unwrap().vertex_buffer;
        let staging = calls
            .iter()
            .find_map(|c| match c {
                Call::CreateBuffer { name, buffer, .. } if name == "mesh staging" => Some(*buffer),
                _ => None,
            })
            .unwrap();
        assert!(calls.contains(&Call::CopyBuffer { src: staging, dst: vertex_buffer, size }));
        // staging is freed right away, the vertex buffer waits for shutdown
        assert!(calls.contains(&Call::Dispose(ResourceKind::Buffer, ash::vk::Handle::as_raw(staging))));
        assert_eq!(renderer.mesh_id("triangle"), Some(id));
    }

    #[test]
    fn empty_mesh_is_rejected() {
        let mut renderer = renderer(800, 600);
        assert!(renderer.upload_mesh("empty", Vec::new()).is_err());
        assert!(renderer.mesh_id("empty").is_none());
    }

    #[test]
    fn objects_must_reference_registered_assets() {
        let mut renderer = renderer(800, 600);
        let mesh = renderer.upload_mesh("triangle", crate::render::mesh::triangle()).unwrap();
        let bogus = MaterialId::from_index(7);

        let err = renderer.add_object(object(mesh, bogus)).unwrap_err();

        assert!(matches!(err, RenderError::UnknownResource { kind: "material", id: 7 }));
        assert!(renderer.objects().is_empty());
    }

    #[test]
    fn object_capacity_is_enforced() {
        let mut renderer = renderer(800, 600);
        let mesh = renderer.upload_mesh("triangle", crate::render::mesh::triangle()).unwrap();
        let m = material(&mut renderer, "defaultmesh");
        for _ in 0..MAX_OBJECTS {
            renderer.add_object(object(mesh, m)).unwrap();
        }

        let err = renderer.add_object(object(mesh, m)).unwrap_err();

        assert!(matches!(err, RenderError::ObjectCapacity { capacity: MAX_OBJECTS, .. }));
        assert_eq!(renderer.objects().len(), MAX_OBJECTS);
    }

    #[test]
    fn shutdown_waits_idle_then_disposes_everything() {
        let mut renderer = renderer(800, 600);
        renderer.upload_mesh("triangle", crate::render::mesh::triangle()).unwrap();
        renderer.draw().unwrap();
        let registered = renderer.deletion_queue().len();
        renderer.gpu().clear_calls();

        let gpu = renderer.shutdown().unwrap();

        let calls = gpu.calls();
        assert_eq!(calls[0], Call::WaitIdle);
        let disposed = count(&calls, |c| matches!(c, Call::Dispose(..)));
        // ring buffers join the queue at shutdown: scene + camera/object per slot
        assert_eq!(disposed, registered + 1 + 2 * FRAME_OVERLAP);
    }
}
