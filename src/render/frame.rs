// Frame ring
//
// FRAME_OVERLAP frame contexts, cycled by frame number. Each owns its own
// command buffer, semaphores, fence and per-frame buffers, so the CPU can
// record frame N+1 while the GPU still executes frame N. The only guard is
// the slot's fence: nothing in a slot is touched before it signals.
//
//   frame:  0      1      2      3
//   slot:   0      1      0      1
//                         ^ waits for frame 0's fence

use ash::vk;
use gpu_allocator::MemoryLocation;
use std::mem::size_of;

use super::deletion::{DeletionQueue, Disposal};
use super::scene::{GpuCameraData, GpuObjectData, GpuSceneData, RenderObject};
use crate::backend::buffer::pad_uniform_buffer_size;
use crate::backend::descriptors::DescriptorLayouts;
use crate::error::{RenderResult, VkCheck};
use crate::gpu::{BufferDesc, BufferMapping, GpuDevice, HostBuffer};

/// Number of frames in flight
pub const FRAME_OVERLAP: usize = 2;

/// Capacity of each frame's object storage buffer
pub const MAX_OBJECTS: usize = 10_000;

/// Synchronization and command handles of one slot (all plain handles, Copy)
#[derive(Debug, Clone, Copy)]
pub struct FrameSync {
    pub command_pool: vk::CommandPool,
    pub command_buffer: vk::CommandBuffer,
    /// Signaled by the swapchain when the acquired image is ready
    pub present_semaphore: vk::Semaphore,
    /// Signaled when rendering is done, waited on by present
    pub render_semaphore: vk::Semaphore,
    /// Signaled when the GPU finished the whole submission. Created signaled.
    pub render_fence: vk::Fence,
}

pub struct FrameContext<B> {
    pub sync: FrameSync,
    pub camera_buffer: B,
    pub object_buffer: B,
    /// Set 0: camera + scene (dynamic offset)
    pub global_descriptor: vk::DescriptorSet,
    /// Set 1: object transforms
    pub object_descriptor: vk::DescriptorSet,
}

pub struct FrameRing<G: GpuDevice> {
    frames: Vec<FrameContext<G::Buffer>>,
    /// One padded `GpuSceneData` per slot
    scene_buffer: G::Buffer,
    scene_stride: u64,
}

impl<G: GpuDevice> FrameRing<G> {
    pub fn new(
        gpu: &G,
        layouts: &DescriptorLayouts,
        deletion_queue: &mut DeletionQueue<G>,
    ) -> RenderResult<Self> {
        let scene_stride =
            pad_uniform_buffer_size(size_of::<GpuSceneData>() as u64, gpu.min_uniform_alignment());
        let scene_buffer = gpu.create_buffer(&BufferDesc {
            name: "scene parameters",
            size: scene_stride * FRAME_OVERLAP as u64,
            usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
            location: MemoryLocation::CpuToGpu,
        })?;
        log::debug!(
            "Scene buffer: {} slots x {} bytes (min alignment {})",
            FRAME_OVERLAP,
            scene_stride,
            gpu.min_uniform_alignment()
        );

        let frames = (0..FRAME_OVERLAP)
            .map(|_| Self::create_frame(gpu, layouts, scene_buffer.handle(), deletion_queue))
            .collect::<RenderResult<Vec<_>>>()?;

        Ok(Self {
            frames,
            scene_buffer,
            scene_stride,
        })
    }

    fn create_frame(
        gpu: &G,
        layouts: &DescriptorLayouts,
        scene_buffer: vk::Buffer,
        deletion_queue: &mut DeletionQueue<G>,
    ) -> RenderResult<FrameContext<G::Buffer>> {
        // Commands: the buffer is reset every frame, never reallocated
        let command_pool = gpu
            .create_command_pool(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .check("vkCreateCommandPool")?;
        deletion_queue.register(Disposal::CommandPool(command_pool));
        let command_buffer = gpu
            .allocate_command_buffer(command_pool)
            .check("vkAllocateCommandBuffers")?;

        // Sync: fence starts signaled so the first wait returns immediately
        let render_fence = gpu.create_fence(true).check("vkCreateFence")?;
        deletion_queue.register(Disposal::Fence(render_fence));
        let present_semaphore = gpu.create_semaphore().check("vkCreateSemaphore")?;
        let render_semaphore = gpu.create_semaphore().check("vkCreateSemaphore")?;
        deletion_queue.register(Disposal::Semaphore(present_semaphore));
        deletion_queue.register(Disposal::Semaphore(render_semaphore));

        let camera_size = size_of::<GpuCameraData>() as u64;
        let object_size = (size_of::<GpuObjectData>() * MAX_OBJECTS) as u64;

        let camera_buffer = gpu.create_buffer(&BufferDesc {
            name: "camera",
            size: camera_size,
            usage: vk::BufferUsageFlags::UNIFORM_BUFFER,
            location: MemoryLocation::CpuToGpu,
        })?;
        let object_buffer = gpu.create_buffer(&BufferDesc {
            name: "objects",
            size: object_size,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER,
            location: MemoryLocation::CpuToGpu,
        })?;

        let global_descriptor = gpu
            .allocate_descriptor_set(layouts.pool, layouts.global)
            .check("vkAllocateDescriptorSets")?;
        let object_descriptor = gpu
            .allocate_descriptor_set(layouts.pool, layouts.object)
            .check("vkAllocateDescriptorSets")?;

        gpu.write_buffer_descriptor(
            global_descriptor,
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            camera_buffer.handle(),
            camera_size,
        );
        // Range is one element; the slot is picked by the dynamic offset at bind time
        gpu.write_buffer_descriptor(
            global_descriptor,
            1,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
            scene_buffer,
            size_of::<GpuSceneData>() as u64,
        );
        gpu.write_buffer_descriptor(
            object_descriptor,
            0,
            vk::DescriptorType::STORAGE_BUFFER,
            object_buffer.handle(),
            object_size,
        );

        Ok(FrameContext {
            sync: FrameSync {
                command_pool,
                command_buffer,
                present_semaphore,
                render_semaphore,
                render_fence,
            },
            camera_buffer,
            object_buffer,
            global_descriptor,
            object_descriptor,
        })
    }

    /// Ring slot used by a given frame
    pub fn slot(frame_number: u64) -> usize {
        (frame_number % FRAME_OVERLAP as u64) as usize
    }

    pub fn frames(&self) -> &[FrameContext<G::Buffer>] {
        &self.frames
    }

    pub fn frame(&self, slot: usize) -> &FrameContext<G::Buffer> {
        &self.frames[slot]
    }

    /// Byte offset of a slot's region in the scene buffer
    pub fn scene_offset(&self, slot: usize) -> u64 {
        self.scene_stride * slot as u64
    }

    pub fn scene_stride(&self) -> u64 {
        self.scene_stride
    }

    pub fn scene_buffer(&self) -> &G::Buffer {
        &self.scene_buffer
    }

    /// Block until the GPU is done with the slot's previous frame, then
    /// re-arm its fence. A timeout means a hung GPU and is fatal.
    pub fn wait_for_slot(&self, gpu: &G, slot: usize, timeout_ns: u64) -> RenderResult<FrameSync> {
        let sync = self.frames[slot].sync;
        gpu.wait_for_fence(sync.render_fence, timeout_ns)
            .check("vkWaitForFences")?;
        gpu.reset_fence(sync.render_fence).check("vkResetFences")?;
        Ok(sync)
    }

    pub fn write_camera(&mut self, slot: usize, camera: &GpuCameraData) -> RenderResult<()> {
        BufferMapping::new(&mut self.frames[slot].camera_buffer)?.write(0, camera)
    }

    pub fn write_scene(&mut self, slot: usize, scene: &GpuSceneData) -> RenderResult<()> {
        let offset = self.scene_offset(slot);
        BufferMapping::new(&mut self.scene_buffer)?.write(offset, scene)
    }

    /// Object i's transform goes to element i, matching its draw index
    pub fn write_objects(&mut self, slot: usize, objects: &[RenderObject]) -> RenderResult<()> {
        let data: Vec<GpuObjectData> = objects
            .iter()
            .map(|object| GpuObjectData { model: object.transform })
            .collect();
        BufferMapping::new(&mut self.frames[slot].object_buffer)?.write_slice(0, &data)
    }

    /// Hand the ring's buffers over to the deletion queue. Everything else
    /// was registered when it was created.
    pub fn retire(self, deletion_queue: &mut DeletionQueue<G>) {
        deletion_queue.register(Disposal::Buffer(self.scene_buffer));
        for frame in self.frames {
            deletion_queue.register(Disposal::Buffer(frame.camera_buffer));
            deletion_queue.register(Disposal::Buffer(frame.object_buffer));
        }
    }
}
