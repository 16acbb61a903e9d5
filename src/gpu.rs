// GPU seam
//
// Everything the frame ring, the upload channel, the deletion queue and the
// renderer ask of the GPU goes through `GpuDevice`. `VulkanDevice` implements
// it against the driver. Handles are plain `ash::vk` handles, which are just
// numbers, so a test double can hand out fake ones.
//
// Methods return raw `VkResult`s; callers apply `VkCheck::check` so that a
// failure is reported at the call site that issued it.

use ash::prelude::VkResult;
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;

use crate::error::{RenderError, RenderResult};
use crate::render::deletion::Disposal;

/// Description of a buffer to allocate
#[derive(Debug, Clone, Copy)]
pub struct BufferDesc<'a> {
    /// Debug name, shows up in allocator reports
    pub name: &'a str,
    pub size: u64,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryLocation,
}

/// One queue submission. Every submission in this engine carries exactly one
/// command buffer and at most one semaphore on each side.
#[derive(Debug, Clone, Copy)]
pub struct Submission {
    pub command_buffer: vk::CommandBuffer,
    /// Semaphore to wait on and the stage that waits
    pub wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
    pub signal: Option<vk::Semaphore>,
    /// Signaled once the whole batch has completed
    pub fence: vk::Fence,
}

/// Parameters of `vkCmdBeginRenderPass` for our single-subpass pass
#[derive(Debug, Clone, Copy)]
pub struct RenderPassBegin {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub clear_color: [f32; 4],
    pub clear_depth: f32,
}

/// Buffer whose memory the CPU can write through a `BufferMapping`
pub trait HostBuffer {
    fn handle(&self) -> vk::Buffer;

    /// Size requested at creation, the limit for every mapped write
    fn size(&self) -> u64;

    /// Make the memory host-accessible. Fails for device-local memory.
    fn map(&mut self) -> RenderResult<()>;

    /// Mapped bytes, `None` outside of a map/unmap pair
    fn mapped_bytes(&mut self) -> Option<&mut [u8]>;

    fn unmap(&mut self);
}

/// Narrow view of the GPU used by the frame lifecycle.
pub trait GpuDevice {
    type Buffer: HostBuffer;
    type Image;

    /// `minUniformBufferOffsetAlignment` of the selected physical device
    fn min_uniform_alignment(&self) -> u64;

    // ---- creation ----------------------------------------------------------

    fn create_command_pool(&self, flags: vk::CommandPoolCreateFlags) -> VkResult<vk::CommandPool>;
    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer>;
    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence>;
    fn create_semaphore(&self) -> VkResult<vk::Semaphore>;
    fn create_buffer(&self, desc: &BufferDesc) -> RenderResult<Self::Buffer>;
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet>;
    fn write_buffer_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        buffer: vk::Buffer,
        range: u64,
    );
    fn write_image_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        sampler: vk::Sampler,
        view: vk::ImageView,
    );

    // ---- synchronization ---------------------------------------------------

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()>;
    fn wait_idle(&self) -> VkResult<()>;

    // ---- presentation ------------------------------------------------------

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> VkResult<u32>;
    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<()>;

    // ---- command recording -------------------------------------------------

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn reset_command_pool(&self, pool: vk::CommandPool) -> VkResult<()>;
    /// Begins a one-time-submit recording
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()>;
    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBegin);
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    );
    fn cmd_push_constants(&self, cmd: vk::CommandBuffer, layout: vk::PipelineLayout, bytes: &[u8]);
    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, first_instance: u32);
    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, size: u64);

    fn queue_submit(&self, submission: &Submission) -> VkResult<()>;

    // ---- teardown ----------------------------------------------------------

    /// Destroy one resource. Only the deletion queue and the upload path
    /// (for staging buffers, after their fence) call this.
    fn dispose(&self, record: Disposal<Self::Buffer, Self::Image>);
}

/// Scoped write access to a host-visible buffer.
///
/// Every write is checked against the buffer's size; the memory is unmapped
/// when the guard drops, whichever way the scope is left.
pub struct BufferMapping<'a, B: HostBuffer> {
    buffer: &'a mut B,
}

impl<'a, B: HostBuffer> BufferMapping<'a, B> {
    pub fn new(buffer: &'a mut B) -> RenderResult<Self> {
        buffer.map()?;
        Ok(Self { buffer })
    }

    pub fn write<T: Pod>(&mut self, offset: u64, value: &T) -> RenderResult<()> {
        self.write_bytes(offset, bytemuck::bytes_of(value))
    }

    pub fn write_slice<T: Pod>(&mut self, offset: u64, values: &[T]) -> RenderResult<()> {
        self.write_bytes(offset, bytemuck::cast_slice(values))
    }

    pub fn write_bytes(&mut self, offset: u64, bytes: &[u8]) -> RenderResult<()> {
        let size = self.buffer.size();
        let len = bytes.len() as u64;
        let out_of_bounds = RenderError::MappingOutOfBounds { offset, len, size };

        let end = match offset.checked_add(len) {
            Some(end) if end <= size => end,
            _ => return Err(out_of_bounds),
        };

        let mapped = self.buffer.mapped_bytes().ok_or(RenderError::NotHostVisible)?;
        let dst = mapped
            .get_mut(offset as usize..end as usize)
            .ok_or(out_of_bounds)?;
        dst.copy_from_slice(bytes);
        Ok(())
    }
}

impl<B: HostBuffer> Drop for BufferMapping<'_, B> {
    fn drop(&mut self) {
        self.buffer.unmap();
    }
}
