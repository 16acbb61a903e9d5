// Recording test double for GpuDevice
//
// Hands out fresh fake handles and logs every call in order, so tests can
// assert on the exact protocol the renderer drives.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use gpu_allocator::MemoryLocation;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::backend::descriptors::DescriptorLayouts;
use crate::error::{RenderError, RenderResult};
use crate::gpu::{BufferDesc, GpuDevice, HostBuffer, RenderPassBegin, Submission};
use crate::render::deletion::{Disposal, ResourceKind};
use crate::render::renderer::RenderTarget;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateCommandPool(vk::CommandPool),
    AllocateCommandBuffer { pool: vk::CommandPool, cmd: vk::CommandBuffer },
    CreateFence { fence: vk::Fence, signaled: bool },
    CreateSemaphore(vk::Semaphore),
    CreateBuffer { name: String, buffer: vk::Buffer, size: u64 },
    AllocateDescriptorSet { layout: vk::DescriptorSetLayout, set: vk::DescriptorSet },
    WriteBufferDescriptor {
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        buffer: vk::Buffer,
        range: u64,
    },
    WriteImageDescriptor { set: vk::DescriptorSet, binding: u32, view: vk::ImageView },
    WaitForFence(vk::Fence),
    ResetFence(vk::Fence),
    WaitIdle,
    AcquireNextImage { semaphore: vk::Semaphore, index: u32 },
    Present { image_index: u32, wait: vk::Semaphore },
    ResetCommandBuffer(vk::CommandBuffer),
    ResetCommandPool(vk::CommandPool),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    BeginRenderPass {
        cmd: vk::CommandBuffer,
        framebuffer: vk::Framebuffer,
        width: u32,
        height: u32,
        clear_color: [f32; 4],
    },
    EndRenderPass(vk::CommandBuffer),
    BindPipeline(vk::Pipeline),
    BindDescriptorSet {
        set_index: u32,
        set: vk::DescriptorSet,
        dynamic_offsets: Vec<u32>,
    },
    PushConstants { layout: vk::PipelineLayout, bytes: Vec<u8> },
    BindVertexBuffer(vk::Buffer),
    Draw { vertex_count: u32, first_instance: u32 },
    CopyBuffer { src: vk::Buffer, dst: vk::Buffer, size: u64 },
    Submit {
        cmd: vk::CommandBuffer,
        wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
        signal: Option<vk::Semaphore>,
        fence: vk::Fence,
    },
    /// A buffer from `create_buffer` was mapped for writing
    MapBuffer(vk::Buffer),
    Dispose(ResourceKind, u64),
}

type CallLog = Rc<RefCell<Vec<Call>>>;

/// In-memory buffer standing in for an allocation
#[derive(Debug)]
pub struct MockBuffer {
    pub handle: vk::Buffer,
    pub bytes: Vec<u8>,
    pub host_visible: bool,
    pub mapped: bool,
    pub map_count: usize,
    pub unmap_count: usize,
    log: Option<CallLog>,
}

impl MockBuffer {
    pub fn host_visible(raw: u64, size: usize) -> Self {
        Self {
            handle: vk::Buffer::from_raw(raw),
            bytes: vec![0; size],
            host_visible: true,
            mapped: false,
            map_count: 0,
            unmap_count: 0,
            log: None,
        }
    }

    pub fn device_local(raw: u64, size: usize) -> Self {
        Self {
            host_visible: false,
            ..Self::host_visible(raw, size)
        }
    }
}

impl HostBuffer for MockBuffer {
    fn handle(&self) -> vk::Buffer {
        self.handle
    }

    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn map(&mut self) -> RenderResult<()> {
        if !self.host_visible {
            return Err(RenderError::NotHostVisible);
        }
        self.mapped = true;
        self.map_count += 1;
        if let Some(log) = &self.log {
            log.borrow_mut().push(Call::MapBuffer(self.handle));
        }
        Ok(())
    }

    fn mapped_bytes(&mut self) -> Option<&mut [u8]> {
        if self.mapped {
            Some(&mut self.bytes)
        } else {
            None
        }
    }

    fn unmap(&mut self) {
        self.mapped = false;
        self.unmap_count += 1;
    }
}

pub struct RecordingGpu {
    calls: CallLog,
    next_handle: Cell<u64>,
    image_count: u32,
    next_image: Cell<u32>,
    min_alignment: u64,
    fence_wait_error: Cell<Option<vk::Result>>,
    wait_idle_error: Cell<Option<vk::Result>>,
    acquire_error: Cell<Option<vk::Result>>,
}

impl RecordingGpu {
    pub fn new() -> Self {
        Self::with_min_alignment(256)
    }

    pub fn with_min_alignment(min_alignment: u64) -> Self {
        Self {
            calls: Rc::new(RefCell::new(Vec::new())),
            next_handle: Cell::new(1),
            image_count: 3,
            next_image: Cell::new(0),
            min_alignment,
            fence_wait_error: Cell::new(None),
            wait_idle_error: Cell::new(None),
            acquire_error: Cell::new(None),
        }
    }

    /// Swapchain images handed out round-robin by `acquire_next_image`
    pub fn image_count(&self) -> u32 {
        self.image_count
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Every following fence wait returns `result`
    pub fn fail_fence_waits(&self, result: vk::Result) {
        self.fence_wait_error.set(Some(result));
    }

    pub fn fail_wait_idle(&self, result: vk::Result) {
        self.wait_idle_error.set(Some(result));
    }

    /// Every following image acquire returns `result`
    pub fn fail_acquire(&self, result: vk::Result) {
        self.acquire_error.set(Some(result));
    }

    /// Host-visible buffer with a fresh handle, not recorded as a call
    pub fn fake_buffer(&self, size: usize) -> MockBuffer {
        MockBuffer::host_visible(self.next_raw(), size)
    }

    pub fn handle<H: Handle>(&self) -> H {
        H::from_raw(self.next_raw())
    }

    fn next_raw(&self) -> u64 {
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        raw
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl Default for RecordingGpu {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for RecordingGpu {
    type Buffer = MockBuffer;
    type Image = u64;

    fn min_uniform_alignment(&self) -> u64 {
        self.min_alignment
    }

    fn create_command_pool(&self, _flags: vk::CommandPoolCreateFlags) -> VkResult<vk::CommandPool> {
        let pool = self.handle();
        self.record(Call::CreateCommandPool(pool));
        Ok(pool)
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        let cmd = self.handle();
        self.record(Call::AllocateCommandBuffer { pool, cmd });
        Ok(cmd)
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let fence = self.handle();
        self.record(Call::CreateFence { fence, signaled });
        Ok(fence)
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let semaphore = self.handle();
        self.record(Call::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    fn create_buffer(&self, desc: &BufferDesc) -> RenderResult<MockBuffer> {
        let raw = self.next_raw();
        let mut buffer = match desc.location {
            MemoryLocation::GpuOnly => MockBuffer::device_local(raw, desc.size as usize),
            _ => MockBuffer::host_visible(raw, desc.size as usize),
        };
        buffer.log = Some(Rc::clone(&self.calls));
        self.record(Call::CreateBuffer {
            name: desc.name.to_string(),
            buffer: buffer.handle,
            size: desc.size,
        });
        Ok(buffer)
    }

    fn allocate_descriptor_set(
        &self,
        _pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        let set = self.handle();
        self.record(Call::AllocateDescriptorSet { layout, set });
        Ok(set)
    }

    fn write_buffer_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        buffer: vk::Buffer,
        range: u64,
    ) {
        self.record(Call::WriteBufferDescriptor {
            set,
            binding,
            ty,
            buffer,
            range,
        });
    }

    fn write_image_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        _sampler: vk::Sampler,
        view: vk::ImageView,
    ) {
        self.record(Call::WriteImageDescriptor { set, binding, view });
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> VkResult<()> {
        self.record(Call::WaitForFence(fence));
        match self.fence_wait_error.get() {
            Some(result) => Err(result),
            None => Ok(()),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        self.record(Call::ResetFence(fence));
        Ok(())
    }

    fn wait_idle(&self) -> VkResult<()> {
        self.record(Call::WaitIdle);
        match self.wait_idle_error.get() {
            Some(result) => Err(result),
            None => Ok(()),
        }
    }

    fn acquire_next_image(
        &self,
        _swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        _timeout_ns: u64,
    ) -> VkResult<u32> {
        if let Some(result) = self.acquire_error.get() {
            self.record(Call::AcquireNextImage { semaphore, index: u32::MAX });
            return Err(result);
        }
        let index = self.next_image.get();
        self.next_image.set((index + 1) % self.image_count);
        self.record(Call::AcquireNextImage { semaphore, index });
        Ok(index)
    }

    fn queue_present(
        &self,
        _swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<()> {
        self.record(Call::Present { image_index, wait });
        Ok(())
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(Call::ResetCommandBuffer(cmd));
        Ok(())
    }

    fn reset_command_pool(&self, pool: vk::CommandPool) -> VkResult<()> {
        self.record(Call::ResetCommandPool(pool));
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(Call::BeginCommandBuffer(cmd));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.record(Call::EndCommandBuffer(cmd));
        Ok(())
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        self.record(Call::BeginRenderPass {
            cmd,
            framebuffer: begin.framebuffer,
            width: begin.extent.width,
            height: begin.extent.height,
            clear_color: begin.clear_color,
        });
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.record(Call::EndRenderPass(cmd));
    }

    fn cmd_bind_pipeline(&self, _cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(Call::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_set(
        &self,
        _cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    ) {
        self.record(Call::BindDescriptorSet {
            set_index,
            set,
            dynamic_offsets: dynamic_offsets.to_vec(),
        });
    }

    fn cmd_push_constants(&self, _cmd: vk::CommandBuffer, layout: vk::PipelineLayout, bytes: &[u8]) {
        self.record(Call::PushConstants {
            layout,
            bytes: bytes.to_vec(),
        });
    }

    fn cmd_bind_vertex_buffer(&self, _cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        self.record(Call::BindVertexBuffer(buffer));
    }

    fn cmd_draw(&self, _cmd: vk::CommandBuffer, vertex_count: u32, first_instance: u32) {
        self.record(Call::Draw {
            vertex_count,
            first_instance,
        });
    }

    fn cmd_copy_buffer(&self, _cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, size: u64) {
        self.record(Call::CopyBuffer { src, dst, size });
    }

    fn queue_submit(&self, submission: &Submission) -> VkResult<()> {
        self.record(Call::Submit {
            cmd: submission.command_buffer,
            wait: submission.wait,
            signal: submission.signal,
            fence: submission.fence,
        });
        Ok(())
    }

    fn dispose(&self, record: Disposal<MockBuffer, u64>) {
        let kind = record.kind();
        let raw = match record {
            Disposal::Buffer(buffer) => buffer.handle.as_raw(),
            Disposal::Image(image) => image,
            Disposal::ImageView(h) => h.as_raw(),
            Disposal::Sampler(h) => h.as_raw(),
            Disposal::Framebuffer(h) => h.as_raw(),
            Disposal::RenderPass(h) => h.as_raw(),
            Disposal::Pipeline(h) => h.as_raw(),
            Disposal::PipelineLayout(h) => h.as_raw(),
            Disposal::DescriptorSetLayout(h) => h.as_raw(),
            Disposal::DescriptorPool(h) => h.as_raw(),
            Disposal::CommandPool(h) => h.as_raw(),
            Disposal::Fence(h) => h.as_raw(),
            Disposal::Semaphore(h) => h.as_raw(),
            Disposal::Swapchain(h) => h.as_raw(),
        };
        self.record(Call::Dispose(kind, raw));
    }
}

/// Layout handles that only need to be distinct
pub fn fake_layouts(gpu: &RecordingGpu) -> DescriptorLayouts {
    DescriptorLayouts {
        pool: gpu.handle(),
        global: gpu.handle(),
        object: gpu.handle(),
        single_texture: gpu.handle(),
    }
}

/// Swapchain, render pass and one framebuffer per fake swapchain image
pub fn fake_target(gpu: &RecordingGpu, width: u32, height: u32) -> RenderTarget {
    RenderTarget {
        swapchain: gpu.handle(),
        render_pass: gpu.handle(),
        framebuffers: (0..gpu.image_count()).map(|_| gpu.handle()).collect(),
        extent: vk::Extent2D { width, height },
    }
}
