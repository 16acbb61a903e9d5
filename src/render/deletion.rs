// Deferred destruction
//
// Every GPU object is registered here when it is created instead of being
// destroyed by its owner. On shutdown the queue waits for the device to go
// idle and destroys everything in reverse order of registration, so a parent
// (descriptor pool, render pass, swapchain) always outlives its children.

use ash::vk;

use crate::error::{RenderResult, VkCheck};
use crate::gpu::GpuDevice;

/// A resource waiting for destruction, tagged with its kind.
///
/// Buffers and images carry their allocation, everything else is a bare handle.
#[derive(Debug)]
pub enum Disposal<B, I> {
    Buffer(B),
    Image(I),
    ImageView(vk::ImageView),
    Sampler(vk::Sampler),
    Framebuffer(vk::Framebuffer),
    RenderPass(vk::RenderPass),
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    DescriptorSetLayout(vk::DescriptorSetLayout),
    DescriptorPool(vk::DescriptorPool),
    CommandPool(vk::CommandPool),
    Fence(vk::Fence),
    Semaphore(vk::Semaphore),
    Swapchain(vk::SwapchainKHR),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Buffer,
    Image,
    ImageView,
    Sampler,
    Framebuffer,
    RenderPass,
    Pipeline,
    PipelineLayout,
    DescriptorSetLayout,
    DescriptorPool,
    CommandPool,
    Fence,
    Semaphore,
    Swapchain,
}

impl<B, I> Disposal<B, I> {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Disposal::Buffer(_) => ResourceKind::Buffer,
            Disposal::Image(_) => ResourceKind::Image,
            Disposal::ImageView(_) => ResourceKind::ImageView,
            Disposal::Sampler(_) => ResourceKind::Sampler,
            Disposal::Framebuffer(_) => ResourceKind::Framebuffer,
            Disposal::RenderPass(_) => ResourceKind::RenderPass,
            Disposal::Pipeline(_) => ResourceKind::Pipeline,
            Disposal::PipelineLayout(_) => ResourceKind::PipelineLayout,
            Disposal::DescriptorSetLayout(_) => ResourceKind::DescriptorSetLayout,
            Disposal::DescriptorPool(_) => ResourceKind::DescriptorPool,
            Disposal::CommandPool(_) => ResourceKind::CommandPool,
            Disposal::Fence(_) => ResourceKind::Fence,
            Disposal::Semaphore(_) => ResourceKind::Semaphore,
            Disposal::Swapchain(_) => ResourceKind::Swapchain,
        }
    }
}

/// LIFO stack of pending disposals
pub struct DeletionQueue<G: GpuDevice> {
    records: Vec<Disposal<G::Buffer, G::Image>>,
}

impl<G: GpuDevice> DeletionQueue<G> {
    pub fn new() -> Self {
        Self { records: Vec::new() }
    }

    pub fn register(&mut self, record: Disposal<G::Buffer, G::Image>) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Kinds in registration order
    pub fn kinds(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.records.iter().map(Disposal::kind)
    }

    /// Wait for the device to go idle, then destroy everything, newest first.
    pub fn flush(&mut self, gpu: &G) -> RenderResult<()> {
        if self.records.is_empty() {
            return Ok(());
        }

        gpu.wait_idle().check("vkDeviceWaitIdle")?;

        log::debug!("Flushing {} deferred disposals", self.records.len());
        while let Some(record) = self.records.pop() {
            gpu.dispose(record);
        }
        Ok(())
    }

    /// Run one fallible setup step against this queue. If it fails, whatever
    /// the queue holds is flushed before the error is handed back, so nothing
    /// outlives a half-built setup.
    pub fn build_or_flush<T, E, F>(&mut self, gpu: &G, build: F) -> Result<T, E>
    where
        F: FnOnce(&mut Self) -> Result<T, E>,
    {
        let result = build(self);
        if result.is_err() {
            log::warn!("Setup failed, releasing {} resources", self.records.len());
            if let Err(e) = self.flush(gpu) {
                log::error!("Release after failed setup: {}", e);
            }
        }
        result
    }
}

impl<G: GpuDevice> Default for DeletionQueue<G> {
    fn default() -> Self {
        Self::new()
    }
}
