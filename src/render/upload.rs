// Immediate submit
//
// One-off transfers (vertex data, textures) are recorded into a dedicated
// command buffer, submitted, and waited on before returning. The fence starts
// unsignaled: it is only ever waited on right after a submit.

use ash::vk;

use super::deletion::{DeletionQueue, Disposal};
use crate::error::{RenderResult, VkCheck};
use crate::gpu::{GpuDevice, Submission};

pub struct UploadContext {
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    fence: vk::Fence,
    timeout_ns: u64,
}

impl UploadContext {
    pub fn new<G: GpuDevice>(
        gpu: &G,
        deletion_queue: &mut DeletionQueue<G>,
        timeout_ns: u64,
    ) -> RenderResult<Self> {
        let command_pool = gpu
            .create_command_pool(vk::CommandPoolCreateFlags::empty())
            .check("vkCreateCommandPool")?;
        deletion_queue.register(Disposal::CommandPool(command_pool));
        let command_buffer = gpu
            .allocate_command_buffer(command_pool)
            .check("vkAllocateCommandBuffers")?;

        let fence = gpu.create_fence(false).check("vkCreateFence")?;
        deletion_queue.register(Disposal::Fence(fence));

        Ok(Self {
            command_pool,
            command_buffer,
            fence,
            timeout_ns,
        })
    }

    /// Record with `record`, submit and block until the GPU is done.
    ///
    /// On return the commands have executed and the pool is reset for the
    /// next call. A wait timeout is fatal.
    pub fn immediate_submit<G, F>(&self, gpu: &G, record: F) -> RenderResult<()>
    where
        G: GpuDevice,
        F: FnOnce(vk::CommandBuffer),
    {
        let cmd = self.command_buffer;
        gpu.begin_command_buffer(cmd).check("vkBeginCommandBuffer")?;
        record(cmd);
        gpu.end_command_buffer(cmd).check("vkEndCommandBuffer")?;

        gpu.queue_submit(&Submission {
            command_buffer: cmd,
            wait: None,
            signal: None,
            fence: self.fence,
        })
        .check("vkQueueSubmit")?;

        gpu.wait_for_fence(self.fence, self.timeout_ns)
            .check("vkWaitForFences")?;
        gpu.reset_fence(self.fence).check("vkResetFences")?;
        gpu.reset_command_pool(self.command_pool)
            .check("vkResetCommandPool")?;
        Ok(())
    }
}
