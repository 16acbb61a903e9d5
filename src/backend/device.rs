// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with window-system extensions and validation layers
// - Presentation surface
// - Physical device selection (prefer discrete GPU)
// - Logical device + graphics queue
// - Memory allocator
//
// VulkanDevice is the only implementor of GpuDevice that talks to a driver.

use anyhow::{Context, Result};
use ash::extensions::{ext::DebugUtils, khr};
use ash::prelude::VkResult;
use ash::{vk, Entry};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;

use super::buffer::{self, AllocatedBuffer, AllocatedImage};
use crate::error::RenderResult;
use crate::gpu::{BufferDesc, GpuDevice, RenderPassBegin, Submission};
use crate::render::deletion::Disposal;

const MIN_API_VERSION: u32 = vk::API_VERSION_1_1;

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    _entry: Entry,
    pub instance: ash::Instance,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,

    pub surface_loader: khr::Surface,
    pub surface: vk::SurfaceKHR,

    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,

    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub swapchain_loader: khr::Swapchain,

    // Must go before the device
    allocator: ManuallyDrop<Mutex<Allocator>>,
}

impl VulkanDevice {
    /// Create the device for a window
    ///
    /// # Arguments
    /// * `app_name` - Application name for debugging
    /// * `display`, `window` - Native handles of the window to present to
    /// * `enable_validation` - Enable Vulkan validation layers (debug only)
    pub fn new(
        app_name: &str,
        display: RawDisplayHandle,
        window: RawWindowHandle,
        enable_validation: bool,
    ) -> Result<Self> {
        log::info!("Creating Vulkan device: {}", app_name);

        let entry = unsafe { Entry::load() }
            .context("Failed to load Vulkan library. Is Vulkan installed?")?;

        let instance = Self::create_instance(&entry, app_name, display, enable_validation)?;

        let debug_utils = if enable_validation {
            Some(Self::setup_debug_messenger(&entry, &instance)?)
        } else {
            None
        };

        let surface_loader = khr::Surface::new(&entry, &instance);
        let surface = unsafe { ash_window::create_surface(&entry, &instance, display, window, None) }
            .context("Failed to create window surface")?;

        let (physical_device, graphics_queue_family) =
            Self::pick_physical_device(&instance, &surface_loader, surface)?;

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::info!(
            "The GPU has a minimum buffer alignment of {}",
            properties.limits.min_uniform_buffer_offset_alignment
        );

        let (device, graphics_queue) =
            Self::create_logical_device(&instance, physical_device, graphics_queue_family)?;
        let swapchain_loader = khr::Swapchain::new(&instance, &device);

        let allocator = Self::create_allocator(&instance, physical_device, &device)?;

        Ok(Self {
            _entry: entry,
            instance,
            debug_utils,
            surface_loader,
            surface,
            physical_device,
            properties,
            device,
            graphics_queue,
            graphics_queue_family,
            swapchain_loader,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
        })
    }

    fn create_instance(
        entry: &Entry,
        app_name: &str,
        display: RawDisplayHandle,
        enable_validation: bool,
    ) -> Result<ash::Instance> {
        let app_name_cstr = CString::new(app_name)?;
        let engine_name = CString::new("vk-engine")?;

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(MIN_API_VERSION);

        // Surface extensions for whatever platform the window lives on
        let mut extensions = ash_window::enumerate_required_extensions(display)
            .context("Window system is not supported by Vulkan")?
            .to_vec();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = if enable_validation {
            vec![c"VK_LAYER_KHRONOS_validation".as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None) }
            .context("Failed to create Vulkan instance")?;

        Ok(instance)
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .context("Failed to create debug messenger")?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, u32)> {
        let devices = unsafe { instance.enumerate_physical_devices() }?;

        if devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        let mut best_device = None;
        let mut best_score = 0;

        for device in devices {
            let props = unsafe { instance.get_physical_device_properties(device) };
            let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();

            if props.api_version < MIN_API_VERSION {
                log::debug!("Skipping {}: Vulkan 1.1 not supported", name);
                continue;
            }
            if !Self::supports_swapchain(instance, device) {
                log::debug!("Skipping {}: no swapchain extension", name);
                continue;
            }
            if !Self::supports_draw_parameters(instance, device) {
                log::debug!("Skipping {}: no shaderDrawParameters", name);
                continue;
            }

            let Some(graphics_family) =
                Self::find_present_queue_family(instance, surface_loader, surface, device)
            else {
                log::debug!("Skipping {}: no graphics queue that can present", name);
                continue;
            };

            // Prefer discrete GPU
            let score = match props.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
                _ => 1,
            };

            if score > best_score {
                best_score = score;
                best_device = Some((device, graphics_family));
            }
        }

        best_device.ok_or_else(|| anyhow::anyhow!("No suitable GPU found"))
    }

    fn supports_swapchain(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
        let Ok(extensions) = (unsafe { instance.enumerate_device_extension_properties(device) }) else {
            return false;
        };
        extensions.iter().any(|ext| {
            let name = unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) };
            name == khr::Swapchain::name()
        })
    }

    fn supports_draw_parameters(instance: &ash::Instance, device: vk::PhysicalDevice) -> bool {
        let mut draw_parameters = vk::PhysicalDeviceShaderDrawParametersFeatures::default();
        let mut features = vk::PhysicalDeviceFeatures2::builder().push_next(&mut draw_parameters);
        unsafe { instance.get_physical_device_features2(device, &mut features) };
        draw_parameters.shader_draw_parameters == vk::TRUE
    }

    fn find_present_queue_family(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        surface: vk::SurfaceKHR,
        device: vk::PhysicalDevice,
    ) -> Option<u32> {
        let queue_families =
            unsafe { instance.get_physical_device_queue_family_properties(device) };

        queue_families
            .iter()
            .enumerate()
            .filter(|(_, props)| props.queue_flags.contains(vk::QueueFlags::GRAPHICS))
            .map(|(i, _)| i as u32)
            .find(|&i| {
                unsafe { surface_loader.get_physical_device_surface_support(device, i, surface) }
                    .unwrap_or(false)
            })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: u32,
    ) -> Result<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(graphics_queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let extensions = [khr::Swapchain::name().as_ptr()];

        // gl_BaseInstance in mesh.vert
        let mut draw_parameters =
            vk::PhysicalDeviceShaderDrawParametersFeatures::builder().shader_draw_parameters(true);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions)
            .push_next(&mut draw_parameters);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Failed to create logical device")?;

        let graphics_queue = unsafe { device.get_device_queue(graphics_queue_family, 0) };

        Ok((device, graphics_queue))
    }

    fn create_allocator(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        device: &ash::Device,
    ) -> Result<Allocator> {
        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .context("Failed to create GPU memory allocator")?;

        Ok(allocator)
    }

    pub fn allocator(&self) -> &Mutex<Allocator> {
        &self.allocator
    }
}

impl GpuDevice for VulkanDevice {
    type Buffer = AllocatedBuffer;
    type Image = AllocatedImage;

    fn min_uniform_alignment(&self) -> u64 {
        self.properties.limits.min_uniform_buffer_offset_alignment
    }

    fn create_command_pool(&self, flags: vk::CommandPoolCreateFlags) -> VkResult<vk::CommandPool> {
        let info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(self.graphics_queue_family)
            .flags(flags);
        unsafe { self.device.create_command_pool(&info, None) }
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VkResult<vk::CommandBuffer> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.device.allocate_command_buffers(&info) }?;
        buffers
            .into_iter()
            .next()
            .ok_or(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device.create_fence(&info, None) }
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::builder();
        unsafe { self.device.create_semaphore(&info, None) }
    }

    fn create_buffer(&self, desc: &BufferDesc) -> RenderResult<AllocatedBuffer> {
        buffer::create_buffer(&self.device, &self.allocator, desc)
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VkResult<vk::DescriptorSet> {
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe { self.device.allocate_descriptor_sets(&info) }?;
        sets.into_iter()
            .next()
            .ok_or(vk::Result::ERROR_OUT_OF_POOL_MEMORY)
    }

    fn write_buffer_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        ty: vk::DescriptorType,
        buffer: vk::Buffer,
        range: u64,
    ) {
        let buffer_info = [vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(ty)
            .buffer_info(&buffer_info)
            .build();
        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
    }

    fn write_image_descriptor(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        sampler: vk::Sampler,
        view: vk::ImageView,
    ) {
        let image_info = [vk::DescriptorImageInfo {
            sampler,
            image_view: view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }];
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(set)
            .dst_binding(binding)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_info)
            .build();
        unsafe { self.device.update_descriptor_sets(&[write], &[]) };
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        unsafe { self.device.reset_fences(&[fence]) }
    }

    fn wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> VkResult<u32> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, semaphore, vk::Fence::null())
        }?;
        if suboptimal {
            log::debug!("Swapchain is suboptimal for the surface");
        }
        Ok(index)
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<()> {
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.swapchain_loader
                .queue_present(self.graphics_queue, &present_info)
        }
        .map(|_suboptimal| ())
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
        }
    }

    fn reset_command_pool(&self, pool: vk::CommandPool) -> VkResult<()> {
        unsafe {
            self.device
                .reset_command_pool(pool, vk::CommandPoolResetFlags::empty())
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(cmd, &info) }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(cmd) }
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, begin: &RenderPassBegin) {
        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: begin.clear_color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: begin.clear_depth,
                    stencil: 0,
                },
            },
        ];
        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: begin.extent,
            })
            .clear_values(&clear_values);
        unsafe {
            self.device
                .cmd_begin_render_pass(cmd, &info, vk::SubpassContents::INLINE)
        };
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cmd) };
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set_index: u32,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                set_index,
                &[set],
                dynamic_offsets,
            )
        };
    }

    fn cmd_push_constants(&self, cmd: vk::CommandBuffer, layout: vk::PipelineLayout, bytes: &[u8]) {
        unsafe {
            self.device
                .cmd_push_constants(cmd, layout, vk::ShaderStageFlags::VERTEX, 0, bytes)
        };
    }

    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe { self.device.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0]) };
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, first_instance: u32) {
        unsafe { self.device.cmd_draw(cmd, vertex_count, 1, 0, first_instance) };
    }

    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, size: u64) {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe { self.device.cmd_copy_buffer(cmd, src, dst, &[region]) };
    }

    fn queue_submit(&self, submission: &Submission) -> VkResult<()> {
        let command_buffers = [submission.command_buffer];
        let (wait_semaphores, wait_stages): (Vec<_>, Vec<_>) =
            submission.wait.into_iter().unzip();
        let signal_semaphores: Vec<_> = submission.signal.into_iter().collect();

        let submit = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device
                .queue_submit(self.graphics_queue, &[submit], submission.fence)
        }
    }

    fn dispose(&self, record: Disposal<AllocatedBuffer, AllocatedImage>) {
        let device = &self.device;
        unsafe {
            match record {
                Disposal::Buffer(b) => buffer::destroy_buffer(device, &self.allocator, b),
                Disposal::Image(i) => buffer::destroy_image(device, &self.allocator, i),
                Disposal::ImageView(h) => device.destroy_image_view(h, None),
                Disposal::Sampler(h) => device.destroy_sampler(h, None),
                Disposal::Framebuffer(h) => device.destroy_framebuffer(h, None),
                Disposal::RenderPass(h) => device.destroy_render_pass(h, None),
                Disposal::Pipeline(h) => device.destroy_pipeline(h, None),
                Disposal::PipelineLayout(h) => device.destroy_pipeline_layout(h, None),
                Disposal::DescriptorSetLayout(h) => device.destroy_descriptor_set_layout(h, None),
                Disposal::DescriptorPool(h) => device.destroy_descriptor_pool(h, None),
                Disposal::CommandPool(h) => device.destroy_command_pool(h, None),
                Disposal::Fence(h) => device.destroy_fence(h, None),
                Disposal::Semaphore(h) => device.destroy_semaphore(h, None),
                Disposal::Swapchain(h) => self.swapchain_loader.destroy_swapchain(h, None),
            }
        }
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        if let Err(e) = self.wait_idle() {
            log::error!("vkDeviceWaitIdle failed during teardown: {:?}", e);
        }

        unsafe {
            // Allocator frees its memory blocks through the device
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan {:?}] {}", message_type, message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan {:?}] {}", message_type, message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => {
            log::debug!("[Vulkan {:?}] {}", message_type, message.to_string_lossy());
        }
        _ => {
            log::trace!("[Vulkan {:?}] {}", message_type, message.to_string_lossy());
        }
    }

    vk::FALSE
}
