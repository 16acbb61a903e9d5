// Swapchain - Window presentation
//
// The chain of images we render to and present, plus the depth buffer and
// one framebuffer per image. Built once at startup for the window size;
// every handle goes to the deletion queue as soon as it exists.

use ash::vk;

use super::buffer;
use super::device::VulkanDevice;
use crate::error::{RenderResult, VkCheck};
use crate::render::deletion::{DeletionQueue, Disposal};

pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

pub struct PresentationChain {
    pub swapchain: vk::SwapchainKHR,
    pub image_format: vk::Format,
    pub image_views: Vec<vk::ImageView>,
    pub depth_view: vk::ImageView,
    pub extent: vk::Extent2D,
}

impl PresentationChain {
    pub fn new(
        device: &VulkanDevice,
        width: u32,
        height: u32,
        wanted_mode: vk::PresentModeKHR,
        deletion_queue: &mut DeletionQueue<VulkanDevice>,
    ) -> RenderResult<Self> {
        log::info!("Creating swapchain: {}x{}", width, height);

        let surface_loader = &device.surface_loader;
        let surface_caps = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(device.physical_device, device.surface)
        }
        .check("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?;
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(device.physical_device, device.surface)
        }
        .check("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device.physical_device, device.surface)
        }
        .check("vkGetPhysicalDeviceSurfacePresentModesKHR")?;

        let surface_format = choose_surface_format(&formats)
            .ok_or(vk::Result::ERROR_FORMAT_NOT_SUPPORTED)
            .check("vkGetPhysicalDeviceSurfaceFormatsKHR")?;
        let present_mode = choose_present_mode(&present_modes, wanted_mode);
        let extent = choose_extent(&surface_caps, width, height);
        log::info!("Present mode: {:?}", present_mode);

        let mut image_count = surface_caps.min_image_count + 1;
        if surface_caps.max_image_count > 0 && image_count > surface_caps.max_image_count {
            image_count = surface_caps.max_image_count;
        }

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(device.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { device.swapchain_loader.create_swapchain(&create_info, None) }
            .check("vkCreateSwapchainKHR")?;
        deletion_queue.register(Disposal::Swapchain(swapchain));

        let images = unsafe { device.swapchain_loader.get_swapchain_images(swapchain) }
            .check("vkGetSwapchainImagesKHR")?;
        log::info!("Created swapchain with {} images", images.len());

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view = buffer::create_image_view(
                &device.device,
                image,
                surface_format.format,
                vk::ImageAspectFlags::COLOR,
            )?;
            deletion_queue.register(Disposal::ImageView(view));
            image_views.push(view);
        }

        let depth_view = Self::create_depth_buffer(device, extent, deletion_queue)?;

        Ok(Self {
            swapchain,
            image_format: surface_format.format,
            image_views,
            depth_view,
            extent,
        })
    }

    fn create_depth_buffer(
        device: &VulkanDevice,
        extent: vk::Extent2D,
        deletion_queue: &mut DeletionQueue<VulkanDevice>,
    ) -> RenderResult<vk::ImageView> {
        let info = buffer::image_create_info(
            DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        );
        let depth = buffer::create_image(&device.device, device.allocator(), "depth", &info)?;
        let image = depth.image;
        deletion_queue.register(Disposal::Image(depth));

        let view = buffer::create_image_view(&device.device, image, DEPTH_FORMAT, vk::ImageAspectFlags::DEPTH)?;
        deletion_queue.register(Disposal::ImageView(view));
        Ok(view)
    }

    /// One framebuffer per swapchain image: color view i + the shared depth view
    pub fn create_framebuffers(
        &self,
        device: &VulkanDevice,
        render_pass: vk::RenderPass,
        deletion_queue: &mut DeletionQueue<VulkanDevice>,
    ) -> RenderResult<Vec<vk::Framebuffer>> {
        let mut framebuffers = Vec::with_capacity(self.image_views.len());
        for &view in &self.image_views {
            let attachments = [view, self.depth_view];
            let info = vk::FramebufferCreateInfo::builder()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(self.extent.width)
                .height(self.extent.height)
                .layers(1);

            let framebuffer = unsafe { device.device.create_framebuffer(&info, None) }
                .check("vkCreateFramebuffer")?;
            deletion_queue.register(Disposal::Framebuffer(framebuffer));
            framebuffers.push(framebuffer);
        }
        Ok(framebuffers)
    }
}

/// Prefer 8-bit BGRA sRGB, otherwise whatever the surface lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// The configured mode if the surface supports it, FIFO (always available) otherwise
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    wanted: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&wanted) {
        wanted
    } else {
        log::warn!("Present mode {:?} not supported, using FIFO", wanted);
        vk::PresentModeKHR::FIFO
    }
}

/// Surface-dictated extent, or the window size clamped to the surface limits
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    vk::Extent2D {
        width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    }
}
