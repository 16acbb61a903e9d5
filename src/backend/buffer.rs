// GPU memory: buffers and images backed by gpu-allocator
//
// CpuToGpu allocations stay persistently mapped for their whole life, so
// map/unmap only gate access; there is no vkMapMemory per write.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use parking_lot::Mutex;

use crate::error::{RenderError, RenderResult, VkCheck};
use crate::gpu::{BufferDesc, HostBuffer};

pub struct AllocatedBuffer {
    pub buffer: vk::Buffer,
    pub allocation: Allocation,
    size: u64,
    mapped: bool,
}

impl HostBuffer for AllocatedBuffer {
    fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn map(&mut self) -> RenderResult<()> {
        if self.allocation.mapped_ptr().is_none() {
            return Err(RenderError::NotHostVisible);
        }
        self.mapped = true;
        Ok(())
    }

    fn mapped_bytes(&mut self) -> Option<&mut [u8]> {
        if !self.mapped {
            return None;
        }
        self.allocation.mapped_slice_mut()
    }

    fn unmap(&mut self) {
        self.mapped = false;
    }
}

pub struct AllocatedImage {
    pub image: vk::Image,
    pub allocation: Allocation,
}

/// Round `size` up to the next multiple of `alignment`.
///
/// `alignment` is a device limit and always a power of two; 0 means no
/// requirement.
pub fn pad_uniform_buffer_size(size: u64, alignment: u64) -> u64 {
    if alignment > 0 {
        (size + alignment - 1) & !(alignment - 1)
    } else {
        size
    }
}

pub fn create_buffer(
    device: &ash::Device,
    allocator: &Mutex<Allocator>,
    desc: &BufferDesc,
) -> RenderResult<AllocatedBuffer> {
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(desc.size)
        .usage(desc.usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.create_buffer(&buffer_info, None) }.check("vkCreateBuffer")?;
    let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

    let allocation = allocate(allocator, desc.name, requirements, desc.location, true);
    let allocation = match allocation {
        Ok(allocation) => allocation,
        Err(e) => {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(e);
        }
    };

    let bound = unsafe { device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset()) }
        .check("vkBindBufferMemory");
    if let Err(e) = bound {
        destroy_buffer(
            device,
            allocator,
            AllocatedBuffer {
                buffer,
                allocation,
                size: desc.size,
                mapped: false,
            },
        );
        return Err(e);
    }

    Ok(AllocatedBuffer {
        buffer,
        allocation,
        size: desc.size,
        mapped: false,
    })
}

pub fn create_image(
    device: &ash::Device,
    allocator: &Mutex<Allocator>,
    name: &str,
    info: &vk::ImageCreateInfo,
) -> RenderResult<AllocatedImage> {
    let image = unsafe { device.create_image(info, None) }.check("vkCreateImage")?;
    let requirements = unsafe { device.get_image_memory_requirements(image) };

    let allocation = match allocate(allocator, name, requirements, MemoryLocation::GpuOnly, false) {
        Ok(allocation) => allocation,
        Err(e) => {
            unsafe { device.destroy_image(image, None) };
            return Err(e);
        }
    };

    let bound = unsafe { device.bind_image_memory(image, allocation.memory(), allocation.offset()) }
        .check("vkBindImageMemory");
    if let Err(e) = bound {
        destroy_image(device, allocator, AllocatedImage { image, allocation });
        return Err(e);
    }

    Ok(AllocatedImage { image, allocation })
}

fn allocate(
    allocator: &Mutex<Allocator>,
    name: &str,
    requirements: vk::MemoryRequirements,
    location: MemoryLocation,
    linear: bool,
) -> RenderResult<Allocation> {
    allocator
        .lock()
        .allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
        .map_err(|e| {
            log::error!("Allocation of '{}' failed: {}", name, e);
            RenderError::Allocation {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })
}

pub fn destroy_buffer(device: &ash::Device, allocator: &Mutex<Allocator>, buffer: AllocatedBuffer) {
    if let Err(e) = allocator.lock().free(buffer.allocation) {
        log::warn!("Failed to free buffer allocation: {}", e);
    }
    unsafe { device.destroy_buffer(buffer.buffer, None) };
}

pub fn destroy_image(device: &ash::Device, allocator: &Mutex<Allocator>, image: AllocatedImage) {
    if let Err(e) = allocator.lock().free(image.allocation) {
        log::warn!("Failed to free image allocation: {}", e);
    }
    unsafe { device.destroy_image(image.image, None) };
}

/// 2D, single mip, single layer, optimal tiling
pub fn image_create_info(
    format: vk::Format,
    usage: vk::ImageUsageFlags,
    extent: vk::Extent3D,
) -> vk::ImageCreateInfo {
    vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(extent)
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(usage)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .build()
}

pub fn create_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> RenderResult<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    unsafe { device.create_image_view(&info, None) }.check("vkCreateImageView")
}
