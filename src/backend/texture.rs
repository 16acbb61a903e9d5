// Textures
//
// Decode on the CPU with `image`, copy through a staging buffer into a
// device-local sRGB image using the upload channel, then sample it with a
// nearest-filter sampler.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::MemoryLocation;
use image::RgbaImage;
use std::path::Path;

use super::buffer::{self, AllocatedBuffer};
use super::device::VulkanDevice;
use crate::error::{RenderResult, VkCheck};
use crate::gpu::{BufferDesc, BufferMapping, GpuDevice};
use crate::render::deletion::{DeletionQueue, Disposal};
use crate::render::renderer::Renderer;

pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// A sampled image, seen through its view. Image and view are owned by the
/// deletion queue.
#[derive(Debug, Clone, Copy)]
pub struct Texture {
    pub view: vk::ImageView,
}

/// Decode any format `image` understands into RGBA8
pub fn decode_rgba(path: &Path) -> Result<RgbaImage> {
    let decoded = image::open(path)
        .with_context(|| format!("Failed to load texture file {}", path.display()))?;
    Ok(decoded.to_rgba8())
}

pub fn upload_texture(
    renderer: &mut Renderer<VulkanDevice>,
    name: &str,
    pixels: &RgbaImage,
) -> RenderResult<Texture> {
    let (width, height) = pixels.dimensions();
    let bytes = pixels.as_raw();
    let extent = vk::Extent3D {
        width,
        height,
        depth: 1,
    };

    let (gpu, upload, deletion_queue) = renderer.upload_parts();

    let mut staging = gpu.create_buffer(&BufferDesc {
        name: "texture staging",
        size: bytes.len() as u64,
        usage: vk::BufferUsageFlags::TRANSFER_SRC,
        location: MemoryLocation::CpuToGpu,
    })?;
    BufferMapping::new(&mut staging)?.write_bytes(0, bytes)?;

    let info = buffer::image_create_info(
        TEXTURE_FORMAT,
        vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        extent,
    );
    let allocated = buffer::create_image(&gpu.device, gpu.allocator(), name, &info)?;
    let image = allocated.image;
    deletion_queue.register(Disposal::Image(allocated));

    let copied = upload.immediate_submit(gpu, |cmd| {
        record_image_copy(&gpu.device, cmd, &staging, image, extent)
    });
    match copied {
        Ok(()) => gpu.dispose(Disposal::Buffer(staging)),
        // The copy may still be in flight; free staging after the idle wait
        Err(e) => {
            deletion_queue.register(Disposal::Buffer(staging));
            return Err(e);
        }
    }

    let view = buffer::create_image_view(&gpu.device, image, TEXTURE_FORMAT, vk::ImageAspectFlags::COLOR)?;
    deletion_queue.register(Disposal::ImageView(view));

    log::info!("Texture '{}' loaded successfully ({}x{})", name, width, height);
    Ok(Texture { view })
}

/// UNDEFINED -> TRANSFER_DST, copy, TRANSFER_DST -> SHADER_READ_ONLY
fn record_image_copy(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    staging: &AllocatedBuffer,
    image: vk::Image,
    extent: vk::Extent3D,
) {
    let range = vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    };

    let to_transfer = vk::ImageMemoryBarrier::builder()
        .old_layout(vk::ImageLayout::UNDEFINED)
        .new_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .image(image)
        .subresource_range(range)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .build();

    let copy = vk::BufferImageCopy {
        buffer_offset: 0,
        buffer_row_length: 0,
        buffer_image_height: 0,
        image_subresource: vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: 1,
        },
        image_offset: vk::Offset3D::default(),
        image_extent: extent,
    };

    let to_readable = vk::ImageMemoryBarrier::builder()
        .old_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        .new_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        .image(image)
        .subresource_range(range)
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::SHADER_READ)
        .build();

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_transfer],
        );
        device.cmd_copy_buffer_to_image(
            cmd,
            staging.buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[copy],
        );
        device.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[to_readable],
        );
    }
}

/// Nearest filtering, repeat addressing: blocky texels
pub fn create_nearest_sampler(
    device: &ash::Device,
    deletion_queue: &mut DeletionQueue<VulkanDevice>,
) -> RenderResult<vk::Sampler> {
    let info = vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::NEAREST)
        .min_filter(vk::Filter::NEAREST)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT);

    let sampler = unsafe { device.create_sampler(&info, None) }.check("vkCreateSampler")?;
    deletion_queue.register(Disposal::Sampler(sampler));
    Ok(sampler)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_png_to_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.png");
        let mut source = RgbaImage::new(4, 2);
        source.put_pixel(1, 0, image::Rgba([255, 0, 0, 255]));
        source.save(&path).unwrap();

        let decoded = decode_rgba(&path).unwrap();

        assert_eq!(decoded.dimensions(), (4, 2));
        assert_eq!(decoded.as_raw().len(), 4 * 2 * 4);
        assert_eq!(decoded.get_pixel(1, 0), &image::Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn missing_texture_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = decode_rgba(&dir.path().join("lost_empire-RGBA.png")).unwrap_err();
        assert!(err.to_string().contains("lost_empire-RGBA.png"));
    }
}
