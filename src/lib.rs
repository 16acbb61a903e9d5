// Vulkan engine library
//
// backend  - ash wrappers: device, swapchain, pipelines, buffers, textures
// render   - renderer core: frame ring, deletion queue, registries, draw loop
// engine   - composition root tying both to a window
//
// Everything in `render` is written against the `gpu::GpuDevice` seam so it
// can be exercised without a GPU.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod render;

#[cfg(test)]
pub(crate) mod testing;
