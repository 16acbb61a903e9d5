// Renderer core
//
// Backend-agnostic: everything here talks to the GPU through `GpuDevice`.

pub mod deletion;
pub mod frame;
pub mod material;
pub mod mesh;
pub mod registry;
pub mod renderer;
pub mod scene;
pub mod upload;

pub use renderer::{RenderTarget, Renderer, RendererSettings};
