// Shader module loading
//
// Shaders are SPIR-V blobs compiled by build.rs. A broken or missing file is
// not fatal: the loader logs it and the material that needed it is skipped.

use ash::vk;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShaderError {
    #[error("cannot read shader {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("shader {path} is empty")]
    Empty { path: PathBuf },

    /// SPIR-V is a stream of 32-bit words
    #[error("shader {path} is {len} bytes, not a whole number of words")]
    Misaligned { path: PathBuf, len: usize },

    #[error("vkCreateShaderModule failed for {path}: {result:?}")]
    Vulkan { path: PathBuf, result: vk::Result },
}

/// Read a SPIR-V file into words
pub fn read_spirv(path: &Path) -> Result<Vec<u32>, ShaderError> {
    let bytes = std::fs::read(path).map_err(|source| ShaderError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    if bytes.is_empty() {
        return Err(ShaderError::Empty {
            path: path.to_path_buf(),
        });
    }
    if bytes.len() % 4 != 0 {
        return Err(ShaderError::Misaligned {
            path: path.to_path_buf(),
            len: bytes.len(),
        });
    }

    ash::util::read_spv(&mut Cursor::new(&bytes)).map_err(|source| ShaderError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn create_shader_module(device: &ash::Device, path: &Path) -> Result<vk::ShaderModule, ShaderError> {
    let code = read_spirv(path)?;
    let create_info = vk::ShaderModuleCreateInfo::builder().code(&code);

    unsafe { device.create_shader_module(&create_info, None) }.map_err(|result| ShaderError::Vulkan {
        path: path.to_path_buf(),
        result,
    })
}

/// Load a shader module, logging instead of failing
pub fn load_shader_module(device: &ash::Device, path: &Path) -> Option<vk::ShaderModule> {
    match create_shader_module(device, path) {
        Ok(module) => {
            log::info!("Loaded shader {}", path.display());
            Some(module)
        }
        Err(e) => {
            log::error!("Error when building shader module: {}", e);
            None
        }
    }
}
