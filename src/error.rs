// Error types
//
// Two tiers:
// - RenderError: a GPU call failed. Never recovered from, propagated to the
//   event loop which logs it and exits.
// - ShaderError (backend::shader) and anyhow contexts for asset loading:
//   logged, the caller decides whether to go on without the asset.

use ash::prelude::VkResult;
use ash::vk;
use std::panic::Location;
use thiserror::Error;

/// Fatal GPU-side failure
#[derive(Debug, Error)]
pub enum RenderError {
    /// A Vulkan call returned a non-success result
    #[error("{call} failed with {result:?} at {location}")]
    Vulkan {
        call: &'static str,
        result: vk::Result,
        location: &'static Location<'static>,
    },

    /// A bounded wait expired: the GPU hung or the device was lost
    #[error("{call} timed out at {location}")]
    Timeout {
        call: &'static str,
        location: &'static Location<'static>,
    },

    /// GPU memory allocation failed
    #[error("allocation of '{name}' failed: {reason}")]
    Allocation { name: String, reason: String },

    /// A mapped write would land outside the buffer
    #[error("write of {len} bytes at offset {offset} overflows buffer of {size} bytes")]
    MappingOutOfBounds { offset: u64, len: u64, size: u64 },

    /// Tried to map memory that is not host visible
    #[error("buffer is not host visible")]
    NotHostVisible,

    /// The scene holds more objects than the per-frame object buffer
    #[error("scene holds {count} objects, object buffer fits {capacity}")]
    ObjectCapacity { count: usize, capacity: usize },

    /// A render object refers to a mesh or material that is not registered
    #[error("unknown {kind} id {id}")]
    UnknownResource { kind: &'static str, id: u32 },
}

pub type RenderResult<T> = Result<T, RenderError>;

/// Converts raw Vulkan results into `RenderError`, remembering where the call was made.
pub trait VkCheck<T> {
    fn check(self, call: &'static str) -> RenderResult<T>;
}

impl<T> VkCheck<T> for VkResult<T> {
    #[track_caller]
    fn check(self, call: &'static str) -> RenderResult<T> {
        let location = Location::caller();
        self.map_err(|result| {
            log::error!("Detected Vulkan error in {}: {:?} ({})", call, result, location);
            if result == vk::Result::TIMEOUT {
                RenderError::Timeout { call, location }
            } else {
                RenderError::Vulkan { call, result, location }
            }
        })
    }
}

impl RenderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RenderError::Timeout { .. })
    }
}
