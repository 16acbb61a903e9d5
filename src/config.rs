// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section and field has a default, so a missing file or a file that
// only sets a few keys both work.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::render::renderer::RendererSettings;

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub assets: AssetsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Engine".to_string(),
            width: 1700,
            height: 900,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    /// Base clear color; the blue channel pulses over time
    pub clear_color: [f32; 4],
    /// Bound on waiting for a frame slot or a swapchain image
    pub frame_timeout_ns: u64,
    /// Bound on waiting for an immediate upload
    pub upload_timeout_ns: u64,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.0, 0.0, 1.0, 1.0],
            frame_timeout_ns: 1_000_000_000,
            upload_timeout_ns: 9_999_999_999,
        }
    }
}

/// Asset locations, relative to the working directory
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub shader_dir: PathBuf,
    pub mesh_path: PathBuf,
    pub texture_path: PathBuf,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            shader_dir: PathBuf::from("shaders"),
            mesh_path: PathBuf::from("assets/lost_empire.obj"),
            texture_path: PathBuf::from("assets/lost_empire-RGBA.png"),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    /// Only honored in debug builds
    pub validation_layers: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
        }
    }
}

impl Config {
    /// Load configuration from file, falling back to defaults if not found
    pub fn load() -> Self {
        Self::load_from_path("config.toml").unwrap_or_else(|e| {
            log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
            Config::default()
        })
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        log::info!("Loaded configuration from {:?}", path);
        log::debug!("Config: {:?}", config);

        Ok(config)
    }

    /// Get present mode as Vulkan enum
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        match self.graphics.present_mode.to_lowercase().as_str() {
            "immediate" => vk::PresentModeKHR::IMMEDIATE,
            "mailbox" => vk::PresentModeKHR::MAILBOX,
            "fifo" => vk::PresentModeKHR::FIFO,
            "fifo_relaxed" => vk::PresentModeKHR::FIFO_RELAXED,
            _ => {
                log::warn!(
                    "Unknown present mode '{}', defaulting to FIFO",
                    self.graphics.present_mode
                );
                vk::PresentModeKHR::FIFO
            }
        }
    }

    /// Validation layers are a debug-build feature
    pub fn validation_enabled(&self) -> bool {
        cfg!(debug_assertions) && self.debug.validation_layers
    }

    pub fn renderer_settings(&self) -> RendererSettings {
        RendererSettings {
            clear_color: self.graphics.clear_color,
            frame_timeout_ns: self.graphics.frame_timeout_ns,
            upload_timeout_ns: self.graphics.upload_timeout_ns,
        }
    }
}
