// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// Every section and field has a default, so a partial file (or none at all)
// is fine. Broken files are reported and replaced by defaults in main.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;

use crate::frame::{SwapchainPreferences, DEFAULT_FRAMES_IN_FLIGHT};

pub const CONFIG_PATH: &str = "config.toml";

/// Overrides `debug.validation_layers` when set
pub const VALIDATION_ENV: &str = "TRIANGLE_VALIDATION";

/// Root configuration structure
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub debug: DebugConfig,
}

/// Window settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub fullscreen: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Vulkan Triangle".to_string(),
            width: 800,
            height: 600,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
    pub shader_dir: PathBuf,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "mailbox".to_string(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            max_frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            shader_dir: PathBuf::from("shaders"),
        }
    }
}

/// Debug settings
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: PathBuf,
    pub show_fps: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: cfg!(debug_assertions),
            log_to_file: false,
            log_file: PathBuf::from("triangle.log"),
            show_fps: true,
        }
    }
}

impl Config {
    /// Load configuration from a specific path. A missing file is not an
    /// error, a malformed one is.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
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

    pub fn swapchain_preferences(&self) -> SwapchainPreferences {
        SwapchainPreferences {
            present_mode: self.present_mode(),
            ..SwapchainPreferences::default()
        }
    }

    /// Frames in flight, never less than one
    pub fn frames_in_flight(&self) -> usize {
        if self.graphics.max_frames_in_flight == 0 {
            log::warn!("max_frames_in_flight = 0 is not usable, using 1");
            return 1;
        }
        self.graphics.max_frames_in_flight
    }

    /// Validation setting after applying the environment override
    pub fn validation_enabled(&self) -> bool {
        resolve_validation(
            self.debug.validation_layers,
            std::env::var(VALIDATION_ENV).ok().as_deref(),
        )
    }
}

/// `1/true/on/yes` or `0/false/off/no` (any case) win over the configured
/// value; anything else is ignored.
pub fn resolve_validation(configured: bool, env: Option<&str>) -> bool {
    match env.map(|value| value.trim().to_lowercase()).as_deref() {
        Some("1" | "true" | "on" | "yes") => true,
        Some("0" | "false" | "off" | "no") => false,
        Some(other) => {
            log::warn!("Ignoring {}={:?}", VALIDATION_ENV, other);
            configured
        }
        None => configured,
    }
}
