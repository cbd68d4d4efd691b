// =============================================================================
// CONFIGURATION - Load settings from config.toml
// =============================================================================
//
// This module handles loading and parsing configuration from config.toml.
// Provides sensible defaults if config file is missing or has errors.

use anyhow::{Context, Result};
use ash::vk;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location, relative to the working directory.
pub const CONFIG_PATH: &str = "config.toml";

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub window: WindowConfig,
    pub graphics: GraphicsConfig,
    pub shaders: ShaderConfig,
    pub debug: DebugConfig,
    pub controls: ControlsConfig,
}

/// Window settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
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
            title: "Frame Pacer".to_string(),
            width: 1280,
            height: 720,
            fullscreen: false,
        }
    }
}

/// Graphics settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GraphicsConfig {
    pub present_mode: String,
    pub clear_color: [f32; 4],
    pub max_frames_in_flight: usize,
    /// Fence / acquire timeout; 0 waits forever.
    pub fence_timeout_ms: u64,
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self {
            present_mode: "fifo".to_string(),
            clear_color: [0.1, 0.2, 0.8, 1.0],
            max_frames_in_flight: 2,
            fence_timeout_ms: 0,
        }
    }
}

/// Compiled SPIR-V locations
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/quad.vert.spv"),
            fragment: PathBuf::from("shaders/quad.frag.spv"),
        }
    }
}

/// Debug settings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DebugConfig {
    pub validation_layers: bool,
    pub log_to_file: bool,
    pub log_file: String,
    pub show_fps: bool,
    /// Re-read the config file when it changes on disk.
    pub hot_reload: bool,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            validation_layers: true,
            log_to_file: false,
            log_file: "frame_pacer.log".to_string(),
            show_fps: true,
            hot_reload: false,
        }
    }
}

/// Control key bindings
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ControlsConfig {
    pub fullscreen_key: String,
    pub quit_key: String,
}

impl Default for ControlsConfig {
    fn default() -> Self {
        Self {
            fullscreen_key: "F11".to_string(),
            quit_key: "Escape".to_string(),
        }
    }
}

/// How `Config::load` arrived at its result. The logger is configured from
/// the loaded config, so this is logged afterwards with `log`.
#[derive(Debug)]
pub enum LoadReport {
    Loaded(PathBuf),
    NotFound(PathBuf),
    Failed(anyhow::Error),
}

impl LoadReport {
    pub fn log(&self) {
        match self {
            LoadReport::Loaded(path) => log::info!("Loaded configuration from {:?}", path),
            LoadReport::NotFound(path) => {
                log::info!("Config file not found at {:?}, using defaults", path)
            }
            LoadReport::Failed(e) => log::warn!("{:#}. Using defaults.", e),
        }
    }
}

impl Config {
    /// Load configuration from `CONFIG_PATH`, falling back to defaults
    pub fn load() -> (Self, LoadReport) {
        Self::load_or_default(CONFIG_PATH)
    }

    pub fn load_or_default<P: AsRef<Path>>(path: P) -> (Self, LoadReport) {
        let path = path.as_ref();
        if !path.exists() {
            return (Config::default(), LoadReport::NotFound(path.to_path_buf()));
        }
        match Self::load_from_path(path) {
            Ok(config) => (config, LoadReport::Loaded(path.to_path_buf())),
            Err(e) => (Config::default(), LoadReport::Failed(e)),
        }
    }

    /// Load configuration from a specific path; a missing file gives defaults
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Parse and validate TOML text
    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.graphics.max_frames_in_flight == 0 {
            anyhow::bail!("graphics.max_frames_in_flight must be at least 1");
        }
        if self.window.width == 0 || self.window.height == 0 {
            anyhow::bail!(
                "window size {}x{} has no area",
                self.window.width,
                self.window.height
            );
        }
        Ok(())
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

    /// Timeout for fence waits and image acquisition, in nanoseconds
    pub fn fence_timeout_ns(&self) -> u64 {
        match self.graphics.fence_timeout_ms {
            0 => u64::MAX,
            ms => ms.saturating_mul(1_000_000),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.graphics.max_frames_in_flight, 2);
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
        assert_eq!(config.fence_timeout_ns(), u64::MAX);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
            [graphics]
            present_mode = "Mailbox"
            max_frames_in_flight = 3
            fence_timeout_ms = 250

            [debug]
            hot_reload = true
            "#,
        )
        .unwrap();

        assert_eq!(config.present_mode(), vk::PresentModeKHR::MAILBOX);
        assert_eq!(config.graphics.max_frames_in_flight, 3);
        assert_eq!(config.fence_timeout_ns(), 250_000_000);
        assert!(config.debug.hot_reload);
        assert_eq!(config.graphics.clear_color, GraphicsConfig::default().clear_color);
        assert_eq!(config.window, WindowConfig::default());
        assert_eq!(config.shaders.vertex, PathBuf::from("shaders/quad.vert.spv"));
    }

    #[test]
    fn zero_frames_in_flight_is_rejected() {
        let err = Config::parse("[graphics]\nmax_frames_in_flight = 0\n").unwrap_err();
        assert!(err.to_string().contains("max_frames_in_flight"));
    }

    #[test]
    fn zero_sized_window_is_rejected() {
        assert!(Config::parse("[window]\nwidth = 0\n").is_err());
    }

    #[test]
    fn unknown_present_mode_falls_back_to_fifo() {
        let config = Config::parse("[graphics]\npresent_mode = \"vsync-ish\"\n").unwrap();
        assert_eq!(config.present_mode(), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(Config::parse("[graphics\nclear_color = 1").is_err());
        assert!(Config::parse("[graphics]\nclear_color = [1.0, 2.0]\n").is_err());
    }

    #[test]
    fn shipped_config_is_valid() {
        let config = Config::load_from_path(concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml")).unwrap();
        assert_eq!(config.graphics, GraphicsConfig::default());
        assert_eq!(config.shaders, ShaderConfig::default());
        assert!(config.debug.hot_reload);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let config = Config::load_from_path("definitely/not/here.toml").unwrap();
        assert_eq!(config, Config::default());

        let (config, report) = Config::load_or_default("definitely/not/here.toml");
        assert_eq!(config, Config::default());
        assert!(matches!(report, LoadReport::NotFound(_)));
    }

    #[test]
    fn load_outcome_is_kept_for_reporting_after_logger_setup() {
        let (config, report) = Config::load_or_default(concat!(env!("CARGO_MANIFEST_DIR"), "/config.toml"));
        assert!(config.debug.hot_reload);
        assert!(matches!(report, LoadReport::Loaded(_)));

        let path = std::env::temp_dir().join(format!("frame-pacer-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[graphics]\nmax_frames_in_flight = 0\n").unwrap();
        let (config, report) = Config::load_or_default(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config, Config::default());
        match report {
            LoadReport::Failed(e) => assert!(format!("{:#}", e).contains("max_frames_in_flight")),
            other => panic!("expected a failed load, got {other:?}"),
        }
    }
}
