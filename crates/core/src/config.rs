//! Application configuration loaded from TOML.
//!
//! Every field has a default, so an absent file or a partial file is valid:
//!
//! ```toml
//! [window]
//! width = 1280
//! height = 720
//!
//! [renderer]
//! frames_in_flight = 3
//! clear_color = [0.0, 0.0, 0.0, 1.0]
//!
//! [device]
//! capability_profile = "v1"
//! extra_features = ["fill_mode_non_solid"]
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Accepted range for `renderer.frames_in_flight`.
pub const FRAMES_IN_FLIGHT_RANGE: std::ops::RangeInclusive<usize> = 1..=3;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Lumen".to_string(),
            resizable: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RendererConfig {
    /// Frames the CPU may record ahead of the GPU.
    pub frames_in_flight: usize,
    /// Enables the Khronos validation layer when it is installed.
    pub validation: bool,
    pub clear_color: [f32; 4],
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            validation: cfg!(debug_assertions),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            vertex_shader: PathBuf::from("shaders/mesh.vert.spv"),
            fragment_shader: PathBuf::from("shaders/mesh.frag.spv"),
        }
    }
}

/// Named, versioned set of required device features.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureProfile {
    /// Geometry shading.
    V1,
    /// Geometry shading and sampler anisotropy.
    #[default]
    V2,
}

impl FeatureProfile {
    pub fn name(self) -> &'static str {
        match self {
            FeatureProfile::V1 => "v1",
            FeatureProfile::V2 => "v2",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    pub capability_profile: FeatureProfile,
    /// Feature names required on top of the profile.
    pub extra_features: Vec<String>,
    pub require_discrete: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            capability_profile: FeatureProfile::default(),
            extra_features: Vec::new(),
            require_discrete: true,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub window: WindowConfig,
    pub renderer: RendererConfig,
    pub device: DeviceConfig,
}

impl Config {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(source).map_err(|e| Error::Config(e.message().to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `path`, or returns the defaults when it does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let source = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&source)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Rejects values the renderer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be nonzero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        if !FRAMES_IN_FLIGHT_RANGE.contains(&self.renderer.frames_in_flight) {
            return Err(Error::Config(format!(
                "renderer.frames_in_flight must be in {}..={}, got {}",
                FRAMES_IN_FLIGHT_RANGE.start(),
                FRAMES_IN_FLIGHT_RANGE.end(),
                self.renderer.frames_in_flight
            )));
        }

        if let Some(channel) = self
            .renderer
            .clear_color
            .iter()
            .find(|c| !(0.0..=1.0).contains(*c))
        {
            return Err(Error::Config(format!(
                "renderer.clear_color channels must be in 0..=1, got {channel}"
            )));
        }

        Ok(())
    }
}
