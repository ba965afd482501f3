//! Core utilities shared across the Lumen crates.
//!
//! - Error types and result aliases
//! - Logging initialization
//! - Configuration loading
//! - Frame timing

mod config;
mod error;
mod logging;
mod timer;

pub use config::{
    Config, DeviceConfig, FRAMES_IN_FLIGHT_RANGE, FeatureProfile, RendererConfig, WindowConfig,
};
pub use error::{Error, Result};
pub use logging::{DEFAULT_FILTER, init_logging};
pub use timer::FrameTimer;
