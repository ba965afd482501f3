//! Frame loop and scene rendering.
//!
//! - Frame pacing over a bounded number of frames in flight
//! - Per-image command recording and descriptor bindings
//! - The [`Renderer`] that owns every GPU object

pub mod bindings;
pub mod commands;
mod error;
pub mod frame_pacer;
mod renderer;
pub mod ubo;

pub use error::{RendererError, RendererResult};
pub use frame_pacer::{FrameBackend, FrameOutcome, FramePacer, FrameStats};
pub use renderer::{Renderer, TEXTURE_FORMAT, device_requirements};
pub use ubo::UniformData;
