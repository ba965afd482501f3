//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate provides a safe abstraction over Vulkan using the `ash` crate.
//! It handles:
//! - Instance creation and adapter/queue-family selection
//! - Logical device, queues, and the memory allocator
//! - Buffers, images, samplers, and descriptor sets
//! - Swapchain management with rebuild on resize
//! - Staged uploads into device-local memory
//! - Render pass, pipeline, and command buffer recording
//! - Synchronization primitives

mod error;
mod memory;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod transfer;
pub mod vertex;

pub use error::{ResourceCreationError, ResourceFailure, ResourceKind, RhiError, RhiResult};
pub use memory::MemoryDomain;

// Re-export ash types that users might need
pub use ash::vk;
