//! RHI-specific error types.
//!
//! Stale or suboptimal swapchains are not errors: acquire and present report
//! them through [`crate::swapchain::AcquireOutcome`] and
//! [`crate::swapchain::PresentOutcome`].

use std::fmt;

use ash::vk;
use thiserror::Error;

/// Kind of GPU object whose creation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    Buffer,
    Image,
    ImageView,
    Sampler,
    Framebuffer,
    RenderPass,
    Pipeline,
    DescriptorPool,
    CommandBuffer,
}

impl ResourceKind {
    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Buffer => "buffer",
            ResourceKind::Image => "image",
            ResourceKind::ImageView => "image view",
            ResourceKind::Sampler => "sampler",
            ResourceKind::Framebuffer => "framebuffer",
            ResourceKind::RenderPass => "render pass",
            ResourceKind::Pipeline => "pipeline",
            ResourceKind::DescriptorPool => "descriptor pool",
            ResourceKind::CommandBuffer => "command buffer",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a resource could not be created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResourceFailure {
    /// The driver refused to create the buffer handle.
    NoBuffer(vk::Result),
    /// No memory type satisfies both the resource and the requested property flags.
    NoMatchingMemoryType,
    /// The allocator could not provide (or bind) memory.
    AllocationFailed(String),
    /// Any other handle creation failure (image, view, pipeline, ...).
    HandleCreation(vk::Result),
}

impl fmt::Display for ResourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceFailure::NoBuffer(result) => write!(f, "buffer creation failed ({result})"),
            ResourceFailure::NoMatchingMemoryType => {
                f.write_str("no memory type matches the requested property flags")
            }
            ResourceFailure::AllocationFailed(reason) => write!(f, "allocation failed: {reason}"),
            ResourceFailure::HandleCreation(result) => write!(f, "handle creation failed ({result})"),
        }
    }
}

/// A GPU resource could not be created.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("failed to create {object} ({size} bytes): {reason}")]
pub struct ResourceCreationError {
    pub object: ResourceKind,
    pub size: vk::DeviceSize,
    pub reason: ResourceFailure,
}

impl ResourceCreationError {
    pub fn new(object: ResourceKind, size: vk::DeviceSize, reason: ResourceFailure) -> Self {
        Self {
            object,
            size,
            reason,
        }
    }

    /// Shorthand for a non-memory handle that failed to create.
    pub fn handle(object: ResourceKind, result: vk::Result) -> Self {
        Self::new(object, 0, ResourceFailure::HandleCreation(result))
    }

    /// Classifies a gpu-allocator error for the given object.
    pub fn from_allocation(
        object: ResourceKind,
        size: vk::DeviceSize,
        error: gpu_allocator::AllocationError,
    ) -> Self {
        let reason = match error {
            gpu_allocator::AllocationError::NoCompatibleMemoryTypeFound => {
                ResourceFailure::NoMatchingMemoryType
            }
            other => ResourceFailure::AllocationFailed(other.to_string()),
        };
        Self::new(object, size, reason)
    }
}

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] vk::Result),

    /// Failed to load Vulkan library
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error outside of resource creation
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No adapter satisfied the device requirements
    #[error("No suitable GPU found: {}", .rejections.join("; "))]
    NoSuitableDevice { rejections: Vec<String> },

    /// A GPU object could not be created
    #[error(transparent)]
    ResourceCreation(#[from] ResourceCreationError),

    /// A required instance layer or extension is missing
    #[error("Missing instance support: {0}")]
    MissingInstanceSupport(String),

    /// Shader module error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// The allocator mutex was poisoned by a panicking thread
    #[error("GPU allocator lock poisoned")]
    AllocatorPoisoned,
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;
