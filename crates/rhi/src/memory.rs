//! Allocation helpers shared by buffers and images.
//!
//! Every GPU resource pairs a handle with a gpu-allocator [`Allocation`]. These
//! helpers keep the create/bind/free sequence and its error classification in
//! one place.

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};

use crate::device::Device;
use crate::error::{ResourceCreationError, ResourceFailure, ResourceKind};

/// Where a resource's memory lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoryDomain {
    /// Host-visible and coherent, persistently mapped.
    HostVisible,
    /// Device-local, not mappable.
    DeviceLocal,
}

impl MemoryDomain {
    pub fn location(self) -> MemoryLocation {
        match self {
            MemoryDomain::HostVisible => MemoryLocation::CpuToGpu,
            MemoryDomain::DeviceLocal => MemoryLocation::GpuOnly,
        }
    }
}

/// Allocates memory for `requirements`, classifying failures for `object`.
pub(crate) fn allocate(
    device: &Device,
    name: &str,
    object: ResourceKind,
    size: vk::DeviceSize,
    requirements: vk::MemoryRequirements,
    domain: MemoryDomain,
    linear: bool,
) -> Result<Allocation, ResourceCreationError> {
    let mut allocator = device.allocator().map_err(|e| {
        ResourceCreationError::new(
            object,
            size,
            ResourceFailure::AllocationFailed(e.to_string()),
        )
    })?;

    allocator
        .allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: domain.location(),
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })
        .map_err(|e| ResourceCreationError::from_allocation(object, size, e))
}

/// Returns an allocation to the allocator, logging instead of failing.
///
/// Used from `Drop`, where there is no caller to hand an error to.
pub(crate) fn free(device: &Device, allocation: Allocation, what: &str) {
    match device.allocator() {
        Ok(mut allocator) => {
            if let Err(e) = allocator.free(allocation) {
                tracing::error!("Failed to free {} allocation: {:?}", what, e);
            }
        }
        Err(e) => tracing::error!("Leaking {} allocation: {}", what, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_domain_location() {
        assert_eq!(MemoryDomain::HostVisible.location(), MemoryLocation::CpuToGpu);
        assert_eq!(MemoryDomain::DeviceLocal.location(), MemoryLocation::GpuOnly);
    }
}
