//! Buffers and their backing memory.
//!
//! Vertex and index buffers are device-local and only ever written by a
//! staged copy (see [`crate::transfer`]). Uniform and staging buffers are
//! host-visible, persistently mapped and coherent, so [`Buffer::write_data`]
//! needs no flush.

use std::ops::Range;
use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::device::Device;
use crate::error::{ResourceCreationError, ResourceFailure, ResourceKind, RhiError, RhiResult};
use crate::memory::{self, MemoryDomain};

/// What a buffer is for. Decides its usage flags and memory domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    Vertex,
    Index,
    /// Per-frame shader constants.
    Uniform,
    /// Source of a transfer; freed once the copy completes.
    Staging,
}

impl BufferUsage {
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    pub fn memory_domain(self) -> MemoryDomain {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => MemoryDomain::DeviceLocal,
            BufferUsage::Uniform | BufferUsage::Staging => MemoryDomain::HostVisible,
        }
    }

    /// Whether the buffer is filled by a transfer command.
    #[inline]
    pub fn is_transfer_destination(self) -> bool {
        self.to_vk_usage()
            .contains(vk::BufferUsageFlags::TRANSFER_DST)
    }

    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
        }
    }
}

/// Byte range a write of `len` bytes at `offset` covers in a buffer of `size`.
pub fn write_range(
    offset: vk::DeviceSize,
    len: usize,
    size: vk::DeviceSize,
) -> RhiResult<Range<usize>> {
    let end = offset
        .checked_add(len as vk::DeviceSize)
        .filter(|&end| end <= size)
        .ok_or_else(|| {
            RhiError::InvalidHandle(format!(
                "write of {len} bytes at offset {offset} overruns a {size}-byte buffer"
            ))
        })?;
    Ok(offset as usize..end as usize)
}

/// A `VkBuffer` with its allocation. Both are released in `Drop`.
pub struct Buffer {
    device: Arc<Device>,
    handle: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl Buffer {
    /// Creates an uninitialized buffer of `size` bytes.
    ///
    /// When uploads run on a dedicated transfer family, transfer destinations
    /// are created `CONCURRENT` across the families so no ownership transfer
    /// is needed before drawing.
    ///
    /// # Errors
    ///
    /// [`RhiError::ResourceCreation`] when the handle, the memory or the
    /// binding fails. Nothing is leaked on any failure path.
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "{} buffer requested with zero size",
                usage.name()
            )));
        }

        let families = device.queue_families();
        let shared = families.unique_families();
        let concurrent = usage.is_transfer_destination() && families.has_dedicated_transfer();

        let mut create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage());
        create_info = if concurrent {
            create_info
                .sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&shared)
        } else {
            create_info.sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let handle = unsafe { device.handle().create_buffer(&create_info, None) }.map_err(|e| {
            ResourceCreationError::new(ResourceKind::Buffer, size, ResourceFailure::NoBuffer(e))
        })?;
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(handle) };

        let allocation = memory::allocate(
            &device,
            usage.name(),
            ResourceKind::Buffer,
            size,
            requirements,
            usage.memory_domain(),
            true,
        )
        .inspect_err(|_| unsafe { device.handle().destroy_buffer(handle, None) })?;

        let bind = unsafe {
            device
                .handle()
                .bind_buffer_memory(handle, allocation.memory(), allocation.offset())
        };
        if let Err(e) = bind {
            memory::free(&device, allocation, usage.name());
            unsafe { device.handle().destroy_buffer(handle, None) };
            return Err(ResourceCreationError::new(
                ResourceKind::Buffer,
                size,
                ResourceFailure::AllocationFailed(format!("memory binding failed ({e})")),
            )
            .into());
        }

        debug!(
            "Created {} buffer ({} bytes, {:?}{})",
            usage.name(),
            size,
            usage.memory_domain(),
            if concurrent { ", concurrent" } else { "" }
        );

        Ok(Self {
            device,
            handle,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Copies `data` into the mapping at `offset`.
    ///
    /// # Errors
    ///
    /// Fails when the buffer is device-local or the write overruns it.
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let range = write_range(offset, data.len(), self.size)?;

        let mapped = self
            .allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .ok_or_else(|| {
                RhiError::InvalidHandle(format!("{} buffer is not host-visible", self.usage.name()))
            })?;

        unsafe {
            let dst = mapped.as_ptr().cast::<u8>().add(range.start);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, range.len());
        }
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe { self.device.handle().destroy_buffer(self.handle, None) };
        if let Some(allocation) = self.allocation.take() {
            memory::free(&self.device, allocation, self.usage.name());
        }
        debug!("Destroyed {} buffer ({} bytes)", self.usage.name(), self.size);
    }
}
