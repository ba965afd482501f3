//! Staged uploads into device-local memory.
//!
//! Every upload follows the same sequence:
//!
//! 1. allocate a host-visible staging buffer sized to the input and copy the
//!    bytes into it
//! 2. allocate the device-local destination (buffer or image)
//! 3. record a one-shot command buffer with the copy (and, for images, the
//!    `UNDEFINED -> TRANSFER_DST -> SHADER_READ_ONLY` barriers around it)
//! 4. submit it and block until the queue is idle
//! 5. free the command buffer and the staging buffer before returning
//!
//! Uploads happen at load time only, so the blocking wait is acceptable.
//!
//! The sequence is written once against [`TransferContext`]. [`GpuTransfer`]
//! implements it over a real [`Device`]; tests drive it with a host-memory
//! double and read back the destination.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{self, CommandBuffer, CommandPool};
use crate::device::{Device, QueueKind};
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, ImageDesc, LayoutTransition};

/// One command recorded into a one-shot transfer buffer.
pub enum TransferOp<'a, B, I> {
    CopyBuffer {
        src: &'a B,
        dst: &'a B,
        size: vk::DeviceSize,
    },
    Transition {
        image: &'a I,
        transition: LayoutTransition,
    },
    CopyBufferToImage {
        src: &'a B,
        dst: &'a I,
    },
}

/// The resource and submission primitives an upload needs.
pub trait TransferContext {
    type Buffer;
    type Image;

    fn create_buffer(&self, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self::Buffer>;

    /// Writes into a host-visible buffer.
    fn write_buffer(&self, buffer: &Self::Buffer, bytes: &[u8]) -> RhiResult<()>;

    fn create_image(&self, desc: ImageDesc) -> RhiResult<Self::Image>;

    /// Records `ops` into a fresh command buffer, submits it to `queue`, and
    /// returns once the queue is idle and the command buffer is freed.
    fn submit_one_shot(
        &self,
        queue: QueueKind,
        ops: &[TransferOp<'_, Self::Buffer, Self::Image>],
    ) -> RhiResult<()>;
}

/// Uploads `bytes` into a new device-local buffer.
///
/// # Errors
///
/// Fails on empty input, and with [`RhiError::ResourceCreation`] when either
/// buffer cannot be created.
pub fn upload_buffer<C: TransferContext>(
    context: &C,
    bytes: &[u8],
    usage: BufferUsage,
    queue: QueueKind,
) -> RhiResult<C::Buffer> {
    if bytes.is_empty() {
        return Err(RhiError::InvalidHandle(format!(
            "Refusing to upload an empty {} buffer",
            usage.name()
        )));
    }
    let size = bytes.len() as vk::DeviceSize;

    let staging = context.create_buffer(BufferUsage::Staging, size)?;
    context.write_buffer(&staging, bytes)?;

    let destination = context.create_buffer(usage, size)?;
    context.submit_one_shot(
        queue,
        &[TransferOp::CopyBuffer {
            src: &staging,
            dst: &destination,
            size,
        }],
    )?;
    drop(staging);

    debug!(
        "Uploaded {} bytes to {} buffer via {:?} queue",
        size,
        usage.name(),
        queue
    );
    Ok(destination)
}

/// Uploads tightly packed texels into a new sampled image.
///
/// The image ends in `SHADER_READ_ONLY_OPTIMAL`. The work goes to the
/// graphics queue because the final barrier targets the fragment stage.
pub fn upload_image<C: TransferContext>(
    context: &C,
    bytes: &[u8],
    desc: ImageDesc,
) -> RhiResult<C::Image> {
    let expected = desc.byte_size().ok_or_else(|| {
        RhiError::InvalidHandle(format!("Cannot upload texels of format {:?}", desc.format))
    })?;
    if bytes.is_empty() || bytes.len() as vk::DeviceSize != expected {
        return Err(RhiError::InvalidHandle(format!(
            "Image data is {} bytes, expected {} for {}x{}",
            bytes.len(),
            expected,
            desc.extent.width,
            desc.extent.height
        )));
    }

    let staging = context.create_buffer(BufferUsage::Staging, expected)?;
    context.write_buffer(&staging, bytes)?;

    let image = context.create_image(desc)?;
    let to_transfer = LayoutTransition::between(
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    )?;
    let to_shader = LayoutTransition::between(
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    )?;

    context.submit_one_shot(
        QueueKind::Graphics,
        &[
            TransferOp::Transition {
                image: &image,
                transition: to_transfer,
            },
            TransferOp::CopyBufferToImage {
                src: &staging,
                dst: &image,
            },
            TransferOp::Transition {
                image: &image,
                transition: to_shader,
            },
        ],
    )?;
    drop(staging);

    debug!(
        "Uploaded {}x{} {:?} image ({} bytes)",
        desc.extent.width, desc.extent.height, desc.format, expected
    );
    Ok(image)
}

/// [`TransferContext`] over a real device.
///
/// Holds one transient command pool per queue kind it submits to.
pub struct GpuTransfer {
    device: Arc<Device>,
    graphics_pool: CommandPool,
    transfer_pool: CommandPool,
}

impl GpuTransfer {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let graphics_pool =
            CommandPool::new_transient(device.clone(), device.queue_family(QueueKind::Graphics))?;
        let transfer_pool =
            CommandPool::new_transient(device.clone(), device.queue_family(QueueKind::Transfer))?;

        Ok(Self {
            device,
            graphics_pool,
            transfer_pool,
        })
    }

    fn pool(&self, queue: QueueKind) -> RhiResult<&CommandPool> {
        match queue {
            QueueKind::Graphics => Ok(&self.graphics_pool),
            QueueKind::Transfer => Ok(&self.transfer_pool),
            QueueKind::Present => Err(RhiError::InvalidHandle(
                "Transfers cannot be submitted to the present queue".to_string(),
            )),
        }
    }

    fn record(cmd: &CommandBuffer, ops: &[TransferOp<'_, Buffer, Image>]) {
        for op in ops {
            match op {
                TransferOp::CopyBuffer { src, dst, size } => {
                    let region = vk::BufferCopy::default().size(*size);
                    cmd.copy_buffer(src.handle(), dst.handle(), &[region]);
                }
                TransferOp::Transition { image, transition } => {
                    let barrier =
                        transition.barrier(image.handle(), image.desc().subresource_range());
                    cmd.image_barrier(transition.src_stage, transition.dst_stage, &[barrier]);
                }
                TransferOp::CopyBufferToImage { src, dst } => {
                    let region = command::full_image_copy(dst.extent());
                    cmd.copy_buffer_to_image(src.handle(), dst.handle(), &[region]);
                }
            }
        }
    }

    fn record_and_submit(
        &self,
        queue: QueueKind,
        cmd: &CommandBuffer,
        ops: &[TransferOp<'_, Buffer, Image>],
    ) -> RhiResult<()> {
        cmd.begin()?;
        Self::record(cmd, ops);
        cmd.end()?;

        let command_buffers = [cmd.handle()];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        unsafe {
            self.device
                .submit(queue, &[submit_info], vk::Fence::null())?;
        }
        self.device.wait_queue_idle(queue)
    }
}

impl TransferContext for GpuTransfer {
    type Buffer = Buffer;
    type Image = Image;

    fn create_buffer(&self, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Buffer> {
        Buffer::new(self.device.clone(), usage, size)
    }

    fn write_buffer(&self, buffer: &Buffer, bytes: &[u8]) -> RhiResult<()> {
        buffer.write_data(0, bytes)
    }

    fn create_image(&self, desc: ImageDesc) -> RhiResult<Image> {
        Image::new(self.device.clone(), desc)
    }

    fn submit_one_shot(
        &self,
        queue: QueueKind,
        ops: &[TransferOp<'_, Buffer, Image>],
    ) -> RhiResult<()> {
        let pool = self.pool(queue)?;
        let cmd = pool.allocate_command_buffer()?;

        let result = self.record_and_submit(queue, &cmd, ops);
        pool.free_command_buffers(std::slice::from_ref(&cmd));
        result
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::error::{ResourceCreationError, ResourceFailure, ResourceKind};
    use crate::vertex::Vertex;

    /// Host-memory buffer; staging buffers report their own drop.
    struct HostBuffer {
        usage: BufferUsage,
        bytes: RefCell<Vec<u8>>,
        live_staging: Rc<Cell<usize>>,
    }

    impl Drop for HostBuffer {
        fn drop(&mut self) {
            if self.usage == BufferUsage::Staging {
                self.live_staging.set(self.live_staging.get() - 1);
            }
        }
    }

    struct HostImage {
        desc: ImageDesc,
        layout: Cell<vk::ImageLayout>,
        texels: RefCell<Vec<u8>>,
    }

    #[derive(Default)]
    struct HostTransfer {
        live_staging: Rc<Cell<usize>>,
        submissions: RefCell<Vec<(QueueKind, usize)>>,
        fail_usage: Option<BufferUsage>,
    }

    impl TransferContext for HostTransfer {
        type Buffer = HostBuffer;
        type Image = HostImage;

        fn create_buffer(&self, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<HostBuffer> {
            if self.fail_usage == Some(usage) {
                return Err(ResourceCreationError::new(
                    ResourceKind::Buffer,
                    size,
                    ResourceFailure::NoMatchingMemoryType,
                )
                .into());
            }
            if usage == BufferUsage::Staging {
                self.live_staging.set(self.live_staging.get() + 1);
            }
            Ok(HostBuffer {
                usage,
                bytes: RefCell::new(vec![0; size as usize]),
                live_staging: self.live_staging.clone(),
            })
        }

        fn write_buffer(&self, buffer: &HostBuffer, bytes: &[u8]) -> RhiResult<()> {
            assert_eq!(buffer.usage, BufferUsage::Staging);
            buffer.bytes.borrow_mut()[..bytes.len()].copy_from_slice(bytes);
            Ok(())
        }

        fn create_image(&self, desc: ImageDesc) -> RhiResult<HostImage> {
            Ok(HostImage {
                desc,
                layout: Cell::new(vk::ImageLayout::UNDEFINED),
                texels: RefCell::new(vec![0; desc.byte_size().unwrap() as usize]),
            })
        }

        fn submit_one_shot(
            &self,
            queue: QueueKind,
            ops: &[TransferOp<'_, HostBuffer, HostImage>],
        ) -> RhiResult<()> {
            self.submissions.borrow_mut().push((queue, ops.len()));
            for op in ops {
                match op {
                    TransferOp::CopyBuffer { src, dst, size } => {
                        let size = *size as usize;
                        dst.bytes.borrow_mut()[..size]
                            .copy_from_slice(&src.bytes.borrow()[..size]);
                    }
                    TransferOp::Transition { image, transition } => {
                        assert_eq!(image.layout.get(), transition.old_layout);
                        image.layout.set(transition.new_layout);
                    }
                    TransferOp::CopyBufferToImage { src, dst } => {
                        assert_eq!(dst.layout.get(), vk::ImageLayout::TRANSFER_DST_OPTIMAL);
                        dst.texels.borrow_mut().copy_from_slice(&src.bytes.borrow());
                    }
                }
            }
            Ok(())
        }
    }

    #[test]
    fn test_upload_buffer_reproduces_bytes_and_frees_staging() {
        let context = HostTransfer::default();
        for size in [1usize, 3, 64, 4099] {
            let bytes: Vec<u8> = (0..size).map(|i| (i * 7 % 251) as u8).collect();

            let buffer =
                upload_buffer(&context, &bytes, BufferUsage::Vertex, QueueKind::Transfer).unwrap();

            assert_eq!(*buffer.bytes.borrow(), bytes);
            assert_eq!(context.live_staging.get(), 0);
        }
        assert_eq!(context.submissions.borrow().len(), 4);
    }

    #[test]
    fn test_upload_buffer_uses_requested_queue() {
        let context = HostTransfer::default();
        upload_buffer(&context, &[1, 2, 3, 4], BufferUsage::Index, QueueKind::Graphics).unwrap();
        upload_buffer(&context, &[1, 2, 3, 4], BufferUsage::Index, QueueKind::Transfer).unwrap();

        assert_eq!(
            *context.submissions.borrow(),
            vec![(QueueKind::Graphics, 1), (QueueKind::Transfer, 1)]
        );
    }

    #[test]
    fn test_upload_buffer_rejects_empty_input() {
        let context = HostTransfer::default();
        let result = upload_buffer(&context, &[], BufferUsage::Vertex, QueueKind::Transfer);
        assert!(result.is_err());
        assert!(context.submissions.borrow().is_empty());
    }

    #[test]
    fn test_destination_failure_releases_staging() {
        let context = HostTransfer {
            fail_usage: Some(BufferUsage::Index),
            ..Default::default()
        };

        let err = upload_buffer(&context, &[0u8; 12], BufferUsage::Index, QueueKind::Transfer)
            .err()
            .unwrap();

        match err {
            RhiError::ResourceCreation(e) => {
                assert_eq!(e.size, 12);
                assert_eq!(e.reason, ResourceFailure::NoMatchingMemoryType);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(context.live_staging.get(), 0);
        assert!(context.submissions.borrow().is_empty());
    }

    #[test]
    fn test_upload_quad_scenario() {
        let context = HostTransfer::default();
        let vertices = [Vertex::default(); 6];
        let indices: [u32; 6] = [0, 1, 2, 2, 3, 0];

        let vertex_bytes = bytemuck::cast_slice(&vertices);
        let vertex_buffer =
            upload_buffer(&context, vertex_bytes, BufferUsage::Vertex, QueueKind::Transfer)
                .unwrap();
        let index_buffer = upload_buffer(
            &context,
            bytemuck::cast_slice(&indices),
            BufferUsage::Index,
            QueueKind::Transfer,
        )
        .unwrap();

        assert_eq!(
            vertex_buffer.bytes.borrow().len(),
            6 * std::mem::size_of::<Vertex>()
        );
        let bytes = index_buffer.bytes.borrow();
        let read_back: &[u32] = bytemuck::cast_slice(&bytes);
        assert_eq!(read_back, &[0, 1, 2, 2, 3, 0]);
        assert_eq!(context.live_staging.get(), 0);
    }

    #[test]
    fn test_upload_image_transitions_and_copies() {
        let context = HostTransfer::default();
        let desc = ImageDesc::texture(
            vk::Extent2D {
                width: 4,
                height: 2,
            },
            vk::Format::R8G8B8A8_SRGB,
        );
        let texels: Vec<u8> = (0..32).collect();

        let image = upload_image(&context, &texels, desc).unwrap();

        assert_eq!(image.layout.get(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(*image.texels.borrow(), texels);
        assert_eq!(image.desc, desc);
        assert_eq!(context.live_staging.get(), 0);
        assert_eq!(*context.submissions.borrow(), vec![(QueueKind::Graphics, 3)]);
    }

    #[test]
    fn test_upload_image_rejects_mismatched_size() {
        let context = HostTransfer::default();
        let desc = ImageDesc::texture(
            vk::Extent2D {
                width: 4,
                height: 4,
            },
            vk::Format::R8G8B8A8_SRGB,
        );

        assert!(upload_image(&context, &[0u8; 10], desc).is_err());
        assert_eq!(context.live_staging.get(), 0);
    }

    #[test]
    fn test_upload_image_sizes_input_by_format() {
        let context = HostTransfer::default();
        let extent = vk::Extent2D {
            width: 4,
            height: 4,
        };

        let single_channel = ImageDesc::texture(extent, vk::Format::R8_UNORM);
        assert!(upload_image(&context, &[0u8; 64], single_channel).is_err());
        let image = upload_image(&context, &[7u8; 16], single_channel).unwrap();
        assert_eq!(image.texels.borrow().len(), 16);

        let compressed = ImageDesc::texture(extent, vk::Format::BC1_RGBA_UNORM_BLOCK);
        assert!(upload_image(&context, &[0u8; 8], compressed).is_err());
        assert_eq!(context.submissions.borrow().len(), 1);
        assert_eq!(context.live_staging.get(), 0);
    }
}
