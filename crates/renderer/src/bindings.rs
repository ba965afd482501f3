//! Descriptor sets binding uniforms and the texture to the mesh pipeline.
//!
//! Every (swapchain image, object) pair gets its own uniform buffer and its
//! own descriptor set:
//!
//! - binding 0: uniform buffer ([`UniformData`]), vertex stage
//! - binding 1: combined image sampler, fragment stage
//!
//! The whole group is sized to the image count, so it is dropped and rebuilt
//! with the swapchain.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use lumen_rhi::RhiResult;
use lumen_rhi::buffer::{Buffer, BufferUsage};
use lumen_rhi::descriptor::{
    self, DescriptorPool, DescriptorSetLayout, binding, buffer_info, image_info,
};
use lumen_rhi::device::Device;

use crate::ubo::UniformData;

pub const UNIFORM_BINDING: u32 = 0;
pub const TEXTURE_BINDING: u32 = 1;

/// Layout bindings shared by every set.
pub fn layout_bindings() -> [vk::DescriptorSetLayoutBinding<'static>; 2] {
    [
        binding::uniform_buffer(UNIFORM_BINDING, vk::ShaderStageFlags::VERTEX),
        binding::combined_image_sampler(TEXTURE_BINDING, vk::ShaderStageFlags::FRAGMENT),
    ]
}

pub fn create_set_layout(device: Arc<Device>) -> RhiResult<DescriptorSetLayout> {
    DescriptorSetLayout::new(device, &layout_bindings())
}

/// Texture every set samples.
#[derive(Clone, Copy, Debug)]
pub struct TextureBinding {
    pub sampler: vk::Sampler,
    pub view: vk::ImageView,
}

/// Flat index of the (image, object) pair; objects are contiguous per image.
#[inline]
pub fn set_index(image_index: usize, object_index: usize, object_count: usize) -> usize {
    image_index * object_count + object_index
}

/// Uniform buffers and descriptor sets for one swapchain generation.
pub struct FrameBindings {
    // Sets are freed with the pool.
    #[allow(dead_code)]
    pool: DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
    uniform_buffers: Vec<Buffer>,
    image_count: usize,
    object_count: usize,
}

impl FrameBindings {
    pub fn new(
        device: Arc<Device>,
        layout: &DescriptorSetLayout,
        image_count: usize,
        object_count: usize,
        texture: TextureBinding,
    ) -> RhiResult<Self> {
        let set_count = image_count * object_count;
        let pool = DescriptorPool::new(
            device.clone(),
            set_count as u32,
            &descriptor::pool_sizes(&layout_bindings(), set_count as u32),
        )?;

        let layouts = vec![layout.handle(); set_count];
        let sets = pool.allocate(&layouts)?;

        let uniform_buffers = (0..set_count)
            .map(|_| {
                Buffer::new(
                    device.clone(),
                    BufferUsage::Uniform,
                    UniformData::SIZE as vk::DeviceSize,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        for (set, buffer) in sets.iter().zip(&uniform_buffers) {
            let buffer_infos = [buffer_info(
                buffer.handle(),
                0,
                UniformData::SIZE as vk::DeviceSize,
            )];
            let image_infos = [image_info(
                texture.sampler,
                texture.view,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )];

            let writes = [
                vk::WriteDescriptorSet::default()
                    .dst_set(*set)
                    .dst_binding(UNIFORM_BINDING)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_infos),
                vk::WriteDescriptorSet::default()
                    .dst_set(*set)
                    .dst_binding(TEXTURE_BINDING)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .image_info(&image_infos),
            ];
            descriptor::update_descriptor_sets(&device, &writes);
        }

        debug!(
            "Wrote {} descriptor set(s) for {} image(s) x {} object(s)",
            set_count, image_count, object_count
        );

        Ok(Self {
            pool,
            sets,
            uniform_buffers,
            image_count,
            object_count,
        })
    }

    #[inline]
    pub fn set(&self, image_index: usize, object_index: usize) -> vk::DescriptorSet {
        self.sets[set_index(image_index, object_index, self.object_count)]
    }

    /// Sets for every object, in object order, for one image.
    pub fn sets_for_image(&self, image_index: usize) -> &[vk::DescriptorSet] {
        let start = set_index(image_index, 0, self.object_count);
        &self.sets[start..start + self.object_count]
    }

    /// Writes `data` into the uniform buffer of the (image, object) pair.
    pub fn write_uniforms(
        &self,
        image_index: usize,
        object_index: usize,
        data: &UniformData,
    ) -> RhiResult<()> {
        self.uniform_buffers[set_index(image_index, object_index, self.object_count)]
            .write_data(0, data.as_bytes())
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.image_count
    }
}
