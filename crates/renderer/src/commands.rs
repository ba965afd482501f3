//! Per-image draw command buffers.
//!
//! Recording is split in two: [`plan_image`] lists the commands one image's
//! buffer needs, and [`encode`] writes such a list into a [`CommandBuffer`].
//! Buffers are recorded once per swapchain build and replayed every frame;
//! a rebuild re-records all of them.

use ash::vk;
use tracing::debug;

use lumen_rhi::RhiResult;
use lumen_rhi::buffer::Buffer;
use lumen_rhi::command::{CommandBuffer, CommandPool};
use lumen_rhi::render_pass;
use lumen_rhi::swapchain::SwapchainState;

use crate::bindings::FrameBindings;

/// Device-local geometry of one object.
pub struct GpuMesh {
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub index_count: u32,
}

/// Handles a draw needs from a [`GpuMesh`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshDraw {
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub index_count: u32,
}

impl From<&GpuMesh> for MeshDraw {
    fn from(mesh: &GpuMesh) -> Self {
        Self {
            vertex_buffer: mesh.vertex_buffer.handle(),
            index_buffer: mesh.index_buffer.handle(),
            index_count: mesh.index_count,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrawCommand {
    BeginRenderPass { framebuffer: vk::Framebuffer },
    BindPipeline(vk::Pipeline),
    BindVertexBuffer(vk::Buffer),
    /// Indices are always 32-bit.
    BindIndexBuffer(vk::Buffer),
    BindDescriptorSet(vk::DescriptorSet),
    DrawIndexed { index_count: u32 },
    EndRenderPass,
}

/// State shared by every image's recording.
#[derive(Clone, Copy, Debug)]
pub struct PassTarget {
    pub render_pass: vk::RenderPass,
    pub extent: vk::Extent2D,
    pub pipeline_layout: vk::PipelineLayout,
    pub clear_color: [f32; 4],
}

/// Commands for one image: one indexed draw per mesh with that object's set.
///
/// `sets[i]` belongs to `meshes[i]`.
pub fn plan_image(
    framebuffer: vk::Framebuffer,
    pipeline: vk::Pipeline,
    meshes: &[MeshDraw],
    sets: &[vk::DescriptorSet],
) -> Vec<DrawCommand> {
    let mut plan = Vec::with_capacity(3 + meshes.len() * 4);
    plan.push(DrawCommand::BeginRenderPass { framebuffer });
    plan.push(DrawCommand::BindPipeline(pipeline));

    for (mesh, set) in meshes.iter().zip(sets) {
        plan.push(DrawCommand::BindVertexBuffer(mesh.vertex_buffer));
        plan.push(DrawCommand::BindIndexBuffer(mesh.index_buffer));
        plan.push(DrawCommand::BindDescriptorSet(*set));
        plan.push(DrawCommand::DrawIndexed {
            index_count: mesh.index_count,
        });
    }

    plan.push(DrawCommand::EndRenderPass);
    plan
}

/// Records `plan` into `cmd` as a reusable buffer.
pub fn encode(cmd: &CommandBuffer, target: &PassTarget, plan: &[DrawCommand]) -> RhiResult<()> {
    let clear_values = render_pass::clear_values(target.clear_color);

    cmd.begin_reusable()?;
    for command in plan {
        match *command {
            DrawCommand::BeginRenderPass { framebuffer } => {
                cmd.begin_render_pass(target.render_pass, framebuffer, target.extent, &clear_values)
            }
            DrawCommand::BindPipeline(pipeline) => cmd.bind_graphics_pipeline(pipeline),
            DrawCommand::BindVertexBuffer(buffer) => cmd.bind_vertex_buffers(0, &[buffer], &[0]),
            DrawCommand::BindIndexBuffer(buffer) => {
                cmd.bind_index_buffer(buffer, 0, vk::IndexType::UINT32)
            }
            DrawCommand::BindDescriptorSet(set) => {
                cmd.bind_descriptor_sets(target.pipeline_layout, 0, &[set])
            }
            DrawCommand::DrawIndexed { index_count } => cmd.draw_indexed(index_count, 1, 0, 0, 0),
            DrawCommand::EndRenderPass => cmd.end_render_pass(),
        }
    }
    cmd.end()
}

/// Allocates and records one command buffer per swapchain image.
pub fn record_all(
    pool: &CommandPool,
    swapchain: &SwapchainState,
    pipeline: vk::Pipeline,
    target: &PassTarget,
    meshes: &[GpuMesh],
    bindings: &FrameBindings,
) -> RhiResult<Vec<CommandBuffer>> {
    let draws: Vec<MeshDraw> = meshes.iter().map(MeshDraw::from).collect();
    let buffers = pool.allocate_command_buffers(swapchain.image_count() as u32)?;

    for (image_index, cmd) in buffers.iter().enumerate() {
        let plan = plan_image(
            swapchain.framebuffer(image_index).handle(),
            pipeline,
            &draws,
            bindings.sets_for_image(image_index),
        );
        if let Err(e) = encode(cmd, target, &plan) {
            pool.free_command_buffers(&buffers);
            return Err(e);
        }
    }

    debug!(
        "Recorded {} command buffer(s), {} draw(s) each",
        buffers.len(),
        draws.len()
    );
    Ok(buffers)
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    fn mesh(raw: u64, index_count: u32) -> MeshDraw {
        MeshDraw {
            vertex_buffer: vk::Buffer::from_raw(raw),
            index_buffer: vk::Buffer::from_raw(raw + 100),
            index_count,
        }
    }

    #[test]
    fn test_plan_single_quad() {
        let framebuffer = vk::Framebuffer::from_raw(7);
        let pipeline = vk::Pipeline::from_raw(9);
        let set = vk::DescriptorSet::from_raw(11);

        let plan = plan_image(framebuffer, pipeline, &[mesh(1, 6)], &[set]);

        assert_eq!(
            plan,
            vec![
                DrawCommand::BeginRenderPass { framebuffer },
                DrawCommand::BindPipeline(pipeline),
                DrawCommand::BindVertexBuffer(vk::Buffer::from_raw(1)),
                DrawCommand::BindIndexBuffer(vk::Buffer::from_raw(101)),
                DrawCommand::BindDescriptorSet(set),
                DrawCommand::DrawIndexed { index_count: 6 },
                DrawCommand::EndRenderPass,
            ]
        );
    }

    #[test]
    fn test_plan_draws_each_object_with_its_set() {
        let sets = [vk::DescriptorSet::from_raw(20), vk::DescriptorSet::from_raw(21)];
        let plan = plan_image(
            vk::Framebuffer::from_raw(1),
            vk::Pipeline::from_raw(2),
            &[mesh(1, 6), mesh(2, 36)],
            &sets,
        );

        let draws: Vec<_> = plan
            .iter()
            .filter_map(|c| match c {
                DrawCommand::DrawIndexed { index_count } => Some(*index_count),
                _ => None,
            })
            .collect();
        assert_eq!(draws, vec![6, 36]);

        let bound: Vec<_> = plan
            .iter()
            .filter_map(|c| match c {
                DrawCommand::BindDescriptorSet(set) => Some(*set),
                _ => None,
            })
            .collect();
        assert_eq!(bound, sets);
    }

    #[test]
    fn test_plan_without_objects_still_clears() {
        let plan = plan_image(vk::Framebuffer::from_raw(1), vk::Pipeline::from_raw(2), &[], &[]);
        assert_eq!(plan.len(), 3);
        assert_eq!(plan.last(), Some(&DrawCommand::EndRenderPass));
    }
}
