//! Top-level renderer orchestration.
//!
//! [`Renderer`] owns every Vulkan object and hands the frame loop to the
//! [`FramePacer`]. Objects fall into three lifetimes:
//!
//! - device-lifetime: instance, surface, device, frame slots, command pool,
//!   shaders, layouts
//! - load-time: mesh buffers and the texture, uploaded once through the
//!   staged transfer path
//! - swapchain-lifetime (`Presentation`): swapchain, framebuffers, depth
//!   buffer, pipeline, uniform buffers, descriptor sets, command buffers;
//!   rebuilt together whenever the swapchain is
//!
//! # Resource Destruction Order
//!
//! `GpuState` declares its fields in destruction order. `Renderer` keeps it
//! in a `ManuallyDrop` so the device can be idled before anything in it is
//! released.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use lumen_core::{Config, DeviceConfig, FeatureProfile, FrameTimer};
use lumen_platform::{Surface, Window};
use lumen_rhi::buffer::BufferUsage;
use lumen_rhi::command::{CommandBuffer, CommandPool};
use lumen_rhi::descriptor::DescriptorSetLayout;
use lumen_rhi::device::{Device, QueueKind};
use lumen_rhi::image::{Image, ImageDesc, ImageView, find_depth_format};
use lumen_rhi::instance::Instance;
use lumen_rhi::physical_device::{
    CapabilityProfile, DeviceFeature, DeviceRequirements, select_physical_device,
};
use lumen_rhi::pipeline::{CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use lumen_rhi::sampler::Sampler;
use lumen_rhi::shader::{Shader, ShaderStage};
use lumen_rhi::swapchain::{
    AcquireOutcome, FramebufferSizeSource, PresentOutcome, SurfaceContext, SwapchainState,
};
use lumen_rhi::sync::FrameSlot;
use lumen_rhi::transfer::{self, GpuTransfer};
use lumen_rhi::vertex::Vertex;
use lumen_rhi::{RhiError, RhiResult};
use lumen_scene::{Camera, GameObject, TextureData};

use crate::bindings::{self, FrameBindings, TextureBinding};
use crate::commands::{self, GpuMesh, PassTarget};
use crate::error::{RendererError, RendererResult};
use crate::frame_pacer::{FrameBackend, FrameOutcome, FramePacer, FrameStats};
use crate::ubo::UniformData;

/// Format the texture is uploaded to.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Resolves the configured profile and extra feature names.
pub fn device_requirements(config: &DeviceConfig) -> RendererResult<DeviceRequirements> {
    let profile = match config.capability_profile {
        FeatureProfile::V1 => CapabilityProfile::V1,
        FeatureProfile::V2 => CapabilityProfile::V2,
    };

    let extra = config
        .extra_features
        .iter()
        .map(|name| {
            DeviceFeature::from_name(name).ok_or_else(|| RendererError::UnknownFeature(name.clone()))
        })
        .collect::<RendererResult<Vec<_>>>()?;

    Ok(DeviceRequirements::from_profile(
        profile,
        &extra,
        config.require_discrete,
    ))
}

/// Sampled texture; the view goes before the image it views.
struct SampledTexture {
    sampler: Sampler,
    view: ImageView,
    #[allow(dead_code)]
    image: Image,
}

impl SampledTexture {
    fn binding(&self) -> TextureBinding {
        TextureBinding {
            sampler: self.sampler.handle(),
            view: self.view.handle(),
        }
    }
}

/// Everything sized to or bound to the current swapchain.
struct Presentation {
    /// Freed back to the command pool before a rebuild.
    command_buffers: Vec<CommandBuffer>,
    bindings: FrameBindings,
    pipeline: Pipeline,
    swapchain: SwapchainState,
}

struct GpuState {
    presentation: Option<Presentation>,
    meshes: Vec<GpuMesh>,
    texture: SampledTexture,
    pipeline_layout: PipelineLayout,
    set_layout: DescriptorSetLayout,
    vertex_shader: Shader,
    fragment_shader: Shader,
    command_pool: CommandPool,
    slots: Vec<FrameSlot>,
    surface_context: SurfaceContext,
    clear_color: [f32; 4],
    device: Arc<Device>,
    // Destroyed after every device child, before the instance.
    #[allow(dead_code)]
    surface: Surface,
    instance: Instance,
}

impl GpuState {
    fn presentation(&self) -> RhiResult<&Presentation> {
        self.presentation
            .as_ref()
            .ok_or_else(|| RhiError::SwapchainError("Swapchain is not built".to_string()))
    }

    /// Builds the pipeline, bindings and command buffers for `swapchain`.
    fn build_presentation(&self, swapchain: SwapchainState) -> RhiResult<Presentation> {
        let pipeline = GraphicsPipelineBuilder::new(swapchain.extent())
            .vertex_shader(&self.vertex_shader)
            .fragment_shader(&self.fragment_shader)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .cull_mode(CullMode::None)
            .depth_test(true, true)
            .build(
                self.device.clone(),
                &self.pipeline_layout,
                swapchain.render_pass(),
            )?;

        let bindings = FrameBindings::new(
            self.device.clone(),
            &self.set_layout,
            swapchain.image_count(),
            self.meshes.len(),
            self.texture.binding(),
        )?;

        let target = PassTarget {
            render_pass: swapchain.render_pass().handle(),
            extent: swapchain.extent(),
            pipeline_layout: self.pipeline_layout.handle(),
            clear_color: self.clear_color,
        };
        let command_buffers = commands::record_all(
            &self.command_pool,
            &swapchain,
            pipeline.handle(),
            &target,
            &self.meshes,
            &bindings,
        )?;

        Ok(Presentation {
            command_buffers,
            bindings,
            pipeline,
            swapchain,
        })
    }

    /// Idles the device, tears down the swapchain group and builds a new one.
    fn rebuild_presentation(&mut self, size_source: &dyn FramebufferSizeSource) -> RhiResult<usize> {
        self.device.wait_idle()?;

        let Presentation {
            command_buffers,
            bindings,
            pipeline,
            swapchain,
        } = self
            .presentation
            .take()
            .ok_or_else(|| RhiError::SwapchainError("Swapchain is not built".to_string()))?;

        self.command_pool.free_command_buffers(&command_buffers);
        drop(bindings);
        drop(pipeline);

        let swapchain = swapchain.rebuild(&self.surface_context, size_source)?;
        let presentation = self.build_presentation(swapchain)?;
        let image_count = presentation.swapchain.image_count();
        self.presentation = Some(presentation);
        Ok(image_count)
    }
}

/// CPU-side scene the renderer draws.
struct SceneState {
    objects: Vec<GameObject>,
    camera: Camera,
}

/// One frame's view of the renderer, handed to the pacer.
struct FrameContext<'a> {
    gpu: &'a mut GpuState,
    scene: &'a SceneState,
    size_source: &'a dyn FramebufferSizeSource,
    elapsed_secs: f32,
}

impl FrameBackend for FrameContext<'_> {
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.gpu.slots[slot].in_flight_fence().wait(u64::MAX)
    }

    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
        let semaphore = self.gpu.slots[slot].image_available();
        self.gpu
            .presentation()?
            .swapchain
            .acquire_next_image(semaphore)
    }

    fn prepare_image(&mut self, image_index: u32) -> RhiResult<()> {
        let presentation = self.gpu.presentation()?;
        let aspect = presentation.swapchain.aspect_ratio();

        for (object_index, object) in self.scene.objects.iter().enumerate() {
            let data =
                UniformData::for_object(object, &self.scene.camera, aspect, self.elapsed_secs);
            presentation
                .bindings
                .write_uniforms(image_index as usize, object_index, &data)?;
        }
        Ok(())
    }

    fn submit(&mut self, slot: usize, image_index: u32) -> RhiResult<()> {
        let presentation = self.gpu.presentation()?;
        let slot = &self.gpu.slots[slot];

        let wait_semaphores = [slot.image_available()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [slot.render_finished()];
        let command_buffers = [presentation.command_buffers[image_index as usize].handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // Reset only right before the submit that signals it again.
        slot.in_flight_fence().reset()?;
        unsafe {
            self.gpu.device.submit(
                QueueKind::Graphics,
                &[submit_info],
                slot.in_flight_fence().handle(),
            )
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome> {
        let queue = self.gpu.device.queue(QueueKind::Present);
        let wait = self.gpu.slots[slot].render_finished();
        self.gpu
            .presentation()?
            .swapchain
            .present(queue, image_index, wait)
    }

    fn rebuild_swapchain(&mut self) -> RhiResult<usize> {
        self.gpu.rebuild_presentation(self.size_source)
    }

    fn surface_ready(&self) -> bool {
        let (width, height) = self.size_source.framebuffer_size();
        width > 0 && height > 0
    }
}

/// Owns the GPU state, the scene, and the frame loop.
pub struct Renderer {
    gpu: ManuallyDrop<GpuState>,
    scene: SceneState,
    pacer: FramePacer,
    timer: FrameTimer,
}

impl Renderer {
    /// Initializes Vulkan for `window` and uploads `objects` and `texture`.
    ///
    /// # Errors
    ///
    /// Every failure here is fatal: no suitable device, a missing shader,
    /// an unknown feature name, or a resource that cannot be created.
    pub fn new(
        window: &Window,
        config: &Config,
        objects: Vec<GameObject>,
        texture: &TextureData,
    ) -> RendererResult<Self> {
        if objects.is_empty() {
            return Err(RendererError::InvalidScene("no objects to draw".to_string()));
        }
        if let Some(object) = objects.iter().find(|o| !o.mesh().is_well_formed()) {
            return Err(RendererError::InvalidScene(format!(
                "mesh of '{}' has out-of-range or incomplete indices",
                object.name()
            )));
        }

        let requirements = device_requirements(&config.device)?;

        let instance = Instance::new(config.renderer.validation, &window.required_extensions()?)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device = select_physical_device(
            instance.handle(),
            surface.handle(),
            surface.loader(),
            &requirements,
        )?;
        let depth_format = find_depth_format(instance.handle(), physical_device.device)?;
        let device = Device::new(&instance, &physical_device, &requirements)?;

        let surface_context =
            SurfaceContext::new(&instance, device.clone(), surface.handle(), depth_format);

        let (meshes, texture) = {
            let uploader = GpuTransfer::new(device.clone())?;
            let meshes = upload_meshes(&uploader, &objects)?;
            let texture = upload_texture(&uploader, device.clone(), texture)?;
            (meshes, texture)
        };

        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &config.renderer.vertex_shader,
            ShaderStage::Vertex,
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &config.renderer.fragment_shader,
            ShaderStage::Fragment,
        )?;

        let set_layout = bindings::create_set_layout(device.clone())?;
        let pipeline_layout = PipelineLayout::new(device.clone(), &[set_layout.handle()])?;

        let command_pool =
            CommandPool::new(device.clone(), device.queue_family(QueueKind::Graphics))?;
        let slots = FrameSlot::create_slots(&device, config.renderer.frames_in_flight)?;

        let mut gpu = GpuState {
            presentation: None,
            meshes,
            texture,
            pipeline_layout,
            set_layout,
            vertex_shader,
            fragment_shader,
            command_pool,
            slots,
            surface_context,
            clear_color: config.renderer.clear_color,
            device,
            surface,
            instance,
        };

        let swapchain = SwapchainState::build(&gpu.surface_context, window)?;
        let presentation = gpu.build_presentation(swapchain)?;
        let image_count = presentation.swapchain.image_count();
        gpu.presentation = Some(presentation);

        let pacer = FramePacer::new(config.renderer.frames_in_flight, image_count);

        info!(
            "Renderer initialized: {} object(s), {} swapchain image(s), {} frame(s) in flight, validation {}",
            objects.len(),
            image_count,
            pacer.frames_in_flight(),
            if gpu.instance.has_validation() { "on" } else { "off" }
        );

        Ok(Self {
            gpu: ManuallyDrop::new(gpu),
            scene: SceneState {
                objects,
                camera: Camera::default(),
            },
            pacer,
            timer: FrameTimer::new(),
        })
    }

    /// Runs one iteration of the frame loop.
    ///
    /// `window` is polled for its size if the swapchain has to be rebuilt.
    pub fn draw_frame(&mut self, window: &dyn FramebufferSizeSource) -> RendererResult<FrameOutcome> {
        let mut context = FrameContext {
            gpu: &mut self.gpu,
            scene: &self.scene,
            size_source: window,
            elapsed_secs: self.timer.elapsed_secs(),
        };

        let outcome = self.pacer.draw_frame(&mut context)?;
        if matches!(outcome, FrameOutcome::Presented { .. }) {
            self.timer.tick();
        }
        Ok(outcome)
    }

    /// Marks the swapchain stale; it is rebuilt after the next present.
    pub fn request_resize(&mut self) {
        debug!("Resize requested");
        self.pacer.request_resize();
    }

    /// Blocks until the GPU has finished all submitted work.
    pub fn wait_idle(&self) -> RendererResult<()> {
        self.gpu.device.wait_idle()?;
        Ok(())
    }

    pub fn validation_enabled(&self) -> bool {
        self.gpu.instance.has_validation()
    }

    pub fn frame_stats(&self) -> FrameStats {
        self.pacer.stats()
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.gpu
            .presentation
            .as_ref()
            .map(|p| p.swapchain.extent())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.gpu.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {:?}", e);
        }

        let stats = self.pacer.stats();
        info!(
            "Renderer shutting down: {} frame(s) presented, {} skipped, {} swapchain rebuild(s), {:.1} fps average",
            stats.frames_presented,
            stats.frames_skipped,
            stats.rebuilds,
            self.timer.average_fps()
        );

        // SAFETY: the device is idle and `gpu` is never touched again.
        unsafe {
            ManuallyDrop::drop(&mut self.gpu);
        }
    }
}

fn upload_meshes(uploader: &GpuTransfer, objects: &[GameObject]) -> RhiResult<Vec<GpuMesh>> {
    objects
        .iter()
        .map(|object| {
            let mesh = object.mesh();
            let vertex_buffer = transfer::upload_buffer(
                uploader,
                mesh.vertex_bytes(),
                BufferUsage::Vertex,
                QueueKind::Transfer,
            )?;
            let index_buffer = transfer::upload_buffer(
                uploader,
                mesh.index_bytes(),
                BufferUsage::Index,
                QueueKind::Transfer,
            )?;
            debug!(
                "Uploaded '{}': {} vertices, {} indices",
                object.name(),
                mesh.vertices.len(),
                mesh.indices.len()
            );

            Ok(GpuMesh {
                vertex_buffer,
                index_buffer,
                index_count: mesh.index_count(),
            })
        })
        .collect()
}

fn upload_texture(
    uploader: &GpuTransfer,
    device: Arc<Device>,
    texture: &TextureData,
) -> RhiResult<SampledTexture> {
    let extent = vk::Extent2D {
        width: texture.width,
        height: texture.height,
    };
    let image = transfer::upload_image(
        uploader,
        &texture.pixels,
        ImageDesc::texture(extent, TEXTURE_FORMAT),
    )?;
    let view = ImageView::new(
        device.clone(),
        image.handle(),
        TEXTURE_FORMAT,
        vk::ImageAspectFlags::COLOR,
    )?;
    let sampler = Sampler::new(device)?;

    debug!("Uploaded {}x{} texture", extent.width, extent.height);

    Ok(SampledTexture {
        sampler,
        view,
        image,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_requirements() {
        let requirements = device_requirements(&DeviceConfig::default()).unwrap();
        assert!(requirements.requires(DeviceFeature::GeometryShader));
        assert!(requirements.requires(DeviceFeature::SamplerAnisotropy));
        assert!(requirements.require_discrete);
    }

    #[test]
    fn test_profile_and_extra_features() {
        let config = DeviceConfig {
            capability_profile: FeatureProfile::V1,
            extra_features: vec!["fill_mode_non_solid".to_string()],
            require_discrete: false,
        };
        let requirements = device_requirements(&config).unwrap();

        assert!(requirements.requires(DeviceFeature::GeometryShader));
        assert!(!requirements.requires(DeviceFeature::SamplerAnisotropy));
        assert!(requirements.requires(DeviceFeature::FillModeNonSolid));
        assert!(!requirements.require_discrete);
    }

    #[test]
    fn test_unknown_feature_is_rejected() {
        let config = DeviceConfig {
            extra_features: vec!["ray_tracing".to_string()],
            ..DeviceConfig::default()
        };
        let err = device_requirements(&config).unwrap_err();
        assert!(matches!(err, RendererError::UnknownFeature(ref name) if name == "ray_tracing"));
    }
}
