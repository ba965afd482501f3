//! Swapchain management.
//!
//! This module owns the presentation group: the VkSwapchainKHR, its image
//! views, the depth buffer, the render pass, and one framebuffer per image.
//! The group is built and torn down as a unit by [`SwapchainState`].
//!
//! # Overview
//!
//! - [`SwapchainSupportDetails`] queries surface capabilities
//! - [`SwapchainSettings`] chooses format, present mode, extent and image count
//! - [`FramebufferSizeSource`] is how the window reports its size while minimized
//! - [`SwapchainState`] builds, presents through, and rebuilds the group
//!
//! Out-of-date and suboptimal results from acquire/present are reported as
//! [`AcquireOutcome`] / [`PresentOutcome`] values, not errors.
//!
//! # Example
//!
//! ```no_run
//! use lumen_rhi::swapchain::{SurfaceContext, SwapchainState, FramebufferSizeSource};
//!
//! # fn example(
//! #     context: &SurfaceContext,
//! #     window: &dyn FramebufferSizeSource,
//! # ) -> Result<(), lumen_rhi::RhiError> {
//! let state = SwapchainState::build(context, window)?;
//! println!("{} images at {:?}", state.image_count(), state.extent());
//!
//! // After a resize:
//! let state = state.rebuild(context, window)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::{Device, QueueKind};
use crate::error::{RhiError, RhiResult};
use crate::image::{DepthBuffer, ImageView};
use crate::render_pass::{Framebuffer, RenderPass};

/// Preferred surface format.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Window-side collaborator queried while building the swapchain.
pub trait FramebufferSizeSource {
    /// Current framebuffer size in pixels.
    fn framebuffer_size(&self) -> (u32, u32);

    /// Blocks until the window system has something new to report.
    fn wait_events(&self);
}

/// Polls `source` until both dimensions are nonzero.
pub fn wait_for_nonzero_size(source: &dyn FramebufferSizeSource) -> (u32, u32) {
    let mut size = source.framebuffer_size();
    if size.0 == 0 || size.1 == 0 {
        debug!("Framebuffer is {}x{}, waiting for the window", size.0, size.1);
    }
    while size.0 == 0 || size.1 == 0 {
        source.wait_events();
        size = source.framebuffer_size();
    }
    size
}

/// Surface capabilities, formats, and present modes.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };

        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// The choices a swapchain is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainSettings {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

impl SwapchainSettings {
    /// Chooses settings for `support`, blocking while the window is minimized.
    ///
    /// # Errors
    ///
    /// Returns an error if the surface advertises no formats.
    pub fn choose(
        support: &SwapchainSupportDetails,
        size_source: &dyn FramebufferSizeSource,
    ) -> RhiResult<Self> {
        let surface_format = choose_surface_format(&support.formats).ok_or_else(|| {
            RhiError::SwapchainError("Surface advertises no formats".to_string())
        })?;

        Ok(Self {
            surface_format,
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, size_source),
            image_count: determine_image_count(&support.capabilities),
        })
    }
}

/// Prefers [`PREFERRED_SURFACE_FORMAT`], otherwise the first advertised format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    let preferred = formats.iter().find(|f| {
        f.format == PREFERRED_SURFACE_FORMAT.format
            && f.color_space == PREFERRED_SURFACE_FORMAT.color_space
    });

    match preferred {
        Some(&format) => Some(format),
        None => {
            let first = formats.first().copied();
            if let Some(format) = first {
                warn!("Using first available surface format: {:?}", format);
            }
            first
        }
    }
}

/// MAILBOX when offered, otherwise FIFO, which every surface supports.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Chooses the swapchain extent.
///
/// A surface with a fixed extent dictates it. Otherwise the framebuffer size is
/// clamped into the surface limits, first waiting until the window is no
/// longer minimized. The result never has a zero dimension.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    size_source: &dyn FramebufferSizeSource,
) -> vk::Extent2D {
    let current = capabilities.current_extent;
    if current.width != u32::MAX && current.width > 0 && current.height > 0 {
        return current;
    }

    let (width, height) = wait_for_nonzero_size(size_source);

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: clamp_dimension(width, min.width, max.width),
        height: clamp_dimension(height, min.height, max.height),
    }
}

/// A zero maximum comes from a surface queried while minimized and carries no
/// limit; the window size is taken as is.
fn clamp_dimension(value: u32, min: u32, max: u32) -> u32 {
    if max == 0 {
        value
    } else {
        value.clamp(min.clamp(1, max), max)
    }
}

/// Queries surface support once the window has a nonzero framebuffer.
///
/// A minimized surface reports a 0x0 current extent and 0x0 limits, so the
/// query only happens after [`wait_for_nonzero_size`] returns.
pub fn query_restored_support<F>(
    size_source: &dyn FramebufferSizeSource,
    mut query: F,
) -> RhiResult<SwapchainSupportDetails>
where
    F: FnMut() -> RhiResult<SwapchainSupportDetails>,
{
    wait_for_nonzero_size(size_source);
    query()
}

/// `min + 1`, capped by the maximum when the surface has one.
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    // A max of 0 means no upper bound
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// Result of asking for the next presentable image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image was acquired. `suboptimal` asks for a rebuild after presenting.
    Acquired { image_index: u32, suboptimal: bool },
    /// The surface changed; nothing was acquired.
    OutOfDate,
}

/// Result of presenting an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Suboptimal,
    OutOfDate,
}

impl PresentOutcome {
    #[inline]
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, PresentOutcome::Presented)
    }
}

/// Long-lived objects every swapchain build needs.
pub struct SurfaceContext {
    pub device: Arc<Device>,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub depth_format: vk::Format,
}

impl SurfaceContext {
    pub fn new(
        instance: &crate::instance::Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        depth_format: vk::Format,
    ) -> Self {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        Self {
            device,
            surface,
            surface_loader,
            swapchain_loader,
            depth_format,
        }
    }
}

struct SwapchainHandle {
    loader: ash::khr::swapchain::Device,
    handle: vk::SwapchainKHR,
}

impl Drop for SwapchainHandle {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

/// The presentation group rebuilt on resize.
///
/// Fields drop in declaration order: framebuffers, image views, depth buffer,
/// render pass, then the swapchain itself.
pub struct SwapchainState {
    framebuffers: Vec<Framebuffer>,
    #[allow(dead_code)]
    image_views: Vec<ImageView>,
    #[allow(dead_code)]
    depth: DepthBuffer,
    render_pass: RenderPass,
    swapchain: SwapchainHandle,
    /// Owned by the swapchain; never destroyed individually.
    images: Vec<vk::Image>,
    settings: SwapchainSettings,
}

impl SwapchainState {
    /// Builds the swapchain and everything sized to it.
    ///
    /// Blocks while the window reports a zero-sized framebuffer.
    pub fn build(
        context: &SurfaceContext,
        size_source: &dyn FramebufferSizeSource,
    ) -> RhiResult<Self> {
        let device = &context.device;

        let support = query_restored_support(size_source, || {
            SwapchainSupportDetails::query(
                device.physical_device(),
                context.surface,
                &context.surface_loader,
            )
        })?;
        if !support.is_adequate() {
            return Err(RhiError::SwapchainError(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let settings = SwapchainSettings::choose(&support, size_source)?;

        info!(
            "Creating swapchain: {}x{}, format {:?}, present mode {:?}, {} images",
            settings.extent.width,
            settings.extent.height,
            settings.surface_format.format,
            settings.present_mode,
            settings.image_count
        );

        let graphics_family = device.queue_family(QueueKind::Graphics);
        let present_family = device.queue_family(QueueKind::Present);
        let shared_families = [graphics_family, present_family];

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(context.surface)
            .min_image_count(settings.image_count)
            .image_format(settings.surface_format.format)
            .image_color_space(settings.surface_format.color_space)
            .image_extent(settings.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(settings.present_mode)
            .clipped(true);

        if graphics_family != present_family {
            create_info = create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&shared_families);
        }

        let handle = unsafe { context.swapchain_loader.create_swapchain(&create_info, None)? };
        let swapchain = SwapchainHandle {
            loader: context.swapchain_loader.clone(),
            handle,
        };

        let images = unsafe { context.swapchain_loader.get_swapchain_images(handle)? };

        let image_views = images
            .iter()
            .map(|&image| {
                ImageView::new(
                    device.clone(),
                    image,
                    settings.surface_format.format,
                    vk::ImageAspectFlags::COLOR,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let render_pass = RenderPass::new(
            device.clone(),
            settings.surface_format.format,
            context.depth_format,
        )?;

        let depth = DepthBuffer::new(device.clone(), settings.extent, context.depth_format)?;

        let framebuffers = image_views
            .iter()
            .map(|view| {
                Framebuffer::new(
                    device.clone(),
                    &render_pass,
                    view.handle(),
                    depth.image_view(),
                    settings.extent,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        info!("Swapchain created with {} images", images.len());

        Ok(Self {
            framebuffers,
            image_views,
            depth,
            render_pass,
            swapchain,
            images,
            settings,
        })
    }

    /// Idles the device, tears this group down, and builds a new one.
    pub fn rebuild(
        self,
        context: &SurfaceContext,
        size_source: &dyn FramebufferSizeSource,
    ) -> RhiResult<Self> {
        context.device.wait_idle()?;
        let old_extent = self.extent();
        drop(self);

        let rebuilt = Self::build(context, size_source)?;
        info!(
            "Swapchain rebuilt: {}x{} -> {}x{}",
            old_extent.width,
            old_extent.height,
            rebuilt.extent().width,
            rebuilt.extent().height
        );
        Ok(rebuilt)
    }

    /// Requests the next image, signaling `semaphore` when it is available.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain.loader.acquire_next_image(
                self.swapchain.handle,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    /// Presents `image_index` once `wait_semaphore` is signaled.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<PresentOutcome> {
        let swapchains = [self.swapchain.handle];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain.loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.settings.surface_format.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.settings.extent
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        self.settings.extent.width as f32 / self.settings.extent.height as f32
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }

    #[inline]
    pub fn framebuffer(&self, index: usize) -> &Framebuffer {
        &self.framebuffers[index]
    }
}

impl Drop for SwapchainState {
    fn drop(&mut self) {
        debug!(
            "Tearing down swapchain ({}x{}, {} images)",
            self.settings.extent.width,
            self.settings.extent.height,
            self.images.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    use super::*;

    /// Reports queued sizes one `wait_events` at a time.
    struct ScriptedWindow {
        sizes: RefCell<VecDeque<(u32, u32)>>,
        waits: Cell<usize>,
    }

    impl ScriptedWindow {
        fn new(sizes: &[(u32, u32)]) -> Self {
            Self {
                sizes: RefCell::new(sizes.iter().copied().collect()),
                waits: Cell::new(0),
            }
        }
    }

    impl FramebufferSizeSource for ScriptedWindow {
        fn framebuffer_size(&self) -> (u32, u32) {
            *self.sizes.borrow().front().expect("script exhausted")
        }

        fn wait_events(&self) {
            self.waits.set(self.waits.get() + 1);
            let mut sizes = self.sizes.borrow_mut();
            if sizes.len() > 1 {
                sizes.pop_front();
            }
        }
    }

    fn free_extent_capabilities() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 100,
                height: 100,
            },
            max_image_extent: vk::Extent2D {
                width: 2000,
                height: 2000,
            },
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_bgra_unorm_nonlinear() {
        let formats = vec![
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected, PREFERRED_SURFACE_FORMAT);
    }

    #[test]
    fn test_choose_surface_format_fallback_to_first() {
        let formats = vec![
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
        ];

        let selected = choose_surface_format(&formats).unwrap();
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn test_choose_present_mode_prefers_mailbox() {
        let modes = vec![
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn test_choose_present_mode_fallback_to_fifo() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(choose_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1920,
                height: 1080,
            },
            ..free_extent_capabilities()
        };
        let window = ScriptedWindow::new(&[(800, 600)]);

        let extent = choose_extent(&capabilities, &window);
        assert_eq!((extent.width, extent.height), (1920, 1080));
        assert_eq!(window.waits.get(), 0);
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let capabilities = free_extent_capabilities();

        let extent = choose_extent(&capabilities, &ScriptedWindow::new(&[(3000, 3000)]));
        assert_eq!((extent.width, extent.height), (2000, 2000));

        let extent = choose_extent(&capabilities, &ScriptedWindow::new(&[(50, 50)]));
        assert_eq!((extent.width, extent.height), (100, 100));

        let extent = choose_extent(&capabilities, &ScriptedWindow::new(&[(800, 600)]));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_choose_extent_blocks_while_minimized() {
        let capabilities = free_extent_capabilities();
        let window = ScriptedWindow::new(&[(0, 0), (0, 0), (640, 0), (1024, 768)]);

        let extent = choose_extent(&capabilities, &window);
        assert_eq!((extent.width, extent.height), (1024, 768));
        assert_eq!(window.waits.get(), 3);
    }

    #[test]
    fn test_choose_extent_ignores_zero_current_extent() {
        // Some platforms report a fixed 0x0 extent while minimized.
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 0,
                height: 0,
            },
            ..free_extent_capabilities()
        };
        let window = ScriptedWindow::new(&[(0, 0), (400, 300)]);

        let extent = choose_extent(&capabilities, &window);
        assert_eq!((extent.width, extent.height), (400, 300));
        assert_eq!(window.waits.get(), 1);
    }

    fn minimized_capabilities() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D::default(),
            min_image_extent: vk::Extent2D::default(),
            max_image_extent: vk::Extent2D::default(),
            min_image_count: 2,
            max_image_count: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_choose_extent_with_minimized_limits_keeps_window_size() {
        let window = ScriptedWindow::new(&[(0, 0), (800, 600)]);

        let extent = choose_extent(&minimized_capabilities(), &window);
        assert_eq!((extent.width, extent.height), (800, 600));
        assert_eq!(window.waits.get(), 1);
    }

    #[test]
    fn test_clamp_dimension_tolerates_inverted_minimum() {
        assert_eq!(clamp_dimension(50, 0, 0), 50);
        assert_eq!(clamp_dimension(50, 200, 100), 100);
        assert_eq!(clamp_dimension(0, 0, 100), 1);
    }

    #[test]
    fn test_support_is_queried_after_window_is_restored() {
        let window = ScriptedWindow::new(&[(0, 0), (0, 0), (800, 600)]);
        let queries = Cell::new(0);

        // The surface reports fixed 800x600 limits once restored, 0x0 before.
        let support = query_restored_support(&window, || {
            queries.set(queries.get() + 1);
            let capabilities = if window.framebuffer_size() == (0, 0) {
                minimized_capabilities()
            } else {
                vk::SurfaceCapabilitiesKHR {
                    current_extent: vk::Extent2D {
                        width: 800,
                        height: 600,
                    },
                    min_image_extent: vk::Extent2D {
                        width: 1,
                        height: 1,
                    },
                    max_image_extent: vk::Extent2D {
                        width: 4096,
                        height: 4096,
                    },
                    ..minimized_capabilities()
                }
            };
            Ok(SwapchainSupportDetails {
                capabilities,
                formats: vec![PREFERRED_SURFACE_FORMAT],
                present_modes: vec![vk::PresentModeKHR::FIFO],
            })
        })
        .unwrap();

        assert_eq!(queries.get(), 1);
        assert_eq!(window.waits.get(), 2);
        assert_eq!(support.capabilities.max_image_extent.width, 4096);

        let settings = SwapchainSettings::choose(&support, &window).unwrap();
        assert_eq!(
            (settings.extent.width, settings.extent.height),
            (800, 600)
        );
    }

    #[test]
    fn test_determine_image_count() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 2);

        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 3);

        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(determine_image_count(&capabilities), 4);
    }

    #[test]
    fn test_settings_are_stable_for_repeated_builds() {
        let support = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 3,
                ..free_extent_capabilities()
            },
            formats: vec![PREFERRED_SURFACE_FORMAT],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let window = ScriptedWindow::new(&[(1280, 720)]);

        let first = SwapchainSettings::choose(&support, &window).unwrap();
        let second = SwapchainSettings::choose(&support, &window).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            (first.extent.width, first.extent.height),
            (1280, 720)
        );
        assert_eq!(first.image_count, 3);
    }

    #[test]
    fn test_settings_reject_surface_without_formats() {
        let support = SwapchainSupportDetails {
            capabilities: free_extent_capabilities(),
            formats: vec![],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        let window = ScriptedWindow::new(&[(1, 1)]);
        assert!(SwapchainSettings::choose(&support, &window).is_err());
    }

    #[test]
    fn test_swapchain_support_details_is_adequate() {
        let adequate = SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR::default()],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };
        assert!(adequate.is_adequate());

        let no_formats = SwapchainSupportDetails {
            formats: vec![],
            ..adequate.clone()
        };
        assert!(!no_formats.is_adequate());

        let no_modes = SwapchainSupportDetails {
            present_modes: vec![],
            ..adequate
        };
        assert!(!no_modes.is_adequate());
    }

    #[test]
    fn test_present_outcome_needs_rebuild() {
        assert!(!PresentOutcome::Presented.needs_rebuild());
        assert!(PresentOutcome::Suboptimal.needs_rebuild());
        assert!(PresentOutcome::OutOfDate.needs_rebuild());
    }
}
