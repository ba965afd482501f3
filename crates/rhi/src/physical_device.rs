//! Physical device (GPU) selection.
//!
//! Selection is split into a pure part that works on [`AdapterDescription`]
//! values and a thin Vulkan layer that builds those descriptions from the
//! enumerated adapters. The pure part is what decides; the Vulkan layer only
//! gathers facts.
//!
//! # Overview
//!
//! 1. Enumerate all available GPUs
//! 2. Resolve graphics / present / transfer queue families for each
//! 3. Check the [`DeviceRequirements`] (device class, features, extensions,
//!    swapchain adequacy)
//! 4. Return the first adapter that passes every check
//!
//! # Example
//!
//! ```no_run
//! use lumen_rhi::instance::Instance;
//! use lumen_rhi::physical_device::{select_physical_device, DeviceRequirements};
//! use ash::vk;
//!
//! let instance = Instance::new(false, &[]).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let device_info = select_physical_device(
//!     instance.handle(),
//!     surface,
//!     &surface_loader,
//!     &DeviceRequirements::default(),
//! )
//! .expect("Failed to select physical device");
//!
//! println!("Selected GPU: {:?}", device_info.device_name());
//! ```

use std::ffi::{CStr, CString};
use std::fmt;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::swapchain::SwapchainSupportDetails;

/// Device extensions every adapter must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// A single optional device feature the renderer may depend on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceFeature {
    GeometryShader,
    SamplerAnisotropy,
    FillModeNonSolid,
}

impl DeviceFeature {
    /// Whether the adapter reports this feature.
    pub fn is_supported(self, features: &vk::PhysicalDeviceFeatures) -> bool {
        let flag = match self {
            DeviceFeature::GeometryShader => features.geometry_shader,
            DeviceFeature::SamplerAnisotropy => features.sampler_anisotropy,
            DeviceFeature::FillModeNonSolid => features.fill_mode_non_solid,
        };
        flag == vk::TRUE
    }

    /// Turns the feature on in a create-info feature struct.
    pub fn enable(self, features: vk::PhysicalDeviceFeatures) -> vk::PhysicalDeviceFeatures {
        match self {
            DeviceFeature::GeometryShader => features.geometry_shader(true),
            DeviceFeature::SamplerAnisotropy => features.sampler_anisotropy(true),
            DeviceFeature::FillModeNonSolid => features.fill_mode_non_solid(true),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DeviceFeature::GeometryShader => "geometry_shader",
            DeviceFeature::SamplerAnisotropy => "sampler_anisotropy",
            DeviceFeature::FillModeNonSolid => "fill_mode_non_solid",
        }
    }

    /// Parses the configuration spelling of a feature.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "geometry_shader" => Some(DeviceFeature::GeometryShader),
            "sampler_anisotropy" => Some(DeviceFeature::SamplerAnisotropy),
            "fill_mode_non_solid" => Some(DeviceFeature::FillModeNonSolid),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Versioned set of required features.
///
/// New profiles are appended; existing ones never change meaning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CapabilityProfile {
    /// Untextured geometry: geometry shading only.
    V1,
    /// Textured geometry: geometry shading and anisotropic sampling.
    #[default]
    V2,
}

impl CapabilityProfile {
    pub fn features(self) -> &'static [DeviceFeature] {
        match self {
            CapabilityProfile::V1 => &[DeviceFeature::GeometryShader],
            CapabilityProfile::V2 => &[
                DeviceFeature::GeometryShader,
                DeviceFeature::SamplerAnisotropy,
            ],
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "v1" => Some(CapabilityProfile::V1),
            "v2" => Some(CapabilityProfile::V2),
            _ => None,
        }
    }
}

/// Everything an adapter must provide to be selected.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceRequirements {
    pub features: Vec<DeviceFeature>,
    pub extensions: Vec<&'static CStr>,
    pub require_discrete: bool,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self::from_profile(CapabilityProfile::default(), &[], true)
    }
}

impl DeviceRequirements {
    /// Builds requirements from a profile plus any additional features.
    pub fn from_profile(
        profile: CapabilityProfile,
        extra: &[DeviceFeature],
        require_discrete: bool,
    ) -> Self {
        let mut features = profile.features().to_vec();
        for feature in extra {
            if !features.contains(feature) {
                features.push(*feature);
            }
        }

        Self {
            features,
            extensions: REQUIRED_DEVICE_EXTENSIONS.to_vec(),
            require_discrete,
        }
    }

    #[inline]
    pub fn requires(&self, feature: DeviceFeature) -> bool {
        self.features.contains(&feature)
    }

    /// Feature struct to pass at logical device creation.
    pub fn enabled_features(&self) -> vk::PhysicalDeviceFeatures {
        self.features
            .iter()
            .fold(vk::PhysicalDeviceFeatures::default(), |acc, feature| {
                feature.enable(acc)
            })
    }
}

/// Queue family indices for the three kinds of work the renderer submits.
///
/// Any two (or all three) may refer to the same family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the queue family that supports presentation to a surface.
    pub present_family: Option<u32>,
    /// Index of the queue family used for staged uploads.
    pub transfer_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// All three families are resolved.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some()
            && self.present_family.is_some()
            && self.transfer_family.is_some()
    }

    /// Returns the unique queue family indices as a vector.
    ///
    /// Logical device creation needs one queue create info per distinct family.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(3);

        for family in [
            self.graphics_family,
            self.present_family,
            self.transfer_family,
        ]
        .into_iter()
        .flatten()
        {
            if !families.contains(&family) {
                families.push(family);
            }
        }

        families
    }

    /// Whether staged uploads run on a family other than graphics.
    pub fn has_dedicated_transfer(&self) -> bool {
        self.transfer_family.is_some() && self.transfer_family != self.graphics_family
    }
}

/// Resolves queue families in a single scan.
///
/// Graphics and present take the first family that qualifies. Transfer takes
/// the first family that can transfer but not draw or compute; when none
/// exists it falls back to the graphics family.
pub fn resolve_queue_families(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;

        if family.queue_count == 0 {
            continue;
        }

        let flags = family.queue_flags;
        let has_graphics = flags.contains(vk::QueueFlags::GRAPHICS);

        if has_graphics && indices.graphics_family.is_none() {
            indices.graphics_family = Some(i);
        }

        if indices.present_family.is_none() && supports_present(i) {
            indices.present_family = Some(i);
        }

        let transfer_only = flags.contains(vk::QueueFlags::TRANSFER)
            && !has_graphics
            && !flags.contains(vk::QueueFlags::COMPUTE);
        if transfer_only && indices.transfer_family.is_none() {
            indices.transfer_family = Some(i);
        }
    }

    if indices.transfer_family.is_none() {
        indices.transfer_family = indices.graphics_family;
    }

    indices
}

/// Facts about one adapter, gathered up front so selection stays pure.
#[derive(Clone, Debug)]
pub struct AdapterDescription {
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub features: vk::PhysicalDeviceFeatures,
    pub extensions: Vec<CString>,
    pub queue_families: QueueFamilyIndices,
    pub swapchain_adequate: bool,
}

/// Reason an adapter was passed over.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejection {
    NotDiscrete(vk::PhysicalDeviceType),
    IncompleteQueueFamilies(QueueFamilyIndices),
    MissingExtension(String),
    MissingFeature(DeviceFeature),
    InadequateSwapchain,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotDiscrete(ty) => write!(f, "not a discrete GPU ({ty:?})"),
            Rejection::IncompleteQueueFamilies(q) => write!(
                f,
                "missing queue families (graphics={}, present={}, transfer={})",
                q.graphics_family.is_some(),
                q.present_family.is_some(),
                q.transfer_family.is_some()
            ),
            Rejection::MissingExtension(name) => write!(f, "missing extension {name}"),
            Rejection::MissingFeature(feature) => write!(f, "missing feature {feature}"),
            Rejection::InadequateSwapchain => f.write_str("no surface formats or present modes"),
        }
    }
}

/// Checks one adapter against the requirements.
pub fn check_suitability(
    adapter: &AdapterDescription,
    requirements: &DeviceRequirements,
) -> Result<(), Rejection> {
    if requirements.require_discrete && adapter.device_type != vk::PhysicalDeviceType::DISCRETE_GPU
    {
        return Err(Rejection::NotDiscrete(adapter.device_type));
    }

    for feature in &requirements.features {
        if !feature.is_supported(&adapter.features) {
            return Err(Rejection::MissingFeature(*feature));
        }
    }

    for required in &requirements.extensions {
        if !adapter.extensions.iter().any(|ext| ext.as_c_str() == *required) {
            return Err(Rejection::MissingExtension(
                required.to_string_lossy().into_owned(),
            ));
        }
    }

    // Swapchain adequacy is meaningless without the extension, so it comes after.
    if !adapter.swapchain_adequate {
        return Err(Rejection::InadequateSwapchain);
    }

    if !adapter.queue_families.is_complete() {
        return Err(Rejection::IncompleteQueueFamilies(adapter.queue_families));
    }

    Ok(())
}

/// Returns the index of the first adapter that meets every requirement.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableDevice`] listing every rejection.
pub fn select_first_suitable(
    adapters: &[AdapterDescription],
    requirements: &DeviceRequirements,
) -> RhiResult<usize> {
    let mut rejections = Vec::with_capacity(adapters.len());

    for (index, adapter) in adapters.iter().enumerate() {
        match check_suitability(adapter, requirements) {
            Ok(()) => return Ok(index),
            Err(rejection) => {
                debug!("GPU '{}' skipped: {}", adapter.name, rejection);
                rejections.push(format!("{}: {}", adapter.name, rejection));
            }
        }
    }

    if rejections.is_empty() {
        rejections.push("no Vulkan-capable adapters".to_string());
    }

    Err(RhiError::NoSuitableDevice { rejections })
}

/// Information about the selected physical device.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle.
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Supported device features.
    pub features: vk::PhysicalDeviceFeatures,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Resolved queue families (always complete).
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        device_type_name(self.properties.device_type)
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Largest anisotropy level the sampler may request.
    #[inline]
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.properties.limits.max_sampler_anisotropy
    }
}

impl fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

fn device_type_name(ty: vk::PhysicalDeviceType) -> &'static str {
    match ty {
        vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
        vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
        vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
        vk::PhysicalDeviceType::CPU => "CPU",
        _ => "Other",
    }
}

/// Selects the first physical device that satisfies `requirements`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableDevice`] if no adapter qualifies. There is
/// no fallback: without a device nothing else can be created.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
    requirements: &DeviceRequirements,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
    } else {
        info!("Found {} GPU(s)", devices.len());
    }

    let descriptions = devices
        .iter()
        .map(|&device| describe_adapter(instance, device, surface, surface_loader))
        .collect::<RhiResult<Vec<_>>>()?;

    let index = select_first_suitable(&descriptions, requirements)?;
    let device = devices[index];

    let selected = PhysicalDeviceInfo {
        device,
        properties: unsafe { instance.get_physical_device_properties(device) },
        features: descriptions[index].features,
        memory_properties: unsafe { instance.get_physical_device_memory_properties(device) },
        queue_families: descriptions[index].queue_families,
    };

    let (major, minor, patch) = selected.api_version();
    info!(
        "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, queues {:?}",
        selected.device_name(),
        selected.device_type_name(),
        major,
        minor,
        patch,
        selected.queue_families
    );

    Ok(selected)
}

fn describe_adapter(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<AdapterDescription> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let features = unsafe { instance.get_physical_device_features(device) };
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let extensions = unsafe { instance.enumerate_device_extension_properties(device)? }
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok().map(CStr::to_owned))
        .collect();

    let queue_families = resolve_queue_families(&families, |index| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, index, surface)
            .unwrap_or(false)
    });

    let swapchain_adequate = SwapchainSupportDetails::query(device, surface, surface_loader)
        .map(|details| details.is_adequate())
        .unwrap_or(false);

    let name = properties
        .device_name_as_c_str()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "Unknown".to_string());

    Ok(AdapterDescription {
        name,
        device_type: properties.device_type,
        features,
        extensions,
        queue_families,
        swapchain_adequate,
    })
}
