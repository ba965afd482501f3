//! Vulkan instance, validation layer and debug messenger.
//!
//! Layer and extension negotiation is done on plain name lists first
//! ([`InstancePlan::negotiate`]) so the decisions can be checked without a
//! loader; [`Instance::new`] only gathers those lists and applies the plan.
//!
//! # Example
//!
//! ```no_run
//! use lumen_rhi::instance::Instance;
//!
//! // Surface extensions normally come from the window; none are needed headless.
//! let instance = Instance::new(cfg!(debug_assertions), &[])
//!     .expect("Failed to create Vulkan instance");
//!
//! let loader = instance.entry();
//! let handle = instance.handle();
//! ```

use std::borrow::Cow;
use std::ffi::{CStr, CString, c_char, c_void};

use ash::{Entry, vk};
use tracing::{debug, error, info, trace, warn};

use crate::error::{RhiError, RhiResult};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

const APP_NAME: &CStr = c"Lumen";
const APP_VERSION: u32 = vk::make_api_version(0, 0, 1, 0);

/// Layers and extensions the instance will be created with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstancePlan {
    pub layers: Vec<&'static CStr>,
    pub extensions: Vec<CString>,
    pub validation: bool,
}

impl InstancePlan {
    /// Decides the final layer and extension lists.
    ///
    /// Validation is dropped with a warning when the layer is not installed.
    /// Any other requested extension that is missing is fatal.
    pub fn negotiate(
        want_validation: bool,
        required: &[&CStr],
        available_layers: &[&CStr],
        available_extensions: &[&CStr],
    ) -> RhiResult<Self> {
        let validation = want_validation && available_layers.contains(&VALIDATION_LAYER);
        if want_validation && !validation {
            warn!(
                "{} requested but not installed, continuing without validation",
                VALIDATION_LAYER.to_string_lossy()
            );
        }

        let mut extensions: Vec<CString> = required.iter().map(|&e| e.to_owned()).collect();
        if validation {
            extensions.push(ash::ext::debug_utils::NAME.to_owned());
        }

        if let Some(missing) = extensions
            .iter()
            .find(|e| !available_extensions.contains(&e.as_c_str()))
        {
            return Err(RhiError::MissingInstanceSupport(format!(
                "extension {} is not supported",
                missing.to_string_lossy()
            )));
        }

        Ok(Self {
            layers: if validation { vec![VALIDATION_LAYER] } else { Vec::new() },
            extensions,
            validation,
        })
    }
}

/// Owns the loader, the instance and (with validation) the debug messenger.
pub struct Instance {
    entry: Entry,
    instance: ash::Instance,
    messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl Instance {
    /// Loads Vulkan and creates an instance exposing `window_extensions`.
    ///
    /// # Errors
    ///
    /// Fails when the loader is missing, a required extension is unsupported,
    /// or instance / messenger creation fails.
    pub fn new(enable_validation: bool, window_extensions: &[*const c_char]) -> RhiResult<Self> {
        let entry = unsafe { Entry::load()? };

        let layer_props = unsafe { entry.enumerate_instance_layer_properties()? };
        let extension_props = unsafe { entry.enumerate_instance_extension_properties(None)? };
        let layers: Vec<&CStr> = layer_props
            .iter()
            .filter_map(|p| p.layer_name_as_c_str().ok())
            .collect();
        let extensions: Vec<&CStr> = extension_props
            .iter()
            .filter_map(|p| p.extension_name_as_c_str().ok())
            .collect();
        let required: Vec<&CStr> = window_extensions
            .iter()
            .map(|&p| unsafe { CStr::from_ptr(p) })
            .collect();

        let plan = InstancePlan::negotiate(enable_validation, &required, &layers, &extensions)?;
        for ext in &plan.extensions {
            debug!("Instance extension {}", ext.to_string_lossy());
        }

        let app_info = vk::ApplicationInfo::default()
            .application_name(APP_NAME)
            .application_version(APP_VERSION)
            .engine_name(APP_NAME)
            .engine_version(APP_VERSION)
            .api_version(vk::API_VERSION_1_1);
        let layer_ptrs: Vec<*const c_char> = plan.layers.iter().map(|l| l.as_ptr()).collect();
        let extension_ptrs: Vec<*const c_char> =
            plan.extensions.iter().map(|e| e.as_ptr()).collect();

        // Chained so instance creation and destruction are validated too.
        let mut creation_messenger = messenger_info();
        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);
        if plan.validation {
            create_info = create_info.push_next(&mut creation_messenger);
        }

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let messenger = if plan.validation {
            let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
            match unsafe { loader.create_debug_utils_messenger(&messenger_info(), None) } {
                Ok(handle) => Some((loader, handle)),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        info!(
            "Vulkan instance created ({} extension(s), validation {})",
            plan.extensions.len(),
            if plan.validation { "on" } else { "off" }
        );

        Ok(Self {
            entry,
            instance,
            messenger,
        })
    }

    #[inline]
    pub fn handle(&self) -> &ash::Instance {
        &self.instance
    }

    #[inline]
    pub fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Whether validation messages are being routed to the log.
    #[inline]
    pub fn has_validation(&self) -> bool {
        self.messenger.is_some()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, handle)) = self.messenger.take() {
                loader.destroy_debug_utils_messenger(handle, None);
            }
            self.instance.destroy_instance(None);
        }
        info!("Vulkan instance destroyed");
    }
}

fn messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(on_validation_message))
}

fn message_kind(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

/// Forwards a layer message to `tracing` at the matching level.
///
/// # Safety
///
/// Called by the loader with a valid (or null) callback data pointer.
unsafe extern "system" fn on_validation_message(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user_data: *mut c_void,
) -> vk::Bool32 {
    let message = match unsafe { data.as_ref() } {
        Some(data) if !data.p_message.is_null() => unsafe {
            CStr::from_ptr(data.p_message).to_string_lossy()
        },
        _ => Cow::Borrowed("(empty message)"),
    };
    let kind = message_kind(message_type);

    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "lumen::vulkan", kind, "{}", message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "lumen::vulkan", kind, "{}", message);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(target: "lumen::vulkan", kind, "{}", message);
    } else {
        trace!(target: "lumen::vulkan", kind, "{}", message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    const SURFACE: &CStr = c"VK_KHR_surface";
    const XCB: &CStr = c"VK_KHR_xcb_surface";

    #[test]
    fn test_negotiate_with_validation_installed() {
        let debug_utils = ash::ext::debug_utils::NAME;
        let plan = InstancePlan::negotiate(
            true,
            &[SURFACE, XCB],
            &[VALIDATION_LAYER],
            &[SURFACE, XCB, debug_utils],
        )
        .unwrap();

        assert!(plan.validation);
        assert_eq!(plan.layers, vec![VALIDATION_LAYER]);
        assert_eq!(plan.extensions.len(), 3);
        assert_eq!(plan.extensions[2].as_c_str(), debug_utils);
    }

    #[test]
    fn test_missing_validation_layer_is_not_fatal() {
        let plan = InstancePlan::negotiate(true, &[SURFACE], &[], &[SURFACE]).unwrap();

        assert!(!plan.validation);
        assert!(plan.layers.is_empty());
        assert_eq!(plan.extensions, vec![SURFACE.to_owned()]);
    }

    #[test]
    fn test_missing_required_extension_is_fatal() {
        let err = InstancePlan::negotiate(false, &[SURFACE, XCB], &[], &[SURFACE]).unwrap_err();

        match err {
            RhiError::MissingInstanceSupport(msg) => assert!(msg.contains("VK_KHR_xcb_surface")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_message_kind_prefers_validation() {
        let both = vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE;
        assert_eq!(message_kind(both), "validation");
        assert_eq!(
            message_kind(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE),
            "performance"
        );
        assert_eq!(message_kind(vk::DebugUtilsMessageTypeFlagsEXT::GENERAL), "general");
    }

    #[test]
    fn test_messenger_covers_verbose_warning_error() {
        let info = messenger_info();
        let severity = info.message_severity;
        assert!(severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE));
        assert!(severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING));
        assert!(severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
        assert!(!severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO));
        assert!(info.pfn_user_callback.is_some());
    }

    #[test]
    fn test_instance_creation_without_validation() {
        // Needs a Vulkan loader and driver; skipped otherwise.
        match Instance::new(false, &[]) {
            Ok(instance) => assert!(!instance.has_validation()),
            Err(e) => eprintln!("Skipping test: Vulkan not available ({e})"),
        }
    }
}
