// SPDX-License-Identifier: CEPL-1.0
//! Instance creation, layer/extension checks and the validation messenger.

use std::ffi::{c_char, c_void, CStr};

use ash::{ext::debug_utils, vk, Entry, Instance};
use raw_window_handle::RawDisplayHandle;
use tracing::{debug, error, info, trace, warn};

use crate::error::{RenderError, RenderResult, VkCheck};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const APP_NAME: &CStr = c"OpenMiner";

/// Returns the first requested name absent from `supported`.
pub fn first_missing<'a>(requested: &[&'a CStr], supported: &[&CStr]) -> Option<&'a CStr> {
    requested
        .iter()
        .copied()
        .find(|want| !supported.iter().any(|have| *have == *want))
}

pub(crate) fn fixed_cstr(raw: &[c_char]) -> &CStr {
    // SAFETY: c_char and u8 share size and alignment.
    let bytes = unsafe { std::slice::from_raw_parts(raw.as_ptr().cast::<u8>(), raw.len()) };
    CStr::from_bytes_until_nul(bytes).unwrap_or(c"")
}

unsafe fn check_layers(entry: &Entry, layers: &[&CStr]) -> RenderResult<()> {
    if layers.is_empty() {
        return Ok(());
    }
    let props = entry
        .enumerate_instance_layer_properties()
        .check("vkEnumerateInstanceLayerProperties")?;
    let names: Vec<&CStr> = props.iter().map(|p| fixed_cstr(&p.layer_name)).collect();
    match first_missing(layers, &names) {
        Some(missing) => Err(RenderError::MissingLayer(
            missing.to_string_lossy().into_owned(),
        )),
        None => Ok(()),
    }
}

unsafe fn check_extensions(entry: &Entry, extensions: &[&CStr]) -> RenderResult<()> {
    let props = entry
        .enumerate_instance_extension_properties(None)
        .check("vkEnumerateInstanceExtensionProperties")?;
    let names: Vec<&CStr> = props.iter().map(|p| fixed_cstr(&p.extension_name)).collect();
    match first_missing(extensions, &names) {
        Some(missing) => Err(RenderError::MissingExtension(
            missing.to_string_lossy().into_owned(),
        )),
        None => Ok(()),
    }
}

/// Creates the instance with the window-system extensions and, when
/// `validation` is set, the Khronos validation layer plus debug utils.
pub(crate) unsafe fn create_instance(
    entry: &Entry,
    display_raw: RawDisplayHandle,
    validation: bool,
) -> RenderResult<Instance> {
    let mut extensions: Vec<&CStr> = ash_window::enumerate_required_extensions(display_raw)
        .check("vkEnumerateInstanceExtensionProperties")?
        .iter()
        .map(|&p| CStr::from_ptr(p))
        .collect();
    let mut layers: Vec<&CStr> = Vec::new();
    if validation {
        extensions.push(debug_utils::NAME);
        layers.push(VALIDATION_LAYER);
    }

    check_layers(entry, &layers)?;
    check_extensions(entry, &extensions)?;
    debug!(?extensions, ?layers, "instance requirements satisfied");

    let ext_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();
    let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: APP_NAME.as_ptr(),
        application_version: vk::make_api_version(0, 1, 0, 0),
        p_engine_name: APP_NAME.as_ptr(),
        engine_version: vk::make_api_version(0, 1, 0, 0),
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: ext_ptrs.len() as u32,
        pp_enabled_extension_names: ext_ptrs.as_ptr(),
        enabled_layer_count: layer_ptrs.len() as u32,
        pp_enabled_layer_names: layer_ptrs.as_ptr(),
        ..Default::default()
    };

    let instance = entry
        .create_instance(&create_info, None)
        .check("vkCreateInstance")?;
    info!(validation, "vulkan instance created");
    Ok(instance)
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", ?types, "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", ?types, "{msg}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(target: "vulkan", ?types, "{msg}");
    } else {
        trace!(target: "vulkan", ?types, "{msg}");
    }
    vk::FALSE
}

/// Routes validation-layer messages into `tracing`. Lives between instance
/// creation and instance destruction.
pub struct DebugMessenger {
    loader: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

impl DebugMessenger {
    pub(crate) unsafe fn new(entry: &Entry, instance: &Instance) -> RenderResult<Self> {
        let loader = debug_utils::Instance::new(entry, instance);
        let ci = vk::DebugUtilsMessengerCreateInfoEXT {
            s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
            message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            pfn_user_callback: Some(debug_callback),
            ..Default::default()
        };
        let messenger = loader
            .create_debug_utils_messenger(&ci, None)
            .check("vkCreateDebugUtilsMessengerEXT")?;
        Ok(Self { loader, messenger })
    }

    pub(crate) unsafe fn destroy(&self) {
        self.loader
            .destroy_debug_utils_messenger(self.messenger, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_layer_present_passes() {
        let supported = [c"VK_LAYER_MESA_overlay", VALIDATION_LAYER];
        assert_eq!(first_missing(&[VALIDATION_LAYER], &supported), None);
    }

    #[test]
    fn missing_extension_is_reported() {
        let supported = [c"VK_KHR_surface"];
        let requested = [c"VK_KHR_surface", debug_utils::NAME];
        assert_eq!(
            first_missing(&requested, &supported),
            Some(debug_utils::NAME)
        );
    }

    #[test]
    fn fixed_array_stops_at_nul() {
        let mut raw = [0 as c_char; 16];
        for (dst, src) in raw.iter_mut().zip(b"VK_KHR_surface") {
            *dst = *src as c_char;
        }
        assert_eq!(fixed_cstr(&raw), c"VK_KHR_surface");
        assert_eq!(fixed_cstr(&[1 as c_char; 4]), c"");
    }
}
