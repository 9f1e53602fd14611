// SPDX-License-Identifier: CEPL-1.0
use std::ffi::c_char;

use ash::{vk, Device, Instance};
use tracing::info;

use crate::adapter::{AdapterCandidate, QueueFamilyIndices, REQUIRED_DEVICE_EXTENSIONS};
use crate::error::{RenderError, RenderResult, VkCheck};
use crate::instance::VALIDATION_LAYER;

static QUEUE_PRIORITY: [f32; 1] = [1.0];

/// One create entry per distinct family, one queue each at full priority.
pub fn queue_create_infos(families: &QueueFamilyIndices) -> Vec<vk::DeviceQueueCreateInfo<'static>> {
    families
        .unique_families()
        .into_iter()
        .map(|family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: QUEUE_PRIORITY.as_ptr(),
            ..Default::default()
        })
        .collect()
}

/// The logical device and the two queues it hands out. Both queues may be
/// the same handle when one family does graphics and presentation.
pub struct LogicalDevice {
    pub device: Device,
    pub graphics_family: u32,
    pub present_family: u32,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

pub(crate) unsafe fn create_logical_device(
    instance: &Instance,
    adapter: &AdapterCandidate,
    validation: bool,
) -> RenderResult<LogicalDevice> {
    let families = adapter.queue_families;
    let (graphics_family, present_family) = match (families.graphics, families.present) {
        (Some(g), Some(p)) => (g, p),
        _ => return Err(RenderError::NoCompatibleAdapter),
    };

    let queue_infos = queue_create_infos(&families);
    let ext_ptrs: Vec<*const c_char> = REQUIRED_DEVICE_EXTENSIONS
        .iter()
        .map(|e| e.as_ptr())
        .collect();
    // Device layers are ignored by current loaders but older ones still read them.
    let layer_ptrs: Vec<*const c_char> = if validation {
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };
    let features = vk::PhysicalDeviceFeatures::default();

    let create_info = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: ext_ptrs.len() as u32,
        pp_enabled_extension_names: ext_ptrs.as_ptr(),
        enabled_layer_count: layer_ptrs.len() as u32,
        pp_enabled_layer_names: layer_ptrs.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };

    let device = instance
        .create_device(adapter.adapter, &create_info, None)
        .check("vkCreateDevice")?;
    let graphics_queue = device.get_device_queue(graphics_family, 0);
    let present_queue = device.get_device_queue(present_family, 0);
    info!(
        graphics_family,
        present_family,
        queue_entries = queue_infos.len(),
        "logical device created"
    );

    Ok(LogicalDevice {
        device,
        graphics_family,
        present_family,
        graphics_queue,
        present_queue,
    })
}
