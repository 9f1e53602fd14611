// SPDX-License-Identifier: CEPL-1.0
//! Physical device discovery, scoring and selection.
//!
//! All queries go through [`AdapterQuery`] so the policy can be exercised
//! against fabricated adapters.

use std::ffi::{CStr, CString};

use ash::{khr::surface, vk, Instance};
use tracing::{debug, info};

use crate::error::{RenderError, RenderResult, VkCheck};
use crate::instance::fixed_cstr;

pub const DISCRETE_BONUS: u64 = 1000;
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct family indices, graphics first.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);
        for family in [self.graphics, self.present].into_iter().flatten() {
            if !families.contains(&family) {
                families.push(family);
            }
        }
        families
    }
}

/// What a surface offers on one adapter.
#[derive(Clone, Debug, Default)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

pub trait AdapterQuery {
    fn adapters(&self) -> RenderResult<Vec<vk::PhysicalDevice>>;
    fn properties(&self, adapter: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties;
    fn queue_families(&self, adapter: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties>;
    fn supports_present(&self, adapter: vk::PhysicalDevice, family: u32) -> RenderResult<bool>;
    fn extensions(&self, adapter: vk::PhysicalDevice) -> RenderResult<Vec<CString>>;
    fn surface_support(&self, adapter: vk::PhysicalDevice) -> RenderResult<SurfaceSupport>;
}

/// The real query, bound to one instance and the window surface.
pub struct SurfaceAdapters<'a> {
    pub instance: &'a Instance,
    pub surface_loader: &'a surface::Instance,
    pub surface: vk::SurfaceKHR,
}

impl AdapterQuery for SurfaceAdapters<'_> {
    fn adapters(&self) -> RenderResult<Vec<vk::PhysicalDevice>> {
        unsafe { self.instance.enumerate_physical_devices() }.check("vkEnumeratePhysicalDevices")
    }

    fn properties(&self, adapter: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
        unsafe { self.instance.get_physical_device_properties(adapter) }
    }

    fn queue_families(&self, adapter: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
        unsafe {
            self.instance
                .get_physical_device_queue_family_properties(adapter)
        }
    }

    fn supports_present(&self, adapter: vk::PhysicalDevice, family: u32) -> RenderResult<bool> {
        unsafe {
            self.surface_loader
                .get_physical_device_surface_support(adapter, family, self.surface)
        }
        .check("vkGetPhysicalDeviceSurfaceSupportKHR")
    }

    fn extensions(&self, adapter: vk::PhysicalDevice) -> RenderResult<Vec<CString>> {
        let props = unsafe {
            self.instance
                .enumerate_device_extension_properties(adapter)
        }
        .check("vkEnumerateDeviceExtensionProperties")?;
        Ok(props
            .iter()
            .map(|p| fixed_cstr(&p.extension_name).to_owned())
            .collect())
    }

    fn surface_support(&self, adapter: vk::PhysicalDevice) -> RenderResult<SurfaceSupport> {
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self
                    .surface_loader
                    .get_physical_device_surface_capabilities(adapter, self.surface)
                    .check("vkGetPhysicalDeviceSurfaceCapabilitiesKHR")?,
                formats: self
                    .surface_loader
                    .get_physical_device_surface_formats(adapter, self.surface)
                    .check("vkGetPhysicalDeviceSurfaceFormatsKHR")?,
                present_modes: self
                    .surface_loader
                    .get_physical_device_surface_present_modes(adapter, self.surface)
                    .check("vkGetPhysicalDeviceSurfacePresentModesKHR")?,
            })
        }
    }
}

/// Discrete GPUs get a flat bonus; the rest is the sum of a few size limits.
pub fn score_adapter(props: &vk::PhysicalDeviceProperties) -> u64 {
    let limits = &props.limits;
    let mut score = 0;
    if props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        score += DISCRETE_BONUS;
    }
    score += u64::from(limits.max_image_dimension2_d);
    score += u64::from(limits.max_framebuffer_width);
    score += u64::from(limits.max_framebuffer_height);
    score += u64::from(limits.max_compute_shared_memory_size);
    score
}

/// Walks the families in order, keeping the first graphics-capable one and
/// the first one that can present. Stops once both are known.
pub fn find_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> RenderResult<bool>,
) -> RenderResult<QueueFamilyIndices> {
    let mut indices = QueueFamilyIndices::default();
    for (i, family) in families.iter().enumerate() {
        let index = i as u32;
        if indices.graphics.is_none()
            && family.queue_count > 0
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics = Some(index);
        }
        if indices.present.is_none() && family.queue_count > 0 && supports_present(index)? {
            indices.present = Some(index);
        }
        if indices.is_complete() {
            break;
        }
    }
    Ok(indices)
}

pub fn has_extensions(available: &[CString], required: &[&CStr]) -> bool {
    required
        .iter()
        .all(|req| available.iter().any(|have| have.as_c_str() == *req))
}

#[derive(Clone, Debug)]
pub struct AdapterCandidate {
    pub adapter: vk::PhysicalDevice,
    pub name: String,
    pub score: u64,
    pub queue_families: QueueFamilyIndices,
    pub compatible: bool,
}

pub fn evaluate<Q: AdapterQuery + ?Sized>(
    query: &Q,
    adapter: vk::PhysicalDevice,
) -> RenderResult<AdapterCandidate> {
    let props = query.properties(adapter);
    let name = fixed_cstr(&props.device_name)
        .to_string_lossy()
        .into_owned();
    let queue_families = find_queue_families(&query.queue_families(adapter), |family| {
        query.supports_present(adapter, family)
    })?;
    let extensions_ok = has_extensions(&query.extensions(adapter)?, &REQUIRED_DEVICE_EXTENSIONS);
    // Surface details are only meaningful once swapchain support is known.
    let surface_ok = extensions_ok && query.surface_support(adapter)?.is_adequate();

    Ok(AdapterCandidate {
        adapter,
        name,
        score: score_adapter(&props),
        queue_families,
        compatible: queue_families.is_complete() && extensions_ok && surface_ok,
    })
}

/// Picks the compatible adapter with the highest score. Ties keep the one
/// enumerated first.
pub fn select_physical_device<Q: AdapterQuery + ?Sized>(
    query: &Q,
) -> RenderResult<AdapterCandidate> {
    let adapters = query.adapters()?;
    if adapters.is_empty() {
        return Err(RenderError::NoAdapters);
    }

    let mut best: Option<AdapterCandidate> = None;
    for adapter in adapters {
        let candidate = evaluate(query, adapter)?;
        debug!(
            name = %candidate.name,
            score = candidate.score,
            compatible = candidate.compatible,
            "adapter"
        );
        if !candidate.compatible {
            continue;
        }
        if best.as_ref().map_or(true, |b| candidate.score > b.score) {
            best = Some(candidate);
        }
    }

    let chosen = best.ok_or(RenderError::NoCompatibleAdapter)?;
    info!(
        "selected GPU: {} (score {}, graphics family {:?}, present family {:?})",
        chosen.name, chosen.score, chosen.queue_families.graphics, chosen.queue_families.present
    );
    Ok(chosen)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ash::vk::Handle;

    #[derive(Clone)]
    pub(crate) struct FakeAdapter {
        pub discrete: bool,
        pub max_dim: u32,
        /// (flags, can present) per family.
        pub families: Vec<(vk::QueueFlags, bool)>,
        pub swapchain: bool,
        pub formats: usize,
    }

    impl FakeAdapter {
        pub fn capable(discrete: bool, max_dim: u32) -> Self {
            Self {
                discrete,
                max_dim,
                families: vec![(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, true)],
                swapchain: true,
                formats: 1,
            }
        }
    }

    pub(crate) struct FakeQuery(pub Vec<FakeAdapter>);

    impl FakeQuery {
        fn get(&self, adapter: vk::PhysicalDevice) -> &FakeAdapter {
            &self.0[adapter.as_raw() as usize - 1]
        }
    }

    impl AdapterQuery for FakeQuery {
        fn adapters(&self) -> RenderResult<Vec<vk::PhysicalDevice>> {
            Ok((1..=self.0.len() as u64)
                .map(vk::PhysicalDevice::from_raw)
                .collect())
        }

        fn properties(&self, adapter: vk::PhysicalDevice) -> vk::PhysicalDeviceProperties {
            let fake = self.get(adapter);
            let mut props = vk::PhysicalDeviceProperties::default();
            props.device_type = if fake.discrete {
                vk::PhysicalDeviceType::DISCRETE_GPU
            } else {
                vk::PhysicalDeviceType::INTEGRATED_GPU
            };
            props.limits.max_image_dimension2_d = fake.max_dim;
            props.limits.max_framebuffer_width = fake.max_dim;
            props.limits.max_framebuffer_height = fake.max_dim;
            props.limits.max_compute_shared_memory_size = 32768;
            props
        }

        fn queue_families(&self, adapter: vk::PhysicalDevice) -> Vec<vk::QueueFamilyProperties> {
            self.get(adapter)
                .families
                .iter()
                .map(|&(queue_flags, _)| vk::QueueFamilyProperties {
                    queue_flags,
                    queue_count: 1,
                    ..Default::default()
                })
                .collect()
        }

        fn supports_present(&self, adapter: vk::PhysicalDevice, family: u32) -> RenderResult<bool> {
            Ok(self.get(adapter).families[family as usize].1)
        }

        fn extensions(&self, adapter: vk::PhysicalDevice) -> RenderResult<Vec<CString>> {
            let mut exts = vec![CString::from(c"VK_KHR_maintenance1")];
            if self.get(adapter).swapchain {
                exts.push(ash::khr::swapchain::NAME.to_owned());
            }
            Ok(exts)
        }

        fn surface_support(&self, adapter: vk::PhysicalDevice) -> RenderResult<SurfaceSupport> {
            Ok(SurfaceSupport {
                formats: vec![vk::SurfaceFormatKHR::default(); self.get(adapter).formats],
                present_modes: vec![vk::PresentModeKHR::FIFO],
                ..Default::default()
            })
        }
    }

    #[test]
    fn discrete_outscores_integrated_with_equal_limits() {
        let q = FakeQuery(vec![
            FakeAdapter::capable(false, 16384),
            FakeAdapter::capable(true, 16384),
        ]);
        let integrated = evaluate(&q, vk::PhysicalDevice::from_raw(1)).unwrap();
        let discrete = evaluate(&q, vk::PhysicalDevice::from_raw(2)).unwrap();
        assert!(discrete.score >= integrated.score + DISCRETE_BONUS);
    }

    #[test]
    fn score_sums_each_limit_once() {
        let q = FakeQuery(vec![FakeAdapter::capable(false, 100)]);
        let props = q.properties(vk::PhysicalDevice::from_raw(1));
        assert_eq!(score_adapter(&props), 100 + 100 + 100 + 32768);
    }

    #[test]
    fn discrete_bonus_decides_between_equal_limits() {
        let q = FakeQuery(vec![
            FakeAdapter::capable(false, 8192),
            FakeAdapter::capable(true, 8192),
            FakeAdapter::capable(false, 4096),
        ]);
        let chosen = select_physical_device(&q).unwrap();
        assert_eq!(chosen.adapter.as_raw(), 2);
    }

    #[test]
    fn larger_limits_can_beat_the_discrete_bonus() {
        let q = FakeQuery(vec![
            FakeAdapter::capable(true, 4096),
            FakeAdapter::capable(false, 16384),
        ]);
        assert_eq!(select_physical_device(&q).unwrap().adapter.as_raw(), 2);
    }

    #[test]
    fn ties_keep_first_enumerated() {
        let q = FakeQuery(vec![
            FakeAdapter::capable(true, 8192),
            FakeAdapter::capable(true, 8192),
        ]);
        assert_eq!(select_physical_device(&q).unwrap().adapter.as_raw(), 1);
    }

    #[test]
    fn incompatible_adapters_are_skipped_even_if_better() {
        let mut no_swapchain = FakeAdapter::capable(true, 32768);
        no_swapchain.swapchain = false;
        let mut no_formats = FakeAdapter::capable(true, 32768);
        no_formats.formats = 0;
        let q = FakeQuery(vec![
            no_swapchain,
            no_formats,
            FakeAdapter::capable(false, 1024),
        ]);
        assert_eq!(select_physical_device(&q).unwrap().adapter.as_raw(), 3);
    }

    #[test]
    fn no_adapters_is_an_error() {
        let q = FakeQuery(vec![]);
        assert!(matches!(
            select_physical_device(&q),
            Err(RenderError::NoAdapters)
        ));
    }

    #[test]
    fn nothing_compatible_is_an_error() {
        let mut compute_only = FakeAdapter::capable(true, 8192);
        compute_only.families = vec![(vk::QueueFlags::COMPUTE, true)];
        let q = FakeQuery(vec![compute_only]);
        assert!(matches!(
            select_physical_device(&q),
            Err(RenderError::NoCompatibleAdapter)
        ));
    }

    #[test]
    fn separate_graphics_and_present_families() {
        let families = [
            vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::GRAPHICS,
                queue_count: 1,
                ..Default::default()
            },
            vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::TRANSFER,
                queue_count: 1,
                ..Default::default()
            },
        ];
        let indices = find_queue_families(&families, |i| Ok(i == 1)).unwrap();
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(1));
        assert_eq!(indices.unique_families(), vec![0, 1]);
    }

    #[test]
    fn empty_families_are_ignored() {
        let families = [vk::QueueFamilyProperties {
            queue_flags: vk::QueueFlags::GRAPHICS,
            queue_count: 0,
            ..Default::default()
        }];
        let indices = find_queue_families(&families, |_| Ok(true)).unwrap();
        assert!(!indices.is_complete());
    }

    #[test]
    fn shared_family_is_listed_once() {
        let indices = QueueFamilyIndices {
            graphics: Some(2),
            present: Some(2),
        };
        assert_eq!(indices.unique_families(), vec![2]);
    }
}
