// SPDX-License-Identifier: CEPL-1.0
//! Presentation chain: surface policies, the swapchain itself and the
//! per-image views and framebuffers built on it.

use ash::{khr::swapchain, vk, Device};
use miner_render::RenderSize;
use tracing::{debug, info};

use crate::adapter::{QueueFamilyIndices, SurfaceSupport};
use crate::error::{RenderError, RenderResult, VkCheck};

pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// A single UNDEFINED entry means the surface takes anything, so we use our
/// preferred pair. Otherwise take the preferred pair if listed, else the
/// first format offered.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return PREFERRED_FORMAT;
        }
    }
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space
        })
        .or_else(|| formats.first().copied())
        .unwrap_or(PREFERRED_FORMAT)
}

/// MAILBOX wins outright, IMMEDIATE beats FIFO, FIFO is always there.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    let mut best = vk::PresentModeKHR::FIFO;
    for &mode in modes {
        if mode == vk::PresentModeKHR::MAILBOX {
            return mode;
        }
        if mode == vk::PresentModeKHR::IMMEDIATE {
            best = mode;
        }
    }
    best
}

/// The surface dictates the extent unless it reports the `u32::MAX` sentinel,
/// in which case the window size is clamped into the allowed range.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent;
    }
    let (min, max) = (caps.min_image_extent, caps.max_image_extent);
    vk::Extent2D {
        width: window.width.min(max.width).max(min.width),
        height: window.height.min(max.height).max(min.height),
    }
}

/// One more than the minimum, capped by the maximum (0 means unbounded).
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && count > caps.max_image_count {
        caps.max_image_count
    } else {
        count
    }
}

pub fn sharing_for(families: &QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    match (families.graphics, families.present) {
        (Some(g), Some(p)) if g != p => (vk::SharingMode::CONCURRENT, vec![g, p]),
        _ => (vk::SharingMode::EXCLUSIVE, Vec::new()),
    }
}

/// Everything the swapchain will be created with, decided up front.
#[derive(Clone, Debug)]
pub struct ChainPlan {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_indices: Vec<u32>,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

impl ChainPlan {
    pub fn new(
        support: &SurfaceSupport,
        families: &QueueFamilyIndices,
        window: RenderSize,
    ) -> Self {
        let (sharing_mode, queue_family_indices) = sharing_for(families);
        Self {
            format: choose_surface_format(&support.formats),
            present_mode: choose_present_mode(&support.present_modes),
            extent: choose_extent(&support.capabilities, window),
            image_count: choose_image_count(&support.capabilities),
            sharing_mode,
            queue_family_indices,
            pre_transform: support.capabilities.current_transform,
        }
    }

    pub fn create_info(&self, surface: vk::SurfaceKHR) -> vk::SwapchainCreateInfoKHR<'_> {
        vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(self.image_count)
            .image_format(self.format.format)
            .image_color_space(self.format.color_space)
            .image_extent(self.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(self.sharing_mode)
            .queue_family_indices(&self.queue_family_indices)
            .pre_transform(self.pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
    }
}

/// Single colour attachment, cleared on load and handed to presentation.
pub(crate) unsafe fn create_render_pass(
    device: &Device,
    format: vk::Format,
) -> RenderResult<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    };
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        ..Default::default()
    };
    // Hold the layout transition until the acquired image is actually free.
    let dependency = vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_READ
            | vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    };
    let ci = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_attachment,
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    device
        .create_render_pass(&ci, None)
        .check("vkCreateRenderPass")
}

/// A swapchain image with the view and framebuffer that target it.
#[derive(Clone, Copy, Debug)]
pub struct ChainImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
}

pub struct PresentationChain {
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<ChainImage>,
}

impl PresentationChain {
    pub(crate) unsafe fn create(
        device: &Device,
        loader: &swapchain::Device,
        surface: vk::SurfaceKHR,
        plan: &ChainPlan,
        render_pass: vk::RenderPass,
    ) -> RenderResult<Self> {
        let swapchain = loader
            .create_swapchain(&plan.create_info(surface), None)
            .check("vkCreateSwapchainKHR")?;
        let raw_images = loader
            .get_swapchain_images(swapchain)
            .check("vkGetSwapchainImagesKHR")?;

        let mut chain = Self {
            swapchain,
            format: plan.format,
            present_mode: plan.present_mode,
            extent: plan.extent,
            images: Vec::with_capacity(raw_images.len()),
        };
        for image in raw_images {
            match create_chain_image(device, image, plan, render_pass) {
                Ok(entry) => chain.images.push(entry),
                Err(err) => {
                    chain.destroy(device, loader);
                    return Err(err);
                }
            }
        }

        info!(
            "swapchain: {}x{} {:?}/{:?} {:?}, {} images",
            chain.extent.width,
            chain.extent.height,
            chain.format.format,
            chain.format.color_space,
            chain.present_mode,
            chain.images.len()
        );
        Ok(chain)
    }

    pub fn framebuffer(&self, image_index: u32) -> RenderResult<vk::Framebuffer> {
        self.images
            .get(image_index as usize)
            .map(|img| img.framebuffer)
            .ok_or(RenderError::Api {
                op: "vkAcquireNextImageKHR",
                result: vk::Result::ERROR_OUT_OF_DATE_KHR,
            })
    }

    /// Framebuffers and views go before the swapchain that owns the images.
    pub(crate) unsafe fn destroy(&mut self, device: &Device, loader: &swapchain::Device) {
        for img in self.images.drain(..) {
            if img.framebuffer != vk::Framebuffer::null() {
                device.destroy_framebuffer(img.framebuffer, None);
            }
            device.destroy_image_view(img.view, None);
        }
        loader.destroy_swapchain(self.swapchain, None);
        self.swapchain = vk::SwapchainKHR::null();
    }
}

unsafe fn create_chain_image(
    device: &Device,
    image: vk::Image,
    plan: &ChainPlan,
    render_pass: vk::RenderPass,
) -> RenderResult<ChainImage> {
    let view_ci = vk::ImageViewCreateInfo {
        s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
        image,
        view_type: vk::ImageViewType::TYPE_2D,
        format: plan.format.format,
        components: vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        },
        subresource_range: vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        },
        ..Default::default()
    };
    let view = device
        .create_image_view(&view_ci, None)
        .check("vkCreateImageView")?;

    let fb_ci = vk::FramebufferCreateInfo {
        s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
        render_pass,
        attachment_count: 1,
        p_attachments: &view,
        width: plan.extent.width,
        height: plan.extent.height,
        layers: 1,
        ..Default::default()
    };
    let framebuffer = match device.create_framebuffer(&fb_ci, None) {
        Ok(fb) => fb,
        Err(result) => {
            device.destroy_image_view(view, None);
            return Err(RenderError::Api {
                op: "vkCreateFramebuffer",
                result,
            });
        }
    };
    debug!(?image, ?view, ?framebuffer, "chain image ready");
    Ok(ChainImage {
        image,
        view,
        framebuffer,
    })
}
