// SPDX-License-Identifier: CEPL-1.0
//! Graphics pipeline for the voxel mesh.
//!
//! The fixed-function state is described by small builder functions so the
//! values can be checked without a device; [`PipelineState::create`] only
//! wires them together.

use std::ffi::CStr;

use ash::{vk, Device};
use miner_render::{Mvp, Vertex};
use tracing::info;

use crate::error::{RenderError, RenderResult, VkCheck};
use crate::shader::{create_shader_module, ShaderLoader, ShaderStage};

const ENTRY_POINT: &CStr = c"main";

pub const PUSH_CONSTANT_SIZE: u32 = std::mem::size_of::<Mvp>() as u32;
pub const UNIFORM_BINDING: u32 = 0;

/// Triangle winding treated as front-facing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Winding {
    #[default]
    Clockwise,
    CounterClockwise,
}

impl Winding {
    pub fn front_face(self) -> vk::FrontFace {
        match self {
            Winding::Clockwise => vk::FrontFace::CLOCKWISE,
            Winding::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    pub extent: vk::Extent2D,
    pub winding: Winding,
    pub blend: bool,
}

pub fn vertex_binding() -> vk::VertexInputBindingDescription {
    vk::VertexInputBindingDescription {
        binding: 0,
        stride: Vertex::STRIDE,
        input_rate: vk::VertexInputRate::VERTEX,
    }
}

pub fn vertex_attributes() -> [vk::VertexInputAttributeDescription; 2] {
    [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: Vertex::POS_OFFSET,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32B32_SFLOAT,
            offset: Vertex::COLOR_OFFSET,
        },
    ]
}

pub fn viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

pub fn rasterization_state(cfg: &PipelineConfig) -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        depth_clamp_enable: vk::FALSE,
        rasterizer_discard_enable: vk::FALSE,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: vk::CullModeFlags::BACK,
        front_face: cfg.winding.front_face(),
        depth_bias_enable: vk::FALSE,
        line_width: 1.0,
        ..Default::default()
    }
}

/// Standard "over" blending on colour, source alpha kept as written.
pub fn blend_attachment(enabled: bool) -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState {
        blend_enable: if enabled { vk::TRUE } else { vk::FALSE },
        src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        alpha_blend_op: vk::BlendOp::ADD,
        color_write_mask: vk::ColorComponentFlags::R
            | vk::ColorComponentFlags::G
            | vk::ColorComponentFlags::B
            | vk::ColorComponentFlags::A,
    }
}

pub fn push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange {
        stage_flags: vk::ShaderStageFlags::VERTEX,
        offset: 0,
        size: PUSH_CONSTANT_SIZE,
    }
}

pub fn uniform_layout_binding() -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding {
        binding: UNIFORM_BINDING,
        descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: 1,
        stage_flags: vk::ShaderStageFlags::VERTEX,
        ..Default::default()
    }
}

pub struct PipelineState {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    pub set_layout: vk::DescriptorSetLayout,
}

impl PipelineState {
    pub(crate) unsafe fn create(
        device: &Device,
        render_pass: vk::RenderPass,
        cfg: &PipelineConfig,
        shaders: &dyn ShaderLoader,
    ) -> RenderResult<Self> {
        let vert_code = shaders.load(ShaderStage::Vertex)?;
        let frag_code = shaders.load(ShaderStage::Fragment)?;

        let binding = uniform_layout_binding();
        let set_layout_ci = vk::DescriptorSetLayoutCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_LAYOUT_CREATE_INFO,
            binding_count: 1,
            p_bindings: &binding,
            ..Default::default()
        };
        let set_layout = device
            .create_descriptor_set_layout(&set_layout_ci, None)
            .check("vkCreateDescriptorSetLayout")?;

        let push_range = push_constant_range();
        let layout_ci = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            set_layout_count: 1,
            p_set_layouts: &set_layout,
            push_constant_range_count: 1,
            p_push_constant_ranges: &push_range,
            ..Default::default()
        };
        let layout = device
            .create_pipeline_layout(&layout_ci, None)
            .check("vkCreatePipelineLayout")?;

        let vert = create_shader_module(device, &vert_code)?;
        let frag = create_shader_module(device, &frag_code)?;
        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: ShaderStage::Vertex.flags(),
                module: vert,
                p_name: ENTRY_POINT.as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: ShaderStage::Fragment.flags(),
                module: frag,
                p_name: ENTRY_POINT.as_ptr(),
                ..Default::default()
            },
        ];

        let binding_desc = vertex_binding();
        let attributes = vertex_attributes();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
            vertex_binding_description_count: 1,
            p_vertex_binding_descriptions: &binding_desc,
            vertex_attribute_description_count: attributes.len() as u32,
            p_vertex_attribute_descriptions: attributes.as_ptr(),
            ..Default::default()
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart_enable: vk::FALSE,
            ..Default::default()
        };
        // Static viewport: the chain is never resized.
        let vp = viewport(cfg.extent);
        let sc = scissor(cfg.extent);
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            p_viewports: &vp,
            scissor_count: 1,
            p_scissors: &sc,
            ..Default::default()
        };
        let raster = rasterization_state(cfg);
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            sample_shading_enable: vk::FALSE,
            ..Default::default()
        };
        let blend_att = blend_attachment(cfg.blend);
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            logic_op_enable: vk::FALSE,
            logic_op: vk::LogicOp::COPY,
            attachment_count: 1,
            p_attachments: &blend_att,
            ..Default::default()
        };

        let pipeline_ci = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_color_blend_state: &color_blend,
            layout,
            render_pass,
            subpass: 0,
            ..Default::default()
        };

        let created = device.create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&pipeline_ci),
            None,
        );
        // Modules are baked into the pipeline either way.
        device.destroy_shader_module(vert, None);
        device.destroy_shader_module(frag, None);

        let pipeline = match created {
            Ok(pipelines) => pipelines.into_iter().next(),
            Err((_, result)) => {
                device.destroy_pipeline_layout(layout, None);
                device.destroy_descriptor_set_layout(set_layout, None);
                return Err(RenderError::Api {
                    op: "vkCreateGraphicsPipelines",
                    result,
                });
            }
        }
        .ok_or(RenderError::Api {
            op: "vkCreateGraphicsPipelines",
            result: vk::Result::ERROR_UNKNOWN,
        })?;

        info!(
            "graphics pipeline ready ({}x{}, front face {:?})",
            cfg.extent.width,
            cfg.extent.height,
            cfg.winding.front_face()
        );
        Ok(Self {
            pipeline,
            layout,
            set_layout,
        })
    }

    pub(crate) unsafe fn destroy(&self, device: &Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
        device.destroy_descriptor_set_layout(self.set_layout, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(winding: Winding) -> PipelineConfig {
        PipelineConfig {
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            winding,
            blend: true,
        }
    }

    #[test]
    fn vertex_input_is_two_vec3_at_stride_24() {
        let binding = vertex_binding();
        assert_eq!(binding.stride, 24);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
        let attrs = vertex_attributes();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 12);
        assert_eq!(attrs[1].location, 1);
        assert!(attrs
            .iter()
            .all(|a| a.format == vk::Format::R32G32B32_SFLOAT));
    }

    #[test]
    fn viewport_and_scissor_cover_extent() {
        let c = cfg(Winding::Clockwise);
        let vp = viewport(c.extent);
        assert_eq!((vp.width, vp.height), (800.0, 600.0));
        assert_eq!((vp.min_depth, vp.max_depth), (0.0, 1.0));
        let sc = scissor(c.extent);
        assert_eq!((sc.offset.x, sc.offset.y), (0, 0));
        assert_eq!((sc.extent.width, sc.extent.height), (800, 600));
    }

    #[test]
    fn culls_back_faces_with_configured_winding() {
        let cw = rasterization_state(&cfg(Winding::Clockwise));
        assert_eq!(cw.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(cw.front_face, vk::FrontFace::CLOCKWISE);
        let ccw = rasterization_state(&cfg(Winding::CounterClockwise));
        assert_eq!(ccw.front_face, vk::FrontFace::COUNTER_CLOCKWISE);
        assert_eq!(Winding::default(), Winding::Clockwise);
    }

    #[test]
    fn alpha_blending_factors() {
        let att = blend_attachment(true);
        assert_eq!(att.blend_enable, vk::TRUE);
        assert_eq!(att.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(att.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(att.src_alpha_blend_factor, vk::BlendFactor::ONE);
        assert_eq!(att.dst_alpha_blend_factor, vk::BlendFactor::ZERO);
        assert!(att.color_write_mask.contains(
            vk::ColorComponentFlags::R | vk::ColorComponentFlags::A
        ));
        assert_eq!(blend_attachment(false).blend_enable, vk::FALSE);
    }

    #[test]
    fn push_constants_hold_three_matrices() {
        let range = push_constant_range();
        assert_eq!(range.size, 48 * 4);
        assert_eq!(range.offset, 0);
        assert_eq!(range.stage_flags, vk::ShaderStageFlags::VERTEX);
    }

    #[test]
    fn uniform_binding_is_slot_zero_vertex_stage() {
        let b = uniform_layout_binding();
        assert_eq!(b.binding, 0);
        assert_eq!(b.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(b.descriptor_count, 1);
        assert_eq!(b.stage_flags, vk::ShaderStageFlags::VERTEX);
    }
}
