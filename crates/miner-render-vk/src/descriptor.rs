// SPDX-License-Identifier: CEPL-1.0
use ash::{vk, Device};

use crate::error::{RenderError, RenderResult, VkCheck};
use crate::pipeline::UNIFORM_BINDING;

pub fn uniform_pool_sizes() -> [vk::DescriptorPoolSize; 1] {
    [vk::DescriptorPoolSize {
        ty: vk::DescriptorType::UNIFORM_BUFFER,
        descriptor_count: 1,
    }]
}

/// A one-set pool with the uniform buffer written at binding 0. The set is
/// written once; the buffer contents change in place afterwards.
pub struct UniformBinding {
    pub pool: vk::DescriptorPool,
    pub set: vk::DescriptorSet,
}

impl UniformBinding {
    pub(crate) unsafe fn create(
        device: &Device,
        set_layout: vk::DescriptorSetLayout,
        buffer: vk::Buffer,
        range: vk::DeviceSize,
    ) -> RenderResult<Self> {
        let sizes = uniform_pool_sizes();
        let pool_ci = vk::DescriptorPoolCreateInfo {
            s_type: vk::StructureType::DESCRIPTOR_POOL_CREATE_INFO,
            max_sets: 1,
            pool_size_count: sizes.len() as u32,
            p_pool_sizes: sizes.as_ptr(),
            ..Default::default()
        };
        let pool = device
            .create_descriptor_pool(&pool_ci, None)
            .check("vkCreateDescriptorPool")?;

        let alloc = vk::DescriptorSetAllocateInfo {
            s_type: vk::StructureType::DESCRIPTOR_SET_ALLOCATE_INFO,
            descriptor_pool: pool,
            descriptor_set_count: 1,
            p_set_layouts: &set_layout,
            ..Default::default()
        };
        let set = match device.allocate_descriptor_sets(&alloc) {
            Ok(sets) if !sets.is_empty() => sets[0],
            Ok(_) => {
                device.destroy_descriptor_pool(pool, None);
                return Err(RenderError::Api {
                    op: "vkAllocateDescriptorSets",
                    result: vk::Result::ERROR_OUT_OF_POOL_MEMORY,
                });
            }
            Err(result) => {
                device.destroy_descriptor_pool(pool, None);
                return Err(RenderError::Api {
                    op: "vkAllocateDescriptorSets",
                    result,
                });
            }
        };

        let info = vk::DescriptorBufferInfo {
            buffer,
            offset: 0,
            range,
        };
        let write = vk::WriteDescriptorSet {
            s_type: vk::StructureType::WRITE_DESCRIPTOR_SET,
            dst_set: set,
            dst_binding: UNIFORM_BINDING,
            dst_array_element: 0,
            descriptor_count: 1,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            p_buffer_info: &info,
            ..Default::default()
        };
        device.update_descriptor_sets(std::slice::from_ref(&write), &[]);

        Ok(Self { pool, set })
    }

    /// Frees the set along with its pool.
    pub(crate) unsafe fn destroy(&self, device: &Device) {
        device.destroy_descriptor_pool(self.pool, None);
    }
}
