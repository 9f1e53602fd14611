// SPDX-License-Identifier: CEPL-1.0
//! Host-visible buffers that stay mapped for their whole lifetime.

use std::ffi::c_void;
use std::ptr::NonNull;

use ash::{vk, Device};
use bytemuck::Pod;
use tracing::debug;

use crate::error::{RenderError, RenderResult, VkCheck};

pub const HOST_VISIBLE_COHERENT: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// First memory type allowed by `type_bits` that has every flag in `required`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> RenderResult<u32> {
    let count = props.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
    (0..count)
        .find(|&i| {
            type_bits & (1 << i) != 0
                && props.memory_types[i as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or(RenderError::NoMemoryType {
            type_bits,
            flags: required,
        })
}

/// A bounds-checked view of mapped memory.
#[derive(Debug)]
pub struct MappedMemory {
    ptr: NonNull<u8>,
    capacity: usize,
}

impl MappedMemory {
    /// # Safety
    /// `ptr` must be valid for reads and writes of `capacity` bytes for as
    /// long as the returned value is used, and nothing else may access that
    /// range concurrently.
    pub unsafe fn from_raw(ptr: *mut c_void, capacity: usize) -> Option<Self> {
        NonNull::new(ptr.cast::<u8>()).map(|ptr| Self { ptr, capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn bounds(&self, offset: usize, len: usize) -> RenderResult<()> {
        match offset.checked_add(len) {
            Some(end) if end <= self.capacity => Ok(()),
            _ => Err(RenderError::BufferOverflow {
                offset,
                requested: len,
                capacity: self.capacity,
            }),
        }
    }

    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> RenderResult<()> {
        self.bounds(offset, bytes.len())?;
        // SAFETY: range checked above; the mapping is valid per `from_raw`.
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), self.ptr.as_ptr().add(offset), bytes.len());
        }
        Ok(())
    }

    pub fn write_pod<T: Pod>(&mut self, offset: usize, values: &[T]) -> RenderResult<()> {
        self.write(offset, bytemuck::cast_slice(values))
    }

    pub fn read(&self, offset: usize, out: &mut [u8]) -> RenderResult<()> {
        self.bounds(offset, out.len())?;
        // SAFETY: as in `write`.
        unsafe {
            std::ptr::copy_nonoverlapping(self.ptr.as_ptr().add(offset), out.as_mut_ptr(), out.len());
        }
        Ok(())
    }
}

pub struct GpuBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    mapping: Option<MappedMemory>,
}

impl GpuBuffer {
    /// Creates the buffer, backs it with memory of the requested kind and,
    /// for host-visible memory, maps the whole allocation.
    pub(crate) unsafe fn create(
        device: &Device,
        memory_props: &vk::PhysicalDeviceMemoryProperties,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        flags: vk::MemoryPropertyFlags,
    ) -> RenderResult<Self> {
        let bci = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = device.create_buffer(&bci, None).check("vkCreateBuffer")?;
        let req = device.get_buffer_memory_requirements(buffer);

        let memory_type_index = match find_memory_type(memory_props, req.memory_type_bits, flags) {
            Ok(index) => index,
            Err(err) => {
                device.destroy_buffer(buffer, None);
                return Err(err);
            }
        };
        let mai = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: req.size,
            memory_type_index,
            ..Default::default()
        };
        let memory = match device.allocate_memory(&mai, None) {
            Ok(memory) => memory,
            Err(result) => {
                device.destroy_buffer(buffer, None);
                return Err(RenderError::Api {
                    op: "vkAllocateMemory",
                    result,
                });
            }
        };

        let mut out = Self {
            buffer,
            memory,
            size,
            mapping: None,
        };
        if let Err(err) = out.bind_and_map(device, flags) {
            out.destroy(device);
            return Err(err);
        }
        debug!(size, ?usage, mapped = out.mapping.is_some(), "buffer created");
        Ok(out)
    }

    unsafe fn bind_and_map(&mut self, device: &Device, flags: vk::MemoryPropertyFlags) -> RenderResult<()> {
        device
            .bind_buffer_memory(self.buffer, self.memory, 0)
            .check("vkBindBufferMemory")?;
        if flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            let ptr = device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .check("vkMapMemory")?;
            self.mapping = MappedMemory::from_raw(ptr, self.size as usize);
        }
        Ok(())
    }

    pub fn mapped(&mut self) -> Option<&mut MappedMemory> {
        self.mapping.as_mut()
    }

    /// Writes through the persistent mapping. Device-local buffers have none.
    pub fn write<T: Pod>(&mut self, offset: usize, values: &[T]) -> RenderResult<()> {
        match self.mapping.as_mut() {
            Some(mapping) => mapping.write_pod(offset, values),
            None => Err(RenderError::BufferOverflow {
                offset,
                requested: std::mem::size_of_val(values),
                capacity: 0,
            }),
        }
    }

    /// Unmaps, then releases the buffer and its memory.
    pub(crate) unsafe fn destroy(&mut self, device: &Device) {
        if self.mapping.take().is_some() {
            device.unmap_memory(self.memory);
        }
        device.destroy_buffer(self.buffer, None);
        device.free_memory(self.memory, None);
        self.buffer = vk::Buffer::null();
        self.memory = vk::DeviceMemory::null();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_props(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (slot, &flags) in props.memory_types.iter_mut().zip(types) {
            slot.property_flags = flags;
        }
        props
    }

    #[test]
    fn picks_first_allowed_type_with_all_flags() {
        let props = memory_props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            HOST_VISIBLE_COHERENT | vk::MemoryPropertyFlags::HOST_CACHED,
            HOST_VISIBLE_COHERENT,
        ]);
        assert_eq!(find_memory_type(&props, 0b1111, HOST_VISIBLE_COHERENT).unwrap(), 2);
        assert_eq!(find_memory_type(&props, 0b1000, HOST_VISIBLE_COHERENT).unwrap(), 3);
    }

    #[test]
    fn type_mask_overrides_better_candidates() {
        let props = memory_props(&[
            HOST_VISIBLE_COHERENT,
            HOST_VISIBLE_COHERENT,
            HOST_VISIBLE_COHERENT | vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HOST_VISIBLE_COHERENT,
        ]);
        assert_eq!(find_memory_type(&props, 0b0100, HOST_VISIBLE_COHERENT).unwrap(), 2);

        let props = memory_props(&[
            HOST_VISIBLE_COHERENT,
            HOST_VISIBLE_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HOST_VISIBLE_COHERENT,
        ]);
        assert!(find_memory_type(&props, 0b0100, HOST_VISIBLE_COHERENT).is_err());
    }

    #[test]
    fn no_matching_type_is_an_error() {
        let props = memory_props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            HOST_VISIBLE_COHERENT,
        ]);
        let err = find_memory_type(&props, 0b01, HOST_VISIBLE_COHERENT).unwrap_err();
        assert!(matches!(err, RenderError::NoMemoryType { type_bits: 0b01, .. }));
    }

    #[test]
    fn mapped_write_then_read_back() {
        let mut host = vec![0u8; 64];
        let mut mapped = unsafe { MappedMemory::from_raw(host.as_mut_ptr().cast(), host.len()) }
            .unwrap();
        let words: [u16; 4] = [1, 2, 3, 0xffff];
        mapped.write_pod(56, &words).unwrap();

        let mut back = [0u8; 8];
        mapped.read(56, &mut back).unwrap();
        assert_eq!(&back[..], bytemuck::cast_slice::<u16, u8>(&words));
        drop(mapped);
        assert_eq!(host[56], 1);
    }

    #[test]
    fn write_past_capacity_is_rejected() {
        let mut host = vec![0u8; 16];
        let mut mapped = unsafe { MappedMemory::from_raw(host.as_mut_ptr().cast(), host.len()) }
            .unwrap();
        let err = mapped.write(12, &[0u8; 8]).unwrap_err();
        assert!(matches!(
            err,
            RenderError::BufferOverflow {
                offset: 12,
                requested: 8,
                capacity: 16
            }
        ));
        assert!(mapped.write(usize::MAX, &[1]).is_err());
        drop(mapped);
        assert!(host.iter().all(|&b| b == 0));
    }

    #[test]
    fn null_mapping_is_refused() {
        assert!(unsafe { MappedMemory::from_raw(std::ptr::null_mut(), 8) }.is_none());
    }
}
