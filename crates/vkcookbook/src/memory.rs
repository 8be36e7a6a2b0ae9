//! ## Memory
//!
//! Every [Buffer](crate::resources::Buffer) and [Image](crate::resources::Image) owns exactly one dedicated
//! [DeviceMemory] allocation. Host visible memory is mapped once on allocation and stays mapped until the
//! allocation is freed.
use std::{ptr::NonNull, sync::Arc};

use ash::vk::{self, Handle};

use crate::{
    context::Device,
    error::MemoryError,
    tracker::{ObjectType, TrackedObject, VulkanObject},
    util::{align_down, align_up},
};

///Types of memory usage. Make sure to use GpuOnly wherever it applies to get optimal performance.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum MemoryUsage {
    ///Device local memory, not accessible from the host.
    GpuOnly,
    ///Host visible memory used to upload data.
    CpuToGpu,
    ///Host visible, preferably cached memory used to read back data.
    GpuToCpu,
}

impl MemoryUsage {
    ///Flags a memory type must have.
    pub fn required_flags(&self) -> vk::MemoryPropertyFlags {
        match self {
            MemoryUsage::GpuOnly => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryUsage::CpuToGpu | MemoryUsage::GpuToCpu => {
                vk::MemoryPropertyFlags::HOST_VISIBLE
            }
        }
    }

    ///Flags a memory type should have. Falls back to [required_flags](Self::required_flags) if no such type exists.
    pub fn preferred_flags(&self) -> vk::MemoryPropertyFlags {
        match self {
            MemoryUsage::GpuOnly => vk::MemoryPropertyFlags::DEVICE_LOCAL,
            MemoryUsage::CpuToGpu => {
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
            }
            MemoryUsage::GpuToCpu => {
                vk::MemoryPropertyFlags::HOST_VISIBLE
                    | vk::MemoryPropertyFlags::HOST_COHERENT
                    | vk::MemoryPropertyFlags::HOST_CACHED
            }
        }
    }
}

///Returns the first memory type that is allowed by `type_bits` and has all `flags`.
pub fn find_memory_type_index(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    properties.memory_types[..properties.memory_type_count as usize]
        .iter()
        .enumerate()
        .find(|(index, ty)| (type_bits & (1 << index)) != 0 && ty.property_flags.contains(flags))
        .map(|(index, _)| index as u32)
}

///Selects a memory type for `usage`, trying the preferred flags first.
pub fn select_memory_type(
    properties: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    usage: MemoryUsage,
) -> Result<u32, MemoryError> {
    find_memory_type_index(properties, type_bits, usage.preferred_flags())
        .or_else(|| find_memory_type_index(properties, type_bits, usage.required_flags()))
        .ok_or(MemoryError::NoMemoryType {
            type_bits,
            flags: usage.required_flags(),
        })
}

//Expands `offset..offset+size` to multiples of `atom`. Ranges reaching the end of the allocation use WHOLE_SIZE.
fn atom_aligned_range(
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    atom: vk::DeviceSize,
    allocation_size: vk::DeviceSize,
) -> (vk::DeviceSize, vk::DeviceSize) {
    let start = align_down(offset, atom);
    let end = if size == vk::WHOLE_SIZE {
        allocation_size
    } else {
        align_up(offset.saturating_add(size), atom)
    };

    if end >= allocation_size {
        (start, vk::WHOLE_SIZE)
    } else {
        (start, end - start)
    }
}

struct MappedPtr(NonNull<u8>);
//Safety: the pointer is only dereferenced through `&self`/`&mut self` of the owning DeviceMemory.
unsafe impl Send for MappedPtr {}
unsafe impl Sync for MappedPtr {}

///A single `vkAllocateMemory` allocation. Host visible memory is mapped persistently.
pub struct DeviceMemory {
    pub device: Arc<Device>,
    pub inner: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    pub memory_type_index: u32,
    pub property_flags: vk::MemoryPropertyFlags,
    mapped: Option<MappedPtr>,
    tracking: TrackedObject,
}

impl DeviceMemory {
    ///Allocates memory that fulfills `requirements` for the given `usage`.
    pub fn allocate(
        device: &Arc<Device>,
        requirements: vk::MemoryRequirements,
        usage: MemoryUsage,
    ) -> Result<Self, MemoryError> {
        let memory_type_index = select_memory_type(
            &device.memory_properties,
            requirements.memory_type_bits,
            usage,
        )?;
        Self::allocate_on_type(device, requirements.size, memory_type_index)
    }

    ///Allocates memory that fulfills `requirements` and has all `flags`.
    pub fn allocate_with_flags(
        device: &Arc<Device>,
        requirements: vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<Self, MemoryError> {
        let memory_type_index = find_memory_type_index(
            &device.memory_properties,
            requirements.memory_type_bits,
            flags,
        )
        .ok_or(MemoryError::NoMemoryType {
            type_bits: requirements.memory_type_bits,
            flags,
        })?;
        Self::allocate_on_type(device, requirements.size, memory_type_index)
    }

    fn allocate_on_type(
        device: &Arc<Device>,
        size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> Result<Self, MemoryError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let property_flags = device.memory_properties.memory_types[memory_type_index as usize]
            .property_flags;

        let info = vk::MemoryAllocateInfo::default()
            .allocation_size(size)
            .memory_type_index(memory_type_index);
        let inner = unsafe { device.inner.allocate_memory(&info, None)? };

        let mapped = if property_flags.contains(vk::MemoryPropertyFlags::HOST_VISIBLE) {
            match unsafe {
                device
                    .inner
                    .map_memory(inner, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty())
            } {
                Ok(ptr) => NonNull::new(ptr as *mut u8).map(MappedPtr),
                Err(e) => {
                    #[cfg(feature = "logging")]
                    log::error!("Failed to map host visible memory: {}", e);
                    unsafe { device.inner.free_memory(inner, None) };
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        Ok(DeviceMemory {
            device: device.clone(),
            inner,
            size,
            memory_type_index,
            property_flags,
            mapped,
            tracking: device.track(ObjectType::DeviceMemory),
        })
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    pub fn is_coherent(&self) -> bool {
        self.property_flags
            .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
    }

    ///The mapped memory, or `None` if the memory is not host visible.
    pub fn as_slice(&self) -> Option<&[u8]> {
        self.mapped.as_ref().map(|ptr| unsafe {
            std::slice::from_raw_parts(ptr.0.as_ptr(), self.size as usize)
        })
    }

    ///The mapped memory, or `None` if the memory is not host visible.
    pub fn as_slice_mut(&mut self) -> Option<&mut [u8]> {
        let size = self.size as usize;
        self.mapped
            .as_mut()
            .map(|ptr| unsafe { std::slice::from_raw_parts_mut(ptr.0.as_ptr(), size) })
    }

    fn mapped_range(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> vk::MappedMemoryRange<'static> {
        let (offset, size) = atom_aligned_range(
            offset,
            size,
            self.device.properties.limits.non_coherent_atom_size,
            self.size,
        );
        vk::MappedMemoryRange::default()
            .memory(self.inner)
            .offset(offset)
            .size(size)
    }

    ///Makes host writes to `offset..offset+size` visible to the device. Does nothing on coherent memory.
    pub fn flush(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Result<(), MemoryError> {
        if !self.is_mapped() || self.is_coherent() {
            return Ok(());
        }
        let range = self.mapped_range(offset, size);
        unsafe { self.device.inner.flush_mapped_memory_ranges(&[range])? };
        Ok(())
    }

    ///Makes device writes to `offset..offset+size` visible to the host. Does nothing on coherent memory.
    pub fn invalidate(
        &self,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> Result<(), MemoryError> {
        if !self.is_mapped() || self.is_coherent() {
            return Ok(());
        }
        let range = self.mapped_range(offset, size);
        unsafe {
            self.device
                .inner
                .invalidate_mapped_memory_ranges(&[range])?
        };
        Ok(())
    }
}

impl VulkanObject for DeviceMemory {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.inner.as_raw()
    }
    fn owning_device(&self) -> Option<&Arc<Device>> {
        Some(&self.device)
    }
}

impl Drop for DeviceMemory {
    fn drop(&mut self) {
        unsafe {
            if self.mapped.take().is_some() {
                self.device.inner.unmap_memory(self.inner);
            }
            self.device.inner.free_memory(self.inner, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties::default();
        properties.memory_type_count = types.len() as u32;
        for (i, flags) in types.iter().enumerate() {
            properties.memory_types[i] = vk::MemoryType {
                property_flags: *flags,
                heap_index: 0,
            };
        }
        properties
    }

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(DeviceMemory: Send, Sync);
    }

    #[test]
    fn type_bits_are_respected() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        assert_eq!(
            find_memory_type_index(&props, 0b111, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(0)
        );
        assert_eq!(
            find_memory_type_index(&props, 0b110, vk::MemoryPropertyFlags::DEVICE_LOCAL),
            Some(2)
        );
        assert_eq!(
            find_memory_type_index(&props, 0b101, vk::MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
    }

    #[test]
    fn types_past_count_are_ignored() {
        let mut props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;
        assert_eq!(
            find_memory_type_index(&props, u32::MAX, vk::MemoryPropertyFlags::HOST_VISIBLE),
            None
        );
    }

    #[test]
    fn usage_prefers_then_requires() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        ]);
        //no coherent+cached type, falls back to plain host visible
        assert_eq!(
            select_memory_type(&props, u32::MAX, MemoryUsage::GpuToCpu).ok(),
            Some(1)
        );
        assert_eq!(
            select_memory_type(&props, u32::MAX, MemoryUsage::GpuOnly).ok(),
            Some(0)
        );
        assert!(matches!(
            select_memory_type(&props, 0b01, MemoryUsage::CpuToGpu),
            Err(MemoryError::NoMemoryType { type_bits: 0b01, .. })
        ));
    }

    #[test]
    fn flush_ranges_are_atom_aligned() {
        assert_eq!(atom_aligned_range(70, 10, 64, 1024), (64, 64));
        assert_eq!(atom_aligned_range(0, 64, 64, 1024), (0, 64));
        //reaches the end of the allocation
        assert_eq!(atom_aligned_range(960, 60, 64, 1000), (960, vk::WHOLE_SIZE));
        assert_eq!(atom_aligned_range(128, vk::WHOLE_SIZE, 64, 1024), (128, vk::WHOLE_SIZE));
    }
}
