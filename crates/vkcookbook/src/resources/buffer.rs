use std::{
    hash::{Hash, Hasher},
    sync::Arc,
};

use ash::vk::{self, Handle};

use super::SharingMode;
use crate::{
    CookbookError,
    context::Device,
    error::{BufferMapError, DeviceError, MemoryError},
    memory::{DeviceMemory, MemoryUsage},
    tracker::{ObjectType, TrackedObject, VulkanObject},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BufDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub sharing: SharingMode,
}

impl BufDesc {
    ///Overwrites all fields (that apply) of `info` with the data in `self`
    pub fn set_on_create_info<'a>(
        &'a self,
        mut info: vk::BufferCreateInfo<'a>,
    ) -> vk::BufferCreateInfo<'a> {
        info = info.size(self.size).usage(self.usage);

        match &self.sharing {
            SharingMode::Exclusive => info = info.sharing_mode(vk::SharingMode::EXCLUSIVE),
            SharingMode::Concurrent {
                queue_family_indices,
            } => {
                info = info
                    .sharing_mode(vk::SharingMode::CONCURRENT)
                    .queue_family_indices(queue_family_indices)
            }
        }

        info
    }

    ///Fails with [MemoryError::ZeroSize] for empty buffers, which Vulkan does not allow.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.size == 0 {
            return Err(MemoryError::ZeroSize);
        }
        Ok(())
    }

    ///Exclusive buffer big enough for `count` elements of `T`.
    pub fn for_slice<T>(count: usize, usage: vk::BufferUsageFlags) -> Self {
        BufDesc {
            size: (core::mem::size_of::<T>() * count) as vk::DeviceSize,
            usage,
            sharing: SharingMode::Exclusive,
        }
    }
}

//Copies as much of `data` to `dst[offset..]` as fits.
fn write_clamped(dst: &mut [u8], offset: usize, data: &[u8]) -> Result<usize, BufferMapError> {
    if offset > dst.len() {
        return Err(BufferMapError::OffsetTooLarge {
            offset,
            size: dst.len(),
        });
    }

    let write_size = data.len().min(dst.len() - offset);
    dst[offset..offset + write_size].copy_from_slice(&data[..write_size]);

    if write_size < data.len() {
        Err(BufferMapError::PartialyWritten {
            written: write_size,
            size: data.len(),
        })
    } else {
        Ok(write_size)
    }
}

///Buffer with its own dedicated memory. The memory is freed after the buffer handle is destroyed.
pub struct Buffer {
    pub desc: BufDesc,
    pub inner: vk::Buffer,
    pub usage: MemoryUsage,
    pub device: Arc<Device>,
    pub memory: DeviceMemory,
    tracking: TrackedObject,
}

///The hash implementation is based on [Buffer](ash::vk::Buffer)'s hash.
impl Hash for Buffer {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.inner.hash(hasher)
    }
}

impl Buffer {
    ///Creates a buffer for `description`, allocates memory for `usage` and binds it. Fails with
    /// [MemoryError::ZeroSize] if `description.size` is 0.
    pub fn new(
        device: &Arc<Device>,
        description: BufDesc,
        usage: MemoryUsage,
        create_flags: Option<vk::BufferCreateFlags>,
    ) -> Result<Self, MemoryError> {
        description.validate()?;

        let mut info = vk::BufferCreateInfo::default();
        if let Some(flags) = create_flags {
            info = info.flags(flags);
        }
        info = description.set_on_create_info(info);

        let buffer = unsafe { device.inner.create_buffer(&info, None)? };
        let requirements = unsafe { device.inner.get_buffer_memory_requirements(buffer) };

        let bound = DeviceMemory::allocate(device, requirements, usage).and_then(|memory| {
            unsafe { device.inner.bind_buffer_memory(buffer, memory.inner, 0)? };
            Ok(memory)
        });
        let memory = match bound {
            Ok(m) => m,
            Err(e) => {
                #[cfg(feature = "logging")]
                log::error!("Failed to back buffer of size {}: {}", description.size, e);
                unsafe { device.inner.destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        Ok(Buffer {
            device: device.clone(),
            memory,
            usage,
            desc: description,
            inner: buffer,
            tracking: device.track(ObjectType::Buffer),
        })
    }

    ///A staging buffer is a host visible, mapable buffer. Those are usually used to either copy data (from them) to the GPU, or from the GPU back to
    /// the staging buffer to read the data.
    ///
    /// Buffers created by this function are initalized to `data` and can be used as transfer source and destination.
    /// Empty `data` is rejected with [MemoryError::ZeroSize].
    pub fn new_staging_for_data<T: bytemuck::Pod>(
        device: &Arc<Device>,
        data: &[T],
    ) -> Result<Self, CookbookError> {
        let desc = BufDesc::for_slice::<T>(
            data.len(),
            vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST,
        );

        let mut buffer = Buffer::new(device, desc, MemoryUsage::CpuToGpu, None)?;
        buffer.write(0, bytemuck::cast_slice(data))?;
        Ok(buffer)
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.desc.size
    }

    ///Writes `data` to the buffer, starting at `offset`.
    ///If `offset + data.len() > buffer.size()` only the bytes that fit are written and [BufferMapError::PartialyWritten] is returned.
    ///
    ///If the buffer is not mapable by the host (usually if the buffer us created with MemoryUsage::GpuOnly) nothing is
    /// written and an error is returned.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), BufferMapError> {
        let size = self.desc.size as usize;
        let Some(mapped) = self.memory.as_slice_mut() else {
            #[cfg(feature = "logging")]
            log::error!("Tried to map buffer that has usage: {:?}", self.usage);
            return Err(BufferMapError::NotMapable);
        };

        //the allocation might be bigger than the buffer
        let result = write_clamped(&mut mapped[..size], offset, data);

        #[cfg(feature = "logging")]
        log::trace!(
            "writing to mapped buffer[{:?}] of size {} with offset={}, data_size={}",
            self.inner,
            size,
            offset,
            data.len()
        );

        let written = match &result {
            Ok(written) => *written,
            Err(BufferMapError::PartialyWritten { written, .. }) => *written,
            Err(_) => 0,
        };
        if written > 0 {
            if let Err(e) = self
                .memory
                .flush(offset as vk::DeviceSize, written as vk::DeviceSize)
            {
                #[cfg(feature = "logging")]
                log::error!("Failed to flush memory range of mapped buffer: {}", e);
                return Err(e.into());
            }
        }

        result.map(|_| ())
    }

    ///Returns (if possible) a reference to the buffers data. Note that the data might be aligned, or not even be of one type. Turning this data into actual types should probably be implemented
    /// by whoever knows the actual data layout.
    pub fn read(&self) -> Result<&[u8], BufferMapError> {
        if let Err(e) = self.memory.invalidate(0, vk::WHOLE_SIZE) {
            #[cfg(feature = "logging")]
            log::error!("Failed to invalidate buffer memory: {}", e);
            return Err(e.into());
        }

        match self.memory.as_slice() {
            Some(slice) => Ok(&slice[..self.desc.size as usize]),
            None => {
                #[cfg(feature = "logging")]
                log::error!("Tried to map buffer that has usage: {:?}", self.usage);
                Err(BufferMapError::NotMapable)
            }
        }
    }
}

impl VulkanObject for Buffer {
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

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_buffer(self.inner, None) }
    }
}

///Typed view on a [Buffer], used for uniform and storage texel buffers.
pub struct BufferView {
    pub inner: vk::BufferView,
    pub buffer: Arc<Buffer>,
    pub format: vk::Format,
    pub offset: vk::DeviceSize,
    pub range: vk::DeviceSize,
    tracking: TrackedObject,
}

impl BufferView {
    pub fn new(
        buffer: &Arc<Buffer>,
        format: vk::Format,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    ) -> Result<Self, DeviceError> {
        let info = vk::BufferViewCreateInfo::default()
            .buffer(buffer.inner)
            .format(format)
            .offset(offset)
            .range(range);
        let inner = unsafe { buffer.device.inner.create_buffer_view(&info, None)? };

        Ok(BufferView {
            inner,
            buffer: buffer.clone(),
            format,
            offset,
            range,
            tracking: buffer.device.track(ObjectType::BufferView),
        })
    }
}

impl VulkanObject for BufferView {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.inner.as_raw()
    }
    fn owning_device(&self) -> Option<&Arc<Device>> {
        Some(&self.buffer.device)
    }
}

impl Drop for BufferView {
    fn drop(&mut self) {
        unsafe {
            self.buffer
                .device
                .inner
                .destroy_buffer_view(self.inner, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Buffer: Send, Sync);
        assert_impl_all!(BufferView: Send, Sync);
    }

    #[test]
    fn empty_description_is_rejected() {
        let desc = BufDesc::for_slice::<u32>(0, vk::BufferUsageFlags::TRANSFER_SRC);
        assert!(matches!(desc.validate(), Err(MemoryError::ZeroSize)));
        let desc = BufDesc::for_slice::<u32>(1, vk::BufferUsageFlags::TRANSFER_SRC);
        assert!(desc.validate().is_ok());
    }

    #[test]
    fn write_fits() {
        let mut dst = [0u8; 8];
        assert_eq!(write_clamped(&mut dst, 2, &[1, 2, 3]).ok(), Some(3));
        assert_eq!(dst, [0, 0, 1, 2, 3, 0, 0, 0]);
    }

    #[test]
    fn write_is_truncated() {
        let mut dst = [0u8; 4];
        match write_clamped(&mut dst, 2, &[1, 2, 3]) {
            Err(BufferMapError::PartialyWritten { written, size }) => {
                assert_eq!(written, 2);
                assert_eq!(size, 3);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(dst, [0, 0, 1, 2]);

        //offset at the end writes nothing
        assert!(matches!(
            write_clamped(&mut dst, 4, &[9]),
            Err(BufferMapError::PartialyWritten { written: 0, size: 1 })
        ));
    }

    #[test]
    fn write_offset_too_large() {
        let mut dst = [0u8; 4];
        assert!(matches!(
            write_clamped(&mut dst, 5, &[1]),
            Err(BufferMapError::OffsetTooLarge { offset: 5, size: 4 })
        ));
        assert_eq!(dst, [0; 4]);
    }

    #[test]
    fn desc_for_slice() {
        let desc = BufDesc::for_slice::<[f32; 4]>(3, vk::BufferUsageFlags::VERTEX_BUFFER);
        assert_eq!(desc.size, 48);
        let info = desc.set_on_create_info(vk::BufferCreateInfo::default());
        assert_eq!(info.sharing_mode, vk::SharingMode::EXCLUSIVE);
        assert_eq!(info.size, 48);
    }
}
