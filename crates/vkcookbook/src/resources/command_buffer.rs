use std::sync::Arc;

use ash::vk::{self, Handle};

use crate::{
    context::{Device, Queue},
    error::CommandBufferError,
    sync::Fence,
    tracker::{ObjectType, TrackedObject, VulkanObject},
};

pub struct CommandPool {
    ///Device this pool was created on.
    pub device: Arc<Device>,
    ///The queue family this pool's buffers can be used on.
    pub queue_family: u32,
    ///the raw vulkan handle.
    pub inner: vk::CommandPool,
    pub can_reset_buffer: bool,
    tracking: TrackedObject,
}

impl CommandPool {
    pub fn new(
        device: &Arc<Device>,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self, CommandBufferError> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(flags)
            .queue_family_index(queue_family);

        let pool = unsafe { device.inner.create_command_pool(&create_info, None)? };

        Ok(CommandPool {
            device: device.clone(),
            inner: pool,
            queue_family,
            can_reset_buffer: flags.contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
            tracking: device.track(ObjectType::CommandPool),
        })
    }

    ///Pool whose buffers can be reset one by one.
    pub fn new_resetable(device: &Arc<Device>, queue_family: u32) -> Result<Self, CommandBufferError> {
        Self::new(
            device,
            queue_family,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )
    }
}

impl VulkanObject for CommandPool {
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

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_command_pool(self.inner, None) }
    }
}

///Command buffer allocation implementation.
pub trait CommandBufferAllocator {
    ///Tries to reset the command buffer. Fails if the pool was not created
    /// with the `RESET_COMMAND_BUFFER` flag.
    ///
    /// `release_resources` is a synonym to [this](https://www.khronos.org/registry/vulkan/specs/1.3-extensions/man/html/VkCommandBufferResetFlagBits.html) flag.
    fn reset(
        &self,
        command_buffer: &vk::CommandBuffer,
        release_resources: bool,
    ) -> Result<(), CommandBufferError>;
    ///Allocates a single command buffer. Might fail if no free buffers are left
    fn allocate_buffer(
        self,
        level: vk::CommandBufferLevel,
    ) -> Result<CommandBuffer<Self>, CommandBufferError>
    where
        Self: Sized;
    ///Allocates multiple command buffers at once. If it fails the error, and all successfully allocated buffers are returned.
    ///
    /// By default this calls [allocate_buffer](CommandBufferAllocator::allocate_buffer) multiple times.
    fn allocate_buffers(
        self,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<CommandBuffer<Self>>, (CommandBufferError, Vec<CommandBuffer<Self>>)>
    where
        Self: Sized + Clone,
    {
        let mut buffers = Vec::with_capacity(count as usize);
        for _i in 0..count {
            match Self::allocate_buffer(self.clone(), level) {
                Ok(b) => buffers.push(b),
                Err(e) => return Err((e, buffers)),
            }
        }
        Ok(buffers)
    }

    fn device(&self) -> &Arc<Device>;
    fn raw(&self) -> &vk::CommandPool;
}

impl CommandBufferAllocator for Arc<CommandPool> {
    fn reset(
        &self,
        command_buffer: &vk::CommandBuffer,
        release_resources: bool,
    ) -> Result<(), CommandBufferError> {
        if !self.can_reset_buffer {
            return Err(CommandBufferError::PoolNotResetable);
        }
        let flag = if release_resources {
            vk::CommandBufferResetFlags::RELEASE_RESOURCES
        } else {
            vk::CommandBufferResetFlags::empty()
        };
        unsafe {
            self.device
                .inner
                .reset_command_buffer(*command_buffer, flag)?
        };
        Ok(())
    }

    fn allocate_buffer(
        self,
        level: vk::CommandBufferLevel,
    ) -> Result<CommandBuffer<Self>, CommandBufferError> {
        let mut buffer = unsafe {
            self.device.inner.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(self.inner)
                    .command_buffer_count(1)
                    .level(level),
            )?
        };

        if buffer.is_empty() {
            return Err(CommandBufferError::FailedToAllocate {
                allocated: 0,
                count: 1,
            });
        }

        #[cfg(feature = "logging")]
        if buffer.len() > 1 {
            log::warn!(
                "Allocated too many command buffer, expected 1, got {}",
                buffer.len()
            )
        }

        let buffer = buffer.remove(0);
        let tracking = self.device.track(ObjectType::CommandBuffer);
        Ok(CommandBuffer {
            pool: self,
            inner: buffer,
            level,
            tracking,
        })
    }

    fn device(&self) -> &Arc<Device> {
        &self.device
    }
    fn raw(&self) -> &vk::CommandPool {
        &self.inner
    }
}

pub struct CommandBuffer<P: CommandBufferAllocator> {
    ///Pool this command buffer was created from. Used for reset operations, and freeing on drop.
    pub pool: P,
    ///the raw vulkan handle
    pub inner: vk::CommandBuffer,
    pub level: vk::CommandBufferLevel,
    tracking: TrackedObject,
}

impl<P: CommandBufferAllocator> CommandBuffer<P> {
    pub fn reset(&mut self, release_resources: bool) -> Result<(), CommandBufferError> {
        self.pool.reset(&self.inner, release_resources)
    }

    ///Starts recording. `inheritance` must be set for secondary buffers.
    pub fn begin(
        &mut self,
        flags: vk::CommandBufferUsageFlags,
        inheritance: Option<&vk::CommandBufferInheritanceInfo<'_>>,
    ) -> Result<(), CommandBufferError> {
        let mut info = vk::CommandBufferBeginInfo::default().flags(flags);
        if let Some(inheritance) = inheritance {
            info = info.inheritance_info(inheritance);
        }
        unsafe {
            self.pool
                .device()
                .inner
                .begin_command_buffer(self.inner, &info)?
        };
        Ok(())
    }

    pub fn end(&mut self) -> Result<(), CommandBufferError> {
        unsafe { self.pool.device().inner.end_command_buffer(self.inner)? };
        Ok(())
    }

    ///Records commands through `f`. `begin` and `end` are called around it.
    pub fn record(
        &mut self,
        flags: vk::CommandBufferUsageFlags,
        f: impl FnOnce(&ash::Device, vk::CommandBuffer),
    ) -> Result<(), CommandBufferError> {
        self.begin(flags, None)?;
        f(&self.pool.device().inner, self.inner);
        self.end()
    }

    ///Submits this buffer to `queue`. Each wait semaphore is paired with the stage that waits on it. `fence` is
    /// signaled once execution has finished.
    ///
    /// The caller must make sure `queue` is not used on another thread at the same time.
    pub fn submit(
        &self,
        queue: &Queue,
        wait_semaphores: &[(vk::Semaphore, vk::PipelineStageFlags)],
        signal_semaphores: &[vk::Semaphore],
        fence: Option<&Fence>,
    ) -> Result<(), CommandBufferError> {
        let (waits, stages): (Vec<_>, Vec<_>) = wait_semaphores.iter().copied().unzip();
        let submit = vk::SubmitInfo::default()
            .command_buffers(core::slice::from_ref(&self.inner))
            .wait_semaphores(&waits)
            .wait_dst_stage_mask(&stages)
            .signal_semaphores(signal_semaphores);

        unsafe {
            self.pool.device().inner.queue_submit(
                queue.inner,
                core::slice::from_ref(&submit),
                fence.map(|f| f.inner).unwrap_or(vk::Fence::null()),
            )
        }
        .map_err(|e| {
            #[cfg(feature = "logging")]
            log::error!("Queue submit failed: {}", e);
            CommandBufferError::SubmitFailed(e)
        })
    }
}

impl<P: CommandBufferAllocator> VulkanObject for CommandBuffer<P> {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.inner.as_raw()
    }
    fn owning_device(&self) -> Option<&Arc<Device>> {
        Some(self.pool.device())
    }
}

impl<P: CommandBufferAllocator> Drop for CommandBuffer<P> {
    fn drop(&mut self) {
        unsafe {
            self.pool
                .device()
                .inner
                .free_command_buffers(*self.pool.raw(), core::slice::from_ref(&self.inner))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(CommandPool: Send, Sync);
        assert_impl_all!(CommandBuffer<Arc<CommandPool>>: Send, Sync);
    }
}
