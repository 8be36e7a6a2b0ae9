use std::sync::Arc;

use vkcookbook::{
    CookbookError,
    ash::vk,
    context::{Device, Queue},
    resources::{CommandBufferAllocator, CommandPool},
    sync::Fence,
};

///Records short lived command buffers, submits them and blocks until the GPU has finished executing them.
/// Handy for uploads and one-off layout transitions at load time. Not meant for per-frame work.
pub struct OneTimeSubmit {
    pub device: Arc<Device>,
    pub queue: Queue,
    pool: Arc<CommandPool>,
}

impl OneTimeSubmit {
    pub fn new(device: &Arc<Device>, queue: &Queue) -> Result<Self, CookbookError> {
        let pool = CommandPool::new(
            device,
            queue.family_index,
            vk::CommandPoolCreateFlags::TRANSIENT,
        )?;
        Ok(OneTimeSubmit {
            device: device.clone(),
            queue: queue.clone(),
            pool: Arc::new(pool),
        })
    }

    ///Records `record` into a fresh primary command buffer, submits it to the queue and waits until it has finished.
    ///Returns whatever `record` returns. Resources moved into the returned value are guaranteed to outlive the execution.
    ///
    /// The caller must make sure the queue is not used on another thread at the same time.
    pub fn submit<R>(
        &self,
        record: impl FnOnce(&Device, vk::CommandBuffer) -> R,
    ) -> Result<R, CookbookError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let mut command_buffer = self
            .pool
            .clone()
            .allocate_buffer(vk::CommandBufferLevel::PRIMARY)?;

        command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, None)?;
        let result = record(&self.device, command_buffer.inner);
        command_buffer.end()?;

        let fence = Fence::new(&self.device, false)?;
        command_buffer.submit(&self.queue, &[], &[], Some(&fence))?;

        if let Err(e) = fence.wait(u64::MAX) {
            #[cfg(feature = "logging")]
            log::error!("Failed to wait for one time submit: {}", e);
            //the buffer might still be in use
            self.device.wait_idle()?;
            return Err(e.into());
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(OneTimeSubmit: Send, Sync);
    }
}
