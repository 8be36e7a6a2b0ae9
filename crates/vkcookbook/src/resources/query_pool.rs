use std::sync::Arc;

use ash::vk::{self, Handle};

use crate::{
    context::Device,
    error::DeviceError,
    tracker::{ObjectType, TrackedObject, VulkanObject},
};

///Query pool of a single [type](https://registry.khronos.org/vulkan/specs/1.3-extensions/html/vkspec.html#queries), for instance timestamps or occlusion queries.
pub struct QueryPool {
    pub pool: vk::QueryPool,
    pub device: Arc<Device>,
    pub ty: vk::QueryType,
    size: u32,
    tracking: TrackedObject,
}

impl QueryPool {
    pub fn new(device: &Arc<Device>, size: u32, ty: vk::QueryType) -> Result<Self, DeviceError> {
        let create_info = vk::QueryPoolCreateInfo::default()
            .query_type(ty)
            .query_count(size);
        let pool = unsafe { device.inner.create_query_pool(&create_info, None)? };

        Ok(QueryPool {
            pool,
            device: device.clone(),
            ty,
            size,
            tracking: device.track(ObjectType::QueryPool),
        })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    ///Records a reset of all queries into `command_buffer`.
    pub fn reset(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device
                .inner
                .cmd_reset_query_pool(command_buffer, self.pool, 0, self.size);
        }
    }

    ///Records a timestamp write of `query` after `stage` finished.
    pub fn write_timestamp(
        &self,
        command_buffer: vk::CommandBuffer,
        stage: vk::PipelineStageFlags,
        query: u32,
    ) {
        debug_assert!(query < self.size);
        unsafe {
            self.device
                .inner
                .cmd_write_timestamp(command_buffer, stage, self.pool, query)
        }
    }

    ///Reads back the first `dst.len()` results in 64bit format. Extra elements beyond the pool's size are left untouched.
    ///
    /// # Note
    ///
    /// This operation might block if your flags contain `WAIT`.
    pub fn results_u64(
        &self,
        dst: &mut [u64],
        flags: vk::QueryResultFlags,
    ) -> Result<(), DeviceError> {
        let count = dst.len().min(self.size as usize);
        if count == 0 {
            return Ok(());
        }
        unsafe {
            self.device.inner.get_query_pool_results(
                self.pool,
                0,
                &mut dst[..count],
                flags | vk::QueryResultFlags::TYPE_64,
            )?
        };
        Ok(())
    }

    ///Converts a difference of two timestamp queries to nanoseconds.
    pub fn timestamp_to_ns(&self, ticks: u64) -> f64 {
        ticks as f64 * self.device.properties.limits.timestamp_period as f64
    }
}

impl VulkanObject for QueryPool {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.pool.as_raw()
    }
    fn owning_device(&self) -> Option<&Arc<Device>> {
        Some(&self.device)
    }
}

impl Drop for QueryPool {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_query_pool(self.pool, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(QueryPool: Send, Sync);
    }
}
