use crate::{
    context::Device,
    error::PipelineError,
    tracker::{ObjectType, TrackedObject, VulkanObject},
};
use ash::vk::{self, Handle};
use std::sync::Arc;

pub mod compute;
pub mod graphics;

use super::DescriptorSetLayout;

pub struct PipelineLayout {
    pub device: Arc<Device>,
    pub layout: vk::PipelineLayout,
    ///Set layouts this layout was created from. Kept alive for the lifetime of the pipeline layout.
    pub set_layouts: Vec<Arc<DescriptorSetLayout>>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
    tracking: TrackedObject,
}

impl PipelineLayout {
    pub fn new(
        device: &Arc<Device>,
        descriptor_set_layouts: &[Arc<DescriptorSetLayout>],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self, PipelineError> {
        let raw_layouts = descriptor_set_layouts
            .iter()
            .map(|l| l.inner)
            .collect::<Vec<_>>();
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .push_constant_ranges(push_constant_ranges)
            .set_layouts(&raw_layouts);

        let layout = unsafe { device.inner.create_pipeline_layout(&create_info, None)? };

        Ok(PipelineLayout {
            device: device.clone(),
            layout,
            set_layouts: descriptor_set_layouts.to_vec(),
            push_constant_ranges: push_constant_ranges.to_vec(),
            tracking: device.track(ObjectType::PipelineLayout),
        })
    }
}

impl VulkanObject for PipelineLayout {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.layout.as_raw()
    }
    fn owning_device(&self) -> Option<&Arc<Device>> {
        Some(&self.device)
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline_layout(self.layout, None) }
    }
}

///Pipeline cache that can be seeded with, and serialized to, driver specific data.
pub struct PipelineCache {
    pub device: Arc<Device>,
    pub inner: vk::PipelineCache,
    tracking: TrackedObject,
}

impl PipelineCache {
    ///Creates the cache. `initial_data` is usually the result of a previous [data](Self::data) call. The driver
    /// ignores data that was created by another driver or device.
    pub fn new(device: &Arc<Device>, initial_data: &[u8]) -> Result<Self, PipelineError> {
        let info = vk::PipelineCacheCreateInfo::default().initial_data(initial_data);
        let inner = unsafe { device.inner.create_pipeline_cache(&info, None)? };

        Ok(PipelineCache {
            device: device.clone(),
            inner,
            tracking: device.track(ObjectType::PipelineCache),
        })
    }

    ///Current content of the cache.
    pub fn data(&self) -> Result<Vec<u8>, PipelineError> {
        Ok(unsafe { self.device.inner.get_pipeline_cache_data(self.inner)? })
    }
}

impl VulkanObject for PipelineCache {
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

impl Drop for PipelineCache {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline_cache(self.inner, None) }
    }
}

//Single pipeline out of a batch creation call.
pub(crate) fn single_pipeline(
    device: &Device,
    result: Result<Vec<vk::Pipeline>, (Vec<vk::Pipeline>, vk::Result)>,
) -> Result<vk::Pipeline, PipelineError> {
    match result {
        Ok(mut pipelines) if pipelines.len() == 1 => Ok(pipelines.remove(0)),
        Ok(pipelines) => {
            #[cfg(feature = "logging")]
            log::error!("Pipeline count wasn't 1, was {}", pipelines.len());
            for p in pipelines {
                unsafe { device.inner.destroy_pipeline(p, None) };
            }
            Err(PipelineError::Allocation)
        }
        Err((pipelines, err)) => {
            #[cfg(feature = "logging")]
            log::error!("Pipeline creation failed: {}", err);
            for p in pipelines.into_iter().filter(|p| *p != vk::Pipeline::null()) {
                unsafe { device.inner.destroy_pipeline(p, None) };
            }
            Err(err.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(PipelineLayout: Send, Sync);
        assert_impl_all!(PipelineCache: Send, Sync);
    }
}
