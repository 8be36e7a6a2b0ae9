use std::sync::Arc;

use ash::vk::{self, Handle};

use super::{PipelineCache, PipelineLayout, single_pipeline};
use crate::{
    context::Device,
    error::PipelineError,
    resources::ShaderStage,
    tracker::{ObjectType, TrackedObject, VulkanObject},
};

///Pipeline that manages its own lifetime and keeps resources alive needed for its correct execution.
pub struct ComputePipeline {
    pub device: Arc<Device>,
    pub pipeline: vk::Pipeline,
    pub layout: Arc<PipelineLayout>,
    tracking: TrackedObject,
}

impl ComputePipeline {
    pub fn new<'a>(
        device: &Arc<Device>,
        stage: &'a ShaderStage,
        specialization_info: Option<&'a vk::SpecializationInfo<'a>>,
        layout: Arc<PipelineLayout>,
        cache: Option<&PipelineCache>,
    ) -> Result<Self, PipelineError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage.as_create_info(specialization_info))
            .layout(layout.layout);

        let result = unsafe {
            device.inner.create_compute_pipelines(
                cache.map(|c| c.inner).unwrap_or(vk::PipelineCache::null()),
                core::slice::from_ref(&create_info),
                None,
            )
        };
        let pipeline = single_pipeline(device, result)?;

        Ok(ComputePipeline {
            device: device.clone(),
            pipeline,
            layout,
            tracking: device.track(ObjectType::Pipeline),
        })
    }
}

impl VulkanObject for ComputePipeline {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.pipeline.as_raw()
    }
    fn owning_device(&self) -> Option<&Arc<Device>> {
        Some(&self.device)
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline(self.pipeline, None) }
    }
}
