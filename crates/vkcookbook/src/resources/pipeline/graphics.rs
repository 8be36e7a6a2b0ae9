use std::sync::Arc;

use ash::vk::{self, Handle};

use super::{PipelineCache, PipelineLayout, single_pipeline};
use crate::{
    context::Device,
    error::PipelineError,
    resources::RenderPass,
    tracker::{ObjectType, TrackedObject, VulkanObject},
};

///Pipeline that manages its own lifetime and keeps resources alive needed for its correct execution.
///
/// The layout and render pass are kept alive for as long as the pipeline exists.
pub struct GraphicsPipeline {
    pub device: Arc<Device>,
    pub pipeline: vk::Pipeline,
    pub layout: Arc<PipelineLayout>,
    pub render_pass: Arc<RenderPass>,
    pub subpass: u32,
    tracking: TrackedObject,
}

impl GraphicsPipeline {
    ///Simplest graphics pipeline wrapper. Assumes that `create_info` is valid. Sets the `layout`, `render_pass` and `subpass`
    /// on the `create_info` before executing. Might fail if validation is activated and an error is found.
    pub fn new(
        device: &Arc<Device>,
        create_info: vk::GraphicsPipelineCreateInfo<'_>,
        layout: Arc<PipelineLayout>,
        render_pass: Arc<RenderPass>,
        subpass: u32,
        cache: Option<&PipelineCache>,
    ) -> Result<Self, PipelineError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        if subpass >= render_pass.subpass_count {
            return Err(PipelineError::InvalidSubpass(subpass));
        }

        let create_info = create_info
            .layout(layout.layout)
            .render_pass(render_pass.inner)
            .subpass(subpass);

        let result = unsafe {
            device.inner.create_graphics_pipelines(
                cache.map(|c| c.inner).unwrap_or(vk::PipelineCache::null()),
                core::slice::from_ref(&create_info),
                None,
            )
        };
        let pipeline = single_pipeline(device, result)?;

        Ok(GraphicsPipeline {
            device: device.clone(),
            pipeline,
            layout,
            render_pass,
            subpass,
            tracking: device.track(ObjectType::Pipeline),
        })
    }
}

impl VulkanObject for GraphicsPipeline {
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

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline(self.pipeline, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(GraphicsPipeline: Send, Sync);
        assert_impl_all!(super::super::compute::ComputePipeline: Send, Sync);
    }
}
