use std::sync::Arc;

use ash::vk::{self, Handle};

use super::ImageView;
use crate::{
    context::Device,
    error::PipelineError,
    tracker::{ObjectType, TrackedObject, VulkanObject},
};

///Renderpass describing the attachments and the order of subpasses. Note that this is only a thin wrapper over the creation and destruction process.
pub struct RenderPass {
    pub device: Arc<Device>,
    pub inner: vk::RenderPass,
    pub attachment_count: usize,
    pub subpass_count: u32,
    tracking: TrackedObject,
}

impl RenderPass {
    pub fn new(
        device: &Arc<Device>,
        create_info: &vk::RenderPassCreateInfo<'_>,
    ) -> Result<Self, PipelineError> {
        let renderpass = unsafe { device.inner.create_render_pass(create_info, None)? };
        Ok(RenderPass {
            device: device.clone(),
            inner: renderpass,
            attachment_count: create_info.attachment_count as usize,
            subpass_count: create_info.subpass_count,
            tracking: device.track(ObjectType::RenderPass),
        })
    }
}

impl VulkanObject for RenderPass {
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

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_render_pass(self.inner, None) }
    }
}

///Framebuffer for a [RenderPass]. Keeps the render pass and all attachment views alive.
pub struct Framebuffer {
    pub device: Arc<Device>,
    pub inner: vk::Framebuffer,
    pub render_pass: Arc<RenderPass>,
    pub attachments: Vec<Arc<ImageView>>,
    pub extent: vk::Extent2D,
    pub layers: u32,
    tracking: TrackedObject,
}

impl Framebuffer {
    ///Creates a framebuffer with one view per attachment of `render_pass`, in the order of the render pass attachments.
    pub fn new(
        render_pass: &Arc<RenderPass>,
        attachments: &[Arc<ImageView>],
        extent: vk::Extent2D,
        layers: u32,
    ) -> Result<Self, PipelineError> {
        if attachments.len() != render_pass.attachment_count {
            return Err(PipelineError::AttachmentCountMismatch {
                expected: render_pass.attachment_count,
                got: attachments.len(),
            });
        }

        let views = attachments.iter().map(|a| a.view).collect::<Vec<_>>();
        let info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass.inner)
            .attachments(&views)
            .width(extent.width)
            .height(extent.height)
            .layers(layers);

        let device = &render_pass.device;
        let inner = unsafe { device.inner.create_framebuffer(&info, None)? };

        Ok(Framebuffer {
            device: device.clone(),
            inner,
            render_pass: render_pass.clone(),
            attachments: attachments.to_vec(),
            extent,
            layers,
            tracking: device.track(ObjectType::Framebuffer),
        })
    }

    ///Area covering the whole framebuffer.
    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}

impl VulkanObject for Framebuffer {
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

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_framebuffer(self.inner, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(RenderPass: Send, Sync);
        assert_impl_all!(Framebuffer: Send, Sync);
    }
}
