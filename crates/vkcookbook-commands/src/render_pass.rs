use std::sync::Arc;

use smallvec::SmallVec;
use vkcookbook::{PipelineError, ash::vk, context::Device, resources::RenderPass};

///Attachment references of a single subpass.
#[derive(Clone, Debug)]
pub struct SubpassDescription {
    pub bind_point: vk::PipelineBindPoint,
    pub input: SmallVec<[vk::AttachmentReference; 4]>,
    pub color: SmallVec<[vk::AttachmentReference; 4]>,
    ///Either empty, or one entry per color attachment.
    pub resolve: SmallVec<[vk::AttachmentReference; 4]>,
    pub depth_stencil: Option<vk::AttachmentReference>,
    pub preserve: SmallVec<[u32; 4]>,
}

impl Default for SubpassDescription {
    fn default() -> Self {
        SubpassDescription {
            bind_point: vk::PipelineBindPoint::GRAPHICS,
            input: SmallVec::new(),
            color: SmallVec::new(),
            resolve: SmallVec::new(),
            depth_stencil: None,
            preserve: SmallVec::new(),
        }
    }
}

impl SubpassDescription {
    pub fn with_color(mut self, attachment: u32, layout: vk::ImageLayout) -> Self {
        self.color.push(vk::AttachmentReference { attachment, layout });
        self
    }

    pub fn with_depth_stencil(mut self, attachment: u32, layout: vk::ImageLayout) -> Self {
        self.depth_stencil = Some(vk::AttachmentReference { attachment, layout });
        self
    }

    pub fn with_input(mut self, attachment: u32, layout: vk::ImageLayout) -> Self {
        self.input.push(vk::AttachmentReference { attachment, layout });
        self
    }

    pub fn with_resolve(mut self, attachment: u32, layout: vk::ImageLayout) -> Self {
        self.resolve.push(vk::AttachmentReference { attachment, layout });
        self
    }

    pub fn with_preserve(mut self, attachment: u32) -> Self {
        self.preserve.push(attachment);
        self
    }

    //All referenced attachment indices, ignoring unused references.
    fn referenced(&self) -> impl Iterator<Item = u32> + '_ {
        self.input
            .iter()
            .chain(self.color.iter())
            .chain(self.resolve.iter())
            .chain(self.depth_stencil.iter())
            .map(|r| r.attachment)
            .chain(self.preserve.iter().copied())
            .filter(|a| *a != vk::ATTACHMENT_UNUSED)
    }

    fn as_vk(&self) -> vk::SubpassDescription<'_> {
        let mut desc = vk::SubpassDescription::default()
            .pipeline_bind_point(self.bind_point)
            .input_attachments(&self.input)
            .color_attachments(&self.color)
            .preserve_attachments(&self.preserve);
        if !self.resolve.is_empty() {
            desc = desc.resolve_attachments(&self.resolve);
        }
        if let Some(depth) = &self.depth_stencil {
            desc = desc.depth_stencil_attachment(depth);
        }
        desc
    }
}

///Describes a render pass: its attachments, subpasses and the dependencies between them.
#[derive(Clone, Debug, Default)]
pub struct RenderPassBuilder {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub subpasses: Vec<SubpassDescription>,
    pub dependencies: Vec<vk::SubpassDependency>,
}

impl RenderPassBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    ///Adds `description`. Its index is the number of attachments added before.
    pub fn with_attachment(mut self, description: vk::AttachmentDescription) -> Self {
        self.attachments.push(description);
        self
    }

    ///Single sampled color attachment that is cleared on load and stored. Starts in an undefined layout.
    pub fn with_color_attachment(self, format: vk::Format, final_layout: vk::ImageLayout) -> Self {
        self.with_attachment(
            vk::AttachmentDescription::default()
                .format(format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::STORE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(final_layout),
        )
    }

    ///Depth attachment that is cleared on load. The content is not stored.
    pub fn with_depth_attachment(self, format: vk::Format) -> Self {
        self.with_attachment(
            vk::AttachmentDescription::default()
                .format(format)
                .samples(vk::SampleCountFlags::TYPE_1)
                .load_op(vk::AttachmentLoadOp::CLEAR)
                .store_op(vk::AttachmentStoreOp::DONT_CARE)
                .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
                .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
                .initial_layout(vk::ImageLayout::UNDEFINED)
                .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
        )
    }

    pub fn with_subpass(mut self, subpass: SubpassDescription) -> Self {
        self.subpasses.push(subpass);
        self
    }

    pub fn with_dependency(mut self, dependency: vk::SubpassDependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    ///Render pass with one color attachment (index 0) that ends up in `PRESENT_SRC_KHR`, and optionally a depth
    /// attachment (index 1), drawn by a single subpass.
    pub fn presentable(color_format: vk::Format, depth_format: Option<vk::Format>) -> Self {
        let mut subpass = SubpassDescription::default()
            .with_color(0, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let mut builder =
            Self::new().with_color_attachment(color_format, vk::ImageLayout::PRESENT_SRC_KHR);
        if let Some(depth_format) = depth_format {
            builder = builder.with_depth_attachment(depth_format);
            subpass = subpass.with_depth_stencil(1, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        }

        builder.with_subpass(subpass).with_dependency(
            vk::SubpassDependency::default()
                .src_subpass(vk::SUBPASS_EXTERNAL)
                .dst_subpass(0)
                .src_stage_mask(
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                )
                .dst_stage_mask(
                    vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                        | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                )
                .dst_access_mask(
                    vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                        | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                ),
        )
    }

    ///Checks that all attachment references point to an attachment, and that dependencies only reference existing
    /// subpasses.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let count = self.attachments.len();
        for subpass in &self.subpasses {
            if let Some(index) = subpass.referenced().find(|a| *a as usize >= count) {
                return Err(PipelineError::AttachmentOutOfRange { index, count });
            }
        }

        let subpass_count = self.subpasses.len() as u32;
        for dep in &self.dependencies {
            for subpass in [dep.src_subpass, dep.dst_subpass] {
                if subpass != vk::SUBPASS_EXTERNAL && subpass >= subpass_count {
                    return Err(PipelineError::InvalidSubpass(subpass));
                }
            }
        }
        Ok(())
    }

    pub fn build(&self, device: &Arc<Device>) -> Result<RenderPass, PipelineError> {
        self.validate()?;

        let subpasses = self
            .subpasses
            .iter()
            .map(|s| s.as_vk())
            .collect::<Vec<_>>();
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&self.attachments)
            .subpasses(&subpasses)
            .dependencies(&self.dependencies);

        RenderPass::new(device, &create_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presentable_is_valid() {
        let builder = RenderPassBuilder::presentable(
            vk::Format::B8G8R8A8_SRGB,
            Some(vk::Format::D32_SFLOAT),
        );
        assert_eq!(builder.attachments.len(), 2);
        assert_eq!(
            builder.attachments[0].final_layout,
            vk::ImageLayout::PRESENT_SRC_KHR
        );
        assert!(builder.subpasses[0].depth_stencil.is_some());
        assert!(builder.validate().is_ok());
    }

    #[test]
    fn out_of_range_reference_is_rejected() {
        let builder = RenderPassBuilder::new()
            .with_color_attachment(vk::Format::R8G8B8A8_UNORM, vk::ImageLayout::GENERAL)
            .with_subpass(
                SubpassDescription::default()
                    .with_color(0, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .with_input(3, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL),
            );
        assert!(matches!(
            builder.validate(),
            Err(PipelineError::AttachmentOutOfRange { index: 3, count: 1 })
        ));
    }

    #[test]
    fn unused_reference_is_allowed() {
        let builder = RenderPassBuilder::new().with_subpass(
            SubpassDescription::default()
                .with_color(vk::ATTACHMENT_UNUSED, vk::ImageLayout::UNDEFINED),
        );
        assert!(builder.validate().is_ok());
    }

    #[test]
    fn dependency_on_missing_subpass_is_rejected() {
        let builder = RenderPassBuilder::presentable(vk::Format::B8G8R8A8_SRGB, None)
            .with_dependency(vk::SubpassDependency::default().src_subpass(0).dst_subpass(1));
        assert!(matches!(
            builder.validate(),
            Err(PipelineError::InvalidSubpass(1))
        ));
    }
}
