use vkcookbook::{
    ash::vk::{self, ImageLayout},
    context::Device,
};
use tinyvec::TinyVec;

///Access mask usually associated with `layout`. Used for simple layout transitions where the user does not specify
/// the accesses.
pub fn access_for_layout(layout: ImageLayout) -> vk::AccessFlags {
    match layout {
        ImageLayout::TRANSFER_SRC_OPTIMAL => vk::AccessFlags::TRANSFER_READ,
        ImageLayout::TRANSFER_DST_OPTIMAL => vk::AccessFlags::TRANSFER_WRITE,
        ImageLayout::COLOR_ATTACHMENT_OPTIMAL => {
            vk::AccessFlags::COLOR_ATTACHMENT_READ | vk::AccessFlags::COLOR_ATTACHMENT_WRITE
        }
        ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags::SHADER_READ
        }
        ImageLayout::SHADER_READ_ONLY_OPTIMAL => vk::AccessFlags::SHADER_READ,
        ImageLayout::GENERAL => vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
        ImageLayout::PRESENT_SRC_KHR => vk::AccessFlags::MEMORY_READ,
        _ => vk::AccessFlags::empty(),
    }
}

///Barrier building helper. Lets you add barriers for images and buffers
/// via a simple builder API.
///
/// Convenient whenever building a simple array for the barriers is not possible.
///
/// Uses tinyvec internally. [STACK_ALLOCATION](Self::STACK_ALLOCATION) barriers per type are pre allocated into an array. The builder
/// however can outgrow that value.
#[derive(Debug, Default)]
pub struct BarrierBuilder {
    pub images: TinyVec<[vk::ImageMemoryBarrier<'static>; Self::STACK_ALLOCATION]>,
    pub buffers: TinyVec<[vk::BufferMemoryBarrier<'static>; Self::STACK_ALLOCATION]>,
}

impl BarrierBuilder {
    ///Amount of barriers that can be stack allocated.
    pub const STACK_ALLOCATION: usize = 6;

    pub fn new() -> Self {
        Self::default()
    }

    ///Adds this barrier to the internal collection.
    ///
    /// # Safety
    ///
    /// Make sure that the `buffer` handle is alive until the barrier is used on the GPU.
    /// This is not enforced by this object since it is dropped whenever the commandbuffer is build. Therefore, there is no
    /// way for it to extent the lifetime as needed.
    pub fn buffer_barrier(
        &mut self,
        buffer: vk::Buffer,
        offset: u64,
        size: u64,
        src_access_mask: vk::AccessFlags,
        dst_access_mask: vk::AccessFlags,
    ) -> &mut Self {
        self.buffer_queue_barrier(
            buffer,
            offset,
            size,
            src_access_mask,
            vk::QUEUE_FAMILY_IGNORED,
            dst_access_mask,
            vk::QUEUE_FAMILY_IGNORED,
        )
    }

    ///Buffer barrier that also transfers ownership from `src_queue_family` to `dst_queue_family`.
    ///
    /// # Safety see [Self::buffer_barrier].
    #[allow(clippy::too_many_arguments)]
    pub fn buffer_queue_barrier(
        &mut self,
        buffer: vk::Buffer,
        offset: u64,
        size: u64,
        src_access_mask: vk::AccessFlags,
        src_queue_family: u32,
        dst_access_mask: vk::AccessFlags,
        dst_queue_family: u32,
    ) -> &mut Self {
        let item = vk::BufferMemoryBarrier::default()
            .buffer(buffer)
            .src_access_mask(src_access_mask)
            .src_queue_family_index(src_queue_family)
            .dst_access_mask(dst_access_mask)
            .dst_queue_family_index(dst_queue_family)
            .offset(offset)
            .size(size);
        self.buffers.push(item);

        self
    }

    pub fn buffer_custom_barrier(&mut self, barrier: vk::BufferMemoryBarrier<'static>) -> &mut Self {
        self.buffers.push(barrier);
        self
    }

    ///Adds this barrier.
    ///
    /// # Safety
    ///
    /// Make sure that the `image` handle is alive until the barrier is used on the GPU.
    /// This is not enforced by this object since it is dropped whenever the commandbuffer is build. Therefore, there is no
    /// way for it to extent the lifetime as needed.
    #[allow(clippy::too_many_arguments)]
    pub fn image_barrier(
        &mut self,
        image: vk::Image,
        subresource_range: vk::ImageSubresourceRange,
        src_access_mask: vk::AccessFlags,
        src_layout: vk::ImageLayout,
        src_queue_family: u32,
        dst_access_mask: vk::AccessFlags,
        dst_layout: ImageLayout,
        dst_queue_family: u32,
    ) -> &mut Self {
        let item = vk::ImageMemoryBarrier::default()
            .image(image)
            .subresource_range(subresource_range)
            .src_access_mask(src_access_mask)
            .src_queue_family_index(src_queue_family)
            .old_layout(src_layout)
            .dst_access_mask(dst_access_mask)
            .dst_queue_family_index(dst_queue_family)
            .new_layout(dst_layout);

        #[cfg(feature = "logging")]
        log::trace!("full_transition[{:?}] {:#?}", image, item);

        self.images.push(item);

        self
    }

    ///pushes only a layout transition for the given region. The access masks are derived from the layouts.
    ///
    /// # Safety see [Self::image_barrier].
    pub fn image_layout_transition(
        &mut self,
        image: vk::Image,
        subresource_range: vk::ImageSubresourceRange,
        src_layout: vk::ImageLayout,
        dst_layout: ImageLayout,
    ) -> &mut Self {
        #[cfg(feature = "logging")]
        log::trace!("layout[{:?}] {:#?} -> {:#?}", image, src_layout, dst_layout);

        self.image_barrier(
            image,
            subresource_range,
            access_for_layout(src_layout),
            src_layout,
            vk::QUEUE_FAMILY_IGNORED,
            access_for_layout(dst_layout),
            dst_layout,
            vk::QUEUE_FAMILY_IGNORED,
        )
    }

    ///pushes only a queue ownership transfer for the given region.
    ///
    /// # Safety see [Self::image_barrier].
    pub fn image_queue_transition(
        &mut self,
        image: vk::Image,
        subresource_range: vk::ImageSubresourceRange,
        layout: vk::ImageLayout,
        src_queue_family: u32,
        dst_queue_family: u32,
    ) -> &mut Self {
        #[cfg(feature = "logging")]
        log::trace!(
            "queue[{:?}] {:#?} -> {:#?}",
            image,
            src_queue_family,
            dst_queue_family
        );

        self.image_barrier(
            image,
            subresource_range,
            vk::AccessFlags::empty(),
            layout,
            src_queue_family,
            vk::AccessFlags::empty(),
            layout,
            dst_queue_family,
        )
    }

    pub fn image_custom_barrier(&mut self, barrier: vk::ImageMemoryBarrier<'static>) -> &mut Self {
        #[cfg(feature = "logging")]
        log::trace!("full_custom_transition {:#?}", barrier);
        self.images.push(barrier);
        self
    }

    ///Returns true if at least one barrier has been added.
    pub fn has_barrier(&self) -> bool {
        !self.images.is_empty() || !self.buffers.is_empty()
    }

    ///Records all barriers into `command_buffer`. Does nothing if no barrier was added.
    pub fn record(
        &self,
        device: &Device,
        command_buffer: vk::CommandBuffer,
        src_stage: vk::PipelineStageFlags,
        dst_stage: vk::PipelineStageFlags,
    ) {
        if !self.has_barrier() {
            return;
        }
        unsafe {
            device.inner.cmd_pipeline_barrier(
                command_buffer,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                self.buffers.as_slice(),
                self.images.as_slice(),
            )
        }
    }

    ///Removes all barriers, keeping the allocation.
    pub fn clear(&mut self) {
        self.images.clear();
        self.buffers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vkcookbook::ash::vk::Handle;

    fn color_range() -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }

    #[test]
    fn layout_transition_derives_access() {
        let mut builder = BarrierBuilder::new();
        assert!(!builder.has_barrier());

        builder.image_layout_transition(
            vk::Image::null(),
            color_range(),
            ImageLayout::UNDEFINED,
            ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        assert!(builder.has_barrier());

        let barrier = builder.images[0];
        assert_eq!(barrier.src_access_mask, vk::AccessFlags::empty());
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(barrier.new_layout, ImageLayout::TRANSFER_DST_OPTIMAL);
    }

    #[test]
    fn builder_outgrows_stack() {
        let mut builder = BarrierBuilder::new();
        for i in 0..(BarrierBuilder::STACK_ALLOCATION + 2) {
            builder.buffer_barrier(
                vk::Buffer::null(),
                i as u64 * 16,
                16,
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
            );
        }
        assert_eq!(builder.buffers.len(), BarrierBuilder::STACK_ALLOCATION + 2);
        assert_eq!(builder.buffers[7].offset, 112);

        builder.clear();
        assert!(!builder.has_barrier());
    }
}
