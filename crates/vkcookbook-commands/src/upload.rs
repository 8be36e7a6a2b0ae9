use std::sync::Arc;

use vkcookbook::{
    CookbookError,
    ash::vk,
    bytemuck,
    context::Device,
    memory::MemoryUsage,
    resources::{BufDesc, Buffer, Image, ImgDesc, SharingMode},
};

use crate::{BarrierBuilder, OneTimeSubmit};

///Creates a GPU exclusive buffer filled with `data`. Returns when the buffer has finished uploading.
pub fn buffer_from_data<T: bytemuck::Pod>(
    device: &Arc<Device>,
    submit: &OneTimeSubmit,
    buffer_usage: vk::BufferUsageFlags,
    data: &[T],
) -> Result<Buffer, CookbookError> {
    let staging = Buffer::new_staging_for_data(device, data)?;
    let desc = BufDesc {
        sharing: SharingMode::Exclusive,
        size: staging.size(),
        //make sure copy works
        usage: buffer_usage | vk::BufferUsageFlags::TRANSFER_DST,
    };
    let buffer = Buffer::new(device, desc, MemoryUsage::GpuOnly, None)?;

    submit.submit(|device, cmd| unsafe {
        device.inner.cmd_copy_buffer(
            cmd,
            staging.inner,
            buffer.inner,
            &[vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: staging.size(),
            }],
        );
    })?;

    Ok(buffer)
}

///Creates a GPU exclusive image from tightly packed `data` in the image's format. Only the first mip level is filled. The image
/// is left in `final_layout`.
pub fn image_from_data(
    device: &Arc<Device>,
    submit: &OneTimeSubmit,
    mut description: ImgDesc,
    final_layout: vk::ImageLayout,
    data: &[u8],
) -> Result<Image, CookbookError> {
    description.usage |= vk::ImageUsageFlags::TRANSFER_DST;

    let staging = Buffer::new_staging_for_data(device, data)?;
    let image = Image::new(device, description, MemoryUsage::GpuOnly, None)?;

    #[cfg(feature = "logging")]
    log::info!("Copying image data to image with desc: {:?}", image.desc);

    let range = image.subresource_all();
    submit.submit(|device, cmd| {
        BarrierBuilder::new()
            .image_layout_transition(
                image.inner,
                range,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            )
            .record(
                device,
                cmd,
                vk::PipelineStageFlags::TOP_OF_PIPE,
                vk::PipelineStageFlags::TRANSFER,
            );

        unsafe {
            device.inner.cmd_copy_buffer_to_image(
                cmd,
                staging.inner,
                image.inner,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[vk::BufferImageCopy {
                    buffer_offset: 0,
                    //always copying tightly packed.
                    buffer_row_length: 0,
                    buffer_image_height: 0,
                    image_subresource: image.subresource_layers_all(),
                    image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                    image_extent: image.extent_3d(),
                }],
            );
        }

        if final_layout != vk::ImageLayout::TRANSFER_DST_OPTIMAL {
            BarrierBuilder::new()
                .image_layout_transition(
                    image.inner,
                    range,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    final_layout,
                )
                .record(
                    device,
                    cmd,
                    vk::PipelineStageFlags::TRANSFER,
                    vk::PipelineStageFlags::ALL_COMMANDS,
                );
        }
    })?;

    Ok(image)
}
