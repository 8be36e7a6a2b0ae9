//! Runs the loader → instance → device → resource path on the first available GPU. Every test is skipped if no
//! Vulkan driver is installed.
use std::sync::Arc;

use vkcookbook::{
    ash::vk,
    context::Ctx,
    memory::MemoryUsage,
    resources::{
        BufDesc, Buffer, CommandBufferAllocator, CommandPool, DescriptorAllocator, DescriptorPool,
        DescriptorSetLayout, Framebuffer, GraphicsPipeline, Image, ImgDesc, PipelineLayout,
        RenderPass, SafeImageView, SharingMode,
    },
    sync::{Event, Fence, Semaphore, TimelineSemaphore},
    tracker::{ObjectType, VulkanObject},
    CookbookError, MemoryError, PipelineError, SyncError,
};

fn context() -> Option<Ctx> {
    let _ = simple_logger::SimpleLogger::new().env().init();
    match Ctx::new_headless(false) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            eprintln!("Skipping, no usable Vulkan device: {}", e);
            None
        }
    }
}

#[test]
fn loader_resolves_core_functions() {
    let Some(ctx) = context() else { return };
    assert!(ctx.loader.exported.contains(c"vkGetInstanceProcAddr"));
    assert!(ctx.loader.global.contains(c"vkCreateInstance"));
    assert!(ctx.instance.functions.contains(c"vkEnumeratePhysicalDevices"));
    assert!(ctx.device.functions.contains(c"vkCreateBuffer"));
}

#[test]
fn tracker_counts_wrappers() {
    let Some(ctx) = context() else { return };
    assert_eq!(ctx.tracker.live_count(ObjectType::Instance), 1);
    assert_eq!(ctx.tracker.live_count(ObjectType::Device), 1);

    let buffer = Buffer::new(
        &ctx.device,
        BufDesc::for_slice::<u32>(16, vk::BufferUsageFlags::STORAGE_BUFFER),
        MemoryUsage::GpuOnly,
        None,
    )
    .unwrap();
    assert_eq!(ctx.tracker.live_count(ObjectType::Buffer), 1);
    assert_eq!(ctx.tracker.live_count(ObjectType::DeviceMemory), 1);
    assert_eq!(buffer.object_type(), ObjectType::Buffer);
    assert!(buffer.owning_device().is_some());

    drop(buffer);
    assert_eq!(ctx.tracker.live_count(ObjectType::Buffer), 0);
    assert_eq!(ctx.tracker.live_count(ObjectType::DeviceMemory), 0);
    assert_eq!(ctx.tracker.created_count(ObjectType::Buffer), 1);
}

#[test]
fn staging_buffer_roundtrip() {
    let Some(ctx) = context() else { return };
    let data = [1u32, 2, 3, 4];
    let mut buffer = Buffer::new_staging_for_data(&ctx.device, &data).unwrap();
    assert_eq!(buffer.size(), 16);
    assert_eq!(buffer.read().unwrap(), vkcookbook::bytemuck::cast_slice::<u32, u8>(&data));

    buffer.write(4, &[9, 9, 9, 9]).unwrap();
    assert_eq!(&buffer.read().unwrap()[4..8], &[9, 9, 9, 9]);

    assert!(matches!(
        buffer.write(14, &[0; 4]),
        Err(vkcookbook::BufferMapError::PartialyWritten { written: 2, size: 4 })
    ));
}

#[test]
fn gpu_only_buffer_is_not_mappable() {
    let Some(ctx) = context() else { return };
    let mut buffer = Buffer::new(
        &ctx.device,
        BufDesc::for_slice::<u8>(64, vk::BufferUsageFlags::VERTEX_BUFFER),
        MemoryUsage::GpuOnly,
        None,
    )
    .unwrap();
    //Integrated GPUs might expose host visible device local memory.
    if !buffer.memory.is_mapped() {
        assert!(matches!(
            buffer.write(0, &[1]),
            Err(vkcookbook::BufferMapError::NotMapable)
        ));
    }
}

#[test]
fn image_and_view() {
    let Some(ctx) = context() else { return };
    let image = Arc::new(
        Image::new(
            &ctx.device,
            ImgDesc::texture_2d(64, 64, vk::Format::R8G8B8A8_UNORM),
            MemoryUsage::GpuOnly,
            None,
        )
        .unwrap(),
    );
    let view = image.view(image.view_all()).unwrap();
    assert_eq!(ctx.tracker.live_count(ObjectType::ImageView), 1);
    ctx.device.name_object(&view, c"test view").unwrap();

    drop(view);
    drop(image);
    assert_eq!(ctx.tracker.live_count(ObjectType::Image), 0);
}

#[test]
fn fill_buffer_on_gpu() {
    let Some(ctx) = context() else { return };
    let queue = ctx.graphics_queue().unwrap().clone();
    let buffer = Buffer::new(
        &ctx.device,
        BufDesc {
            size: 64,
            usage: vk::BufferUsageFlags::TRANSFER_DST,
            sharing: SharingMode::Exclusive,
        },
        MemoryUsage::GpuToCpu,
        None,
    )
    .unwrap();

    let pool = Arc::new(CommandPool::new_resetable(&ctx.device, queue.family_index).unwrap());
    let mut command_buffer = pool
        .clone()
        .allocate_buffer(vk::CommandBufferLevel::PRIMARY)
        .unwrap();
    assert_eq!(ctx.tracker.live_count(ObjectType::CommandBuffer), 1);

    command_buffer
        .record(
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            |device, cmd| unsafe { device.cmd_fill_buffer(cmd, buffer.inner, 0, 64, 0xdead_beef) },
        )
        .unwrap();

    let fence = Fence::new(&ctx.device, false).unwrap();
    command_buffer.submit(&queue, &[], &[], Some(&fence)).unwrap();
    fence.wait(u64::MAX).unwrap();
    assert!(fence.is_signaled().unwrap());

    let words: &[u32] = vkcookbook::bytemuck::cast_slice(buffer.read().unwrap());
    assert!(words.iter().all(|w| *w == 0xdead_beef));

    command_buffer.reset(true).unwrap();
    fence.reset().unwrap();
    assert!(!fence.is_signaled().unwrap());
}

#[test]
fn sync_primitives() {
    let Some(ctx) = context() else { return };
    let _semaphore = Semaphore::new(&ctx.device).unwrap();
    let fence = Fence::new(&ctx.device, true).unwrap();
    assert!(fence.is_signaled().unwrap());
    Fence::wait_all(&[&fence], 0).unwrap();

    let event = Event::new(&ctx.device).unwrap();
    assert!(!event.status().unwrap());
    event.set().unwrap();
    assert!(event.status().unwrap());
    event.reset().unwrap();
    assert!(!event.status().unwrap());
}

#[test]
fn descriptor_sets_are_freed() {
    let Some(ctx) = context() else { return };
    let layout = DescriptorSetLayout::new(
        &ctx.device,
        &[vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::COMPUTE)],
    )
    .unwrap();
    let pool = Arc::new(
        DescriptorPool::new_for_layout(
            &ctx.device,
            vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET,
            &layout,
            2,
        )
        .unwrap(),
    );
    assert!(pool.can_free);

    let buffer = Buffer::new(
        &ctx.device,
        BufDesc::for_slice::<u32>(4, vk::BufferUsageFlags::STORAGE_BUFFER),
        MemoryUsage::GpuOnly,
        None,
    )
    .unwrap();

    let mut set = pool.clone().allocate(&layout).unwrap();
    set.write_buffer(0, vk::DescriptorType::STORAGE_BUFFER, &buffer);
    assert_eq!(ctx.tracker.live_count(ObjectType::DescriptorSet), 1);
    drop(set);
    assert_eq!(ctx.tracker.live_count(ObjectType::DescriptorSet), 0);
}

#[test]
fn no_leaks_after_teardown() {
    let Some(ctx) = context() else { return };
    let tracker = ctx.tracker.clone();
    {
        let _buffer = Buffer::new_staging_for_data(&ctx.device, &[0u8; 32]).unwrap();
        let _fence = Fence::new(&ctx.device, false).unwrap();
    }
    drop(ctx);
    assert_eq!(tracker.report_leaks(), 0);
}

//Single color attachment, single subpass.
fn color_render_pass(ctx: &Ctx) -> Arc<RenderPass> {
    let attachment = vk::AttachmentDescription::default()
        .format(vk::Format::R8G8B8A8_UNORM)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    let color_ref = vk::AttachmentReference::default()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    let subpass = vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(std::slice::from_ref(&color_ref));
    let info = vk::RenderPassCreateInfo::default()
        .attachments(std::slice::from_ref(&attachment))
        .subpasses(std::slice::from_ref(&subpass));
    Arc::new(RenderPass::new(&ctx.device, &info).unwrap())
}

#[test]
fn framebuffer_needs_every_attachment() {
    let Some(ctx) = context() else { return };
    let render_pass = color_render_pass(&ctx);
    assert_eq!(render_pass.attachment_count, 1);

    let res = Framebuffer::new(
        &render_pass,
        &[],
        vk::Extent2D {
            width: 64,
            height: 64,
        },
        1,
    );
    assert!(matches!(
        res,
        Err(PipelineError::AttachmentCountMismatch {
            expected: 1,
            got: 0
        })
    ));
    assert_eq!(ctx.tracker.live_count(ObjectType::Framebuffer), 0);
}

#[test]
fn graphics_pipeline_rejects_missing_subpass() {
    let Some(ctx) = context() else { return };
    let render_pass = color_render_pass(&ctx);
    let layout = Arc::new(PipelineLayout::new(&ctx.device, &[], &[]).unwrap());

    let res = GraphicsPipeline::new(
        &ctx.device,
        vk::GraphicsPipelineCreateInfo::default(),
        layout,
        render_pass,
        1,
        None,
    );
    assert!(matches!(res, Err(PipelineError::InvalidSubpass(1))));
    assert_eq!(ctx.tracker.live_count(ObjectType::Pipeline), 0);
}

#[test]
fn timeline_semaphore_counts() {
    let Some(ctx) = context() else { return };
    if ctx.device.api_version >= vk::API_VERSION_1_2 {
        assert!(ctx.device.timeline_semaphores);
    }
    if !ctx.device.timeline_semaphores {
        assert!(matches!(
            TimelineSemaphore::new(&ctx.device, 0),
            Err(SyncError::TimelineUnsupported)
        ));
        return;
    }

    let semaphore = TimelineSemaphore::new(&ctx.device, 1).unwrap();
    assert_eq!(semaphore.get_value().unwrap(), 1);
    semaphore.wait(1, 0).unwrap();

    semaphore.set_value(5).unwrap();
    assert_eq!(semaphore.get_value().unwrap(), 5);
    let other = TimelineSemaphore::new(&ctx.device, 7).unwrap();
    TimelineSemaphore::wait_for(&[(&semaphore, 3), (&other, 7)], 0).unwrap();
    assert!(matches!(
        semaphore.wait(10, 0),
        Err(SyncError::Timeout(0))
    ));
}

#[test]
fn empty_staging_buffer_is_rejected() {
    let Some(ctx) = context() else { return };
    let res = Buffer::new_staging_for_data::<u32>(&ctx.device, &[]);
    assert!(matches!(
        res,
        Err(CookbookError::MemoryError(MemoryError::ZeroSize))
    ));
    assert_eq!(ctx.tracker.created_count(ObjectType::Buffer), 0);
}
