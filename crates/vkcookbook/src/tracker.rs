//! ## Object tracking
//!
//! Every wrapper registers itself with an [ObjectTracker] when it is created, and receives a [TrackedObject]
//! token in exchange. The token unregisters the object when it is dropped, which happens together with the
//! wrapper. Whatever is still registered at shutdown has leaked, [ObjectTracker::report_leaks] lists it.
//!
//! The tracker is an ordinary value. Share it through an `Arc` with everything that should be counted together.

use std::sync::{Arc, Mutex, MutexGuard};

use ahash::AHashMap;
use ash::vk;

use crate::context::Device;

///Kind of native handle a wrapper owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ObjectType {
    Instance,
    DebugMessenger,
    Surface,
    Device,
    DeviceMemory,
    Buffer,
    BufferView,
    Image,
    ImageView,
    Sampler,
    ShaderModule,
    PipelineLayout,
    PipelineCache,
    Pipeline,
    RenderPass,
    Framebuffer,
    DescriptorSetLayout,
    DescriptorPool,
    DescriptorSet,
    CommandPool,
    CommandBuffer,
    Semaphore,
    Fence,
    Event,
    QueryPool,
    Swapchain,
}

impl ObjectType {
    pub const ALL: [ObjectType; 26] = [
        ObjectType::Instance,
        ObjectType::DebugMessenger,
        ObjectType::Surface,
        ObjectType::Device,
        ObjectType::DeviceMemory,
        ObjectType::Buffer,
        ObjectType::BufferView,
        ObjectType::Image,
        ObjectType::ImageView,
        ObjectType::Sampler,
        ObjectType::ShaderModule,
        ObjectType::PipelineLayout,
        ObjectType::PipelineCache,
        ObjectType::Pipeline,
        ObjectType::RenderPass,
        ObjectType::Framebuffer,
        ObjectType::DescriptorSetLayout,
        ObjectType::DescriptorPool,
        ObjectType::DescriptorSet,
        ObjectType::CommandPool,
        ObjectType::CommandBuffer,
        ObjectType::Semaphore,
        ObjectType::Fence,
        ObjectType::Event,
        ObjectType::QueryPool,
        ObjectType::Swapchain,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ObjectType::Instance => "Instance",
            ObjectType::DebugMessenger => "DebugMessenger",
            ObjectType::Surface => "Surface",
            ObjectType::Device => "Device",
            ObjectType::DeviceMemory => "DeviceMemory",
            ObjectType::Buffer => "Buffer",
            ObjectType::BufferView => "BufferView",
            ObjectType::Image => "Image",
            ObjectType::ImageView => "ImageView",
            ObjectType::Sampler => "Sampler",
            ObjectType::ShaderModule => "ShaderModule",
            ObjectType::PipelineLayout => "PipelineLayout",
            ObjectType::PipelineCache => "PipelineCache",
            ObjectType::Pipeline => "Pipeline",
            ObjectType::RenderPass => "RenderPass",
            ObjectType::Framebuffer => "Framebuffer",
            ObjectType::DescriptorSetLayout => "DescriptorSetLayout",
            ObjectType::DescriptorPool => "DescriptorPool",
            ObjectType::DescriptorSet => "DescriptorSet",
            ObjectType::CommandPool => "CommandPool",
            ObjectType::CommandBuffer => "CommandBuffer",
            ObjectType::Semaphore => "Semaphore",
            ObjectType::Fence => "Fence",
            ObjectType::Event => "Event",
            ObjectType::QueryPool => "QueryPool",
            ObjectType::Swapchain => "Swapchain",
        }
    }

    ///The matching Vulkan object type, used for debug names.
    pub fn as_vk(&self) -> vk::ObjectType {
        match self {
            ObjectType::Instance => vk::ObjectType::INSTANCE,
            ObjectType::DebugMessenger => vk::ObjectType::DEBUG_UTILS_MESSENGER_EXT,
            ObjectType::Surface => vk::ObjectType::SURFACE_KHR,
            ObjectType::Device => vk::ObjectType::DEVICE,
            ObjectType::DeviceMemory => vk::ObjectType::DEVICE_MEMORY,
            ObjectType::Buffer => vk::ObjectType::BUFFER,
            ObjectType::BufferView => vk::ObjectType::BUFFER_VIEW,
            ObjectType::Image => vk::ObjectType::IMAGE,
            ObjectType::ImageView => vk::ObjectType::IMAGE_VIEW,
            ObjectType::Sampler => vk::ObjectType::SAMPLER,
            ObjectType::ShaderModule => vk::ObjectType::SHADER_MODULE,
            ObjectType::PipelineLayout => vk::ObjectType::PIPELINE_LAYOUT,
            ObjectType::PipelineCache => vk::ObjectType::PIPELINE_CACHE,
            ObjectType::Pipeline => vk::ObjectType::PIPELINE,
            ObjectType::RenderPass => vk::ObjectType::RENDER_PASS,
            ObjectType::Framebuffer => vk::ObjectType::FRAMEBUFFER,
            ObjectType::DescriptorSetLayout => vk::ObjectType::DESCRIPTOR_SET_LAYOUT,
            ObjectType::DescriptorPool => vk::ObjectType::DESCRIPTOR_POOL,
            ObjectType::DescriptorSet => vk::ObjectType::DESCRIPTOR_SET,
            ObjectType::CommandPool => vk::ObjectType::COMMAND_POOL,
            ObjectType::CommandBuffer => vk::ObjectType::COMMAND_BUFFER,
            ObjectType::Semaphore => vk::ObjectType::SEMAPHORE,
            ObjectType::Fence => vk::ObjectType::FENCE,
            ObjectType::Event => vk::ObjectType::EVENT,
            ObjectType::QueryPool => vk::ObjectType::QUERY_POOL,
            ObjectType::Swapchain => vk::ObjectType::SWAPCHAIN_KHR,
        }
    }

    ///True for objects that belong to the instance rather than a device.
    pub fn is_instance_level(&self) -> bool {
        matches!(
            self,
            ObjectType::Instance | ObjectType::DebugMessenger | ObjectType::Surface
        )
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Counts {
    live: usize,
    created: usize,
}

///Counts live wrapper objects per [ObjectType].
#[derive(Debug, Default)]
pub struct ObjectTracker {
    counts: Mutex<AHashMap<ObjectType, Counts>>,
}

impl ObjectTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(ObjectTracker::default())
    }

    //A poisoned map is still consistent, every critical section is a single counter update.
    fn counts(&self) -> MutexGuard<'_, AHashMap<ObjectType, Counts>> {
        self.counts
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    ///Registers a new object of type `ty`. The object stays registered until the returned token is dropped.
    pub fn register(self: &Arc<Self>, ty: ObjectType) -> TrackedObject {
        {
            let mut counts = self.counts();
            let entry = counts.entry(ty).or_default();
            entry.live += 1;
            entry.created += 1;
        }

        #[cfg(feature = "logging")]
        log::trace!("Registered {}", ty.name());

        TrackedObject {
            tracker: self.clone(),
            ty,
        }
    }

    fn unregister(&self, ty: ObjectType) {
        let mut counts = self.counts();
        match counts.get_mut(&ty) {
            Some(entry) if entry.live > 0 => entry.live -= 1,
            _ => {
                #[cfg(feature = "logging")]
                log::error!("Unregistered {} that was never registered", ty.name());
            }
        }
    }

    ///Number of objects of type `ty` that are currently alive.
    pub fn live_count(&self, ty: ObjectType) -> usize {
        self.counts().get(&ty).map(|c| c.live).unwrap_or(0)
    }

    ///Number of objects of type `ty` that were ever registered.
    pub fn created_count(&self, ty: ObjectType) -> usize {
        self.counts().get(&ty).map(|c| c.created).unwrap_or(0)
    }

    pub fn total_live(&self) -> usize {
        self.counts().values().map(|c| c.live).sum()
    }

    ///All types with live objects, ordered by type.
    pub fn snapshot(&self) -> Vec<(ObjectType, usize)> {
        let mut live = self
            .counts()
            .iter()
            .filter(|(_, c)| c.live > 0)
            .map(|(ty, c)| (*ty, c.live))
            .collect::<Vec<_>>();
        live.sort();
        live
    }

    ///Logs every type that still has live objects and returns the total number of those objects.
    pub fn report_leaks(&self) -> usize {
        let snapshot = self.snapshot();
        let mut leaked = 0;
        for (_ty, count) in snapshot {
            #[cfg(feature = "logging")]
            log::warn!("Leaked {} object(s) of type {}", count, _ty.name());
            leaked += count;
        }

        #[cfg(feature = "logging")]
        if leaked == 0 {
            log::info!("No leaked objects");
        }

        leaked
    }
}

///Registration token of a single object. Unregisters on drop.
#[derive(Debug)]
pub struct TrackedObject {
    tracker: Arc<ObjectTracker>,
    ty: ObjectType,
}

impl TrackedObject {
    pub fn object_type(&self) -> ObjectType {
        self.ty
    }

    pub fn tracker(&self) -> &Arc<ObjectTracker> {
        &self.tracker
    }
}

impl Drop for TrackedObject {
    fn drop(&mut self) {
        self.tracker.unregister(self.ty);
    }
}

///Capability every wrapper implements. Identifies the native handle and, for device objects, the device that
/// owns it.
pub trait VulkanObject {
    fn object_type(&self) -> ObjectType;
    ///The native handle as its raw 64 bit value.
    fn raw_handle(&self) -> u64;
    ///Device this object was created on. `None` for instance level objects.
    fn owning_device(&self) -> Option<&Arc<Device>> {
        None
    }
}
