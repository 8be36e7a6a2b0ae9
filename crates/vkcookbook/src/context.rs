//! ## Context
//!
//! When working with Vulkan the [Device](ash::Device) is entry point for most of the operations.
//! It therefore is needed in most structures and functions calls that somehow transform state related to Vulkan.
//! The device is created from an [Instance](ash::Instance) which represents a runtime instance of Vulkan. The
//! instance in turn is created from the entry points resolved by the [Loader](crate::loader::Loader).
//!
//! Additionally to the device one or multiple [queues](ash::vk::Queue) might be created. They can be understood as
//! a kind of "thread". Basically they are used for scheduling work on the GPU. Multiple queue types exists that can
//! do different types of work.
//!
//! Since those structures closely work together we define an abstraction called [Ctx], or "Context". It is a plain
//! value. Nothing in this crate relies on a process wide instance or device.
//!
//! # Examples
//! ```no_run
//! use vkcookbook::context::Ctx;
//!
//! let ctx = Ctx::new_headless(false).unwrap();
//! let queue = ctx.graphics_queue().unwrap();
//! println!("Graphics queue family: {}", queue.family_index);
//! ```
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

mod instance;
pub use instance::{Instance, InstanceBuilder, VALIDATION_LAYER, ValidationFeatures};

mod debugger;
pub use debugger::{DebugMessenger, vulkan_debug_callback};

mod device;
pub use device::{Device, DeviceBuilder};

mod queue;
pub use queue::{Queue, QueueBuilder};

mod physical_device;
pub use physical_device::{PhyDeviceProperties, PhysicalDeviceFilter, device_type_rank};

use crate::{
    CookbookError,
    error::DeviceError,
    loader::Loader,
    surface::Surface,
    tracker::ObjectTracker,
};

///The Vulkan context. Can either be constructed by hand, or via helper functions.
#[derive(Clone)]
pub struct Ctx {
    pub loader: Arc<Loader>,
    ///Tracker all objects of this context register with.
    pub tracker: Arc<ObjectTracker>,
    ///The initial vulkan instance used for the context.
    pub instance: Arc<Instance>,
    ///Vulkan device including assosiated queues.
    pub device: Arc<Device>,
}

impl Ctx {
    ///Creates the context from a device. Loader, tracker and instance are taken from the device.
    pub fn new(device: Arc<Device>) -> Self {
        Ctx {
            loader: device.instance.loader.clone(),
            tracker: device.instance.tracker.clone(),
            instance: device.instance.clone(),
            device,
        }
    }

    fn load_instance(use_validation: bool) -> Result<InstanceBuilder, CookbookError> {
        let loader = Arc::new(unsafe { Loader::new()? });
        let mut instance_builder = Instance::builder(loader)?;
        if use_validation {
            instance_builder = instance_builder.enable_validation(ValidationFeatures::none());
        }
        Ok(instance_builder)
    }

    ///Creates a new context that does not check for any surface availability.
    pub fn new_headless(use_validation: bool) -> Result<Self, CookbookError> {
        let instance = Self::load_instance(use_validation)?.build()?;
        Self::new_from_instance(instance, None)
    }

    ///Creates simple context that has at least one graphics queue, that can present to the surface of `window_handle`.
    pub fn new_with_surface<T>(
        window_handle: &T,
        use_validation: bool,
    ) -> Result<(Self, Arc<Surface>), CookbookError>
    where
        T: HasDisplayHandle + HasWindowHandle,
    {
        let instance = Self::load_instance(use_validation)?
            .for_surface(window_handle)?
            .build()?;

        //create the surface, so we can check for compatible devices in the filter.
        let surface = Arc::new(Surface::new(&instance, window_handle)?);
        let ctx = Self::new_from_instance(instance, Some(&surface))?;

        Ok((ctx, surface))
    }

    ///Creates a default context from a given instance. This is also the base creation code for
    /// [Self::new_with_surface] and [Self::new_headless].
    ///
    /// Selects the most preferred device with a graphics queue. If `surface` is set, the device must be able to
    /// present to it, and the swapchain extension is enabled. Timeline semaphores are enabled on Vulkan 1.2 devices.
    pub fn new_from_instance(
        instance: Arc<Instance>,
        surface: Option<&Surface>,
    ) -> Result<Self, CookbookError> {
        let mut candidates = instance
            .physical_device_filter()?
            .filter_queue_flags(vk::QueueFlags::GRAPHICS);

        if let Some(surface) = surface {
            candidates = candidates
                .filter_extension(ash::khr::swapchain::NAME)
                .filter_presentable(&surface.surface_loader, surface.surface);
        }

        let physical_device = candidates.sort_by_preference().first()?;

        #[cfg(feature = "logging")]
        log::info!("Selected physical device {}", physical_device.name());

        let mut device_builder = physical_device.into_device_builder(instance.clone());
        if surface.is_some() {
            device_builder = device_builder.with_extension(ash::khr::swapchain::NAME)?;
        }
        if device_builder.api_version >= vk::API_VERSION_1_2 {
            device_builder = device_builder.with_timeline_semaphores()?;
        }
        let device = device_builder.build()?;

        Ok(Self::new(device))
    }

    ///First queue that supports graphics operations.
    pub fn graphics_queue(&self) -> Result<&Queue, DeviceError> {
        self.device.find_queue(vk::QueueFlags::GRAPHICS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Ctx: Send, Sync);
        assert_impl_all!(Device: Send, Sync);
        assert_impl_all!(Instance: Send, Sync);
        assert_impl_all!(Queue: Send, Sync);
    }
}
