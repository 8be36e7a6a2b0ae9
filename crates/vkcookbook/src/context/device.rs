use std::{
    ffi::{CStr, CString},
    sync::Arc,
};

use ash::vk::{self, Handle};

use super::{Queue, QueueBuilder};
use crate::{
    error::DeviceError,
    loader::FunctionTable,
    tracker::{ObjectTracker, ObjectType, TrackedObject, VulkanObject},
};

//Rejects unsupported extensions and extensions that are already enabled.
fn check_extension(
    supported: &[vk::ExtensionProperties],
    enabled: &[&'static CStr],
    name: &CStr,
) -> Result<(), DeviceError> {
    if enabled.iter().any(|e| *e == name) {
        return Err(DeviceError::DuplicateExtension(
            name.to_string_lossy().into_owned(),
        ));
    }

    let is_supported = supported.iter().any(|e| {
        e.extension_name_as_c_str()
            .map(|n| n == name)
            .unwrap_or(false)
    });
    if !is_supported {
        return Err(DeviceError::UnsupportedExtension(
            name.to_string_lossy().into_owned(),
        ));
    }

    Ok(())
}

//Sets the timeline semaphore bit of the 1.2 features. Every 1.2 device has to support it.
fn enable_timeline_semaphores(
    api_version: u32,
    features12: &mut Option<vk::PhysicalDeviceVulkan12Features<'static>>,
) -> Result<(), DeviceError> {
    if api_version < vk::API_VERSION_1_2 {
        return Err(DeviceError::UnsupportedVersion {
            feature: "timelineSemaphore",
            required: vk::API_VERSION_1_2,
            available: api_version,
        });
    }
    features12.get_or_insert_with(Default::default).timeline_semaphore = vk::TRUE;
    Ok(())
}

//Iterates the `p_next` chain of `info`, which has to be valid.
fn chain<'a>(
    info: &'a vk::DeviceCreateInfo<'_>,
) -> impl Iterator<Item = *const vk::BaseInStructure<'a>> {
    let mut next = info.p_next.cast::<vk::BaseInStructure<'a>>();
    std::iter::from_fn(move || {
        let current = unsafe { next.as_ref() }?;
        let ptr = next;
        next = current.p_next;
        Some(ptr)
    })
}

///True if `info` enables timeline semaphores, either through the 1.2 features or the extension's feature struct.
///
/// # Safety
/// The `p_next` chain of `info` must be valid.
pub unsafe fn timeline_semaphores_enabled(info: &vk::DeviceCreateInfo<'_>) -> bool {
    chain(info).any(|ptr| {
        let enabled = match unsafe { (*ptr).s_type } {
            vk::StructureType::PHYSICAL_DEVICE_VULKAN_1_2_FEATURES => unsafe {
                (*ptr.cast::<vk::PhysicalDeviceVulkan12Features<'_>>()).timeline_semaphore
            },
            vk::StructureType::PHYSICAL_DEVICE_TIMELINE_SEMAPHORE_FEATURES => unsafe {
                (*ptr.cast::<vk::PhysicalDeviceTimelineSemaphoreFeatures<'_>>()).timeline_semaphore
            },
            _ => vk::FALSE,
        };
        enabled == vk::TRUE
    })
}

///The core features `info` enables, either directly or through a chained `PhysicalDeviceFeatures2`.
///
/// # Safety
/// `p_enabled_features` and the `p_next` chain of `info` must be valid.
pub unsafe fn create_info_features(info: &vk::DeviceCreateInfo<'_>) -> vk::PhysicalDeviceFeatures {
    if let Some(features) = unsafe { info.p_enabled_features.as_ref() } {
        return *features;
    }
    chain(info)
        .find(|ptr| unsafe { (**ptr).s_type } == vk::StructureType::PHYSICAL_DEVICE_FEATURES_2)
        .map(|ptr| unsafe { (*ptr.cast::<vk::PhysicalDeviceFeatures2<'_>>()).features })
        .unwrap_or_default()
}

///Helper that lets you setup device properties and possibly needed extensions before creating the actual
/// device.
pub struct DeviceBuilder {
    ///Instance based on which the device is creates
    pub instance: Arc<crate::context::Instance>,
    ///The physical device from which this will be an abstraction
    pub physical_device: vk::PhysicalDevice,
    ///Vulkan version of the device, capped by the instance's version.
    pub api_version: u32,
    ///Queue family index, and properties of all queues that can be created.
    pub queues: Vec<QueueBuilder>,
    pub features: vk::PhysicalDeviceFeatures,
    pub features11: Option<vk::PhysicalDeviceVulkan11Features<'static>>,
    pub features12: Option<vk::PhysicalDeviceVulkan12Features<'static>>,
    pub features13: Option<vk::PhysicalDeviceVulkan13Features<'static>>,
    ///List of device extensions that are enabled.
    pub device_extensions: Vec<&'static CStr>,
    pub(crate) supported_extensions: Vec<vk::ExtensionProperties>,
}

impl DeviceBuilder {
    ///Allows changing `self` builder style
    pub fn with(mut self, mut mapping: impl FnMut(&mut DeviceBuilder)) -> Self {
        mapping(&mut self);
        self
    }

    ///Enables the extension `name`. The name is usually optained from the extensions definition like this:
    ///```ignore
    ///  builder.with_extension(ash::khr::swapchain::NAME)?;
    ///```
    ///
    /// Fails if the extension is not supported by the physical device, or was already enabled.
    pub fn with_extension(mut self, name: &'static CStr) -> Result<Self, DeviceError> {
        check_extension(&self.supported_extensions, &self.device_extensions, name)?;

        #[cfg(feature = "logging")]
        log::info!("Enabling device-extension: {:?}", name);

        self.device_extensions.push(name);
        Ok(self)
    }

    pub fn with_features(mut self, features: vk::PhysicalDeviceFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn with_features11(mut self, features: vk::PhysicalDeviceVulkan11Features<'static>) -> Self {
        self.features11 = Some(features);
        self
    }

    pub fn with_features12(mut self, features: vk::PhysicalDeviceVulkan12Features<'static>) -> Self {
        self.features12 = Some(features);
        self
    }

    pub fn with_features13(mut self, features: vk::PhysicalDeviceVulkan13Features<'static>) -> Self {
        self.features13 = Some(features);
        self
    }

    ///Enables timeline semaphores, needed for [TimelineSemaphore](crate::sync::TimelineSemaphore).
    ///
    /// Fails if the device is used with a Vulkan version below 1.2.
    pub fn with_timeline_semaphores(mut self) -> Result<Self, DeviceError> {
        enable_timeline_semaphores(self.api_version, &mut self.features12)?;
        Ok(self)
    }

    ///Sets the queue priorities of `family`. See [QueueBuilder::with_queues].
    pub fn with_queues(mut self, family: u32, priorities: Vec<f32>) -> Result<Self, DeviceError> {
        match self.queues.iter_mut().find(|q| q.family_index == family) {
            Some(q) => q.with_queues(priorities),
            None => {
                #[cfg(feature = "logging")]
                log::error!("Queue family {} does not exist", family);
                return Err(DeviceError::InvalidQueueFamily(family));
            }
        }
        Ok(self)
    }

    pub fn build(self) -> Result<Arc<Device>, DeviceError> {
        let DeviceBuilder {
            instance,
            physical_device,
            api_version: _,
            queues,
            features,
            features11,
            features12,
            features13,
            device_extensions,
            supported_extensions: _,
        } = self;

        let queues = queues
            .into_iter()
            .filter(|q| !q.priorities.is_empty())
            .collect::<Vec<_>>();
        let queue_create_infos = queues
            .iter()
            .map(|q| q.as_create_info())
            .collect::<Vec<_>>();

        let extension_ptrs = device_extensions
            .iter()
            .map(|e| e.as_ptr())
            .collect::<Vec<_>>();

        let mut features11: Option<vk::PhysicalDeviceVulkan11Features<'_>> = features11;
        let mut features12: Option<vk::PhysicalDeviceVulkan12Features<'_>> = features12;
        let mut features13: Option<vk::PhysicalDeviceVulkan13Features<'_>> = features13;

        //NOTE: acording to the vulkan doc device layers are deprecated. We therfore don't expose
        //anything related to that.
        let mut create_info = vk::DeviceCreateInfo::default()
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features)
            .queue_create_infos(&queue_create_infos);
        if let Some(f) = features11.as_mut() {
            create_info = create_info.push_next(f);
        }
        if let Some(f) = features12.as_mut() {
            create_info = create_info.push_next(f);
        }
        if let Some(f) = features13.as_mut() {
            create_info = create_info.push_next(f);
        }

        unsafe {
            Device::new_from_info(
                instance,
                physical_device,
                &create_info,
                &queues,
                &device_extensions,
            )
        }
    }
}

///Thin device abstraction that keeps the underlying instance (and therfore entrypoint) alive.
/// and takes care of device destruction once its dropped.
///
/// # Safety and self creation
/// Since the struct is compleatly public it is possible to create a device "on your own". In that case you'll have to make sure
/// that the instance is assosiated with the device and the queues actually exist.
pub struct Device {
    ///The raw ash device
    pub inner: ash::Device,
    pub instance: Arc<crate::context::Instance>,
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    ///Vulkan version the device functions were loaded for.
    pub api_version: u32,
    ///Everything the physical device could enable.
    pub supported_features: vk::PhysicalDeviceFeatures,
    ///Core features the device was created with.
    pub enabled_features: vk::PhysicalDeviceFeatures,
    ///True if timeline semaphores were enabled and their core functions are loaded.
    pub timeline_semaphores: bool,
    pub queues: Vec<Queue>,
    pub enabled_extensions: Vec<CString>,
    ///Device level functions, resolved at creation time.
    pub functions: FunctionTable,
    ///Set if the instance was created with validation. Used to name objects.
    pub debug_utils: Option<ash::ext::debug_utils::Device>,
    tracking: TrackedObject,
}

impl Device {
    ///Mini helper function that creates the device from an already created instance and physical device, using
    /// the supplied device and creation infos. Resolves all device level functions needed for `enabled_extensions`
    /// and the device's Vulkan version afterwards.
    ///
    /// # Safety
    /// The biggest concern when using this function should be that the queue_families of the `queue_builder` actully exist in that way,
    /// and that `enabled_extensions` matches the extensions of `device_create_info`.
    pub unsafe fn new_from_info(
        instance: Arc<crate::context::Instance>,
        physical_device: vk::PhysicalDevice,
        device_create_info: &vk::DeviceCreateInfo<'_>,
        queue_builder: &[QueueBuilder],
        enabled_extensions: &[&CStr],
    ) -> Result<Arc<Self>, DeviceError> {
        let device = unsafe {
            instance
                .inner
                .create_device(physical_device, device_create_info, None)?
        };

        let properties = unsafe { instance.inner.get_physical_device_properties(physical_device) };
        let api_version = properties.api_version.min(instance.api_version);

        //device level functions of instance extensions are gated on the instance extension
        let mut load_extensions = enabled_extensions.to_vec();
        load_extensions.extend(instance.enabled_extensions.iter().map(|e| e.as_c_str()));
        let functions = match unsafe {
            instance.loader.load_device_functions(
                &instance.inner,
                &device,
                api_version,
                &load_extensions,
            )
        } {
            Ok(f) => f,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        let device_ref = &device;
        let queues = queue_builder
            .iter()
            .flat_map(|queue_family| {
                (0..queue_family.priorities.len() as u32).map(move |queue_index| Queue {
                    family_index: queue_family.family_index,
                    queue_index,
                    properties: queue_family.properties,
                    inner: unsafe {
                        device_ref.get_device_queue(queue_family.family_index, queue_index)
                    },
                })
            })
            .collect::<Vec<_>>();

        let memory_properties = unsafe {
            instance
                .inner
                .get_physical_device_memory_properties(physical_device)
        };
        let supported_features =
            unsafe { instance.inner.get_physical_device_features(physical_device) };
        let enabled_features = unsafe { create_info_features(device_create_info) };
        let timeline_semaphores = api_version >= vk::API_VERSION_1_2
            && unsafe { timeline_semaphores_enabled(device_create_info) };

        let debug_utils = if instance.is_extension_enabled(ash::ext::debug_utils::NAME) {
            Some(ash::ext::debug_utils::Device::new(&instance.inner, &device))
        } else {
            None
        };

        #[cfg(feature = "logging")]
        log::info!(
            "Created device on {:?} with {} queue(s) and {} device functions",
            properties.device_name_as_c_str().unwrap_or(c"unknown"),
            queues.len(),
            functions.len()
        );

        let tracking = instance.tracker.register(ObjectType::Device);
        Ok(Arc::new(Device {
            inner: device,
            physical_device,
            properties,
            memory_properties,
            api_version,
            supported_features,
            enabled_features,
            timeline_semaphores,
            queues,
            enabled_extensions: enabled_extensions.iter().map(|e| (*e).to_owned()).collect(),
            functions,
            debug_utils,
            tracking,
            instance,
        }))
    }

    ///Returns the first queue for the given family, if there is any.
    pub fn get_first_queue_for_family(&self, family: u32) -> Option<&Queue> {
        self.queues.iter().find(|q| q.family_index == family)
    }

    ///Returns the first queue that supports all `flags`.
    pub fn find_queue(&self, flags: vk::QueueFlags) -> Result<&Queue, DeviceError> {
        self.queues
            .iter()
            .find(|q| q.supports(flags))
            .ok_or(DeviceError::NoQueueFamily(flags))
    }

    ///Index of the first created queue family that supports all `flags`.
    pub fn find_queue_family(&self, flags: vk::QueueFlags) -> Option<u32> {
        self.queues
            .iter()
            .find(|q| q.supports(flags))
            .map(|q| q.family_index)
    }

    pub fn extension_enabled(&self, name: &CStr) -> bool {
        self.enabled_extensions.iter().any(|e| e.as_c_str() == name)
    }

    ///Tracker all objects created on this device register with.
    pub fn tracker(&self) -> &Arc<ObjectTracker> {
        &self.instance.tracker
    }

    ///Registers a new object of type `ty` on this device's tracker.
    pub fn track(&self, ty: ObjectType) -> TrackedObject {
        self.instance.tracker.register(ty)
    }

    pub fn wait_idle(&self) -> Result<(), DeviceError> {
        unsafe { self.inner.device_wait_idle()? };
        Ok(())
    }

    pub fn get_format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        self.instance
            .get_format_properties(self.physical_device, format)
    }

    ///Attaches a debug name to `object`. Does nothing if the instance was created without validation.
    pub fn name_object(&self, object: &impl VulkanObject, name: &CStr) -> Result<(), DeviceError> {
        if let Some(debug_utils) = &self.debug_utils {
            let mut info = vk::DebugUtilsObjectNameInfoEXT::default().object_name(name);
            info.object_type = object.object_type().as_vk();
            info.object_handle = object.raw_handle();
            unsafe { debug_utils.set_debug_utils_object_name(&info)? };
        }
        Ok(())
    }
}

impl VulkanObject for Device {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.inner.handle().as_raw()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe { self.inner.destroy_device(None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ext(name: &CStr) -> vk::ExtensionProperties {
        vk::ExtensionProperties::default()
            .extension_name(name)
            .unwrap_or_default()
    }

    #[test]
    fn unsupported_extension_is_rejected() {
        let supported = vec![ext(ash::khr::swapchain::NAME)];
        assert!(check_extension(&supported, &[], ash::khr::swapchain::NAME).is_ok());
        assert!(matches!(
            check_extension(&supported, &[], ash::khr::maintenance4::NAME),
            Err(DeviceError::UnsupportedExtension(_))
        ));
    }

    #[test]
    fn duplicate_extension_is_rejected() {
        let supported = vec![ext(ash::khr::swapchain::NAME)];
        assert!(matches!(
            check_extension(
                &supported,
                &[ash::khr::swapchain::NAME],
                ash::khr::swapchain::NAME
            ),
            Err(DeviceError::DuplicateExtension(name)) if name == "VK_KHR_swapchain"
        ));
    }

    #[test]
    fn timeline_semaphores_need_vulkan_1_2() {
        let mut features12 = None;
        assert!(matches!(
            enable_timeline_semaphores(vk::API_VERSION_1_1, &mut features12),
            Err(DeviceError::UnsupportedVersion { required, .. }) if required == vk::API_VERSION_1_2
        ));
        assert!(features12.is_none());

        enable_timeline_semaphores(vk::API_VERSION_1_3, &mut features12).unwrap();
        assert_eq!(features12.map(|f| f.timeline_semaphore), Some(vk::TRUE));
    }

    #[test]
    fn timeline_semaphores_found_in_chain() {
        let info = vk::DeviceCreateInfo::default();
        assert!(!unsafe { timeline_semaphores_enabled(&info) });

        let mut features11 = vk::PhysicalDeviceVulkan11Features::default();
        let mut features12 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);
        let info = vk::DeviceCreateInfo::default()
            .push_next(&mut features11)
            .push_next(&mut features12);
        assert!(unsafe { timeline_semaphores_enabled(&info) });

        let mut ext = vk::PhysicalDeviceTimelineSemaphoreFeatures::default().timeline_semaphore(true);
        let info = vk::DeviceCreateInfo::default().push_next(&mut ext);
        assert!(unsafe { timeline_semaphores_enabled(&info) });
    }

    #[test]
    fn enabled_features_come_from_create_info() {
        let info = vk::DeviceCreateInfo::default();
        assert_eq!(unsafe { create_info_features(&info) }.sampler_anisotropy, vk::FALSE);

        let features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);
        let info = vk::DeviceCreateInfo::default().enabled_features(&features);
        assert_eq!(unsafe { create_info_features(&info) }.sampler_anisotropy, vk::TRUE);

        let mut features2 = vk::PhysicalDeviceFeatures2::default()
            .features(vk::PhysicalDeviceFeatures::default().fill_mode_non_solid(true));
        let info = vk::DeviceCreateInfo::default().push_next(&mut features2);
        let enabled = unsafe { create_info_features(&info) };
        assert_eq!(enabled.fill_mode_non_solid, vk::TRUE);
        assert_eq!(enabled.sampler_anisotropy, vk::FALSE);
    }
}
