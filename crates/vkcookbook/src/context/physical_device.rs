use std::{ffi::CStr, sync::Arc};

use ash::vk;

use super::{DeviceBuilder, QueueBuilder};
use crate::error::DeviceError;

///Collection off all properties for this physical device. Can be used to easily create a [DeviceBuilder](DeviceBuilder).
/// Is usually acquired from a [PhysicalDeviceFilter](PhysicalDeviceFilter), or by using `new`.
#[derive(Clone)]
pub struct PhyDeviceProperties {
    pub phydev: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_properties: Vec<(u32, vk::QueueFamilyProperties)>,
    pub extensions: Vec<vk::ExtensionProperties>,
}

impl PhyDeviceProperties {
    ///Creates Self from just a physical device definition. Fills in `queue_properties` with all available properties.
    pub fn new(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let features = unsafe { instance.get_physical_device_features(physical_device) };
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };
        let queues =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let extensions = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .unwrap_or_else(|_e| {
                #[cfg(feature = "logging")]
                log::warn!("Could not enumerate device extensions: {}", _e);
                Vec::new()
            });

        PhyDeviceProperties {
            phydev: physical_device,
            properties,
            features,
            memory_properties,
            queue_properties: queues
                .into_iter()
                .enumerate()
                .map(|(idx, q)| (idx as u32, q))
                .collect(),
            extensions,
        }
    }

    ///The device's name as reported by the driver.
    pub fn name(&self) -> String {
        self.properties
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from("unknown device"))
    }

    ///Vulkan version usable on this device when created from an instance of `instance_version`.
    pub fn api_version(&self, instance_version: u32) -> u32 {
        self.properties.api_version.min(instance_version)
    }

    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.extensions.iter().any(|e| {
            e.extension_name_as_c_str()
                .map(|n| n == name)
                .unwrap_or(false)
        })
    }

    ///First queue family that contains all `flags`.
    pub fn find_queue_family(&self, flags: vk::QueueFlags) -> Option<u32> {
        self.queue_properties
            .iter()
            .find(|(_, q)| q.queue_count > 0 && q.queue_flags.contains(flags))
            .map(|(idx, _)| *idx)
    }

    ///creates a device builder for this physical device and its current properties. One queue is
    /// created per family by default.
    pub fn into_device_builder(self, instance: Arc<crate::context::Instance>) -> DeviceBuilder {
        let api_version = self.api_version(instance.api_version);
        DeviceBuilder {
            instance,
            api_version,
            physical_device: self.phydev,
            queues: self
                .queue_properties
                .into_iter()
                .map(|(idx, properties)| QueueBuilder {
                    family_index: idx,
                    properties,
                    priorities: vec![1.0],
                })
                .collect(),
            device_extensions: Vec::new(),
            features: vk::PhysicalDeviceFeatures::default(),
            features11: None,
            features12: None,
            features13: None,
            supported_extensions: self.extensions,
        }
    }
}

///Preference rank of a device type. Lower is better.
pub fn device_type_rank(ty: vk::PhysicalDeviceType) -> u8 {
    match ty {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        _ => 4,
    }
}

///Filter that lets you select a sub-set of all physical devices.
/// use [Instance::physical_device_filter](crate::context::Instance::physical_device_filter) to create this filter.
pub struct PhysicalDeviceFilter {
    ///All available devices.
    pub pdevices: Vec<PhyDeviceProperties>,
}

impl PhysicalDeviceFilter {
    pub fn new(instance: &ash::Instance, phydevices: Vec<vk::PhysicalDevice>) -> Self {
        PhysicalDeviceFilter {
            pdevices: phydevices
                .into_iter()
                .map(|phy| PhyDeviceProperties::new(instance, phy))
                .collect(),
        }
    }

    ///removes all devices that do not contain the device type bits.
    pub fn filter_type(mut self, dev_type: vk::PhysicalDeviceType) -> Self {
        self.pdevices
            .retain(|dev| dev.properties.device_type == dev_type);
        self
    }

    ///removes all devices that do not contain a queue with the given flags
    pub fn filter_queue_flags(mut self, flags: vk::QueueFlags) -> Self {
        self.pdevices.retain(|dev| {
            dev.queue_properties.iter().any(|(_idx, f)| {
                #[cfg(feature = "logging")]
                log::trace!("Checking {:?} for {:?}", f.queue_flags, flags);
                f.queue_flags.contains(flags)
            })
        });
        self
    }

    ///removes all devices that do not support the extension `name`.
    pub fn filter_extension(mut self, name: &CStr) -> Self {
        self.pdevices.retain(|dev| dev.supports_extension(name));
        self
    }

    ///Custom filter on the cached properties
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: FnMut(&PhyDeviceProperties) -> bool,
    {
        self.pdevices = self.pdevices.into_iter().filter(filter).collect();
        self
    }

    ///Removes all devices and queues that can not present on the supplied surface
    pub fn filter_presentable(
        mut self,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Self {
        self.pdevices = self
            .pdevices
            .into_iter()
            .filter_map(|mut pdev| {
                let phydev = pdev.phydev;
                pdev.queue_properties.retain(|(qidx, _queue)| {
                    match unsafe {
                        surface_loader.get_physical_device_surface_support(phydev, *qidx, surface)
                    } {
                        Ok(res) => res,
                        Err(_e) => {
                            #[cfg(feature = "logging")]
                            log::warn!(
                                "Failed to query surface capability on queue family {}: {}",
                                qidx,
                                _e
                            );
                            false
                        }
                    }
                });
                //Check if any family is left, otherwise remove device completely
                if pdev.queue_properties.is_empty() {
                    None
                } else {
                    Some(pdev)
                }
            })
            .collect();
        self
    }

    ///Orders the devices by preference: discrete before integrated before virtual before CPU. The order of devices
    /// of the same type is kept.
    pub fn sort_by_preference(mut self) -> Self {
        self.pdevices
            .sort_by_key(|dev| device_type_rank(dev.properties.device_type));

        #[cfg(feature = "logging")]
        {
            log::info!("Device candidates (in order):");
            for dev in self.pdevices.iter() {
                log::info!("    {} ({:?})", dev.name(), dev.properties.device_type);
            }
        }

        self
    }

    ///Releases the current filtered physical devices and queues. You can use [into_device_builder](PhyDeviceProperties::into_device_builder) to start and create an abstract device for these.
    pub fn release(self) -> Vec<PhyDeviceProperties> {
        self.pdevices
    }

    ///Returns the first device, or [DeviceError::NoPhysicalDevice] if all devices were filtered out.
    pub fn first(self) -> Result<PhyDeviceProperties, DeviceError> {
        self.pdevices
            .into_iter()
            .next()
            .ok_or(DeviceError::NoPhysicalDevice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn fake_device(ty: vk::PhysicalDeviceType, families: &[vk::QueueFlags]) -> PhyDeviceProperties {
        let mut properties = vk::PhysicalDeviceProperties::default();
        properties.device_type = ty;
        PhyDeviceProperties {
            phydev: vk::PhysicalDevice::null(),
            properties,
            features: vk::PhysicalDeviceFeatures::default(),
            memory_properties: vk::PhysicalDeviceMemoryProperties::default(),
            queue_properties: families
                .iter()
                .enumerate()
                .map(|(idx, flags)| {
                    (
                        idx as u32,
                        vk::QueueFamilyProperties {
                            queue_flags: *flags,
                            queue_count: 1,
                            ..Default::default()
                        },
                    )
                })
                .collect(),
            extensions: Vec::new(),
        }
    }

    fn filter(devices: Vec<PhyDeviceProperties>) -> PhysicalDeviceFilter {
        PhysicalDeviceFilter { pdevices: devices }
    }

    #[test]
    fn discrete_is_preferred() {
        let sorted = filter(vec![
            fake_device(vk::PhysicalDeviceType::CPU, &[vk::QueueFlags::GRAPHICS]),
            fake_device(vk::PhysicalDeviceType::INTEGRATED_GPU, &[vk::QueueFlags::GRAPHICS]),
            fake_device(vk::PhysicalDeviceType::DISCRETE_GPU, &[vk::QueueFlags::GRAPHICS]),
        ])
        .sort_by_preference()
        .release();

        let types = sorted
            .iter()
            .map(|d| d.properties.device_type)
            .collect::<Vec<_>>();
        assert_eq!(
            types,
            vec![
                vk::PhysicalDeviceType::DISCRETE_GPU,
                vk::PhysicalDeviceType::INTEGRATED_GPU,
                vk::PhysicalDeviceType::CPU
            ]
        );
    }

    #[test]
    fn queue_flag_filter() {
        let left = filter(vec![
            fake_device(vk::PhysicalDeviceType::DISCRETE_GPU, &[vk::QueueFlags::TRANSFER]),
            fake_device(
                vk::PhysicalDeviceType::INTEGRATED_GPU,
                &[
                    vk::QueueFlags::TRANSFER,
                    vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
                ],
            ),
        ])
        .filter_queue_flags(vk::QueueFlags::GRAPHICS)
        .release();

        assert_eq!(left.len(), 1);
        assert_eq!(
            left[0].find_queue_family(vk::QueueFlags::GRAPHICS),
            Some(1)
        );
        assert_eq!(left[0].find_queue_family(vk::QueueFlags::SPARSE_BINDING), None);
    }

    #[test]
    fn api_version_is_capped_by_instance() {
        let mut device = fake_device(vk::PhysicalDeviceType::DISCRETE_GPU, &[]);
        device.properties.api_version = vk::API_VERSION_1_3;
        assert_eq!(device.api_version(vk::API_VERSION_1_1), vk::API_VERSION_1_1);
        device.properties.api_version = vk::API_VERSION_1_0;
        assert_eq!(device.api_version(vk::API_VERSION_1_3), vk::API_VERSION_1_0);
    }

    #[test]
    fn empty_filter_has_no_first() {
        let res = filter(vec![fake_device(
            vk::PhysicalDeviceType::CPU,
            &[vk::QueueFlags::COMPUTE],
        )])
        .filter_type(vk::PhysicalDeviceType::DISCRETE_GPU)
        .first();
        assert!(matches!(res, Err(DeviceError::NoPhysicalDevice)));
    }

    #[test]
    fn extension_filter() {
        let left = filter(vec![fake_device(
            vk::PhysicalDeviceType::DISCRETE_GPU,
            &[vk::QueueFlags::GRAPHICS],
        )])
        .filter_extension(ash::khr::swapchain::NAME)
        .release();
        assert!(left.is_empty());
    }
}
