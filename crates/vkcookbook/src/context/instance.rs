use std::{
    ffi::{CStr, CString},
    sync::Arc,
};

use ash::vk::{self, Handle};
use raw_window_handle::HasDisplayHandle;

use super::{DebugMessenger, PhysicalDeviceFilter};
use crate::{
    error::InstanceError,
    loader::{FunctionTable, Loader},
    tracker::{ObjectTracker, ObjectType, TrackedObject, VulkanObject},
};

///Name of the Khronos validation layer.
pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

///Signales enabled and disabled validation layer features
#[derive(Clone, Debug, Default)]
pub struct ValidationFeatures {
    pub enabled: Vec<vk::ValidationFeatureEnableEXT>,
    pub disabled: Vec<vk::ValidationFeatureDisableEXT>,
}

impl ValidationFeatures {
    ///Plain validation, no additional features.
    pub fn none() -> Self {
        ValidationFeatures::default()
    }

    ///enables only debug printf
    pub fn gpu_printf() -> Self {
        ValidationFeatures {
            enabled: vec![vk::ValidationFeatureEnableEXT::DEBUG_PRINTF],
            disabled: Vec::new(),
        }
    }

    ///Enables all debug features
    pub fn all() -> Self {
        ValidationFeatures {
            enabled: vec![
                vk::ValidationFeatureEnableEXT::GPU_ASSISTED,
                vk::ValidationFeatureEnableEXT::GPU_ASSISTED_RESERVE_BINDING_SLOT,
                vk::ValidationFeatureEnableEXT::BEST_PRACTICES,
                vk::ValidationFeatureEnableEXT::SYNCHRONIZATION_VALIDATION,
            ],
            disabled: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.enabled.is_empty() && self.disabled.is_empty()
    }
}

///Instance configuration. Usually created via [Instance::builder].
pub struct InstanceBuilder {
    pub loader: Arc<Loader>,
    pub tracker: Arc<ObjectTracker>,
    pub application_name: CString,
    pub application_version: u32,
    pub engine_name: CString,
    pub api_version: u32,
    pub validation: Option<ValidationFeatures>,
    pub enabled_layers: Vec<CString>,
    pub enabled_extensions: Vec<CString>,
    available_layers: Vec<vk::LayerProperties>,
    available_extensions: Vec<vk::ExtensionProperties>,
}

impl InstanceBuilder {
    ///Allows changing `self` builder style
    pub fn with(mut self, mut mapping: impl FnMut(&mut InstanceBuilder)) -> Self {
        mapping(&mut self);
        self
    }

    ///Uses `tracker` instead of a fresh tracker. Useful if several instances should be accounted together.
    pub fn with_tracker(mut self, tracker: Arc<ObjectTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_application_name(mut self, name: &str) -> Result<Self, InstanceError> {
        self.application_name =
            CString::new(name).map_err(|_| InstanceError::InvalidName(name.to_owned()))?;
        Ok(self)
    }

    pub fn is_layer_available(&self, name: &CStr) -> bool {
        self.available_layers
            .iter()
            .any(|l| l.layer_name_as_c_str().map(|n| n == name).unwrap_or(false))
    }

    ///Returns true if a instance-extension with the given name was found
    pub fn is_extension_available(&self, name: &CStr) -> bool {
        self.available_extensions.iter().any(|e| {
            e.extension_name_as_c_str()
                .map(|n| n == name)
                .unwrap_or(false)
        })
    }

    ///adds an extensions with the given name, if it was not added yet.
    pub fn with_extension(mut self, name: &CStr) -> Result<Self, InstanceError> {
        if !self.is_extension_available(name) {
            return Err(InstanceError::MissingExtension(name.to_owned()));
        }

        if self.enabled_extensions.iter().any(|e| e.as_c_str() == name) {
            #[cfg(feature = "logging")]
            log::warn!("Tried to enable extension twice: {:?}", name);
            return Ok(self);
        }

        #[cfg(feature = "logging")]
        log::info!("Enabling instance-extension: {:?}", name);
        self.enabled_extensions.push(name.to_owned());

        Ok(self)
    }

    ///adds an layer with the given name to the list of layers
    pub fn with_layer(mut self, name: &CStr) -> Result<Self, InstanceError> {
        if !self.is_layer_available(name) {
            return Err(InstanceError::MissingLayer(name.to_owned()));
        }

        if self.enabled_layers.iter().any(|l| l.as_c_str() == name) {
            #[cfg(feature = "logging")]
            log::warn!("Tried to enable layer twice: {:?}", name);
            return Ok(self);
        }

        self.enabled_layers.push(name.to_owned());
        Ok(self)
    }

    ///Enables all extensions that are needed for the surface behind `handle` to work.
    pub fn for_surface(mut self, handle: &dyn HasDisplayHandle) -> Result<Self, InstanceError> {
        let required_extensions =
            ash_window::enumerate_required_extensions(handle.display_handle()?.as_raw())?;
        for r in required_extensions {
            //Safety: ash-window returns pointers to static extension names
            let name = unsafe { CStr::from_ptr(*r) };
            self = self.with_extension(name)?;
        }

        Ok(self)
    }

    ///enables validation layers and a debug messenger that prints either via [println](println), or via the log crate if the `logging` feature is enabled.
    pub fn enable_validation(mut self, features: ValidationFeatures) -> Self {
        self.validation = Some(features);
        self
    }

    ///Builds the instance from the current information.
    pub fn build(mut self) -> Result<Arc<Instance>, InstanceError> {
        if self.validation.is_some() {
            self = self.with_layer(VALIDATION_LAYER)?;
            self = self.with_extension(ash::ext::debug_utils::NAME)?;
        }

        let InstanceBuilder {
            loader,
            tracker,
            application_name,
            application_version,
            engine_name,
            api_version,
            validation,
            enabled_layers,
            enabled_extensions,
            available_layers: _,
            available_extensions: _,
        } = self;

        let app_desc = vk::ApplicationInfo::default()
            .application_name(&application_name)
            .application_version(application_version)
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(api_version);

        #[cfg(feature = "logging")]
        {
            log::info!("Instance creation:");
            log::info!(
                "  Vulkan version: {}.{}.{}.{}",
                vk::api_version_major(api_version),
                vk::api_version_minor(api_version),
                vk::api_version_patch(api_version),
                vk::api_version_variant(api_version)
            );
            log::info!("  Layers:");
            for l in &enabled_layers {
                log::info!("    {:?}", l);
            }
            log::info!("  Extensions:");
            for e in &enabled_extensions {
                log::info!("    {:?}", e);
            }
        }

        let extension_ptrs = enabled_extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<_>>();
        let layer_ptrs = enabled_layers
            .iter()
            .map(|l| l.as_ptr())
            .collect::<Vec<_>>();

        let validation_features = validation.clone().unwrap_or_default();
        let mut valext = vk::ValidationFeaturesEXT::default()
            .enabled_validation_features(&validation_features.enabled)
            .disabled_validation_features(&validation_features.disabled);

        let mut create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_desc)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);
        if validation.is_some() && !validation_features.is_empty() {
            create_info = create_info.push_next(&mut valext);
        }

        let inner = unsafe { loader.entry.create_instance(&create_info, None)? };

        let extension_names = enabled_extensions
            .iter()
            .map(|e| e.as_c_str())
            .collect::<Vec<_>>();
        let functions = match unsafe {
            loader.load_instance_functions(&inner, api_version, &extension_names)
        } {
            Ok(f) => f,
            Err(e) => {
                unsafe { inner.destroy_instance(None) };
                return Err(e.into());
            }
        };

        let debugger = if validation.is_some() {
            match DebugMessenger::new(
                &loader.entry,
                &inner,
                &tracker,
                DebugMessenger::DEFAULT_SEVERITY,
            ) {
                Ok(d) => Some(d),
                Err(e) => {
                    unsafe { inner.destroy_instance(None) };
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        let tracking = tracker.register(ObjectType::Instance);
        Ok(Arc::new(Instance {
            loader,
            inner,
            functions,
            enabled_extensions,
            api_version,
            validation_enabled: validation.is_some(),
            debugger,
            tracker,
            tracking,
        }))
    }
}

///Vulkan instance. Keeps the [Loader] alive and owns the optional [DebugMessenger].
///
/// # Safety
///
/// This struct is un-clonable for a reason. It implements [Drop] which takes care of destroying the vulkan instance, as well as the debug
/// messenger if it was loaded.
pub struct Instance {
    pub loader: Arc<Loader>,
    pub inner: ash::Instance,
    ///Instance level functions, resolved at creation time.
    pub functions: FunctionTable,
    pub enabled_extensions: Vec<CString>,
    pub api_version: u32,
    pub validation_enabled: bool,
    pub debugger: Option<DebugMessenger>,
    pub tracker: Arc<ObjectTracker>,
    tracking: TrackedObject,
}

impl Instance {
    ///The major version of Vulkan loaded.
    pub const API_VERSION_MAJOR: u32 = 1;
    ///The minor version of Vulkan loaded.
    pub const API_VERSION_MINOR: u32 = 3;
    ///The patch version of Vulkan loaded.
    pub const API_VERSION_PATCH: u32 = 0;

    ///Starts building an instance from `loader`. Queries the available layers and extensions.
    pub fn builder(loader: Arc<Loader>) -> Result<InstanceBuilder, InstanceError> {
        let available_layers = unsafe { loader.entry.enumerate_instance_layer_properties()? };
        let available_extensions =
            unsafe { loader.entry.enumerate_instance_extension_properties(None)? };

        Ok(InstanceBuilder {
            loader,
            tracker: ObjectTracker::new(),
            application_name: c"vkcookbook".to_owned(),
            application_version: vk::make_api_version(0, 1, 0, 0),
            engine_name: c"vkcookbook".to_owned(),
            api_version: vk::make_api_version(
                0,
                Self::API_VERSION_MAJOR,
                Self::API_VERSION_MINOR,
                Self::API_VERSION_PATCH,
            ),
            validation: None,
            enabled_layers: Vec::new(),
            enabled_extensions: Vec::new(),
            available_layers,
            available_extensions,
        })
    }

    pub fn is_extension_enabled(&self, name: &CStr) -> bool {
        self.enabled_extensions.iter().any(|e| e.as_c_str() == name)
    }

    ///Returns the feature list of the physical device
    pub fn get_physical_device_features(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceFeatures {
        unsafe { self.inner.get_physical_device_features(physical_device) }
    }

    pub fn get_physical_device_properties(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> vk::PhysicalDeviceProperties {
        unsafe { self.inner.get_physical_device_properties(physical_device) }
    }

    pub fn get_format_properties(
        &self,
        physical_device: vk::PhysicalDevice,
        format: vk::Format,
    ) -> vk::FormatProperties {
        unsafe {
            self.inner
                .get_physical_device_format_properties(physical_device, format)
        }
    }

    ///Enumerates all physical devices and wraps them in a filter.
    pub fn physical_device_filter(&self) -> Result<PhysicalDeviceFilter, InstanceError> {
        let devices = unsafe { self.inner.enumerate_physical_devices()? };
        Ok(PhysicalDeviceFilter::new(&self.inner, devices))
    }
}

impl VulkanObject for Instance {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.inner.handle().as_raw()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        //the messenger is an instance child
        self.debugger.take();
        unsafe {
            self.inner.destroy_instance(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_features() {
        assert!(ValidationFeatures::none().is_empty());
        assert!(!ValidationFeatures::gpu_printf().is_empty());
        assert_eq!(ValidationFeatures::all().enabled.len(), 4);
    }

    #[test]
    fn api_version_is_1_3() {
        let v = vk::make_api_version(
            0,
            Instance::API_VERSION_MAJOR,
            Instance::API_VERSION_MINOR,
            Instance::API_VERSION_PATCH,
        );
        assert_eq!(v, vk::API_VERSION_1_3);
    }
}
