//! ## Loader
//!
//! Vulkan functions are resolved at runtime in four tiers:
//!
//! 1. **exported**: `vkGetInstanceProcAddr`, read directly from the shared library's symbol table.
//! 2. **global**: functions that work without an instance, resolved via `vkGetInstanceProcAddr(NULL, ..)`.
//! 3. **instance**: resolved via `vkGetInstanceProcAddr(instance, ..)` once an instance exists.
//! 4. **device**: resolved via `vkGetDeviceProcAddr(device, ..)` once a device exists.
//!
//! Which functions are required on each tier is decided by the static [FUNCTIONS] list. Instance and device
//! functions can be tied to an extension, in which case they are only required if that extension was enabled.
//! Functions of a newer core version are only required if the instance or device supports that version.
//! If any required function can't be resolved, loading fails with [LoaderError::MissingFunctions].
//!
//! The typed dispatch itself is done by [ash]. The [FunctionTable]s are the checked record of what the driver
//! actually provides, and can be queried for raw pointers.

use std::{ffi::CStr, path::Path};

use ahash::AHashMap;
use ash::vk;

use crate::error::LoaderError;

mod functions;
pub use functions::FUNCTIONS;

mod library;
pub use library::VulkanLibrary;

///The tier a function is resolved on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FunctionLevel {
    Exported,
    Global,
    Instance,
    Device,
}

///Single entry of the function list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FunctionDesc {
    pub name: &'static CStr,
    pub level: FunctionLevel,
    ///If set, the function is only required if this extension is enabled.
    pub extension: Option<&'static CStr>,
    ///If set, the function is only required from this Vulkan version on.
    pub core_version: Option<u32>,
}

impl FunctionDesc {
    ///True if this function has to be resolved on `level` for `api_version` and the `enabled_extensions`.
    pub fn is_required(
        &self,
        level: FunctionLevel,
        api_version: u32,
        enabled_extensions: &[&CStr],
    ) -> bool {
        if self.level != level {
            return false;
        }
        if self.core_version.is_some_and(|version| api_version < version) {
            return false;
        }
        match self.extension {
            None => true,
            Some(ext) => enabled_extensions.contains(&ext),
        }
    }
}

///Iterates all entries of `manifest` that are required on `level` for `api_version`.
pub fn required_functions<'a>(
    manifest: &'a [FunctionDesc],
    level: FunctionLevel,
    api_version: u32,
    enabled_extensions: &'a [&'a CStr],
) -> impl Iterator<Item = &'a FunctionDesc> + 'a {
    manifest
        .iter()
        .filter(move |f| f.is_required(level, api_version, enabled_extensions))
}

///Untyped function pointer as returned by the `*ProcAddr` functions.
pub type VoidFunction = unsafe extern "system" fn();

///Something that can turn a function name into a pointer for one [FunctionLevel].
pub trait ProcResolver {
    fn level(&self) -> FunctionLevel;
    ///Resolves `name`, returns `None` if the symbol is unknown.
    ///
    /// # Safety
    /// The resolver's underlying handles (library, instance or device) must still be alive.
    unsafe fn resolve(&self, name: &CStr) -> vk::PFN_vkVoidFunction;
}

///Resolves global functions through `vkGetInstanceProcAddr` with a null instance.
#[derive(Clone, Copy)]
pub struct GlobalResolver {
    pub get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
}

impl ProcResolver for GlobalResolver {
    fn level(&self) -> FunctionLevel {
        FunctionLevel::Global
    }
    unsafe fn resolve(&self, name: &CStr) -> vk::PFN_vkVoidFunction {
        unsafe { (self.get_instance_proc_addr)(vk::Instance::null(), name.as_ptr()) }
    }
}

///Resolves instance level functions for `instance`.
#[derive(Clone, Copy)]
pub struct InstanceResolver {
    pub get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pub instance: vk::Instance,
}

impl ProcResolver for InstanceResolver {
    fn level(&self) -> FunctionLevel {
        FunctionLevel::Instance
    }
    unsafe fn resolve(&self, name: &CStr) -> vk::PFN_vkVoidFunction {
        unsafe { (self.get_instance_proc_addr)(self.instance, name.as_ptr()) }
    }
}

///Resolves device level functions for `device`.
#[derive(Clone, Copy)]
pub struct DeviceResolver {
    pub get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
    pub device: vk::Device,
}

impl ProcResolver for DeviceResolver {
    fn level(&self) -> FunctionLevel {
        FunctionLevel::Device
    }
    unsafe fn resolve(&self, name: &CStr) -> vk::PFN_vkVoidFunction {
        unsafe { (self.get_device_proc_addr)(self.device, name.as_ptr()) }
    }
}

///All functions of one [FunctionLevel] that were resolved successfully.
#[derive(Clone, Debug)]
pub struct FunctionTable {
    level: FunctionLevel,
    functions: AHashMap<&'static CStr, VoidFunction>,
}

impl FunctionTable {
    ///Resolves every function of `manifest` that is required on `resolver`'s level.
    ///
    /// All missing functions are collected and reported at once.
    ///
    /// # Safety
    /// See [ProcResolver::resolve].
    pub unsafe fn load(
        resolver: &impl ProcResolver,
        manifest: &[FunctionDesc],
        api_version: u32,
        enabled_extensions: &[&CStr],
    ) -> Result<Self, LoaderError> {
        let level = resolver.level();
        let mut functions = AHashMap::default();
        let mut missing = Vec::new();

        for desc in required_functions(manifest, level, api_version, enabled_extensions) {
            if functions.contains_key(desc.name) {
                continue;
            }
            match unsafe { resolver.resolve(desc.name) } {
                Some(f) => {
                    functions.insert(desc.name, f);
                }
                None => {
                    #[cfg(feature = "logging")]
                    log::error!(
                        "Could not load {:?} level function {:?}",
                        level,
                        desc.name
                    );
                    missing.push(desc.name.to_string_lossy().into_owned());
                }
            }
        }

        if !missing.is_empty() {
            return Err(LoaderError::MissingFunctions {
                level,
                names: missing,
            });
        }

        #[cfg(feature = "logging")]
        log::trace!("Loaded {} {:?} level functions", functions.len(), level);

        Ok(FunctionTable { level, functions })
    }

    pub fn level(&self) -> FunctionLevel {
        self.level
    }

    pub fn get(&self, name: &CStr) -> Option<VoidFunction> {
        self.functions.get(name).copied()
    }

    pub fn contains(&self, name: &CStr) -> bool {
        self.functions.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }

    ///Names of all loaded functions, sorted.
    pub fn names(&self) -> Vec<&'static CStr> {
        let mut names = self.functions.keys().copied().collect::<Vec<_>>();
        names.sort();
        names
    }
}

///Owns the opened Vulkan library and the exported and global function tables.
///
/// Instances are created from the [Entry](ash::Entry) held by the loader. The loader has to outlive everything
/// created from it, which [Instance](crate::context::Instance) ensures by holding an `Arc<Loader>`.
pub struct Loader {
    pub entry: ash::Entry,
    pub exported: FunctionTable,
    pub global: FunctionTable,
    library: VulkanLibrary,
}

impl Loader {
    ///Opens the platform's default Vulkan library.
    ///
    /// # Safety
    /// Loading a shared library runs its initialisation code.
    pub unsafe fn new() -> Result<Self, LoaderError> {
        let library = unsafe { VulkanLibrary::open_default()? };
        unsafe { Self::from_library(library) }
    }

    ///Opens the Vulkan library at `path`.
    ///
    /// # Safety
    /// Loading a shared library runs its initialisation code.
    pub unsafe fn from_path(path: impl AsRef<Path>) -> Result<Self, LoaderError> {
        let library = unsafe { VulkanLibrary::open(path.as_ref())? };
        unsafe { Self::from_library(library) }
    }

    unsafe fn from_library(library: VulkanLibrary) -> Result<Self, LoaderError> {
        let exported =
            unsafe { FunctionTable::load(&library, FUNCTIONS, vk::API_VERSION_1_0, &[])? };
        let entry = unsafe { ash::Entry::load_from(library.path())? };
        let global = unsafe {
            FunctionTable::load(
                &Self::global_resolver(&entry),
                FUNCTIONS,
                vk::API_VERSION_1_0,
                &[],
            )?
        };

        #[cfg(feature = "logging")]
        log::info!(
            "Loaded Vulkan from {:?}: {} exported, {} global functions",
            library.path(),
            exported.len(),
            global.len()
        );

        Ok(Loader {
            entry,
            exported,
            global,
            library,
        })
    }

    fn global_resolver(entry: &ash::Entry) -> GlobalResolver {
        GlobalResolver {
            get_instance_proc_addr: entry.static_fn().get_instance_proc_addr,
        }
    }

    ///Path or name the library was loaded from.
    pub fn library_path(&self) -> &std::ffi::OsStr {
        self.library.path()
    }

    ///Resolves all instance level functions of `api_version` for `instance`, including those of the
    /// `enabled_extensions`.
    ///
    /// # Safety
    /// `instance` must have been created from this loader's entry.
    pub unsafe fn load_instance_functions(
        &self,
        instance: &ash::Instance,
        api_version: u32,
        enabled_extensions: &[&CStr],
    ) -> Result<FunctionTable, LoaderError> {
        let resolver = InstanceResolver {
            get_instance_proc_addr: self.entry.static_fn().get_instance_proc_addr,
            instance: instance.handle(),
        };
        unsafe { FunctionTable::load(&resolver, FUNCTIONS, api_version, enabled_extensions) }
    }

    ///Resolves all device level functions of `api_version` for `device`, including those of the
    /// `enabled_extensions`.
    ///
    /// Device level functions of instance extensions (like debug object names) are gated on the instance
    /// extension, so `enabled_extensions` should contain the instance's extensions as well.
    ///
    /// # Safety
    /// `device` must have been created from `instance`.
    pub unsafe fn load_device_functions(
        &self,
        instance: &ash::Instance,
        device: &ash::Device,
        api_version: u32,
        enabled_extensions: &[&CStr],
    ) -> Result<FunctionTable, LoaderError> {
        let resolver = DeviceResolver {
            get_device_proc_addr: instance.fp_v1_0().get_device_proc_addr,
            device: device.handle(),
        };
        unsafe { FunctionTable::load(&resolver, FUNCTIONS, api_version, enabled_extensions) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    unsafe extern "system" fn dummy() {}

    ///Pretends to be a driver that knows a fixed set of symbols.
    struct FakeResolver {
        level: FunctionLevel,
        known: HashSet<&'static CStr>,
    }

    impl FakeResolver {
        fn knowing_all(level: FunctionLevel) -> Self {
            FakeResolver {
                level,
                known: FUNCTIONS.iter().map(|f| f.name).collect(),
            }
        }
    }

    impl ProcResolver for FakeResolver {
        fn level(&self) -> FunctionLevel {
            self.level
        }
        unsafe fn resolve(&self, name: &CStr) -> vk::PFN_vkVoidFunction {
            if self.known.contains(name) {
                Some(dummy as VoidFunction)
            } else {
                None
            }
        }
    }

    const V1_0: u32 = vk::API_VERSION_1_0;
    const V1_3: u32 = vk::API_VERSION_1_3;

    #[test]
    fn exported_level_is_only_get_instance_proc_addr() {
        let exported = required_functions(FUNCTIONS, FunctionLevel::Exported, V1_3, &[])
            .map(|f| f.name)
            .collect::<Vec<_>>();
        assert_eq!(exported, vec![c"vkGetInstanceProcAddr"]);
    }

    #[test]
    fn global_level_has_no_extension_functions() {
        assert!(
            FUNCTIONS
                .iter()
                .filter(|f| f.level <= FunctionLevel::Global)
                .all(|f| f.extension.is_none())
        );
        let global = required_functions(FUNCTIONS, FunctionLevel::Global, V1_0, &[])
            .map(|f| f.name)
            .collect::<Vec<_>>();
        assert!(global.contains(&c"vkCreateInstance"));
        assert!(global.contains(&c"vkEnumerateInstanceExtensionProperties"));
    }

    #[test]
    fn extension_functions_only_required_when_enabled() {
        let without = required_functions(FUNCTIONS, FunctionLevel::Device, V1_0, &[])
            .map(|f| f.name)
            .collect::<Vec<_>>();
        assert!(!without.contains(&c"vkCreateSwapchainKHR"));
        assert!(without.contains(&c"vkCreateBuffer"));

        let with_swapchain = [ash::khr::swapchain::NAME];
        let with = required_functions(FUNCTIONS, FunctionLevel::Device, V1_0, &with_swapchain)
            .map(|f| f.name)
            .collect::<Vec<_>>();
        assert!(with.contains(&c"vkCreateSwapchainKHR"));
        assert!(with.contains(&c"vkQueuePresentKHR"));
        assert_eq!(with.len(), without.len() + 5);
    }

    #[test]
    fn core_functions_only_required_from_their_version() {
        let old = required_functions(FUNCTIONS, FunctionLevel::Device, V1_0, &[])
            .map(|f| f.name)
            .collect::<Vec<_>>();
        assert!(!old.contains(&c"vkWaitSemaphores"));
        assert!(!old.contains(&c"vkSignalSemaphore"));

        let new = required_functions(FUNCTIONS, FunctionLevel::Device, V1_3, &[])
            .map(|f| f.name)
            .collect::<Vec<_>>();
        assert!(new.contains(&c"vkWaitSemaphores"));
        assert!(new.contains(&c"vkSignalSemaphore"));
        assert!(new.contains(&c"vkGetSemaphoreCounterValue"));

        //a 1.0 driver lacking the timeline entry points still loads
        let mut resolver = FakeResolver::knowing_all(FunctionLevel::Device);
        resolver.known.remove(c"vkWaitSemaphores");
        assert!(unsafe { FunctionTable::load(&resolver, FUNCTIONS, V1_0, &[]) }.is_ok());
        assert!(unsafe { FunctionTable::load(&resolver, FUNCTIONS, V1_3, &[]) }.is_err());
    }

    #[test]
    fn debug_names_gated_on_debug_utils() {
        let exts = [ash::ext::debug_utils::NAME];
        let with = required_functions(FUNCTIONS, FunctionLevel::Device, V1_0, &exts)
            .map(|f| f.name)
            .collect::<Vec<_>>();
        assert!(with.contains(&c"vkSetDebugUtilsObjectNameEXT"));
        assert!(
            !required_functions(FUNCTIONS, FunctionLevel::Device, V1_0, &[])
                .any(|f| f.name == c"vkSetDebugUtilsObjectNameEXT")
        );
    }

    #[test]
    fn load_succeeds_if_everything_resolves() {
        let resolver = FakeResolver::knowing_all(FunctionLevel::Instance);
        let exts = [ash::khr::surface::NAME];
        let table = unsafe { FunctionTable::load(&resolver, FUNCTIONS, V1_0, &exts) }.unwrap();
        assert_eq!(table.level(), FunctionLevel::Instance);
        assert!(table.contains(c"vkCreateDevice"));
        assert!(table.contains(c"vkDestroySurfaceKHR"));
        assert!(!table.contains(c"vkCreateBuffer"));
        assert!(table.get(c"vkEnumeratePhysicalDevices").is_some());
        assert_eq!(
            table.len(),
            required_functions(FUNCTIONS, FunctionLevel::Instance, V1_0, &exts).count()
        );
    }

    #[test]
    fn load_reports_all_missing_functions() {
        let mut resolver = FakeResolver::knowing_all(FunctionLevel::Device);
        resolver.known.remove(c"vkCreateBuffer");
        resolver.known.remove(c"vkCreateImage");

        match unsafe { FunctionTable::load(&resolver, FUNCTIONS, V1_0, &[]) } {
            Err(LoaderError::MissingFunctions { level, names }) => {
                assert_eq!(level, FunctionLevel::Device);
                assert_eq!(names.len(), 2);
                assert!(names.contains(&"vkCreateBuffer".to_owned()));
                assert!(names.contains(&"vkCreateImage".to_owned()));
            }
            other => panic!("expected missing functions, got {:?}", other),
        }
    }

    #[test]
    fn missing_extension_function_ignored_if_extension_disabled() {
        let mut resolver = FakeResolver::knowing_all(FunctionLevel::Device);
        resolver.known.remove(c"vkQueuePresentKHR");

        assert!(unsafe { FunctionTable::load(&resolver, FUNCTIONS, V1_0, &[]) }.is_ok());
        let exts = [ash::khr::swapchain::NAME];
        assert!(unsafe { FunctionTable::load(&resolver, FUNCTIONS, V1_0, &exts) }.is_err());
    }

    #[test]
    fn duplicate_entries_resolve_once() {
        let manifest = [
            FunctionDesc {
                name: c"vkCreateBuffer",
                level: FunctionLevel::Device,
                extension: None,
                core_version: None,
            },
            FunctionDesc {
                name: c"vkCreateBuffer",
                level: FunctionLevel::Device,
                extension: None,
                core_version: None,
            },
        ];
        let resolver = FakeResolver::knowing_all(FunctionLevel::Device);
        let table = unsafe { FunctionTable::load(&resolver, &manifest, V1_0, &[]) }.unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.names(), vec![c"vkCreateBuffer"]);
    }

    #[test]
    fn empty_level_yields_empty_table() {
        let resolver = FakeResolver::knowing_all(FunctionLevel::Global);
        let table = unsafe { FunctionTable::load(&resolver, &[], V1_0, &[]) }.unwrap();
        assert!(table.is_empty());
    }
}
