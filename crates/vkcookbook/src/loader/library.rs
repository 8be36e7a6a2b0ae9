use std::{
    ffi::{CStr, OsStr, OsString},
    path::Path,
};

use ash::vk;

use super::{FunctionLevel, ProcResolver, VoidFunction};
use crate::error::LoaderError;

#[cfg(windows)]
const LIBRARY_NAMES: &[&str] = &["vulkan-1.dll"];

#[cfg(all(unix, not(any(target_os = "macos", target_os = "ios", target_os = "android"))))]
const LIBRARY_NAMES: &[&str] = &["libvulkan.so.1", "libvulkan.so"];

#[cfg(target_os = "android")]
const LIBRARY_NAMES: &[&str] = &["libvulkan.so"];

#[cfg(any(target_os = "macos", target_os = "ios"))]
const LIBRARY_NAMES: &[&str] = &[
    "libvulkan.1.dylib",
    "libvulkan.dylib",
    "libMoltenVK.dylib",
];

///The opened platform Vulkan library. Resolves the *exported* function level directly from the library's
/// symbol table.
pub struct VulkanLibrary {
    library: libloading::Library,
    path: OsString,
}

impl VulkanLibrary {
    ///Candidate names tried by [open_default](Self::open_default), in order.
    pub const DEFAULT_NAMES: &'static [&'static str] = LIBRARY_NAMES;

    ///Opens the library at `path`.
    ///
    /// # Safety
    /// Loading a shared library runs its initialisation code.
    pub unsafe fn open(path: &Path) -> Result<Self, LoaderError> {
        match unsafe { libloading::Library::new(path) } {
            Ok(library) => Ok(VulkanLibrary {
                library,
                path: path.as_os_str().to_owned(),
            }),
            Err(_e) => {
                #[cfg(feature = "logging")]
                log::error!("Could not open {:?}: {}", path, _e);
                Err(LoaderError::LibraryNotFound {
                    tried: vec![path.to_string_lossy().into_owned()],
                })
            }
        }
    }

    ///Tries all [DEFAULT_NAMES](Self::DEFAULT_NAMES) and returns the first library that could be opened.
    ///
    /// # Safety
    /// Loading a shared library runs its initialisation code.
    pub unsafe fn open_default() -> Result<Self, LoaderError> {
        for name in Self::DEFAULT_NAMES {
            match unsafe { libloading::Library::new(name) } {
                Ok(library) => {
                    return Ok(VulkanLibrary {
                        library,
                        path: OsString::from(name),
                    });
                }
                Err(_e) => {
                    #[cfg(feature = "logging")]
                    log::trace!("Could not open {}: {}", name, _e);
                }
            }
        }

        Err(LoaderError::LibraryNotFound {
            tried: Self::DEFAULT_NAMES.iter().map(|n| n.to_string()).collect(),
        })
    }

    pub fn path(&self) -> &OsStr {
        &self.path
    }
}

impl ProcResolver for VulkanLibrary {
    fn level(&self) -> FunctionLevel {
        FunctionLevel::Exported
    }

    unsafe fn resolve(&self, name: &CStr) -> vk::PFN_vkVoidFunction {
        unsafe {
            self.library
                .get::<VoidFunction>(name.to_bytes_with_nul())
                .ok()
                .map(|symbol| *symbol)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_names_not_empty() {
        assert!(!VulkanLibrary::DEFAULT_NAMES.is_empty());
    }

    #[test]
    fn open_missing_path_fails() {
        let path = Path::new("/this/path/does/not/exist/libvulkan.so.1");
        match unsafe { VulkanLibrary::open(path) } {
            Err(LoaderError::LibraryNotFound { tried }) => {
                assert_eq!(tried.len(), 1);
                assert!(tried[0].ends_with("libvulkan.so.1"));
            }
            Err(e) => panic!("unexpected error {}", e),
            Ok(_) => panic!("opened a library that does not exist"),
        }
    }
}
