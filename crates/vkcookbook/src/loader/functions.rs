use std::ffi::CStr;

use ash::vk;

use super::{FunctionDesc, FunctionLevel};

const fn exported(name: &'static CStr) -> FunctionDesc {
    FunctionDesc {
        name,
        level: FunctionLevel::Exported,
        extension: None,
        core_version: None,
    }
}

const fn global(name: &'static CStr) -> FunctionDesc {
    FunctionDesc {
        name,
        level: FunctionLevel::Global,
        extension: None,
        core_version: None,
    }
}

const fn instance(name: &'static CStr) -> FunctionDesc {
    FunctionDesc {
        name,
        level: FunctionLevel::Instance,
        extension: None,
        core_version: None,
    }
}

const fn instance_ext(name: &'static CStr, extension: &'static CStr) -> FunctionDesc {
    FunctionDesc {
        name,
        level: FunctionLevel::Instance,
        extension: Some(extension),
        core_version: None,
    }
}

const fn device(name: &'static CStr) -> FunctionDesc {
    FunctionDesc {
        name,
        level: FunctionLevel::Device,
        extension: None,
        core_version: None,
    }
}

const fn device_ext(name: &'static CStr, extension: &'static CStr) -> FunctionDesc {
    FunctionDesc {
        name,
        level: FunctionLevel::Device,
        extension: Some(extension),
        core_version: None,
    }
}

const fn device_core(name: &'static CStr, version: u32) -> FunctionDesc {
    FunctionDesc {
        name,
        level: FunctionLevel::Device,
        extension: None,
        core_version: Some(version),
    }
}

const SURFACE: &CStr = ash::khr::surface::NAME;
const DEBUG_UTILS: &CStr = ash::ext::debug_utils::NAME;
const SWAPCHAIN: &CStr = ash::khr::swapchain::NAME;

///Every function this crate relies on, grouped by the level it is resolved on.
///
/// Functions without an extension or core version are Vulkan 1.0 core, so any conforming driver satisfies
/// that part of the list. Newer core functions carry the version that introduced them.
pub static FUNCTIONS: &[FunctionDesc] = &[
    exported(c"vkGetInstanceProcAddr"),
    global(c"vkEnumerateInstanceExtensionProperties"),
    global(c"vkEnumerateInstanceLayerProperties"),
    global(c"vkCreateInstance"),
    instance(c"vkEnumeratePhysicalDevices"),
    instance(c"vkEnumerateDeviceExtensionProperties"),
    instance(c"vkGetPhysicalDeviceFeatures"),
    instance(c"vkGetPhysicalDeviceProperties"),
    instance(c"vkGetPhysicalDeviceQueueFamilyProperties"),
    instance(c"vkGetPhysicalDeviceMemoryProperties"),
    instance(c"vkGetPhysicalDeviceFormatProperties"),
    instance(c"vkCreateDevice"),
    instance(c"vkGetDeviceProcAddr"),
    instance(c"vkDestroyInstance"),
    instance_ext(c"vkGetPhysicalDeviceSurfaceSupportKHR", SURFACE),
    instance_ext(c"vkGetPhysicalDeviceSurfaceCapabilitiesKHR", SURFACE),
    instance_ext(c"vkGetPhysicalDeviceSurfaceFormatsKHR", SURFACE),
    instance_ext(c"vkGetPhysicalDeviceSurfacePresentModesKHR", SURFACE),
    instance_ext(c"vkDestroySurfaceKHR", SURFACE),
    instance_ext(c"vkCreateWin32SurfaceKHR", ash::khr::win32_surface::NAME),
    instance_ext(c"vkCreateXlibSurfaceKHR", ash::khr::xlib_surface::NAME),
    instance_ext(c"vkCreateXcbSurfaceKHR", ash::khr::xcb_surface::NAME),
    instance_ext(c"vkCreateWaylandSurfaceKHR", ash::khr::wayland_surface::NAME),
    instance_ext(c"vkCreateMetalSurfaceEXT", ash::ext::metal_surface::NAME),
    instance_ext(c"vkCreateDebugUtilsMessengerEXT", DEBUG_UTILS),
    instance_ext(c"vkDestroyDebugUtilsMessengerEXT", DEBUG_UTILS),
    device(c"vkGetDeviceQueue"),
    device(c"vkDeviceWaitIdle"),
    device(c"vkDestroyDevice"),
    device(c"vkQueueSubmit"),
    device(c"vkQueueWaitIdle"),
    device(c"vkAllocateMemory"),
    device(c"vkFreeMemory"),
    device(c"vkMapMemory"),
    device(c"vkUnmapMemory"),
    device(c"vkFlushMappedMemoryRanges"),
    device(c"vkInvalidateMappedMemoryRanges"),
    device(c"vkCreateBuffer"),
    device(c"vkDestroyBuffer"),
    device(c"vkGetBufferMemoryRequirements"),
    device(c"vkBindBufferMemory"),
    device(c"vkCreateBufferView"),
    device(c"vkDestroyBufferView"),
    device(c"vkCreateImage"),
    device(c"vkDestroyImage"),
    device(c"vkGetImageMemoryRequirements"),
    device(c"vkBindImageMemory"),
    device(c"vkCreateImageView"),
    device(c"vkDestroyImageView"),
    device(c"vkCreateSampler"),
    device(c"vkDestroySampler"),
    device(c"vkCreateShaderModule"),
    device(c"vkDestroyShaderModule"),
    device(c"vkCreatePipelineLayout"),
    device(c"vkDestroyPipelineLayout"),
    device(c"vkCreatePipelineCache"),
    device(c"vkGetPipelineCacheData"),
    device(c"vkDestroyPipelineCache"),
    device(c"vkCreateGraphicsPipelines"),
    device(c"vkCreateComputePipelines"),
    device(c"vkDestroyPipeline"),
    device(c"vkCreateRenderPass"),
    device(c"vkDestroyRenderPass"),
    device(c"vkCreateFramebuffer"),
    device(c"vkDestroyFramebuffer"),
    device(c"vkCreateDescriptorSetLayout"),
    device(c"vkDestroyDescriptorSetLayout"),
    device(c"vkCreateDescriptorPool"),
    device(c"vkDestroyDescriptorPool"),
    device(c"vkResetDescriptorPool"),
    device(c"vkAllocateDescriptorSets"),
    device(c"vkFreeDescriptorSets"),
    device(c"vkUpdateDescriptorSets"),
    device(c"vkCreateCommandPool"),
    device(c"vkResetCommandPool"),
    device(c"vkDestroyCommandPool"),
    device(c"vkAllocateCommandBuffers"),
    device(c"vkFreeCommandBuffers"),
    device(c"vkBeginCommandBuffer"),
    device(c"vkEndCommandBuffer"),
    device(c"vkResetCommandBuffer"),
    device(c"vkCreateSemaphore"),
    device(c"vkDestroySemaphore"),
    device(c"vkCreateFence"),
    device(c"vkDestroyFence"),
    device(c"vkWaitForFences"),
    device(c"vkResetFences"),
    device(c"vkGetFenceStatus"),
    device(c"vkCreateEvent"),
    device(c"vkDestroyEvent"),
    device(c"vkSetEvent"),
    device(c"vkResetEvent"),
    device(c"vkGetEventStatus"),
    device(c"vkCreateQueryPool"),
    device(c"vkDestroyQueryPool"),
    device(c"vkGetQueryPoolResults"),
    device(c"vkCmdPipelineBarrier"),
    device(c"vkCmdCopyBuffer"),
    device(c"vkCmdCopyBufferToImage"),
    device(c"vkCmdCopyImageToBuffer"),
    device(c"vkCmdBlitImage"),
    device(c"vkCmdBeginRenderPass"),
    device(c"vkCmdNextSubpass"),
    device(c"vkCmdEndRenderPass"),
    device(c"vkCmdBindPipeline"),
    device(c"vkCmdBindDescriptorSets"),
    device(c"vkCmdBindVertexBuffers"),
    device(c"vkCmdBindIndexBuffer"),
    device(c"vkCmdPushConstants"),
    device(c"vkCmdSetViewport"),
    device(c"vkCmdSetScissor"),
    device(c"vkCmdDraw"),
    device(c"vkCmdDrawIndexed"),
    device(c"vkCmdDispatch"),
    device(c"vkCmdClearColorImage"),
    device(c"vkCmdResetQueryPool"),
    device(c"vkCmdWriteTimestamp"),
    device_core(c"vkGetSemaphoreCounterValue", vk::API_VERSION_1_2),
    device_core(c"vkSignalSemaphore", vk::API_VERSION_1_2),
    device_core(c"vkWaitSemaphores", vk::API_VERSION_1_2),
    device_ext(c"vkSetDebugUtilsObjectNameEXT", DEBUG_UTILS),
    device_ext(c"vkCreateSwapchainKHR", SWAPCHAIN),
    device_ext(c"vkDestroySwapchainKHR", SWAPCHAIN),
    device_ext(c"vkGetSwapchainImagesKHR", SWAPCHAIN),
    device_ext(c"vkAcquireNextImageKHR", SWAPCHAIN),
    device_ext(c"vkQueuePresentKHR", SWAPCHAIN),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_is_grouped_by_level() {
        //the list is ordered exported -> global -> instance -> device
        assert!(FUNCTIONS.windows(2).all(|w| w[0].level <= w[1].level));
    }

    #[test]
    fn every_name_is_a_vk_function() {
        for f in FUNCTIONS {
            assert!(f.name.to_bytes().starts_with(b"vk"), "{:?}", f.name);
        }
    }

    #[test]
    fn extension_suffix_matches_gate() {
        //KHR/EXT suffixed functions are always gated behind an extension
        for f in FUNCTIONS {
            let name = f.name.to_bytes();
            if name.ends_with(b"KHR") || name.ends_with(b"EXT") {
                assert!(f.extension.is_some(), "{:?} has no extension", f.name);
            }
        }
    }

    ///Receivers whose method calls map one to one onto Vulkan functions.
    const RECEIVERS: &[&str] = &[
        "inner",
        "loader",
        "surface_loader",
        "debug_utils",
        "entry",
        "device",
        "instance",
        "device_ref",
    ];

    ///Methods on those receivers that are wrappers of this crate, not Vulkan calls.
    const NOT_VULKAN: &[&str] = &[
        "as_raw",
        "clone",
        "find_queue",
        "fmt",
        "fp_v1_0",
        "get_format_properties",
        "handle",
        "hash",
        "load_device_functions",
        "load_instance_functions",
        "physical_device_filter",
        "static_fn",
        "track",
        "wait_idle",
    ];

    fn is_ident(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_'
    }

    ///`create_swapchain` -> `vkCreateSwapchain`
    fn vk_name(method: &str) -> String {
        let mut name = String::from("vk");
        for part in method.split('_') {
            let mut chars = part.chars();
            if let Some(first) = chars.next() {
                name.push(first.to_ascii_uppercase());
                name.extend(chars);
            }
        }
        name
    }

    ///Collects `receiver.method(` calls outside of test code.
    fn called_methods(source: &str) -> Vec<String> {
        let code: String = source.chars().filter(|c| !c.is_whitespace()).collect();
        let code = code.split("#[cfg(test)]").next().unwrap_or_default();
        let mut methods = Vec::new();
        for receiver in RECEIVERS {
            let pattern = format!("{receiver}.");
            for (at, _) in code.match_indices(&pattern) {
                if code[..at].chars().next_back().is_some_and(is_ident) {
                    continue;
                }
                let rest = &code[at + pattern.len()..];
                let method: String = rest.chars().take_while(|c| is_ident(*c)).collect();
                if !method.is_empty() && rest[method.len()..].starts_with('(') {
                    methods.push(method);
                }
            }
        }
        methods
    }

    fn collect_sources(dir: &std::path::Path, sources: &mut Vec<std::path::PathBuf>) {
        for entry in std::fs::read_dir(dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                collect_sources(&path, sources);
            } else if path.extension().is_some_and(|e| e == "rs") {
                sources.push(path);
            }
        }
    }

    #[test]
    fn every_called_function_is_in_the_list() {
        let root = std::path::Path::new(env!("CARGO_MANIFEST_DIR"));
        let mut sources = Vec::new();
        collect_sources(&root.join("src"), &mut sources);
        collect_sources(&root.join("../vkcookbook-commands/src"), &mut sources);
        assert!(!sources.is_empty());

        let listed = |name: &str| FUNCTIONS.iter().any(|f| f.name.to_bytes() == name.as_bytes());
        let mut unlisted = Vec::new();
        for path in &sources {
            let source = std::fs::read_to_string(path).unwrap();
            for method in called_methods(&source) {
                if NOT_VULKAN.contains(&method.as_str()) {
                    continue;
                }
                let name = vk_name(&method);
                let known = ["", "KHR", "EXT"]
                    .iter()
                    .any(|suffix| listed(&format!("{name}{suffix}")));
                if !known {
                    unlisted.push(format!("{}: {name}", path.display()));
                }
            }
        }
        unlisted.sort();
        unlisted.dedup();
        assert!(unlisted.is_empty(), "not in FUNCTIONS: {unlisted:#?}");
    }
}
