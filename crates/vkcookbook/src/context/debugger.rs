use std::{ffi::CStr, sync::Arc};

use ash::vk::{self, Handle};

use crate::tracker::{ObjectTracker, ObjectType, TrackedObject, VulkanObject};

const UNKNOWNID: &CStr = c"unknown id";
const NOMSG: &CStr = c"no message";

///The external callback print function for debugging
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    #[allow(unused)] message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut core::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        #[cfg(feature = "logging")]
        log::error!("CookbookDebugMsg: Got Msg, but no data!");
        return vk::FALSE;
    }

    //Safety: the layer guarantees that the data is valid for the duration of the callback
    let data = unsafe { &*p_callback_data };
    let id = data.message_id_number;
    let idname = if data.p_message_id_name.is_null() {
        UNKNOWNID
    } else {
        unsafe { CStr::from_ptr(data.p_message_id_name) }
    };
    let msg = if data.p_message.is_null() {
        NOMSG
    } else {
        unsafe { CStr::from_ptr(data.p_message) }
    };

    //use log if the feature is enabled, otherwise use println
    #[cfg(feature = "logging")]
    {
        if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            log::error!("[{}: {:?}]: {:?}", id, idname, msg);
        } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            log::warn!("[{}: {:?}]: {:?}", id, idname, msg);
        } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            log::info!("[{}: {:?}]: {:?}", id, idname, msg);
        } else {
            log::trace!("[{}: {:?}]: {:?}", id, idname, msg);
        }
    }

    #[cfg(not(feature = "logging"))]
    {
        println!(
            "CookbookDebugMsg: Level: {:?}, Type: {:?}\nId[{}]: {:?}\nMsg: {:?}",
            message_severity, message_types, id, idname, msg
        );
    }

    vk::FALSE
}

///`VK_EXT_debug_utils` messenger that forwards validation messages to [vulkan_debug_callback]. Owned by the
/// [Instance](crate::context::Instance) and destroyed before it.
pub struct DebugMessenger {
    pub loader: ash::ext::debug_utils::Instance,
    pub inner: vk::DebugUtilsMessengerEXT,
    tracking: TrackedObject,
}

impl DebugMessenger {
    ///Severities forwarded by default.
    pub const DEFAULT_SEVERITY: vk::DebugUtilsMessageSeverityFlagsEXT =
        vk::DebugUtilsMessageSeverityFlagsEXT::from_raw(
            vk::DebugUtilsMessageSeverityFlagsEXT::ERROR.as_raw()
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING.as_raw()
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO.as_raw(),
        );

    pub fn new(
        entry: &ash::Entry,
        instance: &ash::Instance,
        tracker: &Arc<ObjectTracker>,
        severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    ) -> Result<Self, vk::Result> {
        let loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(severity)
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        let inner = unsafe { loader.create_debug_utils_messenger(&info, None)? };

        Ok(DebugMessenger {
            loader,
            inner,
            tracking: tracker.register(ObjectType::DebugMessenger),
        })
    }
}

impl VulkanObject for DebugMessenger {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.inner.as_raw()
    }
}

impl Drop for DebugMessenger {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_debug_utils_messenger(self.inner, None) };
    }
}
