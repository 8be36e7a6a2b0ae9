use std::ffi::CString;

use ash::{LoadingError, vk};
use thiserror::Error;

use crate::loader::FunctionLevel;

fn version_name(version: &u32) -> String {
    format!(
        "{}.{}",
        vk::api_version_major(*version),
        vk::api_version_minor(*version)
    )
}

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Could not open Vulkan library, tried: {tried:?}")]
    LibraryNotFound { tried: Vec<String> },
    #[error("Failed to load Vulkan entry point: {0}")]
    EntryLoading(#[from] LoadingError),
    #[error("Missing {level:?} level functions: {names:?}")]
    MissingFunctions {
        level: FunctionLevel,
        names: Vec<String>,
    },
}

#[derive(Error, Debug)]
pub enum InstanceError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),
    #[error("Instance extension {0:?} is not available")]
    MissingExtension(CString),
    #[error("Instance layer {0:?} is not available")]
    MissingLayer(CString),
    #[error("Name contains an interior nul byte: {0}")]
    InvalidName(String),
    #[error("Window handle error: {0}")]
    Handle(#[from] raw_window_handle::HandleError),
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Extension {0} is not supported by device")]
    UnsupportedExtension(String),
    #[error("Extension {0} was enabled twice")]
    DuplicateExtension(String),
    #[error("No physical device found. Is a Vulkan capable GPU and driver installed?")]
    NoPhysicalDevice,
    #[error("No queue family with flags {0:?}")]
    NoQueueFamily(vk::QueueFlags),
    #[error("Queue family {0} does not exist")]
    InvalidQueueFamily(u32),
    #[error(
        "{feature} needs Vulkan {}, device is used with {}",
        version_name(.required),
        version_name(.available)
    )]
    UnsupportedVersion {
        feature: &'static str,
        required: u32,
        available: u32,
    },
    #[error("Loader error: {0}")]
    Loader(#[from] LoaderError),
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
}

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("No memory type for type bits {type_bits:#b} with flags {flags:?}")]
    NoMemoryType {
        type_bits: u32,
        flags: vk::MemoryPropertyFlags,
    },
    #[error("Buffers and allocations can not be empty")]
    ZeroSize,
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
}

#[derive(Error, Debug)]
pub enum BufferMapError {
    #[error("Supplied offset {offset} bigger then buffer of size {size}")]
    OffsetTooLarge { offset: usize, size: usize },
    #[error("Mapped buffer is partially written. {written} / {size}")]
    PartialyWritten { written: usize, size: usize },
    #[error("Buffer can not be mapped")]
    NotMapable,
    #[error("Mapped memory error: {0}")]
    Memory(#[from] MemoryError),
}

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Filesystem error: {0}")]
    FileError(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CommandBufferError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Command pool is not resettable")]
    PoolNotResetable,
    #[error("Submitting to queue failed with {0}")]
    SubmitFailed(vk::Result),
    #[error("Failed to allocate command buffer. Requested {count}, got {allocated}")]
    FailedToAllocate { allocated: usize, count: usize },
}

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to allocate Descriptors from pool. Requested {requested} got {count}")]
    Allocation { requested: usize, count: usize },
    #[error("Descriptorset can't be freed")]
    UnFreeable,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to allocate pipeline")]
    Allocation,
    #[error("Attachment reference {index} out of range, render pass has {count} attachments")]
    AttachmentOutOfRange { index: u32, count: usize },
    #[error("Subpass {0} does not exist")]
    InvalidSubpass(u32),
    #[error("Framebuffer has {got} attachments, render pass expects {expected}")]
    AttachmentCountMismatch { expected: usize, got: usize },
}

#[derive(Error, Debug)]
pub enum SwapchainError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Swapchain can't have a extent of 0 on either axis, was: {0:?}")]
    InvalidExtent(vk::Extent2D),
    #[error("Surface reports no formats")]
    NoFormat,
    #[error("Swapchain is out of date and needs to be recreated")]
    OutOfDate,
    #[error("Surface error: {0}")]
    Surface(#[from] InstanceError),
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Timed out after {0}ns")]
    Timeout(u64),
    #[error("Timeline semaphores are not enabled on this device")]
    TimelineUnsupported,
}

#[derive(Error, Debug)]
pub enum CookbookError {
    #[error("Loader error: {0}")]
    LoaderError(#[from] LoaderError),
    #[error("Instance error: {0}")]
    InstanceError(#[from] InstanceError),
    #[error("Device error: {0}")]
    DeviceError(#[from] DeviceError),
    #[error("Memory error: {0}")]
    MemoryError(#[from] MemoryError),
    #[error("Buffer map error: {0}")]
    BufferMapError(#[from] BufferMapError),
    #[error("CommandBuffer error: {0}")]
    CommandBufferError(#[from] CommandBufferError),
    #[error("Desriptor error: {0}")]
    DescriptorError(#[from] DescriptorError),
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] PipelineError),
    #[error("Shader/ShaderModule error: {0}")]
    ShaderError(#[from] ShaderError),
    #[error("Swapchain error: {0}")]
    SwapchainError(#[from] SwapchainError),
    #[error("Sync error: {0}")]
    SyncError(#[from] SyncError),
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
}

#[cfg(test)]
mod test {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn assure_send_sync() {
        assert_impl_all!(LoaderError: Send, Sync);
        assert_impl_all!(InstanceError: Send, Sync);
        assert_impl_all!(DeviceError: Send, Sync);
        assert_impl_all!(MemoryError: Send, Sync);
        assert_impl_all!(BufferMapError: Send, Sync);
        assert_impl_all!(SyncError: Send, Sync);
        assert_impl_all!(ShaderError: Send, Sync);
        assert_impl_all!(CommandBufferError: Send, Sync);
        assert_impl_all!(DescriptorError: Send, Sync);
        assert_impl_all!(PipelineError: Send, Sync);
        assert_impl_all!(SwapchainError: Send, Sync);
        assert_impl_all!(CookbookError: Send, Sync);
    }

    #[test]
    fn nested_errors_convert() {
        let err: CookbookError = DeviceError::NoPhysicalDevice.into();
        assert!(matches!(
            err,
            CookbookError::DeviceError(DeviceError::NoPhysicalDevice)
        ));

        let err: SwapchainError = SyncError::Timeout(10).into();
        assert_eq!(err.to_string(), "Sync error: Timed out after 10ns");
    }

    #[test]
    fn flush_errors_reach_buffer_map_error() {
        let err: BufferMapError = MemoryError::VkError(vk::Result::ERROR_MEMORY_MAP_FAILED).into();
        assert!(matches!(
            err,
            BufferMapError::Memory(MemoryError::VkError(vk::Result::ERROR_MEMORY_MAP_FAILED))
        ));
        assert!(
            err.to_string()
                .starts_with("Mapped memory error: Vulkan error: ")
        );
    }

    #[test]
    fn version_errors_name_versions() {
        let err = DeviceError::UnsupportedVersion {
            feature: "timelineSemaphore",
            required: vk::API_VERSION_1_2,
            available: vk::API_VERSION_1_0,
        };
        assert_eq!(
            err.to_string(),
            "timelineSemaphore needs Vulkan 1.2, device is used with 1.0"
        );
    }

    #[test]
    fn missing_functions_lists_names() {
        let err = LoaderError::MissingFunctions {
            level: FunctionLevel::Device,
            names: vec!["vkCreateBuffer".to_owned()],
        };
        assert_eq!(
            err.to_string(),
            "Missing Device level functions: [\"vkCreateBuffer\"]"
        );
    }
}
