//! # vkcookbook
//!
//! Thin wrappers around the main Vulkan objects. Every wrapper owns exactly one native handle, keeps the
//! objects it depends on alive (usually through an `Arc<Device>`), destroys its handle on [Drop] and registers
//! itself with an [ObjectTracker](tracker::ObjectTracker) so that leaked objects can be reported.
//!
//! # Usage
//!
//! Everything starts with a [Loader](loader::Loader). It opens the platform's Vulkan library and resolves the
//! exported and global entry points. From there an [Instance](context::Instance) is built, a physical device is
//! selected through a [PhysicalDeviceFilter](context::PhysicalDeviceFilter) and a [Device](context::Device) is
//! created. The [Ctx](context::Ctx) bundles those steps for the common cases.
//!
//! There is no global state. The loader, tracker, instance and device are plain values that are passed on to
//! whoever needs them.
//!
//! Structures that are not sensitive to lifetime requirements (like create infos) are not wrapped.

pub use ash;
pub use bytemuck;

///Runtime resolution of Vulkan entry points. See [Loader](loader::Loader).
pub mod loader;

///Live object bookkeeping and the [VulkanObject](tracker::VulkanObject) capability trait implemented by all wrappers.
pub mod tracker;

///Structures you need to get started. Basically [Instance](context::Instance) and [Device](context::Device) creation.
/// Also includes the [Ctx](context::Ctx) struct, which bundles loader, tracker, instance and device.
pub mod context;

///Device memory allocation and memory type selection.
pub mod memory;

///Allocatable and device owned resources. Mostly [Image](resources::Image) and [Buffer](resources::Buffer),
/// but also pipelines, render passes, descriptors and command buffers.
pub mod resources;

///Window surface related structures. Includes a self managed [Surface](surface::Surface) type.
pub mod surface;

/// [Swapchain](swapchain::Swapchain) type that can be created from a [Surface](surface::Surface). Includes helper
/// functions to select formats, present modes and extents.
pub mod swapchain;

///Vulkan synchronisation primitives
pub mod sync;

mod error;
pub use error::{
    BufferMapError, CommandBufferError, CookbookError, DescriptorError, DeviceError, InstanceError,
    LoaderError, MemoryError, PipelineError, ShaderError, SwapchainError, SyncError,
};

///The infamous utility module. Alignment helpers, C-string conversion and friends.
pub mod util;
