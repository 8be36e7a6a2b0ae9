use std::sync::Arc;

use ash::vk::{self, Handle};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};

use crate::{
    error::InstanceError,
    tracker::{ObjectType, TrackedObject, VulkanObject},
};

///using [ash-window](https://crates.io/crates/ash-window) to safely find a surface for a given window
/// handle. Also keeps the instance alive long enough to destroy the created surface in time.
pub struct Surface {
    ///keeps the surface alive
    pub instance: Arc<crate::context::Instance>,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: ash::khr::surface::Instance,
    tracking: TrackedObject,
}

impl Surface {
    pub fn new<T>(
        instance: &Arc<crate::context::Instance>,
        window_handle: &T,
    ) -> Result<Self, InstanceError>
    where
        T: HasWindowHandle + HasDisplayHandle,
    {
        let surface = unsafe {
            ash_window::create_surface(
                &instance.loader.entry,
                &instance.inner,
                window_handle.display_handle()?.as_raw(),
                window_handle.window_handle()?.as_raw(),
                None,
            )?
        };
        let surface_loader =
            ash::khr::surface::Instance::new(&instance.loader.entry, &instance.inner);

        Ok(Surface {
            instance: instance.clone(),
            surface,
            surface_loader,
            tracking: instance.tracker.register(ObjectType::Surface),
        })
    }

    pub fn get_capabilities(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<vk::SurfaceCapabilitiesKHR, InstanceError> {
        Ok(unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_device, self.surface)?
        })
    }

    pub fn get_formats(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::SurfaceFormatKHR>, InstanceError> {
        Ok(unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical_device, self.surface)?
        })
    }

    pub fn get_present_modes(
        &self,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Vec<vk::PresentModeKHR>, InstanceError> {
        Ok(unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_device, self.surface)?
        })
    }

    ///Returns true if queue family `family` of `physical_device` can present to this surface.
    pub fn supports_queue_family(
        &self,
        physical_device: vk::PhysicalDevice,
        family: u32,
    ) -> Result<bool, InstanceError> {
        Ok(unsafe {
            self.surface_loader.get_physical_device_surface_support(
                physical_device,
                family,
                self.surface,
            )?
        })
    }

    ///Tries to read the current surface extent. This can fail on some platforms (like Linux+Wayland), where the
    /// extent is defined by the swapchain.
    /// Note that this can be different than the swapchain extent, for instace right after a resize.
    pub fn get_current_extent(&self, physical_device: vk::PhysicalDevice) -> Option<vk::Extent2D> {
        match self.get_capabilities(physical_device) {
            Ok(caps) => defined_extent(caps.current_extent),
            Err(_e) => {
                #[cfg(feature = "logging")]
                log::error!("Failed to query surface capabilities: {}", _e);
                None
            }
        }
    }
}

impl VulkanObject for Surface {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.surface.as_raw()
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.surface_loader.destroy_surface(self.surface, None) };
    }
}

//`u32::MAX` on both axis signals that the swapchain defines the extent.
fn defined_extent(extent: vk::Extent2D) -> Option<vk::Extent2D> {
    match extent {
        vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        }
        | vk::Extent2D {
            width: 0,
            height: 0,
        } => None,
        e => Some(e),
    }
}

///Selects the first of `preferred` that is supported. If the surface reports a single `UNDEFINED` format any
/// format is allowed and the first preference is returned. If no preference matches, a supported format with the
/// same `format` but different color space is used, and finally the first supported format.
///
/// Returns `None` only if `supported` is empty.
pub fn choose_surface_format(
    supported: &[vk::SurfaceFormatKHR],
    preferred: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    if let [single] = supported {
        if single.format == vk::Format::UNDEFINED {
            return preferred.first().copied().or(Some(vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }));
        }
    }

    for pref in preferred {
        if supported.contains(pref) {
            return Some(*pref);
        }
    }

    for pref in preferred {
        if let Some(s) = supported.iter().find(|s| s.format == pref.format) {
            #[cfg(feature = "logging")]
            log::warn!(
                "Surface format {:?} only supported with color space {:?}",
                pref.format,
                s.color_space
            );
            return Some(*s);
        }
    }

    supported.first().copied()
}

///Returns `desired` if supported, otherwise FIFO which every implementation supports.
pub fn choose_present_mode(
    supported: &[vk::PresentModeKHR],
    desired: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if supported.contains(&desired) {
        desired
    } else {
        #[cfg(feature = "logging")]
        log::warn!("Present mode {:?} not supported, using FIFO", desired);
        vk::PresentModeKHR::FIFO
    }
}

///Uses the surface's current extent if it is defined, otherwise clamps `desired` to the surface limits.
pub fn choose_image_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: desired.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: desired.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

///Clamps `desired` to the surface's image count limits. A `max_image_count` of 0 means there is no upper limit.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR, desired: u32) -> u32 {
    let count = desired.max(capabilities.min_image_count);
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BGRA_SRGB: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };
    const RGBA_UNORM: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::R8G8B8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    #[test]
    fn undefined_format_allows_any() {
        let supported = [vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(
            choose_surface_format(&supported, &[RGBA_UNORM]),
            Some(RGBA_UNORM)
        );
    }

    #[test]
    fn preferred_format_wins() {
        let supported = [RGBA_UNORM, BGRA_SRGB];
        assert_eq!(
            choose_surface_format(&supported, &[BGRA_SRGB, RGBA_UNORM]),
            Some(BGRA_SRGB)
        );
    }

    #[test]
    fn format_falls_back() {
        let supported = [RGBA_UNORM];
        //same format, other color space
        let pref = vk::SurfaceFormatKHR {
            format: vk::Format::R8G8B8A8_UNORM,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        };
        assert_eq!(choose_surface_format(&supported, &[pref]), Some(RGBA_UNORM));
        assert_eq!(
            choose_surface_format(&supported, &[BGRA_SRGB]),
            Some(RGBA_UNORM)
        );
        assert_eq!(choose_surface_format(&[], &[BGRA_SRGB]), None);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let supported = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            choose_present_mode(&supported, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&supported, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
    }

    fn caps(current: vk::Extent2D, min_count: u32, max_count: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: current,
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 2048,
            },
            ..Default::default()
        }
    }

    #[test]
    fn extent_selection() {
        let fixed = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let desired = vk::Extent2D {
            width: 5000,
            height: 0,
        };
        assert_eq!(choose_image_extent(&caps(fixed, 2, 3), desired), fixed);

        let undefined = vk::Extent2D {
            width: u32::MAX,
            height: u32::MAX,
        };
        assert_eq!(
            choose_image_extent(&caps(undefined, 2, 3), desired),
            vk::Extent2D {
                width: 4096,
                height: 1
            }
        );
        assert_eq!(defined_extent(undefined), None);
        assert_eq!(defined_extent(fixed), Some(fixed));
    }

    #[test]
    fn image_count_is_clamped() {
        let extent = vk::Extent2D {
            width: 1,
            height: 1,
        };
        assert_eq!(choose_image_count(&caps(extent, 2, 3), 1), 2);
        assert_eq!(choose_image_count(&caps(extent, 2, 3), 8), 3);
        //unbounded
        assert_eq!(choose_image_count(&caps(extent, 2, 0), 8), 8);
    }
}
