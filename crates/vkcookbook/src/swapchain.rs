use std::sync::Arc;

use ash::vk::{self, Handle};

use crate::{
    context::{Device, Queue},
    error::SwapchainError,
    resources::{Image, ImageType, ImgDesc, SharingMode},
    surface::{
        Surface, choose_image_count, choose_image_extent, choose_present_mode,
        choose_surface_format,
    },
    sync::Semaphore,
    tracker::{ObjectType, TrackedObject, VulkanObject},
};

///Requested swapchain properties. Each field is a wish that is checked against the surface's capabilities
/// when the swapchain is (re)created. Use [resolve](SwapchainSettings::resolve) to see what would actually be used.
#[derive(Clone, Debug)]
pub struct SwapchainSettings {
    ///Ordered preferred image formats. If none of them is supported, the first supported format is taken.
    pub format_preference: Vec<vk::SurfaceFormatKHR>,
    ///Preferred present mode. Falls back to FIFO if not supported.
    pub present_mode: vk::PresentModeKHR,
    pub image_count: u32,
    ///Used if the surface does not dictate an extent.
    pub extent: vk::Extent2D,
    pub array_layers: u32,
    pub usage: vk::ImageUsageFlags,
    pub sharing_mode: SharingMode,
    ///If not set, the identity transform is used if possible.
    pub transform: Option<vk::SurfaceTransformFlagsKHR>,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub is_clipped: bool,
}

impl Default for SwapchainSettings {
    fn default() -> Self {
        SwapchainSettings {
            format_preference: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_mode: vk::PresentModeKHR::FIFO,
            //tripple buffering
            image_count: 3,
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            array_layers: 1,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST,
            sharing_mode: SharingMode::Exclusive,
            transform: None,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            is_clipped: true,
        }
    }
}

///Swapchain parameters after checking [SwapchainSettings] against the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub array_layers: u32,
    pub usage: vk::ImageUsageFlags,
    pub transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
}

const COMPOSITE_ALPHA_ORDER: [vk::CompositeAlphaFlagsKHR; 4] = [
    vk::CompositeAlphaFlagsKHR::OPAQUE,
    vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
    vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    vk::CompositeAlphaFlagsKHR::INHERIT,
];

impl SwapchainSettings {
    ///Checks all settings against the surface's `capabilities`, `formats` and `present_modes`.
    pub fn resolve(
        &self,
        capabilities: &vk::SurfaceCapabilitiesKHR,
        formats: &[vk::SurfaceFormatKHR],
        present_modes: &[vk::PresentModeKHR],
    ) -> Result<SwapchainConfig, SwapchainError> {
        let format =
            choose_surface_format(formats, &self.format_preference).ok_or(SwapchainError::NoFormat)?;

        let extent = choose_image_extent(capabilities, self.extent);
        if extent.width == 0 || extent.height == 0 {
            return Err(SwapchainError::InvalidExtent(extent));
        }

        let usage = self.usage & capabilities.supported_usage_flags;
        #[cfg(feature = "logging")]
        if usage != self.usage {
            log::warn!(
                "Swapchain usage {:?} not supported, using {:?}",
                self.usage,
                usage
            );
        }

        let transform = match self.transform {
            Some(t) if capabilities.supported_transforms.contains(t) => t,
            _ if capabilities
                .supported_transforms
                .contains(vk::SurfaceTransformFlagsKHR::IDENTITY) =>
            {
                vk::SurfaceTransformFlagsKHR::IDENTITY
            }
            _ => capabilities.current_transform,
        };

        let composite_alpha = if capabilities
            .supported_composite_alpha
            .contains(self.composite_alpha)
        {
            self.composite_alpha
        } else {
            COMPOSITE_ALPHA_ORDER
                .into_iter()
                .find(|a| capabilities.supported_composite_alpha.contains(*a))
                .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
        };

        Ok(SwapchainConfig {
            format,
            present_mode: choose_present_mode(present_modes, self.present_mode),
            extent,
            image_count: choose_image_count(capabilities, self.image_count),
            array_layers: self
                .array_layers
                .clamp(1, capabilities.max_image_array_layers.max(1)),
            usage,
            transform,
            composite_alpha,
        })
    }
}

pub struct SwapchainBuilder {
    ///Surface based on which the swapchain will be build.
    pub surface: Arc<Surface>,
    ///Device for which the swapchain will be build.
    pub device: Arc<Device>,
    pub settings: SwapchainSettings,
}

impl SwapchainBuilder {
    ///enables you to chain multiple assignments to a constructed builder. For instance
    ///
    ///```ignore
    /// builder.with(|s| s.usage = ash::vk::ImageUsageFlags::COLOR_ATTACHMENT)
    ///    .with(|s| s.image_count = 2)
    ///    .build()
    ///```
    pub fn with(mut self, filter: impl FnOnce(&mut SwapchainSettings)) -> Self {
        filter(&mut self.settings);
        self
    }

    ///Prefers MAILBOX presentation. Falls back to FIFO if not available.
    pub fn with_low_latency(self) -> Self {
        self.with(|s| s.present_mode = vk::PresentModeKHR::MAILBOX)
    }

    ///Prefers immediate presentation.
    pub fn with_immediate_present(self) -> Self {
        self.with(|s| s.present_mode = vk::PresentModeKHR::IMMEDIATE)
    }

    pub fn build(self) -> Result<Swapchain, SwapchainError> {
        let loader = ash::khr::swapchain::Device::new(&self.device.instance.inner, &self.device.inner);
        let (swapchain, config, images, semaphores) = create_swapchain_state(
            &self.device,
            &loader,
            &self.surface,
            &self.settings,
            vk::SwapchainKHR::null(),
        )?;

        #[cfg(feature = "logging")]
        log::info!(
            "Created swapchain with {} images of {:?} at {:?}",
            images.len(),
            config.format.format,
            config.extent
        );

        let tracking = self.device.track(ObjectType::Swapchain);
        Ok(Swapchain {
            loader,
            swapchain,
            surface: self.surface,
            device: self.device,
            images,
            config,
            settings: self.settings,
            frame_semaphores: semaphores,
            next_semaphore: 0,
            state: SwapchainState::Current,
            tracking,
        })
    }
}

type SwapchainParts = (
    vk::SwapchainKHR,
    SwapchainConfig,
    Vec<Arc<Image>>,
    Vec<FrameSemaphores>,
);

//Creates a swapchain and everything that depends on it. Cleans up after itself if anything fails.
fn create_swapchain_state(
    device: &Arc<Device>,
    loader: &ash::khr::swapchain::Device,
    surface: &Surface,
    settings: &SwapchainSettings,
    old_swapchain: vk::SwapchainKHR,
) -> Result<SwapchainParts, SwapchainError> {
    let capabilities = surface.get_capabilities(device.physical_device)?;
    let formats = surface.get_formats(device.physical_device)?;
    let present_modes = surface.get_present_modes(device.physical_device)?;
    let config = settings.resolve(&capabilities, &formats, &present_modes)?;

    let mut create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface.surface)
        .min_image_count(config.image_count)
        .image_format(config.format.format)
        .image_color_space(config.format.color_space)
        .image_extent(config.extent)
        .image_array_layers(config.array_layers)
        .image_usage(config.usage)
        .pre_transform(config.transform)
        .composite_alpha(config.composite_alpha)
        .present_mode(config.present_mode)
        .clipped(settings.is_clipped)
        .old_swapchain(old_swapchain);

    match &settings.sharing_mode {
        SharingMode::Exclusive => {
            create_info = create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        }
        SharingMode::Concurrent {
            queue_family_indices,
        } => {
            create_info = create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(queue_family_indices)
        }
    }

    let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };

    let dependent = (|| -> Result<_, SwapchainError> {
        //The swapchain owns its images, so they are wrapped without memory.
        let images = unsafe { loader.get_swapchain_images(swapchain)? }
            .into_iter()
            .map(|image| {
                Arc::new(Image::from_swapchain_image(
                    device,
                    image,
                    ImgDesc {
                        img_type: if config.array_layers > 1 {
                            ImageType::Tex2dArray(config.array_layers)
                        } else {
                            ImageType::Tex2d
                        },
                        format: config.format.format,
                        extent: vk::Extent3D {
                            width: config.extent.width,
                            height: config.extent.height,
                            depth: 1,
                        },
                        mip_levels: 1,
                        samples: vk::SampleCountFlags::TYPE_1,
                        tiling: vk::ImageTiling::OPTIMAL,
                        usage: config.usage,
                        sharing_mode: settings.sharing_mode.clone(),
                    },
                ))
            })
            .collect::<Vec<_>>();

        let semaphores = (0..images.len())
            .map(|_| FrameSemaphores::new(device))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((images, semaphores))
    })();

    match dependent {
        Ok((images, semaphores)) => Ok((swapchain, config, images, semaphores)),
        Err(e) => {
            unsafe { loader.destroy_swapchain(swapchain, None) };
            Err(e)
        }
    }
}

//Semaphores used for one acquire/present round trip.
struct FrameSemaphores {
    acquire: Arc<Semaphore>,
    present: Arc<Semaphore>,
}

impl FrameSemaphores {
    fn new(device: &Arc<Device>) -> Result<Self, SwapchainError> {
        Ok(FrameSemaphores {
            acquire: Arc::new(Semaphore::new(device)?),
            present: Arc::new(Semaphore::new(device)?),
        })
    }
}

///Wrapper around the swapchain's `image` that keeps track of needed primitives.
pub struct SwapchainImage {
    ///The actual image, owned by the swapchain.
    pub image: Arc<Image>,
    ///Index identifying the image when presenting
    pub index: u32,
    ///Signaled once the image is acquired. Work writing to the image has to wait for it.
    pub sem_acquire: Arc<Semaphore>,
    ///Semaphore that has to be signaled when this image is ready for present. Should be signaled by the command buffer
    /// that is writing to the image.
    pub sem_present: Arc<Semaphore>,
    ///True if the swapchain does not match the surface exactly anymore. Presentation still works, but the swapchain
    /// should be recreated.
    pub suboptimal: bool,
}

///Whether [Swapchain::swapchain] can still be acquired from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainState {
    Current,
    ///A recreation failed. The handle was passed as `old_swapchain` and only waits for destruction.
    Retired,
}

impl SwapchainState {
    ///State after a recreation attempt that returned `result`.
    pub fn after_recreate<T, E>(result: &Result<T, E>) -> Self {
        match result {
            Ok(_) => SwapchainState::Current,
            Err(_) => SwapchainState::Retired,
        }
    }

    ///Fails with [SwapchainError::OutOfDate] if the swapchain has to be recreated before use.
    pub fn ensure_current(self) -> Result<(), SwapchainError> {
        match self {
            SwapchainState::Current => Ok(()),
            SwapchainState::Retired => Err(SwapchainError::OutOfDate),
        }
    }
}

pub struct Swapchain {
    pub loader: ash::khr::swapchain::Device,
    pub swapchain: vk::SwapchainKHR,
    ///associated surface. Needed to keep the surface alive until the swapchain is dropped.
    pub surface: Arc<Surface>,
    pub device: Arc<Device>,
    ///all images of the swapchain, ordered by their swapchain index.
    pub images: Vec<Arc<Image>>,
    ///The configuration the current swapchain was created with.
    pub config: SwapchainConfig,
    ///Settings used when recreating.
    pub settings: SwapchainSettings,
    frame_semaphores: Vec<FrameSemaphores>,
    next_semaphore: usize,
    state: SwapchainState,
    tracking: TrackedObject,
}

impl Swapchain {
    ///Creates a new swapchain builder with default [SwapchainSettings]. The extent is initialised to the surface's
    /// current extent if it is defined.
    ///
    /// # Note on Wayland
    /// The surface's extent is undefined on Wayland. In that case set `settings.extent` to the window's size.
    pub fn builder(device: &Arc<Device>, surface: &Arc<Surface>) -> SwapchainBuilder {
        let mut settings = SwapchainSettings::default();
        if let Some(extent) = surface.get_current_extent(device.physical_device) {
            settings.extent = extent;
        }

        SwapchainBuilder {
            surface: surface.clone(),
            device: device.clone(),
            settings,
        }
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    pub fn format(&self) -> vk::Format {
        self.config.format.format
    }

    pub fn state(&self) -> SwapchainState {
        self.state
    }

    ///Retrieves the next image that should be written to. Note that all required information (acquire semaphore and)
    /// a semaphore to be signaled when finished rendering is included in that image.
    ///
    /// Returns [SwapchainError::OutOfDate] if the swapchain has to be [recreated](Self::recreate).
    pub fn acquire_next_image(&mut self, timeout: u64) -> Result<SwapchainImage, SwapchainError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        self.state.ensure_current()?;

        let frame = &self.frame_semaphores[self.next_semaphore];
        let (index, suboptimal) = match unsafe {
            self.loader.acquire_next_image(
                self.swapchain,
                timeout,
                frame.acquire.inner,
                vk::Fence::null(),
            )
        } {
            Ok(r) => r,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => return Err(SwapchainError::OutOfDate),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
                return Err(crate::error::SyncError::Timeout(timeout).into());
            }
            Err(e) => return Err(e.into()),
        };

        #[cfg(feature = "logging")]
        if suboptimal {
            log::warn!("Acquired image is suboptimal!");
        }

        let image = SwapchainImage {
            image: self.images[index as usize].clone(),
            index,
            sem_acquire: frame.acquire.clone(),
            sem_present: frame.present.clone(),
            suboptimal,
        };
        self.next_semaphore = (self.next_semaphore + 1) % self.frame_semaphores.len();
        Ok(image)
    }

    ///Enqueues a present command for `image`, waiting for `image.sem_present`. Returns true if the swapchain is suboptimal
    /// and should be recreated. Returns [SwapchainError::OutOfDate] if it must be recreated.
    ///
    /// The caller must make sure `queue` is not used on another thread at the same time.
    pub fn present(&self, image: SwapchainImage, queue: &Queue) -> Result<bool, SwapchainError> {
        #[cfg(feature = "profiling")]
        puffin::profile_function!();

        self.state.ensure_current()?;

        let present_info = vk::PresentInfoKHR::default()
            .swapchains(core::slice::from_ref(&self.swapchain))
            .image_indices(core::slice::from_ref(&image.index))
            .wait_semaphores(core::slice::from_ref(&image.sem_present.inner));

        match unsafe { self.loader.queue_present(queue.inner, &present_info) } {
            Ok(suboptimal) => {
                #[cfg(feature = "logging")]
                if suboptimal {
                    log::warn!("Suboptimal image on present");
                }
                Ok(suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(SwapchainError::OutOfDate),
            Err(e) => {
                #[cfg(feature = "logging")]
                log::error!("Error while presenting image: {}", e);
                Err(e.into())
            }
        }
    }

    ///Recreates the swapchain with the current settings and `extent`.
    ///
    /// The old swapchain is passed as `old_swapchain`, which retires it even if creation fails. In that case the
    /// swapchain is marked [Retired](SwapchainState::Retired): acquire and present return [SwapchainError::OutOfDate]
    /// until a later `recreate` succeeds. The old handle is only destroyed on success or drop.
    ///
    /// Images of the old swapchain must not be in use anymore, for instance by waiting for the device to idle.
    pub fn recreate(&mut self, extent: vk::Extent2D) -> Result<(), SwapchainError> {
        let mut settings = self.settings.clone();
        settings.extent = extent;

        let result = create_swapchain_state(
            &self.device,
            &self.loader,
            &self.surface,
            &settings,
            self.swapchain,
        );
        self.state = SwapchainState::after_recreate(&result);
        let (swapchain, config, images, semaphores) = match result {
            Ok(state) => state,
            Err(e) => {
                #[cfg(feature = "logging")]
                log::error!("Recreating swapchain failed, old swapchain is retired: {}", e);
                return Err(e);
            }
        };

        #[cfg(feature = "logging")]
        log::info!("Recreated swapchain for {:?}", config.extent);

        unsafe { self.loader.destroy_swapchain(self.swapchain, None) };
        self.swapchain = swapchain;
        self.config = config;
        self.images = images;
        self.frame_semaphores = semaphores;
        self.next_semaphore = 0;
        self.settings = settings;
        Ok(())
    }
}

impl VulkanObject for Swapchain {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.swapchain.as_raw()
    }
    fn owning_device(&self) -> Option<&Arc<Device>> {
        Some(&self.device)
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            self.loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    fn capabilities() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            max_image_array_layers: 1,
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_composite_alpha: vk::CompositeAlphaFlagsKHR::INHERIT,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        }
    }

    const FORMATS: [vk::SurfaceFormatKHR; 1] = [vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    }];

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Swapchain: Send, Sync);
        assert_impl_all!(SwapchainImage: Send, Sync);
    }

    #[test]
    fn settings_are_clamped_to_surface() {
        let settings = SwapchainSettings::default();
        let config = settings
            .resolve(&capabilities(), &FORMATS, &[vk::PresentModeKHR::FIFO])
            .unwrap();

        assert_eq!(config.format, FORMATS[0]);
        assert_eq!(config.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(config.extent, settings.extent);
        assert_eq!(config.image_count, 3);
        //transfer dst is not supported by the surface
        assert_eq!(config.usage, vk::ImageUsageFlags::COLOR_ATTACHMENT);
        //opaque is not supported either
        assert_eq!(config.composite_alpha, vk::CompositeAlphaFlagsKHR::INHERIT);
        assert_eq!(config.transform, vk::SurfaceTransformFlagsKHR::IDENTITY);
    }

    #[test]
    fn zero_extent_is_rejected() {
        let mut caps = capabilities();
        caps.current_extent = vk::Extent2D {
            width: 0,
            height: 0,
        };
        caps.min_image_extent = caps.current_extent;
        assert!(matches!(
            SwapchainSettings::default().resolve(&caps, &FORMATS, &[]),
            Err(SwapchainError::InvalidExtent(_))
        ));
    }

    #[test]
    fn missing_formats_are_rejected() {
        assert!(matches!(
            SwapchainSettings::default().resolve(&capabilities(), &[], &[]),
            Err(SwapchainError::NoFormat)
        ));
    }

    #[test]
    fn failed_recreate_retires_swapchain() {
        let failed: Result<(), SwapchainError> =
            Err(SwapchainError::InvalidExtent(vk::Extent2D::default()));
        let state = SwapchainState::after_recreate(&failed);
        assert_eq!(state, SwapchainState::Retired);
        assert!(matches!(
            state.ensure_current(),
            Err(SwapchainError::OutOfDate)
        ));

        let state = SwapchainState::after_recreate(&Ok::<(), SwapchainError>(()));
        assert_eq!(state, SwapchainState::Current);
        assert!(state.ensure_current().is_ok());
    }
}
