use ash::vk::{self, Handle};

use crate::{
    context::Device,
    error::{DeviceError, MemoryError},
    memory::{DeviceMemory, MemoryUsage},
    resources::SharingMode,
    tracker::{ObjectType, TrackedObject, VulkanObject},
    util::ImageRegion,
};
use std::{
    hash::{Hash, Hasher},
    sync::Arc,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageType {
    Tex1d,
    Tex1dArray(u32),
    Tex2d,
    ///Array of 2d textures, u32 is number of layers
    Tex2dArray(u32),
    Tex3d,
    Cube,
    ///Array of cube maps, u32 is number of cubes
    CubeArray(u32),
}

impl ImageType {
    ///Modifies `extent` based on `self` to be valid. For instance sets height and depth to 1 for a 1d image
    pub fn valid_extent(&self, extent: vk::Extent3D) -> vk::Extent3D {
        match self {
            ImageType::Tex1d | ImageType::Tex1dArray(_) => vk::Extent3D {
                width: extent.width,
                height: 1,
                depth: 1,
            },
            ImageType::Tex2d
            | ImageType::Tex2dArray(_)
            | ImageType::Cube
            | ImageType::CubeArray(_) => vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            ImageType::Tex3d => extent,
        }
    }

    ///Returns the correct number of layers for this image type
    pub fn layer_count(&self) -> u32 {
        match self {
            ImageType::Tex1d | ImageType::Tex2d | ImageType::Tex3d => 1,
            ImageType::Tex1dArray(i) | ImageType::Tex2dArray(i) => *i,
            ImageType::Cube => 6,
            ImageType::CubeArray(i) => 6 * i,
        }
    }

    pub fn is_cube(&self) -> bool {
        matches!(self, ImageType::Cube | ImageType::CubeArray(_))
    }

    pub fn view_type(&self) -> vk::ImageViewType {
        match self {
            ImageType::Tex1d => vk::ImageViewType::TYPE_1D,
            ImageType::Tex1dArray(_) => vk::ImageViewType::TYPE_1D_ARRAY,
            ImageType::Tex2d => vk::ImageViewType::TYPE_2D,
            ImageType::Tex2dArray(_) => vk::ImageViewType::TYPE_2D_ARRAY,
            ImageType::Tex3d => vk::ImageViewType::TYPE_3D,
            ImageType::Cube => vk::ImageViewType::CUBE,
            ImageType::CubeArray(_) => vk::ImageViewType::CUBE_ARRAY,
        }
    }
}

impl From<ImageType> for vk::ImageType {
    fn from(ty: ImageType) -> vk::ImageType {
        match ty {
            ImageType::Tex1d | ImageType::Tex1dArray(_) => vk::ImageType::TYPE_1D,
            ImageType::Tex2d
            | ImageType::Tex2dArray(_)
            | ImageType::Cube
            | ImageType::CubeArray(_) => vk::ImageType::TYPE_2D,
            ImageType::Tex3d => vk::ImageType::TYPE_3D,
        }
    }
}

///Aspect flags that apply to `format`.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        vk::Format::D16_UNORM_S8_UINT
        | vk::Format::D24_UNORM_S8_UINT
        | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

///Describes all static parameters of an image view. The easiest way is to create the view description via a
/// helper function on an image. This fills in all parameters with default value. Those can then be changed base don the needed
/// usage. Usually only the subresource range is changed.
#[derive(Clone, Copy, Debug)]
pub struct ImgViewDesc {
    pub view_type: vk::ImageViewType,
    pub format: vk::Format,
    pub component_mapping: vk::ComponentMapping,
    pub range: vk::ImageSubresourceRange,
}

impl ImgViewDesc {
    ///Overwrites all fields (that apply) of `info` with the data in `self`
    pub fn set_on_create_info<'a>(
        &self,
        info: vk::ImageViewCreateInfo<'a>,
    ) -> vk::ImageViewCreateInfo<'a> {
        info.components(self.component_mapping)
            .view_type(self.view_type)
            .format(self.format)
            .subresource_range(self.range)
    }

    pub fn with_aspect(mut self, aspect_flag: vk::ImageAspectFlags) -> Self {
        self.range.aspect_mask = aspect_flag;
        self
    }

    ///Restricts the view to the mip levels `base..base+count`.
    pub fn with_mips(mut self, base: u32, count: u32) -> Self {
        self.range.base_mip_level = base;
        self.range.level_count = count;
        self
    }

    ///Restricts the view to the layers `base..base+count`.
    pub fn with_layers(mut self, base: u32, count: u32) -> Self {
        self.range.base_array_layer = base;
        self.range.layer_count = count;
        self
    }
}

///[ash::vk::ImageView](ash::vk::ImageView) wrapper that safes its description data, source image and destroys itself when not in use anymore.
pub struct ImageView {
    pub desc: ImgViewDesc,
    pub device: Arc<Device>,
    pub view: vk::ImageView,
    pub src_img: Arc<Image>,
    tracking: TrackedObject,
}

impl VulkanObject for ImageView {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.view.as_raw()
    }
    fn owning_device(&self) -> Option<&Arc<Device>> {
        Some(&self.device)
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_image_view(self.view, None) };
    }
}

///Image description. Collects all meta data related to an [Image](Image).
///
/// This is basically a [ImageCreateInfo](ash::vk::ImageCreateInfo) where creation-time specifics like the `push_next` chain or
/// ImageCreateFlags are removed. Therefore, follow the linked vulkan specification if you want to create an image that is not
/// "standard".
///
/// In most cases the provided helper function should cover 99% of the use cases.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImgDesc {
    pub img_type: ImageType,
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub sharing_mode: SharingMode,
}

impl Default for ImgDesc {
    ///Creates a convervative image desciption for a 2d 8bit 4-channel image without mipmapping or multisampling.
    /// with an extend of 512x512
    fn default() -> Self {
        ImgDesc {
            img_type: ImageType::Tex2d,
            format: vk::Format::R8G8B8A8_UNORM,
            extent: vk::Extent3D {
                width: 512,
                height: 512,
                depth: 1,
            },
            mip_levels: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: vk::ImageTiling::OPTIMAL,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            sharing_mode: SharingMode::Exclusive,
        }
    }
}

impl ImgDesc {
    ///overwrites all infos that apply of `info` with the data of `self`.
    pub fn set_on_create_info<'a>(
        &'a self,
        mut info: vk::ImageCreateInfo<'a>,
    ) -> vk::ImageCreateInfo<'a> {
        info = info
            .image_type(self.img_type.into())
            .format(self.format)
            .extent(self.img_type.valid_extent(self.extent))
            .mip_levels(self.mip_levels)
            .array_layers(self.img_type.layer_count())
            .samples(self.samples)
            .tiling(self.tiling)
            .usage(self.usage);

        if self.img_type.is_cube() {
            info.flags |= vk::ImageCreateFlags::CUBE_COMPATIBLE;
        }

        match &self.sharing_mode {
            SharingMode::Exclusive => info = info.sharing_mode(vk::SharingMode::EXCLUSIVE),
            SharingMode::Concurrent {
                queue_family_indices,
            } => {
                info = info
                    .sharing_mode(vk::SharingMode::CONCURRENT)
                    .queue_family_indices(queue_family_indices)
            }
        }

        info
    }

    ///Appends the additional usage
    pub fn add_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage |= usage;
        self
    }

    ///Number of mip levels of a full mip chain for `extent`.
    pub fn full_mip_count(extent: vk::Extent3D) -> u32 {
        let max = extent.width.max(extent.height).max(extent.depth).max(1);
        32 - max.leading_zeros()
    }

    ///Creates a simple 2d image description meant as color attachment. You might have to add additional usages
    ///The only standard usage is `COLOR_ATTACHMENT`.
    pub fn color_attachment_2d(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            format,
            ..Default::default()
        }
    }

    ///Creates a simple 2d image description meant as depth attachment. You might have to add additional usages
    ///The only standard usage is `DEPTH_STENCIL_ATTACHMENT`.
    pub fn depth_attachment_2d(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            format,
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        }
    }

    ///Creates a simple storage image that has the storage bit set as well as transfere bits.
    pub fn storage_image_2d(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            format,
            usage: vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
            ..Default::default()
        }
    }

    ///Creates a simple texture image that has the sampeld bit set as well as transfere bits.
    pub fn texture_2d(width: u32, height: u32, format: vk::Format) -> Self {
        ImgDesc {
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            format,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            ..Default::default()
        }
    }

    ///Sampled cube map with six `size`x`size` faces.
    pub fn cubemap(size: u32, format: vk::Format) -> Self {
        ImgDesc {
            img_type: ImageType::Cube,
            extent: vk::Extent3D {
                width: size,
                height: size,
                depth: 1,
            },
            format,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            ..Default::default()
        }
    }
}

///Image with its own dedicated memory. Swapchain images carry no memory, and are not destroyed on drop.
pub struct Image {
    ///vulkan image handle
    pub inner: vk::Image,
    ///Memory bound to the image. `None` for swapchain images.
    pub memory: Option<DeviceMemory>,
    pub desc: ImgDesc,
    pub usage: MemoryUsage,
    pub device: Arc<Device>,
    //`None` for images owned by a swapchain.
    tracking: Option<TrackedObject>,
}

///The hash implementation is based on [Image](ash::vk::Image)'s hash.
impl Hash for Image {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.inner.hash(hasher)
    }
}

impl Image {
    ///creates the image based on the description and the provided flags.
    ///
    /// Note that the image is just created with an initial "Undefined" layout.
    pub fn new(
        device: &Arc<Device>,
        description: ImgDesc,
        memory_usage: MemoryUsage,
        create_flags: Option<vk::ImageCreateFlags>,
    ) -> Result<Self, MemoryError> {
        let mut info = vk::ImageCreateInfo::default().initial_layout(vk::ImageLayout::UNDEFINED);
        info = description.set_on_create_info(info);
        if let Some(flags) = create_flags {
            info.flags |= flags;
        }

        let image = unsafe { device.inner.create_image(&info, None)? };
        let requirements = unsafe { device.inner.get_image_memory_requirements(image) };

        let bound = DeviceMemory::allocate(device, requirements, memory_usage).and_then(|memory| {
            unsafe { device.inner.bind_image_memory(image, memory.inner, 0)? };
            Ok(memory)
        });
        let memory = match bound {
            Ok(m) => m,
            Err(e) => {
                #[cfg(feature = "logging")]
                log::error!("Failed to back image {:?}: {}", description.extent, e);
                unsafe { device.inner.destroy_image(image, None) };
                return Err(e);
            }
        };

        Ok(Image {
            memory: Some(memory),
            desc: description,
            inner: image,
            device: device.clone(),
            usage: memory_usage,
            tracking: Some(device.track(ObjectType::Image)),
        })
    }

    ///Wraps an image owned by a swapchain. The image is neither tracked nor destroyed by the wrapper.
    pub fn from_swapchain_image(device: &Arc<Device>, image: vk::Image, desc: ImgDesc) -> Self {
        Image {
            inner: image,
            memory: None,
            desc,
            usage: MemoryUsage::GpuOnly,
            device: device.clone(),
            tracking: None,
        }
    }

    ///True if the image is owned by a swapchain.
    pub fn is_swapchain_image(&self) -> bool {
        self.tracking.is_none()
    }

    pub fn extent_3d(&self) -> vk::Extent3D {
        self.desc.extent
    }

    ///In case of 3d image formats the depth is ignored.
    pub fn extent_2d(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.desc.extent.width,
            height: self.desc.extent.height,
        }
    }

    ///Returns the *whole* image region
    pub fn image_region(&self) -> ImageRegion {
        ImageRegion {
            offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            extent: self.extent_3d(),
        }
    }

    ///Returns a sub resource range that encloses the whole image.
    pub fn subresource_all(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: aspect_for_format(self.desc.format),
            base_array_layer: 0,
            base_mip_level: 0,
            layer_count: self.desc.img_type.layer_count(),
            level_count: self.desc.mip_levels,
        }
    }

    ///Creates a subresource layer for the first mip level.
    pub fn subresource_layers_all(&self) -> vk::ImageSubresourceLayers {
        let vk::ImageSubresourceRange {
            aspect_mask,
            base_array_layer,
            layer_count,
            base_mip_level,
            ..
        } = self.subresource_all();
        vk::ImageSubresourceLayers {
            aspect_mask,
            base_array_layer,
            layer_count,
            mip_level: base_mip_level,
        }
    }

    ///Creates an [ImgViewDesc](ImgViewDesc) that encloses the whole image.
    pub fn view_all(&self) -> ImgViewDesc {
        ImgViewDesc {
            component_mapping: vk::ComponentMapping {
                r: vk::ComponentSwizzle::R,
                g: vk::ComponentSwizzle::G,
                b: vk::ComponentSwizzle::B,
                a: vk::ComponentSwizzle::A,
            },
            format: self.desc.format,
            range: self.subresource_all(),
            view_type: self.desc.img_type.view_type(),
        }
    }
}

impl VulkanObject for Image {
    fn object_type(&self) -> ObjectType {
        ObjectType::Image
    }
    fn raw_handle(&self) -> u64 {
        self.inner.as_raw()
    }
    fn owning_device(&self) -> Option<&Arc<Device>> {
        Some(&self.device)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        if !self.is_swapchain_image() {
            unsafe { self.device.inner.destroy_image(self.inner, None) }
        }
    }
}

///If implemented, creates a self managing image view that keeps its source image and device alive long enough
/// to destroy the inner view when dropped.
pub trait SafeImageView {
    fn view(&self, desc: ImgViewDesc) -> Result<ImageView, DeviceError>;
}

impl SafeImageView for Arc<Image> {
    ///Creates an image view for this image based on the based `desc`.
    fn view(&self, desc: ImgViewDesc) -> Result<ImageView, DeviceError> {
        let info = desc.set_on_create_info(vk::ImageViewCreateInfo::default().image(self.inner));
        let view = unsafe { self.device.inner.create_image_view(&info, None)? };

        Ok(ImageView {
            desc,
            device: self.device.clone(),
            view,
            src_img: self.clone(),
            tracking: self.device.track(ObjectType::ImageView),
        })
    }
}

pub struct Sampler {
    pub inner: vk::Sampler,
    pub device: Arc<Device>,
    tracking: TrackedObject,
}

impl Sampler {
    pub fn new(
        device: &Arc<Device>,
        create_info: &vk::SamplerCreateInfo<'_>,
    ) -> Result<Self, DeviceError> {
        let sampler = unsafe { device.inner.create_sampler(create_info, None)? };

        Ok(Sampler {
            device: device.clone(),
            inner: sampler,
            tracking: device.track(ObjectType::Sampler),
        })
    }

    ///Linear filtering on all axis, `address_mode` on u, v and w.
    pub fn linear(
        device: &Arc<Device>,
        address_mode: vk::SamplerAddressMode,
    ) -> Result<Self, DeviceError> {
        let info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(address_mode)
            .address_mode_v(address_mode)
            .address_mode_w(address_mode)
            .max_lod(vk::LOD_CLAMP_NONE);
        Self::new(device, &info)
    }
}

impl VulkanObject for Sampler {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.inner.as_raw()
    }
    fn owning_device(&self) -> Option<&Arc<Device>> {
        Some(&self.device)
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_sampler(self.inner, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Image: Send, Sync);
        assert_impl_all!(ImageView: Send, Sync);
        assert_impl_all!(Sampler: Send, Sync);
    }

    #[test]
    fn cube_images() {
        let desc = ImgDesc::cubemap(64, vk::Format::R8G8B8A8_UNORM);
        let info = desc.set_on_create_info(vk::ImageCreateInfo::default());
        assert_eq!(info.array_layers, 6);
        assert_eq!(info.image_type, vk::ImageType::TYPE_2D);
        assert!(info.flags.contains(vk::ImageCreateFlags::CUBE_COMPATIBLE));

        assert_eq!(ImageType::CubeArray(2).layer_count(), 12);
        assert_eq!(
            vk::ImageType::from(ImageType::CubeArray(2)),
            vk::ImageType::TYPE_2D
        );
        assert_eq!(
            ImageType::CubeArray(2).view_type(),
            vk::ImageViewType::CUBE_ARRAY
        );
    }

    #[test]
    fn extents_are_sanitized() {
        let extent = vk::Extent3D {
            width: 16,
            height: 8,
            depth: 4,
        };
        assert_eq!(ImageType::Tex1d.valid_extent(extent).height, 1);
        assert_eq!(ImageType::Tex2dArray(3).valid_extent(extent).depth, 1);
        assert_eq!(ImageType::Tex3d.valid_extent(extent), extent);
    }

    #[test]
    fn mip_count() {
        let extent = |w, h| vk::Extent3D {
            width: w,
            height: h,
            depth: 1,
        };
        assert_eq!(ImgDesc::full_mip_count(extent(1, 1)), 1);
        assert_eq!(ImgDesc::full_mip_count(extent(512, 256)), 10);
        assert_eq!(ImgDesc::full_mip_count(extent(300, 20)), 9);
    }

    #[test]
    fn depth_aspects() {
        assert_eq!(
            aspect_for_format(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspect_for_format(vk::Format::B8G8R8A8_SRGB),
            vk::ImageAspectFlags::COLOR
        );
    }
}
