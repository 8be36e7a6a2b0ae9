use std::sync::Arc;

use ahash::AHashMap;
use ash::vk::{self, Handle};

use crate::{
    context::Device,
    error::DescriptorError,
    tracker::{ObjectType, TrackedObject, VulkanObject},
};

///Wrapped descriptor set layout. Keeps a copy of the bindings it was created from. Handles on-drop destruction of the resource.
pub struct DescriptorSetLayout {
    pub device: Arc<Device>,
    pub inner: vk::DescriptorSetLayout,
    pub bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
    tracking: TrackedObject,
}

impl DescriptorSetLayout {
    ///Generates a descriptor set layout from a set of bindings. Immutable samplers are not supported through this path.
    pub fn new(
        device: &Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding<'static>],
    ) -> Result<Self, DescriptorError> {
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = unsafe { device.inner.create_descriptor_set_layout(&info, None)? };

        Ok(DescriptorSetLayout {
            device: device.clone(),
            inner: layout,
            bindings: bindings.to_vec(),
            tracking: device.track(ObjectType::DescriptorSetLayout),
        })
    }

    ///Pool sizes needed to allocate `count` sets of this layout.
    pub fn pool_sizes(&self, count: u32) -> Vec<vk::DescriptorPoolSize> {
        pool_sizes_for(&self.bindings, count)
    }
}

//Counts saturate at u32::MAX.
fn pool_sizes_for(
    bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    count: u32,
) -> Vec<vk::DescriptorPoolSize> {
    fold_sizes(bindings.iter().map(|b| vk::DescriptorPoolSize {
        ty: b.descriptor_type,
        descriptor_count: b.descriptor_count.saturating_mul(count),
    }))
    .into_iter()
    .map(|(ty, descriptor_count)| vk::DescriptorPoolSize {
        ty,
        descriptor_count,
    })
    .collect()
}

impl VulkanObject for DescriptorSetLayout {
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

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .inner
                .destroy_descriptor_set_layout(self.inner, None)
        }
    }
}

//Sums up descriptor counts per type.
fn fold_sizes(
    sizes: impl IntoIterator<Item = vk::DescriptorPoolSize>,
) -> AHashMap<vk::DescriptorType, u32> {
    sizes.into_iter().fold(AHashMap::default(), |mut map, size| {
        let total = map.entry(size.ty).or_insert(0);
        *total = total.saturating_add(size.descriptor_count);
        map
    })
}

pub struct DescriptorPool {
    pub device: Arc<Device>,
    ///actual inner pool
    pub inner: vk::DescriptorPool,
    ///Allocatable sizes
    pub sizes: AHashMap<vk::DescriptorType, u32>,
    pub max_sets: u32,
    ///True if descriptor sets can be freed for this pool
    pub can_free: bool,
    tracking: TrackedObject,
}

impl DescriptorPool {
    ///Simple [vk::DescriptorPool] creation wrapper. Sizes of the same descriptor type are summed up.
    pub fn new(
        device: &Arc<Device>,
        flags: vk::DescriptorPoolCreateFlags,
        sizes: &[vk::DescriptorPoolSize],
        set_count: u32,
    ) -> Result<Self, DescriptorError> {
        let folded = fold_sizes(sizes.iter().copied());
        let pool_sizes = folded
            .iter()
            .map(|(ty, count)| vk::DescriptorPoolSize {
                ty: *ty,
                descriptor_count: *count,
            })
            .collect::<Vec<_>>();

        let create_info = vk::DescriptorPoolCreateInfo::default()
            .flags(flags)
            .max_sets(set_count)
            .pool_sizes(&pool_sizes);

        let pool = unsafe { device.inner.create_descriptor_pool(&create_info, None)? };

        Ok(DescriptorPool {
            can_free: flags.contains(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET),
            device: device.clone(),
            inner: pool,
            sizes: folded,
            max_sets: set_count,
            tracking: device.track(ObjectType::DescriptorPool),
        })
    }

    ///Creates a pool that can allocate exactly `count` sets of `layout`.
    pub fn new_for_layout(
        device: &Arc<Device>,
        flags: vk::DescriptorPoolCreateFlags,
        layout: &DescriptorSetLayout,
        count: u32,
    ) -> Result<Self, DescriptorError> {
        Self::new(device, flags, &layout.pool_sizes(count), count)
    }

    ///Resets the pool. All sets allocated from it become invalid. Fails while a [DescriptorSet] still borrows it through an [Arc].
    pub fn reset(self: &mut Arc<Self>) -> Result<(), DescriptorError> {
        let Some(pool) = Arc::get_mut(self) else {
            return Err(DescriptorError::UnFreeable);
        };
        unsafe {
            pool.device
                .inner
                .reset_descriptor_pool(pool.inner, vk::DescriptorPoolResetFlags::empty())?
        };
        Ok(())
    }
}

impl VulkanObject for DescriptorPool {
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

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_descriptor_pool(self.inner, None) }
    }
}

///Trait that exposes allocation and freeing capabilities of a descriptor pool implementation. The simplest implementation is
/// an [Arc]'ed [DescriptorPool]. Other implementations might implement self-growth of the pool or other techniques.
pub trait DescriptorAllocator {
    ///Tries to allocate a descriptor set of `layout`. Might fail, for instance if no descriptors of a certain type are left.
    fn allocate(self, layout: &DescriptorSetLayout) -> Result<DescriptorSet<Self>, DescriptorError>
    where
        Self: Sized;
    ///Tries to free `set`. Note that `set` becomes invalid by this operation
    fn free(&self, set: &vk::DescriptorSet) -> Result<(), DescriptorError>;
    ///provides the device this pool was created on
    fn device(&self) -> &Arc<Device>;
}

impl DescriptorAllocator for Arc<DescriptorPool> {
    fn allocate(self, layout: &DescriptorSetLayout) -> Result<DescriptorSet<Self>, DescriptorError> {
        let create_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.inner)
            .set_layouts(core::slice::from_ref(&layout.inner));

        let mut sets = unsafe { self.device.inner.allocate_descriptor_sets(&create_info)? };

        if sets.is_empty() {
            return Err(DescriptorError::Allocation {
                requested: 1,
                count: 0,
            });
        }

        #[cfg(feature = "logging")]
        if sets.len() > 1 {
            log::warn!(
                "Allocated too many descriptor sets, expected 1 got {}",
                sets.len()
            );
        }

        let set = sets.remove(0);
        let tracking = self.device.track(ObjectType::DescriptorSet);

        Ok(DescriptorSet {
            inner: set,
            is_freed: false,
            parent_pool: self,
            tracking,
        })
    }

    fn free(&self, set: &vk::DescriptorSet) -> Result<(), DescriptorError> {
        if !self.can_free {
            return Err(DescriptorError::UnFreeable);
        }
        unsafe {
            self.device
                .inner
                .free_descriptor_sets(self.inner, core::slice::from_ref(set))?
        };
        Ok(())
    }

    fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

///Simple wrapper around [vk::DescriptorSet]. If the parent pool can free sets, the set is returned to it on drop. Otherwise the set lives until the pool is reset or destroyed.
pub struct DescriptorSet<P: DescriptorAllocator> {
    ///The pool this set was allocated from.
    pub parent_pool: P,
    pub is_freed: bool,
    pub inner: vk::DescriptorSet,
    tracking: TrackedObject,
}

impl<P: DescriptorAllocator> DescriptorSet<P> {
    ///Executes the write operation on the descriptor set. Does no checking against the descriptor set's layout. If validation is
    ///activated this might fail.
    ///
    /// The `dst_set` field of `write` is set to this descriptor set's handle before execution.
    pub fn write(&mut self, write: vk::WriteDescriptorSet<'_>) {
        let write = write.dst_set(self.inner);
        unsafe {
            self.parent_pool
                .device()
                .inner
                .update_descriptor_sets(core::slice::from_ref(&write), &[])
        }
    }

    ///Writes a whole buffer to `binding`.
    pub fn write_buffer(
        &mut self,
        binding: u32,
        ty: vk::DescriptorType,
        buffer: &crate::resources::Buffer,
    ) {
        let info = vk::DescriptorBufferInfo::default()
            .buffer(buffer.inner)
            .offset(0)
            .range(vk::WHOLE_SIZE);
        self.write(
            vk::WriteDescriptorSet::default()
                .dst_binding(binding)
                .descriptor_type(ty)
                .buffer_info(core::slice::from_ref(&info)),
        );
    }

    ///Writes an image view (and optionally sampler) to `binding`.
    pub fn write_image(
        &mut self,
        binding: u32,
        ty: vk::DescriptorType,
        view: &crate::resources::ImageView,
        layout: vk::ImageLayout,
        sampler: Option<&crate::resources::Sampler>,
    ) {
        let mut info = vk::DescriptorImageInfo::default()
            .image_view(view.view)
            .image_layout(layout);
        if let Some(sampler) = sampler {
            info = info.sampler(sampler.inner);
        }
        self.write(
            vk::WriteDescriptorSet::default()
                .dst_binding(binding)
                .descriptor_type(ty)
                .image_info(core::slice::from_ref(&info)),
        );
    }
}

impl<P: DescriptorAllocator> VulkanObject for DescriptorSet<P> {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.inner.as_raw()
    }
    fn owning_device(&self) -> Option<&Arc<Device>> {
        Some(self.parent_pool.device())
    }
}

impl<P: DescriptorAllocator> Drop for DescriptorSet<P> {
    fn drop(&mut self) {
        if self.is_freed {
            return;
        }
        match self.parent_pool.free(&self.inner) {
            Ok(()) => self.is_freed = true,
            //sets of non freeing pools are reclaimed with the pool
            Err(DescriptorError::UnFreeable) => {}
            Err(_e) => {
                #[cfg(feature = "logging")]
                log::error!("Failed to free descriptor set: {}", _e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(DescriptorSetLayout: Send, Sync);
        assert_impl_all!(DescriptorPool: Send, Sync);
        assert_impl_all!(DescriptorSet<Arc<DescriptorPool>>: Send, Sync);
    }

    #[test]
    fn sizes_are_summed_per_type() {
        let sizes = fold_sizes([
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 2,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: 1,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 3,
            },
        ]);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[&vk::DescriptorType::UNIFORM_BUFFER], 5);
        assert_eq!(sizes[&vk::DescriptorType::STORAGE_IMAGE], 1);
    }

    #[test]
    fn pool_sizes_scale_and_saturate() {
        let bindings = [
            vk::DescriptorSetLayoutBinding::default()
                .binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(2),
            vk::DescriptorSetLayoutBinding::default()
                .binding(1)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(u32::MAX / 2),
        ];
        let sizes = pool_sizes_for(&bindings[..1], 3);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].descriptor_count, 6);

        let sizes = pool_sizes_for(&bindings, 4);
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].descriptor_count, u32::MAX);
    }
}
