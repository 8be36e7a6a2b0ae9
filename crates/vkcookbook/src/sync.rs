//! # Synchronisation
//!
//! Thin wrappers around Vulkan's native synchronisation primitives:
//! - [Semaphore]: binary semaphore, usually used to order queue submissions, for instance between image acquisition and presentation.
//! - [TimelineSemaphore]: a semaphore with a monotonically increasing 64bit value that can be waited on and signaled from the host as well.
//! - [Fence]: signals the host that a queue submission has finished.
//! - [Event]: fine grained synchronisation of commands on a single queue, or between host and a queue.
//!
//! Memory barriers are not wrapped. Have a look at the `BarrierBuilder` of the commands crate.
use crate::{
    context::Device,
    error::SyncError,
    tracker::{ObjectType, TrackedObject, VulkanObject},
};
use ash::vk::{self, Handle};
use std::{fmt::Debug, sync::Arc};

//Maps vulkan's TIMEOUT result into its own error.
fn wait_result(result: Result<(), vk::Result>, timeout: u64) -> Result<(), SyncError> {
    match result {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(SyncError::Timeout(timeout)),
        Err(e) => Err(SyncError::VkError(e)),
    }
}

///Binary semaphore.
pub struct Semaphore {
    pub inner: vk::Semaphore,
    pub device: Arc<Device>,
    tracking: TrackedObject,
}

impl Semaphore {
    pub fn new(device: &Arc<Device>) -> Result<Self, SyncError> {
        let semaphore = unsafe {
            device
                .inner
                .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
        };
        Ok(Semaphore {
            inner: semaphore,
            device: device.clone(),
            tracking: device.track(ObjectType::Semaphore),
        })
    }
}

impl VulkanObject for Semaphore {
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

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_semaphore(self.inner, None) }
    }
}

impl Debug for Semaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

///Single [TimelineSemaphore](https://www.khronos.org/blog/vulkan-timeline-semaphores). Needs a Vulkan 1.2 device
/// created with the `timelineSemaphore` feature, see [DeviceBuilder::with_timeline_semaphores](crate::context::DeviceBuilder::with_timeline_semaphores).
pub struct TimelineSemaphore {
    pub inner: vk::Semaphore,
    pub device: Arc<Device>,
    tracking: TrackedObject,
}

impl TimelineSemaphore {
    ///Creates the semaphore with `initial_value`. Fails with [SyncError::TimelineUnsupported] if `device` has no
    /// timeline semaphores enabled.
    pub fn new(device: &Arc<Device>, initial_value: u64) -> Result<Self, SyncError> {
        if !device.timeline_semaphores {
            return Err(SyncError::TimelineUnsupported);
        }
        let mut timeline_ci = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(initial_value);
        let ci = vk::SemaphoreCreateInfo::default().push_next(&mut timeline_ci);

        let semaphore = unsafe { device.inner.create_semaphore(&ci, None)? };

        Ok(TimelineSemaphore {
            inner: semaphore,
            device: device.clone(),
            tracking: device.track(ObjectType::Semaphore),
        })
    }

    ///Returns the current value of the semaphore. Note that this can change at any time if the semaphore is in use on
    /// the device.
    pub fn get_value(&self) -> Result<u64, SyncError> {
        Ok(unsafe { self.device.inner.get_semaphore_counter_value(self.inner)? })
    }

    ///Sets the semaphore value from the host. Note that it [has to be](https://registry.khronos.org/vulkan/specs/1.2-extensions/html/chap7.html#VUID-VkSemaphoreSignalInfo-value-03258) greater then the current value.
    pub fn set_value(&self, value: u64) -> Result<(), SyncError> {
        let signal_info = vk::SemaphoreSignalInfo::default()
            .semaphore(self.inner)
            .value(value);
        unsafe { self.device.inner.signal_semaphore(&signal_info)? };
        Ok(())
    }

    ///Blocks until `self` reaches `value`, or the `timeout` (in nanoseconds) is reached.
    pub fn wait(&self, value: u64, timeout: u64) -> Result<(), SyncError> {
        Self::wait_for(&[(self, value)], timeout)
    }

    ///Waits for multiple semaphores of the form `(Semaphore, target_value)`. All semaphores must be created on the same device.
    pub fn wait_for(waits: &[(&TimelineSemaphore, u64)], timeout: u64) -> Result<(), SyncError> {
        let Some((first, _)) = waits.first() else {
            return Ok(());
        };

        let (sems, values): (Vec<vk::Semaphore>, Vec<u64>) =
            waits.iter().map(|(sem, val)| (sem.inner, *val)).unzip();
        let wait = vk::SemaphoreWaitInfo::default()
            .semaphores(&sems)
            .values(&values);

        wait_result(
            unsafe { first.device.inner.wait_semaphores(&wait, timeout) },
            timeout,
        )
    }
}

impl VulkanObject for TimelineSemaphore {
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

impl Drop for TimelineSemaphore {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_semaphore(self.inner, None) }
    }
}

impl Debug for TimelineSemaphore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

///Host/device synchronisation primitive. Signaled by a queue submission.
pub struct Fence {
    pub inner: vk::Fence,
    pub device: Arc<Device>,
    tracking: TrackedObject,
}

impl Fence {
    ///Creates the fence. If `signaled` is true, the fence starts in the signaled state. This is handy for per-frame
    /// fences that are waited on before their first use.
    pub fn new(device: &Arc<Device>, signaled: bool) -> Result<Self, SyncError> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let fence = unsafe {
            device
                .inner
                .create_fence(&vk::FenceCreateInfo::default().flags(flags), None)?
        };
        Ok(Fence {
            inner: fence,
            device: device.clone(),
            tracking: device.track(ObjectType::Fence),
        })
    }

    ///Blocks until the fence is signaled or `timeout` nanoseconds passed.
    pub fn wait(&self, timeout: u64) -> Result<(), SyncError> {
        Self::wait_all(&[self], timeout)
    }

    ///Waits until all `fences` are signaled. All fences must be created on the same device.
    pub fn wait_all(fences: &[&Fence], timeout: u64) -> Result<(), SyncError> {
        let Some(first) = fences.first() else {
            return Ok(());
        };
        let raw = fences.iter().map(|f| f.inner).collect::<Vec<_>>();
        wait_result(
            unsafe { first.device.inner.wait_for_fences(&raw, true, timeout) },
            timeout,
        )
    }

    pub fn reset(&self) -> Result<(), SyncError> {
        unsafe {
            self.device
                .inner
                .reset_fences(core::slice::from_ref(&self.inner))?
        };
        Ok(())
    }

    pub fn is_signaled(&self) -> Result<bool, SyncError> {
        Ok(unsafe { self.device.inner.get_fence_status(self.inner)? })
    }
}

impl VulkanObject for Fence {
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

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_fence(self.inner, None) }
    }
}

impl Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

pub struct Event {
    pub device: Arc<Device>,
    pub event: vk::Event,
    tracking: TrackedObject,
}

impl Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.event.fmt(f)
    }
}

impl Event {
    pub fn new(device: &Arc<Device>) -> Result<Self, SyncError> {
        let event = unsafe {
            device
                .inner
                .create_event(&vk::EventCreateInfo::default(), None)?
        };
        Ok(Event {
            event,
            device: device.clone(),
            tracking: device.track(ObjectType::Event),
        })
    }

    ///Sets the event into the signaled status.
    pub fn set(&self) -> Result<(), SyncError> {
        unsafe { self.device.inner.set_event(self.event)? };
        Ok(())
    }

    pub fn reset(&self) -> Result<(), SyncError> {
        unsafe { self.device.inner.reset_event(self.event)? };
        Ok(())
    }

    ///True if the event is signaled.
    pub fn status(&self) -> Result<bool, SyncError> {
        Ok(unsafe { self.device.inner.get_event_status(self.event)? })
    }
}

impl VulkanObject for Event {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.event.as_raw()
    }
    fn owning_device(&self) -> Option<&Arc<Device>> {
        Some(&self.device)
    }
}

impl Drop for Event {
    fn drop(&mut self) {
        unsafe {
            self.device.inner.destroy_event(self.event, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Semaphore: Send, Sync);
        assert_impl_all!(TimelineSemaphore: Send, Sync);
        assert_impl_all!(Fence: Send, Sync);
        assert_impl_all!(Event: Send, Sync);
    }

    #[test]
    fn timeout_is_mapped() {
        assert!(matches!(
            wait_result(Err(vk::Result::TIMEOUT), 5),
            Err(SyncError::Timeout(5))
        ));
        assert!(matches!(
            wait_result(Err(vk::Result::ERROR_DEVICE_LOST), 5),
            Err(SyncError::VkError(vk::Result::ERROR_DEVICE_LOST))
        ));
        assert!(wait_result(Ok(()), 5).is_ok());
    }
}
