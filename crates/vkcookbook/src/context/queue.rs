use ash::vk;

///Abstract queue that collects a [ash::vk::Queue](ash::vk::Queue) and its family.
#[derive(Clone, Debug)]
pub struct Queue {
    pub inner: vk::Queue,
    pub family_index: u32,
    ///Index of the queue within its family.
    pub queue_index: u32,
    pub properties: vk::QueueFamilyProperties,
}

impl Queue {
    pub fn supports(&self, flags: vk::QueueFlags) -> bool {
        self.properties.queue_flags.contains(flags)
    }
}

#[derive(Clone, Debug)]
pub struct QueueBuilder {
    ///The family's index.
    pub family_index: u32,
    ///its properties
    pub properties: vk::QueueFamilyProperties,
    ///The length of this vector determins how many instances of this queue are created. The number determins the
    /// priority of each queue on the hardware. See the [documentation](https://www.khronos.org/registry/vulkan/specs/1.3-extensions/man/html/VkDeviceQueueCreateInfo.html) for more information about this topic.
    ///
    /// An empty vector creates no queue of this family.
    pub priorities: Vec<f32>,
}

impl QueueBuilder {
    ///Sets the queue ammount that is being created (length of the vector) and each queues priority. Have a look at the
    /// `priorities` field documentation.
    ///
    /// Note that only the first `n` priorities are resprected if the length of the vector exceeds `n = self.properties.queue_count`.
    /// Priorities are clamped to `0.0..=1.0`.
    pub fn with_queues(&mut self, mut queue_priorities: Vec<f32>) {
        queue_priorities.truncate(self.properties.queue_count as usize);
        for p in queue_priorities.iter_mut() {
            *p = p.clamp(0.0, 1.0);
        }
        self.priorities = queue_priorities;
    }

    pub fn as_create_info(&self) -> vk::DeviceQueueCreateInfo<'_> {
        vk::DeviceQueueCreateInfo::default()
            .queue_family_index(self.family_index)
            .queue_priorities(&self.priorities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_are_clamped_to_family_size() {
        let mut builder = QueueBuilder {
            family_index: 0,
            properties: vk::QueueFamilyProperties {
                queue_count: 2,
                ..Default::default()
            },
            priorities: vec![1.0],
        };
        builder.with_queues(vec![2.0, -1.0, 0.5]);
        assert_eq!(builder.priorities, vec![1.0, 0.0]);

        let info = builder.as_create_info();
        assert_eq!(info.queue_count, 2);
        assert_eq!(info.queue_family_index, 0);
    }
}
