mod image;
pub use image::{
    Image, ImageType, ImageView, ImgDesc, ImgViewDesc, SafeImageView, Sampler, aspect_for_format,
};

mod buffer;
pub use buffer::{BufDesc, Buffer, BufferView};

mod descriptor;
pub use descriptor::{DescriptorAllocator, DescriptorPool, DescriptorSet, DescriptorSetLayout};

pub mod pipeline;
pub use pipeline::{
    PipelineCache, PipelineLayout, compute::ComputePipeline, graphics::GraphicsPipeline,
};

mod render_pass;
pub use render_pass::{Framebuffer, RenderPass};

mod command_buffer;
pub use command_buffer::{CommandBuffer, CommandBufferAllocator, CommandPool};

mod shader_module;
pub use shader_module::{ShaderModule, ShaderStage};

mod query_pool;
pub use query_pool::QueryPool;

use smallvec::SmallVec;

///Sharing mode of a buffer or image between queue families.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SharingMode {
    Exclusive,
    Concurrent {
        ///The queue family indices of families that can access the resource concurrently.
        queue_family_indices: SmallVec<[u32; 4]>,
    },
}

impl SharingMode {
    ///Concurrent sharing between `families`. Falls back to exclusive if less than two distinct families are given.
    pub fn concurrent(families: &[u32]) -> Self {
        let mut queue_family_indices: SmallVec<[u32; 4]> = SmallVec::new();
        for f in families {
            if !queue_family_indices.contains(f) {
                queue_family_indices.push(*f);
            }
        }
        if queue_family_indices.len() < 2 {
            SharingMode::Exclusive
        } else {
            SharingMode::Concurrent {
                queue_family_indices,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concurrent_needs_two_families() {
        assert_eq!(SharingMode::concurrent(&[0, 0]), SharingMode::Exclusive);
        assert_eq!(
            SharingMode::concurrent(&[0, 2, 0]),
            SharingMode::Concurrent {
                queue_family_indices: SmallVec::from_slice(&[0, 2])
            }
        );
    }
}
