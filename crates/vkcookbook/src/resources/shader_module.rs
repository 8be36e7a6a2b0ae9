use crate::{
    context::Device,
    error::ShaderError,
    tracker::{ObjectType, TrackedObject, VulkanObject},
};
use ash::vk::{self, Handle};
use std::{
    ffi::{CStr, CString},
    path::Path,
    sync::Arc,
};

///Single shader module
pub struct ShaderModule {
    pub device: Arc<Device>,
    pub module: vk::ShaderModule,
    tracking: TrackedObject,
}

impl ShaderModule {
    ///Reads file at `path`, checks that it is a spirv file and, if so, tries to create the shader module from it.
    pub fn new_from_file(device: &Arc<Device>, file: impl AsRef<Path>) -> Result<Self, ShaderError> {
        let mut file = std::fs::File::open(file)?;
        let code = ash::util::read_spv(&mut file)?;
        Self::new(device, &code)
    }

    ///Creates the module from SPIR-V bytes. Checks the magic number and realigns the code if needed.
    pub fn new_from_bytes(device: &Arc<Device>, bytes: &[u8]) -> Result<Self, ShaderError> {
        let code = ash::util::read_spv(&mut std::io::Cursor::new(bytes))?;
        Self::new(device, &code)
    }

    pub fn new(device: &Arc<Device>, code: &[u32]) -> Result<Self, ShaderError> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { device.inner.create_shader_module(&create_info, None)? };

        Ok(ShaderModule {
            device: device.clone(),
            module,
            tracking: device.track(ObjectType::ShaderModule),
        })
    }

    ///Creates a shade stage from this module. Basically a speciallized version of this shader module that knows
    ///when (shader stage) and with what [specializations](https://www.khronos.org/registry/vulkan/specs/1.3-extensions/man/html/VkSpecializationInfo.html).
    pub fn as_stage<'a>(
        &self,
        stage: vk::ShaderStageFlags,
        entry_point: &'a CStr,
        specialization_info: Option<&'a vk::SpecializationInfo<'a>>,
    ) -> vk::PipelineShaderStageCreateInfo<'a> {
        let mut info = vk::PipelineShaderStageCreateInfo::default()
            .module(self.module)
            .stage(stage)
            .name(entry_point);

        if let Some(si) = specialization_info {
            info = info.specialization_info(si);
        }
        info
    }
}

impl VulkanObject for ShaderModule {
    fn object_type(&self) -> ObjectType {
        self.tracking.object_type()
    }
    fn raw_handle(&self) -> u64 {
        self.module.as_raw()
    }
    fn owning_device(&self) -> Option<&Arc<Device>> {
        Some(&self.device)
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_shader_module(self.module, None) }
    }
}

///A shader module bound to a stage and an entry point. Keeps the module alive until the pipeline using it was created.
#[derive(Clone)]
pub struct ShaderStage {
    pub module: Arc<ShaderModule>,
    pub stage: vk::ShaderStageFlags,
    pub entry_point: CString,
}

impl ShaderStage {
    pub fn new(module: &Arc<ShaderModule>, stage: vk::ShaderStageFlags, entry_point: &CStr) -> Self {
        ShaderStage {
            module: module.clone(),
            stage,
            entry_point: entry_point.to_owned(),
        }
    }

    ///Stage using the conventional `main` entry point.
    pub fn main(module: &Arc<ShaderModule>, stage: vk::ShaderStageFlags) -> Self {
        Self::new(module, stage, c"main")
    }

    pub fn as_create_info<'a>(
        &'a self,
        specialization_info: Option<&'a vk::SpecializationInfo<'a>>,
    ) -> vk::PipelineShaderStageCreateInfo<'a> {
        self.module
            .as_stage(self.stage, &self.entry_point, specialization_info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(ShaderModule: Send, Sync);
        assert_impl_all!(ShaderStage: Send, Sync);
    }
}
