// Shader module loading
//
// Vulkan consumes SPIR-V. Modules are read from disk at startup (paths come
// from config) and only need to live until the pipeline has been created.

use anyhow::{Context, Result};
use ash::vk;
use std::io::Cursor;
use std::path::Path;

use super::VulkanDevice;

/// A shader module destroyed when it goes out of scope.
pub struct ShaderModule<'a> {
    device: &'a VulkanDevice,
    pub module: vk::ShaderModule,
}

impl<'a> ShaderModule<'a> {
    /// Create a shader module from SPIR-V bytes
    pub fn from_bytes(device: &'a VulkanDevice, code: &[u8]) -> Result<Self> {
        // read_spv checks the length and copies into 4-byte aligned words
        let words = ash::util::read_spv(&mut Cursor::new(code)).context("Invalid SPIR-V")?;
        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);

        let module = unsafe { device.device.create_shader_module(&create_info, None) }
            .context("Failed to create shader module")?;

        Ok(Self { device, module })
    }

    /// Load a compiled .spv file
    pub fn load(device: &'a VulkanDevice, path: &Path) -> Result<Self> {
        let code = std::fs::read(path)
            .with_context(|| format!("Failed to read shader {}", path.display()))?;
        log::debug!("Loaded shader {} ({} bytes)", path.display(), code.len());
        Self::from_bytes(device, &code).with_context(|| format!("Shader {}", path.display()))
    }
}

impl Drop for ShaderModule<'_> {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_shader_module(self.module, None) };
    }
}
