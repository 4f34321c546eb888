// Shader module loading
//
// SPIR-V is compiled by build.rs (glslc) and read from disk at startup.

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use ash::vk;

use super::VulkanDevice;

/// Load a SPIR-V file and create a shader module
pub fn load_shader_module(device: &VulkanDevice, path: &Path) -> Result<vk::ShaderModule> {
    let mut file = File::open(path)
        .with_context(|| format!("Failed to open shader {}", path.display()))?;
    // read_spv handles alignment and endianness
    let code = ash::util::read_spv(&mut file)
        .with_context(|| format!("{} is not valid SPIR-V", path.display()))?;

    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

    unsafe { device.device.create_shader_module(&create_info, None) }
        .with_context(|| format!("Failed to create shader module from {}", path.display()))
}
