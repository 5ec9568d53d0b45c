use std::path::Path;

use vulkanalia::prelude::v1_0::*;
use anyhow::{anyhow, Context, Result};

/// Loads a compiled SPIR-V binary from disk and wraps it in a
/// shader module. Failure (missing file, malformed blob,
/// creation error) is the caller's to judge: pipelines are
/// built during setup, never from the frame loop.
pub fn load_shader_module(
    device: &Device,
    path: impl AsRef<Path>,
) -> Result<vk::ShaderModule> {
    let path = path.as_ref();
    let bytecode = std::fs::read(path)
        .with_context(|| format!("Failed to read shader file {}", path.display()))?;

    create_shader_module(device, &bytecode)
}

pub fn create_shader_module(
    device: &Device,
    bytecode: &[u8],
) -> Result<vk::ShaderModule> {
    // Shader modules are a thin wrapper around the bytecode.
    // The file arrives as bytes, but the info struct wants
    // 32-bit words, so the blob is re-packed (and implicitly
    // validated) on the way in.
    let code = align_bytecode(bytecode)?;

    let info = vk::ShaderModuleCreateInfo::builder()
        .code_size(bytecode.len())
        .code(&code);

    Ok(unsafe { device.create_shader_module(&info, None)? })
}

/// Re-packs a SPIR-V blob into the 32-bit words Vulkan expects.
/// SPIR-V is defined as a word stream, so a byte length that is
/// not a multiple of four cannot be a valid shader.
pub fn align_bytecode(bytecode: &[u8]) -> Result<Vec<u32>> {
    if bytecode.len() % 4 != 0 {
        return Err(anyhow!("Shader bytecode size is not a multiple of four bytes."));
    }

    Ok(bytecode
        .chunks_exact(4)
        .map(|b| u32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytecode_packs_into_words() {
        let words = [0x0723_0203u32, 0x0001_0000];
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_ne_bytes()).collect();

        assert_eq!(align_bytecode(&bytes).unwrap(), words);
    }

    #[test]
    fn truncated_bytecode_is_rejected() {
        assert!(align_bytecode(&[0x03, 0x02, 0x23]).is_err());
        assert!(align_bytecode(&[0u8; 7]).is_err());
    }

    #[test]
    fn empty_bytecode_packs_to_nothing() {
        assert!(align_bytecode(&[]).unwrap().is_empty());
    }
}
