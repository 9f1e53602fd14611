// SPDX-License-Identifier: CEPL-1.0
//! SPIR-V loading and shader module creation.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use ash::{util::read_spv, vk, Device};
use tracing::debug;

use crate::error::{RenderError, RenderResult, VkCheck};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub fn file_name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vert.spv",
            ShaderStage::Fragment => "frag.spv",
        }
    }

    pub fn flags(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
        }
    }
}

pub trait ShaderLoader {
    /// SPIR-V words for one stage.
    fn load(&self, stage: ShaderStage) -> RenderResult<Vec<u32>>;
}

/// Reads `vert.spv` and `frag.spv` from a directory at runtime.
#[derive(Clone, Debug)]
pub struct SpvDirLoader {
    dir: PathBuf,
}

impl SpvDirLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ShaderLoader for SpvDirLoader {
    fn load(&self, stage: ShaderStage) -> RenderResult<Vec<u32>> {
        let path = self.dir.join(stage.file_name());
        let words = fs::read(&path).and_then(|bytes| read_spv(&mut Cursor::new(bytes)));
        match words {
            Ok(words) => {
                debug!(path = %path.display(), words = words.len(), "loaded shader");
                Ok(words)
            }
            Err(source) => Err(RenderError::Shader { path, source }),
        }
    }
}

/// Shaders compiled from `shaders/` by the build script.
#[cfg(feature = "embedded-shaders")]
#[derive(Clone, Copy, Debug, Default)]
pub struct EmbeddedShaders;

#[cfg(feature = "embedded-shaders")]
impl ShaderLoader for EmbeddedShaders {
    fn load(&self, stage: ShaderStage) -> RenderResult<Vec<u32>> {
        let bytes: &[u8] = match stage {
            ShaderStage::Vertex => include_bytes!(concat!(env!("OUT_DIR"), "/vert.spv")),
            ShaderStage::Fragment => include_bytes!(concat!(env!("OUT_DIR"), "/frag.spv")),
        };
        read_spv(&mut Cursor::new(bytes)).map_err(|source| RenderError::Shader {
            path: Path::new("<embedded>").join(stage.file_name()),
            source,
        })
    }
}

pub(crate) unsafe fn create_shader_module(
    device: &Device,
    code: &[u32],
) -> RenderResult<vk::ShaderModule> {
    let ci = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        p_code: code.as_ptr(),
        code_size: std::mem::size_of_val(code),
        ..Default::default()
    };
    device
        .create_shader_module(&ci, None)
        .check("vkCreateShaderModule")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPIRV_MAGIC: u32 = 0x0723_0203;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("miner-shader-{}-{name}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn loads_words_from_directory() {
        let dir = scratch_dir("ok");
        let mut bytes = SPIRV_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        fs::write(dir.join("vert.spv"), &bytes).unwrap();

        let words = SpvDirLoader::new(&dir).load(ShaderStage::Vertex).unwrap();
        assert_eq!(words, vec![SPIRV_MAGIC, 0x0001_0000]);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_names_the_path() {
        let dir = scratch_dir("missing");
        let err = SpvDirLoader::new(&dir)
            .load(ShaderStage::Fragment)
            .unwrap_err();
        match err {
            RenderError::Shader { path, source } => {
                assert!(path.ends_with("frag.spv"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn truncated_module_is_rejected() {
        let dir = scratch_dir("truncated");
        fs::write(dir.join("vert.spv"), [0x03, 0x02, 0x23]).unwrap();
        let err = SpvDirLoader::new(&dir).load(ShaderStage::Vertex);
        assert!(matches!(err, Err(RenderError::Shader { .. })));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn stage_file_names() {
        assert_eq!(ShaderStage::Vertex.file_name(), "vert.spv");
        assert_eq!(ShaderStage::Fragment.flags(), vk::ShaderStageFlags::FRAGMENT);
    }
}
