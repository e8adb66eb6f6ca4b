// SPDX-License-Identifier: CEPL-1.0
use std::path::{Path, PathBuf};

use pulsar_core::{Error, Result};
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShaderStage {
    Compute,
    Vertex,
    Fragment,
    ModelVertex,
    ModelFragment,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 5] = [
        ShaderStage::Compute,
        ShaderStage::Vertex,
        ShaderStage::Fragment,
        ShaderStage::ModelVertex,
        ShaderStage::ModelFragment,
    ];

    pub fn file_name(&self) -> &'static str {
        match self {
            ShaderStage::Compute => "particles.comp.spv",
            ShaderStage::Vertex => "particles.vert.spv",
            ShaderStage::Fragment => "particles.frag.spv",
            ShaderStage::ModelVertex => "model.vert.spv",
            ShaderStage::ModelFragment => "model.frag.spv",
        }
    }
}

/// Precompiled SPIR-V for the particle and model stages, kept as opaque bytes.
#[derive(Clone, Debug)]
pub struct ShaderBlobs {
    pub compute: Vec<u8>,
    pub vertex: Vec<u8>,
    pub fragment: Vec<u8>,
    pub model_vertex: Vec<u8>,
    pub model_fragment: Vec<u8>,
}

impl ShaderBlobs {
    pub fn load_dir(dir: &Path) -> Result<Self> {
        let [compute, vertex, fragment, model_vertex, model_fragment] =
            ShaderStage::ALL.map(|stage| load_bytes(dir.join(stage.file_name())));
        Ok(Self {
            compute: compute?,
            vertex: vertex?,
            fragment: fragment?,
            model_vertex: model_vertex?,
            model_fragment: model_fragment?,
        })
    }

    pub fn get(&self, stage: ShaderStage) -> &[u8] {
        match stage {
            ShaderStage::Compute => &self.compute,
            ShaderStage::Vertex => &self.vertex,
            ShaderStage::Fragment => &self.fragment,
            ShaderStage::ModelVertex => &self.model_vertex,
            ShaderStage::ModelFragment => &self.model_fragment,
        }
    }
}

/// Reads a whole asset file. A missing file is reported as
/// [`Error::FileNotFound`]; other I/O failures keep their source.
pub fn load_bytes(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    let path = path.as_ref();
    match std::fs::read(path) {
        Ok(bytes) => {
            debug!("loaded {} ({} bytes)", path.display(), bytes.len());
            Ok(bytes)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::FileNotFound {
            path: PathBuf::from(path),
        }),
        Err(source) => Err(Error::Io {
            path: PathBuf::from(path),
            source,
        }),
    }
}
