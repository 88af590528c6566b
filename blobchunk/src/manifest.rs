//! JSON sidecar recording where each file's chunk index lives in the image.

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use blobchunk_format::{BlockSize, ChunkFormat, ChunkIndexFormat};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Serialize, Deserialize)]
pub struct Manifest {
    pub block_bits: u8,
    pub chunk_bits: u8,
    pub format: String,
    pub hash: String,
    /// Block address of the relocated chunk data.
    pub base: u32,
    pub files: Vec<ManifestEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub size: u64,
    pub chunk_format: u16,
    pub index_offset: u64,
    pub index_size: u64,
}

impl ManifestEntry {
    pub fn index_format(&self) -> ChunkIndexFormat {
        ChunkFormat::from_raw(self.chunk_format).index_format()
    }

    pub fn chunk_bits(&self, block_size: BlockSize) -> u8 {
        ChunkFormat::from_raw(self.chunk_format).chunk_bits(block_size)
    }
}

impl Manifest {
    pub fn find(&self, path: &str) -> Option<&ManifestEntry> {
        let path = path.trim_start_matches('/');
        self.files.iter().find(|e| e.path == path)
    }

    pub fn load(path: &Path) -> Result<Manifest> {
        let to_err = |source| Error::ReadManifest {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(to_err)?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| to_err(e.into()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let to_err = |source| Error::WriteManifest {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(to_err)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|e| to_err(e.into()))?;
        writer.flush().map_err(to_err)
    }
}
