//! Content digests used as the deduplication key.

use std::fmt;
use std::str::FromStr;

use digest::{consts::U32, Digest, OutputSizeUser};

pub const DIGEST_SIZE: usize = 32;

/// 32-byte content hash of one chunk.
#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ChunkDigest([u8; DIGEST_SIZE]);

impl ChunkDigest {
    pub const fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        ChunkDigest(bytes)
    }

    #[inline(always)]
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }
}

impl fmt::Display for ChunkDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ChunkDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChunkDigest({})", self)
    }
}

/// A hash algorithm producing chunk digests.
///
/// Any `Digest` with a 32-byte output qualifies. `NAME` is what the CLI
/// accepts and what build manifests record.
pub trait ChunkHasher: Digest + OutputSizeUser<OutputSize = U32> + Default {
    const NAME: &'static str;

    fn chunk_digest(data: &[u8]) -> ChunkDigest {
        ChunkDigest(<Self as Digest>::digest(data).into())
    }
}

impl ChunkHasher for sha2::Sha256 {
    const NAME: &'static str = "sha256";
}

impl ChunkHasher for blake3::Hasher {
    const NAME: &'static str = "blake3";
}

/// Runtime selection of the chunk hash.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Blake3,
}

impl HashAlgorithm {
    pub const fn available_variants() -> &'static [&'static str] {
        &["sha256", "blake3"]
    }

    pub fn name(self) -> &'static str {
        match self {
            HashAlgorithm::Sha256 => <sha2::Sha256 as ChunkHasher>::NAME,
            HashAlgorithm::Blake3 => <blake3::Hasher as ChunkHasher>::NAME,
        }
    }

    pub fn digest(self, data: &[u8]) -> ChunkDigest {
        match self {
            HashAlgorithm::Sha256 => sha2::Sha256::chunk_digest(data),
            HashAlgorithm::Blake3 => blake3::Hasher::chunk_digest(data),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Unknown hash algorithm: {0}")]
pub struct ParseHashAlgorithmError(String);

impl FromStr for HashAlgorithm {
    type Err = ParseHashAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256" | "sha-256" => Ok(HashAlgorithm::Sha256),
            "blake3" => Ok(HashAlgorithm::Blake3),
            other => Err(ParseHashAlgorithmError(other.to_string())),
        }
    }
}
