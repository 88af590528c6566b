use std::path::PathBuf;

use blobchunk_format::{
    ChunkIndexFormat, HashAlgorithm, StoreOptions, DEFAULT_BLOCK_BITS, DEFAULT_CHUNK_BITS,
};
use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "blobchunk",
    about = "Build chunk-deduplicated image data and read files back out of it.",
    version
)]
pub struct Cli {
    /// More logging (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short = 'v', long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(visible_alias = "b", about = "Chunk files into a new image")]
    Build(BuildArgs),

    #[command(about = "Write a file stored in an image to stdout")]
    Cat(CatArgs),
}

#[derive(Debug, clap::Args)]
#[command(after_help = "\
\x1b[1m\x1b[4mExamples:\x1b[0m
  blobchunk build out.img rootfs/
  blobchunk build --chunk-bits 16 --format blockmap --manifest out.json out.img rootfs/
  blobchunk cat out.img --manifest out.json etc/hostname")]
pub struct BuildArgs {
    /// Output image path
    pub image: PathBuf,

    /// log2 of the chunk size
    #[arg(long, default_value_t = DEFAULT_CHUNK_BITS)]
    pub chunk_bits: u8,

    /// log2 of the image block size
    #[arg(long, default_value_t = DEFAULT_BLOCK_BITS)]
    pub block_bits: u8,

    /// Chunk index format (indexes, blockmap)
    #[arg(long, default_value_t = ChunkIndexFormat::Indexes)]
    pub format: ChunkIndexFormat,

    /// Chunk content hash (sha256, blake3)
    #[arg(long, default_value_t = HashAlgorithm::Sha256)]
    pub hash: HashAlgorithm,

    /// Device id stored in indexed-format entries
    #[arg(long, default_value_t = 0)]
    pub device_id: u16,

    /// Write a JSON manifest locating every file's chunk index
    #[arg(short = 'm', long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Include hidden files
    #[arg(short = 'a', long = "all")]
    pub include_hidden: bool,

    /// Suppress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Overwrite existing image
    #[arg(short = 'f', long)]
    pub force: bool,

    /// Chunk files sequentially, giving a reproducible image
    #[arg(long)]
    pub serial: bool,

    /// Number of parallel chunking tasks (default: CPU count)
    #[arg(short = 'j', long = "jobs")]
    pub jobs: Option<usize>,

    /// Files and directories to chunk
    #[arg(required = true, value_name = "PATH")]
    pub paths: Vec<PathBuf>,
}

impl BuildArgs {
    pub fn store_options(&self) -> StoreOptions {
        StoreOptions::new()
            .with_block_bits(self.block_bits)
            .with_chunk_bits(self.chunk_bits)
            .with_index_format(self.format)
            .with_hash(self.hash)
            .with_device_id(self.device_id)
    }
}

#[derive(Debug, clap::Args)]
pub struct CatArgs {
    /// Image written by `blobchunk build`
    pub image: PathBuf,

    /// Manifest written alongside the image
    #[arg(short = 'm', long, value_name = "FILE")]
    pub manifest: PathBuf,

    /// Path of the file as listed in the manifest
    pub path: String,
}
