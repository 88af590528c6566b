use std::fs::File;
use std::path::PathBuf;

use blobchunk_format::{
    Area, BlobStore, ChunkedInode, ImageFile, ImageSink, RemappedStore, StoreStats,
};
use jwalk::WalkDir;
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::cli::BuildArgs;
use crate::error::{Error, Result};
use crate::manifest::{Manifest, ManifestEntry};
use crate::util::{format_size, manifest_name};

struct InputFile {
    path: PathBuf,
    name: String,
}

pub(crate) struct Summary {
    pub files: usize,
    pub stats: StoreStats,
    pub image_len: u64,
}

pub fn run(args: BuildArgs) -> Result<()> {
    let summary = build(&args)?;

    if !args.quiet {
        println!(
            "Chunked {} files: {} chunks, {} unique ({} staged), {} duplicate",
            summary.files,
            summary.stats.chunks(),
            summary.stats.unique_chunks,
            format_size(summary.stats.staged_bytes),
            summary.stats.hits,
        );
        println!(
            "Wrote {} to {}",
            format_size(summary.image_len),
            args.image.display()
        );
    }

    Ok(())
}

pub(crate) fn build(args: &BuildArgs) -> Result<Summary> {
    if args.image.exists() && !args.force {
        return Err(Error::ImageExists {
            path: args.image.clone(),
        });
    }

    let options = args.store_options();
    let block_size = options.validate().map_err(Error::InvalidOptions)?;

    let inputs = collect_inputs(&args.paths, args.include_hidden)?;
    if inputs.is_empty() {
        return Err(Error::NoFilesSpecified);
    }
    tracing::info!(files = inputs.len(), "chunking files");

    let store = BlobStore::new(options).map_err(Error::CreateStore)?;
    let (store, inodes) = if args.serial {
        chunk_serial(store, &inputs)?
    } else {
        chunk_parallel(store, &inputs, args.jobs)?
    };
    let stats = store.stats();

    let create_err = |source| Error::CreateImage {
        path: args.image.clone(),
        source,
    };
    let file = File::create(&args.image).map_err(create_err)?;

    // Block 0 stays free for the superblock.
    let mut image = ImageFile::with_start(file, block_size.get());
    let remapped = store.remap(&mut image).map_err(|source| Error::Remap {
        path: args.image.clone(),
        source,
    })?;

    let mut entries = Vec::with_capacity(inodes.len());
    for (input, inode) in inputs.iter().zip(&inodes) {
        let index_offset =
            write_index(&remapped, inode, &mut image).map_err(|source| Error::WriteIndex {
                path: input.name.clone(),
                source,
            })?;

        entries.push(ManifestEntry {
            path: input.name.clone(),
            size: inode.size,
            chunk_format: inode.chunk_format.get(),
            index_offset,
            index_size: inode.index_size,
        });
    }

    let image_len = image.len();
    image.flush().map_err(create_err)?;
    image.get_ref().set_len(image_len).map_err(create_err)?;

    if let Some(path) = &args.manifest {
        let manifest = Manifest {
            block_bits: options.block_bits,
            chunk_bits: options.chunk_bits,
            format: options.index_format.to_string(),
            hash: options.hash.to_string(),
            base: remapped.base(),
            files: entries,
        };
        manifest.save(path)?;
    }

    Ok(Summary {
        files: inputs.len(),
        stats,
        image_len,
    })
}

fn collect_inputs(paths: &[PathBuf], include_hidden: bool) -> Result<Vec<InputFile>> {
    let mut inputs = Vec::new();

    for root in paths {
        let meta = std::fs::metadata(root).map_err(|source| Error::OpenInput {
            path: root.clone(),
            source,
        })?;

        if meta.is_file() {
            inputs.push(InputFile {
                name: manifest_name(root, root),
                path: root.clone(),
            });
            continue;
        }

        for entry in WalkDir::new(root).skip_hidden(!include_hidden).sort(true) {
            let entry = entry.map_err(|source| Error::WalkDirectory {
                path: root.clone(),
                source,
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            inputs.push(InputFile {
                name: manifest_name(root, &path),
                path,
            });
        }
    }

    Ok(inputs)
}

fn chunk_serial(
    mut store: BlobStore,
    inputs: &[InputFile],
) -> Result<(BlobStore, Vec<ChunkedInode>)> {
    let inodes = inputs
        .iter()
        .map(|input| {
            let inode = store
                .chunk_path(&input.path)
                .map_err(|source| Error::ChunkFile {
                    path: input.path.clone(),
                    source,
                })?;
            tracing::debug!(path = %input.path.display(), chunks = inode.chunk_count(), "chunked file");
            Ok(inode)
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((store, inodes))
}

/// Chunks on a thread pool; files are read and hashed in parallel and only
/// the table lookup and staging append hold the store's lock.
fn chunk_parallel(
    store: BlobStore,
    inputs: &[InputFile],
    jobs: Option<usize>,
) -> Result<(BlobStore, Vec<ChunkedInode>)> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs.unwrap_or(0))
        .build()?;

    let chunker = store.chunker();
    let shared = Mutex::new(store);

    let inodes = pool.install(|| {
        inputs
            .par_iter()
            .map(|input| {
                let mut resolver = &shared;
                let inode = chunker
                    .chunk_path(&mut resolver, &input.path)
                    .map_err(|source| Error::ChunkFile {
                        path: input.path.clone(),
                        source,
                    })?;
                tracing::debug!(path = %input.path.display(), chunks = inode.chunk_count(), "chunked file");
                Ok(inode)
            })
            .collect::<Result<Vec<_>>>()
    })?;

    Ok((shared.into_inner(), inodes))
}

fn write_index<I: ImageSink>(
    remapped: &RemappedStore,
    inode: &ChunkedInode,
    image: &mut I,
) -> blobchunk_format::Result<u64> {
    let unit = inode.chunk_format.index_format().unit_size();
    let offset = image.allocate(Area::Meta, inode.index_size, unit)?;
    remapped.write_chunk_index(inode, image, offset)
}
