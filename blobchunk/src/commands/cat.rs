use std::fs::File;
use std::io::Write;

use blobchunk_format::{read_chunk_index, read_chunked, BlockSize};
use memmap2::Mmap;

use crate::cli::CatArgs;
use crate::error::{Error, Result};
use crate::manifest::Manifest;

pub fn run(args: CatArgs) -> Result<()> {
    let manifest = Manifest::load(&args.manifest)?;

    let open_err = |source| Error::OpenImage {
        path: args.image.clone(),
        source,
    };
    let file = File::open(&args.image).map_err(open_err)?;
    // The image is not modified while mapped.
    let image = unsafe { Mmap::map(&file) }.map_err(open_err)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    read_file(&image, &manifest, &args.path, &mut out)?;
    out.flush()?;

    Ok(())
}

/// Writes the content of `path` to `out` by following its chunk index.
pub(crate) fn read_file<W: Write>(
    image: &[u8],
    manifest: &Manifest,
    path: &str,
    out: &mut W,
) -> Result<u64> {
    let entry = manifest.find(path).ok_or_else(|| Error::NotInManifest {
        path: path.to_string(),
    })?;
    let read_err = |source| Error::ReadFile {
        path: entry.path.clone(),
        source,
    };

    let block_size = BlockSize::new(manifest.block_bits).map_err(read_err)?;
    let chunk_bits = entry.chunk_bits(block_size);

    let entries = read_chunk_index(
        image,
        entry.index_offset,
        entry.index_format(),
        entry.size,
        chunk_bits,
    )
    .map_err(read_err)?;

    tracing::debug!(
        path = %entry.path,
        size = entry.size,
        chunks = entries.len(),
        "reading file"
    );

    read_chunked(image, &entries, entry.size, chunk_bits, block_size, out).map_err(read_err)
}
