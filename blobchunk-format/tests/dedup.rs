//! End-to-end chunking, remapping and readback through the public API.

use std::io::{Cursor, Read, Seek, SeekFrom, Write};

use blobchunk_format::{
    read_chunk_index, read_chunked, Area, BlobStore, ChunkDigest, ChunkIndexFormat, ChunkResolver,
    ChunkedInode, Error, HashAlgorithm, ImageFile, ImageSink, StoreOptions,
};
use parking_lot::Mutex;

fn options() -> StoreOptions {
    StoreOptions::new().with_chunk_bits(12)
}

/// Pseudo-random bytes; equal seeds give equal prefixes.
fn pattern(len: usize, seed: u8) -> Vec<u8> {
    let mut state = seed as u32 + 1;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12345);
            (state >> 16) as u8
        })
        .collect()
}

/// A chunked file plus where its index landed.
struct Placed {
    inode: ChunkedInode,
    index_offset: u64,
}

fn build<S: Read + Write + Seek>(
    mut store: BlobStore<S>,
    files: &[Vec<u8>],
) -> (Vec<u8>, Vec<Placed>, blobchunk_format::RemappedStore) {
    let inodes: Vec<_> = files
        .iter()
        .map(|data| {
            let mut inode = ChunkedInode::new(data.len() as u64);
            store
                .chunk_file(&mut inode, &mut Cursor::new(data))
                .unwrap();
            inode
        })
        .collect();

    let mut image = ImageFile::with_start(Cursor::new(Vec::new()), 1024);
    let remapped = store.remap(&mut image).unwrap();

    let placed = inodes
        .into_iter()
        .map(|inode| {
            let unit = inode.chunk_format.index_format().unit_size();
            let offset = image.allocate(Area::Meta, inode.index_size, unit).unwrap();
            let index_offset = remapped
                .write_chunk_index(&inode, &mut image, offset)
                .unwrap();
            Placed {
                inode,
                index_offset,
            }
        })
        .collect();

    (image.into_inner().into_inner(), placed, remapped)
}

fn read_back(image: &[u8], placed: &Placed, remapped: &blobchunk_format::RemappedStore) -> Vec<u8> {
    let block_size = remapped.block_size();
    let chunk_bits = placed.inode.chunk_format.chunk_bits(block_size);
    let entries = read_chunk_index(
        image,
        placed.index_offset,
        placed.inode.chunk_format.index_format(),
        placed.inode.size,
        chunk_bits,
    )
    .unwrap();

    let mut out = Vec::new();
    read_chunked(image, &entries, placed.inode.size, chunk_bits, block_size, &mut out).unwrap();
    out
}

#[test]
fn identical_files_share_every_chunk() {
    let data = pattern(10000, 1);
    let mut store = BlobStore::with_sink(options(), Cursor::new(Vec::new())).unwrap();

    let mut a = ChunkedInode::new(10000);
    store.chunk_file(&mut a, &mut Cursor::new(&data)).unwrap();
    assert_eq!(a.chunk_count(), 3);
    assert_eq!(store.staged_len(), 3 * 4096);
    let after_a = store.stats();
    assert_eq!(after_a.misses, 3);

    let mut b = ChunkedInode::new(10000);
    store.chunk_file(&mut b, &mut Cursor::new(&data)).unwrap();
    assert_eq!(store.staged_len(), 3 * 4096);
    assert_eq!(store.stats().misses, 3);
    assert_eq!(store.stats().hits, 3);
    assert_eq!(a.chunks(), b.chunks());

    let mut image = ImageFile::with_start(Cursor::new(Vec::new()), 2 * 4096);
    let remapped = store.remap(&mut image).unwrap();
    assert_eq!(
        remapped.encode_chunk_index(&a).unwrap(),
        remapped.encode_chunk_index(&b).unwrap()
    );
    assert_eq!(remapped.block_addr(a.chunks()[0]).unwrap(), 2);
}

#[test]
fn chunk_count_is_ceiling_of_size() {
    let mut store = BlobStore::with_sink(options(), Cursor::new(Vec::new())).unwrap();
    for (size, expected) in [(0u64, 0usize), (1, 1), (4095, 1), (4096, 1), (4097, 2), (12289, 4)] {
        let data = pattern(size as usize, size as u8);
        let mut inode = ChunkedInode::new(size);
        store.chunk_file(&mut inode, &mut Cursor::new(&data)).unwrap();
        assert_eq!(inode.chunk_count(), expected, "size {}", size);
        assert_eq!(inode.index_size, expected as u64 * 8);
        assert!(inode.is_chunk_based());
    }
}

#[test]
fn staging_stays_block_aligned() {
    let mut store = BlobStore::with_sink(options(), Cursor::new(Vec::new())).unwrap();
    for (i, size) in [1usize, 4095, 4096, 5000, 77].iter().enumerate() {
        let data = pattern(*size, i as u8 + 100);
        let mut inode = ChunkedInode::new(*size as u64);
        store.chunk_file(&mut inode, &mut Cursor::new(&data)).unwrap();
        assert_eq!(store.staged_len() % 4096, 0);
        for &id in inode.chunks() {
            let record = store.table().get(id);
            assert!(record.size as u64 <= 4096);
        }
    }
}

#[test]
fn image_round_trips_every_file() {
    let files = vec![
        pattern(10000, 1),
        pattern(10000, 1),
        pattern(4096, 7),
        Vec::new(),
        pattern(1, 9),
        [pattern(4096, 7), pattern(3000, 3)].concat(),
    ];
    let store = BlobStore::with_sink(options(), Cursor::new(Vec::new())).unwrap();
    let (image, placed, remapped) = build(store, &files);

    for (data, placed) in files.iter().zip(&placed) {
        assert_eq!(&read_back(&image, placed, &remapped), data);
    }

    // The shared 4096-byte chunk of files 2 and 5 resolves to one address.
    assert_eq!(placed[2].inode.chunks()[0], placed[5].inode.chunks()[0]);
}

#[test]
fn block_map_round_trips() {
    let files = vec![pattern(9000, 4), pattern(100, 5)];
    let store = BlobStore::with_sink(
        options().with_index_format(ChunkIndexFormat::BlockMap),
        Cursor::new(Vec::new()),
    )
    .unwrap();
    let (image, placed, remapped) = build(store, &files);

    assert_eq!(placed[0].inode.index_size, 3 * 4);
    for (data, placed) in files.iter().zip(&placed) {
        assert_eq!(&read_back(&image, placed, &remapped), data);
    }
}

#[test]
fn remapped_addresses_match_serialized_index() {
    let files = vec![pattern(12288, 2)];
    let store = BlobStore::with_sink(options(), Cursor::new(Vec::new())).unwrap();
    let (image, placed, remapped) = build(store, &files);

    let entries = read_chunk_index(
        &image,
        placed[0].index_offset,
        ChunkIndexFormat::Indexes,
        12288,
        12,
    )
    .unwrap();
    // Base is block 1 since the image reserves its first 1024 bytes.
    assert_eq!(remapped.base(), 1);
    let addrs: Vec<_> = entries.iter().map(|e| e.blkaddr).collect();
    assert_eq!(addrs, vec![1, 2, 3]);
    for (entry, &id) in entries.iter().zip(placed[0].inode.chunks()) {
        assert_eq!(entry.blkaddr, remapped.record(id).staged_block + remapped.base());
    }
}

#[test]
fn builds_are_deterministic() {
    let files = vec![pattern(20000, 1), pattern(7000, 2), pattern(20000, 1)];
    let run = || {
        let store = BlobStore::with_sink(options(), Cursor::new(Vec::new())).unwrap();
        build(store, &files).0
    };
    assert_eq!(run(), run());
}

#[test]
fn blake3_store_round_trips() {
    let files = vec![pattern(5000, 8)];
    let store = BlobStore::with_sink(
        options().with_hash(HashAlgorithm::Blake3),
        Cursor::new(Vec::new()),
    )
    .unwrap();
    let (image, placed, remapped) = build(store, &files);
    assert_eq!(read_back(&image, &placed[0], &remapped), files[0]);
}

/// Staging sink that refuses writes past a fixed size.
struct FullDisk {
    inner: Cursor<Vec<u8>>,
    limit: u64,
}

impl Read for FullDisk {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for FullDisk {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.inner.position() + buf.len() as u64 > self.limit {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "No space left on device",
            ));
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Seek for FullDisk {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[test]
fn out_of_space_leaves_no_trace() {
    let sink = FullDisk {
        inner: Cursor::new(Vec::new()),
        limit: 8192,
    };
    let mut store = BlobStore::with_sink(options(), sink).unwrap();

    let first = pattern(8192, 1);
    let mut inode = ChunkedInode::new(8192);
    store.chunk_file(&mut inode, &mut Cursor::new(&first)).unwrap();

    let second = pattern(4096, 50);
    let mut failed = ChunkedInode::new(4096);
    let err = store
        .chunk_file(&mut failed, &mut Cursor::new(&second))
        .unwrap_err();
    assert!(matches!(err, Error::OutOfSpace { offset: 8192, .. }));
    assert!(!failed.is_chunk_based());

    let digest = HashAlgorithm::Sha256.digest(&second);
    assert!(store.lookup(&digest).is_none());
    assert_eq!(store.stats().unique_chunks, 2);

    // Later files still dedup against what made it in.
    let mut again = ChunkedInode::new(8192);
    store.chunk_file(&mut again, &mut Cursor::new(&first)).unwrap();
    assert_eq!(again.chunks(), inode.chunks());
    assert_eq!(store.staged_len(), 8192);
}

#[test]
fn truncated_source_fails_chunking() {
    let mut store = BlobStore::with_sink(options(), Cursor::new(Vec::new())).unwrap();
    let mut inode = ChunkedInode::new(5000);
    let err = store
        .chunk_file(&mut inode, &mut Cursor::new(pattern(100, 0)))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ShortRead {
            offset: 0,
            expected: 4096,
            actual: 100
        }
    ));
    assert!(!inode.is_chunk_based());
}

#[test]
fn digest_collision_is_an_error() {
    let mut store = BlobStore::with_sink(options(), Cursor::new(Vec::new())).unwrap();
    let digest = ChunkDigest::from_bytes([0x42; 32]);
    store.resolve(digest, &[1, 2, 3]).unwrap();
    assert!(matches!(
        store.resolve(digest, &[1, 2, 3, 4]),
        Err(Error::DigestCollision { .. })
    ));
}

#[test]
fn parallel_chunking_matches_serial_dedup() {
    let files: Vec<Vec<u8>> = (0..8)
        .map(|i| [pattern(4096, 1), pattern(3000 + i * 100, i as u8)].concat())
        .collect();

    let store = Mutex::new(BlobStore::with_sink(options(), Cursor::new(Vec::new())).unwrap());
    let chunker = store.lock().chunker();

    let inodes: Vec<ChunkedInode> = std::thread::scope(|scope| {
        let handles: Vec<_> = files
            .iter()
            .map(|data| {
                let store = &store;
                scope.spawn(move || {
                    let mut inode = ChunkedInode::new(data.len() as u64);
                    let mut resolver = store;
                    chunker
                        .chunk_file(&mut resolver, &mut inode, &mut Cursor::new(data))
                        .unwrap();
                    inode
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let store = store.into_inner();
    // One shared leading chunk plus one distinct tail per file.
    assert_eq!(store.stats().unique_chunks, 9);
    assert_eq!(store.staged_len(), 9 * 4096);

    let first = inodes[0].chunks()[0];
    assert!(inodes.iter().all(|inode| inode.chunks()[0] == first));

    let mut image = ImageFile::new(Cursor::new(Vec::new()));
    let remapped = store.remap(&mut image).unwrap();
    let image_bytes = image.get_ref().get_ref().clone();
    for (data, inode) in files.iter().zip(&inodes) {
        let mut out = Vec::new();
        for (i, &id) in inode.chunks().iter().enumerate() {
            let start = remapped.block_size().byte_offset(remapped.block_addr(id).unwrap()) as usize;
            let len = remapped.record(id).size as usize;
            assert_eq!(len, data.len().min((i + 1) * 4096) - i * 4096);
            out.extend_from_slice(&image_bytes[start..start + len]);
        }
        assert_eq!(&out, data);
    }
}

#[test]
fn tempfile_store_and_file_image() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("input.bin");
    let data = pattern(70000, 3);
    std::fs::write(&path, &data).unwrap();

    let mut store = BlobStore::new(StoreOptions::default()).unwrap();
    let inode = store.chunk_path(&path).unwrap();
    assert_eq!(inode.chunk_count(), 1);

    let image_path = dir.path().join("out.img");
    let mut image = ImageFile::new(std::fs::File::create(&image_path).unwrap());
    let remapped = store.remap(&mut image).unwrap();
    let offset = image.allocate(Area::Meta, inode.index_size, 8).unwrap();
    let index_offset = remapped.write_chunk_index(&inode, &mut image, offset).unwrap();
    image.flush().unwrap();
    drop(image);

    let bytes = std::fs::read(&image_path).unwrap();
    let placed = Placed {
        inode,
        index_offset,
    };
    assert_eq!(read_back(&bytes, &placed, &remapped), data);
}
