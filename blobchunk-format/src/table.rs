//! Digest table deduplicating chunks across a whole build.
//!
//! Records live in an arena and are referred to by [`ChunkId`]; the index maps
//! a digest to the id of the record holding it. A miss hands out a
//! [`Reservation`] which inserts nothing until it is committed, so a chunk whose
//! staging write fails never becomes visible.

use std::collections::HashMap;

use crate::block::BlockAddr;
use crate::digest::ChunkDigest;

/// Handle to a record in the digest table's arena.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ChunkId(u32);

impl ChunkId {
    #[inline(always)]
    pub fn get(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ChunkRecord {
    /// Content hash, never changes after the record is created.
    pub digest: ChunkDigest,

    /// Length of the chunk's original content. Only the last chunk of a file
    /// may be shorter than the configured chunk size.
    pub size: u32,

    /// Block address of the chunk's first byte, relative to the staging blob.
    pub staged_block: BlockAddr,
}

#[derive(Debug, Default)]
pub struct DigestTable {
    index: HashMap<ChunkDigest, ChunkId>,
    records: Vec<ChunkRecord>,
}

pub enum Lookup<'a> {
    Hit(ChunkId),
    Vacant(Reservation<'a>),
}

/// A slot for a digest that is not yet in the table.
///
/// Dropping the reservation without calling [`Reservation::commit`] leaves
/// the table untouched.
pub struct Reservation<'a> {
    table: &'a mut DigestTable,
    digest: ChunkDigest,
}

impl<'a> Reservation<'a> {
    pub fn digest(&self) -> &ChunkDigest {
        &self.digest
    }

    pub fn commit(self, size: u32, staged_block: BlockAddr) -> ChunkId {
        self.table.insert(ChunkRecord {
            digest: self.digest,
            size,
            staged_block,
        })
    }
}

impl DigestTable {
    pub fn new() -> DigestTable {
        DigestTable::default()
    }

    #[inline(always)]
    pub fn lookup(&self, digest: &ChunkDigest) -> Option<ChunkId> {
        self.index.get(digest).copied()
    }

    pub fn lookup_or_reserve(&mut self, digest: ChunkDigest) -> Lookup<'_> {
        match self.lookup(&digest) {
            Some(id) => Lookup::Hit(id),
            None => Lookup::Vacant(Reservation {
                table: self,
                digest,
            }),
        }
    }

    /// Inserts a record, returning the id of the record already holding the
    /// same digest if there is one.
    pub fn insert(&mut self, record: ChunkRecord) -> ChunkId {
        if let Some(id) = self.lookup(&record.digest) {
            return id;
        }

        let id = ChunkId(self.records.len() as u32);
        self.index.insert(record.digest, id);
        self.records.push(record);
        id
    }

    /// Drops the digest from the index.
    ///
    /// The arena slot stays behind as a tombstone, so ids are never reused and
    /// an id handed out for the removed record still resolves to it.
    pub fn remove(&mut self, digest: &ChunkDigest) -> Option<ChunkRecord> {
        let id = self.index.remove(digest)?;
        self.records.get(id.0 as usize).cloned()
    }

    /// # Panics
    ///
    /// If `id` was not handed out by this table.
    #[inline(always)]
    pub fn get(&self, id: ChunkId) -> &ChunkRecord {
        &self.records[id.0 as usize]
    }

    /// Number of distinct digests currently indexed.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}
