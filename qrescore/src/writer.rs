//! Serializes an in-memory tree back to the container format.
//!
//! Two passes over the tree: the first walk assigns every node a
//! tree-entry index (breadth-first, so a directory's children land at
//! consecutive indices, required for the on-disk `first_child_index`/
//! `child_count` pair) and interns names into a dedup table; the second
//! walk, using the offsets now known, emits header, data, names, and tree
//! sections in that order.

use std::collections::HashMap;
use std::io::Write;

use enumflags2::BitFlags;
use tracing::debug;

use crate::bin::{write_u16, write_u32};
use crate::compress::{self, DEFAULT_COMPRESS_THRESHOLD};
use crate::error::WriterError;
use crate::hash::NameHash;
use crate::node::{Dir, EntryFlag, Node};

const MAGIC: &[u8; 4] = b"qres";

/// Write-time knobs, independent of the container format version.
///
/// Mirrors `rcc.cpp`'s `m_compressThreshold`: freshly added (`Bytes`)
/// files are tried against zstd and kept compressed only if the result
/// clears this percentage reduction. Files read back from an existing
/// container keep whatever compression they already carry; the writer
/// never recompresses those.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    pub compress_threshold: u8,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions { compress_threshold: DEFAULT_COMPRESS_THRESHOLD }
    }
}

/// A file's body and the flags to record for it, resolved once up front so
/// the data section and tree section agree on both bytes and flags.
struct ResolvedBody {
    bytes: Vec<u8>,
    flags: BitFlags<EntryFlag>,
}

struct InternedName {
    offset: u32,
}

struct Planner {
    names: HashMap<NameHash, InternedName>,
    names_bytes: Vec<u8>,
    /// Breadth-first queue of nodes still needing a tree entry index.
    order: Vec<PlannedEntry>,
}

struct PlannedEntry<'a> {
    name_hash: NameHash,
    name_offset: u32,
    kind: PlannedKind<'a>,
}

enum PlannedKind<'a> {
    Dir { first_child: u32, child_count: u32 },
    File(&'a Node),
}

impl Planner {
    fn new() -> Self {
        Planner { names: HashMap::new(), names_bytes: Vec::new(), order: Vec::new() }
    }

    fn intern(&mut self, name: &str, hash: NameHash) -> u32 {
        if let Some(existing) = self.names.get(&hash) {
            return existing.offset;
        }
        let offset = self.names_bytes.len() as u32;
        let units: Vec<u16> = name.encode_utf16().collect();
        write_u16(&mut self.names_bytes, units.len() as u16).ok();
        write_u32(&mut self.names_bytes, hash.raw()).ok();
        for unit in &units {
            write_u16(&mut self.names_bytes, *unit).ok();
        }
        self.names.insert(hash, InternedName { offset });
        offset
    }

    /// Breadth-first layout: push root first, then for every directory
    /// dequeued in turn, its children occupy the next contiguous block of
    /// indices. Matches `prepareNode`'s traversal order exactly, since the
    /// reader relies on `first_child_index..first_child_index+child_count`
    /// being contiguous.
    fn plan(&mut self, root: &Dir) {
        let root_hash = root.name_hash();
        let root_offset = self.intern(root.name(), root_hash);
        self.order.push(PlannedEntry {
            name_hash: root_hash,
            name_offset: root_offset,
            kind: PlannedKind::Dir { first_child: 0, child_count: 0 },
        });

        let mut queue: Vec<&Dir> = vec![root];
        let mut queue_pos = 0;
        let mut entry_pos = 1;

        while queue_pos < queue.len() {
            let dir = queue[queue_pos];
            let first_child = entry_pos as u32;
            let child_count = dir.children().len() as u32;

            for child in dir.children() {
                let hash = child.name_hash();
                let name_offset = self.intern(child.name(), hash);
                match child {
                    Node::Dir(d) => {
                        self.order.push(PlannedEntry {
                            name_hash: hash,
                            name_offset,
                            kind: PlannedKind::Dir { first_child: 0, child_count: 0 },
                        });
                        queue.push(d);
                    }
                    Node::File(_) => {
                        self.order.push(PlannedEntry {
                            name_hash: hash,
                            name_offset,
                            kind: PlannedKind::File(child),
                        });
                    }
                }
                entry_pos += 1;
            }

            let dir_index = if queue_pos == 0 {
                0
            } else {
                // the index this directory itself was assigned, found by
                // linear offset from queue position to order position.
                self.dir_entry_index(queue_pos)
            };
            if let PlannedKind::Dir { first_child: fc, child_count: cc } =
                &mut self.order[dir_index].kind
            {
                *fc = first_child;
                *cc = child_count;
            }
            queue_pos += 1;
        }
    }

    /// Maps a position in the breadth-first directory queue back to its
    /// slot in `order`. Directories are enqueued in the same relative
    /// order they were appended to `order`, so this walks `order` once to
    /// find the `queue_pos`-th directory entry.
    fn dir_entry_index(&self, queue_pos: usize) -> usize {
        self.order
            .iter()
            .enumerate()
            .filter(|(_, e)| matches!(e.kind, PlannedKind::Dir { .. }))
            .nth(queue_pos)
            .map(|(i, _)| i)
            .expect("queue_pos always refers to a planned directory")
    }
}

/// Writes `root` as a complete container to `out`, using `version` to
/// decide header/entry layout and whether to emit the overall-flags word,
/// and the default [`WriteOptions`].
pub fn write_container<W: Write>(
    out: &mut W,
    root: &Dir,
    version: u32,
) -> Result<(), WriterError> {
    write_container_with_options(out, root, version, WriteOptions::default())
}

/// As [`write_container`], but lets the caller tune write-time behavior
/// (currently just the compression threshold for freshly added files).
pub fn write_container_with_options<W: Write>(
    out: &mut W,
    root: &Dir,
    version: u32,
    options: WriteOptions,
) -> Result<(), WriterError> {
    let mut planner = Planner::new();
    planner.plan(root);

    let bodies = resolve_bodies(&planner.order, options.compress_threshold)?;
    let data_bytes = collect_data_section(&bodies)?;

    let header_size = if version >= 3 { 20 } else { 16 };

    let data_offset = 4 + header_size as u64;
    let names_offset = data_offset + data_bytes.len() as u64;
    let tree_offset = names_offset + planner.names_bytes.len() as u64;

    let overall_flags = overall_flags_for(&bodies);

    debug!(version, data_offset, names_offset, tree_offset, overall_flags, "writing container");

    out.write_all(MAGIC)?;
    write_u32(out, version)?;
    write_u32(out, tree_offset as u32)?;
    write_u32(out, data_offset as u32)?;
    write_u32(out, names_offset as u32)?;
    if version >= 3 {
        write_u32(out, overall_flags)?;
    }

    out.write_all(&data_bytes)?;
    out.write_all(&planner.names_bytes)?;

    write_tree(out, &planner.order, &bodies, version)?;

    Ok(())
}

/// Resolves each file's final on-disk body and flags, in entry order.
/// A file already carrying a compression kind (read back from some other
/// container) is kept as-is; a freshly added, still-uncompressed file is
/// tried against zstd and kept compressed only if it clears `threshold`
/// (Qt's `rcc.cpp` cheap-trial-then-recompress heuristic, applied once
/// here instead of at `add` time so the decision always reflects the
/// threshold in force at save time).
fn resolve_bodies(
    order: &[PlannedEntry],
    threshold: u8,
) -> Result<Vec<Option<ResolvedBody>>, WriterError> {
    order
        .iter()
        .map(|entry| match &entry.kind {
            PlannedKind::Dir { .. } => Ok(None),
            PlannedKind::File(node) => {
                let file = node.as_file().expect("PlannedKind::File always wraps a file node");
                let raw = file.get_compressed()?;
                let existing_flags = file.compression();
                if !existing_flags.is_empty() {
                    return Ok(Some(ResolvedBody { bytes: raw, flags: existing_flags }));
                }
                match compress::zstd_compress_if_worthwhile(&raw, threshold)? {
                    Some(compressed) => {
                        debug!(
                            name = file.name(),
                            input = raw.len(),
                            output = compressed.len(),
                            "zstd compressed on write"
                        );
                        Ok(Some(ResolvedBody {
                            bytes: compressed,
                            flags: EntryFlag::CompressedZstd.into(),
                        }))
                    }
                    None => {
                        debug!(
                            name = file.name(),
                            size = raw.len(),
                            threshold,
                            "compression skipped, below threshold"
                        );
                        Ok(Some(ResolvedBody { bytes: raw, flags: BitFlags::empty() }))
                    }
                }
            }
        })
        .collect()
}

/// Bitwise OR of every file's resolved compression flags, written into the
/// v3 header so a consumer can tell at a glance which codecs it needs (I5).
fn overall_flags_for(bodies: &[Option<ResolvedBody>]) -> u32 {
    bodies
        .iter()
        .flatten()
        .fold(0u32, |flags, body| flags | body.flags.bits() as u32)
}

/// Every file's data record offset, in entry order, computed once so
/// `collect_data_section` and `write_tree` agree on where each record
/// lands without recomputing (or duplicating) the running total.
fn data_offsets(bodies: &[Option<ResolvedBody>]) -> Vec<u32> {
    let mut running = 0u32;
    bodies
        .iter()
        .map(|body| match body {
            Some(body) => {
                let offset = running;
                running += 4 + body.bytes.len() as u32;
                offset
            }
            None => 0,
        })
        .collect()
}

fn collect_data_section(bodies: &[Option<ResolvedBody>]) -> Result<Vec<u8>, WriterError> {
    let mut data = Vec::new();
    for body in bodies.iter().flatten() {
        write_u32(&mut data, body.bytes.len() as u32)?;
        data.write_all(&body.bytes)?;
    }
    Ok(data)
}

fn write_tree<W: Write>(
    out: &mut W,
    order: &[PlannedEntry],
    bodies: &[Option<ResolvedBody>],
    version: u32,
) -> Result<(), WriterError> {
    let offsets = data_offsets(bodies);

    for ((entry, offset), body) in order.iter().zip(offsets).zip(bodies) {
        write_u32(out, entry.name_offset)?;
        match &entry.kind {
            PlannedKind::Dir { first_child, child_count } => {
                write_u16(out, EntryFlag::Directory as u16)?;
                write_u32(out, *child_count)?;
                write_u32(out, *first_child)?;
            }
            PlannedKind::File(_) => {
                let body = body.as_ref().expect("file entries always resolve a body");
                write_u16(out, body.flags.bits())?;
                write_u16(out, 0)?; // language
                write_u16(out, 0)?; // territory
                write_u32(out, offset)?;
            }
        }
        if version >= 2 {
            // last_modified, unused by this crate's readers; kept zero.
            write_u32(out, 0)?;
            write_u32(out, 0)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::File;

    #[test]
    fn highly_compressible_file_is_written_with_zstd_flag() {
        let mut root = Dir::root();
        let payload: Vec<u8> = std::iter::repeat(b'a').take(4096).collect();
        root.insert_child(Node::File(File::from_bytes("a.txt", payload)));

        let mut bytes = Vec::new();
        write_container(&mut bytes, &root, 3).unwrap();

        let (_reader, tree) = crate::reader::ContainerReader::open(std::io::Cursor::new(bytes))
            .unwrap();
        let file = match tree.children().first().unwrap() {
            Node::File(f) => f,
            Node::Dir(_) => panic!("expected a file"),
        };
        assert!(file.compression().contains(EntryFlag::CompressedZstd));
        assert_eq!(file.read().unwrap(), vec![b'a'; 4096]);
    }

    #[test]
    fn incompressible_small_file_is_written_uncompressed() {
        let mut root = Dir::root();
        root.insert_child(Node::File(File::from_bytes("a.txt", b"hi".to_vec())));

        let mut bytes = Vec::new();
        write_container(&mut bytes, &root, 3).unwrap();

        let (_reader, tree) = crate::reader::ContainerReader::open(std::io::Cursor::new(bytes))
            .unwrap();
        let file = match tree.children().first().unwrap() {
            Node::File(f) => f,
            Node::Dir(_) => panic!("expected a file"),
        };
        assert!(file.compression().is_empty());
        assert_eq!(file.read().unwrap(), b"hi");
    }

    #[test]
    fn custom_threshold_is_honored() {
        let mut root = Dir::root();
        let payload: Vec<u8> = std::iter::repeat(b'a').take(4096).collect();
        root.insert_child(Node::File(File::from_bytes("a.txt", payload)));

        let mut bytes = Vec::new();
        // an unreachable threshold (compressed size would need to beat a
        // negative percentage) forces every candidate to be skipped.
        write_container_with_options(
            &mut bytes,
            &root,
            3,
            WriteOptions { compress_threshold: 100 },
        )
        .unwrap();

        let (_reader, tree) = crate::reader::ContainerReader::open(std::io::Cursor::new(bytes))
            .unwrap();
        let file = match tree.children().first().unwrap() {
            Node::File(f) => f,
            Node::Dir(_) => panic!("expected a file"),
        };
        assert!(file.compression().is_empty());
    }
}
