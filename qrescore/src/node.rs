//! The in-memory tree.
//!
//! A directory and a file are both just variants of a single tagged
//! `Node` enum rather than a class hierarchy: a directory is the `Dir`
//! variant, and a file reduces to `read`/`compression`/`get_compressed`/
//! `data_size`.
//!
//! No parent pointers. Every mutation (`rm`, `mv`, `add`) is driven
//! top-down from the root via explicit path resolution in `facade`;
//! back-pointers would turn `mv` into an ownership-cycle problem for no
//! benefit.

use std::fmt;
use std::io;
use std::sync::Arc;

use enumflags2::{bitflags, BitFlags};

use crate::compress;
use crate::error::CodecError;
use crate::hash::NameHash;

/// Per-file compression, encoded the same way the on-disk `flags` field
/// does for file entries. `Directory` only ever appears set on directory
/// entries, never alongside these on a file, but it shares the bit space
/// because the wire format's flags word is common to both entry kinds.
#[bitflags]
#[repr(u16)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryFlag {
    Compressed = 0x01,
    Directory = 0x02,
    CompressedZstd = 0x04,
}

/// A read-only, shared handle back to the container a lazy file's bytes
/// still live in. Reads are forwarded through here rather than holding a
/// `&mut` reader per file, so many file nodes can share one source.
/// Implementors that want to expose a `ResourceLibrary` across threads
/// need only guard their own seek/read pair with a mutex, since the pair
/// is non-atomic and this trait does not attempt to hide that.
pub trait DataSource: fmt::Debug + Send + Sync {
    fn read_range(&self, offset: u64, len: u64) -> io::Result<Vec<u8>>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LazyKind {
    Uncompressed,
    Zlib,
    Zstd,
}

#[derive(Debug, Clone)]
enum FileBody {
    /// References bytes that still live in the container this node was
    /// read from. `data_offset`/`data_size` are relative to the data
    /// section, `data_size` includes the 4-byte length word.
    Lazy {
        source: Arc<dyn DataSource>,
        kind: LazyKind,
        data_offset: u32,
        data_size: u32,
    },
    /// A freshly materialized file (added via `add`), stored uncompressed
    /// unless the writer is asked to compress it.
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct File {
    name: String,
    name_hash: NameHash,
    body: FileBody,
}

impl File {
    pub(crate) fn lazy(
        name: impl Into<String>,
        name_hash: NameHash,
        source: Arc<dyn DataSource>,
        kind: LazyKind,
        data_offset: u32,
        data_size: u32,
    ) -> Self {
        File {
            name: name.into(),
            name_hash,
            body: FileBody::Lazy { source, kind, data_offset, data_size },
        }
    }

    pub fn from_bytes(name: impl Into<String>, payload: Vec<u8>) -> Self {
        let name = name.into();
        let name_hash = NameHash::of(&name);
        File { name, name_hash, body: FileBody::Bytes(payload) }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_hash(&self) -> NameHash {
        self.name_hash
    }

    /// Bytes needed in the data section, including the 4-byte length word.
    pub fn data_size(&self) -> u32 {
        match &self.body {
            FileBody::Lazy { data_size, .. } => *data_size,
            FileBody::Bytes(payload) => 4 + payload.len() as u32,
        }
    }

    pub fn compression(&self) -> BitFlags<EntryFlag> {
        match &self.body {
            FileBody::Lazy { kind: LazyKind::Uncompressed, .. } => BitFlags::empty(),
            FileBody::Lazy { kind: LazyKind::Zlib, .. } => EntryFlag::Compressed.into(),
            FileBody::Lazy { kind: LazyKind::Zstd, .. } => EntryFlag::CompressedZstd.into(),
            FileBody::Bytes(_) => BitFlags::empty(),
        }
    }

    /// The raw on-disk payload, without the outer 4-byte length word (the
    /// writer adds that back when it emits the data record).
    pub fn get_compressed(&self) -> Result<Vec<u8>, CodecError> {
        match &self.body {
            FileBody::Lazy { source, data_offset, data_size, .. } => {
                let body_len = (*data_size as u64) - 4;
                source
                    .read_range(*data_offset as u64 + 4, body_len)
                    .map_err(CodecError::Io)
            }
            FileBody::Bytes(payload) => Ok(payload.clone()),
        }
    }

    /// Decompressed file contents.
    pub fn read(&self) -> Result<Vec<u8>, CodecError> {
        let raw = self.get_compressed()?;
        match &self.body {
            FileBody::Lazy { kind: LazyKind::Zlib, .. } => compress::zlib_decompress(&raw),
            FileBody::Lazy { kind: LazyKind::Zstd, .. } => compress::zstd_decompress(&raw),
            FileBody::Lazy { kind: LazyKind::Uncompressed, .. } => Ok(raw),
            FileBody::Bytes(_) => Ok(raw),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Dir {
    name: String,
    name_hash: NameHash,
    children: Vec<Node>,
}

impl Dir {
    pub fn new(name: impl Into<String>, name_hash: NameHash) -> Self {
        Dir { name: name.into(), name_hash, children: Vec::new() }
    }

    pub fn root() -> Self {
        Dir::new(":", NameHash::ROOT)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn name_hash(&self) -> NameHash {
        self.name_hash
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn children_mut(&mut self) -> &mut [Node] {
        &mut self.children
    }

    fn binary_search(&self, hash: NameHash) -> Result<usize, usize> {
        self.children.binary_search_by_key(&hash, |n| n.name_hash())
    }

    pub fn find_child(&self, hash: NameHash) -> Option<&Node> {
        self.binary_search(hash).ok().map(|i| &self.children[i])
    }

    /// Appends a child in whatever order it arrives. Only valid while
    /// rebuilding a tree whose on-disk order is already ascending by hash
    /// (the reader's use case); using this for an edit would violate I1.
    pub(crate) fn append_child(&mut self, node: Node) {
        self.children.push(node);
    }

    /// Inserts `node` at its sorted position. If a child with the same
    /// hash already exists it is replaced and returned to the caller (who
    /// is then responsible for it, i.e. it is dropped unless kept).
    pub fn insert_child(&mut self, node: Node) -> Option<Node> {
        match self.binary_search(node.name_hash()) {
            Ok(i) => Some(std::mem::replace(&mut self.children[i], node)),
            Err(i) => {
                self.children.insert(i, node);
                None
            }
        }
    }

    /// Removes the child with the given hash, if present. Ordering among
    /// the remaining children is unaffected, so no resort is needed.
    pub fn remove_child(&mut self, hash: NameHash) -> Option<Node> {
        let idx = self.binary_search(hash).ok()?;
        Some(self.children.remove(idx))
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Dir(Dir),
    File(File),
}

impl Node {
    pub fn is_dir(&self) -> bool {
        matches!(self, Node::Dir(_))
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Dir(d) => d.name(),
            Node::File(f) => f.name(),
        }
    }

    pub fn name_hash(&self) -> NameHash {
        match self {
            Node::Dir(d) => d.name_hash(),
            Node::File(f) => f.name_hash(),
        }
    }

    pub fn as_dir(&self) -> Option<&Dir> {
        match self {
            Node::Dir(d) => Some(d),
            Node::File(_) => None,
        }
    }

    pub fn as_dir_mut(&mut self) -> Option<&mut Dir> {
        match self {
            Node::Dir(d) => Some(d),
            Node::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Node::File(f) => Some(f),
            Node::Dir(_) => None,
        }
    }
}
