//! Parses a container and materializes its tree.
//!
//! The protocol is a short deterministic descent:
//! `Start → MagicChecked → HeaderRead → TreeWalking → Done`. Any
//! malformed read fails into a terminal error rather than panicking,
//! since the bytes are untrusted input. Lazy file bodies hold an
//! `Arc<dyn DataSource>` back to the reader's own byte source so multiple
//! file nodes can share one open container.

use std::fmt;
use std::io::{Read, Seek, SeekFrom};
use std::sync::{Arc, Mutex};

use enumflags2::BitFlags;
use tracing::{debug, trace};

use crate::bin::{read_u16, read_u32};
use crate::error::ReaderError;
use crate::node::{DataSource, Dir, EntryFlag, File, LazyKind, Node};

const MAGIC: &[u8; 4] = b"qres";

struct SourceHandle<R> {
    inner: Mutex<R>,
}

impl<R> fmt::Debug for SourceHandle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceHandle").finish_non_exhaustive()
    }
}

impl<R: Read + Seek + Send> DataSource for SourceHandle<R> {
    fn read_range(&self, offset: u64, len: u64) -> std::io::Result<Vec<u8>> {
        let mut guard = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        guard.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        guard.read_exact(&mut buf)?;
        Ok(buf)
    }
}

/// Section offsets and format version parsed from the header, kept around
/// so `qrescli`'s `header`/`entries`/`names` dump commands can print them
/// without re-deriving a tree.
#[derive(Debug, Clone, Copy)]
pub struct Header {
    pub version: u32,
    pub tree_offset: u32,
    pub data_offset: u32,
    pub names_offset: u32,
    pub overall_flags: u32,
}

/// One tree entry's raw on-disk fields, independent of whatever subtree it
/// materializes into. Exists purely so `qrescli`'s `entries` dump command
/// can walk the tree linearly without re-deriving a `Dir`.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub index: u32,
    pub name: String,
    pub name_hash: u32,
    pub name_offset: u32,
    pub flags: u16,
    pub is_dir: bool,
    /// `(first_child_index, child_count)` for directories.
    pub dir_payload: Option<(u32, u32)>,
    /// `data_offset` for files.
    pub file_data_offset: Option<u32>,
}

/// One names-table record, for `qrescli`'s `names` dump command.
#[derive(Debug, Clone)]
pub struct RawName {
    pub offset: u32,
    pub hash: u32,
    pub name: String,
}

pub struct ContainerReader<R> {
    source: Arc<SourceHandle<R>>,
    header: Header,
    tree_entry_size: u32,
    entries: std::cell::RefCell<Vec<RawEntry>>,
}

impl<R: Read + Seek + Send + 'static> ContainerReader<R> {
    /// Reads the header and materializes the whole tree.
    pub fn open(mut input: R) -> Result<(Self, Dir), ReaderError> {
        input.seek(SeekFrom::Start(0))?;
        let mut magic = [0u8; 4];
        input.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(ReaderError::NotAContainer);
        }

        let version = read_u32(&mut input)?;
        if !(1..=3).contains(&version) {
            return Err(ReaderError::UnsupportedVersion(version));
        }

        let tree_offset = read_u32(&mut input)?;
        let data_offset = read_u32(&mut input)?;
        let names_offset = read_u32(&mut input)?;
        let overall_flags = if version >= 3 { read_u32(&mut input)? } else { 0 };

        let tree_entry_size = 14 + if version >= 2 { 8 } else { 0 };
        debug!(version, tree_offset, data_offset, names_offset, overall_flags, "parsed header");

        let header = Header { version, tree_offset, data_offset, names_offset, overall_flags };
        let reader = ContainerReader {
            source: Arc::new(SourceHandle { inner: Mutex::new(input) }),
            header,
            tree_entry_size,
            entries: std::cell::RefCell::new(Vec::new()),
        };

        let mut root = Dir::root();
        reader.read_tree_children(&mut root, 0)?;
        Ok((reader, root))
    }

    pub fn header(&self) -> Header {
        self.header
    }

    /// Every tree entry in index order, for the `entries` dump command.
    pub fn entries(&self) -> Vec<RawEntry> {
        let mut entries = self.entries.borrow().clone();
        entries.sort_by_key(|e| e.index);
        entries
    }

    /// Every names-table record, walked sequentially front to back, for
    /// the `names` dump command.
    pub fn names(&self) -> Result<Vec<RawName>, ReaderError> {
        let names_size = self.header.tree_offset.saturating_sub(self.header.names_offset);
        let mut out = Vec::new();
        let mut offset = 0u32;
        while offset < names_size {
            let (name, hash, length) = self.read_name(offset)?;
            let record_len = 2 + 4 + 2 * length as u32;
            out.push(RawName { offset, hash, name });
            offset += record_len;
        }
        Ok(out)
    }

    fn entry_offset(&self, index: u32) -> u64 {
        self.header.tree_offset as u64 + index as u64 * self.tree_entry_size as u64
    }

    /// Returns the decoded name, its stored hash, and its on-disk length in
    /// UTF-16 code units. Callers stepping through the names section must
    /// use that stored length rather than re-measuring the decoded string,
    /// since lossy decoding of an unpaired surrogate can change the code
    /// unit count and desync the walk.
    fn read_name(&self, name_offset: u32) -> Result<(String, u32, u16), ReaderError> {
        let names_size = self.header.tree_offset.saturating_sub(self.header.names_offset);
        if name_offset >= names_size {
            return Err(ReaderError::TruncatedSection(format!(
                "name offset {name_offset} outside names section of size {names_size}"
            )));
        }
        let abs = self.header.names_offset as u64 + name_offset as u64;
        let header_bytes = self.source.read_range(abs, 6)?;
        let mut cur = std::io::Cursor::new(&header_bytes[..]);
        let length = read_u16(&mut cur)?;
        let hash = read_u32(&mut cur)?;

        let code_unit_bytes = self.source.read_range(abs + 6, length as u64 * 2)?;
        let mut cur = std::io::Cursor::new(&code_unit_bytes[..]);
        let mut units = Vec::with_capacity(length as usize);
        for _ in 0..length {
            units.push(read_u16(&mut cur)?);
        }
        let name = String::from_utf16_lossy(&units);
        Ok((name, hash, length))
    }

    fn read_tree_children(&self, parent: &mut Dir, entry_index: u32) -> Result<(), ReaderError> {
        let offset = self.entry_offset(entry_index);
        let fields = self.source.read_range(offset, 14)?;
        let name_offset = u32::from_be_bytes(fields[0..4].try_into().unwrap());
        let flags = u16::from_be_bytes(fields[4..6].try_into().unwrap());
        if flags & (EntryFlag::Directory as u16) == 0 {
            return Err(ReaderError::TruncatedSection(format!(
                "entry {entry_index} expected to be a directory"
            )));
        }

        let child_count = u32::from_be_bytes(fields[6..10].try_into().unwrap());
        let first_child = u32::from_be_bytes(fields[10..14].try_into().unwrap());

        if entry_index == 0 {
            let (name, hash, _length) = self.read_name(name_offset)?;
            self.entries.borrow_mut().push(RawEntry {
                index: 0,
                name,
                name_hash: hash,
                name_offset,
                flags,
                is_dir: true,
                dir_payload: Some((first_child, child_count)),
                file_data_offset: None,
            });
        }

        for k in 0..child_count {
            let child = self.read_entry(first_child + k)?;
            parent.append_child(child);
        }
        Ok(())
    }

    fn read_entry(&self, entry_index: u32) -> Result<Node, ReaderError> {
        let offset = self.entry_offset(entry_index);
        let fields = self.source.read_range(offset, 14)?;
        let name_offset = u32::from_be_bytes(fields[0..4].try_into().unwrap());
        let flags = u16::from_be_bytes(fields[4..6].try_into().unwrap());
        let (name, hash, _length) = self.read_name(name_offset)?;
        let name_hash = crate::hash::NameHash::from_raw(hash);

        if flags & (EntryFlag::Directory as u16) != 0 {
            let mut dir = Dir::new(name.clone(), name_hash);
            let child_count = u32::from_be_bytes(fields[6..10].try_into().unwrap());
            let first_child = u32::from_be_bytes(fields[10..14].try_into().unwrap());
            self.entries.borrow_mut().push(RawEntry {
                index: entry_index,
                name,
                name_hash: hash,
                name_offset,
                flags,
                is_dir: true,
                dir_payload: Some((first_child, child_count)),
                file_data_offset: None,
            });
            self.read_tree_children(&mut dir, entry_index)?;
            Ok(Node::Dir(dir))
        } else {
            // file payload: language(2) territory(2) data_offset(4), at entry+6
            let data_offset = u32::from_be_bytes(fields[10..14].try_into().unwrap());

            let data_section_size =
                self.header.names_offset.saturating_sub(self.header.data_offset);
            if data_offset >= data_section_size {
                return Err(ReaderError::TruncatedSection(format!(
                    "file data offset {data_offset} outside data section of size {data_section_size}"
                )));
            }
            let abs_data = self.header.data_offset as u64 + data_offset as u64;
            let len_bytes = self.source.read_range(abs_data, 4)?;
            let length = u32::from_be_bytes(len_bytes.try_into().unwrap());
            let data_size = 4 + length;

            let bits = BitFlags::<EntryFlag>::from_bits_truncate(flags);
            let kind = if bits.contains(EntryFlag::Compressed) {
                LazyKind::Zlib
            } else if bits.contains(EntryFlag::CompressedZstd) {
                LazyKind::Zstd
            } else {
                LazyKind::Uncompressed
            };
            trace!(%name, data_offset, data_size, ?kind, "read file entry");

            self.entries.borrow_mut().push(RawEntry {
                index: entry_index,
                name: name.clone(),
                name_hash: hash,
                name_offset,
                flags,
                is_dir: false,
                dir_payload: None,
                file_data_offset: Some(data_offset),
            });

            Ok(Node::File(File::lazy(
                name,
                name_hash,
                self.source.clone(),
                kind,
                data_offset,
                data_size,
            )))
        }
    }
}
