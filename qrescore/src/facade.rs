//! High-level read/write operations over a materialized tree.
//!
//! Path parsing strips a leading `:/` and splits on `/` discarding empty
//! segments, descent resolves one path segment at a time via hash lookup,
//! and `rm`/`mv`/`add` all resolve to a *parent* directory first and
//! mutate its child list rather than editing a node in place.

use std::path::Path;

use crate::bin::ByteSource;
use crate::error::{FacadeError, ReaderError};
use crate::hash::NameHash;
use crate::node::{Dir, File, Node};
use crate::reader::{ContainerReader, Header};
use crate::writer;

/// Splits a host-style or `:/`-prefixed container path into segments,
/// discarding empty ones (so `a//b`, a leading `/`, and a trailing `/`
/// are all forgiving the same way the original CLI is).
pub fn parse_path(path: &str) -> Vec<String> {
    let path = path.strip_prefix(":/").unwrap_or(path);
    path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect()
}

enum Resolved<'a> {
    Dir(&'a Dir),
    File(&'a File),
}

/// Descends from `root` through directories named by `path`, classifying
/// whatever sits at the end. An empty path resolves to `root` itself.
fn resolve<'a>(root: &'a Dir, path: &[String]) -> Result<Resolved<'a>, FacadeError> {
    let mut dir = root;
    for (i, segment) in path.iter().enumerate() {
        let child = dir
            .find_child(NameHash::of(segment))
            .ok_or_else(|| FacadeError::EntryNotFound(segment.clone()))?;
        if i == path.len() - 1 {
            return Ok(match child {
                Node::Dir(d) => Resolved::Dir(d),
                Node::File(f) => Resolved::File(f),
            });
        }
        dir = child.as_dir().ok_or_else(|| FacadeError::GotFileInsteadOfDir(segment.clone()))?;
    }
    Ok(Resolved::Dir(root))
}

/// Descends through directories only, for callers that already hold the
/// name of the final segment separately (`rm`/`mv`/`add` all resolve to
/// the *parent* directory and mutate its child list).
fn resolve_dir_mut<'a>(root: &'a mut Dir, path: &[String]) -> Result<&'a mut Dir, FacadeError> {
    let mut dir = root;
    for segment in path {
        let hash = NameHash::of(segment);
        let idx = dir
            .children()
            .binary_search_by_key(&hash, |n| n.name_hash())
            .map_err(|_| FacadeError::EntryNotFound(segment.clone()))?;
        dir = dir.children_mut()[idx]
            .as_dir_mut()
            .ok_or_else(|| FacadeError::GotFileInsteadOfDir(segment.clone()))?;
    }
    Ok(dir)
}

pub struct ResourceLibrary<R = std::fs::File> {
    root: Dir,
    reader: Option<ContainerReader<R>>,
}

impl ResourceLibrary<std::fs::File> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReaderError> {
        let file = std::fs::File::open(path)?;
        Self::from_source(file)
    }
}

impl<R: ByteSource + Send + 'static> ResourceLibrary<R> {
    pub fn from_source(input: R) -> Result<Self, ReaderError> {
        let (reader, root) = ContainerReader::open(input)?;
        Ok(ResourceLibrary { root, reader: Some(reader) })
    }

    pub fn header(&self) -> Option<Header> {
        self.reader.as_ref().map(|r| r.header())
    }

    /// Raw tree entries in index order, for the `entries` dump command.
    /// `None` for a library built with [`Self::empty`] (nothing was read).
    pub fn entries(&self) -> Option<Vec<crate::reader::RawEntry>> {
        self.reader.as_ref().map(|r| r.entries())
    }

    /// Raw names-table records, for the `names` dump command.
    pub fn names(&self) -> Option<Result<Vec<crate::reader::RawName>, ReaderError>> {
        self.reader.as_ref().map(|r| r.names())
    }

    /// An empty library with nothing but the root directory, for building
    /// a container from scratch.
    pub fn empty() -> Self {
        ResourceLibrary { root: Dir::root(), reader: None }
    }

    pub fn root(&self) -> &Dir {
        &self.root
    }

    pub fn print_tree(&self, out: &mut impl std::fmt::Write) -> std::fmt::Result {
        writeln!(out, "{}", self.root.name())?;
        print_dir_tree(&self.root, out, "")
    }

    pub fn ls(&self, path: &str) -> Result<Vec<String>, FacadeError> {
        match resolve(&self.root, &parse_path(path))? {
            Resolved::Dir(dir) => Ok(dir
                .children()
                .iter()
                .map(|n| {
                    let mut name = n.name().to_string();
                    if n.is_dir() {
                        name.push('/');
                    }
                    name
                })
                .collect()),
            Resolved::File(_) => Err(FacadeError::GotFileInsteadOfDir(path.to_string())),
        }
    }

    pub fn cat(&self, path: &str) -> Result<Vec<u8>, FacadeError> {
        match resolve(&self.root, &parse_path(path))? {
            Resolved::File(file) => Ok(file.read()?),
            Resolved::Dir(_) => Err(FacadeError::GotDirInsteadOfFile(path.to_string())),
        }
    }

    pub fn rm(&mut self, path: &str) -> Result<(), FacadeError> {
        let mut segments = parse_path(path);
        let name = segments.pop().ok_or_else(|| FacadeError::EntryNotFound(path.to_string()))?;
        let parent = resolve_dir_mut(&mut self.root, &segments)?;
        parent
            .remove_child(NameHash::of(&name))
            .map(|_| ())
            .ok_or_else(|| FacadeError::EntryNotFound(path.to_string()))
    }

    pub fn mv(&mut self, source: &str, dest: &str) -> Result<(), FacadeError> {
        let mut source_segments = parse_path(source);
        let name = source_segments
            .pop()
            .ok_or_else(|| FacadeError::EntryNotFound(source.to_string()))?;

        let src_dir = resolve_dir_mut(&mut self.root, &source_segments)?;
        let child = src_dir
            .remove_child(NameHash::of(&name))
            .ok_or_else(|| FacadeError::EntryNotFound(source.to_string()))?;

        let dest_segments = parse_path(dest);
        let dest_dir = match resolve_dir_mut(&mut self.root, &dest_segments) {
            Ok(dir) => dir,
            Err(err) => {
                // put it back where it came from, the move never happened
                if let Ok(src_dir) = resolve_dir_mut(&mut self.root, &source_segments) {
                    src_dir.insert_child(child);
                }
                return Err(err);
            }
        };
        dest_dir.insert_child(child);
        Ok(())
    }

    pub fn add(&mut self, name: &str, dest: &str, payload: Vec<u8>) -> Result<(), FacadeError> {
        let dest_segments = parse_path(dest);
        let dest_dir = resolve_dir_mut(&mut self.root, &dest_segments)?;
        dest_dir.insert_child(Node::File(File::from_bytes(name, payload)));
        Ok(())
    }

    pub fn save(&self, out: &mut impl std::io::Write, version: u32) -> Result<(), FacadeError> {
        writer::write_container(out, &self.root, version)?;
        Ok(())
    }
}

fn print_dir_tree(dir: &Dir, out: &mut impl std::fmt::Write, prefix: &str) -> std::fmt::Result {
    let children = dir.children();
    for (i, node) in children.iter().enumerate() {
        let last = i == children.len() - 1;
        let branch = if last { "└── " } else { "├── " };
        write!(out, "{prefix}{branch}{}", node.name())?;
        match node {
            Node::Dir(child) => {
                writeln!(out)?;
                let child_prefix = format!("{prefix}{}", if last { "    " } else { "│   " });
                print_dir_tree(child, out, &child_prefix)?;
            }
            Node::File(file) => {
                use crate::node::EntryFlag;
                let bits = file.compression();
                if bits.contains(EntryFlag::Compressed) {
                    write!(out, " -zlib")?;
                }
                if bits.contains(EntryFlag::CompressedZstd) {
                    write!(out, " -zstd")?;
                }
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_path_strips_prefix_and_empties() {
        assert_eq!(parse_path(":/a/b"), vec!["a", "b"]);
        assert_eq!(parse_path("a//b/"), vec!["a", "b"]);
        assert_eq!(parse_path(""), Vec::<String>::new());
    }

    #[test]
    fn add_then_cat_round_trips() {
        let mut lib = ResourceLibrary::<std::fs::File>::empty();
        lib.add("greeting.txt", ":/", b"hello".to_vec()).unwrap();
        assert_eq!(lib.cat("greeting.txt").unwrap(), b"hello");
        assert_eq!(lib.ls(":/").unwrap(), vec!["greeting.txt".to_string()]);
    }

    #[test]
    fn rm_removes_and_cat_then_fails() {
        let mut lib = ResourceLibrary::<std::fs::File>::empty();
        lib.add("a.txt", ":/", b"a".to_vec()).unwrap();
        lib.rm("a.txt").unwrap();
        assert!(matches!(lib.cat("a.txt"), Err(FacadeError::EntryNotFound(_))));
    }

    #[test]
    fn mv_relocates_into_another_directory_keeping_its_name() {
        let mut lib = ResourceLibrary::<std::fs::File>::empty();
        lib.root.insert_child(Node::Dir(Dir::new("sub", NameHash::of("sub"))));
        lib.add("a.txt", ":/", b"a".to_vec()).unwrap();

        lib.mv("a.txt", "sub").unwrap();

        assert!(matches!(lib.cat("a.txt"), Err(FacadeError::EntryNotFound(_))));
        assert_eq!(lib.cat("sub/a.txt").unwrap(), b"a");
    }

    #[test]
    fn mv_into_missing_dest_restores_source() {
        let mut lib = ResourceLibrary::<std::fs::File>::empty();
        lib.add("a.txt", ":/", b"a".to_vec()).unwrap();
        let result = lib.mv("a.txt", "missing/b.txt");
        assert!(result.is_err());
        assert_eq!(lib.cat("a.txt").unwrap(), b"a");
    }
}
