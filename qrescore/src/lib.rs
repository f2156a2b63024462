//! Reader, writer and in-memory tree for the qres binary resource
//! container: a `.rcc`-shaped archive of compressed, named, hierarchical
//! resources with a big-endian wire format.

pub mod bin;
pub mod compress;
pub mod error;
pub mod facade;
pub mod hash;
pub mod node;
pub mod reader;
pub mod writer;

pub use crate::error::{CodecError, FacadeError, ReaderError, WriterError};
pub use crate::facade::{parse_path, ResourceLibrary};
pub use crate::hash::NameHash;
pub use crate::node::{Dir, EntryFlag, File, Node};
pub use crate::reader::{ContainerReader, Header, RawEntry, RawName};
pub use crate::writer::WriteOptions;
