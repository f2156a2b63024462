//! Error taxonomy. Each stage of the pipeline gets its own
//! `thiserror::Error` enum rather than a single catch-all type, so a
//! caller matching on `ReaderError::UnsupportedVersion` isn't forced to
//! also handle writer- or facade-only variants.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("zlib compression failed")]
    Zlib(#[source] std::io::Error),
    #[error("zstd compression failed")]
    Zstd(#[source] std::io::Error),
    #[error("could not determine zstd frame content size")]
    ZstdUnknownSize,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ReaderError {
    #[error("not a qres container")]
    NotAContainer,
    #[error("unsupported container version {0}")]
    UnsupportedVersion(u32),
    #[error("truncated section: {0}")]
    TruncatedSection(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("entry not found: {0}")]
    EntryNotFound(String),
    #[error("expected a directory but found a file: {0}")]
    GotFileInsteadOfDir(String),
    #[error("expected a file but found a directory: {0}")]
    GotDirInsteadOfFile(String),
    #[error(transparent)]
    Reader(#[from] ReaderError),
    #[error(transparent)]
    Writer(#[from] WriterError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
