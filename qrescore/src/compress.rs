//! zlib and zstd adapters for file bodies.
//!
//! Each codec is a pair of free functions that are each other's inverse.
//! zlib bodies carry the host framework's 4-byte big-endian
//! uncompressed-length prefix ahead of the raw zlib stream; there is no
//! plain LZ4 adapter since this format never uses it, zstd takes its
//! place.

use std::io::{Cursor, Read, Write};

use libflate::zlib;
use tracing::trace;

use crate::bin::{read_u32, write_u32};
use crate::error::CodecError;

/// Heuristic check level: cheap trial compression used only to decide
/// whether compressing is worth it (Qt's `rcc.cpp` `CONSTANT_ZSTDCOMPRESSLEVEL_CHECK`).
const ZSTD_LEVEL_CHECK: i32 = 1;
/// Level used to actually store the data once the trial says it's worth it
/// (`CONSTANT_ZSTDCOMPRESSLEVEL_STORE`). Levels above 19 are experimental in
/// zstd and are never used here.
const ZSTD_LEVEL_STORE: i32 = 14;

/// Percentage size reduction a compressed body must clear to be kept,
/// matching Qt's rcc default compression threshold.
pub const DEFAULT_COMPRESS_THRESHOLD: u8 = 70;

/// Compress `data` with zlib at the given level, returning the host
/// framework's wire format: a 4-byte big-endian uncompressed length
/// followed by the raw zlib stream.
pub fn zlib_compress(data: &[u8], level: zlib::CompressionLevel) -> Result<Vec<u8>, CodecError> {
    let mut body = Vec::new();
    write_u32(&mut body, data.len() as u32).map_err(CodecError::Zlib)?;

    let options = zlib::EncodeOptions::new().compression_level(level);
    let mut encoder = zlib::Encoder::with_options(&mut body, options).map_err(CodecError::Zlib)?;
    encoder.write_all(data).map_err(CodecError::Zlib)?;
    encoder.finish().into_result().map_err(CodecError::Zlib)?;

    trace!(input = data.len(), output = body.len(), "zlib compressed");
    Ok(body)
}

/// Decompress a zlib body in the host framework's wire format: consumes
/// the 4-byte length prefix (used only for allocation sizing) then
/// inflates the raw zlib stream that follows.
pub fn zlib_decompress(body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut cursor = Cursor::new(body);
    let uncompressed_len = read_u32(&mut cursor).map_err(CodecError::Zlib)? as usize;

    let mut decoder = zlib::Decoder::new(&mut cursor).map_err(CodecError::Zlib)?;
    let mut out = Vec::with_capacity(uncompressed_len);
    decoder.read_to_end(&mut out).map_err(CodecError::Zlib)?;
    Ok(out)
}

/// Compress `data` as a raw zstd frame using the cheap-trial / recompress
/// heuristic from Qt's `rcc.cpp`: try level 1, and if the result shrinks
/// the data below `threshold` percent of its original size, recompress at
/// level 14 for the final body. Returns `None` when compression wasn't
/// worth it (caller stores the file uncompressed instead).
pub fn zstd_compress_if_worthwhile(
    data: &[u8],
    threshold: u8,
) -> Result<Option<Vec<u8>>, CodecError> {
    if data.is_empty() {
        return Ok(None);
    }
    let trial = zstd::bulk::compress(data, ZSTD_LEVEL_CHECK).map_err(CodecError::Zstd)?;

    let worthwhile = (trial.len() as f64) * 100.0 < (data.len() as f64) * (100 - threshold) as f64;
    if !worthwhile {
        trace!(input = data.len(), trial = trial.len(), threshold, "zstd skipped, below threshold");
        return Ok(None);
    }

    let stored = zstd::bulk::compress(data, ZSTD_LEVEL_STORE).map_err(CodecError::Zstd)?;
    trace!(input = data.len(), output = stored.len(), "zstd compressed");
    Ok(Some(stored))
}

/// Decompress a raw zstd frame. Uses the frame header's content size to
/// preallocate the output buffer, failing if the size can't be determined
/// (matches Qt's behavior of treating an unknown content size as an
/// error).
pub fn zstd_decompress(body: &[u8]) -> Result<Vec<u8>, CodecError> {
    let content_size = zstd::zstd_safe::get_frame_content_size(body)
        .ok()
        .flatten()
        .ok_or(CodecError::ZstdUnknownSize)? as usize;
    zstd::bulk::decompress(body, content_size).map_err(CodecError::Zstd)
}
