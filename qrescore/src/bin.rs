//! Big-endian scalar read/write over a seekable byte stream.
//!
//! The container format is big-endian end to end, unlike the native-endian
//! `Pod` overlay a fixed-size-struct codec would give you, so this module
//! reads and writes each scalar byte by byte instead of transmuting a
//! `#[repr(C)]` struct over the wire bytes.

use std::io::{self, Read, Seek, SeekFrom, Write};

pub trait ByteSource: Read + Seek {
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        Ok(())
    }
}
impl<T: Read + Seek> ByteSource for T {}

pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

pub fn read_u16<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

pub fn read_u32<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Reads a big-endian `u64`. The shifts are 56/48/40/32/24/16/8/0. The
/// `lilrcc` source this format comes from has a reader that shifts the top
/// byte by 54 instead of 56, corrupting every 8-byte field it reads. We
/// don't reproduce that bug; see `u64_round_trip` below.
pub fn read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

pub fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

pub fn write_u16<W: Write>(w: &mut W, v: u16) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

pub fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

pub fn write_u64<W: Write>(w: &mut W, v: u64) -> io::Result<()> {
    w.write_all(&v.to_be_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn u64_round_trip() {
        for v in [0u64, 1, u64::MAX, 0x0102_0304_0506_0708, 0xff00_ff00_ff00_ff00] {
            let mut buf = Cursor::new(Vec::new());
            write_u64(&mut buf, v).unwrap();
            let mut input = Cursor::new(buf.into_inner());
            assert_eq!(read_u64(&mut input).unwrap(), v);
        }
    }

    #[test]
    fn u64_is_big_endian() {
        let mut buf = Cursor::new(Vec::new());
        write_u64(&mut buf, 0x0102_0304_0506_0708).unwrap();
        assert_eq!(
            buf.into_inner(),
            vec![0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );
    }

    #[test]
    fn u32_round_trip() {
        for v in [0u32, 1, u32::MAX, 0x1020_3040] {
            let mut buf = Cursor::new(Vec::new());
            write_u32(&mut buf, v).unwrap();
            let mut input = Cursor::new(buf.into_inner());
            assert_eq!(read_u32(&mut input).unwrap(), v);
        }
    }

    #[test]
    fn u16_round_trip() {
        for v in [0u16, 1, u16::MAX, 0x1020] {
            let mut buf = Cursor::new(Vec::new());
            write_u16(&mut buf, v).unwrap();
            let mut input = Cursor::new(buf.into_inner());
            assert_eq!(read_u16(&mut input).unwrap(), v);
        }
    }
}
