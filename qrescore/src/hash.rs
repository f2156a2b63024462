//! The name hash used to order siblings and to key the names table.
//!
//! `qt_hash` is a single rolling hash over UTF-16 code units:
//! `h = 31*h + c`, wrapping in `u32`. It is a fixed contract of the host
//! framework. Children are kept sorted by this value so binary search
//! works, and the value itself is stored in the names table, so the
//! formula cannot be swapped for anything "better" without breaking
//! on-disk compatibility.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NameHash(u32);

impl NameHash {
    pub const ROOT: NameHash = NameHash(0);

    pub fn of<S: AsRef<str>>(name: S) -> Self {
        let h = name
            .as_ref()
            .encode_utf16()
            .fold(0u32, |h, c| h.wrapping_mul(31).wrapping_add(c as u32));
        NameHash(h)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    pub fn from_raw(raw: u32) -> Self {
        NameHash(raw)
    }
}

impl fmt::Display for NameHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}
