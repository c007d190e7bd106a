//! Fixed-width header of the vocabulary package appended after the language model.
//!
//! Layout (little-endian, no padding):
//!
//! | offset | field     | type  |
//! |--------|-----------|-------|
//! | 0      | magic     | `i32` |
//! | 4      | version   | `i32` |
//! | 8      | utf8_mode | `u8`  |
//! | 9      | alpha     | `f64` |
//! | 17     | beta      | `f64` |
//!
//! The serialized vocabulary automaton follows at offset 25.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::opts::ScorerParams;

/// `'TRIE'` as a big-endian multi-character constant.
pub const MAGIC: i32 = i32::from_be_bytes(*b"TRIE");

/// Package format version this crate reads and writes.
pub const FILE_VERSION: i32 = 6;

/// Encoded size of [`PackageHeader`].
pub const HEADER_LEN: usize = 4 + 4 + 1 + 8 + 8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackageHeader {
    pub utf8_mode: bool,
    pub params: ScorerParams,
}

impl PackageHeader {
    pub fn new(utf8_mode: bool, params: ScorerParams) -> Self {
        Self { utf8_mode, params }
    }

    pub fn write_to<W: Write + ?Sized>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_i32::<LittleEndian>(MAGIC)?;
        w.write_i32::<LittleEndian>(FILE_VERSION)?;
        w.write_u8(u8::from(self.utf8_mode))?;
        w.write_f64::<LittleEndian>(self.params.alpha)?;
        w.write_f64::<LittleEndian>(self.params.beta)?;
        Ok(())
    }

    /// Read and validate a header. Magic is checked before version so a foreign file is never
    /// reported as a version problem.
    pub fn read_from<R: Read + ?Sized>(r: &mut R) -> Result<Self> {
        let truncated = |err: std::io::Error| Error::InvalidDictionary(format!("truncated package header: {err}"));

        let magic = r.read_i32::<LittleEndian>().map_err(truncated)?;
        if magic != MAGIC {
            return Err(Error::CorruptPackageHeader { magic });
        }

        let version = r.read_i32::<LittleEndian>().map_err(truncated)?;
        if version != FILE_VERSION {
            return Err(Error::VersionMismatch {
                found: version,
                expected: FILE_VERSION,
            });
        }

        let utf8_mode = r.read_u8().map_err(truncated)? != 0;
        let alpha = r.read_f64::<LittleEndian>().map_err(truncated)?;
        let beta = r.read_f64::<LittleEndian>().map_err(truncated)?;

        Ok(Self {
            utf8_mode,
            params: ScorerParams { alpha, beta },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> PackageHeader {
        PackageHeader::new(
            true,
            ScorerParams {
                alpha: 0.75,
                beta: 1.85,
            },
        )
    }

    #[test]
    fn writes_exact_field_widths() {
        let mut bytes = Vec::new();
        header().write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN);
        assert_eq!(&bytes[0..4], &MAGIC.to_le_bytes());
        assert_eq!(&bytes[4..8], &6i32.to_le_bytes());
        assert_eq!(bytes[8], 1);
        assert_eq!(&bytes[9..17], &0.75f64.to_le_bytes());
        assert_eq!(&bytes[17..25], &1.85f64.to_le_bytes());
    }

    #[test]
    fn reads_back_what_it_writes() {
        let mut bytes = Vec::new();
        header().write_to(&mut bytes).unwrap();
        let read = PackageHeader::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(read, header());
    }

    #[test]
    fn bad_magic_wins_over_bad_version() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&0x1234_5678i32.to_le_bytes());
        bytes.extend_from_slice(&99i32.to_le_bytes());
        assert!(matches!(
            PackageHeader::read_from(&mut bytes.as_slice()),
            Err(Error::CorruptPackageHeader { magic: 0x1234_5678 })
        ));
    }

    #[test]
    fn newer_version_is_rejected() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MAGIC.to_le_bytes());
        bytes.extend_from_slice(&(FILE_VERSION + 1).to_le_bytes());
        let err = PackageHeader::read_from(&mut bytes.as_slice()).unwrap_err();
        assert!(matches!(err, Error::VersionMismatch { found: 7, expected: 6 }));
        assert!(err.to_string().contains("Downgrade"));
    }

    #[test]
    fn short_header_is_reported() {
        let bytes = MAGIC.to_le_bytes();
        assert!(matches!(
            PackageHeader::read_from(&mut &bytes[..]),
            Err(Error::InvalidDictionary(_))
        ));
    }
}
