//! Chunk block codec
//!
//! Handles the framing of a single chunk block (length, scheme byte,
//! payload, zero padding) and conversion of payloads between schemes.

mod compression;

pub use compression::{compress, decompress, decompress_limited, transcode};

use std::fmt;

use crate::error::{Error, Result};
use crate::region::{align_up, MAX_SECTOR_COUNT, SECTOR_SIZE};

/// Scheme byte for zlib-compressed payloads
pub const SCHEME_ZLIB: u8 = 2;

/// Scheme byte for uncompressed payloads
pub const SCHEME_RAW: u8 = 3;

/// Length field plus scheme byte
pub const BLOCK_HEADER_SIZE: usize = 5;

/// Largest payload whose block still fits in a location entry's sector count
pub const MAX_PAYLOAD_LEN: usize = MAX_SECTOR_COUNT * SECTOR_SIZE - BLOCK_HEADER_SIZE;

/// Target schemes a region can be converted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionScheme {
    /// zlib (scheme 2)
    Zlib,
    /// Uncompressed (scheme 3)
    Raw,
}

impl CompressionScheme {
    /// On-disk scheme byte
    pub fn id(self) -> u8 {
        match self {
            CompressionScheme::Zlib => SCHEME_ZLIB,
            CompressionScheme::Raw => SCHEME_RAW,
        }
    }
}

impl TryFrom<u8> for CompressionScheme {
    type Error = Error;

    fn try_from(id: u8) -> Result<Self> {
        match id {
            SCHEME_ZLIB => Ok(CompressionScheme::Zlib),
            SCHEME_RAW => Ok(CompressionScheme::Raw),
            other => Err(Error::UnknownScheme(other)),
        }
    }
}

impl fmt::Display for CompressionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompressionScheme::Zlib => write!(f, "zlib"),
            CompressionScheme::Raw => write!(f, "raw"),
        }
    }
}

/// Split a block into its scheme byte and payload
///
/// The payload is `block[5 .. 4 + length]`; anything after it is padding.
pub fn decode_block(block: &[u8]) -> Result<(u8, &[u8])> {
    if block.len() < BLOCK_HEADER_SIZE {
        return Err(Error::TruncatedBlock {
            declared: 0,
            available: block.len(),
        });
    }

    let length = u32::from_be_bytes([block[0], block[1], block[2], block[3]]);
    // length counts the scheme byte, so zero cannot describe a valid block
    let end = 4usize.saturating_add(length as usize);
    if length == 0 || block.len() < end {
        return Err(Error::TruncatedBlock {
            declared: length,
            available: block.len(),
        });
    }

    Ok((block[4], &block[BLOCK_HEADER_SIZE..end]))
}

/// Value of the length field for a payload of `payload_len` bytes
fn frame_length(payload_len: usize) -> Result<u32> {
    u32::try_from(payload_len)
        .ok()
        .and_then(|len| len.checked_add(1))
        .ok_or(Error::PayloadTooLarge {
            limit: u32::MAX as usize - 1,
        })
}

/// Frame a payload as a sector-aligned block
pub fn encode_block(scheme: u8, payload: &[u8]) -> Result<Vec<u8>> {
    let length = frame_length(payload.len())?;
    let size = align_up(BLOCK_HEADER_SIZE + payload.len());
    let mut block = Vec::with_capacity(size);
    block.extend_from_slice(&length.to_be_bytes());
    block.push(scheme);
    block.extend_from_slice(payload);
    block.resize(size, 0);
    debug_assert!(block.len() >= SECTOR_SIZE && block.len() % SECTOR_SIZE == 0);
    Ok(block)
}
