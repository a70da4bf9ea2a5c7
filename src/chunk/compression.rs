//! Payload conversion between compression schemes

use std::borrow::Cow;
use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::{MAX_PAYLOAD_LEN, SCHEME_RAW, SCHEME_ZLIB};
use crate::error::{Error, Result};

/// Compress raw chunk data with zlib at the given level (0-9)
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(
        Vec::with_capacity(data.len() / 2),
        Compression::new(level),
    );
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Inflate a zlib stream
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::with_capacity(data.len() * 4);
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Decompression(e.to_string()))?;
    Ok(out)
}

/// Inflate a zlib stream, giving up once the output exceeds `limit` bytes
pub fn decompress_limited(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data).take(limit as u64 + 1);
    let mut out = Vec::with_capacity(data.len().saturating_mul(4).min(limit));
    decoder
        .read_to_end(&mut out)
        .map_err(|e| Error::Decompression(e.to_string()))?;

    if out.len() > limit {
        return Err(Error::PayloadTooLarge { limit });
    }
    Ok(out)
}

/// Convert a payload from scheme `from` to scheme `to`
///
/// Equal schemes pass the payload through untouched. Only zlib <-> raw is
/// defined; every other pair is `UnsupportedConversion`. Inflated payloads
/// larger than [`MAX_PAYLOAD_LEN`] are rejected as soon as they cross it.
pub fn transcode(from: u8, payload: &[u8], to: u8, level: u32) -> Result<Cow<'_, [u8]>> {
    match (from, to) {
        _ if from == to => Ok(Cow::Borrowed(payload)),
        (SCHEME_ZLIB, SCHEME_RAW) => decompress_limited(payload, MAX_PAYLOAD_LEN).map(Cow::Owned),
        (SCHEME_RAW, SCHEME_ZLIB) => compress(payload, level).map(Cow::Owned),
        _ => Err(Error::UnsupportedConversion { from, to }),
    }
}
