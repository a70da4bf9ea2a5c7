//! Whole-region scheme conversion
//!
//! Every present chunk is decoded, converted to the target scheme and
//! re-framed. Blocks are laid out contiguously in slot order straight after
//! the header, so the output never has gaps regardless of the input layout.

use std::collections::BTreeMap;
use std::io::Write;

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, info};

use super::header::{HeaderTable, LocationEntry, Slot};
use super::reader::ContainerReader;
use super::{
    index_to_coordinate, HEADER_SIZE, MAX_SECTOR_COUNT, MAX_SECTOR_OFFSET, SECTOR_SIZE, SLOT_COUNT,
};
use crate::chunk::{self, CompressionScheme};
use crate::config::{TranscodeConfig, DEFAULT_COMPRESSION_LEVEL};
use crate::error::{Error, Result};

/// Decode one stored block and re-frame its payload under `target`
fn convert_block(index: usize, block: &[u8], target: u8, level: u32) -> Result<Vec<u8>> {
    let (scheme, payload) = chunk::decode_block(block)?;
    let converted = chunk::transcode(scheme, payload, target, level)?;
    let encoded = chunk::encode_block(target, &converted)?;

    let (x, z) = index_to_coordinate(index);
    debug!(
        "Chunk ({}, {}): scheme {} -> {}, {} -> {} payload bytes",
        x,
        z,
        scheme,
        target,
        payload.len(),
        converted.len()
    );
    Ok(encoded)
}

/// Builds the output container one block at a time
///
/// The chunk-data buffer must stay sector aligned between appends; the
/// location of each block is derived from the buffer length at that point.
struct RegionAssembler {
    header: HeaderTable,
    data: Vec<u8>,
}

impl RegionAssembler {
    fn new() -> Self {
        RegionAssembler {
            header: HeaderTable::empty(),
            data: Vec::new(),
        }
    }

    fn check_aligned(&self) -> Result<()> {
        if self.data.len() % SECTOR_SIZE != 0 {
            return Err(Error::Internal(format!(
                "chunk data misaligned: {} bytes is not a multiple of {}",
                self.data.len(),
                SECTOR_SIZE
            )));
        }
        Ok(())
    }

    fn push_absent(&mut self, index: usize, timestamp: u32) {
        self.header.set(index, LocationEntry::ABSENT, timestamp);
    }

    fn push_block(&mut self, index: usize, block: Vec<u8>, timestamp: u32) -> Result<()> {
        self.check_aligned()?;

        let start = self.data.len();
        let sector_offset = (HEADER_SIZE + start) / SECTOR_SIZE;
        let sector_count = block.len() / SECTOR_SIZE;

        if sector_offset > MAX_SECTOR_OFFSET {
            return Err(Error::RegionTooLarge(sector_offset));
        }
        if sector_count > MAX_SECTOR_COUNT {
            let (x, z) = index_to_coordinate(index);
            return Err(Error::ChunkTooLarge {
                x,
                z,
                sectors: sector_count,
            });
        }

        self.data.extend_from_slice(&block);
        self.check_aligned()?;

        self.header.set(
            index,
            LocationEntry::new(sector_offset as u32, sector_count as u8),
            timestamp,
        );
        Ok(())
    }

    fn finish(self) -> Vec<u8> {
        let mut out = self.header.to_bytes();
        out.reserve(self.data.len());
        out.extend_from_slice(&self.data);
        out
    }
}

/// Converts every chunk of a region to one compression scheme
#[derive(Debug, Clone)]
pub struct RegionTranscoder {
    compression_level: u32,
}

impl Default for RegionTranscoder {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl RegionTranscoder {
    /// Create a transcoder using the given zlib level for compression
    pub fn new(compression_level: u32) -> Self {
        RegionTranscoder { compression_level }
    }

    /// Create a transcoder from the `transcode` config section
    pub fn from_config(config: &TranscodeConfig) -> Self {
        Self::new(config.compression_level)
    }

    /// Rewrite every chunk uncompressed (scheme 3)
    pub fn decompress<R: ContainerReader + ?Sized>(&self, reader: &mut R) -> Result<Vec<u8>> {
        self.transcode(reader, CompressionScheme::Raw)
    }

    /// Rewrite every chunk zlib-compressed (scheme 2)
    pub fn compress<R: ContainerReader + ?Sized>(&self, reader: &mut R) -> Result<Vec<u8>> {
        self.transcode(reader, CompressionScheme::Zlib)
    }

    /// Build a new container with every present chunk in `target`
    ///
    /// Any error aborts the whole conversion; no chunk is skipped.
    pub fn transcode<R: ContainerReader + ?Sized>(
        &self,
        reader: &mut R,
        target: CompressionScheme,
    ) -> Result<Vec<u8>> {
        let header = HeaderTable::parse(reader)?;
        let mut assembler = RegionAssembler::new();
        let mut converted = 0usize;

        for index in 0..SLOT_COUNT {
            match header.slot(index)? {
                Slot::Absent => assembler.push_absent(index, header.timestamp(index)),
                Slot::Present {
                    location,
                    timestamp,
                } => {
                    let block = reader.read_bytes(location.byte_offset(), location.byte_len())?;
                    let encoded =
                        convert_block(index, &block, target.id(), self.compression_level)?;
                    assembler.push_block(index, encoded, timestamp)?;
                    converted += 1;
                }
            }
        }

        let out = assembler.finish();
        info!(
            "Transcoded {} chunks to {}: {} -> {} bytes",
            converted,
            target,
            reader.len(),
            out.len()
        );
        Ok(out)
    }

    /// Transcode and write the finished container to `sink`
    ///
    /// Nothing reaches the sink unless the whole conversion succeeds.
    pub fn transcode_to<R, W>(
        &self,
        reader: &mut R,
        target: CompressionScheme,
        sink: &mut W,
    ) -> Result<u64>
    where
        R: ContainerReader + ?Sized,
        W: Write + ?Sized,
    {
        let out = self.transcode(reader, target)?;
        sink.write_all(&out)?;
        sink.flush()?;
        Ok(out.len() as u64)
    }

    /// Same output as [`transcode`](Self::transcode), with chunk conversion
    /// spread over up to `workers` blocking tasks
    ///
    /// Blocks are read sequentially, converted concurrently, and appended
    /// in slot order as results arrive in submission order.
    pub async fn transcode_concurrent<R: ContainerReader + ?Sized>(
        &self,
        reader: &mut R,
        target: CompressionScheme,
        workers: usize,
    ) -> Result<Vec<u8>> {
        let header = HeaderTable::parse(reader)?;

        let mut pending: Vec<(usize, u32, Bytes)> = Vec::with_capacity(header.present_count());
        for index in 0..SLOT_COUNT {
            if let Slot::Present {
                location,
                timestamp,
            } = header.slot(index)?
            {
                let block = reader.read_bytes(location.byte_offset(), location.byte_len())?;
                pending.push((index, timestamp, block));
            }
        }

        let chunk_count = pending.len();
        let level = self.compression_level;
        let target_id = target.id();

        let tasks = pending
            .into_iter()
            .map(move |(index, timestamp, block)| async move {
                let encoded = tokio::task::spawn_blocking(move || {
                    convert_block(index, &block, target_id, level)
                })
                .await
                .map_err(|e| Error::Internal(format!("transcode worker failed: {}", e)))??;
                Ok::<_, Error>((index, timestamp, encoded))
            });
        let mut results = stream::iter(tasks).buffered(workers.max(1));

        let mut assembler = RegionAssembler::new();
        while let Some(result) = results.next().await {
            let (index, timestamp, block) = result?;
            assembler.push_block(index, block, timestamp)?;
        }

        let out = assembler.finish();
        info!(
            "Transcoded {} chunks to {} with {} workers: {} -> {} bytes",
            chunk_count,
            target,
            workers.max(1),
            reader.len(),
            out.len()
        );
        Ok(out)
    }
}

/// Summary of a region's contents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegionStats {
    /// Container length in bytes
    pub container_len: u64,
    /// Slots holding a chunk
    pub present: usize,
    /// Empty slots
    pub absent: usize,
    /// Chunk count per scheme byte
    pub schemes: BTreeMap<u8, usize>,
    /// Sectors referenced by all location entries
    pub sectors: usize,
}

/// Parse the header and every block's framing without converting anything
pub fn inspect<R: ContainerReader + ?Sized>(reader: &mut R) -> Result<RegionStats> {
    let header = HeaderTable::parse(reader)?;
    let mut stats = RegionStats {
        container_len: reader.len(),
        ..Default::default()
    };

    for index in 0..SLOT_COUNT {
        match header.slot(index)? {
            Slot::Absent => stats.absent += 1,
            Slot::Present { location, .. } => {
                let block = reader.read_bytes(location.byte_offset(), location.byte_len())?;
                let (scheme, _) = chunk::decode_block(&block)?;
                *stats.schemes.entry(scheme).or_default() += 1;
                stats.present += 1;
                stats.sectors += location.sector_count as usize;
            }
        }
    }

    Ok(stats)
}
