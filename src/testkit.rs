//! Region fixtures shared by unit tests

use crate::chunk::{decode_block, encode_block};
use crate::region::{HeaderTable, LocationEntry, Slot, HEADER_SIZE, SECTOR_SIZE};

/// A chunk to place in a fixture region
pub struct FixtureChunk {
    pub index: usize,
    pub sector_offset: u32,
    pub scheme: u8,
    pub payload: Vec<u8>,
    pub timestamp: u32,
}

impl FixtureChunk {
    pub fn new(index: usize, sector_offset: u32, scheme: u8, payload: impl Into<Vec<u8>>) -> Self {
        FixtureChunk {
            index,
            sector_offset,
            scheme,
            payload: payload.into(),
            timestamp: 1,
        }
    }

    pub fn at_time(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Lay out blocks at the given sector offsets, leaving gaps where asked
pub fn build_region(chunks: &[FixtureChunk]) -> Vec<u8> {
    let mut header = HeaderTable::empty();
    let mut data = vec![0u8; HEADER_SIZE];

    for chunk in chunks {
        let block = encode_block(chunk.scheme, &chunk.payload).unwrap();
        let start = chunk.sector_offset as usize * SECTOR_SIZE;
        if data.len() < start + block.len() {
            data.resize(start + block.len(), 0);
        }
        data[start..start + block.len()].copy_from_slice(&block);
        header.set(
            chunk.index,
            LocationEntry::new(chunk.sector_offset, (block.len() / SECTOR_SIZE) as u8),
            chunk.timestamp,
        );
    }

    data[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    data
}

/// Scheme and payload stored for a slot, if any
pub fn read_chunk(container: &[u8], index: usize) -> Option<(u8, Vec<u8>)> {
    let header = HeaderTable::from_bytes(container).unwrap();
    match header.slot(index).unwrap() {
        Slot::Absent => None,
        Slot::Present { location, .. } => {
            let start = location.byte_offset() as usize;
            let block = &container[start..start + location.byte_len()];
            let (scheme, payload) = decode_block(block).unwrap();
            Some((scheme, payload.to_vec()))
        }
    }
}
