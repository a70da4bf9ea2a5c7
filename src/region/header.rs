//! Region header tables
//!
//! The first sector holds 1024 location entries (3-byte sector offset,
//! 1-byte sector count), the second holds 1024 big-endian timestamps.
//! Both are ordered by slot index.

use tracing::debug;

use super::reader::ContainerReader;
use super::{index_to_coordinate, ENTRY_SIZE, HEADER_SIZE, SECTOR_SIZE, SLOT_COUNT};
use crate::error::{Error, Result};

/// Where a chunk's block lives, in sectors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LocationEntry {
    /// Sector index of the block start (24 bits on disk)
    pub sector_offset: u32,
    /// Number of sectors the block spans
    pub sector_count: u8,
}

impl LocationEntry {
    /// The all-zero entry used for absent chunks
    pub const ABSENT: LocationEntry = LocationEntry {
        sector_offset: 0,
        sector_count: 0,
    };

    /// Entry for a block starting at `sector_offset` spanning `sector_count` sectors
    pub fn new(sector_offset: u32, sector_count: u8) -> Self {
        LocationEntry {
            sector_offset,
            sector_count,
        }
    }

    fn from_bytes(bytes: [u8; 4]) -> Self {
        LocationEntry {
            sector_offset: u32::from_be_bytes([0, bytes[0], bytes[1], bytes[2]]),
            sector_count: bytes[3],
        }
    }

    fn to_bytes(self) -> [u8; 4] {
        let offset = self.sector_offset.to_be_bytes();
        [offset[1], offset[2], offset[3], self.sector_count]
    }

    pub fn is_absent(&self) -> bool {
        self.sector_offset == 0 && self.sector_count == 0
    }

    /// Byte offset of the block within the container
    pub fn byte_offset(&self) -> u64 {
        self.sector_offset as u64 * SECTOR_SIZE as u64
    }

    /// Byte length of the block within the container
    pub fn byte_len(&self) -> usize {
        self.sector_count as usize * SECTOR_SIZE
    }
}

/// Validated state of a single header slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Offset, count and timestamp are all zero
    Absent,
    /// Offset, count and timestamp are all nonzero
    Present {
        location: LocationEntry,
        timestamp: u32,
    },
}

impl Slot {
    /// Classify a raw triple; any mix of zero and nonzero is corrupt
    pub fn classify(index: usize, location: LocationEntry, timestamp: u32) -> Result<Self> {
        let fields = [
            location.sector_offset != 0,
            location.sector_count != 0,
            timestamp != 0,
        ];

        if fields.iter().all(|set| *set) {
            Ok(Slot::Present {
                location,
                timestamp,
            })
        } else if fields.iter().all(|set| !*set) {
            Ok(Slot::Absent)
        } else {
            let (x, z) = index_to_coordinate(index);
            Err(Error::CorruptHeader {
                x,
                z,
                offset: location.sector_offset,
                sectors: location.sector_count,
                timestamp,
            })
        }
    }
}

/// Location and timestamp tables for all 1024 slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderTable {
    locations: Vec<LocationEntry>,
    timestamps: Vec<u32>,
}

impl Default for HeaderTable {
    fn default() -> Self {
        Self::empty()
    }
}

impl HeaderTable {
    /// A header with every slot absent
    pub fn empty() -> Self {
        HeaderTable {
            locations: vec![LocationEntry::ABSENT; SLOT_COUNT],
            timestamps: vec![0; SLOT_COUNT],
        }
    }

    /// Read and validate the header at offset 0
    pub fn parse<R: ContainerReader + ?Sized>(reader: &mut R) -> Result<Self> {
        let bytes = reader.read_bytes(0, HEADER_SIZE)?;
        Self::from_bytes(&bytes)
    }

    /// Decode both tables from the first `HEADER_SIZE` bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(Error::OutOfRange {
                offset: 0,
                size: HEADER_SIZE,
                len: bytes.len() as u64,
            });
        }

        let (location_table, timestamp_table) = bytes[..HEADER_SIZE].split_at(HEADER_SIZE / 2);
        let mut table = Self::empty();
        let mut present = 0usize;

        let entries = location_table
            .chunks_exact(ENTRY_SIZE)
            .zip(timestamp_table.chunks_exact(ENTRY_SIZE))
            .enumerate();

        for (index, (loc, time)) in entries {
            let location = LocationEntry::from_bytes([loc[0], loc[1], loc[2], loc[3]]);
            let timestamp = u32::from_be_bytes([time[0], time[1], time[2], time[3]]);

            if let Slot::Present { .. } = Slot::classify(index, location, timestamp)? {
                present += 1;
            }
            table.locations[index] = location;
            table.timestamps[index] = timestamp;
        }

        debug!("Parsed region header: {} chunks present", present);
        Ok(table)
    }

    /// Validated view of one slot
    pub fn slot(&self, index: usize) -> Result<Slot> {
        Slot::classify(index, self.locations[index], self.timestamps[index])
    }

    /// Raw location entry of a slot, without the presence check
    pub fn location(&self, index: usize) -> LocationEntry {
        self.locations[index]
    }

    /// Raw timestamp of a slot
    pub fn timestamp(&self, index: usize) -> u32 {
        self.timestamps[index]
    }

    /// Overwrite one slot
    pub fn set(&mut self, index: usize, location: LocationEntry, timestamp: u32) {
        self.locations[index] = location;
        self.timestamps[index] = timestamp;
    }

    /// Number of slots with a block
    pub fn present_count(&self) -> usize {
        self.locations.iter().filter(|l| !l.is_absent()).count()
    }

    /// Encode both tables back-to-back
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_SIZE);
        for location in &self.locations {
            out.extend_from_slice(&location.to_bytes());
        }
        for timestamp in &self.timestamps {
            out.extend_from_slice(&timestamp.to_be_bytes());
        }
        debug_assert_eq!(out.len(), HEADER_SIZE);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{coordinate_to_index, EagerReader};

    fn raw_header(entries: &[(usize, [u8; 4], u32)]) -> Vec<u8> {
        let mut bytes = vec![0u8; HEADER_SIZE];
        for (index, loc, time) in entries {
            let at = index * ENTRY_SIZE;
            bytes[at..at + 4].copy_from_slice(loc);
            let at = HEADER_SIZE / 2 + at;
            bytes[at..at + 4].copy_from_slice(&time.to_be_bytes());
        }
        bytes
    }

    #[test]
    fn test_location_entry_bytes() {
        let entry = LocationEntry::from_bytes([0x01, 0x02, 0x03, 0x04]);
        assert_eq!(entry.sector_offset, 0x010203);
        assert_eq!(entry.sector_count, 4);
        assert_eq!(entry.to_bytes(), [0x01, 0x02, 0x03, 0x04]);
        assert_eq!(entry.byte_offset(), 0x010203 * 4096);
        assert_eq!(entry.byte_len(), 4 * 4096);
    }

    #[test]
    fn test_parse_empty() {
        let mut reader = EagerReader::new(vec![0u8; HEADER_SIZE]);
        let table = HeaderTable::parse(&mut reader).unwrap();

        assert_eq!(table, HeaderTable::empty());
        assert_eq!(table.present_count(), 0);
        assert_eq!(table.to_bytes(), vec![0u8; HEADER_SIZE]);
    }

    #[test]
    fn test_parse_present_slot() {
        let index = coordinate_to_index(3, 2);
        let bytes = raw_header(&[(index, [0, 0, 2, 1], 1_700_000_000)]);
        let table = HeaderTable::from_bytes(&bytes).unwrap();

        assert_eq!(table.present_count(), 1);
        assert_eq!(
            table.slot(index).unwrap(),
            Slot::Present {
                location: LocationEntry::new(2, 1),
                timestamp: 1_700_000_000,
            }
        );
        assert_eq!(table.slot(0).unwrap(), Slot::Absent);
        assert_eq!(table.to_bytes(), bytes);
    }

    #[test]
    fn test_partial_triples_are_corrupt() {
        let cases: [([u8; 4], u32); 6] = [
            ([0, 0, 2, 0], 0),
            ([0, 0, 0, 1], 0),
            ([0, 0, 0, 0], 42),
            ([0, 0, 2, 1], 0),
            ([0, 0, 2, 0], 42),
            ([0, 0, 0, 1], 42),
        ];

        for (loc, time) in cases {
            let index = coordinate_to_index(5, 7);
            let bytes = raw_header(&[(index, loc, time)]);
            match HeaderTable::from_bytes(&bytes) {
                Err(Error::CorruptHeader { x, z, .. }) => assert_eq!((x, z), (5, 7)),
                other => panic!("expected CorruptHeader for {:?}/{}, got {:?}", loc, time, other),
            }
        }
    }

    #[test]
    fn test_short_header() {
        let mut reader = EagerReader::new(vec![0u8; HEADER_SIZE - 1]);
        assert!(matches!(
            HeaderTable::parse(&mut reader),
            Err(Error::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_serialize_order() {
        let mut table = HeaderTable::empty();
        table.set(coordinate_to_index(1, 0), LocationEntry::new(0x0A0B0C, 3), 7);
        table.set(coordinate_to_index(0, 1), LocationEntry::new(5, 1), 9);

        let bytes = table.to_bytes();
        assert_eq!(&bytes[4..8], &[0x0A, 0x0B, 0x0C, 3]);
        assert_eq!(&bytes[32 * 4..32 * 4 + 4], &[0, 0, 5, 1]);
        assert_eq!(&bytes[4096 + 4..4096 + 8], &7u32.to_be_bytes());
        assert_eq!(&bytes[4096 + 32 * 4..4096 + 32 * 4 + 4], &9u32.to_be_bytes());

        assert_eq!(HeaderTable::from_bytes(&bytes).unwrap(), table);
    }
}
