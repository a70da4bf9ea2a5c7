//! Region container module
//!
//! A region file is an 8KiB header (location table + timestamp table)
//! followed by sector-aligned chunk blocks. This module holds the sector
//! arithmetic shared by the reader, header and transcoder.

mod header;
mod reader;
mod transcoder;

pub use header::{HeaderTable, LocationEntry, Slot};
pub use reader::{open, ContainerReader, EagerReader, LazyReader};
pub use transcoder::{inspect, RegionStats, RegionTranscoder};

/// Allocation unit for every block in the container
pub const SECTOR_SIZE: usize = 4096;

/// Chunks per region edge
pub const REGION_WIDTH: usize = 32;

/// Slots per region (32 x 32)
pub const SLOT_COUNT: usize = REGION_WIDTH * REGION_WIDTH;

/// Size of one table entry in bytes
pub const ENTRY_SIZE: usize = 4;

/// Location table followed by timestamp table
pub const HEADER_SIZE: usize = 2 * SLOT_COUNT * ENTRY_SIZE;

/// Largest sector offset a location entry can hold (24 bits)
pub const MAX_SECTOR_OFFSET: usize = 0xFF_FFFF;

/// Largest sector count a location entry can hold (8 bits)
pub const MAX_SECTOR_COUNT: usize = 0xFF;

/// Round a byte count up to the next sector boundary
#[inline]
pub fn align_up(n: usize) -> usize {
    n.div_ceil(SECTOR_SIZE) * SECTOR_SIZE
}

/// Slot index for a chunk coordinate (z-major)
#[inline]
pub fn coordinate_to_index(x: usize, z: usize) -> usize {
    debug_assert!(x < REGION_WIDTH && z < REGION_WIDTH);
    z * REGION_WIDTH + x
}

/// Chunk coordinate `(x, z)` for a slot index
#[inline]
pub fn index_to_coordinate(index: usize) -> (usize, usize) {
    debug_assert!(index < SLOT_COUNT);
    (index % REGION_WIDTH, index / REGION_WIDTH)
}
