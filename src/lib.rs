//! mcaport - region file recompression
//!
//! Rewrites region containers (32x32 grids of sector-aligned chunk blocks)
//! with every chunk stored either zlib-compressed or uncompressed, keeping
//! the header and sector layout valid.

pub mod batch;
pub mod chunk;
pub mod config;
pub mod error;
pub mod region;

#[cfg(test)]
mod testkit;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::chunk::CompressionScheme;
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::region::{ContainerReader, EagerReader, LazyReader, RegionTranscoder};
}
