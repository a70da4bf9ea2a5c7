//! Error types for mcaport

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for mcaport
#[derive(Error, Debug)]
pub enum Error {
    // Container format errors
    #[error(
        "Corrupt header at chunk ({x}, {z}): offset={offset}, sectors={sectors}, timestamp={timestamp}"
    )]
    CorruptHeader {
        x: usize,
        z: usize,
        offset: u32,
        sectors: u8,
        timestamp: u32,
    },

    #[error("Read out of range: {offset}+{size} exceeds container length {len}")]
    OutOfRange { offset: u64, size: usize, len: u64 },

    #[error("Truncated block: declared length {declared}, only {available} bytes available")]
    TruncatedBlock { declared: u32, available: usize },

    // Codec errors
    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Unsupported conversion from scheme {from} to scheme {to}")]
    UnsupportedConversion { from: u8, to: u8 },

    #[error("Unknown compression scheme: {0}")]
    UnknownScheme(u8),

    // Layout errors
    #[error("Chunk ({x}, {z}) needs {sectors} sectors, at most 255 fit in a location entry")]
    ChunkTooLarge { x: usize, z: usize, sectors: usize },

    #[error("Chunk payload exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Region too large: sector offset {0} does not fit in 24 bits")]
    RegionTooLarge(usize),

    // Batch errors
    #[error("Backup already exists: {0}")]
    BackupExists(PathBuf),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error describes a malformed input container
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::CorruptHeader { .. }
                | Error::OutOfRange { .. }
                | Error::TruncatedBlock { .. }
                | Error::Decompression(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Config(e.to_string())
    }
}
