//! Configuration management for mcaport

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default zlib level, matching zlib's own default
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Default number of concurrent chunk conversions
pub const DEFAULT_WORKERS: usize = 4;

/// Default region file extension for batch conversion
pub const DEFAULT_FILE_EXTENSION: &str = "mca";

/// Default suffix of the backup directory kept during batch conversion
pub const DEFAULT_BACKUP_SUFFIX: &str = ".backup";

/// How region files are read
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReadMode {
    /// Load the whole file into memory once
    #[default]
    Eager,

    /// Seek and read per block
    Lazy,
}

impl std::str::FromStr for ReadMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "eager" => Ok(ReadMode::Eager),
            "lazy" => Ok(ReadMode::Lazy),
            other => Err(Error::InvalidConfig(format!("Unknown read mode: {}", other))),
        }
    }
}

/// Transcoding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscodeConfig {
    /// zlib level used when compressing (0-9)
    pub compression_level: u32,

    /// Concurrent chunk conversions (1 = sequential)
    pub workers: usize,

    /// Reading strategy for input files
    pub read_mode: ReadMode,
}

impl Default for TranscodeConfig {
    fn default() -> Self {
        TranscodeConfig {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            workers: DEFAULT_WORKERS,
            read_mode: ReadMode::Eager,
        }
    }
}

/// Directory conversion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Extension of files treated as region files (without the dot)
    pub file_extension: String,

    /// Suffix appended to the directory name for its backup copy
    pub backup_suffix: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
            backup_suffix: DEFAULT_BACKUP_SUFFIX.to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transcoding configuration
    #[serde(default)]
    pub transcode: TranscodeConfig,

    /// Directory conversion configuration
    #[serde(default)]
    pub batch: BatchConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Default config file location (`<config dir>/mcaport/config.json`)
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mcaport")
            .join("config.json")
    }

    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        // Override with environment variables if set
        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise start from defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            return Self::load(path);
        }

        let mut config = Config::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|name| std::env::var(name).ok());
    }

    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("MCAPORT_COMPRESSION_LEVEL") {
            if let Ok(level) = level.trim().parse::<u32>() {
                self.transcode.compression_level = level;
            }
        }

        if let Some(workers) = lookup("MCAPORT_WORKERS") {
            if let Ok(workers) = workers.trim().parse::<usize>() {
                self.transcode.workers = workers;
            }
        }

        if let Some(mode) = lookup("MCAPORT_READ_MODE") {
            if let Ok(mode) = mode.parse::<ReadMode>() {
                self.transcode.read_mode = mode;
            }
        }
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.transcode.compression_level > 9 {
            return Err(Error::InvalidConfig(format!(
                "Compression level must be between 0 and 9, got {}",
                self.transcode.compression_level
            )));
        }

        if self.transcode.workers == 0 {
            return Err(Error::InvalidConfig(
                "Workers must be greater than 0".to_string(),
            ));
        }

        if self.batch.file_extension.is_empty() || self.batch.file_extension.starts_with('.') {
            return Err(Error::InvalidConfig(
                "File extension must be non-empty and given without a leading dot".to_string(),
            ));
        }

        if self.batch.backup_suffix.is_empty() {
            return Err(Error::InvalidConfig(
                "Backup suffix must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
