//! File and directory level conversion
//!
//! `Converter` applies the configured read mode and worker count to single
//! files. `convert_tree` rewrites every region file below a directory in
//! place, keeping a full copy at `<dir><suffix>` until the whole tree has
//! been converted and putting it back if anything fails.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::runtime::Runtime;
use tracing::{debug, error, info, warn};

use crate::chunk::CompressionScheme;
use crate::config::{BatchConfig, Config, TranscodeConfig};
use crate::error::{Error, Result};
use crate::region::{self, RegionTranscoder};

/// Suffix of the sibling file written before an atomic rename
const TEMP_SUFFIX: &str = ".mcaport-tmp";

/// Outcome of a directory conversion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// Region files rewritten
    pub converted: usize,
    /// Other files left untouched
    pub skipped: usize,
    /// Total size of the region files before conversion
    pub bytes_before: u64,
    /// Total size of the region files after conversion
    pub bytes_after: u64,
}

/// Converts region files with the configured strategy
pub struct Converter {
    transcoder: RegionTranscoder,
    config: TranscodeConfig,
    /// Only built when more than one worker is configured
    runtime: Option<Runtime>,
}

impl Converter {
    /// Build a converter; a tokio runtime is started only for `workers > 1`
    pub fn new(config: &TranscodeConfig) -> Result<Self> {
        let runtime = if config.workers > 1 {
            Some(Runtime::new().map_err(|e| Error::Internal(e.to_string()))?)
        } else {
            None
        };

        Ok(Converter {
            transcoder: RegionTranscoder::from_config(config),
            config: config.clone(),
            runtime,
        })
    }

    /// Transcode `input` and write the result to `output`
    ///
    /// `output` may equal `input`; the new file replaces it only once the
    /// conversion has fully succeeded. Returns the sizes before and after.
    pub fn convert_file(
        &self,
        input: &Path,
        output: &Path,
        target: CompressionScheme,
    ) -> Result<(u64, u64)> {
        let mut reader = region::open(input, self.config.read_mode)?;
        let before = reader.len();

        let out = match &self.runtime {
            Some(runtime) => runtime.block_on(self.transcoder.transcode_concurrent(
                reader.as_mut(),
                target,
                self.config.workers,
            ))?,
            None => self.transcoder.transcode(reader.as_mut(), target)?,
        };
        drop(reader);

        write_replace(output, &out)?;
        debug!(
            "Converted {} -> {} ({} -> {} bytes)",
            input.display(),
            output.display(),
            before,
            out.len()
        );
        Ok((before, out.len() as u64))
    }
}

/// Write `data` next to `path`, then rename over it
fn write_replace(path: &Path, data: &[u8]) -> Result<()> {
    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(TEMP_SUFFIX);
    let temp_path = PathBuf::from(temp_name);

    let result = fs::write(&temp_path, data).and_then(|_| fs::rename(&temp_path, path));
    if let Err(e) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }
    Ok(())
}

/// Sibling `<root><suffix>`, e.g. `world/region.backup`
///
/// Trailing separators and `.` components are ignored; a root without a
/// final name (`/`, `.`, `..`) has no sibling and is rejected.
pub fn backup_path(root: &Path, suffix: &str) -> Result<PathBuf> {
    let root: PathBuf = root.components().collect();
    let name = match root.file_name() {
        Some(name) => name,
        None => {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("cannot back up {}: path has no directory name", root.display()),
            )))
        }
    };

    let mut backup_name: OsString = name.to_owned();
    backup_name.push(suffix);
    Ok(root.with_file_name(backup_name))
}

/// Recursively copy a directory tree
fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}

/// All regular files below `dir`, sorted for a stable processing order
fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, files)?;
        } else {
            files.push(path);
        }
    }
    Ok(())
}

fn convert_files(
    root: &Path,
    target: CompressionScheme,
    converter: &Converter,
    batch: &BatchConfig,
) -> Result<BatchReport> {
    let mut files = Vec::new();
    collect_files(root, &mut files)?;

    let mut report = BatchReport::default();
    for path in files {
        let is_region = path
            .extension()
            .map(|ext| ext == batch.file_extension.as_str())
            .unwrap_or(false);

        if !is_region {
            report.skipped += 1;
            continue;
        }

        let (before, after) = converter.convert_file(&path, &path, target)?;
        report.converted += 1;
        report.bytes_before += before;
        report.bytes_after += after;
    }
    Ok(report)
}

/// Put the backup copy back in place of a partially converted tree
fn restore(root: &Path, backup: &Path) -> Result<()> {
    if !backup.exists() {
        return Err(Error::Internal(format!(
            "no backup to restore at {}",
            backup.display()
        )));
    }
    if root.exists() {
        fs::remove_dir_all(root)?;
    }
    fs::rename(backup, root)?;
    Ok(())
}

/// Convert every region file under `root` in place
///
/// Either every region file ends up in `target`, or the tree is restored
/// from its backup and the first error is returned.
pub fn convert_tree(root: &Path, target: CompressionScheme, config: &Config) -> Result<BatchReport> {
    if !root.is_dir() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("not a directory: {}", root.display()),
        )));
    }

    let backup = backup_path(root, &config.batch.backup_suffix)?;
    if backup.exists() {
        return Err(Error::BackupExists(backup));
    }

    let converter = Converter::new(&config.transcode)?;

    info!("Backing up {} to {}", root.display(), backup.display());
    if let Err(e) = copy_dir(root, &backup) {
        if let Err(cleanup_err) = fs::remove_dir_all(&backup) {
            warn!(
                "Failed to remove partial backup {}: {}",
                backup.display(),
                cleanup_err
            );
        }
        return Err(e);
    }

    match convert_files(root, target, &converter, &config.batch) {
        Ok(report) => {
            fs::remove_dir_all(&backup)?;
            info!(
                "Converted {} region files under {} to {} ({} skipped, {} -> {} bytes)",
                report.converted,
                root.display(),
                target,
                report.skipped,
                report.bytes_before,
                report.bytes_after
            );
            Ok(report)
        }
        Err(e) => {
            warn!("Conversion of {} failed, restoring backup: {}", root.display(), e);
            if let Err(restore_err) = restore(root, &backup) {
                error!(
                    "Failed to restore {} from {}: {}",
                    root.display(),
                    backup.display(),
                    restore_err
                );
            }
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{compress, SCHEME_RAW, SCHEME_ZLIB};
    use crate::config::ReadMode;
    use crate::testkit::{build_region, read_chunk, FixtureChunk};

    fn zlib_region(text: &[u8]) -> Vec<u8> {
        build_region(&[FixtureChunk::new(0, 2, SCHEME_ZLIB, compress(text, 6).unwrap())])
    }

    fn world(dir: &Path) -> PathBuf {
        let root = dir.join("region");
        fs::create_dir_all(root.join("DIM-1")).unwrap();
        fs::write(root.join("r.0.0.mca"), zlib_region(b"overworld")).unwrap();
        fs::write(root.join("DIM-1").join("r.-1.0.mca"), zlib_region(b"nether")).unwrap();
        fs::write(root.join("session.lock"), b"lock").unwrap();
        root
    }

    #[test]
    fn test_backup_path() {
        for root in ["/srv/world/region", "/srv/world/region/", "/srv/world/./region//"] {
            assert_eq!(
                backup_path(Path::new(root), ".backup").unwrap(),
                PathBuf::from("/srv/world/region.backup")
            );
        }
        assert_eq!(
            backup_path(Path::new("region"), ".bak").unwrap(),
            PathBuf::from("region.bak")
        );

        for root in ["/", ".", "..", "world/.."] {
            assert!(matches!(
                backup_path(Path::new(root), ".backup"),
                Err(Error::Io(_))
            ));
        }
    }

    #[test]
    fn test_convert_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("r.0.0.mca");
        let output = dir.path().join("r.0.0.raw.mca");
        fs::write(&input, zlib_region(b"abcdefghij")).unwrap();

        for read_mode in [ReadMode::Eager, ReadMode::Lazy] {
            for workers in [1, 4] {
                let config = TranscodeConfig {
                    read_mode,
                    workers,
                    ..Default::default()
                };
                let converter = Converter::new(&config).unwrap();
                converter
                    .convert_file(&input, &output, CompressionScheme::Raw)
                    .unwrap();

                let out = fs::read(&output).unwrap();
                assert_eq!(read_chunk(&out, 0), Some((SCHEME_RAW, b"abcdefghij".to_vec())));
            }
        }
    }

    #[test]
    fn test_convert_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = world(dir.path());

        let report = convert_tree(&root, CompressionScheme::Raw, &Config::default()).unwrap();
        assert_eq!(report.converted, 2);
        assert_eq!(report.skipped, 1);

        let overworld = fs::read(root.join("r.0.0.mca")).unwrap();
        assert_eq!(read_chunk(&overworld, 0), Some((SCHEME_RAW, b"overworld".to_vec())));
        let nether = fs::read(root.join("DIM-1").join("r.-1.0.mca")).unwrap();
        assert_eq!(read_chunk(&nether, 0), Some((SCHEME_RAW, b"nether".to_vec())));
        assert_eq!(fs::read(root.join("session.lock")).unwrap(), b"lock");

        assert!(!backup_path(&root, ".backup").unwrap().exists());
        assert!(!root.join("r.0.0.mca.mcaport-tmp").exists());
    }

    #[test]
    fn test_failure_restores_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = world(dir.path());
        let original = fs::read(root.join("r.0.0.mca")).unwrap();
        // Sorted after r.0.0.mca, so the first file is already converted when this fails
        fs::write(root.join("r.9.9.mca"), b"garbage").unwrap();

        let result = convert_tree(&root, CompressionScheme::Raw, &Config::default());
        assert!(matches!(result, Err(Error::OutOfRange { .. })));

        assert_eq!(fs::read(root.join("r.0.0.mca")).unwrap(), original);
        assert_eq!(fs::read(root.join("r.9.9.mca")).unwrap(), b"garbage");
        assert!(!backup_path(&root, ".backup").unwrap().exists());
    }

    #[test]
    fn test_existing_backup_refused() {
        let dir = tempfile::tempdir().unwrap();
        let root = world(dir.path());
        fs::create_dir_all(backup_path(&root, ".backup").unwrap()).unwrap();

        let result = convert_tree(&root, CompressionScheme::Raw, &Config::default());
        assert!(matches!(result, Err(Error::BackupExists(_))));

        // Nothing was touched
        let overworld = fs::read(root.join("r.0.0.mca")).unwrap();
        assert_eq!(read_chunk(&overworld, 0).unwrap().0, SCHEME_ZLIB);
    }

    #[test]
    fn test_trailing_slash_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = world(dir.path());
        let mut with_slash = root.clone().into_os_string();
        with_slash.push("/");

        let report =
            convert_tree(Path::new(&with_slash), CompressionScheme::Raw, &Config::default()).unwrap();
        assert_eq!(report.converted, 2);

        // The backup was a sibling and is gone again
        assert!(!root.join(".backup").exists());
        assert!(!dir.path().join("region.backup").exists());
        let overworld = fs::read(root.join("r.0.0.mca")).unwrap();
        assert_eq!(read_chunk(&overworld, 0), Some((SCHEME_RAW, b"overworld".to_vec())));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_backup_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let root = world(dir.path());
        // Copying a dangling link fails even with elevated permissions
        std::os::unix::fs::symlink(dir.path().join("missing"), root.join("zz-dangling")).unwrap();

        let result = convert_tree(&root, CompressionScheme::Raw, &Config::default());
        assert!(matches!(result, Err(Error::Io(_))));

        assert!(!backup_path(&root, ".backup").unwrap().exists());
        let overworld = fs::read(root.join("r.0.0.mca")).unwrap();
        assert_eq!(read_chunk(&overworld, 0).unwrap().0, SCHEME_ZLIB);

        // A later run is not blocked by leftovers
        fs::remove_file(root.join("zz-dangling")).unwrap();
        convert_tree(&root, CompressionScheme::Raw, &Config::default()).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_write_replace_cleans_temp_on_rename_failure() {
        let dir = tempfile::tempdir().unwrap();
        // Renaming a file over a non-empty directory fails
        let target = dir.path().join("r.0.0.mca");
        fs::create_dir_all(target.join("occupied")).unwrap();

        assert!(write_replace(&target, b"data").is_err());
        assert!(!dir.path().join("r.0.0.mca.mcaport-tmp").exists());
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = convert_tree(
            &dir.path().join("nope"),
            CompressionScheme::Zlib,
            &Config::default(),
        );
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
