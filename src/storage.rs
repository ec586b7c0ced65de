//! File-backed storage for still captures.

use crate::config::CaptureConfig;
use crate::errors::StorageError;
use crate::hardware::StorageSink;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Writes each capture to `<dir>/<prefix><millis>.<ext>`.
///
/// The extension follows the encoded bytes (`jpg` for JPEG, `png` for PNG,
/// ...). Captures landing in the same millisecond get a `_N` suffix.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
    prefix: String,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
        }
    }

    pub fn from_config(config: &CaptureConfig) -> Self {
        Self::new(&config.storage_directory, &config.file_prefix)
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }

    fn write_new(&self, stem: &str, ext: &str, encoded: &[u8]) -> Result<PathBuf, StorageError> {
        for attempt in 0..100u32 {
            let name = if attempt == 0 {
                format!("{}.{}", stem, ext)
            } else {
                format!("{}_{}.{}", stem, attempt, ext)
            };
            let path = self.dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(encoded)?;
                    file.sync_all()?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Err(StorageError::Rejected(format!(
            "no free file name for {}",
            stem
        )))
    }
}

impl StorageSink for FileStorage {
    fn save(&self, encoded: &[u8]) -> Result<String, StorageError> {
        let format =
            image::guess_format(encoded).map_err(|e| StorageError::Encoding(e.to_string()))?;
        let ext = match format {
            image::ImageFormat::Jpeg => "jpg",
            other => other.extensions_str().first().copied().unwrap_or("bin"),
        };

        fs::create_dir_all(&self.dir)?;
        let stem = format!("{}{}", self.prefix, chrono::Utc::now().timestamp_millis());
        let path = self.write_new(&stem, ext, encoded)?;

        log::info!("saved {} bytes to {}", encoded.len(), path.display());
        Ok(path.to_string_lossy().into_owned())
    }
}
