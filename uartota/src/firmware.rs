//! Firmware image loading.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::checksum;
use crate::error::{Error, Result};

/// Default payload chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 256;

/// A non-empty firmware binary held in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Firmware {
    path: PathBuf,
    data: Vec<u8>,
}

impl Firmware {
    /// Load a firmware image from disk.
    ///
    /// Missing and zero-length files are rejected before any device I/O.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(Error::FirmwareNotFound(path.to_path_buf()));
        }

        let data = fs::read(path)?;
        debug!("Loaded {} ({} bytes)", path.display(), data.len());
        Self::from_bytes(path, data)
    }

    /// Wrap bytes already in memory; `path` is used for messages only.
    pub fn from_bytes(path: impl Into<PathBuf>, data: Vec<u8>) -> Result<Self> {
        let path = path.into();
        if data.is_empty() {
            return Err(Error::EmptyFirmware(path));
        }
        Ok(Self { path, data })
    }

    /// Source path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Image bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Image size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Always `false`; empty images cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Whether the file name ends in `.bin` (case-insensitive).
    pub fn has_bin_extension(&self) -> bool {
        self.path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("bin"))
    }

    /// Iterate over payload chunks of at most `chunk_size` bytes.
    pub fn chunks(&self, chunk_size: usize) -> Result<std::slice::Chunks<'_, u8>> {
        if chunk_size == 0 {
            return Err(Error::Config("chunk size must be greater than zero".into()));
        }
        Ok(self.data.chunks(chunk_size))
    }

    /// Number of chunks for `chunk_size`.
    pub fn chunk_count(&self, chunk_size: usize) -> usize {
        if chunk_size == 0 { 0 } else { self.data.len().div_ceil(chunk_size) }
    }

    /// CRC-32 of the image.
    pub fn crc32(&self) -> u32 {
        checksum::crc32(&self.data)
    }
}
