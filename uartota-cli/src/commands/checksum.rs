//! `--checksum-only` implementation.

use anyhow::{Context, Result};
use std::path::Path;
use uartota::{crc32_file, format_crc32};

/// Print the image's CRC-32 as 8 lowercase hex digits.
///
/// The file is streamed and no serial port is opened.
pub(crate) fn cmd_checksum(path: &Path) -> Result<()> {
    println!("{}", checksum_line(path)?);
    Ok(())
}

fn checksum_line(path: &Path) -> Result<String> {
    let crc = crc32_file(path)
        .with_context(|| format!("Failed to load firmware {}", path.display()))?;
    Ok(format_crc32(crc))
}
