//! CRC-32 checksum of firmware images.
//!
//! Uses the CRC-32/ISO-HDLC parameters (the zlib/PNG polynomial), so values
//! match what common host tools and the device's hardware CRC unit report.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crc::{CRC_32_ISO_HDLC, Crc};

use crate::error::{Error, Result};

/// CRC-32/ISO-HDLC algorithm instance.
pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Checksum of an in-memory buffer.
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}

/// Checksum of a firmware file, read in blocks.
///
/// Missing and empty files are rejected the same way
/// [`Firmware::from_file`](crate::Firmware::from_file) rejects them.
pub fn crc32_file(path: impl AsRef<Path>) -> Result<u32> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(Error::FirmwareNotFound(path.to_path_buf()));
    }

    let mut reader = BufReader::new(File::open(path)?);
    let mut digest = CRC32.digest();
    let mut buf = [0u8; 8192];
    let mut total = 0usize;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        total += n;
        digest.update(&buf[..n]);
    }
    if total == 0 {
        return Err(Error::EmptyFirmware(path.to_path_buf()));
    }
    Ok(digest.finalize())
}

/// Format a checksum as eight lowercase hex digits.
pub fn format_crc32(value: u32) -> String {
    format!("{value:08x}")
}

/// Find the first 32-bit hex value in device output.
///
/// Accepts tokens such as `0x1A2B3C4D`, `1a2b3c4d` or `CRC=1A2B3C4D`.
pub fn parse_crc32<S: AsRef<str>>(lines: &[S]) -> Option<u32> {
    lines.iter().find_map(|line| {
        line.as_ref()
            .split(|c: char| c.is_whitespace() || matches!(c, ':' | '=' | ',' | ';' | '(' | ')'))
            .filter_map(|token| {
                let digits = token
                    .strip_prefix("0x")
                    .or_else(|| token.strip_prefix("0X"))
                    .unwrap_or(token);
                if digits.len() == 8 && digits.chars().all(|c| c.is_ascii_hexdigit()) {
                    u32::from_str_radix(digits, 16).ok()
                } else {
                    None
                }
            })
            .next()
    })
}
