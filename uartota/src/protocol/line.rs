//! Newline-delimited response reader.
//!
//! Device output arrives in arbitrary pieces. [`LineReader`] keeps the bytes
//! that have not yet formed a complete line and hands out one trimmed line
//! per call.

use std::time::{Duration, Instant};

use log::trace;

use crate::error::{Error, Result};
use crate::port::Port;

/// Interval between polls of the port's receive queue.
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Largest single read from the port.
const READ_CHUNK: usize = 256;

/// Accumulates received bytes into text lines.
#[derive(Debug)]
pub struct LineReader {
    buffer: Vec<u8>,
    poll_interval: Duration,
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

impl LineReader {
    /// Create an empty reader polling at [`POLL_INTERVAL`].
    pub fn new() -> Self {
        Self::with_poll_interval(POLL_INTERVAL)
    }

    /// Create an empty reader with a custom poll interval.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            buffer: Vec::with_capacity(READ_CHUNK),
            poll_interval,
        }
    }

    /// Bytes received but not yet returned as a line.
    pub fn pending(&self) -> &[u8] {
        &self.buffer
    }

    /// Drop any buffered partial line.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Read the next line, waiting until `deadline` at the latest.
    ///
    /// Returns `Ok(None)` when the deadline passes with nothing buffered. A
    /// partial line without a terminator is returned once the deadline
    /// passes, even if the device is still sending. Trailing whitespace
    /// (including `\r`) is stripped; invalid UTF-8 is replaced with `U+FFFD`.
    pub fn read_line<P: Port + ?Sized>(
        &mut self,
        port: &mut P,
        deadline: Instant,
    ) -> Result<Option<String>> {
        self.read_line_polling(port, deadline, self.poll_interval)
    }

    /// Like [`LineReader::read_line`] with an explicit poll interval.
    pub fn read_line_polling<P: Port + ?Sized>(
        &mut self,
        port: &mut P,
        deadline: Instant,
        interval: Duration,
    ) -> Result<Option<String>> {
        loop {
            if let Some(line) = self.take_line() {
                return Ok(Some(line));
            }

            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }

            let available = port.bytes_to_read()?;
            if available > 0 {
                self.fill(port, available)?;
            }

            // Holds even while unterminated bytes keep arriving.
            if Instant::now() >= deadline {
                return Ok(self.take_line().or_else(|| self.take_partial()));
            }

            if available == 0 {
                std::thread::sleep(interval);
            }
        }
    }

    fn fill<P: Port + ?Sized>(&mut self, port: &mut P, available: usize) -> Result<()> {
        let mut buf = [0u8; READ_CHUNK];
        let want = available.min(READ_CHUNK);
        match port.read(&mut buf[..want]) {
            Ok(n) => {
                trace!("Received {n} bytes");
                self.buffer.extend_from_slice(&buf[..n]);
                Ok(())
            },
            Err(e) if e.kind() == std::io::ErrorKind::TimedOut => Ok(()),
            Err(e) => Err(Error::Io(e)),
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|&b| b == b'\n')?;
        let raw: Vec<u8> = self.buffer.drain(..=end).collect();
        Some(decode(&raw))
    }

    fn take_partial(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let raw = std::mem::take(&mut self.buffer);
        let line = decode(&raw);
        if line.is_empty() { None } else { Some(line) }
    }
}

fn decode(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).trim_end().to_string()
}
