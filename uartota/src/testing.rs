//! Scripted port used by unit tests.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

use crate::error::Result;
use crate::port::Port;

/// In-memory port with separate read/write sides.
///
/// Replies are queued for reading when a write containing their trigger text
/// is seen, so a test can script the device's side of a conversation.
pub(crate) struct ScriptedPort {
    pub input: VecDeque<u8>,
    pub writes: Vec<Vec<u8>>,
    pub replies: Vec<(String, Vec<u8>)>,
    pub fail_writes_after: Option<usize>,
    pub fail_reads: bool,
    pub open: bool,
    pub close_calls: usize,
    pub clear_calls: usize,
}

impl ScriptedPort {
    pub fn new() -> Self {
        Self {
            input: VecDeque::new(),
            writes: Vec::new(),
            replies: Vec::new(),
            fail_writes_after: None,
            fail_reads: false,
            open: true,
            close_calls: 0,
            clear_calls: 0,
        }
    }

    pub fn with_input(data: &[u8]) -> Self {
        let mut port = Self::new();
        port.input.extend(data);
        port
    }

    /// Queue `response` once a write containing `trigger` arrives.
    pub fn reply(mut self, trigger: &str, response: &str) -> Self {
        self.replies
            .push((trigger.to_string(), response.as_bytes().to_vec()));
        self
    }

    /// Writes that carried text commands (terminated by CRLF).
    pub fn commands(&self) -> Vec<String> {
        self.writes
            .iter()
            .filter(|w| w.ends_with(b"\r\n"))
            .map(|w| String::from_utf8_lossy(w).trim_end().to_string())
            .collect()
    }

    /// Writes that carried payload bytes.
    pub fn payload_writes(&self) -> Vec<&Vec<u8>> {
        self.writes
            .iter()
            .filter(|w| !w.ends_with(b"\r\n"))
            .collect()
    }
}

impl Read for ScriptedPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.fail_reads {
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"));
        }
        if self.input.is_empty() {
            return Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.input.len());
        for slot in buf.iter_mut().take(n) {
            *slot = self.input.pop_front().unwrap_or_default();
        }
        Ok(n)
    }
}

impl Write for ScriptedPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if let Some(limit) = self.fail_writes_after {
            if self.writes.len() >= limit {
                return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"));
            }
        }
        self.writes.push(buf.to_vec());

        let text = String::from_utf8_lossy(buf).to_string();
        if let Some(idx) = self
            .replies
            .iter()
            .position(|(trigger, _)| text.contains(trigger.as_str()))
        {
            let (_, response) = self.replies.remove(idx);
            self.input.extend(response);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Port for ScriptedPort {
    fn set_timeout(&mut self, _timeout: Duration) -> Result<()> {
        Ok(())
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn baud_rate(&self) -> u32 {
        115_200
    }

    fn bytes_to_read(&mut self) -> Result<usize> {
        Ok(self.input.len())
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.clear_calls += 1;
        self.input.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn close(&mut self) -> Result<()> {
        self.close_calls += 1;
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
