//! Connection session owning the open transport.
//!
//! A [`Session`] exists for exactly as long as the device is open. It is
//! passed by `&mut` to the handshake engine and upload driver, and closes the
//! port when dropped, so every exit path (success, error, interruption)
//! releases the device.

use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::port::Port;
use crate::protocol::line::LineReader;

/// Delay after opening the port before the first command.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// An open connection to the device.
pub struct Session<P: Port> {
    port: Option<P>,
    reader: LineReader,
    name: String,
    baud_rate: u32,
    response_timeout: Duration,
}

impl<P: Port> Session<P> {
    /// Take ownership of an already opened port.
    ///
    /// Stale input and output are discarded and the session waits
    /// `settle_delay` before returning.
    pub fn from_port(mut port: P, settle_delay: Duration) -> Result<Self> {
        port.clear_buffers()?;
        if !settle_delay.is_zero() {
            std::thread::sleep(settle_delay);
        }

        let session = Self {
            name: port.name().to_string(),
            baud_rate: port.baud_rate(),
            response_timeout: port.timeout(),
            reader: LineReader::new(),
            port: Some(port),
        };
        debug!("Session ready on {}", session.name);
        Ok(session)
    }

    /// Port name the session was opened on.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configured baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    /// Default timeout for command replies.
    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    /// Whether the port is still open.
    pub fn is_connected(&self) -> bool {
        self.port.as_ref().is_some_and(|port| port.is_open())
    }

    /// Mutable access to the open port.
    pub fn port_mut(&mut self) -> Result<&mut P> {
        self.port.as_mut().ok_or(Error::NotConnected)
    }

    /// Write raw bytes and flush.
    pub fn write_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.port_mut()?.write_all_bytes(data)
    }

    /// Read the next reply line, waiting until `deadline`.
    pub fn read_line(&mut self, deadline: Instant) -> Result<Option<String>> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        self.reader.read_line(port, deadline)
    }

    /// Read the next reply line, polling the port every `interval`.
    pub fn read_line_polling(
        &mut self,
        deadline: Instant,
        interval: Duration,
    ) -> Result<Option<String>> {
        let port = self.port.as_mut().ok_or(Error::NotConnected)?;
        self.reader.read_line_polling(port, deadline, interval)
    }

    /// Close the port. Calling this again is a no-op.
    pub fn disconnect(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            self.reader.clear();
            port.close()?;
            info!("Connection to {} closed", self.name);
        }
        Ok(())
    }
}

#[cfg(feature = "native")]
impl Session<crate::port::NativePort> {
    /// Open the configured serial device and prepare it for use.
    pub fn connect(config: &crate::port::SerialConfig) -> Result<Self> {
        Self::connect_with_settle(config, SETTLE_DELAY)
    }

    /// Like [`Session::connect`] with a custom settle delay.
    pub fn connect_with_settle(
        config: &crate::port::SerialConfig,
        settle_delay: Duration,
    ) -> Result<Self> {
        let port = crate::port::NativePort::open(config)?;
        info!("Connected to {} at {} baud", config.port_name, config.baud_rate);
        Self::from_port(port, settle_delay)
    }
}

impl<P: Port> Drop for Session<P> {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}
