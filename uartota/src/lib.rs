//! # uartota
//!
//! Over-the-air firmware upload to microcontrollers through a UART text
//! console.
//!
//! The device speaks a line-oriented command protocol:
//!
//! - `otastart <N>` announces an image of `N` bytes; the device erases its
//!   update slot and replies with free-form log text
//! - the image is then streamed as raw bytes in fixed-size chunks
//! - `otafinish` and `otastatus` close the transfer
//! - `crc` optionally asks the device for a CRC-32 of what it received
//!
//! ## Features
//!
//! - `native` (default): serial port support via the `serialport` crate
//! - `serde`: serialization of [`TransferState`] and [`UploadResult`]
//!
//! ## Example
//!
//! ```rust,no_run
//! use uartota::{Firmware, SerialConfig, Session, UploadDriver, UploadOptions};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let firmware = Firmware::from_file("app.bin")?;
//!
//!     let mut session = Session::connect(&SerialConfig::new("/dev/ttyUSB0", 115200))?;
//!     let result = UploadDriver::new(&mut session, UploadOptions::default())
//!         .upload(&firmware, |event| println!("{event:?}"))?;
//!
//!     println!("{} bytes sent", result.bytes_sent());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod checksum;
pub mod error;
pub mod firmware;
pub mod monitor;
pub mod port;
pub mod protocol;
pub mod session;
pub mod upload;

#[cfg(test)]
mod testing;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). Only the first
/// registration takes effect.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(test)]
thread_local! {
    static TEST_INTERRUPTED: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Toggle interruption for the calling test thread only.
#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| set_interrupt_checker(|| TEST_INTERRUPTED.with(std::cell::Cell::get)));
    TEST_INTERRUPTED.with(|flag| flag.set(value));
}

#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    checksum::{crc32, crc32_file, format_crc32, parse_crc32},
    error::{Error, Result},
    firmware::{DEFAULT_CHUNK_SIZE, Firmware},
    monitor::{MONITOR_POLL_INTERVAL, clean_monitor_text, monitor},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{
        Command, HandshakeEngine, HandshakeObserver, HandshakeOutcome, LenientClassifier,
        LineClass, LineReader, ResponseClassifier, Verdict,
    },
    session::{SETTLE_DELAY, Session},
    upload::{TransferState, UploadDriver, UploadEvent, UploadOptions, UploadResult},
};
