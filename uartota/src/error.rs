//! Error types for uartota.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::upload::TransferState;

/// Result type for uartota operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for uartota operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// Firmware file does not exist.
    #[error("Firmware file not found: {}", .0.display())]
    FirmwareNotFound(PathBuf),

    /// Firmware file exists but has no content.
    #[error("Empty firmware file: {}", .0.display())]
    EmptyFirmware(PathBuf),

    /// Device rejected or never answered a required command.
    #[error("Handshake failed: {0}")]
    HandshakeFailed(String),

    /// Session used after disconnect.
    #[error("Not connected")]
    NotConnected,

    /// Upload driver asked to move backwards or out of a terminal state.
    #[error("Invalid transfer state transition: {from} -> {to}")]
    InvalidState {
        /// State the driver was in.
        from: TransferState,
        /// State that was requested.
        to: TransferState,
    },

    /// Operation stopped by the embedding application.
    #[error("Interrupted")]
    Interrupted,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
