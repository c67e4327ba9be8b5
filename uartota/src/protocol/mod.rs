//! OTA text protocol: line framing, commands and handshakes.

pub mod command;
pub mod handshake;
pub mod line;

// Re-export common types
pub use command::{COMMAND_TIMEOUT, Command, FAILURE_PATTERNS, START_TIMEOUT};
pub use handshake::{
    HandshakeEngine, HandshakeObserver, HandshakeOutcome, LenientClassifier, LineClass,
    NoopObserver, ResponseClassifier, Verdict,
};
pub use line::LineReader;
