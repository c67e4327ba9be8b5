//! OTA text commands and their response patterns.

use std::time::Duration;

/// Reply substrings that mark any command as failed (matched case-insensitively).
pub const FAILURE_PATTERNS: &[&str] = &["error", "failed", "timeout"];

/// Replies the device prints while accepting `otastart`, in emission order.
pub const START_SUCCESS_PATTERNS: &[&str] = &[
    "Ready to receive firmware binary data",
    "OTA state confirmed: RECEIVING mode active",
    "OTA started, expecting",
];

/// Reply that confirms the device has switched into receive mode.
pub const RECEIVING_CONFIRMATION: &str = "OTA state confirmed: RECEIVING mode active";

/// Timeout for `otastart`; the device erases flash before answering.
pub const START_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for the remaining commands.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// A text command with the rules for judging its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: String,
    success_patterns: Vec<String>,
    failure_patterns: Vec<String>,
    timeout: Duration,
    wait_response: bool,
    continue_after_success: bool,
}

impl Command {
    /// A command that waits for any non-error reply.
    pub fn new(text: impl Into<String>, timeout: Duration) -> Self {
        Self {
            text: text.into(),
            success_patterns: Vec::new(),
            failure_patterns: FAILURE_PATTERNS.iter().map(ToString::to_string).collect(),
            timeout,
            wait_response: true,
            continue_after_success: false,
        }
    }

    /// `otastart <size>`: announce a transfer of `size` bytes.
    pub fn ota_start(size: usize, timeout: Duration) -> Self {
        Self::new(format!("otastart {size}"), timeout)
            .with_success_patterns(START_SUCCESS_PATTERNS)
            .continue_after_success(true)
    }

    /// `otafinish`: end of payload.
    pub fn ota_finish(timeout: Duration) -> Self {
        Self::new("otafinish", timeout)
    }

    /// `otastatus`: query the device's OTA state.
    pub fn ota_status(timeout: Duration) -> Self {
        Self::new("otastatus", timeout)
    }

    /// `crc`: ask the device for the checksum of what it received.
    pub fn crc(timeout: Duration) -> Self {
        Self::new("crc", timeout)
    }

    /// Replace the success substrings.
    #[must_use]
    pub fn with_success_patterns(mut self, patterns: &[&str]) -> Self {
        self.success_patterns = patterns.iter().map(ToString::to_string).collect();
        self
    }

    /// Replace the failure substrings.
    #[must_use]
    pub fn with_failure_patterns(mut self, patterns: &[&str]) -> Self {
        self.failure_patterns = patterns.iter().map(ToString::to_string).collect();
        self
    }

    /// Send without reading a reply.
    #[must_use]
    pub fn without_response(mut self) -> Self {
        self.wait_response = false;
        self
    }

    /// Keep collecting lines after a success match until every success
    /// pattern has been seen or the timeout expires.
    #[must_use]
    pub fn continue_after_success(mut self, enabled: bool) -> Self {
        self.continue_after_success = enabled;
        self
    }

    /// Command text, without line terminator.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Substrings that indicate success.
    pub fn success_patterns(&self) -> &[String] {
        &self.success_patterns
    }

    /// Substrings that indicate failure.
    pub fn failure_patterns(&self) -> &[String] {
        &self.failure_patterns
    }

    /// How long to wait for a reply.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a reply is awaited.
    pub fn wait_response(&self) -> bool {
        self.wait_response
    }

    /// Whether a success match ends the wait.
    pub fn continues_after_success(&self) -> bool {
        self.continue_after_success
    }

    /// Bytes written to the port.
    pub fn wire_bytes(&self) -> Vec<u8> {
        format!("{}\r\n", self.text).into_bytes()
    }
}
