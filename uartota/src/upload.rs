//! OTA upload state machine.
//!
//! ```text
//!  Idle ──otastart──▶ Started ──erase wait──▶ Erasing ──chunks──▶ Streaming
//!                                                                    │
//!   Completed ◀──(crc)── Verifying ◀──otastatus── Finishing ◀──otafinish
//!
//!   any non-terminal state ──fatal error──▶ Failed
//! ```
//!
//! Only the start handshake, chunk writes and interruption are fatal. The
//! finish, status and checksum exchanges are advisory: their problems are
//! recorded as warnings and the transfer still completes.

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::checksum::{format_crc32, parse_crc32};
use crate::error::{Error, Result};
use crate::firmware::{DEFAULT_CHUNK_SIZE, Firmware};
use crate::port::Port;
use crate::protocol::command::{Command, RECEIVING_CONFIRMATION, START_TIMEOUT};
use crate::protocol::handshake::{
    HandshakeEngine, HandshakeObserver, HandshakeOutcome, LenientClassifier, LineClass,
    ResponseClassifier,
};
use crate::session::Session;

/// Progress is reported every this many chunks, and on the last one.
pub const PROGRESS_EVERY: usize = 10;

/// Phase of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TransferState {
    /// Nothing sent yet.
    Idle,
    /// Device accepted `otastart`.
    Started,
    /// Waiting for the device to finish erasing.
    Erasing,
    /// Sending payload chunks.
    Streaming,
    /// Sending `otafinish` / `otastatus`.
    Finishing,
    /// Comparing checksums.
    Verifying,
    /// Upload done.
    Completed,
    /// Upload aborted.
    Failed,
}

impl TransferState {
    fn rank(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Started => 1,
            Self::Erasing => 2,
            Self::Streaming => 3,
            Self::Finishing => 4,
            Self::Verifying => 5,
            Self::Completed => 6,
            Self::Failed => 7,
        }
    }

    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Transitions only move forward; `Failed` is reachable from any
    /// non-terminal state.
    pub fn can_transition_to(self, next: Self) -> bool {
        if self.is_terminal() {
            return false;
        }
        next == Self::Failed || next.rank() > self.rank()
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Started => "started",
            Self::Erasing => "erasing",
            Self::Streaming => "streaming",
            Self::Finishing => "finishing",
            Self::Verifying => "verifying",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Upload timing and behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    /// Payload bytes per write.
    pub chunk_size: usize,
    /// Sleep after each chunk, to stay under the device's flash-write rate.
    pub pacing: Duration,
    /// Reply timeout for `otastart`.
    pub start_timeout: Duration,
    /// Reply timeout for the other commands; `None` uses the session default.
    pub command_timeout: Option<Duration>,
    /// Wait for the erase to finish after `otastart`.
    pub erase_wait: Duration,
    /// End the erase wait as soon as the device confirms receive mode
    /// instead of always waiting the full `erase_wait`.
    pub end_erase_on_ready: bool,
    /// Delay between the last chunk and `otafinish`.
    pub finish_delay: Duration,
    /// Delay between `otafinish` and `otastatus`.
    pub status_delay: Duration,
    /// Ask the device for its checksum after the upload.
    pub verify_crc: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            pacing: Duration::from_millis(50),
            start_timeout: START_TIMEOUT,
            command_timeout: None,
            erase_wait: Duration::from_secs(1),
            end_erase_on_ready: false,
            finish_delay: Duration::from_millis(500),
            status_delay: Duration::from_secs(2),
            verify_crc: false,
        }
    }
}

impl UploadOptions {
    fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk size must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Something that happened during an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadEvent<'a> {
    /// The driver entered a new state.
    State(TransferState),
    /// A command was written.
    CommandSent(&'a str),
    /// A reply line was received.
    LineReceived(&'a str),
    /// Payload progress.
    Progress {
        /// Bytes written so far.
        sent: usize,
        /// Image size.
        total: usize,
    },
    /// A non-fatal problem.
    Warning(&'a str),
}

/// Summary of a finished upload.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UploadResult {
    bytes_sent: usize,
    chunks_sent: usize,
    final_state: TransferState,
    checksum: Option<u32>,
    device_checksum: Option<u32>,
    warnings: Vec<String>,
}

impl UploadResult {
    /// Payload bytes written.
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    /// Payload writes performed.
    pub fn chunks_sent(&self) -> usize {
        self.chunks_sent
    }

    /// State the driver finished in.
    pub fn final_state(&self) -> TransferState {
        self.final_state
    }

    /// Host-side CRC-32 of the image, when verification was requested.
    pub fn checksum(&self) -> Option<u32> {
        self.checksum
    }

    /// CRC-32 reported by the device, if it answered with one.
    pub fn device_checksum(&self) -> Option<u32> {
        self.device_checksum
    }

    /// Whether both checksums are known and equal.
    pub fn checksum_matches(&self) -> Option<bool> {
        Some(self.checksum? == self.device_checksum?)
    }

    /// Soft failures encountered along the way.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

type EventSink<'e> = dyn FnMut(&UploadEvent<'_>) + 'e;

struct Relay<'r, 'e> {
    events: &'r mut EventSink<'e>,
}

impl HandshakeObserver for Relay<'_, '_> {
    fn command_sent(&mut self, text: &str) {
        (self.events)(&UploadEvent::CommandSent(text));
    }

    fn line_received(&mut self, line: &str) {
        (self.events)(&UploadEvent::LineReceived(line));
    }
}

/// Drives one firmware upload over a session.
pub struct UploadDriver<'s, P: Port, C = LenientClassifier> {
    session: &'s mut Session<P>,
    engine: HandshakeEngine<C>,
    options: UploadOptions,
    state: TransferState,
    bytes_sent: usize,
    chunks_sent: usize,
    warnings: Vec<String>,
}

impl<'s, P: Port> UploadDriver<'s, P> {
    /// Driver using the default handshake engine.
    pub fn new(session: &'s mut Session<P>, options: UploadOptions) -> Self {
        Self::with_engine(session, HandshakeEngine::new(), options)
    }
}

impl<'s, P: Port, C: ResponseClassifier> UploadDriver<'s, P, C> {
    /// Driver using a custom handshake engine.
    pub fn with_engine(
        session: &'s mut Session<P>,
        engine: HandshakeEngine<C>,
        options: UploadOptions,
    ) -> Self {
        Self {
            session,
            engine,
            options,
            state: TransferState::Idle,
            bytes_sent: 0,
            chunks_sent: 0,
            warnings: Vec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> TransferState {
        self.state
    }

    /// Payload bytes written so far.
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    /// Upload `firmware`, reporting progress through `on_event`.
    ///
    /// On a fatal error the driver ends in [`TransferState::Failed`] and the
    /// error is returned. A driver performs a single upload.
    pub fn upload<F>(&mut self, firmware: &Firmware, mut on_event: F) -> Result<UploadResult>
    where
        F: FnMut(&UploadEvent<'_>),
    {
        if self.state != TransferState::Idle {
            return Err(Error::InvalidState {
                from: self.state,
                to: TransferState::Started,
            });
        }

        match self.run(firmware, &mut on_event) {
            Ok(result) => Ok(result),
            Err(e) => {
                if !self.state.is_terminal() {
                    warn!("Upload failed while {}: {e}", self.state);
                    self.state = TransferState::Failed;
                    on_event(&UploadEvent::State(TransferState::Failed));
                }
                Err(e)
            },
        }
    }

    fn run(&mut self, firmware: &Firmware, events: &mut EventSink<'_>) -> Result<UploadResult> {
        self.options.validate()?;

        let checksum = self.options.verify_crc.then(|| firmware.crc32());
        info!(
            "Uploading {} ({} bytes, {} byte chunks)",
            firmware.path().display(),
            firmware.len(),
            self.options.chunk_size
        );

        let (start_cmd, start) = self.start(firmware, events)?;
        self.erase_wait(&start_cmd, &start, events)?;
        self.stream(firmware, events)?;
        self.finish(events)?;

        let device_checksum = match checksum {
            Some(expected) => self.verify(expected, events)?,
            None => None,
        };

        self.transition(TransferState::Completed, events)?;
        info!("OTA process completed: {} bytes sent", self.bytes_sent);

        Ok(UploadResult {
            bytes_sent: self.bytes_sent,
            chunks_sent: self.chunks_sent,
            final_state: self.state,
            checksum,
            device_checksum,
            warnings: std::mem::take(&mut self.warnings),
        })
    }

    fn transition(&mut self, next: TransferState, events: &mut EventSink<'_>) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidState {
                from: self.state,
                to: next,
            });
        }
        debug!("State {} -> {next}", self.state);
        self.state = next;
        events(&UploadEvent::State(next));
        Ok(())
    }

    fn command_timeout(&self) -> Duration {
        self.options
            .command_timeout
            .unwrap_or_else(|| self.session.response_timeout())
    }

    fn exchange(&mut self, cmd: &Command, events: &mut EventSink<'_>) -> Result<HandshakeOutcome> {
        let mut relay = Relay { events };
        self.engine
            .send_command_observed(self.session, cmd, &mut relay)
    }

    fn soft_warning(&mut self, message: String, events: &mut EventSink<'_>) {
        warn!("{message}");
        events(&UploadEvent::Warning(&message));
        self.warnings.push(message);
    }

    /// Run an advisory exchange; only interruption is propagated.
    fn soft_exchange(
        &mut self,
        cmd: &Command,
        events: &mut EventSink<'_>,
    ) -> Result<Option<HandshakeOutcome>> {
        match self.exchange(cmd, events) {
            Ok(outcome) => {
                if !outcome.matched_success {
                    self.soft_warning(
                        format!("'{}' not confirmed ({:?})", cmd.text(), outcome.verdict),
                        events,
                    );
                }
                Ok(Some(outcome))
            },
            Err(Error::Interrupted) => Err(Error::Interrupted),
            Err(e) => {
                self.soft_warning(format!("'{}' failed: {e}", cmd.text()), events);
                Ok(None)
            },
        }
    }

    fn start(
        &mut self,
        firmware: &Firmware,
        events: &mut EventSink<'_>,
    ) -> Result<(Command, HandshakeOutcome)> {
        info!("Starting OTA process...");
        let cmd = Command::ota_start(firmware.len(), self.options.start_timeout);
        let outcome = self.exchange(&cmd, events)?;

        if !outcome.matched_success {
            let detail = outcome
                .lines
                .last()
                .cloned()
                .unwrap_or_else(|| "no response".to_string());
            return Err(Error::HandshakeFailed(format!("{}: {detail}", cmd.text())));
        }

        self.transition(TransferState::Started, events)?;
        Ok((cmd, outcome))
    }

    /// Wait out the erase. Late replies are classified against the start
    /// command. With `end_erase_on_ready` the wait ends once the device
    /// confirms receive mode; otherwise the full `erase_wait` elapses.
    fn erase_wait(
        &mut self,
        start_cmd: &Command,
        start: &HandshakeOutcome,
        events: &mut EventSink<'_>,
    ) -> Result<()> {
        self.transition(TransferState::Erasing, events)?;
        let end_on_ready = self.options.end_erase_on_ready;

        if end_on_ready && start.saw(RECEIVING_CONFIRMATION) {
            debug!("Receive mode already confirmed");
            return Ok(());
        }

        let deadline = Instant::now() + self.options.erase_wait;
        while let Some(line) = self.session.read_line(deadline)? {
            if !line.is_empty() {
                debug!("← {line}");
                events(&UploadEvent::LineReceived(&line));

                if end_on_ready && line.contains(RECEIVING_CONFIRMATION) {
                    debug!("Receive mode confirmed during erase wait");
                    return Ok(());
                }
                if self.engine.classifier().classify_line(start_cmd, &line) == LineClass::Failure {
                    self.soft_warning(format!("Device reported during erase: {line}"), events);
                }
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        Ok(())
    }

    fn stream(&mut self, firmware: &Firmware, events: &mut EventSink<'_>) -> Result<()> {
        self.transition(TransferState::Streaming, events)?;
        info!("Uploading firmware...");

        let total = firmware.len();
        for chunk in firmware.chunks(self.options.chunk_size)? {
            if crate::is_interrupted_requested() {
                return Err(Error::Interrupted);
            }

            self.session.write_bytes(chunk)?;
            self.bytes_sent += chunk.len();
            self.chunks_sent += 1;
            trace!("Chunk {} written ({} bytes)", self.chunks_sent, chunk.len());

            if self.chunks_sent % PROGRESS_EVERY == 0 || self.bytes_sent == total {
                events(&UploadEvent::Progress {
                    sent: self.bytes_sent,
                    total,
                });
            }

            if !self.options.pacing.is_zero() {
                thread::sleep(self.options.pacing);
            }
        }

        info!("Upload complete: {} bytes sent", self.bytes_sent);
        Ok(())
    }

    fn finish(&mut self, events: &mut EventSink<'_>) -> Result<()> {
        thread::sleep(self.options.finish_delay);
        self.transition(TransferState::Finishing, events)?;

        let timeout = self.command_timeout();
        self.soft_exchange(&Command::ota_finish(timeout), events)?;

        info!("Checking OTA status...");
        thread::sleep(self.options.status_delay);
        self.soft_exchange(&Command::ota_status(timeout), events)?;
        Ok(())
    }

    fn verify(&mut self, expected: u32, events: &mut EventSink<'_>) -> Result<Option<u32>> {
        self.transition(TransferState::Verifying, events)?;
        info!("Verifying checksum (expected {})", format_crc32(expected));

        let cmd = Command::crc(self.command_timeout());
        let Some(outcome) = self.soft_exchange(&cmd, events)? else {
            return Ok(None);
        };

        let reported = parse_crc32(outcome.lines.as_slice());
        match reported {
            Some(actual) if actual == expected => {
                info!("Checksum verified: {}", format_crc32(actual));
            },
            Some(actual) => self.soft_warning(
                format!(
                    "Checksum mismatch: expected {}, device reported {}",
                    format_crc32(expected),
                    format_crc32(actual)
                ),
                events,
            ),
            None => self.soft_warning(
                "Device did not report a checksum (crc unsupported?)".to_string(),
                events,
            ),
        }
        Ok(reported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedPort;

    const READY: &str = "Ready to receive firmware binary data\r\n";

    fn fast_options() -> UploadOptions {
        UploadOptions {
            chunk_size: 256,
            pacing: Duration::ZERO,
            start_timeout: Duration::from_millis(100),
            command_timeout: Some(Duration::from_millis(60)),
            erase_wait: Duration::from_millis(20),
            end_erase_on_ready: false,
            finish_delay: Duration::ZERO,
            status_delay: Duration::ZERO,
            verify_crc: false,
        }
    }

    fn session(port: ScriptedPort) -> Session<ScriptedPort> {
        Session::from_port(port, Duration::ZERO).unwrap()
    }

    fn firmware(len: usize) -> Firmware {
        let data = (0..len).map(|i| (i % 256) as u8).collect();
        Firmware::from_bytes("app.bin", data).unwrap()
    }

    #[test]
    fn test_state_transitions_forward_only() {
        use TransferState::*;
        assert!(Idle.can_transition_to(Started));
        assert!(Finishing.can_transition_to(Completed));
        assert!(Streaming.can_transition_to(Failed));
        assert!(!Streaming.can_transition_to(Erasing));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Idle.can_transition_to(Idle));
    }

    #[test]
    fn test_end_to_end_1024_bytes() {
        let port = ScriptedPort::new()
            .reply("otastart 1024", READY)
            .reply("otafinish", "[OTA] Firmware update completed. Total bytes: 1024\r\n")
            .reply("otastatus", "[OTA] idle\r\n");
        let mut session = session(port);
        let fw = firmware(1024);

        let mut states = Vec::new();
        let result = UploadDriver::new(&mut session, fast_options())
            .upload(&fw, |event| {
                if let UploadEvent::State(s) = event {
                    states.push(*s);
                }
            })
            .unwrap();

        assert_eq!(result.final_state(), TransferState::Completed);
        assert_eq!(result.bytes_sent(), 1024);
        assert_eq!(result.chunks_sent(), 4);
        assert!(result.warnings().is_empty());
        assert_eq!(
            states,
            vec![
                TransferState::Started,
                TransferState::Erasing,
                TransferState::Streaming,
                TransferState::Finishing,
                TransferState::Completed,
            ]
        );

        let port = session.port_mut().unwrap();
        let payload = port.payload_writes();
        assert_eq!(payload.len(), 4);
        assert!(payload.iter().all(|w| w.len() == 256));
        assert_eq!(port.commands(), vec!["otastart 1024", "otafinish", "otastatus"]);
    }

    #[test]
    fn test_uneven_chunking_sums_to_file_size() {
        let port = ScriptedPort::new().reply("otastart", READY);
        let mut session = session(port);
        let fw = firmware(1000);
        let options = UploadOptions {
            chunk_size: 300,
            ..fast_options()
        };

        let result = UploadDriver::new(&mut session, options)
            .upload(&fw, |_| {})
            .unwrap();

        let port = session.port_mut().unwrap();
        let lens: Vec<usize> = port.payload_writes().iter().map(|w| w.len()).collect();
        assert_eq!(lens, vec![300, 300, 300, 100]);
        assert_eq!(result.bytes_sent(), 1000);
    }

    #[test]
    fn test_rejected_start_writes_no_payload() {
        let port = ScriptedPort::new().reply("otastart", "Flash erase failed\r\n");
        let mut session = session(port);
        let fw = firmware(512);

        let mut driver = UploadDriver::new(&mut session, fast_options());
        let err = driver.upload(&fw, |_| {}).unwrap_err();

        assert!(matches!(err, Error::HandshakeFailed(_)));
        assert_eq!(driver.state(), TransferState::Failed);
        assert_eq!(driver.bytes_sent(), 0);
        drop(driver);
        assert!(session.port_mut().unwrap().payload_writes().is_empty());
    }

    #[test]
    fn test_silent_device_fails_start() {
        let mut session = session(ScriptedPort::new());
        let err = UploadDriver::new(&mut session, fast_options())
            .upload(&firmware(16), |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::HandshakeFailed(_)));
    }

    #[test]
    fn test_write_error_aborts_without_retry() {
        let mut port = ScriptedPort::new().reply("otastart", READY);
        // otastart command + two chunks succeed, third chunk fails
        port.fail_writes_after = Some(3);
        let mut session = session(port);
        let fw = firmware(1024);

        let mut driver = UploadDriver::new(&mut session, fast_options());
        let err = driver.upload(&fw, |_| {}).unwrap_err();

        assert!(matches!(err, Error::Io(_)));
        assert_eq!(driver.state(), TransferState::Failed);
        assert_eq!(driver.bytes_sent(), 512);
        drop(driver);
        assert_eq!(session.port_mut().unwrap().payload_writes().len(), 2);
    }

    #[test]
    fn test_finish_and_status_failures_are_soft() {
        let port = ScriptedPort::new()
            .reply("otastart", READY)
            .reply("otafinish", "ERROR: not in OTA mode\r\n");
        let mut session = session(port);

        let result = UploadDriver::new(&mut session, fast_options())
            .upload(&firmware(300), |_| {})
            .unwrap();

        assert_eq!(result.final_state(), TransferState::Completed);
        // otafinish rejected, otastatus silent
        assert_eq!(result.warnings().len(), 2);
    }

    #[test]
    fn test_verify_matching_checksum() {
        let fw = firmware(700);
        let crc_reply = format!("CRC: 0x{:08X}\r\n", fw.crc32());
        let port = ScriptedPort::new()
            .reply("otastart", READY)
            .reply("otafinish", "done\r\n")
            .reply("otastatus", "idle\r\n")
            .reply("crc", &crc_reply);
        let mut session = session(port);
        let options = UploadOptions {
            verify_crc: true,
            ..fast_options()
        };

        let mut states = Vec::new();
        let result = UploadDriver::new(&mut session, options)
            .upload(&fw, |event| {
                if let UploadEvent::State(s) = event {
                    states.push(*s);
                }
            })
            .unwrap();

        assert_eq!(result.checksum(), Some(fw.crc32()));
        assert_eq!(result.device_checksum(), Some(fw.crc32()));
        assert_eq!(result.checksum_matches(), Some(true));
        assert!(states.contains(&TransferState::Verifying));
        assert!(result.warnings().is_empty());
    }

    #[test]
    fn test_verify_mismatch_is_advisory() {
        let port = ScriptedPort::new()
            .reply("otastart", READY)
            .reply("otafinish", "done\r\n")
            .reply("otastatus", "idle\r\n")
            .reply("crc", "crc=deadbeef\r\n");
        let mut session = session(port);
        let options = UploadOptions {
            verify_crc: true,
            ..fast_options()
        };

        let result = UploadDriver::new(&mut session, options)
            .upload(&firmware(64), |_| {})
            .unwrap();

        assert_eq!(result.final_state(), TransferState::Completed);
        assert_eq!(result.device_checksum(), Some(0xDEADBEEF));
        assert_eq!(result.checksum_matches(), Some(false));
        assert_eq!(result.warnings().len(), 1);
    }

    #[test]
    fn test_verify_unsupported_command_is_advisory() {
        let port = ScriptedPort::new()
            .reply("otastart", READY)
            .reply("otafinish", "done\r\n")
            .reply("otastatus", "idle\r\n")
            .reply("crc", "invalid command \r\n");
        let mut session = session(port);
        let options = UploadOptions {
            verify_crc: true,
            ..fast_options()
        };

        let result = UploadDriver::new(&mut session, options)
            .upload(&firmware(64), |_| {})
            .unwrap();

        assert_eq!(result.final_state(), TransferState::Completed);
        assert_eq!(result.device_checksum(), None);
        assert_eq!(result.checksum_matches(), None);
    }

    #[test]
    fn test_confirmation_during_erase_wait_ends_it_early() {
        let port = ScriptedPort::new().reply(
            "otastart",
            "Ready to receive firmware binary data\r\nOTA state confirmed: RECEIVING mode active\r\n",
        );
        let mut session = session(port);
        let options = UploadOptions {
            start_timeout: Duration::from_millis(50),
            erase_wait: Duration::from_secs(30),
            end_erase_on_ready: true,
            ..fast_options()
        };

        let start = Instant::now();
        UploadDriver::new(&mut session, options)
            .upload(&firmware(10), |_| {})
            .unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_erase_wait_is_unconditional_by_default() {
        let port = ScriptedPort::new().reply(
            "otastart",
            "Ready to receive firmware binary data\r\nOTA state confirmed: RECEIVING mode active\r\n",
        );
        let mut session = session(port);
        let options = UploadOptions {
            start_timeout: Duration::from_millis(50),
            erase_wait: Duration::from_millis(300),
            ..fast_options()
        };
        assert!(!options.end_erase_on_ready);

        let start = Instant::now();
        UploadDriver::new(&mut session, options)
            .upload(&firmware(10), |_| {})
            .unwrap();
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn test_progress_every_ten_chunks_and_at_end() {
        let port = ScriptedPort::new().reply("otastart", READY);
        let mut session = session(port);
        let options = UploadOptions {
            chunk_size: 10,
            ..fast_options()
        };

        let mut progress = Vec::new();
        UploadDriver::new(&mut session, options)
            .upload(&firmware(250), |event| {
                if let UploadEvent::Progress { sent, total } = event {
                    progress.push((*sent, *total));
                }
            })
            .unwrap();

        assert_eq!(progress, vec![(100, 250), (200, 250), (250, 250)]);
    }

    #[test]
    fn test_events_include_traffic() {
        let port = ScriptedPort::new().reply("otastart", READY);
        let mut session = session(port);

        let mut sent = Vec::new();
        let mut received = Vec::new();
        UploadDriver::new(&mut session, fast_options())
            .upload(&firmware(8), |event| match event {
                UploadEvent::CommandSent(text) => sent.push((*text).to_string()),
                UploadEvent::LineReceived(line) => received.push((*line).to_string()),
                _ => {},
            })
            .unwrap();

        assert_eq!(sent, vec!["otastart 8", "otafinish", "otastatus"]);
        assert_eq!(received, vec!["Ready to receive firmware binary data"]);
    }

    #[test]
    fn test_zero_chunk_size_is_config_error() {
        let mut session = session(ScriptedPort::new());
        let options = UploadOptions {
            chunk_size: 0,
            ..fast_options()
        };
        let err = UploadDriver::new(&mut session, options)
            .upload(&firmware(8), |_| {})
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(session.port_mut().unwrap().writes.is_empty());
    }

    #[test]
    fn test_driver_is_single_use() {
        let port = ScriptedPort::new().reply("otastart", READY);
        let mut session = session(port);
        let fw = firmware(8);

        let mut driver = UploadDriver::new(&mut session, fast_options());
        driver.upload(&fw, |_| {}).unwrap();
        assert!(matches!(
            driver.upload(&fw, |_| {}),
            Err(Error::InvalidState { .. })
        ));
    }

    #[test]
    fn test_interrupt_aborts_stream() {
        let port = ScriptedPort::new().reply("otastart", READY);
        let mut session = session(port);
        let options = UploadOptions {
            chunk_size: 16,
            ..fast_options()
        };

        let mut driver = UploadDriver::new(&mut session, options);
        let err = driver
            .upload(&firmware(64), |event| {
                if let UploadEvent::State(TransferState::Streaming) = event {
                    crate::test_set_interrupted(true);
                }
            })
            .unwrap_err();
        crate::test_set_interrupted(false);

        assert!(matches!(err, Error::Interrupted));
        assert_eq!(driver.state(), TransferState::Failed);
        assert_eq!(driver.bytes_sent(), 0);
    }
}
