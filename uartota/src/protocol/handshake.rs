//! Command/response handshake over the text protocol.
//!
//! The device answers commands with free-form log text rather than framed
//! status codes. The engine sends a command, collects reply lines for a
//! bounded time and asks a [`ResponseClassifier`] what they mean. The upload
//! driver only ever sees the resulting [`HandshakeOutcome`], so a stricter
//! classifier can replace [`LenientClassifier`] without touching it.

use std::time::Instant;

use log::debug;

use crate::error::Result;
use crate::port::Port;
use crate::protocol::command::Command;
use crate::session::Session;

/// Meaning of a single reply line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    /// Contains the success pattern at this index.
    Success(usize),
    /// Contains a failure pattern.
    Failure,
    /// Matches nothing in particular.
    Neutral,
}

/// How a handshake ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No reply was requested.
    Sent,
    /// A success pattern was seen.
    Confirmed,
    /// A failure pattern was seen.
    Rejected,
    /// Replies arrived but none matched a pattern.
    Tentative,
    /// Nothing arrived before the timeout.
    Silent,
}

impl Verdict {
    /// Whether this verdict counts as success.
    pub fn is_success(self) -> bool {
        matches!(self, Self::Sent | Self::Confirmed | Self::Tentative)
    }
}

/// Result of one command/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeOutcome {
    /// Whether the exchange counts as successful.
    pub matched_success: bool,
    /// Non-empty reply lines in arrival order.
    pub lines: Vec<String>,
    /// Detailed classification.
    pub verdict: Verdict,
}

impl HandshakeOutcome {
    fn new(verdict: Verdict, lines: Vec<String>) -> Self {
        Self {
            matched_success: verdict.is_success(),
            lines,
            verdict,
        }
    }

    /// Whether any reply line contains `needle`.
    pub fn saw(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }
}

/// Decides what reply lines mean for a given command.
pub trait ResponseClassifier {
    /// Classify one non-empty reply line.
    fn classify_line(&self, cmd: &Command, line: &str) -> LineClass;

    /// Decide the verdict once the timeout expired without a final answer.
    fn resolve_timeout(&self, cmd: &Command, lines: &[String], success_seen: bool) -> Verdict;
}

/// Substring matching with lenient timeout handling.
///
/// Failure patterns are matched case-insensitively and win over success
/// patterns on the same line. At timeout, a previously seen success pattern
/// confirms, any other reply is tentatively accepted, and silence fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct LenientClassifier;

impl ResponseClassifier for LenientClassifier {
    fn classify_line(&self, cmd: &Command, line: &str) -> LineClass {
        let lower = line.to_lowercase();
        if cmd
            .failure_patterns()
            .iter()
            .any(|p| lower.contains(&p.to_lowercase()))
        {
            return LineClass::Failure;
        }

        cmd.success_patterns()
            .iter()
            .position(|p| line.contains(p.as_str()))
            .map_or(LineClass::Neutral, LineClass::Success)
    }

    fn resolve_timeout(&self, _cmd: &Command, lines: &[String], success_seen: bool) -> Verdict {
        if success_seen {
            Verdict::Confirmed
        } else if lines.is_empty() {
            Verdict::Silent
        } else {
            Verdict::Tentative
        }
    }
}

/// Receives a copy of everything exchanged during a handshake.
pub trait HandshakeObserver {
    /// A command was written to the port.
    fn command_sent(&mut self, _text: &str) {}

    /// A reply line was received.
    fn line_received(&mut self, _line: &str) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct NoopObserver;

impl HandshakeObserver for NoopObserver {}

/// Sends commands and classifies the replies.
#[derive(Debug, Clone, Default)]
pub struct HandshakeEngine<C = LenientClassifier> {
    classifier: C,
}

impl HandshakeEngine {
    /// Engine with the default [`LenientClassifier`].
    pub fn new() -> Self {
        Self::default()
    }
}

impl<C: ResponseClassifier> HandshakeEngine<C> {
    /// Engine with a custom classifier.
    pub fn with_classifier(classifier: C) -> Self {
        Self { classifier }
    }

    /// The classifier in use.
    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Send `cmd` and wait for its reply.
    pub fn send_command<P: Port>(
        &self,
        session: &mut Session<P>,
        cmd: &Command,
    ) -> Result<HandshakeOutcome> {
        self.send_command_observed(session, cmd, &mut NoopObserver)
    }

    /// Send `cmd` and wait for its reply, reporting traffic to `observer`.
    ///
    /// Transport errors propagate; everything the device says is turned into
    /// a verdict.
    pub fn send_command_observed<P, O>(
        &self,
        session: &mut Session<P>,
        cmd: &Command,
        observer: &mut O,
    ) -> Result<HandshakeOutcome>
    where
        P: Port,
        O: HandshakeObserver + ?Sized,
    {
        session.write_bytes(&cmd.wire_bytes())?;
        debug!("→ {}", cmd.text());
        observer.command_sent(cmd.text());

        if !cmd.wait_response() {
            return Ok(HandshakeOutcome::new(Verdict::Sent, Vec::new()));
        }

        let deadline = Instant::now() + cmd.timeout();
        let mut lines = Vec::new();
        let mut seen = vec![false; cmd.success_patterns().len()];

        while let Some(line) = session.read_line(deadline)? {
            if !line.is_empty() {
                debug!("← {line}");
                observer.line_received(&line);

                match self.classifier.classify_line(cmd, &line) {
                    LineClass::Failure => {
                        lines.push(line);
                        return Ok(HandshakeOutcome::new(Verdict::Rejected, lines));
                    },
                    LineClass::Success(index) => {
                        lines.push(line);
                        if let Some(slot) = seen.get_mut(index) {
                            *slot = true;
                        }
                        if !cmd.continues_after_success() || seen.iter().all(|s| *s) {
                            return Ok(HandshakeOutcome::new(Verdict::Confirmed, lines));
                        }
                    },
                    LineClass::Neutral => lines.push(line),
                }
            }

            if Instant::now() >= deadline {
                break;
            }
        }

        let success_seen = seen.iter().any(|s| *s);
        let verdict = self
            .classifier
            .resolve_timeout(cmd, &lines, success_seen);
        debug!("'{}' timed out with {} line(s): {verdict:?}", cmd.text(), lines.len());
        Ok(HandshakeOutcome::new(verdict, lines))
    }
}
