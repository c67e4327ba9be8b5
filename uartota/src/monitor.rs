//! Post-upload device output monitor.

use std::time::{Duration, Instant};

use log::{debug, info};

use crate::error::{Error, Result};
use crate::port::Port;
use crate::session::Session;

/// Poll interval while monitoring.
pub const MONITOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default monitoring window after an upload.
pub const DEFAULT_MONITOR_DURATION: Duration = Duration::from_secs(5);

/// Watch device output for `duration`, passing each cleaned, non-empty line
/// to `on_line`.
///
/// Returns the number of lines seen. Quiet periods are not errors, and an
/// interruption ends the window early with `Ok`.
pub fn monitor<P, F>(session: &mut Session<P>, duration: Duration, mut on_line: F) -> Result<usize>
where
    P: Port,
    F: FnMut(&str),
{
    if duration.is_zero() {
        return Ok(0);
    }

    info!("Monitoring device output for {}s...", duration.as_secs_f32());
    let deadline = Instant::now() + duration;
    let mut count = 0;

    loop {
        match session.read_line_polling(deadline, MONITOR_POLL_INTERVAL) {
            Ok(Some(line)) => {
                let cleaned = clean_monitor_text(&line);
                if !cleaned.trim().is_empty() {
                    on_line(&cleaned);
                    count += 1;
                }
            },
            Ok(None) => {},
            Err(Error::Interrupted) => {
                debug!("Monitor interrupted after {count} line(s)");
                break;
            },
            Err(e) => return Err(e),
        }

        if Instant::now() >= deadline {
            break;
        }
    }

    info!("Monitoring complete");
    Ok(count)
}

/// Drop control characters other than tab from one received line.
pub fn clean_monitor_text(line: &str) -> String {
    line.chars().filter(|&ch| ch == '\t' || !ch.is_control()).collect()
}
