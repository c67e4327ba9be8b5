//! Upload command implementation.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::warn;
use std::path::Path;
use std::time::Duration;
use uartota::monitor::DEFAULT_MONITOR_DURATION;
use uartota::port::DEFAULT_BAUD;
use uartota::{
    Firmware, SerialConfig, Session, UploadDriver, UploadEvent, UploadOptions, UploadResult,
    format_crc32, monitor,
};

use crate::config::Config;
use crate::serial::{SerialOptions, select_serial_port};
use crate::{Cli, CliError, use_fancy_output, was_interrupted};

/// Merge CLI flags over config file values over library defaults.
fn upload_options(cli: &Cli, config: &Config) -> UploadOptions {
    let defaults = UploadOptions::default();
    UploadOptions {
        chunk_size: cli
            .chunk_size
            .or(config.upload.chunk_size)
            .unwrap_or(defaults.chunk_size),
        pacing: cli
            .pacing_ms
            .or(config.upload.pacing_ms)
            .map_or(defaults.pacing, Duration::from_millis),
        verify_crc: cli.verify || config.upload.verify,
        ..defaults
    }
}

fn monitor_duration(cli: &Cli, config: &Config) -> Duration {
    if cli.no_monitor {
        return Duration::ZERO;
    }
    cli.monitor
        .or(config.upload.monitor_secs)
        .map_or(DEFAULT_MONITOR_DURATION, Duration::from_secs)
}

fn progress_bar(cli: &Cli, total: usize) -> ProgressBar {
    if cli.quiet || !use_fancy_output() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total as u64);
    let bar_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}")
        .map_or_else(|_| ProgressStyle::default_bar(), |s| s.progress_chars("#>-"));
    pb.set_style(bar_style);
    pb.set_draw_target(ProgressDrawTarget::stderr());
    pb
}

/// Upload the firmware at `path`, then watch device output.
pub(crate) fn cmd_upload(cli: &Cli, config: &Config, path: &Path) -> Result<()> {
    let firmware = Firmware::from_file(path)
        .with_context(|| format!("Failed to load firmware {}", path.display()))?;

    if !firmware.has_bin_extension() {
        warn!(
            "{} does not have a .bin extension; uploading anyway",
            path.display()
        );
    }

    if !cli.quiet {
        eprintln!(
            "{} {} ({} bytes)",
            style("📦").cyan(),
            path.display(),
            firmware.len()
        );
    }

    let options = upload_options(cli, config);
    let port = select_serial_port(
        &SerialOptions {
            port: cli.port.clone(),
            non_interactive: cli.non_interactive,
        },
        config,
    )?;
    let baud = cli.baud.or(config.connection.baud).unwrap_or(DEFAULT_BAUD);

    if !cli.quiet {
        eprintln!("{} Using port {port} at {baud} baud", style("🔌").cyan());
    }
    let mut session = Session::connect(&SerialConfig::new(&port, baud))
        .with_context(|| format!("Failed to open serial port {port}"))?;

    let pb = progress_bar(cli, firmware.len());
    let outcome = UploadDriver::new(&mut session, options).upload(&firmware, |event| match event {
        UploadEvent::State(state) => pb.set_message(state.to_string()),
        UploadEvent::Progress { sent, .. } => pb.set_position(*sent as u64),
        _ => {},
    });

    let result = match outcome {
        Ok(result) => {
            pb.finish_with_message("done");
            result
        },
        Err(uartota::Error::Interrupted) => {
            pb.abandon_with_message("interrupted");
            return Err(CliError::Cancelled("Upload interrupted".to_string()).into());
        },
        Err(e) => {
            pb.abandon_with_message("failed");
            return Err(anyhow::Error::new(e).context("Upload failed"));
        },
    };

    if !cli.quiet {
        print_summary(&result);
    }

    let duration = monitor_duration(cli, config);
    if !duration.is_zero() && !was_interrupted() {
        if !cli.quiet {
            eprintln!(
                "{} Device output ({}s, Ctrl-C to stop):",
                style("👀").cyan(),
                duration.as_secs()
            );
        }
        monitor(&mut session, duration, |line| println!("{line}"))
            .context("Monitoring device output failed")?;
    }

    session.disconnect()?;
    Ok(())
}

fn print_summary(result: &UploadResult) {
    eprintln!(
        "{} Upload complete: {} bytes in {} chunks",
        style("✓").green(),
        result.bytes_sent(),
        result.chunks_sent()
    );

    if let Some(expected) = result.checksum() {
        match result.device_checksum() {
            Some(actual) if actual == expected => eprintln!(
                "{} Checksum verified: {}",
                style("✓").green(),
                format_crc32(actual)
            ),
            Some(actual) => eprintln!(
                "{} Checksum mismatch: expected {}, device reported {}",
                style("⚠").yellow(),
                format_crc32(expected),
                format_crc32(actual)
            ),
            None => eprintln!(
                "{} Device did not report a checksum (expected {})",
                style("⚠").yellow(),
                format_crc32(expected)
            ),
        }
    }

    if !result.warnings().is_empty() {
        eprintln!(
            "{} {} warning(s) during upload",
            style("⚠").yellow(),
            result.warnings().len()
        );
    }
}
