//! uartota CLI - upload firmware to a device over its UART console.
//!
//! ## Features
//!
//! - OTA upload with progress bar and post-upload output monitor
//! - Optional CRC-32 verification against the device
//! - Offline checksum computation
//! - Interactive serial port selection
//! - Environment variable and config file defaults

use anyhow::Result;
use clap::Parser;
use console::style;
use env_logger::Env;
use log::debug;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};

mod commands;
mod config;
mod serial;

use config::Config;

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if emoji/animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether the user pressed Ctrl-C.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors with a dedicated exit code or wording.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Invalid invocation (exit code 2).
    #[error("{0}")]
    Usage(String),
    /// The user aborted (exit code 1).
    #[error("{0}")]
    Cancelled(String),
}

/// uartota - upload firmware over a UART OTA console.
///
/// Environment variables:
///   UARTOTA_PORT              - Default serial port
///   UARTOTA_BAUD              - Default baud rate (default: 115200)
///   UARTOTA_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser, Debug)]
#[command(name = "uartota")]
#[command(author, version, about, long_about = None)]
#[allow(clippy::struct_excessive_bools)]
pub(crate) struct Cli {
    /// Firmware image to upload (.bin).
    #[arg(value_name = "FIRMWARE", required_unless_present = "list_ports")]
    firmware: Option<PathBuf>,

    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, env = "UARTOTA_PORT")]
    port: Option<String>,

    /// Baud rate [default: 115200].
    #[arg(short, long, env = "UARTOTA_BAUD")]
    baud: Option<u32>,

    /// Payload bytes per write [default: 256].
    #[arg(long, value_name = "BYTES", value_parser = parse_chunk_size)]
    chunk_size: Option<usize>,

    /// Delay after each chunk in milliseconds [default: 50].
    #[arg(long, value_name = "MS")]
    pacing_ms: Option<u64>,

    /// Seconds to watch device output after the upload [default: 5].
    #[arg(long, value_name = "SECS", conflicts_with = "no_monitor")]
    monitor: Option<u64>,

    /// Skip watching device output after the upload.
    #[arg(long)]
    no_monitor: bool,

    /// Print the image's CRC-32 and exit without opening a port.
    #[arg(long, conflicts_with_all = ["verify", "list_ports"])]
    checksum_only: bool,

    /// Ask the device for its CRC-32 after the upload and compare.
    #[arg(long)]
    verify: bool,

    /// Path to a configuration file.
    #[arg(long = "config", value_name = "PATH")]
    config_path: Option<PathBuf>,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, env = "UARTOTA_NON_INTERACTIVE")]
    non_interactive: bool,

    /// List available serial ports and exit.
    #[arg(long)]
    list_ports: bool,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long)]
    quiet: bool,
}

fn parse_chunk_size(s: &str) -> Result<usize, String> {
    let size: usize = s
        .trim()
        .parse()
        .map_err(|e| format!("invalid chunk size '{s}': {e}"))?;
    if size == 0 {
        return Err("chunk size must be greater than zero".to_string());
    }
    Ok(size)
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn exit_code_for(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<CliError>() {
        Some(CliError::Usage(_)) => 2,
        _ => 1,
    }
}

fn main() -> ExitCode {
    // --- NO_COLOR and TTY detection ---
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);

    if env::var_os("NO_COLOR").is_some() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);

    debug!(
        "uartota v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );

    if let Err(e) = ctrlc::set_handler(|| INTERRUPTED.store(true, Ordering::Relaxed)) {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    uartota::set_interrupt_checker(was_interrupted);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e:#}", style("Error:").red().bold());
            ExitCode::from(exit_code_for(&e))
        },
    }
}

fn run(cli: &Cli) -> Result<()> {
    if cli.list_ports {
        return commands::ports::cmd_list_ports();
    }

    let Some(firmware) = cli.firmware.as_deref() else {
        return Err(CliError::Usage("missing <FIRMWARE> argument".to_string()).into());
    };

    if cli.checksum_only {
        return commands::checksum::cmd_checksum(firmware);
    }

    let config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    commands::upload::cmd_upload(cli, &config, firmware)
}
