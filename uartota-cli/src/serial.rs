//! Serial port selection.
//!
//! Resolution order: explicit `--port` / `UARTOTA_PORT`, the config file, a
//! single detected port, then an interactive choice when several are present.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    console::style,
    dialoguer::{Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, info, warn},
    std::{cmp::Ordering, io::IsTerminal},
    uartota::{NativePortEnumerator, PortEnumerator, PortInfo},
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub(crate) struct SerialOptions {
    /// Explicit port specified via CLI or environment.
    pub port: Option<String>,
    /// Non-interactive mode (fail if multiple ports).
    pub non_interactive: bool,
}

/// No usable port could be chosen (exit code 1).
fn no_port_err(message: &str) -> anyhow::Error {
    anyhow::anyhow!("{message}")
}

/// One-line description of a detected port.
pub(crate) fn describe_port(port: &PortInfo) -> String {
    let ids = match (port.vid, port.pid) {
        (Some(vid), Some(pid)) => format!(" ({vid:04X}:{pid:04X})"),
        _ => String::new(),
    };
    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();
    format!("{}{ids}{product}", port.name)
}

/// Enumerate ports, treating enumeration failure as "no ports".
pub(crate) fn detect_ports() -> Vec<PortInfo> {
    match NativePortEnumerator::list_ports() {
        Ok(ports) => ports,
        Err(e) => {
            warn!("Failed to enumerate serial ports: {e}");
            Vec::new()
        },
    }
}

/// Pick the port to use.
pub(crate) fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<String> {
    if let Some(name) = preconfigured_port(options, config) {
        return Ok(name);
    }
    choose_detected_port(detect_ports(), options.non_interactive)
}

fn preconfigured_port(options: &SerialOptions, config: &Config) -> Option<String> {
    if let Some(port) = &options.port {
        return Some(port.clone());
    }
    if let Some(port) = &config.connection.port {
        debug!("Using port from config: {port}");
        return Some(port.clone());
    }
    None
}

fn choose_detected_port(mut ports: Vec<PortInfo>, non_interactive: bool) -> Result<String> {
    match ports.len().cmp(&1) {
        Ordering::Less => Err(no_port_err(
            "No serial ports found. Connect the device or pass --port",
        )),
        Ordering::Equal => {
            let port = ports.remove(0);
            info!("Auto-selected port: {}", describe_port(&port));
            Ok(port.name)
        },
        Ordering::Greater if non_interactive => Err(no_port_err(
            "Multiple serial ports found; pass --port in non-interactive mode",
        )),
        Ordering::Greater => {
            ensure_interactive_terminal()?;
            select_port_interactive(ports)
        },
    }
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(no_port_err(
            "Multiple serial ports found and no terminal to prompt on; pass --port",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                CliError::Cancelled("Port selection cancelled".to_string()).into()
            } else {
                no_port_err("Port selection prompt failed")
            }
        },
    }
}

fn select_port_interactive(ports: Vec<PortInfo>) -> Result<String> {
    eprintln!(
        "{} Found {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    let term_width = console::Term::stderr().size().1 as usize;
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|p| console::truncate_str(&describe_port(p), max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select serial port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    match selection {
        Some(index) => ports
            .into_iter()
            .nth(index)
            .map(|p| p.name)
            .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}")),
        None => Err(CliError::Cancelled("Port selection cancelled".to_string()).into()),
    }
}
