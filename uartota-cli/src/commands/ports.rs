//! `--list-ports` implementation.

use anyhow::Result;
use console::style;

use crate::serial::{describe_port, detect_ports};

/// Print detected ports to stdout, one per line.
pub(crate) fn cmd_list_ports() -> Result<()> {
    let ports = detect_ports();

    if ports.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &ports {
        println!("{}", describe_port(port));
    }
    Ok(())
}
