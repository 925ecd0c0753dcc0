//! Shared helpers for CLI commands.

use std::path::{Path, PathBuf};
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use crate::config::Settings;

/// Default handoff location for a stage's output.
pub fn default_handoff(settings: &Settings, name: &str) -> PathBuf {
    settings.data_dir.join("handoff").join(format!("{}.json", name))
}

/// Spinner shown while a long network step runs.
pub fn spinner(message: impl Into<String>) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap(),
    );
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_path(label: &str, path: &Path) {
    println!("  {} {}: {}", style("→").dim(), label, path.display());
}

pub fn success(message: impl std::fmt::Display) {
    println!("{} {}", style("✓").green(), message);
}

pub fn warning(message: impl std::fmt::Display) {
    eprintln!("{} {}", style("!").yellow(), message);
}

/// Parse `key=value` pairs given on the command line.
pub fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .filter(|(k, _)| !k.is_empty())
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

/// Parse a bind address that can be:
/// - Just a port: "3030" -> 127.0.0.1:3030
/// - Just a host: "0.0.0.0" -> 0.0.0.0:3030
/// - Host and port: "0.0.0.0:8080" -> 0.0.0.0:8080
pub fn parse_bind_address(bind: &str) -> (String, u16) {
    if let Ok(port) = bind.parse::<u16>() {
        return ("127.0.0.1".to_string(), port);
    }

    if let Some((host, port_str)) = bind.rsplit_once(':') {
        if let Ok(port) = port_str.parse::<u16>() {
            return (host.to_string(), port);
        }
    }

    (bind.to_string(), 3030)
}
