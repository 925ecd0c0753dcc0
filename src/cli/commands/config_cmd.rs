//! Configuration management commands.

use console::style;

use crate::config::{Config, Settings};

/// Print the resolved settings and where they came from.
pub fn cmd_config_show(settings: &Settings, config: &Config, format: &str) -> anyhow::Result<()> {
    let source = config
        .source_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults (no config file found)".to_string());
    eprintln!("{} Config: {}", style("→").dim(), source);

    let view = settings.view();
    let rendered = match format {
        "json" => serde_json::to_string_pretty(&view)?,
        "toml" => toml::to_string_pretty(&view)?,
        other => anyhow::bail!("Unknown format '{}', expected json or toml", other),
    };
    println!("{}", rendered);
    Ok(())
}
