//! Config command implementation.

use std::fs;
use std::path::PathBuf;

use crate::cli::ConfigFormat;
use crate::config::{add_config_comments, render_config, Config};

/// Writes the default configuration, or prints it when `output` is `-`.
pub fn command_config(
    output: Option<PathBuf>,
    format: ConfigFormat,
    commented: bool,
) -> anyhow::Result<()> {
    let config = Config::default();
    let output = output.unwrap_or_else(|| PathBuf::from("bbs-discovery.yaml"));

    let mut content = render_config(&config, &format)?;
    if commented && matches!(format, ConfigFormat::Yaml) {
        content = add_config_comments(content);
    }

    if output.to_string_lossy() == "-" {
        print!("{}", content);
    } else {
        fs::write(&output, content)?;
        println!("✅ Configuration written to: {}", output.display());
    }

    Ok(())
}

/// Prints the effective merged configuration.
pub fn show_config(config: &Config, format: ConfigFormat) -> anyhow::Result<()> {
    print!("{}", render_config(config, &format)?);
    Ok(())
}
