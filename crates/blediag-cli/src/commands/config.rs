//! Config command implementation.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::ConfigAction;
use crate::config::Config;

pub fn cmd_config(action: ConfigAction, path: &Path, config: &Config) -> Result<()> {
    match action {
        ConfigAction::Path => {
            println!("{}", path.display());
        }
        ConfigAction::Show => {
            let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
            if content.trim().is_empty() {
                println!("# {} (defaults)", path.display());
            } else {
                print!("{}", content);
            }
        }
        ConfigAction::Init => {
            if path.exists() {
                println!("Config already exists: {}", path.display());
            } else {
                let initial = Config {
                    services: vec!["0xffe0".to_string()],
                    interval_ms: Some(1000),
                    ..Config::default()
                };
                initial.save_to(path)?;
                println!("Wrote {}", path.display());
            }
        }
    }
    Ok(())
}
