//! Services command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use blediag_core::RetryConfig;

use crate::cli::DeviceArgs;
use crate::config::Config;
use crate::format::{format_services_json, format_services_text};
use crate::style;
use crate::util::{connect, write_output};

pub async fn cmd_services(
    device: &DeviceArgs,
    json: bool,
    output: Option<&PathBuf>,
    quiet: bool,
    config: &Config,
) -> Result<()> {
    let session = connect(device, config, quiet).await?;

    let spinner = (!quiet && !json).then(style::discovering_spinner);
    let result = session
        .describe_services(&RetryConfig::for_discovery())
        .await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }
    let descriptions = result.context("Failed to discover services")?;

    let content = if json {
        format_services_json(&descriptions)?
    } else {
        format_services_text(&descriptions, output.is_none() && style::use_color())
    };
    super::close(&session).await;
    write_output(output, &content)
}
