//! Read command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use blediag_types::Format;

use crate::cli::{DeviceArgs, TargetArgs};
use crate::config::{Config, resolve_format, resolve_target};
use crate::format::format_sample;
use crate::style;
use crate::util::{connect, write_output};

pub async fn cmd_read(
    device: &DeviceArgs,
    target: &TargetArgs,
    format: Option<Format>,
    json: bool,
    output: Option<&PathBuf>,
    quiet: bool,
    config: &Config,
) -> Result<()> {
    let target = resolve_target(target, config)?;
    let format = resolve_format(format, config);
    let session = connect(device, config, quiet).await?;

    let result = session.read(&target, format).await;
    super::close(&session).await;
    let sample = result.with_context(|| format!("Failed to read {}", target))?;

    let content = format_sample(&sample, json, output.is_none() && style::use_color())?;
    write_output(output, &content)
}
