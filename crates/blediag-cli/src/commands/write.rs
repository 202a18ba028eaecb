//! Write command implementation.

use std::path::PathBuf;

use anyhow::{Context, Result};
use blediag_core::{Terminator, WriteMode};
use blediag_types::Format;

use crate::cli::{DeviceArgs, TargetArgs};
use crate::config::{Config, resolve_format, resolve_target};
use crate::format::format_write;
use crate::util::{connect, write_output};

/// Arguments for the write command.
pub struct WriteArgs<'a> {
    pub device: &'a DeviceArgs,
    pub target: &'a TargetArgs,
    pub format: Option<Format>,
    pub mode: WriteMode,
    pub terminator: Terminator,
    pub value: &'a str,
    pub json: bool,
    pub output: Option<&'a PathBuf>,
    pub quiet: bool,
}

pub async fn cmd_write(args: WriteArgs<'_>, config: &Config) -> Result<()> {
    let WriteArgs {
        device,
        target,
        format,
        mode,
        terminator,
        value,
        json,
        output,
        quiet,
    } = args;

    let target = resolve_target(target, config)?;
    let format = resolve_format(format, config);
    if !format.is_encodable() {
        anyhow::bail!(
            "Format {} cannot encode values; pick an explicit format with --format",
            format
        );
    }

    let session = connect(device, config, quiet).await?;
    let result = session
        .write(&target, format, value, mode, terminator)
        .await;
    super::close(&session).await;
    let report = result.with_context(|| format!("Failed to write to {}", target))?;

    write_output(output, &format_write(&target, &report, json)?)
}
