//! Subscribe command implementation.
//!
//! Prints each notification as it arrives until Ctrl+C or `--count`.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use blediag_core::SubscribeOutcome;
use blediag_types::Format;
use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

use crate::cli::{DeviceArgs, TargetArgs};
use crate::config::{Config, resolve_format, resolve_target};
use crate::format::format_sample;
use crate::style;
use crate::util::connect;

#[allow(clippy::too_many_arguments)]
pub async fn cmd_subscribe(
    device: &DeviceArgs,
    target: &TargetArgs,
    format: Option<Format>,
    count: u32,
    json: bool,
    output: Option<&PathBuf>,
    quiet: bool,
    config: &Config,
) -> Result<()> {
    let target = resolve_target(target, config)?;
    let format = resolve_format(format, config);
    let session = connect(device, config, quiet).await?;

    let outcome = session
        .subscribe(&target, format)
        .await
        .with_context(|| format!("Failed to subscribe to {}", target));
    let mut stream = match outcome {
        Ok(SubscribeOutcome::Started(stream)) => stream,
        Ok(SubscribeOutcome::AlreadyActive) => {
            super::close(&session).await;
            anyhow::bail!("A subscription to {} is already active", target);
        }
        Err(e) => {
            super::close(&session).await;
            return Err(e);
        }
    };

    let mut file = match output {
        Some(path) => Some(
            File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?,
        ),
        None => None,
    };
    let color = file.is_none() && style::use_color();

    if !quiet {
        eprintln!("Subscribed to {}. Press Ctrl+C to stop.", target);
    }

    let mut received: u32 = 0;
    let result: Result<()> = loop {
        if count > 0 && received >= count {
            break Ok(());
        }
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            next = stream.next() => {
                let Some(sample) = next else {
                    break Err(anyhow::anyhow!("Notification stream ended"));
                };
                received += 1;
                let line = match format_sample(&sample, json, color) {
                    Ok(line) => line,
                    Err(e) => break Err(e),
                };
                let written = match file.as_mut() {
                    Some(file) => file.write_all(line.as_bytes()).await,
                    None => {
                        print!("{}", line);
                        io::stdout().flush()
                    }
                };
                if let Err(e) = written {
                    break Err(e.into());
                }
            }
        }
    };

    if let Some(mut file) = file {
        file.flush().await.context("Failed to flush output")?;
    }
    super::close(&session).await;
    if !quiet {
        eprintln!("Received {} notification(s).", received);
    }
    result
}
