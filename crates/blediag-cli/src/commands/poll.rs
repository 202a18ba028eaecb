//! Poll command implementation.
//!
//! Runs the poll scheduler and prints samples as they are recorded. With
//! `--output` the whole series is written as CSV on exit instead.

use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use blediag_core::{PollOptions, PollScheduler, TickOverlap, write_csv};
use blediag_types::{Format, Sample};
use tokio::time::{Instant, MissedTickBehavior, interval};

use crate::cli::{DeviceArgs, TargetArgs};
use crate::config::{Config, resolve_format, resolve_interval, resolve_target};
use crate::format::format_sample;
use crate::style;
use crate::util::connect;

/// How often new samples are checked for printing.
const DRAIN_INTERVAL: Duration = Duration::from_millis(200);

/// Arguments for the poll command.
pub struct PollArgs<'a> {
    pub device: &'a DeviceArgs,
    pub target: &'a TargetArgs,
    pub format: Option<Format>,
    pub interval_ms: Option<u64>,
    pub count: u32,
    pub duration: Option<u64>,
    pub skip_while_busy: bool,
    pub json: bool,
    pub output: Option<&'a PathBuf>,
    pub quiet: bool,
}

pub async fn cmd_poll(args: PollArgs<'_>, config: &Config) -> Result<()> {
    let PollArgs {
        device,
        target,
        format,
        interval_ms,
        count,
        duration,
        skip_while_busy,
        json,
        output,
        quiet,
    } = args;

    let target = resolve_target(target, config)?;
    let overlap = if skip_while_busy {
        TickOverlap::SkipWhileBusy
    } else {
        TickOverlap::Concurrent
    };
    let mut builder = PollOptions::builder()
        .interval(resolve_interval(interval_ms, config))
        .format(resolve_format(format, config))
        .overlap(overlap);
    if let Some(ms) = config.settle_ms {
        builder = builder.settle(Duration::from_millis(ms));
    }
    let options = builder.build();
    options.validate().context("Invalid poll interval")?;

    let session = connect(device, config, quiet).await?;
    let scheduler = PollScheduler::with_options(session.clone(), target, options.clone());
    if let Err(e) = scheduler.start(options.interval).await {
        super::close(&session).await;
        return Err(e).context("Failed to start polling");
    }

    if !quiet {
        eprintln!(
            "Polling {} every {} ms. Press Ctrl+C to stop.",
            target,
            options.interval.as_millis()
        );
    }

    let deadline = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let color = style::use_color();
    let mut printed = 0usize;
    let mut drain = interval(DRAIN_INTERVAL);
    drain.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let result: Result<()> = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            _ = drain.tick() => {
                let samples = session.series().snapshot().await;
                if output.is_none()
                    && let Err(e) = print_samples(&samples[printed.min(samples.len())..], json, color)
                {
                    break Err(e);
                }
                printed = samples.len();
                if count > 0 && printed >= count as usize {
                    break Ok(());
                }
                if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                    break Ok(());
                }
            }
        }
    };

    scheduler.stop().await;
    let state = scheduler.state().await;
    super::close(&session).await;

    if let Some(path) = output {
        let mut samples = session.series().snapshot().await;
        if count > 0 {
            samples.truncate(count as usize);
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        write_csv(std::io::BufWriter::new(file), &samples)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        if !quiet {
            eprintln!("Wrote {} sample(s) to {}", samples.len(), path.display());
        }
    } else if !quiet {
        eprintln!(
            "{} tick(s), {} sample(s) recorded.",
            state.invocation_count,
            session.series().len().await
        );
    }
    result
}

fn print_samples(samples: &[Sample], json: bool, color: bool) -> Result<()> {
    let mut out = String::new();
    for sample in samples {
        out.push_str(&format_sample(sample, json, color)?);
    }
    print!("{}", out);
    io::stdout().flush()?;
    Ok(())
}
