//! `concord sweep` - reclaim stale instances
//!
//! One-shot by default. With `--watch` it keeps sweeping on an interval until
//! Ctrl-C; a failed round is logged and the next one still runs.

use std::time::Duration;

use anyhow::Result;
use concord_core::SweepReport;
use tracing::{info, warn};

use super::{run_blocking, Context, Outcome};
use crate::cli::output::{print_json, OutputFormat};

#[derive(Debug, Clone, Copy)]
pub struct SweepOptions {
    pub watch: bool,
    pub interval_secs: Option<u64>,
}

fn print_report(format: OutputFormat, report: &SweepReport) -> Result<()> {
    if format.is_json() {
        return print_json(report);
    }
    if report.is_empty() {
        println!("Nothing to reclaim");
    }
    for reclaim in &report.reclaimed {
        println!(
            "Reclaimed {} (silent {}s{}), released {} lock(s)",
            reclaim.instance_id,
            reclaim.age_secs,
            if reclaim.orphaned { ", orphaned" } else { "" },
            reclaim.released.len()
        );
    }
    Ok(())
}

pub async fn run(ctx: &Context, options: SweepOptions) -> Result<Outcome> {
    let coordinator = ctx.open().await?;

    if !options.watch {
        let report = run_blocking(move || coordinator.sweep()).await?;
        print_report(ctx.format, &report)?;
        return Ok(Outcome::Success);
    }

    let period = options
        .interval_secs
        .map_or_else(|| coordinator.config().sweep_interval(), Duration::from_secs);
    if !coordinator.config().sweep.policy.runs_scheduled() {
        warn!(
            policy = %coordinator.config().sweep.policy,
            "Scheduled sweeping requested while sweep.policy is opportunistic"
        );
    }
    info!(interval_secs = period.as_secs(), "Sweeping until interrupted");

    let mut ticker = tokio::time::interval(period);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let round = coordinator.clone();
                match run_blocking(move || round.sweep()).await {
                    Ok(report) if report.is_empty() && !ctx.format.is_json() => {}
                    Ok(report) => print_report(ctx.format, &report)?,
                    Err(e) => warn!(error = %e, "Sweep failed; retrying next interval"),
                }
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Interrupted, stopping sweeper");
                return Ok(Outcome::Success);
            }
        }
    }
}
