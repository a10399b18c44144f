//! `concord lock` - lease operations on project files
//!
//! JSON mode prints the outcome as returned by the core; human mode prints a
//! line per outcome. Any outcome that leaves the caller without the lease it
//! asked for exits with [`Outcome::Denied`].

use anyhow::Result;
use concord_core::{
    AcquireOutcome, ConflictCheck, LockIssue, LockPath, LockRecord, ReleaseOutcome,
    RenewOutcome,
};
use serde::Serialize;

use super::{run_blocking, Context, Outcome};
use crate::cli::output::print_json;

fn stamp(record: &LockRecord) -> String {
    record.expires_at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn report_issue(issue: Option<LockIssue>) {
    if let Some(issue) = issue {
        println!("✗ [{}] {issue}", issue.code());
    }
}

pub async fn acquire(ctx: &Context, path: String, intent: String) -> Result<Outcome> {
    let holder = ctx.instance_id()?;
    let coordinator = ctx.open().await?;

    let outcome =
        run_blocking(move || coordinator.locks().acquire(&holder, path, &intent)).await?;

    if ctx.format.is_json() {
        print_json(&outcome)?;
    } else if let AcquireOutcome::Granted { record, renewed } = &outcome {
        let verb = if *renewed { "Renewed" } else { "Acquired" };
        println!("✓ {verb} '{}' until {}", record.path, stamp(record));
    } else {
        report_issue(outcome.issue());
    }
    Ok(Outcome::from_granted(outcome.is_granted()))
}

pub async fn release(ctx: &Context, path: String) -> Result<Outcome> {
    let holder = ctx.instance_id()?;
    let coordinator = ctx.open().await?;

    let requester = holder.clone();
    let outcome = run_blocking(move || coordinator.locks().release(&holder, path)).await?;

    if ctx.format.is_json() {
        print_json(&outcome)?;
    } else if let ReleaseOutcome::Released { path } = &outcome {
        println!("✓ Released '{path}'");
    } else {
        report_issue(outcome.issue(&requester));
    }
    Ok(Outcome::from_granted(outcome.is_released()))
}

/// `renew` and `record-write` share their outcome type.
#[derive(Debug, Clone, Copy)]
pub enum Refresh {
    Renew,
    RecordWrite,
}

pub async fn refresh(ctx: &Context, path: String, mode: Refresh) -> Result<Outcome> {
    let holder = ctx.instance_id()?;
    let coordinator = ctx.open().await?;

    let requester = holder.clone();
    let outcome = run_blocking(move || match mode {
        Refresh::Renew => coordinator.locks().renew(&holder, path),
        Refresh::RecordWrite => coordinator.locks().record_write(&holder, path),
    })
    .await?;

    if ctx.format.is_json() {
        print_json(&outcome)?;
    } else if let RenewOutcome::Renewed { record } = &outcome {
        println!(
            "✓ Lease on '{}' extended until {} ({})",
            record.path,
            stamp(record),
            record.fingerprint
        );
    } else {
        report_issue(outcome.issue(&requester));
    }
    Ok(Outcome::from_granted(outcome.is_renewed()))
}

pub async fn check(ctx: &Context, path: String) -> Result<Outcome> {
    let coordinator = ctx.open().await?;
    let outcome = run_blocking(move || coordinator.locks().check_conflict(path)).await?;

    if ctx.format.is_json() {
        print_json(&outcome)?;
    } else {
        match &outcome {
            ConflictCheck::Clean { path, holder, .. } => {
                println!("✓ '{path}' unchanged since {holder} recorded it");
            }
            ConflictCheck::Unlocked { path } => println!("'{path}' is not locked"),
            ConflictCheck::Conflict { .. } => report_issue(outcome.issue()),
        }
    }
    Ok(Outcome::from_granted(!matches!(
        outcome,
        ConflictCheck::Conflict { .. }
    )))
}

pub async fn gate(ctx: &Context, path: String, intent: String) -> Result<Outcome> {
    let holder = ctx.instance_id()?;
    let coordinator = ctx.open().await?;

    let decision =
        run_blocking(move || coordinator.locks().gate_write(&holder, path, &intent)).await?;

    if ctx.format.is_json() {
        print_json(&decision)?;
    } else if decision.allowed {
        println!("✓ {}", decision.reason);
    } else {
        println!("✗ {}", decision.reason);
    }
    Ok(Outcome::from_granted(decision.allowed))
}

#[derive(Debug, Serialize)]
struct LockList {
    locks: Vec<LockRecord>,
    count: usize,
}

pub async fn status(ctx: &Context) -> Result<Outcome> {
    let coordinator = ctx.open().await?;
    let locks = run_blocking(move || coordinator.locks().list_locks()).await?;

    if ctx.format.is_json() {
        let count = locks.len();
        print_json(&LockList { locks, count })?;
    } else if locks.is_empty() {
        println!("No active locks");
    } else {
        for record in &locks {
            println!(
                "{:<48} {:<40} until {}  {}",
                record.path.as_str(),
                record.holder.as_str(),
                stamp(record),
                record.intent
            );
        }
    }
    Ok(Outcome::Success)
}

#[derive(Debug, Serialize)]
struct ReleasedAll {
    released: Vec<LockPath>,
    count: usize,
}

pub async fn release_all(ctx: &Context) -> Result<Outcome> {
    let holder = ctx.instance_id()?;
    let coordinator = ctx.open().await?;

    let released = run_blocking(move || coordinator.locks().release_all(&holder)).await?;

    if ctx.format.is_json() {
        let count = released.len();
        print_json(&ReleasedAll { released, count })?;
    } else {
        println!("Released {} lock(s)", released.len());
        for path in &released {
            println!("  {path}");
        }
    }
    Ok(Outcome::Success)
}
