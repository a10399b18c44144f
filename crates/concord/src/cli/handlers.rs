//! CLI command handlers that bridge between `clap` and internal logic

use std::path::PathBuf;

use anyhow::Result;
use clap::ArgMatches;

use crate::{
    cli::{commands::build_cli, output::OutputFormat},
    commands::{
        decision, instance,
        lock::{self, Refresh},
        sweep, Context, Outcome, INSTANCE_ENV,
    },
};

/// Format an error for user display (no stack traces)
pub fn format_error(err: &anyhow::Error) -> String {
    let msg = err.to_string();
    if let Some(source) = err.source() {
        let source_msg = source.to_string();
        if !msg.contains(&source_msg) && !source_msg.is_empty() {
            return format!("{msg}\nCause: {source_msg}");
        }
    }
    if let Some(core) = err.downcast_ref::<concord_core::Error>() {
        return format!("[{}] {msg}", core.code());
    }
    msg
}

fn context(matches: &ArgMatches) -> Context {
    let root = matches
        .get_one::<String>("root")
        .map_or_else(|| PathBuf::from("."), PathBuf::from);
    let instance = matches
        .get_one::<String>("instance")
        .cloned()
        .or_else(|| std::env::var(INSTANCE_ENV).ok())
        .filter(|raw| !raw.trim().is_empty());
    Context {
        root,
        format: OutputFormat::from_json_flag(matches.get_flag("json")),
        instance,
    }
}

fn required(matches: &ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("{name} is required"))
}

fn optional(matches: &ArgMatches, name: &str) -> String {
    matches.get_one::<String>(name).cloned().unwrap_or_default()
}

pub async fn handle_instance(ctx: &Context, sub_m: &ArgMatches) -> Result<Outcome> {
    match sub_m.subcommand() {
        Some(("register", m)) => {
            let options = instance::RegisterOptions {
                task: optional(m, "task"),
                role: optional(m, "role"),
            };
            instance::register(ctx, options).await
        }
        Some(("heartbeat", _)) => instance::heartbeat(ctx).await,
        Some(("unregister", _)) => instance::unregister(ctx).await,
        Some(("list", _)) => instance::list(ctx).await,
        _ => Err(anyhow::anyhow!("Unknown instance subcommand")),
    }
}

pub async fn handle_lock(ctx: &Context, sub_m: &ArgMatches) -> Result<Outcome> {
    match sub_m.subcommand() {
        Some(("acquire", m)) => {
            lock::acquire(ctx, required(m, "path")?, optional(m, "intent")).await
        }
        Some(("release", m)) => lock::release(ctx, required(m, "path")?).await,
        Some(("renew", m)) => lock::refresh(ctx, required(m, "path")?, Refresh::Renew).await,
        Some(("record-write", m)) => {
            lock::refresh(ctx, required(m, "path")?, Refresh::RecordWrite).await
        }
        Some(("check", m)) => lock::check(ctx, required(m, "path")?).await,
        Some(("gate", m)) => lock::gate(ctx, required(m, "path")?, optional(m, "intent")).await,
        Some(("status", _)) => lock::status(ctx).await,
        Some(("release-all", _)) => lock::release_all(ctx).await,
        _ => Err(anyhow::anyhow!("Unknown lock subcommand")),
    }
}

pub async fn handle_decision(ctx: &Context, sub_m: &ArgMatches) -> Result<Outcome> {
    match sub_m.subcommand() {
        Some(("log", m)) => {
            let options = decision::LogOptions {
                category: required(m, "category")?,
                title: required(m, "title")?,
                description: optional(m, "description"),
                scope: optional(m, "scope"),
                status: optional(m, "status"),
            };
            decision::log(ctx, options).await
        }
        Some(("list", m)) => {
            let category = m.get_one::<String>("category").map(String::as_str);
            let limit = m.get_one::<usize>("limit").copied().unwrap_or(20);
            decision::list(ctx, category, limit).await
        }
        _ => Err(anyhow::anyhow!("Unknown decision subcommand")),
    }
}

pub async fn handle_sweep(ctx: &Context, sub_m: &ArgMatches) -> Result<Outcome> {
    let options = sweep::SweepOptions {
        watch: sub_m.get_flag("watch"),
        interval_secs: sub_m.get_one::<u64>("interval").copied(),
    };
    sweep::run(ctx, options).await
}

pub async fn run_cli() -> Result<Outcome> {
    let matches = match build_cli().try_get_matches() {
        Ok(m) => m,
        Err(e) => {
            use clap::error::ErrorKind;
            let shown = matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
            e.print()?;
            return Ok(if shown { Outcome::Success } else { Outcome::Usage });
        }
    };

    let ctx = context(&matches);
    tracing::debug!(root = %ctx.root.display(), instance = ?ctx.instance, "Dispatching");

    match matches.subcommand() {
        Some(("instance", sub_m)) => handle_instance(&ctx, sub_m).await,
        Some(("lock", sub_m)) => handle_lock(&ctx, sub_m).await,
        Some(("decision", sub_m)) => handle_decision(&ctx, sub_m).await,
        Some(("sweep", sub_m)) => handle_sweep(&ctx, sub_m).await,
        _ => Err(anyhow::anyhow!("Unknown command")),
    }
}
