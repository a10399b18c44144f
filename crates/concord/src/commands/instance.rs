//! `concord instance` - registration and liveness

use anyhow::Result;
use concord_core::{Error, Instance, InstanceId};
use serde::Serialize;

use super::{run_blocking, Context, Outcome, INSTANCE_ENV};
use crate::cli::output::print_json;

#[derive(Debug, Clone)]
pub struct RegisterOptions {
    pub task: String,
    pub role: String,
}

pub async fn register(ctx: &Context, options: RegisterOptions) -> Result<Outcome> {
    let requested = ctx
        .instance
        .as_deref()
        .map(InstanceId::parse)
        .transpose()?;
    let coordinator = ctx.open().await?;

    let instance = run_blocking(move || {
        let registry = coordinator.registry();
        match requested {
            Some(id) => registry.register_as(&id, &options.task, &options.role),
            None => registry.register(&options.task, &options.role),
        }
    })
    .await?;

    if ctx.format.is_json() {
        print_json(&instance)?;
    } else {
        println!("Registered {}", instance.id);
        println!("  export {INSTANCE_ENV}={}", instance.id);
    }
    Ok(Outcome::Success)
}

pub async fn heartbeat(ctx: &Context) -> Result<Outcome> {
    let id = ctx.instance_id()?;
    let coordinator = ctx.open().await?;

    let lookup = id.clone();
    let instance = run_blocking(move || coordinator.registry().heartbeat(&lookup))
        .await?
        .ok_or_else(|| Error::NotFound(format!("instance '{id}' is not registered")))?;

    if ctx.format.is_json() {
        print_json(&instance)?;
    } else {
        println!(
            "Heartbeat recorded for {} at {}",
            instance.id,
            instance.last_heartbeat.format("%Y-%m-%dT%H:%M:%SZ")
        );
    }
    Ok(Outcome::Success)
}

pub async fn unregister(ctx: &Context) -> Result<Outcome> {
    let id = ctx.instance_id()?;
    let coordinator = ctx.open().await?;

    let result = run_blocking(move || coordinator.registry().unregister(&id)).await?;

    if ctx.format.is_json() {
        print_json(&result)?;
    } else if result.removed {
        println!(
            "Unregistered {} ({} lock(s) released)",
            result.instance_id,
            result.released_paths.len()
        );
    } else {
        println!("{} was not registered", result.instance_id);
    }
    Ok(Outcome::Success)
}

#[derive(Debug, Serialize)]
struct InstanceList {
    instances: Vec<Instance>,
    count: usize,
}

pub async fn list(ctx: &Context) -> Result<Outcome> {
    let coordinator = ctx.open().await?;
    let instances = run_blocking(move || coordinator.registry().list_active()).await?;

    if ctx.format.is_json() {
        let count = instances.len();
        print_json(&InstanceList { instances, count })?;
    } else if instances.is_empty() {
        println!("No active instances");
    } else {
        for instance in &instances {
            println!(
                "{:<40} {:<10} {:<8} locks={:<3} {}",
                instance.id.as_str(),
                instance.role,
                instance.status,
                instance.locked_paths.len(),
                instance.task
            );
        }
    }
    Ok(Outcome::Success)
}
