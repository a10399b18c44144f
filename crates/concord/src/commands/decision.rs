//! `concord decision` - the shared decision log

use std::str::FromStr;

use anyhow::Result;
use concord_core::{Decision, DecisionCategory, DecisionStatus, Error, NewDecision};
use serde::Serialize;

use super::{run_blocking, Context, Outcome};
use crate::cli::output::print_json;

fn parse_field<T: FromStr>(field: &str, raw: &str, allowed: &str) -> Result<T> {
    T::from_str(raw).map_err(|_| {
        Error::validation(
            format!("Unknown {field} '{raw}'"),
            field,
            Some(raw.to_string()),
            format!("one of: {allowed}"),
        )
        .into()
    })
}

pub fn parse_category(raw: &str) -> Result<DecisionCategory> {
    parse_field(
        "category",
        raw,
        "architecture, convention, dependency, interface, process, other",
    )
}

#[derive(Debug, Clone)]
pub struct LogOptions {
    pub category: String,
    pub title: String,
    pub description: String,
    pub scope: String,
    pub status: String,
}

pub async fn log(ctx: &Context, options: LogOptions) -> Result<Outcome> {
    let author = ctx.instance_id()?;
    let new = NewDecision {
        category: parse_category(&options.category)?,
        title: options.title,
        description: options.description,
        scope: options.scope,
        status: parse_field::<DecisionStatus>(
            "status",
            &options.status,
            "proposed, accepted, superseded, rejected",
        )?,
    };
    let coordinator = ctx.open().await?;

    let decision = run_blocking(move || coordinator.decisions().append(&author, new)).await?;

    if ctx.format.is_json() {
        print_json(&decision)?;
    } else {
        println!("Logged {}: {}", decision.id, decision.title);
    }
    Ok(Outcome::Success)
}

#[derive(Debug, Serialize)]
struct DecisionList {
    decisions: Vec<Decision>,
    count: usize,
}

pub async fn list(ctx: &Context, category: Option<&str>, limit: usize) -> Result<Outcome> {
    let category = category.map(parse_category).transpose()?;
    let coordinator = ctx.open().await?;

    let decisions =
        run_blocking(move || coordinator.decisions().query_decisions(category, limit)).await?;

    if ctx.format.is_json() {
        let count = decisions.len();
        print_json(&DecisionList { decisions, count })?;
    } else if decisions.is_empty() {
        println!("No decisions logged");
    } else {
        for decision in &decisions {
            println!(
                "{}  [{}/{}]  {}  ({})",
                decision.id, decision.category, decision.status, decision.title, decision.author
            );
            if !decision.description.is_empty() {
                println!("    {}", decision.description);
            }
        }
    }
    Ok(Outcome::Success)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_is_case_insensitive() {
        assert!(matches!(
            parse_category("Architecture"),
            Ok(DecisionCategory::Architecture)
        ));
    }

    #[test]
    fn test_unknown_category_is_validation_error() {
        let err = parse_category("vibes").map_err(|e| e.downcast::<Error>());
        assert!(matches!(err, Err(Ok(Error::ValidationError { .. }))));
    }
}
