//! CLI definition, dispatch and process setup

pub mod commands;
pub mod handlers;
pub mod output;
pub mod setup;
