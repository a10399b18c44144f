//! Concord CLI - coordination for agents sharing one checkout
//!
//! Binary name: `concord`

use std::process;

mod cli;
mod commands;

use cli::handlers::{format_error, run_cli};

#[tokio::main]
async fn main() {
    if let Err(e) = cli::setup::init_tracing() {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("Warning: {e}");
        }
    }

    let code = match run_cli().await {
        Ok(outcome) => outcome.exit_code(),
        Err(err) => {
            #[allow(clippy::print_stderr)]
            {
                eprintln!("Error: {}", format_error(&err));
            }
            err.downcast_ref::<concord_core::Error>()
                .map_or(1, concord_core::Error::exit_code)
        }
    };

    #[allow(clippy::exit)]
    process::exit(code);
}
