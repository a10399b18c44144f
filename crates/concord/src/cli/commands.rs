//! CLI command definitions using `clap`

use clap::{Arg, ArgAction, Command as ClapCommand};

pub fn after_help_text(examples: &[&str]) -> String {
    examples
        .iter()
        .fold(String::from("EXAMPLES:\n"), |mut text, example| {
            text.push_str("  ");
            text.push_str(example);
            text.push('\n');
            text
        })
}

fn path_arg() -> Arg {
    Arg::new("path")
        .required(true)
        .value_name("PATH")
        .help("File to lock, relative to the project root or absolute inside it")
}

fn intent_arg() -> Arg {
    Arg::new("intent")
        .long("intent")
        .value_name("TEXT")
        .default_value("")
        .help("What the holder intends to do with the file")
}

pub fn cmd_instance() -> ClapCommand {
    ClapCommand::new("instance")
        .about("Register, heartbeat and list coordinating instances")
        .subcommand_required(true)
        .subcommand(
            ClapCommand::new("register")
                .about("Register this instance (uses --instance as the id if given)")
                .arg(
                    Arg::new("task")
                        .long("task")
                        .value_name("TEXT")
                        .default_value("")
                        .help("Task description"),
                )
                .arg(
                    Arg::new("role")
                        .long("role")
                        .value_name("ROLE")
                        .default_value("worker")
                        .help("Role of this instance"),
                ),
        )
        .subcommand(ClapCommand::new("heartbeat").about("Record a heartbeat"))
        .subcommand(
            ClapCommand::new("unregister")
                .about("Remove this instance and release all of its locks"),
        )
        .subcommand(ClapCommand::new("list").about("Sweep stale instances, then list the rest"))
        .after_help(after_help_text(&[
            "concord instance register --task 'fix parser'",
            "CONCORD_INSTANCE_ID=inst-... concord instance heartbeat",
            "concord --json instance list",
        ]))
}

pub fn cmd_lock() -> ClapCommand {
    ClapCommand::new("lock")
        .about("Acquire, renew, release and inspect file leases")
        .subcommand_required(true)
        .subcommand(
            ClapCommand::new("acquire")
                .about("Acquire (or renew) the lease on a file")
                .arg(path_arg())
                .arg(intent_arg()),
        )
        .subcommand(
            ClapCommand::new("release")
                .about("Release a lease you hold")
                .arg(path_arg()),
        )
        .subcommand(
            ClapCommand::new("renew")
                .about("Extend a lease you hold")
                .arg(path_arg()),
        )
        .subcommand(
            ClapCommand::new("record-write")
                .about("Refresh the fingerprint after your own write and extend the lease")
                .arg(path_arg()),
        )
        .subcommand(
            ClapCommand::new("check")
                .about("Check a locked file for out-of-band modification")
                .arg(path_arg()),
        )
        .subcommand(
            ClapCommand::new("gate")
                .about("Pre-write gate: acquire and check for conflicts")
                .arg(path_arg())
                .arg(intent_arg()),
        )
        .subcommand(ClapCommand::new("status").about("List every valid lease"))
        .subcommand(ClapCommand::new("release-all").about("Release every lease you hold"))
        .after_help(after_help_text(&[
            "concord --instance agent-a lock acquire src/app.ts --intent 'add route'",
            "concord --instance agent-a lock gate src/app.ts",
            "concord lock status",
        ]))
}

pub fn cmd_decision() -> ClapCommand {
    ClapCommand::new("decision")
        .about("Append to and query the decision log")
        .subcommand_required(true)
        .subcommand(
            ClapCommand::new("log")
                .about("Log a decision")
                .arg(
                    Arg::new("category")
                        .long("category")
                        .required(true)
                        .value_name("CATEGORY")
                        .help("architecture, convention, dependency, interface, process or other"),
                )
                .arg(
                    Arg::new("title")
                        .long("title")
                        .required(true)
                        .value_name("TEXT"),
                )
                .arg(
                    Arg::new("description")
                        .long("description")
                        .value_name("TEXT")
                        .default_value(""),
                )
                .arg(
                    Arg::new("scope")
                        .long("scope")
                        .value_name("TEXT")
                        .default_value(""),
                )
                .arg(
                    Arg::new("status")
                        .long("status")
                        .value_name("STATUS")
                        .default_value("accepted")
                        .help("proposed, accepted, superseded or rejected"),
                ),
        )
        .subcommand(
            ClapCommand::new("list")
                .about("Show recent decisions, newest first")
                .arg(
                    Arg::new("category")
                        .long("category")
                        .value_name("CATEGORY"),
                )
                .arg(
                    Arg::new("limit")
                        .long("limit")
                        .value_name("N")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("20"),
                ),
        )
}

pub fn cmd_sweep() -> ClapCommand {
    ClapCommand::new("sweep")
        .about("Reclaim stale instances and their locks")
        .arg(
            Arg::new("watch")
                .long("watch")
                .action(ArgAction::SetTrue)
                .help("Keep sweeping on an interval until interrupted"),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .value_name("SECS")
                .value_parser(clap::value_parser!(u64).range(1..))
                .help("Seconds between sweeps (defaults to sweep.interval_secs)"),
        )
}

pub fn build_cli() -> ClapCommand {
    ClapCommand::new("concord")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Concord - lease-based coordination for agents sharing one checkout")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .disable_help_subcommand(true)
        .arg(
            Arg::new("root")
                .long("root")
                .global(true)
                .value_name("DIR")
                .help("Project root (defaults to the current directory)"),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Output as JSON"),
        )
        .arg(
            Arg::new("instance")
                .long("instance")
                .global(true)
                .value_name("ID")
                .help("Instance id (defaults to $CONCORD_INSTANCE_ID)"),
        )
        .subcommand(cmd_instance())
        .subcommand(cmd_lock())
        .subcommand(cmd_decision())
        .subcommand(cmd_sweep())
}
