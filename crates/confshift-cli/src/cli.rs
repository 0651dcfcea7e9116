//! Argument parsing

use std::path::PathBuf;

use clap::{value_parser, Arg, ArgAction, ArgGroup, ArgMatches, Command};
use confshift_core::RollbackTarget;

/// Config file used when `--config` is absent
pub const DEFAULT_CONFIG: &str = "confshift.yaml";

/// Options shared by every subcommand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalArgs {
    /// Config file
    pub config: PathBuf,
    /// Requested environment
    pub env: Option<String>,
    /// Disable colors
    pub no_ansi: bool,
    /// Debug logging
    pub verbose: bool,
}

/// Parsed subcommand
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Write a config template
    Init {
        /// Directory for the config file
        path: Option<PathBuf>,
    },
    /// Scaffold a unit
    Create {
        /// PascalCase unit name
        name: String,
    },
    /// Apply pending units
    Migrate {
        /// Preview only
        dry_run: bool,
    },
    /// Revert applied units
    Rollback {
        /// Units to revert
        target: RollbackTarget,
        /// Preview only
        dry_run: bool,
    },
    /// Print the applied units
    History,
    /// Replace every scalar in the document with a placeholder
    Mask {
        /// Print instead of writing
        dry_run: bool,
    },
}

fn dry_run_arg() -> Arg {
    Arg::new("dry-run")
        .short('d')
        .long("dry-run")
        .action(ArgAction::SetTrue)
        .help("Show what would change without writing anything")
}

/// Command definition
#[must_use]
pub fn command() -> Command {
    Command::new("confshift")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Ordered, reversible migrations for YAML configuration documents")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Configuration file [default: confshift.yaml]"),
        )
        .arg(
            Arg::new("env")
                .short('e')
                .long("env")
                .global(true)
                .help("Environment to operate on"),
        )
        .arg(
            Arg::new("no-ansi")
                .short('n')
                .long("no-ansi")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Disable colored output"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Enable debug logging"),
        )
        .subcommand(
            Command::new("init")
                .about("Create a configuration file")
                .arg(
                    Arg::new("path")
                        .short('p')
                        .long("path")
                        .value_parser(value_parser!(PathBuf))
                        .help("Directory to create the configuration in"),
                ),
        )
        .subcommand(
            Command::new("create")
                .about("Create a new migration")
                .arg(
                    Arg::new("name")
                        .short('m')
                        .long("name")
                        .required(true)
                        .help("PascalCase migration name, e.g. AddDatabase"),
                ),
        )
        .subcommand(
            Command::new("migrate")
                .about("Apply pending migrations")
                .arg(dry_run_arg()),
        )
        .subcommand(
            Command::new("rollback")
                .about("Revert applied migrations (the last batch by default)")
                .arg(dry_run_arg())
                .arg(
                    Arg::new("step")
                        .short('s')
                        .long("step")
                        .value_parser(value_parser!(usize))
                        .help("Number of migrations to revert"),
                )
                .arg(
                    Arg::new("target")
                        .short('t')
                        .long("target")
                        .help("Revert back to and including this migration"),
                )
                .group(ArgGroup::new("selection").args(["step", "target"])),
        )
        .subcommand(Command::new("history").about("Show applied migrations"))
        .subcommand(
            Command::new("mask")
                .about("Mask all values in the document")
                .arg(dry_run_arg()),
        )
}

/// Split matches into global options and the action
#[must_use]
pub fn parse(matches: &ArgMatches) -> (GlobalArgs, Option<Action>) {
    let (name, sub) = match matches.subcommand() {
        Some((name, sub)) => (name, sub),
        None => ("", matches),
    };

    let globals = GlobalArgs {
        config: sub
            .get_one::<PathBuf>("config")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG)),
        env: sub.get_one::<String>("env").cloned(),
        no_ansi: sub.get_flag("no-ansi"),
        verbose: sub.get_flag("verbose"),
    };

    let dry_run = || sub.get_flag("dry-run");
    let action = match name {
        "init" => Some(Action::Init {
            path: sub.get_one::<PathBuf>("path").cloned(),
        }),
        "create" => sub
            .get_one::<String>("name")
            .cloned()
            .map(|name| Action::Create { name }),
        "migrate" => Some(Action::Migrate { dry_run: dry_run() }),
        "rollback" => {
            let target = if let Some(steps) = sub.get_one::<usize>("step") {
                RollbackTarget::Steps(*steps)
            } else if let Some(id) = sub.get_one::<String>("target") {
                RollbackTarget::To(id.clone())
            } else {
                RollbackTarget::LastBatch
            };
            Some(Action::Rollback {
                target,
                dry_run: dry_run(),
            })
        }
        "history" => Some(Action::History),
        "mask" => Some(Action::Mask { dry_run: dry_run() }),
        _ => None,
    };
    (globals, action)
}
