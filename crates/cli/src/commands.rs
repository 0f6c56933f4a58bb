//! Clap command tree definition.
//!
//! Builds the `clap::Command` tree used by shell mode. REPL and pipe mode
//! take raw SQL lines instead; see [`crate::parse`].

use clap::{Arg, ArgAction, Command};

/// Build the complete CLI command tree.
pub fn build_cli() -> Command {
    Command::new("cairn")
        .about("Shell for Cairn embedded SQL databases")
        .subcommand_required(false)
        .arg(
            Arg::new("db")
                .long("db")
                .help("Data directory (default: .cairn)")
                .global(true),
        )
        .arg(
            Arg::new("memory")
                .long("memory")
                .help("Ephemeral in-memory database, no disk")
                .action(ArgAction::SetTrue)
                .conflicts_with("db")
                .global(true),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("JSON output mode")
                .action(ArgAction::SetTrue)
                .conflicts_with("raw")
                .global(true),
        )
        .arg(
            Arg::new("raw")
                .long("raw")
                .help("Raw output mode (tab-separated, no header)")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Log engine and persistence activity to stderr")
                .action(ArgAction::Count)
                .global(true),
        )
        .subcommand(
            Command::new("exec")
                .about("Run a mutating statement")
                .arg(sql_arg())
                .arg(params_arg()),
        )
        .subcommand(
            Command::new("query")
                .about("Run a read-only statement")
                .arg(sql_arg())
                .arg(params_arg()),
        )
        .subcommand(
            Command::new("export")
                .about("Write a snapshot of the database to a file")
                .arg(Arg::new("file").required(true).help("Destination file")),
        )
        .subcommand(
            Command::new("import")
                .about("Replace the database snapshot with a file (database must not be open)")
                .arg(Arg::new("file").required(true).help("Snapshot file")),
        )
        .subcommand(Command::new("status").about("Show liveness and persistence status"))
        .subcommand(Command::new("shell").about("Interactive SQL prompt"))
}

fn sql_arg() -> Arg {
    Arg::new("sql").required(true).help("SQL text")
}

fn params_arg() -> Arg {
    Arg::new("params")
        .num_args(0..)
        .trailing_var_arg(true)
        .allow_hyphen_values(true)
        .help("Positional parameters (?1, ?2, ...)")
}
