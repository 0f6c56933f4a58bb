//! Cairn CLI: a shell over an embedded Cairn database.
//!
//! Three modes:
//! - **Shell mode**: `cairn [flags] COMMAND` runs one command and exits
//! - **REPL mode**: `cairn [flags]` opens an interactive prompt (if stdin is a TTY)
//! - **Pipe mode**: `echo "SELECT 1" | cairn` runs SQL line-by-line from stdin

mod commands;
mod format;
mod parse;
mod repl;
mod state;
mod value;

use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process;

use anyhow::Context as _;
use cairn_executor::Cairn;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use commands::build_cli;
use format::{format_changes, format_error, format_rows, format_status, OutputMode};
use state::SessionState;
use value::parse_params;

const DEFAULT_DATA_DIR: &str = ".cairn";

fn main() {
    let matches = build_cli().get_matches();

    init_tracing(matches.get_count("verbose"));

    let output_mode = if matches.get_flag("json") {
        OutputMode::Json
    } else if matches.get_flag("raw") {
        OutputMode::Raw
    } else {
        OutputMode::Human
    };

    let runtime = match Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("(error) cannot start runtime: {}", e);
            process::exit(1);
        }
    };

    // `import` rewrites the snapshot file, so it runs before anything opens it.
    if let Some(("import", sub)) = matches.subcommand() {
        let exit_code = match run_import(&runtime, &matches, sub) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("(error) {:#}", e);
                1
            }
        };
        process::exit(exit_code);
    }

    let db = match open_database(&runtime, &matches) {
        Ok(db) => db,
        Err(e) => {
            eprintln!("(error) {:#}", e);
            process::exit(1);
        }
    };
    let state = SessionState::new(runtime, db);

    let exit_code = match matches.subcommand() {
        Some(("shell", _)) => {
            repl::run_repl(&state, output_mode);
            0
        }
        Some((name, sub)) => run_shell_mode(name, sub, &state, output_mode),
        None if std::io::stdin().is_terminal() => {
            repl::run_repl(&state, output_mode);
            0
        }
        None => repl::run_pipe(&state, output_mode),
    };

    if let Err(e) = state.close() {
        eprintln!("{}", format_error(&e, output_mode));
        process::exit(1);
    }
    process::exit(exit_code);
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cairn=warn")),
        1 => EnvFilter::new("cairn=debug"),
        _ => EnvFilter::new("cairn=trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn data_dir(matches: &clap::ArgMatches) -> PathBuf {
    matches
        .get_one::<String>("db")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
}

fn open_database(runtime: &Runtime, matches: &clap::ArgMatches) -> anyhow::Result<Cairn> {
    if matches.get_flag("memory") {
        return runtime
            .block_on(Cairn::ephemeral())
            .context("failed to open in-memory database");
    }
    let dir = data_dir(matches);
    runtime
        .block_on(Cairn::open(&dir))
        .with_context(|| format!("failed to open database at {}", dir.display()))
}

fn run_import(
    runtime: &Runtime,
    matches: &clap::ArgMatches,
    sub: &clap::ArgMatches,
) -> anyhow::Result<()> {
    if matches.get_flag("memory") {
        anyhow::bail!("import needs a data directory, not --memory");
    }
    let file = sub
        .get_one::<String>("file")
        .context("missing snapshot file")?;
    let bytes = fs::read(file).with_context(|| format!("cannot read {}", file))?;
    let dir = data_dir(matches);
    let path = runtime
        .block_on(Cairn::import_snapshot(&dir, bytes))
        .with_context(|| format!("import into {} failed", dir.display()))?;
    println!("imported {} -> {}", file, path.display());
    Ok(())
}

fn run_shell_mode(
    name: &str,
    sub: &clap::ArgMatches,
    state: &SessionState,
    mode: OutputMode,
) -> i32 {
    let sql = sub.get_one::<String>("sql").map(String::as_str);
    let params: Vec<String> = sub
        .get_many::<String>("params")
        .map(|vals| vals.cloned().collect())
        .unwrap_or_default();

    let result = match (name, sql) {
        ("exec", Some(sql)) => state
            .execute(sql, parse_params(&params))
            .map(|r| format_changes(&r, mode)),
        ("query", Some(sql)) => state
            .query(sql, parse_params(&params))
            .map(|r| format_rows(&r, mode)),
        ("status", _) => state.ping().map(|ping| {
            let status = state.persistence_status();
            format_status(&ping, status.as_ref(), mode)
        }),
        ("export", _) => {
            let Some(file) = sub.get_one::<String>("file") else {
                eprintln!("(error) missing destination file");
                return 1;
            };
            match state.export() {
                Ok(bytes) => match fs::write(file, &bytes) {
                    Ok(()) => Ok(format!("wrote {} bytes to {}", bytes.len(), file)),
                    Err(e) => {
                        eprintln!("(error) {}: {}", file, e);
                        return 1;
                    }
                },
                Err(e) => Err(e),
            }
        }
        (other, _) => {
            eprintln!("(error) unknown command {}", other);
            return 1;
        }
    };

    match result {
        Ok(out) => {
            if !out.is_empty() {
                println!("{}", out);
            }
            0
        }
        Err(e) => {
            eprintln!("{}", format_error(&e, mode));
            1
        }
    }
}
