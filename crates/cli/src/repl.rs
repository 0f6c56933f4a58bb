//! REPL loop with rustyline.
//!
//! Interactive mode: prompt, meta-commands, history, TAB completion.
//! Pipe mode: read SQL lines from stdin, run each.

use std::fs;
use std::io::{self, BufRead};

use rustyline::completion::{Completer, Pair};
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{CompletionType, Config, Context, Editor, Helper};

use crate::format::{format_changes, format_error, format_rows, format_status, OutputMode};
use crate::parse::{classify_line, LineAction, MetaCommand};
use crate::state::SessionState;

/// What the loop should do after a line.
enum Flow {
    Continue { ok: bool },
    Quit,
}

/// Run the interactive REPL.
pub fn run_repl(state: &SessionState, mode: OutputMode) {
    let config = Config::builder()
        .history_ignore_space(true)
        .completion_type(CompletionType::List)
        .build();

    let mut rl: Editor<CairnHelper, _> = match Editor::with_config(config) {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("(error) cannot start line editor: {}", e);
            return;
        }
    };
    rl.set_helper(Some(CairnHelper));

    let history_path = history_file();
    if let Some(ref path) = history_path {
        let _ = rl.load_history(path);
    }

    loop {
        match rl.readline(&state.prompt()) {
            Ok(line) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(trimmed);

                if let Flow::Quit = run_line(trimmed, state, mode) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("(error) {:?}", err);
                break;
            }
        }
    }

    if let Some(ref path) = history_path {
        let _ = rl.save_history(path);
    }
}

/// Run in pipe mode: read lines from stdin, run each. Returns the exit code.
pub fn run_pipe(state: &SessionState, mode: OutputMode) -> i32 {
    let stdin = io::stdin();
    let mut exit_code = 0;

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        match run_line(&line, state, mode) {
            Flow::Quit => break,
            Flow::Continue { ok: false } => exit_code = 1,
            Flow::Continue { ok: true } => {}
        }
    }

    exit_code
}

fn run_line(line: &str, state: &SessionState, mode: OutputMode) -> Flow {
    let Some(action) = classify_line(line) else {
        return Flow::Continue { ok: true };
    };

    let ok = match action {
        LineAction::Query(sql) => match state.query(&sql, Vec::new()) {
            Ok(result) => {
                println!("{}", format_rows(&result, mode));
                true
            }
            Err(e) => {
                eprintln!("{}", format_error(&e, mode));
                false
            }
        },
        LineAction::Execute(sql) => match state.execute(&sql, Vec::new()) {
            Ok(result) => {
                println!("{}", format_changes(&result, mode));
                true
            }
            Err(e) => {
                eprintln!("{}", format_error(&e, mode));
                false
            }
        },
        LineAction::Meta(MetaCommand::Quit) => return Flow::Quit,
        LineAction::Meta(MetaCommand::Help) => {
            print_help();
            true
        }
        LineAction::Meta(MetaCommand::Status) => match state.ping() {
            Ok(ping) => {
                let status = state.persistence_status();
                println!("{}", format_status(&ping, status.as_ref(), mode));
                true
            }
            Err(e) => {
                eprintln!("{}", format_error(&e, mode));
                false
            }
        },
        LineAction::Meta(MetaCommand::Export(file)) => match state.export() {
            Ok(bytes) => match fs::write(&file, &bytes) {
                Ok(()) => {
                    println!("wrote {} bytes to {}", bytes.len(), file);
                    true
                }
                Err(e) => {
                    eprintln!("(error) {}: {}", file, e);
                    false
                }
            },
            Err(e) => {
                eprintln!("{}", format_error(&e, mode));
                false
            }
        },
        LineAction::Meta(MetaCommand::Unknown(message)) => {
            eprintln!("(error) {}", message);
            false
        }
    };
    Flow::Continue { ok }
}

fn history_file() -> Option<String> {
    std::env::var("HOME")
        .ok()
        .map(|h| format!("{}/.cairn_history", h))
}

fn print_help() {
    println!(
        "\
SQL statements run directly. Reads (SELECT, WITH, VALUES, EXPLAIN) are
batched with other reads arriving in the same window.

Meta-commands:
  .status        liveness and persistence status
  .export FILE   write a snapshot of the database to FILE
  .help          this text
  .quit          exit (also .exit, Ctrl-D)"
    );
}

const META_COMMANDS: &[&str] = &[".exit", ".export", ".help", ".quit", ".status"];

const SQL_KEYWORDS: &[&str] = &[
    "ALTER", "BEGIN", "COMMIT", "CREATE", "DELETE", "DROP", "EXPLAIN", "INSERT", "PRAGMA",
    "ROLLBACK", "SELECT", "UPDATE", "VALUES", "WITH",
];

struct CairnHelper;

impl Helper for CairnHelper {}
impl Validator for CairnHelper {}
impl Highlighter for CairnHelper {}
impl Hinter for CairnHelper {
    type Hint = String;

    fn hint(&self, _line: &str, _pos: usize, _ctx: &Context<'_>) -> Option<String> {
        None
    }
}

impl Completer for CairnHelper {
    type Candidate = Pair;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<Pair>)> {
        let line_to_pos = &line[..pos];

        // Only the first word completes
        if line_to_pos.trim_start().contains(char::is_whitespace) {
            return Ok((pos, vec![]));
        }
        let prefix = line_to_pos.trim_start();
        let start = pos - prefix.len();
        Ok((start, first_word_candidates(prefix)))
    }
}

fn first_word_candidates(prefix: &str) -> Vec<Pair> {
    let pool: &[&str] = if prefix.starts_with('.') {
        META_COMMANDS
    } else {
        SQL_KEYWORDS
    };
    let upper = prefix.to_ascii_uppercase();
    pool.iter()
        .filter(|word| word.starts_with(prefix) || word.starts_with(upper.as_str()))
        .map(|word| Pair {
            display: word.to_string(),
            replacement: word.to_string(),
        })
        .collect()
}
