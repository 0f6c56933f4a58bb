//! Input line → action classification for REPL and pipe mode.
//!
//! Lines starting with `.` are meta-commands. Anything else is SQL: read
//! statements go through `query` (and get batched), everything else through
//! `execute`.

/// What a line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineAction {
    /// Read-only SQL
    Query(String),
    /// Mutating SQL
    Execute(String),
    /// A `.command`
    Meta(MetaCommand),
}

/// REPL meta-commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaCommand {
    /// `.quit` / `.exit`
    Quit,
    /// `.help`
    Help,
    /// `.status`
    Status,
    /// `.export FILE`
    Export(String),
    /// Unrecognized meta-command
    Unknown(String),
}

const READ_KEYWORDS: &[&str] = &["SELECT", "WITH", "VALUES", "EXPLAIN"];

/// Classify one input line. Returns `None` for blank lines and comments.
pub fn classify_line(line: &str) -> Option<LineAction> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with("--") {
        return None;
    }

    if let Some(meta) = trimmed.strip_prefix('.') {
        let mut parts = meta.split_whitespace();
        let name = parts.next().unwrap_or_default();
        let command = match name {
            "quit" | "exit" => MetaCommand::Quit,
            "help" => MetaCommand::Help,
            "status" => MetaCommand::Status,
            "export" => match parts.next() {
                Some(file) => MetaCommand::Export(file.to_string()),
                None => MetaCommand::Unknown("export requires a file name".to_string()),
            },
            other => MetaCommand::Unknown(format!("unknown command .{}", other)),
        };
        return Some(LineAction::Meta(command));
    }

    let sql = trimmed.to_string();
    if is_read(trimmed) {
        Some(LineAction::Query(sql))
    } else {
        Some(LineAction::Execute(sql))
    }
}

fn is_read(sql: &str) -> bool {
    let first = sql
        .split(|c: char| c.is_whitespace() || c == '(')
        .find(|w| !w.is_empty())
        .unwrap_or_default();
    READ_KEYWORDS
        .iter()
        .any(|kw| first.eq_ignore_ascii_case(kw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_and_writes() {
        assert_eq!(
            classify_line("select * from t"),
            Some(LineAction::Query("select * from t".into()))
        );
        assert_eq!(
            classify_line("  WITH x AS (SELECT 1) SELECT * FROM x"),
            Some(LineAction::Query("WITH x AS (SELECT 1) SELECT * FROM x".into()))
        );
        assert_eq!(
            classify_line("insert into t values (1)"),
            Some(LineAction::Execute("insert into t values (1)".into()))
        );
        assert_eq!(
            classify_line("CREATE TABLE t (x)"),
            Some(LineAction::Execute("CREATE TABLE t (x)".into()))
        );
    }

    #[test]
    fn test_blank_and_comment_lines() {
        assert_eq!(classify_line("   "), None);
        assert_eq!(classify_line("-- note"), None);
    }

    #[test]
    fn test_meta_commands() {
        assert_eq!(classify_line(".quit"), Some(LineAction::Meta(MetaCommand::Quit)));
        assert_eq!(
            classify_line(".export /tmp/x.db"),
            Some(LineAction::Meta(MetaCommand::Export("/tmp/x.db".into())))
        );
        assert!(matches!(
            classify_line(".export"),
            Some(LineAction::Meta(MetaCommand::Unknown(_)))
        ));
        assert!(matches!(
            classify_line(".frobnicate"),
            Some(LineAction::Meta(MetaCommand::Unknown(_)))
        ));
    }
}
