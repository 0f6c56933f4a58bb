//! Output → human/json/raw string formatting.
//!
//! Three modes:
//! - **Human** (default): aligned table with a header and a row count
//! - **JSON** (`--json`): `serde_json::to_string_pretty`
//! - **Raw** (`--raw`): tab-separated cells, no header

use cairn_executor::{Error, ExecuteResult, PersistenceStatus, PingInfo, QueryResult, Value};
use serde_json::json;

/// Output formatting mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
    Raw,
}

/// Format query rows.
pub fn format_rows(result: &QueryResult, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(&json!({
            "columns": result.columns,
            "rows": result
                .rows
                .iter()
                .map(|row| row.iter().map(value_to_json).collect::<Vec<_>>())
                .collect::<Vec<_>>(),
        })),
        OutputMode::Raw => result
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(format_value_raw)
                    .collect::<Vec<_>>()
                    .join("\t")
            })
            .collect::<Vec<_>>()
            .join("\n"),
        OutputMode::Human => format_table(result),
    }
}

/// Format the effect of a mutating statement.
pub fn format_changes(result: &ExecuteResult, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => pretty(&json!({
            "changes": result.changes,
            "last_insert_id": result.last_insert_id,
        })),
        OutputMode::Raw => format!("{}\t{}", result.changes, result.last_insert_id),
        OutputMode::Human => format!(
            "OK ({} row{} changed, last insert id {})",
            result.changes,
            if result.changes == 1 { "" } else { "s" },
            result.last_insert_id
        ),
    }
}

/// Format liveness and persistence status.
pub fn format_status(
    ping: &PingInfo,
    status: Option<&PersistenceStatus>,
    mode: OutputMode,
) -> String {
    match mode {
        OutputMode::Json => pretty(&json!({
            "ready": ping.ready,
            "memory_usage": ping.memory_usage,
            "persistence": status,
        })),
        OutputMode::Raw => format!("{}\t{}", ping.ready, ping.memory_usage),
        OutputMode::Human => {
            let mut lines = vec![
                format!("ready:              {}", ping.ready),
                format!("memory usage:       {} bytes", ping.memory_usage),
            ];
            match status {
                None => lines.push("persistence:        none (in-memory)".to_string()),
                Some(s) => {
                    lines.push(format!("dirty:              {}", s.dirty));
                    lines.push(format!("flushing:           {}", s.flushing));
                    lines.push(format!(
                        "flushes:            {} completed, {} failed, {} deferred",
                        s.flushes_completed, s.flushes_failed, s.flushes_deferred
                    ));
                    if let Some(at) = s.last_flush_at {
                        lines.push(format!("last flush:         {}", at.to_rfc3339()));
                    }
                    if let Some(bytes) = s.last_snapshot_bytes {
                        lines.push(format!("last snapshot size: {} bytes", bytes));
                    }
                    if let Some(err) = &s.last_error {
                        lines.push(format!("last error:         {}", err));
                    }
                }
            }
            lines.join("\n")
        }
    }
}

/// Format an error.
pub fn format_error(err: &Error, mode: OutputMode) -> String {
    match mode {
        OutputMode::Json => {
            let mut body = json!({ "error": err.to_string() });
            if let Some(kind) = err.engine_kind() {
                body["kind"] = json!(kind.as_str());
            }
            pretty(&body)
        }
        OutputMode::Raw => err.to_string(),
        OutputMode::Human => format!("(error) {}", err),
    }
}

fn format_table(result: &QueryResult) -> String {
    if result.columns.is_empty() {
        return "(no columns)".to_string();
    }

    let cells: Vec<Vec<String>> = result
        .rows
        .iter()
        .map(|row| row.iter().map(format_value_human).collect())
        .collect();

    let mut widths: Vec<usize> = result.columns.iter().map(|c| c.chars().count()).collect();
    for row in &cells {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }

    let line = |values: &mut dyn Iterator<Item = &String>| -> String {
        values
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = *w))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    };

    let mut out = Vec::with_capacity(cells.len() + 3);
    out.push(line(&mut result.columns.iter()));
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    for row in &cells {
        out.push(line(&mut row.iter()));
    }
    out.push(format!(
        "({} row{})",
        cells.len(),
        if cells.len() == 1 { "" } else { "s" }
    ));
    out.join("\n")
}

fn format_value_human(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bytes(b) => format!("x'{}'", hex(b)),
        other => other.to_string(),
    }
}

fn format_value_raw(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bytes(b) => hex(b),
        other => other.to_string(),
    }
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Int(i) => json!(i),
        Value::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::String(s) => json!(s),
        Value::Bytes(b) => json!(hex(b)),
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
