// src/schema/dump.rs

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, instrument, trace};

use super::types::ColumnDescriptor;

/// `CREATE TABLE <ident> (` with the identifier backtick, double-quote,
/// bracket or un-quoted.
static CREATE_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)CREATE\s+TABLE\s+(?:IF\s+NOT\s+EXISTS\s+)?(?:`([^`]+)`|"([^"]+)"|\[([^\]]+)\]|([^\s(]+))\s*\("#,
    )
    .expect("CREATE TABLE pattern should be valid")
});

/// A quoted column identifier followed by its type token. Parenthesised type
/// parameters stay attached to the type.
static COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^\s*(?:`([^`]+)`|"([^"]+)"|\[([^\]]+)\])\s+([^\s,()]+)(\s*\([^)]*\))?"#)
        .expect("column definition pattern should be valid")
});

/// Locate the `CREATE TABLE` block for `table` (case-insensitive) in a
/// DDL-like schema dump and return its columns in declaration order.
///
/// Returns `None` when no block matches.
#[instrument(level = "debug", skip(dump), fields(dump_len = dump.len()))]
pub fn find_table_columns(dump: &str, table: &str) -> Option<Vec<ColumnDescriptor>> {
    let wanted = table.to_lowercase();

    for caps in CREATE_TABLE.captures_iter(dump) {
        let ident = (1..=4)
            .find_map(|i| caps.get(i))
            .map(|m| m.as_str())
            .unwrap_or_default();
        if ident.to_lowercase() != wanted {
            trace!(ident = %ident, "skipping table block");
            continue;
        }

        let open = caps.get(0).map(|m| m.end()).unwrap_or_default();
        let body = definition_body(&dump[open..]);
        let columns = parse_column_definitions(body);
        debug!(table = %ident, columns = columns.len(), "found table block");
        return Some(columns);
    }

    debug!("no matching table block");
    None
}

/// Everything between the opening `(` and the `);` terminator. An
/// unterminated block runs to the last `)` or the end of the dump.
fn definition_body(rest: &str) -> &str {
    if let Some(end) = rest.find(");") {
        &rest[..end]
    } else if let Some(end) = rest.rfind(')') {
        &rest[..end]
    } else {
        rest
    }
}

fn parse_column_definitions(body: &str) -> Vec<ColumnDescriptor> {
    let without_comments: String = body
        .lines()
        .map(|line| match line.find("--") {
            Some(idx) => &line[..idx],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n");

    split_top_level(&without_comments)
        .into_iter()
        .filter_map(|def| {
            let caps = COLUMN.captures(def)?;
            let name = (1..=3).find_map(|i| caps.get(i))?.as_str().to_owned();
            let mut ty = caps.get(4)?.as_str().to_owned();
            if let Some(params) = caps.get(5) {
                ty.push_str(params.as_str().trim_start());
            }
            trace!(name = %name, ty = %ty, "parsed column");
            Some(ColumnDescriptor { name, ty })
        })
        .collect()
}

/// Split on commas that are not inside parentheses, so `NUMERIC(18,2)`
/// stays one definition.
fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, ch) in body.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}
