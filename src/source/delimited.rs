use csv::ReaderBuilder;
use tracing::{debug, instrument};

use crate::{
    error::{Origin, PipelineError, Result},
    process::{RawRow, RawTable},
};

/// Parse comma-separated, quote-escaped extraction output. The first record
/// is the header; every other record becomes a `RawRow`.
///
/// Quoted fields may contain commas and newlines, and `""` inside a quoted
/// field is an embedded quote. Quoting is checked strictly before parsing: an
/// unterminated quoted field or a stray quote is a `Parse` error rather than
/// a silently merged row. Rows are read flexibly so a wrong field count is
/// left for the normalizer to drop.
#[instrument(level = "debug", skip(origin, data), fields(table = origin.table, bytes = data.len()))]
pub fn parse_delimited(origin: Origin<'_>, data: &[u8]) -> Result<RawTable> {
    let parse_err = |message: String| PipelineError::Parse {
        source_path: origin.source.to_path_buf(),
        table: origin.table.to_string(),
        message,
    };

    check_quoting(data).map_err(parse_err)?;

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(b',')
        .quote(b'"')
        .double_quote(true)
        .from_reader(data);
    let mut records = reader.records();

    let headers: Vec<String> = match records.next() {
        Some(first) => first
            .map_err(|e| parse_err(e.to_string()))?
            .iter()
            .map(str::to_owned)
            .collect(),
        None => return Err(parse_err("no header row".to_string())),
    };

    let mut rows: Vec<RawRow> = Vec::new();
    for record in records {
        let record = record.map_err(|e| parse_err(e.to_string()))?;
        rows.push(record.iter().map(str::to_owned).collect());
    }

    debug!(columns = headers.len(), rows = rows.len(), "parsed extraction output");
    Ok(RawTable { headers, rows })
}

/// Walk the raw bytes the way a strict RFC-4180 reader does. A quote may only
/// open a field, and inside a quoted field it must be doubled or followed by
/// a delimiter, a line end or end of input.
fn check_quoting(data: &[u8]) -> std::result::Result<(), String> {
    let mut line = 1usize;
    let mut opened_on = 0usize;
    let mut field_start = true;
    let mut in_quotes = false;
    let mut i = 0;

    while i < data.len() {
        let b = data[i];
        if in_quotes {
            match b {
                b'"' => match data.get(i + 1) {
                    Some(b'"') => i += 1,
                    None | Some(b',') | Some(b'\n') | Some(b'\r') => in_quotes = false,
                    Some(_) => {
                        return Err(format!(
                            "line {}: extraneous or missing \" in quoted field",
                            line
                        ))
                    }
                },
                b'\n' => line += 1,
                _ => {}
            }
            field_start = false;
        } else {
            match b {
                b'"' if field_start => {
                    in_quotes = true;
                    opened_on = line;
                    field_start = false;
                }
                b'"' => return Err(format!("line {}: bare \" in non-quoted field", line)),
                b',' => field_start = true,
                b'\n' => {
                    line += 1;
                    field_start = true;
                }
                _ => field_start = false,
            }
        }
        i += 1;
    }

    if in_quotes {
        return Err(format!("line {}: quoted field is never closed", opened_on));
    }
    Ok(())
}
