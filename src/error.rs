use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::pipeline::Stage;

/// The source file and table a run reads from. Every stage that can fail is
/// handed one so its error names both.
#[derive(Debug, Clone, Copy)]
pub struct Origin<'a> {
    pub source: &'a Path,
    pub table: &'a str,
}

impl<'a> Origin<'a> {
    pub fn new(source: &'a Path, table: &'a str) -> Self {
        Self { source, table }
    }
}

/// Every way a run can fail. Row-level field-count mismatches are not here:
/// those are recovered inside the normalizer and reported as dropped rows.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The external extraction tool could not be run or exited non-zero.
    /// `diagnostic` is the tool's stderr (or spawn error) verbatim.
    #[error("extraction of `{table}` from {} failed: {diagnostic}", .source_path.display())]
    Extraction {
        source_path: PathBuf,
        table: String,
        diagnostic: String,
    },

    /// No `CREATE TABLE` block in the schema dump matched the table.
    #[error("table `{table}` not found in schema of {}", .source_path.display())]
    SchemaNotFound { source_path: PathBuf, table: String },

    /// Extraction output was not valid delimited text. Raised by the source
    /// reader, so it reports as an extraction-stage failure.
    #[error("could not parse extraction output for `{table}` from {}: {message}", .source_path.display())]
    Parse {
        source_path: PathBuf,
        table: String,
        message: String,
    },

    /// The file destination could not be created or written.
    #[error(
        "writing `{table}` from {} to {} failed: {message}",
        .source_path.display(),
        .destination.display()
    )]
    SinkWrite {
        source_path: PathBuf,
        table: String,
        destination: PathBuf,
        message: String,
    },

    /// A row failed to persist. `committed` is how many earlier rows remain
    /// in `destination_table` after the failure.
    #[error(
        "insert of `{table}` from {} into `{destination_table}` failed at row {row} ({committed} rows committed): {diagnostic}",
        .source_path.display()
    )]
    Insert {
        source_path: PathBuf,
        table: String,
        destination_table: String,
        row: usize,
        committed: usize,
        diagnostic: String,
    },
}

impl PipelineError {
    /// Which stage of the run produced this error. Normalization never fails
    /// (mismatched rows are dropped), so nothing maps to `Stage::Normalization`.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Extraction { .. } | PipelineError::Parse { .. } => Stage::Extraction,
            PipelineError::SchemaNotFound { .. } => Stage::SchemaLookup,
            PipelineError::SinkWrite { .. } => Stage::SinkWrite,
            PipelineError::Insert { .. } => Stage::Insert,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_error_names_source_and_destination() {
        let err = PipelineError::Insert {
            source_path: PathBuf::from("/data/base.accdb"),
            table: "Employees".to_string(),
            destination_table: "emp".to_string(),
            row: 1,
            committed: 1,
            diagnostic: "dup".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "insert of `Employees` from /data/base.accdb into `emp` failed at row 1 (1 rows committed): dup"
        );
        assert_eq!(err.stage(), Stage::Insert);
    }

    #[test]
    fn parse_and_sink_errors_name_the_source() {
        let parse = PipelineError::Parse {
            source_path: PathBuf::from("/data/base.accdb"),
            table: "Employees".to_string(),
            message: "no header row".to_string(),
        };
        assert!(parse.to_string().contains("/data/base.accdb"), "{parse}");
        assert_eq!(parse.stage(), Stage::Extraction);

        let sink = PipelineError::SinkWrite {
            source_path: PathBuf::from("/data/base.accdb"),
            table: "Employees".to_string(),
            destination: PathBuf::from("/out/emp.json"),
            message: "denied".to_string(),
        };
        assert_eq!(
            sink.to_string(),
            "writing `Employees` from /data/base.accdb to /out/emp.json failed: denied"
        );
    }
}
