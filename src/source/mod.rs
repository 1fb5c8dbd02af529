//! Source reader: pulls a table's schema and rows out of a legacy
//! desktop-database file through an external extraction capability.

pub mod delimited;
pub mod mdb;

use async_trait::async_trait;
use std::path::Path;
use tracing::{info, instrument};

use crate::{
    error::{Origin, PipelineError, Result},
    process::RawTable,
    schema::{find_table_columns, TableSchema},
};

pub use delimited::parse_delimited;
pub use mdb::MdbTools;

/// External access to the legacy store. Errors are the tool's diagnostic
/// text; the reader functions below attach source/table context.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Delimited text for one table, header first.
    async fn export_table(&self, source: &Path, table: &str) -> Result<Vec<u8>, String>;

    /// DDL-like dump containing `CREATE TABLE <name> (...)` blocks.
    async fn dump_schema(&self, source: &Path) -> Result<String, String>;

    /// Table names, one per line.
    async fn list_tables(&self, source: &Path) -> Result<String, String>;
}

fn extraction_error(source: &Path, table: &str, diagnostic: String) -> PipelineError {
    PipelineError::Extraction {
        source_path: source.to_path_buf(),
        table: table.to_string(),
        diagnostic,
    }
}

/// Extract `table` and split it into header + raw rows. A single failed
/// attempt is fatal; nothing is retried.
#[instrument(level = "info", skip(extractor, source), fields(source = %source.display()))]
pub async fn read_table<E: Extractor + ?Sized>(
    extractor: &E,
    source: &Path,
    table: &str,
) -> Result<RawTable> {
    let data = extractor
        .export_table(source, table)
        .await
        .map_err(|diag| extraction_error(source, table, diag))?;
    let raw = parse_delimited(Origin::new(source, table), &data)?;
    info!(columns = raw.headers.len(), rows = raw.rows.len(), "extracted");
    Ok(raw)
}

/// Column names and declared types for `table`, from the schema dump.
#[instrument(level = "info", skip(extractor, source), fields(source = %source.display()))]
pub async fn describe_table<E: Extractor + ?Sized>(
    extractor: &E,
    source: &Path,
    table: &str,
) -> Result<TableSchema> {
    let dump = extractor
        .dump_schema(source)
        .await
        .map_err(|diag| extraction_error(source, table, diag))?;

    let columns =
        find_table_columns(&dump, table).ok_or_else(|| PipelineError::SchemaNotFound {
            source_path: source.to_path_buf(),
            table: table.to_string(),
        })?;
    info!(columns = columns.len(), "described");

    Ok(TableSchema {
        table: table.to_string(),
        columns,
    })
}

/// Names of the tables stored in `source`, in the order the tool lists them.
#[instrument(level = "info", skip(extractor, source), fields(source = %source.display()))]
pub async fn list_tables<E: Extractor + ?Sized>(extractor: &E, source: &Path) -> Result<Vec<String>> {
    let listing = extractor
        .list_tables(source)
        .await
        .map_err(|diag| extraction_error(source, "*", diag))?;
    Ok(listing
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_owned)
        .collect())
}
