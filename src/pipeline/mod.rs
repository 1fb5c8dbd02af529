//! Orchestrator: source reader -> normalizer -> exactly one sink.

pub mod state;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    fmt,
    path::{Path, PathBuf},
};
use tracing::{error, info, instrument};

use crate::{
    error::{Origin, PipelineError, Result},
    process::{normalize, DroppedRow},
    schema::TableSchema,
    sink::{file::write_document, postgres::insert_records, InsertOptions, Session},
    source::{describe_table, list_tables, read_table, Extractor},
};

pub use state::{RunState, Stage};

/// Where normalized records go. Exactly one per run.
pub enum Destination<'a> {
    /// Structured JSON document at this path.
    File(PathBuf),
    /// Rows inserted into `table` through an already open session.
    Table {
        session: &'a mut dyn Session,
        table: String,
        options: InsertOptions,
    },
}

impl Destination<'_> {
    fn describe(&self) -> String {
        match self {
            Destination::File(path) => path.display().to_string(),
            Destination::Table { table, .. } => format!("table {}", table),
        }
    }
}

/// Everything one run needs, supplied by the caller at invocation time.
pub struct RunConfig<'a> {
    pub source: PathBuf,
    pub table: String,
    pub destination: Destination<'a>,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub table: String,
    pub destination: String,
    /// Data rows pulled from the source.
    pub extracted: usize,
    /// Records exported or inserted.
    pub written: usize,
    pub dropped: Vec<DroppedRow>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    /// True when every extracted row reached the sink.
    pub fn is_complete(&self) -> bool {
        self.dropped.is_empty() && self.written == self.extracted
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wrote {} of {} rows from `{}` to {}",
            self.written, self.extracted, self.table, self.destination
        )?;
        if !self.dropped.is_empty() {
            write!(
                f,
                " ({} rows dropped: field count did not match header)",
                self.dropped.len()
            )?;
        }
        Ok(())
    }
}

/// Composes the source reader, normalizer and sinks. Holds no per-run
/// state; every run owns its own header, rows and records.
pub struct Pipeline<E> {
    extractor: E,
}

impl<E: Extractor> Pipeline<E> {
    pub fn new(extractor: E) -> Self {
        Self { extractor }
    }

    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Idle -> SchemaAcquired.
    #[instrument(level = "info", skip(self, source), fields(source = %source.display()))]
    pub async fn describe(&self, source: &Path, table: &str) -> Result<TableSchema> {
        let mut state = RunState::Idle;
        match describe_table(&self.extractor, source, table).await {
            Ok(schema) => {
                advance(&mut state, RunState::SchemaAcquired);
                advance(&mut state, RunState::Idle);
                Ok(schema)
            }
            Err(e) => {
                advance(&mut state, RunState::Sunk { success: false });
                error!(stage = %e.stage(), error = %e, "describe failed");
                advance(&mut state, RunState::Idle);
                Err(e)
            }
        }
    }

    pub async fn list_tables(&self, source: &Path) -> Result<Vec<String>> {
        list_tables(&self.extractor, source).await
    }

    /// Write `table` to a JSON document at `destination`.
    pub async fn export(&self, source: &Path, table: &str, destination: &Path) -> Result<RunSummary> {
        self.run(RunConfig {
            source: source.to_path_buf(),
            table: table.to_string(),
            destination: Destination::File(destination.to_path_buf()),
        })
        .await
    }

    /// Insert `table` into `destination_table` through `session`.
    pub async fn load(
        &self,
        source: &Path,
        table: &str,
        session: &mut dyn Session,
        destination_table: &str,
        options: InsertOptions,
    ) -> Result<RunSummary> {
        self.run(RunConfig {
            source: source.to_path_buf(),
            table: table.to_string(),
            destination: Destination::Table {
                session,
                table: destination_table.to_string(),
                options,
            },
        })
        .await
    }

    /// Idle -> RowsExtracted -> Normalized -> Sunk -> Idle. Any failure goes
    /// straight to Sunk(failure) and is returned; nothing is retried.
    #[instrument(level = "info", skip_all, fields(source = %config.source.display(), table = %config.table))]
    pub async fn run(&self, config: RunConfig<'_>) -> Result<RunSummary> {
        let started_at = Utc::now();
        let mut state = RunState::Idle;
        let RunConfig {
            source: source_path,
            table,
            destination,
        } = config;
        let destination_label = destination.describe();

        let outcome = async {
            let origin = Origin::new(&source_path, &table);
            let raw = read_table(&self.extractor, &source_path, &table).await?;
            advance(&mut state, RunState::RowsExtracted);

            let extracted = raw.rows.len();
            let normalized = normalize(&raw.headers, raw.rows);
            advance(&mut state, RunState::Normalized);

            let written = match destination {
                Destination::File(path) => {
                    write_document(&normalized.records, &path, origin)?;
                    normalized.records.len()
                }
                Destination::Table {
                    session,
                    table: dest_table,
                    options,
                } => {
                    insert_records(
                        session,
                        origin,
                        &dest_table,
                        &raw.headers,
                        &normalized.records,
                        options,
                    )
                    .await?
                    .inserted
                }
            };
            Ok::<_, PipelineError>((extracted, written, normalized.dropped))
        }
        .await;

        match outcome {
            Ok((extracted, written, dropped)) => {
                advance(&mut state, RunState::Sunk { success: true });
                let summary = RunSummary {
                    table,
                    destination: destination_label,
                    extracted,
                    written,
                    dropped,
                    started_at,
                    finished_at: Utc::now(),
                };
                info!(
                    extracted = summary.extracted,
                    written = summary.written,
                    dropped = summary.dropped.len(),
                    "run complete"
                );
                advance(&mut state, RunState::Idle);
                Ok(summary)
            }
            Err(e) => {
                advance(&mut state, RunState::Sunk { success: false });
                error!(stage = %e.stage(), error = %e, "run failed");
                advance(&mut state, RunState::Idle);
                Err(e)
            }
        }
    }
}

fn advance(state: &mut RunState, next: RunState) {
    debug_assert!(
        state.can_advance_to(next),
        "illegal transition {} -> {}",
        state,
        next
    );
    tracing::debug!(from = %state, to = %next, "state");
    *state = next;
}
