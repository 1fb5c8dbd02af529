//! Row-by-row INSERT into a PostgreSQL table.
//!
//! Every value is sent as a bound parameter; only identifiers are written
//! into the statement text, and those go through `quote_identifier`.

use async_trait::async_trait;
use bytes::BytesMut;
use pg_escape::quote_identifier;
use std::{collections::HashMap, error::Error};
use tokio_postgres::{
    types::{to_sql_checked, Format, IsNull, ToSql, Type},
    Client, Statement,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    error::{Origin, PipelineError, Result},
    process::NormalizedRecord,
};

/// An open, already validated destination session. The sink issues one
/// statement at a time and never opens or closes the session itself.
#[async_trait]
pub trait Session: Send {
    /// Run a parameterized statement with `values` bound to `$1..$n`;
    /// `None` binds SQL NULL. Returns the affected row count.
    async fn execute(&mut self, sql: &str, values: &[Option<&str>]) -> Result<u64, String>;

    /// Run a parameterless statement such as `BEGIN`.
    async fn batch_execute(&mut self, sql: &str) -> Result<(), String>;
}

/// How rows are committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InsertMode {
    /// Each INSERT commits on its own; the first failure stops the run and
    /// every earlier row stays persisted.
    #[default]
    PerRow,
    /// All rows inside one transaction; the first failure rolls everything back.
    Transactional,
}

/// How the relational sink commits rows and binds values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    pub mode: InsertMode,
    /// Bind empty fields as NULL instead of the empty string.
    pub empty_as_null: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertReport {
    pub inserted: usize,
}

/// A value bound in text format, so the server parses it with the input
/// function of whatever type the destination column has. `None` is NULL.
#[derive(Debug)]
struct TextParam<'a>(Option<&'a str>);

impl ToSql for TextParam<'_> {
    fn to_sql(
        &self,
        _ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self.0 {
            Some(value) => {
                out.extend_from_slice(value.as_bytes());
                Ok(IsNull::No)
            }
            None => Ok(IsNull::Yes),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

/// `Session` over a `tokio_postgres::Client`, preparing each distinct
/// statement once.
pub struct PgSession {
    client: Client,
    statements: HashMap<String, Statement>,
}

impl PgSession {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            statements: HashMap::new(),
        }
    }

    /// Round-trip `SELECT 1` to confirm the session is usable.
    pub async fn ping(&self) -> Result<(), String> {
        self.client
            .query_one("SELECT 1", &[])
            .await
            .map(|_| ())
            .map_err(|e| describe_pg_error(&e))
    }

    pub fn into_inner(self) -> Client {
        self.client
    }
}

#[async_trait]
impl Session for PgSession {
    async fn execute(&mut self, sql: &str, values: &[Option<&str>]) -> Result<u64, String> {
        let stmt = match self.statements.get(sql) {
            Some(stmt) => stmt.clone(),
            None => {
                let stmt = self
                    .client
                    .prepare(sql)
                    .await
                    .map_err(|e| describe_pg_error(&e))?;
                self.statements.insert(sql.to_string(), stmt.clone());
                stmt
            }
        };

        let params: Vec<TextParam<'_>> = values.iter().map(|v| TextParam(*v)).collect();
        let refs: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

        self.client
            .execute(&stmt, &refs)
            .await
            .map_err(|e| describe_pg_error(&e))
    }

    async fn batch_execute(&mut self, sql: &str) -> Result<(), String> {
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| describe_pg_error(&e))
    }
}

/// Server-side errors carry severity, message and detail; prefer those over
/// the generic wrapper text.
fn describe_pg_error(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => db.to_string(),
        None => e.to_string(),
    }
}

/// `schema.table` quotes each part separately.
pub fn qualified_table(table: &str) -> String {
    match table.split_once('.') {
        Some((schema, name)) => format!(
            "{}.{}",
            quote_identifier(schema),
            quote_identifier(name)
        ),
        None => quote_identifier(table).to_string(),
    }
}

/// `INSERT INTO <table> (<header...>) VALUES ($1, ..., $n)`.
pub fn insert_statement(table: &str, header: &[String]) -> String {
    let col_list = header
        .iter()
        .map(|h| quote_identifier(h).to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=header.len())
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified_table(table),
        col_list,
        placeholders
    )
}

/// Insert `records` from `origin` into `table` in order, one statement per
/// record, values bound in `header` order. Values are sent as extracted;
/// only `empty_as_null` turns an empty field into NULL.
///
/// In `PerRow` mode a failure leaves every earlier row persisted; the error's
/// `committed` count says how many. In `Transactional` mode a failure rolls
/// back and `committed` is 0. Nothing is retried.
#[instrument(
    level = "info",
    skip(session, origin, header, records),
    fields(source_table = origin.table, records = records.len())
)]
pub async fn insert_records<S: Session + ?Sized>(
    session: &mut S,
    origin: Origin<'_>,
    table: &str,
    header: &[String],
    records: &[NormalizedRecord],
    options: InsertOptions,
) -> Result<InsertReport> {
    let mode = options.mode;
    if records.is_empty() {
        info!("no rows to insert");
        return Ok(InsertReport { inserted: 0 });
    }

    let sql = insert_statement(table, header);
    debug!(sql = %sql, "insert statement");

    let insert_err = |row: usize, committed: usize, diagnostic: String| PipelineError::Insert {
        source_path: origin.source.to_path_buf(),
        table: origin.table.to_string(),
        destination_table: table.to_string(),
        row,
        committed,
        diagnostic,
    };

    if mode == InsertMode::Transactional {
        session
            .batch_execute("BEGIN")
            .await
            .map_err(|d| insert_err(0, 0, d))?;
    }

    for (row, record) in records.iter().enumerate() {
        let outcome = match bind_values(header, record, options.empty_as_null) {
            Ok(values) => session.execute(&sql, &values).await,
            Err(missing) => Err(format!("record has no value for column `{}`", missing)),
        };

        if let Err(diagnostic) = outcome {
            warn!(row, diagnostic = %diagnostic, "insert failed");
            let committed = match mode {
                InsertMode::PerRow => row,
                InsertMode::Transactional => {
                    if let Err(e) = session.batch_execute("ROLLBACK").await {
                        warn!(error = %e, "rollback failed");
                    }
                    0
                }
            };
            return Err(insert_err(row, committed, diagnostic));
        }
    }

    if mode == InsertMode::Transactional {
        session
            .batch_execute("COMMIT")
            .await
            .map_err(|d| insert_err(records.len(), 0, format!("commit failed: {}", d)))?;
    }

    info!(inserted = records.len(), "rows inserted");
    Ok(InsertReport {
        inserted: records.len(),
    })
}

fn bind_values<'r>(
    header: &[String],
    record: &'r NormalizedRecord,
    empty_as_null: bool,
) -> Result<Vec<Option<&'r str>>, String> {
    header
        .iter()
        .map(|h| match record.get(h) {
            Some("") if empty_as_null => Ok(None),
            Some(v) => Ok(Some(v)),
            None => Err(h.clone()),
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSession;
    use super::*;
    use std::path::Path;

    fn origin() -> Origin<'static> {
        Origin::new(Path::new("base.accdb"), "Employees")
    }

    fn header() -> Vec<String> {
        vec!["ID".to_string(), "Name".to_string()]
    }

    fn employees() -> Vec<NormalizedRecord> {
        vec![
            [("ID", "1"), ("Name", "Ana")].into_iter().collect(),
            [("ID", "2"), ("Name", "Bo")].into_iter().collect(),
        ]
    }

    fn per_row() -> InsertOptions {
        InsertOptions::default()
    }

    fn transactional() -> InsertOptions {
        InsertOptions {
            mode: InsertMode::Transactional,
            ..InsertOptions::default()
        }
    }

    /// What `PgSession` would put on the wire for `values`.
    fn encoded(values: &[Option<&str>]) -> Vec<Option<Vec<u8>>> {
        values
            .iter()
            .map(|v| {
                let mut buf = BytesMut::new();
                match TextParam(*v).to_sql(&Type::TEXT, &mut buf).unwrap() {
                    IsNull::Yes => None,
                    IsNull::No => Some(buf.to_vec()),
                }
            })
            .collect()
    }

    #[test]
    fn statement_uses_positional_placeholders() {
        assert_eq!(
            insert_statement("Employees", &header()),
            r#"INSERT INTO "Employees" ("ID", "Name") VALUES ($1, $2)"#
        );
    }

    #[test]
    fn hostile_identifiers_are_quoted() {
        let sql = insert_statement("t\"; DROP TABLE x; --", &["a b".to_string()]);
        assert_eq!(
            sql,
            r#"INSERT INTO "t""; DROP TABLE x; --" ("a b") VALUES ($1)"#
        );
    }

    #[test]
    fn schema_qualified_table() {
        assert_eq!(qualified_table("staging.Employees"), r#"staging."Employees""#);
    }

    #[tokio::test]
    async fn one_insert_per_row_in_order() {
        let mut session = RecordingSession::default();
        let report = insert_records(
            &mut session,
            origin(),
            "Employees",
            &header(),
            &employees(),
            per_row(),
        )
        .await
        .unwrap();

        assert_eq!(report.inserted, 2);
        assert!(session.control.is_empty());
        assert_eq!(
            session.bound(),
            vec![vec![Some("1"), Some("Ana")], vec![Some("2"), Some("Bo")]]
        );
        assert!(session.executed.iter().all(|(sql, _)| !sql.contains("Ana")));
    }

    #[tokio::test]
    async fn values_follow_header_not_record_order() {
        let mut session = RecordingSession::default();
        let record: NormalizedRecord = [("Name", "Ana"), ("ID", "1")].into_iter().collect();
        insert_records(&mut session, origin(), "Employees", &header(), &[record], per_row())
            .await
            .unwrap();
        assert_eq!(session.bound(), vec![vec![Some("1"), Some("Ana")]]);
    }

    #[tokio::test]
    async fn empty_field_is_sent_as_empty_string() {
        let mut session = RecordingSession::default();
        let record: NormalizedRecord = [("ID", "1"), ("Name", "")].into_iter().collect();
        insert_records(&mut session, origin(), "Employees", &header(), &[record], per_row())
            .await
            .unwrap();

        let bound = session.bound();
        assert_eq!(bound, vec![vec![Some("1"), Some("")]]);
        assert_eq!(
            encoded(&bound[0]),
            vec![Some(b"1".to_vec()), Some(Vec::new())]
        );
    }

    #[tokio::test]
    async fn empty_as_null_is_opt_in() {
        let mut session = RecordingSession::default();
        let record: NormalizedRecord = [("ID", "1"), ("Name", "")].into_iter().collect();
        let options = InsertOptions {
            empty_as_null: true,
            ..InsertOptions::default()
        };
        insert_records(&mut session, origin(), "Employees", &header(), &[record], options)
            .await
            .unwrap();

        let bound = session.bound();
        assert_eq!(bound, vec![vec![Some("1"), None]]);
        assert_eq!(encoded(&bound[0]), vec![Some(b"1".to_vec()), None]);
    }

    #[tokio::test]
    async fn per_row_failure_keeps_earlier_rows() {
        let mut session = RecordingSession::failing_at(1, "duplicate key value");
        let err = insert_records(
            &mut session,
            origin(),
            "emp",
            &header(),
            &employees(),
            per_row(),
        )
        .await
        .unwrap_err();

        match err {
            PipelineError::Insert {
                ref source_path,
                ref table,
                ref destination_table,
                row,
                committed,
                ref diagnostic,
            } => {
                assert_eq!(source_path, Path::new("base.accdb"));
                assert_eq!(table, "Employees");
                assert_eq!(destination_table, "emp");
                assert_eq!(row, 1);
                assert_eq!(committed, 1);
                assert_eq!(diagnostic, "duplicate key value");
            }
            ref other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("base.accdb"), "{err}");
        assert_eq!(session.persisted(), 1);
    }

    #[tokio::test]
    async fn first_failure_stops_remaining_rows() {
        let mut session = RecordingSession::failing_at(0, "boom");
        let err = insert_records(
            &mut session,
            origin(),
            "Employees",
            &header(),
            &employees(),
            per_row(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::Insert { row: 0, committed: 0, .. }));
        assert!(session.executed.is_empty());
    }

    #[tokio::test]
    async fn transactional_failure_rolls_back() {
        let mut session = RecordingSession::failing_at(1, "value too long");
        let err = insert_records(
            &mut session,
            origin(),
            "Employees",
            &header(),
            &employees(),
            transactional(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::Insert { row: 1, committed: 0, .. }));
        assert_eq!(session.control, ["BEGIN", "ROLLBACK"]);
        assert_eq!(session.persisted(), 0);
    }

    #[tokio::test]
    async fn transactional_success_commits() {
        let mut session = RecordingSession::default();
        insert_records(
            &mut session,
            origin(),
            "Employees",
            &header(),
            &employees(),
            transactional(),
        )
        .await
        .unwrap();
        assert_eq!(session.control, ["BEGIN", "COMMIT"]);
        assert_eq!(session.persisted(), 2);
    }

    #[tokio::test]
    async fn no_records_issues_nothing() {
        let mut session = RecordingSession::default();
        let report = insert_records(&mut session, origin(), "T", &header(), &[], transactional())
            .await
            .unwrap();
        assert_eq!(report.inserted, 0);
        assert!(session.control.is_empty() && session.executed.is_empty());
    }

    #[tokio::test]
    async fn record_missing_a_column_is_an_insert_error() {
        let mut session = RecordingSession::default();
        let record: NormalizedRecord = [("ID", "1")].into_iter().collect();
        let err = insert_records(&mut session, origin(), "T", &header(), &[record], per_row())
            .await
            .unwrap_err();
        assert!(
            matches!(err, PipelineError::Insert { row: 0, ref diagnostic, .. } if diagnostic.contains("Name"))
        );
    }

    #[test]
    fn text_param_sends_text_and_null_only_for_none() {
        let mut buf = BytesMut::new();
        assert!(matches!(
            TextParam(Some("")).to_sql(&Type::TEXT, &mut buf).unwrap(),
            IsNull::No
        ));
        assert!(buf.is_empty());
        assert!(matches!(
            TextParam(None).to_sql(&Type::INT4, &mut buf).unwrap(),
            IsNull::Yes
        ));
        assert!(matches!(
            TextParam(Some("42")).to_sql(&Type::INT4, &mut buf).unwrap(),
            IsNull::No
        ));
        assert_eq!(&buf[..], b"42");
        assert!(matches!(TextParam(Some("42")).encode_format(&Type::INT4), Format::Text));
    }
}
