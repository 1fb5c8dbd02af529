use std::{env, path::PathBuf};

/// Settings for the external mdb-tools capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolsConfig {
    /// `mdb-export` executable: table rows as delimited text.
    pub export_bin: PathBuf,
    /// `mdb-schema` executable: DDL-like schema dump.
    pub schema_bin: PathBuf,
    /// `mdb-tables` executable: table names.
    pub tables_bin: PathBuf,
    /// Backend passed to `mdb-schema`; `sqlite` quotes identifiers with backticks.
    pub schema_backend: String,
    /// Optional `mdb-export -D` date format.
    pub date_format: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            export_bin: PathBuf::from("mdb-export"),
            schema_bin: PathBuf::from("mdb-schema"),
            tables_bin: PathBuf::from("mdb-tables"),
            schema_backend: "sqlite".to_string(),
            date_format: None,
        }
    }
}

impl ToolsConfig {
    /// Defaults overridden by `MDB_EXPORT_BIN`, `MDB_SCHEMA_BIN`,
    /// `MDB_TABLES_BIN`, `MDB_SCHEMA_BACKEND` and `MDB_DATE_FORMAT`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            export_bin: non_empty("MDB_EXPORT_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.export_bin),
            schema_bin: non_empty("MDB_SCHEMA_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.schema_bin),
            tables_bin: non_empty("MDB_TABLES_BIN")
                .map(PathBuf::from)
                .unwrap_or(defaults.tables_bin),
            schema_backend: non_empty("MDB_SCHEMA_BACKEND").unwrap_or(defaults.schema_backend),
            date_format: non_empty("MDB_DATE_FORMAT"),
        }
    }
}
