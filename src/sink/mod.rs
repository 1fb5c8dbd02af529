pub mod file;
pub mod postgres;

pub use file::write_document;
pub use postgres::{insert_records, InsertMode, InsertOptions, InsertReport, PgSession, Session};
