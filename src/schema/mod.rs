pub mod dump;
pub mod types;

pub use dump::find_table_columns;
pub use types::{ColumnDescriptor, TableSchema};
