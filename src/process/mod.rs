// src/process/mod.rs
pub mod normalize;
pub mod raw_table;
pub mod record;

pub use normalize::{normalize, DroppedRow, Normalized};
pub use raw_table::{RawRow, RawTable};
pub use record::NormalizedRecord;
