/// One source record: string fields positionally aligned to the header.
pub type RawRow = Vec<String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    /// Column names, from the first row of the extraction output.
    pub headers: Vec<String>,
    /// Every following row, as a Vec of Strings (one per field). Field counts
    /// are not checked here; the normalizer drops mismatched rows.
    pub rows: Vec<RawRow>,
}
