use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{record::NormalizedRecord, RawRow};

/// A row left out of the output because its field count did not match the
/// header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DroppedRow {
    /// 0-based position among the data rows (header excluded).
    pub index: usize,
    pub expected: usize,
    pub found: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Normalized {
    pub records: Vec<NormalizedRecord>,
    pub dropped: Vec<DroppedRow>,
}

impl Normalized {
    /// Rows seen, accepted or not.
    pub fn total_rows(&self) -> usize {
        self.records.len() + self.dropped.len()
    }
}

/// Map each row onto the header. Rows whose length differs from the
/// header's are dropped and logged; they never fail the run and are never
/// partially merged.
#[instrument(level = "info", skip(header, rows), fields(columns = header.len(), rows = rows.len()))]
pub fn normalize(header: &[String], rows: Vec<RawRow>) -> Normalized {
    let mut out = Normalized {
        records: Vec::with_capacity(rows.len()),
        dropped: Vec::new(),
    };

    for (index, row) in rows.into_iter().enumerate() {
        if row.len() != header.len() {
            warn!(
                row = index,
                expected = header.len(),
                found = row.len(),
                "skipping row: field count does not match header"
            );
            out.dropped.push(DroppedRow {
                index,
                expected: header.len(),
                found: row.len(),
            });
            continue;
        }

        out.records
            .push(header.iter().cloned().zip(row).collect::<NormalizedRecord>());
    }

    info!(
        accepted = out.records.len(),
        dropped = out.dropped.len(),
        "normalized"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn maps_fields_in_header_order() {
        let header = strings(&["ID", "Name"]);
        let rows = vec![strings(&["1", "Ana"]), strings(&["2", "Bo"])];
        let out = normalize(&header, rows);

        assert!(out.dropped.is_empty());
        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[0].keys().collect::<Vec<_>>(), ["ID", "Name"]);
        assert_eq!(out.records[1].values().collect::<Vec<_>>(), ["2", "Bo"]);
    }

    #[test]
    fn short_and_long_rows_are_dropped() {
        let header = strings(&["A", "B", "C"]);
        let rows = vec![
            strings(&["1", "2", "3"]),
            strings(&["1", "2"]),
            strings(&["1", "2", "3", "4"]),
            strings(&["x", "y", "z"]),
        ];
        let out = normalize(&header, rows);

        assert_eq!(out.records.len(), 2);
        assert_eq!(out.records[1].get("A"), Some("x"));
        assert_eq!(
            out.dropped,
            vec![
                DroppedRow { index: 1, expected: 3, found: 2 },
                DroppedRow { index: 2, expected: 3, found: 4 },
            ]
        );
        assert_eq!(out.total_rows(), 4);
    }

    #[test]
    fn empty_input_is_empty_output() {
        let out = normalize(&strings(&["ID"]), Vec::new());
        assert_eq!(out, Normalized::default());
    }

    #[test]
    fn accepted_count_matches_well_formed_rows() {
        let header = strings(&["a", "b"]);
        let rows: Vec<RawRow> = (0..50)
            .map(|i| (0..(i % 4)).map(|j| j.to_string()).collect())
            .collect();
        let well_formed = rows.iter().filter(|r| r.len() == header.len()).count();

        let out = normalize(&header, rows);
        assert_eq!(out.records.len(), well_formed);
        assert_eq!(out.dropped.len(), 50 - well_formed);
        assert!(out.records.iter().all(|r| r.len() == 2));
    }
}
