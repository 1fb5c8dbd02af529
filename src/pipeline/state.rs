use std::fmt;

/// Where a single run is. Runs start and end in `Idle`; nothing carries over
/// between runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunState {
    Idle,
    SchemaAcquired,
    RowsExtracted,
    Normalized,
    Sunk { success: bool },
}

impl RunState {
    pub fn as_str(&self) -> &str {
        match self {
            RunState::Idle => "Idle",
            RunState::SchemaAcquired => "SchemaAcquired",
            RunState::RowsExtracted => "RowsExtracted",
            RunState::Normalized => "Normalized",
            RunState::Sunk { success: true } => "Sunk(success)",
            RunState::Sunk { success: false } => "Sunk(failure)",
        }
    }

    /// Legal transitions. Any state but `Idle` may fail straight to
    /// `Sunk(failure)`; an extraction failure from `Idle` does too.
    pub fn can_advance_to(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Sunk { .. }, Idle) | (SchemaAcquired, Idle) => true,
            (Idle, SchemaAcquired) | (Idle, RowsExtracted) => true,
            (RowsExtracted, Normalized) => true,
            (Normalized, Sunk { .. }) => true,
            (Sunk { .. }, Sunk { .. }) => false,
            (_, Sunk { success: false }) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The pipeline stage a failure is attributed to in user-facing reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Extraction,
    SchemaLookup,
    /// Named in reports but never a failure: the normalizer cannot fail, it
    /// drops mismatched rows and counts them in the run summary.
    Normalization,
    SinkWrite,
    Insert,
}

impl Stage {
    pub fn as_str(&self) -> &str {
        match self {
            Stage::Extraction => "extraction",
            Stage::SchemaLookup => "schema lookup",
            Stage::Normalization => "normalization",
            Stage::SinkWrite => "sink write",
            Stage::Insert => "insert",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::RunState::*;
    use super::*;

    #[test]
    fn export_path_is_legal() {
        let path = [
            Idle,
            RowsExtracted,
            Normalized,
            Sunk { success: true },
            Idle,
        ];
        assert!(path.windows(2).all(|w| w[0].can_advance_to(w[1])));
    }

    #[test]
    fn describe_is_terminal_at_schema_acquired() {
        assert!(Idle.can_advance_to(SchemaAcquired));
        assert!(SchemaAcquired.can_advance_to(Idle));
        assert!(!SchemaAcquired.can_advance_to(RowsExtracted));
    }

    #[test]
    fn normalization_is_never_skipped() {
        assert!(!RowsExtracted.can_advance_to(Sunk { success: true }));
        assert!(RowsExtracted.can_advance_to(Sunk { success: false }));
    }

    #[test]
    fn failures_go_straight_to_sunk() {
        for s in [Idle, SchemaAcquired, RowsExtracted, Normalized] {
            assert!(s.can_advance_to(Sunk { success: false }), "{s}");
        }
        assert!(!Sunk { success: false }.can_advance_to(Sunk { success: false }));
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::SchemaLookup.to_string(), "schema lookup");
        assert_eq!(Stage::Normalization.to_string(), "normalization");
        assert_eq!(Sunk { success: false }.to_string(), "Sunk(failure)");
    }
}
