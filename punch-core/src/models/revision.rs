use std::fmt;

/// Sync state of a header or entry.
///
/// A record is `Pending` from the moment it is created or edited locally
/// until a sync round confirms it; it then carries the server revision of
/// that round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum Revision {
    #[default]
    Pending,
    Committed(i64),
}

impl Revision {
    pub fn is_pending(&self) -> bool {
        matches!(self, Revision::Pending)
    }

    pub fn committed(&self) -> Option<i64> {
        match self {
            Revision::Pending => None,
            Revision::Committed(rev) => Some(*rev),
        }
    }

    /// Maps the nullable `revision` column.
    pub fn from_column(value: Option<i64>) -> Self {
        value.map_or(Revision::Pending, Revision::Committed)
    }

    pub fn to_column(self) -> Option<i64> {
        self.committed()
    }

    /// Value sent on the wire; pending records go out as revision 0.
    pub fn to_wire(self) -> i64 {
        self.committed().unwrap_or(0)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Revision::Pending => write!(f, "pending"),
            Revision::Committed(rev) => write!(f, "r{}", rev),
        }
    }
}
