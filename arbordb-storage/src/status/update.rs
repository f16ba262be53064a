//! Immutable table-status update commands.
//!
//! Counter mutations are funneled through these commands so that a
//! pending-update log can collapse redundant work before it is
//! applied: two increments for the same table combine into one, an
//! increment and a decrement cancel, and monotonic setters keep only
//! the maximum. Folding only ever pairs updates for the same table,
//! so per-table submission order is preserved.

/// One redo-style counter mutation for a single table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    IncrementRowCount { table_id: u32, delta: u64 },
    DecrementRowCount { table_id: u32, delta: u64 },
    Truncate { table_id: u32 },
    Drop { table_id: u32 },
    SetAutoIncrement { table_id: u32, value: u64 },
    SetUniqueId { table_id: u32, value: u64 },
    AssignOrdinal { table_id: u32, ordinal: u32 },
}

impl StatusUpdate {
    #[inline]
    pub fn table_id(&self) -> u32 {
        match *self {
            StatusUpdate::IncrementRowCount { table_id, .. }
            | StatusUpdate::DecrementRowCount { table_id, .. }
            | StatusUpdate::Truncate { table_id }
            | StatusUpdate::Drop { table_id }
            | StatusUpdate::SetAutoIncrement { table_id, .. }
            | StatusUpdate::SetUniqueId { table_id, .. }
            | StatusUpdate::AssignOrdinal { table_id, .. } => table_id,
        }
    }

    /// Attempts to fold `new` into `self`. Callers only invoke this
    /// for updates targeting the same table.
    pub(crate) fn fold(&self, new: &StatusUpdate) -> Fold {
        use StatusUpdate::*;
        debug_assert_eq!(self.table_id(), new.table_id());
        let table_id = self.table_id();
        match (*self, *new) {
            (IncrementRowCount { delta: a, .. }, IncrementRowCount { delta: b, .. }) => {
                Fold::Combined(IncrementRowCount {
                    table_id,
                    delta: a + b,
                })
            }
            (DecrementRowCount { delta: a, .. }, DecrementRowCount { delta: b, .. }) => {
                Fold::Combined(DecrementRowCount {
                    table_id,
                    delta: a + b,
                })
            }
            (IncrementRowCount { delta: a, .. }, DecrementRowCount { delta: b, .. }) => {
                net(table_id, a, b)
            }
            (DecrementRowCount { delta: a, .. }, IncrementRowCount { delta: b, .. }) => {
                net(table_id, b, a)
            }
            (SetAutoIncrement { value: a, .. }, SetAutoIncrement { value: b, .. }) => {
                Fold::Combined(SetAutoIncrement {
                    table_id,
                    value: a.max(b),
                })
            }
            (SetUniqueId { value: a, .. }, SetUniqueId { value: b, .. }) => {
                Fold::Combined(SetUniqueId {
                    table_id,
                    value: a.max(b),
                })
            }
            // a later assignment supersedes the pending one.
            (AssignOrdinal { .. }, AssignOrdinal { ordinal, .. }) => {
                Fold::Combined(AssignOrdinal { table_id, ordinal })
            }
            // truncate wipes counters: pending counter changes for the
            // same table are moot.
            (IncrementRowCount { .. }, Truncate { .. })
            | (DecrementRowCount { .. }, Truncate { .. })
            | (SetAutoIncrement { .. }, Truncate { .. })
            | (SetUniqueId { .. }, Truncate { .. }) => Fold::Combined(Truncate { table_id }),
            _ => Fold::Keep,
        }
    }
}

/// Result of folding a new update into a pending one.
pub(crate) enum Fold {
    /// The pending update is replaced by the combined one.
    Combined(StatusUpdate),
    /// The pending update and the new one net to nothing.
    Cancelled,
    /// No relationship; the new update is queued separately.
    Keep,
}

fn net(table_id: u32, inc: u64, dec: u64) -> Fold {
    use std::cmp::Ordering::*;
    match inc.cmp(&dec) {
        Equal => Fold::Cancelled,
        Greater => Fold::Combined(StatusUpdate::IncrementRowCount {
            table_id,
            delta: inc - dec,
        }),
        Less => Fold::Combined(StatusUpdate::DecrementRowCount {
            table_id,
            delta: dec - inc,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_increment_decrement_cancel() {
        let inc = StatusUpdate::IncrementRowCount {
            table_id: 1,
            delta: 1,
        };
        let dec = StatusUpdate::DecrementRowCount {
            table_id: 1,
            delta: 1,
        };
        assert!(matches!(inc.fold(&dec), Fold::Cancelled));
    }

    #[test]
    fn test_increment_combine() {
        let a = StatusUpdate::IncrementRowCount {
            table_id: 1,
            delta: 2,
        };
        let b = StatusUpdate::IncrementRowCount {
            table_id: 1,
            delta: 3,
        };
        match a.fold(&b) {
            Fold::Combined(StatusUpdate::IncrementRowCount { delta: 5, .. }) => {}
            _ => panic!("expected combined increment"),
        }
    }

    #[test]
    fn test_partial_cancel_leaves_residual() {
        let inc = StatusUpdate::IncrementRowCount {
            table_id: 1,
            delta: 5,
        };
        let dec = StatusUpdate::DecrementRowCount {
            table_id: 1,
            delta: 2,
        };
        match inc.fold(&dec) {
            Fold::Combined(StatusUpdate::IncrementRowCount { delta: 3, .. }) => {}
            _ => panic!("expected residual increment"),
        }
    }

    #[test]
    fn test_auto_increment_keeps_max() {
        let a = StatusUpdate::SetAutoIncrement {
            table_id: 1,
            value: 5,
        };
        let b = StatusUpdate::SetAutoIncrement {
            table_id: 1,
            value: 3,
        };
        match a.fold(&b) {
            Fold::Combined(StatusUpdate::SetAutoIncrement { value: 5, .. }) => {}
            _ => panic!("expected max value"),
        }
    }

    #[test]
    fn test_unrelated_kinds_kept() {
        let a = StatusUpdate::SetAutoIncrement {
            table_id: 1,
            value: 5,
        };
        let b = StatusUpdate::AssignOrdinal {
            table_id: 1,
            ordinal: 2,
        };
        assert!(matches!(a.fold(&b), Fold::Keep));
    }
}
