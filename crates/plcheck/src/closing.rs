//! The closing-state merge lattice.
//!
//! A statement's closing state is the checker's best-effort classification
//! of whether its execution paths always end in RETURN, always raise, do
//! either depending on the path, or neither.

use pl::sqlstate::{SqlState, RERAISE};

/// A small ordered set of SQLSTATE codes.
///
/// Kept sorted so that merges and reports are deterministic; re-running the
/// checker on an unmodified routine must produce an identical diagnostic
/// list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SqlStateSet {
    codes: Vec<SqlState>,
}

impl SqlStateSet {
    pub fn new() -> SqlStateSet {
        SqlStateSet::default()
    }

    pub fn single(code: SqlState) -> SqlStateSet {
        SqlStateSet { codes: vec![code] }
    }

    pub fn insert(&mut self, code: SqlState) -> bool {
        match self.codes.binary_search(&code) {
            Ok(_) => false,
            Err(idx) => {
                self.codes.insert(idx, code);
                true
            }
        }
    }

    pub fn remove(&mut self, code: SqlState) -> bool {
        match self.codes.binary_search(&code) {
            Ok(idx) => {
                self.codes.remove(idx);
                true
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, code: SqlState) -> bool {
        self.codes.binary_search(&code).is_ok()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = SqlState> + '_ {
        self.codes.iter().copied()
    }

    pub fn union(mut self, other: SqlStateSet) -> SqlStateSet {
        for code in other.codes {
            self.insert(code);
        }
        self
    }
}

/// Per-statement control-flow closing guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Closing {
    /// No statement has contributed yet (the empty statement list).
    Unknown,
    /// Execution can fall through.
    Unclosed,
    /// Some paths close, some fall through.
    PossiblyClosed,
    /// Every path ends in RETURN.
    Closed,
    /// Every path raises one of the carried codes. The set may carry the
    /// re-raise sentinel until resolved against an enclosing handler.
    ClosedByRaise(SqlStateSet),
}

impl Closing {
    pub fn raise(code: SqlState) -> Closing {
        Closing::ClosedByRaise(SqlStateSet::single(code))
    }

    /// Whether no path falls through.
    pub fn is_closed(&self) -> bool {
        matches!(self, Closing::Closed | Closing::ClosedByRaise(_))
    }

    /// The lattice merge, associative, used for both the sequential fold
    /// over a statement list and the fold over branches.
    pub fn merge(self, other: Closing) -> Closing {
        use self::Closing::*;
        match (self, other) {
            (Unknown, b) => b,
            (a, Unknown) => a,
            (Unclosed, Unclosed) => Unclosed,
            (PossiblyClosed, PossiblyClosed) => PossiblyClosed,
            (Closed, Closed) => Closed,
            (ClosedByRaise(a), ClosedByRaise(b)) => ClosedByRaise(a.union(b)),
            (Closed, ClosedByRaise(_)) | (ClosedByRaise(_), Closed) => Closed,
            _ => PossiblyClosed,
        }
    }

    /// Degrade a closing guarantee that may not apply: a loop body that may
    /// run zero times, or a branch set with no ELSE arm.
    pub fn possibly(self) -> Closing {
        match self {
            Closing::Closed | Closing::ClosedByRaise(_) | Closing::PossiblyClosed => {
                Closing::PossiblyClosed
            }
            other => other,
        }
    }

    /// Replace the re-raise sentinel with the handler's matched code.
    pub fn resolve_reraise(self, code: SqlState) -> Closing {
        match self {
            Closing::ClosedByRaise(mut set) => {
                if set.remove(RERAISE) {
                    set.insert(code);
                }
                Closing::ClosedByRaise(set)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pl::sqlstate::SqlState;

    fn st(code: &str) -> SqlState {
        SqlState::from_code(code).unwrap()
    }

    #[test]
    fn unknown_is_identity() {
        assert_eq!(Closing::Unknown.merge(Closing::Closed), Closing::Closed);
        assert_eq!(Closing::Unclosed.merge(Closing::Unknown), Closing::Unclosed);
    }

    #[test]
    fn equal_states_merge_to_themselves() {
        assert_eq!(Closing::Closed.merge(Closing::Closed), Closing::Closed);
        assert_eq!(Closing::Unclosed.merge(Closing::Unclosed), Closing::Unclosed);
    }

    #[test]
    fn raise_sets_union() {
        let a = Closing::raise(st("22012"));
        let b = Closing::raise(st("23505"));
        match a.merge(b) {
            Closing::ClosedByRaise(set) => {
                assert!(set.contains(st("22012")));
                assert!(set.contains(st("23505")));
                assert_eq!(set.len(), 2);
            }
            other => panic!("expected ClosedByRaise, got {:?}", other),
        }
    }

    #[test]
    fn closed_absorbs_raise() {
        assert_eq!(
            Closing::Closed.merge(Closing::raise(st("22012"))),
            Closing::Closed
        );
        assert_eq!(
            Closing::raise(st("22012")).merge(Closing::Closed),
            Closing::Closed
        );
    }

    #[test]
    fn mixed_is_possibly_closed() {
        assert_eq!(
            Closing::Closed.merge(Closing::Unclosed),
            Closing::PossiblyClosed
        );
        assert_eq!(
            Closing::raise(st("22012")).merge(Closing::Unclosed),
            Closing::PossiblyClosed
        );
        assert_eq!(
            Closing::PossiblyClosed.merge(Closing::Closed),
            Closing::PossiblyClosed
        );
    }

    #[test]
    fn merge_is_associative_on_samples() {
        let states = [
            Closing::Unknown,
            Closing::Unclosed,
            Closing::PossiblyClosed,
            Closing::Closed,
            Closing::raise(st("22012")),
            Closing::raise(st("P0001")),
        ];
        for a in states.iter() {
            for b in states.iter() {
                for c in states.iter() {
                    let left = a.clone().merge(b.clone()).merge(c.clone());
                    let right = a.clone().merge(b.clone().merge(c.clone()));
                    assert_eq!(left, right, "merge({:?}, {:?}, {:?})", a, b, c);
                }
            }
        }
    }

    #[test]
    fn loop_degradation() {
        assert_eq!(Closing::Closed.possibly(), Closing::PossiblyClosed);
        assert_eq!(
            Closing::raise(st("22012")).possibly(),
            Closing::PossiblyClosed
        );
        assert_eq!(Closing::Unclosed.possibly(), Closing::Unclosed);
        assert_eq!(Closing::Unknown.possibly(), Closing::Unknown);
    }

    #[test]
    fn reraise_resolution() {
        let state = Closing::raise(RERAISE).resolve_reraise(st("22012"));
        match state {
            Closing::ClosedByRaise(set) => {
                assert!(set.contains(st("22012")));
                assert!(!set.contains(RERAISE));
            }
            other => panic!("expected ClosedByRaise, got {:?}", other),
        }
    }
}
