//! Variable-usage dataflow: per-routine bitsets keyed by slot number and
//! the post-walk usage report.

use pl::ast::{Dno, ParamMode, Routine, SlotFlags, SlotKind};
use pl::config::CheckerOptions;
use pl::{Category, Context, PlError, Severity};

/// A set of variable slots, stored as bitmap words keyed by `dno`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotSet {
    words: Vec<u64>,
}

impl SlotSet {
    pub fn new() -> SlotSet {
        SlotSet::default()
    }

    pub fn with_capacity(max_dno: Dno) -> SlotSet {
        SlotSet {
            words: vec![0; (max_dno as usize / 64) + 1],
        }
    }

    /// Add a slot; returns `true` if it was not already present.
    pub fn insert(&mut self, dno: Dno) -> bool {
        let word = dno as usize / 64;
        let bit = 1u64 << (dno % 64);
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        let present = self.words[word] & bit != 0;
        self.words[word] |= bit;
        !present
    }

    pub fn remove(&mut self, dno: Dno) -> bool {
        let word = dno as usize / 64;
        let bit = 1u64 << (dno % 64);
        if word >= self.words.len() {
            return false;
        }
        let present = self.words[word] & bit != 0;
        self.words[word] &= !bit;
        present
    }

    pub fn contains(&self, dno: Dno) -> bool {
        let word = dno as usize / 64;
        word < self.words.len() && self.words[word] & (1u64 << (dno % 64)) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = Dno> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &word)| {
            (0..64)
                .filter(move |bit| word & (1u64 << bit) != 0)
                .map(move |bit| (i * 64 + bit) as Dno)
        })
    }
}

/// Per-routine bitsets recording slot usage during one walk, plus the
/// diagnostics they drive once the walk completes.
#[derive(Debug, Clone)]
pub struct UsageTracker {
    /// Slots read anywhere.
    pub used: SlotSet,
    /// Slots written anywhere.
    pub modified: SlotSet,
    /// Slots exempt from the unused report.
    pub protected: SlotSet,
    /// Compiler-generated slots.
    pub auto: SlotSet,
    /// Slots currently known taint-clean.
    pub safe: SlotSet,
    /// OUT and INOUT parameter slots.
    pub out_params: SlotSet,
    /// Slots retyped by a pragma directive.
    pub typed: SlotSet,
}

impl UsageTracker {
    /// Seed the invariant sets from the routine's variable table. The
    /// usage sets start empty and grow monotonically during the walk.
    pub fn for_routine(routine: &Routine) -> UsageTracker {
        let cap = routine.max_dno();
        let mut tracker = UsageTracker {
            used: SlotSet::with_capacity(cap),
            modified: SlotSet::with_capacity(cap),
            protected: SlotSet::with_capacity(cap),
            auto: SlotSet::with_capacity(cap),
            safe: SlotSet::with_capacity(cap),
            out_params: SlotSet::with_capacity(cap),
            typed: SlotSet::with_capacity(cap),
        };
        for var in routine.variables.iter() {
            if var.flags.contains(SlotFlags::PROTECTED) {
                tracker.protected.insert(var.dno);
            }
            if var.flags.contains(SlotFlags::AUTO) {
                tracker.auto.insert(var.dno);
            }
        }
        for param in routine.parameters.iter() {
            if param.mode != ParamMode::In {
                tracker.out_params.insert(param.dno);
            }
        }
        tracker
    }

    /// Record one slot reference.
    pub fn record(&mut self, dno: Dno, as_write: bool) {
        if as_write {
            self.modified.insert(dno);
        } else {
            self.used.insert(dno);
        }
    }

    /// Emit the unused / never-read / unmodified-output diagnostics.
    /// Invoked once, after the full walk.
    pub fn report(
        &self,
        context: &Context,
        routine: &Routine,
        opts: &CheckerOptions,
        has_dynamic_return_query: bool,
    ) {
        for var in routine.variables.iter() {
            let is_param = routine.parameter(var.dno).is_some();
            if is_param {
                continue;
            }
            // sub-slots follow their parent's usage, not their own
            if matches!(var.kind, SlotKind::RecordField | SlotKind::ArrayElement) {
                continue;
            }
            if !var.flags.contains(SlotFlags::EXPLICIT) || var.flags.contains(SlotFlags::AUTO) {
                continue;
            }
            if self.protected.contains(var.dno) {
                continue;
            }
            let used = self.used.contains(var.dno);
            let modified = self.modified.contains(var.dno);
            if !used && !modified {
                if opts.other_warnings {
                    PlError::warning(
                        Category::Other,
                        var.location,
                        format!("unused variable \"{}\"", var.name),
                    )
                    .with_errortype("unused_variable")
                    .register(context);
                }
            } else if modified && !used && opts.extra_warnings {
                PlError::warning(
                    Category::Extra,
                    var.location,
                    format!("never read variable \"{}\"", var.name),
                )
                .with_errortype("never_read")
                .register(context);
            }
        }

        if !opts.extra_warnings {
            return;
        }

        for param in routine.parameters.iter() {
            guard!(let Some(var) = routine.variable(param.dno) else { continue });
            let used = self.used.contains(param.dno);
            let modified = self.modified.contains(param.dno);
            match param.mode {
                ParamMode::In | ParamMode::InOut => {
                    if !used && !modified {
                        PlError::warning(
                            Category::Extra,
                            var.location,
                            format!("parameter \"{}\" is never used", var.name),
                        )
                        .with_errortype("unreferenced_parameter")
                        .register(context);
                    } else if !used {
                        PlError::warning(
                            Category::Extra,
                            var.location,
                            format!("unused parameter \"{}\"", var.name),
                        )
                        .with_errortype("unused_parameter")
                        .register(context);
                    }
                }
                ParamMode::Out => {}
            }
            if param.mode != ParamMode::In && !modified {
                // modification through dynamic SQL cannot be proven
                // statically, so only hint at it in that case
                let severity = if has_dynamic_return_query {
                    Severity::Info
                } else {
                    Severity::Warning
                };
                PlError::warning(
                    Category::Extra,
                    var.location,
                    format!("unmodified OUT variable \"{}\"", var.name),
                )
                .set_severity(severity)
                .with_errortype("unmodified_out")
                .register(context);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_set_basics() {
        let mut set = SlotSet::new();
        assert!(set.is_empty());
        assert!(set.insert(3));
        assert!(!set.insert(3));
        assert!(set.insert(64));
        assert!(set.insert(130));
        assert!(set.contains(3));
        assert!(set.contains(64));
        assert!(!set.contains(4));
        assert_eq!(set.len(), 3);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![3, 64, 130]);
        assert!(set.remove(64));
        assert!(!set.remove(64));
        assert!(!set.contains(64));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn slot_set_out_of_range_queries() {
        let set = SlotSet::with_capacity(10);
        assert!(!set.contains(1000));
        let mut set = set;
        assert!(set.insert(1000));
        assert!(set.contains(1000));
    }
}
