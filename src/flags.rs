//! Validation Flags
//!
//! The eleven boolean status flags every validatable node carries, and the
//! fixed AND/OR reduction a scope applies to summarize its members.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a flag is folded across a scope's candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Logical AND; an empty set yields `true`.
    Every,
    /// Logical OR; an empty set yields `false`.
    Some,
}

impl Strategy {
    /// Value of the fold over zero candidates.
    pub fn identity(&self) -> bool {
        match self {
            Strategy::Every => true,
            Strategy::Some => false,
        }
    }

    pub fn combine(&self, acc: bool, value: bool) -> bool {
        match self {
            Strategy::Every => acc && value,
            Strategy::Some => acc || value,
        }
    }
}

/// Names of the eleven flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagName {
    Pristine,
    Dirty,
    Touched,
    Untouched,
    Valid,
    Invalid,
    Pending,
    Validated,
    Changed,
    Passed,
    Failed,
}

impl FlagName {
    pub const ALL: [FlagName; 11] = [
        FlagName::Pristine,
        FlagName::Dirty,
        FlagName::Touched,
        FlagName::Untouched,
        FlagName::Valid,
        FlagName::Invalid,
        FlagName::Pending,
        FlagName::Validated,
        FlagName::Changed,
        FlagName::Passed,
        FlagName::Failed,
    ];

    /// The reduction a scope applies to this flag. Not configurable.
    pub fn strategy(&self) -> Strategy {
        match self {
            FlagName::Pristine
            | FlagName::Untouched
            | FlagName::Valid
            | FlagName::Validated
            | FlagName::Passed => Strategy::Every,
            FlagName::Dirty
            | FlagName::Touched
            | FlagName::Invalid
            | FlagName::Pending
            | FlagName::Changed
            | FlagName::Failed => Strategy::Some,
        }
    }
}

impl std::fmt::Display for FlagName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FlagName::Pristine => "pristine",
            FlagName::Dirty => "dirty",
            FlagName::Touched => "touched",
            FlagName::Untouched => "untouched",
            FlagName::Valid => "valid",
            FlagName::Invalid => "invalid",
            FlagName::Pending => "pending",
            FlagName::Validated => "validated",
            FlagName::Changed => "changed",
            FlagName::Passed => "passed",
            FlagName::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// The eleven status flags of a field or a whole scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flags {
    pub pristine: bool,
    pub dirty: bool,
    pub touched: bool,
    pub untouched: bool,
    pub valid: bool,
    pub invalid: bool,
    pub pending: bool,
    pub validated: bool,
    pub changed: bool,
    pub passed: bool,
    pub failed: bool,
}

impl Flags {
    /// Flags of a freshly created field: untouched and pristine, nothing else.
    pub fn field_default() -> Self {
        Self {
            pristine: true,
            dirty: false,
            touched: false,
            untouched: true,
            valid: false,
            invalid: false,
            pending: false,
            validated: false,
            changed: false,
            passed: false,
            failed: false,
        }
    }

    /// Aggregate over an empty membership.
    pub fn identity() -> Self {
        let mut flags = Self::field_default();
        for name in FlagName::ALL {
            flags.set(name, name.strategy().identity());
        }
        flags
    }

    pub fn get(&self, name: FlagName) -> bool {
        match name {
            FlagName::Pristine => self.pristine,
            FlagName::Dirty => self.dirty,
            FlagName::Touched => self.touched,
            FlagName::Untouched => self.untouched,
            FlagName::Valid => self.valid,
            FlagName::Invalid => self.invalid,
            FlagName::Pending => self.pending,
            FlagName::Validated => self.validated,
            FlagName::Changed => self.changed,
            FlagName::Passed => self.passed,
            FlagName::Failed => self.failed,
        }
    }

    pub fn set(&mut self, name: FlagName, value: bool) {
        let slot = match name {
            FlagName::Pristine => &mut self.pristine,
            FlagName::Dirty => &mut self.dirty,
            FlagName::Touched => &mut self.touched,
            FlagName::Untouched => &mut self.untouched,
            FlagName::Valid => &mut self.valid,
            FlagName::Invalid => &mut self.invalid,
            FlagName::Pending => &mut self.pending,
            FlagName::Validated => &mut self.validated,
            FlagName::Changed => &mut self.changed,
            FlagName::Passed => &mut self.passed,
            FlagName::Failed => &mut self.failed,
        };
        *slot = value;
    }

    /// Overwrite only the flags named in `patch`.
    pub fn apply(&mut self, patch: &FlagPatch) {
        for (name, value) in patch.iter() {
            self.set(name, value);
        }
    }

    /// Fold each flag across `members` with its own strategy.
    pub fn reduce<'a, I>(members: I) -> Self
    where
        I: IntoIterator<Item = &'a Flags>,
    {
        members.into_iter().fold(Self::identity(), |mut acc, member| {
            for name in FlagName::ALL {
                let folded = name.strategy().combine(acc.get(name), member.get(name));
                acc.set(name, folded);
            }
            acc
        })
    }
}

impl Default for Flags {
    fn default() -> Self {
        Self::field_default()
    }
}

/// A partial flag update, as accepted by `set_flags`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagPatch(BTreeMap<FlagName, bool>);

impl FlagPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: FlagName, value: bool) -> Self {
        self.0.insert(name, value);
        self
    }

    /// A patch naming all eleven flags, i.e. a full replacement.
    pub fn full(flags: &Flags) -> Self {
        Self(FlagName::ALL.iter().map(|&n| (n, flags.get(n))).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = (FlagName, bool)> + '_ {
        self.0.iter().map(|(&n, &v)| (n, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_table() {
        let every: Vec<_> = FlagName::ALL
            .iter()
            .filter(|n| n.strategy() == Strategy::Every)
            .map(|n| n.to_string())
            .collect();
        assert_eq!(every, vec!["pristine", "untouched", "valid", "validated", "passed"]);
    }

    #[test]
    fn test_reduce_empty_is_identity() {
        let flags = Flags::reduce(std::iter::empty());
        assert!(flags.valid && flags.pristine && flags.untouched && flags.validated && flags.passed);
        assert!(!flags.invalid && !flags.dirty && !flags.touched && !flags.pending && !flags.changed && !flags.failed);
    }

    #[test]
    fn test_reduce_mixed_members() {
        let mut a = Flags::field_default();
        a.valid = true;
        let mut b = Flags::field_default();
        b.invalid = true;
        b.touched = true;
        b.untouched = false;

        let agg = Flags::reduce([&a, &b]);
        assert!(!agg.valid);
        assert!(agg.invalid);
        assert!(agg.touched);
        assert!(!agg.untouched);
        assert!(agg.pristine);
    }

    #[test]
    fn test_patch_overwrites_named_flags_only() {
        let mut flags = Flags::field_default();
        flags.apply(&FlagPatch::new().with(FlagName::Touched, true).with(FlagName::Untouched, false));
        assert!(flags.touched);
        assert!(!flags.untouched);
        assert!(flags.pristine);
    }

    #[test]
    fn test_full_patch_replaces_everything() {
        let mut source = Flags::identity();
        source.dirty = true;
        let mut target = Flags::field_default();
        target.apply(&FlagPatch::full(&source));
        assert_eq!(target, source);
    }
}
