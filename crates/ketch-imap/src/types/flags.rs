//! Message flags as a bitmask, plus the diff/merge algebra used for
//! three-way flag reconciliation.
//!
//! Flags are kept as bits rather than a list because reconciliation is
//! pure set algebra: a [`FlagDiff`] captures which bits changed between
//! two snapshots and what their new values are, and can be replayed onto
//! a third snapshot without losing either side's edits.

use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, Not};

/// A set of IMAP system flags, stored as a bitmask.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlagSet(u32);

impl FlagSet {
    /// The empty flag set.
    pub const EMPTY: Self = Self(0);
    /// `\Seen`
    pub const SEEN: Self = Self(1);
    /// `\Answered`
    pub const ANSWERED: Self = Self(1 << 1);
    /// `\Flagged`
    pub const FLAGGED: Self = Self(1 << 2);
    /// `\Deleted`
    pub const DELETED: Self = Self(1 << 3);
    /// `\Draft`
    pub const DRAFT: Self = Self(1 << 4);
    /// `\Recent` (session-only; servers never allow storing it)
    pub const RECENT: Self = Self(1 << 5);

    /// All flags a client may ask the server to store.
    pub const STORABLE: Self = Self(
        Self::SEEN.0 | Self::ANSWERED.0 | Self::FLAGGED.0 | Self::DELETED.0 | Self::DRAFT.0,
    );

    const NAMES: [(Self, &'static str); 6] = [
        (Self::SEEN, "\\Seen"),
        (Self::ANSWERED, "\\Answered"),
        (Self::FLAGGED, "\\Flagged"),
        (Self::DELETED, "\\Deleted"),
        (Self::DRAFT, "\\Draft"),
        (Self::RECENT, "\\Recent"),
    ];

    /// Looks up a flag by its wire name (case-insensitive, with the
    /// leading backslash). Keyword flags and `\*` return `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let upper = name.to_uppercase();
        match upper.as_str() {
            "\\SEEN" => Some(Self::SEEN),
            "\\ANSWERED" => Some(Self::ANSWERED),
            "\\FLAGGED" => Some(Self::FLAGGED),
            "\\DELETED" => Some(Self::DELETED),
            "\\DRAFT" => Some(Self::DRAFT),
            "\\RECENT" => Some(Self::RECENT),
            _ => None,
        }
    }

    /// True if no flag bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is also set here.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets the given flag bits.
    pub const fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clears the given flag bits.
    pub const fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// The wire names of the set bits, in canonical order.
    pub fn names(self) -> impl Iterator<Item = &'static str> {
        Self::NAMES
            .into_iter()
            .filter(move |(bit, _)| self.contains(*bit))
            .map(|(_, name)| name)
    }

    /// Raw bit value, for callers that persist flag snapshots.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Rebuilds a set from a persisted bit value, dropping unknown bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits & (Self::STORABLE.0 | Self::RECENT.0))
    }
}

impl BitOr for FlagSet {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FlagSet {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FlagSet {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitAndAssign for FlagSet {
    fn bitand_assign(&mut self, rhs: Self) {
        self.0 &= rhs.0;
    }
}

impl BitXor for FlagSet {
    type Output = Self;
    fn bitxor(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl Not for FlagSet {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl fmt::Display for FlagSet {
    /// Renders as a space-separated wire list, e.g. `\Seen \Deleted`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for name in self.names() {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(name)?;
            first = false;
        }
        Ok(())
    }
}

/// The difference between two flag snapshots: which bits changed, and
/// what the changed bits became.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlagDiff {
    /// Bits whose value differs between the two snapshots.
    pub changed: FlagSet,
    /// New values of the changed bits (subset of `changed`).
    pub bits: FlagSet,
}

impl FlagDiff {
    /// Computes the diff that turns `old` into `new`.
    #[must_use]
    pub fn between(old: FlagSet, new: FlagSet) -> Self {
        let changed = old ^ new;
        Self {
            changed,
            bits: new & changed,
        }
    }

    /// Replays this diff onto `flags`: untouched bits keep their value in
    /// `flags`, changed bits take their recorded new value.
    #[must_use]
    pub fn apply(self, flags: FlagSet) -> FlagSet {
        (flags & !self.changed) | self.bits
    }

    /// Restricts the diff to flags the server allows storing, dropping
    /// changes to anything outside `permitted`.
    #[must_use]
    pub fn restrict(self, permitted: FlagSet) -> Self {
        Self {
            changed: self.changed & permitted,
            bits: self.bits & permitted,
        }
    }

    /// True if the diff changes nothing.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.changed.is_empty()
    }

    /// The changed bits that were turned on (candidates for `+FLAGS`).
    #[must_use]
    pub fn added(self) -> FlagSet {
        self.bits
    }

    /// The changed bits that were turned off (candidates for `-FLAGS`).
    #[must_use]
    pub fn removed(self) -> FlagSet {
        self.changed & !self.bits
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_flags() -> impl Strategy<Value = FlagSet> {
        (0u32..64).prop_map(FlagSet::from_bits)
    }

    mod flag_set_tests {
        use super::*;

        #[test]
        fn from_name_known_flags() {
            assert_eq!(FlagSet::from_name("\\Seen"), Some(FlagSet::SEEN));
            assert_eq!(FlagSet::from_name("\\SEEN"), Some(FlagSet::SEEN));
            assert_eq!(FlagSet::from_name("\\deleted"), Some(FlagSet::DELETED));
            assert_eq!(FlagSet::from_name("\\Recent"), Some(FlagSet::RECENT));
        }

        #[test]
        fn from_name_rejects_keywords_and_wildcard() {
            assert_eq!(FlagSet::from_name("$Important"), None);
            assert_eq!(FlagSet::from_name("\\*"), None);
        }

        #[test]
        fn display_canonical_order() {
            let flags = FlagSet::DELETED | FlagSet::SEEN;
            assert_eq!(flags.to_string(), "\\Seen \\Deleted");
            assert_eq!(FlagSet::EMPTY.to_string(), "");
        }

        #[test]
        fn insert_remove_contains() {
            let mut flags = FlagSet::EMPTY;
            flags.insert(FlagSet::SEEN | FlagSet::FLAGGED);
            assert!(flags.contains(FlagSet::SEEN));
            assert!(flags.contains(FlagSet::FLAGGED));
            flags.remove(FlagSet::SEEN);
            assert!(!flags.contains(FlagSet::SEEN));
            assert!(flags.contains(FlagSet::FLAGGED));
        }

        #[test]
        fn storable_excludes_recent() {
            assert!(!FlagSet::STORABLE.contains(FlagSet::RECENT));
            assert!(FlagSet::STORABLE.contains(FlagSet::DRAFT));
        }

        #[test]
        fn from_bits_masks_unknown() {
            let set = FlagSet::from_bits(u32::MAX);
            assert_eq!(set, FlagSet::STORABLE | FlagSet::RECENT);
        }
    }

    mod flag_diff_tests {
        use super::*;

        #[test]
        fn diff_captures_both_directions() {
            let old = FlagSet::SEEN | FlagSet::DELETED;
            let new = FlagSet::SEEN | FlagSet::FLAGGED;
            let diff = FlagDiff::between(old, new);
            assert_eq!(diff.changed, FlagSet::DELETED | FlagSet::FLAGGED);
            assert_eq!(diff.added(), FlagSet::FLAGGED);
            assert_eq!(diff.removed(), FlagSet::DELETED);
        }

        #[test]
        fn apply_reconstructs_new_from_old() {
            let old = FlagSet::ANSWERED;
            let new = FlagSet::SEEN | FlagSet::ANSWERED | FlagSet::DRAFT;
            let diff = FlagDiff::between(old, new);
            assert_eq!(diff.apply(old), new);
        }

        #[test]
        fn apply_preserves_unrelated_edits() {
            // Local edit turned on \Flagged; another client turned on \Seen.
            // Replaying the local diff onto the fresh server snapshot must
            // keep both.
            let server_before = FlagSet::EMPTY;
            let local = FlagSet::FLAGGED;
            let server_now = FlagSet::SEEN;
            let diff = FlagDiff::between(server_before, local);
            assert_eq!(diff.apply(server_now), FlagSet::SEEN | FlagSet::FLAGGED);
        }

        #[test]
        fn restrict_drops_unpermitted_changes() {
            let diff = FlagDiff::between(FlagSet::EMPTY, FlagSet::SEEN | FlagSet::RECENT);
            let restricted = diff.restrict(FlagSet::STORABLE);
            assert_eq!(restricted.changed, FlagSet::SEEN);
            assert_eq!(restricted.bits, FlagSet::SEEN);
        }

        #[test]
        fn identity_diff_is_empty() {
            let set = FlagSet::SEEN | FlagSet::DRAFT;
            assert!(FlagDiff::between(set, set).is_empty());
        }

        proptest! {
            #[test]
            fn self_diff_is_identity(a in arb_flags(), x in arb_flags()) {
                prop_assert_eq!(FlagDiff::between(a, a).apply(x), x);
            }

            #[test]
            fn diff_then_apply_round_trips(a in arb_flags(), b in arb_flags()) {
                prop_assert_eq!(FlagDiff::between(a, b).apply(a), b);
            }

            #[test]
            fn apply_is_idempotent(a in arb_flags(), b in arb_flags(), x in arb_flags()) {
                let diff = FlagDiff::between(a, b);
                prop_assert_eq!(diff.apply(diff.apply(x)), diff.apply(x));
            }
        }
    }
}
