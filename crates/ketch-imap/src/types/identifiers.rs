//! Identifier newtypes used throughout the protocol.
//!
//! UIDs, UIDVALIDITY values and message sequence numbers are all nonzero
//! 32-bit integers on the wire; encoding that in the type means a zero can
//! only be produced by a parse error, not by arithmetic downstream.

use std::fmt;
use std::num::NonZeroU32;

/// A message's unique identifier within a mailbox (stable across sessions
/// while UIDVALIDITY is unchanged).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(pub NonZeroU32);

impl Uid {
    /// Creates a UID, rejecting zero.
    #[must_use]
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    /// The raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A mailbox's UIDVALIDITY value; if it changes, all cached UIDs for the
/// mailbox are invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UidValidity(pub NonZeroU32);

impl UidValidity {
    /// Creates a UIDVALIDITY, rejecting zero.
    #[must_use]
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    /// The raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for UidValidity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message's position in the mailbox, 1-based; shifts down when an
/// earlier message is expunged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SeqNum(pub NonZeroU32);

impl SeqNum {
    /// Creates a sequence number, rejecting zero.
    #[must_use]
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    /// The raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for SeqNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A command's queue-order id, assigned by the engine at queue time.
///
/// Ids increase monotonically with queue order, so "wait until mine" is a
/// comparison against the ids reported by completed iterations. Prequeued
/// commands take the id just below the current head (see the engine docs
/// for the underflow renumbering rule).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CommandId(pub u32);

impl CommandId {
    /// The raw value.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
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

    mod uid_tests {
        use super::*;

        #[test]
        fn rejects_zero() {
            assert!(Uid::new(0).is_none());
        }

        #[test]
        fn accepts_nonzero() {
            let uid = Uid::new(42).unwrap();
            assert_eq!(uid.get(), 42);
            assert_eq!(uid.to_string(), "42");
        }

        #[test]
        fn ordering_follows_value() {
            assert!(Uid::new(1).unwrap() < Uid::new(2).unwrap());
        }
    }

    mod seq_num_tests {
        use super::*;

        #[test]
        fn rejects_zero() {
            assert!(SeqNum::new(0).is_none());
        }

        #[test]
        fn display() {
            assert_eq!(SeqNum::new(7).unwrap().to_string(), "7");
        }
    }

    mod command_id_tests {
        use super::*;

        #[test]
        fn ordering_is_queue_order() {
            assert!(CommandId(1) < CommandId(2));
            assert!(CommandId(10) >= CommandId(10));
        }

        #[test]
        fn display_marks_id() {
            assert_eq!(CommandId(3).to_string(), "#3");
        }
    }
}
