//! Command tag allocation.

use std::sync::atomic::{AtomicUsize, Ordering};

const PREFIXES: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";

static NEXT_PREFIX: AtomicUsize = AtomicUsize::new(0);

/// Allocates the per-connection command tags: one uppercase prefix letter
/// plus a zero-padded counter, e.g. `A00001`.
#[derive(Debug)]
pub(crate) struct TagSequencer {
    prefix: char,
    counter: u32,
}

impl TagSequencer {
    /// Rotates prefixes A through Z across instances, so tags from two
    /// live connections in one process never collide.
    pub(crate) fn rotating() -> Self {
        let slot = NEXT_PREFIX.fetch_add(1, Ordering::Relaxed) % PREFIXES.len();
        Self::with_prefix(char::from(PREFIXES[slot]))
    }

    /// Uses a fixed prefix. Tags are deterministic, which scripted tests
    /// rely on.
    pub(crate) const fn with_prefix(prefix: char) -> Self {
        Self { prefix, counter: 0 }
    }

    /// Allocates the next tag for this connection.
    pub(crate) fn allocate(&mut self) -> String {
        self.counter = self.counter.wrapping_add(1);
        format!("{}{:05}", self.prefix, self.counter)
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

    #[test]
    fn tags_are_zero_padded_and_sequential() {
        let mut tags = TagSequencer::with_prefix('A');
        assert_eq!(tags.allocate(), "A00001");
        assert_eq!(tags.allocate(), "A00002");
        assert_eq!(tags.allocate(), "A00003");
    }

    #[test]
    fn fixed_prefix_is_respected() {
        let mut tags = TagSequencer::with_prefix('Q');
        assert_eq!(tags.allocate(), "Q00001");
    }

    #[test]
    fn rotating_instances_get_distinct_prefixes() {
        let mut a = TagSequencer::rotating();
        let mut b = TagSequencer::rotating();
        let tag_a = a.allocate();
        let tag_b = b.allocate();
        assert_ne!(tag_a.chars().next(), tag_b.chars().next());
        assert!(tag_a.chars().next().unwrap().is_ascii_uppercase());
    }
}
