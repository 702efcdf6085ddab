//! NAMESPACE response data (RFC 2342): the personal/other/shared triple.

/// One namespace: a mailbox path prefix and its hierarchy separator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    /// Canonicalized path prefix (no trailing separator, leading INBOX
    /// segment upper-cased).
    pub prefix: String,
    /// Hierarchy separator, or `None` for a flat namespace.
    pub separator: Option<char>,
}

impl NamespaceEntry {
    /// Builds an entry, canonicalizing the prefix: a single trailing
    /// separator is stripped, and a leading segment spelling INBOX in any
    /// case is normalized to upper case.
    #[must_use]
    pub fn new(prefix: impl Into<String>, separator: Option<char>) -> Self {
        let mut prefix: String = prefix.into();
        if let Some(sep) = separator
            && prefix.ends_with(sep)
        {
            prefix.pop();
        }
        let segment_end = separator
            .and_then(|sep| prefix.find(sep))
            .unwrap_or(prefix.len());
        if prefix[..segment_end].eq_ignore_ascii_case("INBOX") {
            prefix.replace_range(..segment_end, "INBOX");
        }
        Self { prefix, separator }
    }
}

/// The full namespace triple a server declares.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Namespaces {
    /// The user's own mailboxes.
    pub personal: Vec<NamespaceEntry>,
    /// Other users' mailboxes.
    pub other: Vec<NamespaceEntry>,
    /// Shared mailboxes.
    pub shared: Vec<NamespaceEntry>,
}

impl Namespaces {
    /// True if no namespace of any category has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.personal.is_empty() && self.other.is_empty() && self.shared.is_empty()
    }

    /// Finds the separator for a mailbox path by longest matching prefix
    /// across all three categories.
    #[must_use]
    pub fn separator_for(&self, path: &str) -> Option<char> {
        self.personal
            .iter()
            .chain(&self.other)
            .chain(&self.shared)
            .filter(|ns| path.starts_with(ns.prefix.as_str()))
            .max_by_key(|ns| ns.prefix.len())
            .and_then(|ns| ns.separator)
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
    fn strips_one_trailing_separator() {
        let ns = NamespaceEntry::new("INBOX.", Some('.'));
        assert_eq!(ns.prefix, "INBOX");
    }

    #[test]
    fn normalizes_leading_inbox_segment() {
        let ns = NamespaceEntry::new("inbox.Folders.", Some('.'));
        assert_eq!(ns.prefix, "INBOX.Folders");

        let ns = NamespaceEntry::new("Inbox", Some('/'));
        assert_eq!(ns.prefix, "INBOX");
    }

    #[test]
    fn leaves_non_inbox_prefixes_alone() {
        let ns = NamespaceEntry::new("Shared/", Some('/'));
        assert_eq!(ns.prefix, "Shared");

        let ns = NamespaceEntry::new("inboxes/", Some('/'));
        assert_eq!(ns.prefix, "inboxes");
    }

    #[test]
    fn flat_namespace_keeps_prefix() {
        let ns = NamespaceEntry::new("#news.", None);
        assert_eq!(ns.prefix, "#news.");
        assert_eq!(ns.separator, None);
    }

    #[test]
    fn separator_lookup_prefers_longest_prefix() {
        let namespaces = Namespaces {
            personal: vec![NamespaceEntry::new("", Some('/'))],
            other: vec![NamespaceEntry::new("Other/", Some('/'))],
            shared: vec![NamespaceEntry::new("Other/Deep/", Some('.'))],
        };
        assert_eq!(namespaces.separator_for("Work"), Some('/'));
        assert_eq!(namespaces.separator_for("Other/bob"), Some('/'));
        assert_eq!(namespaces.separator_for("Other/Deep/x"), Some('.'));
    }
}
