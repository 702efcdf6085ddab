//! Folder handles and the LIST/STATUS decode records.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use super::{Uid, UidValidity};

/// A handle to a server-side mailbox, carried by commands that must run
/// with a particular folder selected.
///
/// The name is the server-visible, already mailbox-encoded form (modified
/// UTF-7 encoding happens in the layer that owns folder objects, not
/// here). Identity is name equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Folder {
    name: String,
    separator: Option<char>,
}

impl Folder {
    /// Creates a folder handle from a server-visible name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            separator: None,
        }
    }

    /// The INBOX folder (its name is case-insensitive per RFC 3501).
    #[must_use]
    pub fn inbox() -> Self {
        Self::new("INBOX")
    }

    /// Sets the hierarchy separator learned from LIST or NAMESPACE.
    #[must_use]
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = Some(separator);
        self
    }

    /// The server-visible encoded name.
    #[must_use]
    pub fn encoded_name(&self) -> &str {
        &self.name
    }

    /// The hierarchy separator, if known.
    #[must_use]
    pub const fn separator(&self) -> Option<char> {
        self.separator
    }

    /// True if this is the INBOX, compared case-insensitively.
    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.name.eq_ignore_ascii_case("INBOX")
    }
}

impl fmt::Display for Folder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Mailbox attributes from a LIST line, as a fixed-table bitset.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListAttrs(u32);

impl ListAttrs {
    /// No attributes.
    pub const NONE: Self = Self(0);
    /// `\Noselect`: the name cannot be selected.
    pub const NOSELECT: Self = Self(1);
    /// `\Noinferiors`: no child mailboxes can exist under the name.
    pub const NOINFERIORS: Self = Self(1 << 1);
    /// `\Marked`: the mailbox has activity of interest.
    pub const MARKED: Self = Self(1 << 2);
    /// `\Unmarked`: no activity since last select.
    pub const UNMARKED: Self = Self(1 << 3);
    /// `\HasChildren`: child mailboxes exist.
    pub const HAS_CHILDREN: Self = Self(1 << 4);
    /// `\HasNoChildren`: no child mailboxes exist.
    pub const HAS_NO_CHILDREN: Self = Self(1 << 5);

    /// Looks an attribute name up in the fixed table (case-insensitive,
    /// with the leading backslash). Unknown names return `None`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_uppercase().as_str() {
            "\\NOSELECT" => Some(Self::NOSELECT),
            "\\NOINFERIORS" => Some(Self::NOINFERIORS),
            "\\MARKED" => Some(Self::MARKED),
            "\\UNMARKED" => Some(Self::UNMARKED),
            "\\HASCHILDREN" => Some(Self::HAS_CHILDREN),
            "\\HASNOCHILDREN" => Some(Self::HAS_NO_CHILDREN),
            _ => None,
        }
    }

    /// True if every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True if no attribute is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for ListAttrs {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for ListAttrs {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for ListAttrs {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

/// One decoded LIST (or LSUB) response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Attribute bits from the fixed table; unknown names are dropped.
    pub attrs: ListAttrs,
    /// Hierarchy separator, or `None` for a flat namespace (NIL).
    pub separator: Option<char>,
    /// Server-visible mailbox name (still mailbox-encoded).
    pub name: String,
}

/// Decoded STATUS response data for one mailbox.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusSummary {
    /// Mailbox the status describes.
    pub mailbox: String,
    /// MESSAGES count.
    pub messages: Option<u32>,
    /// RECENT count.
    pub recent: Option<u32>,
    /// UIDNEXT value.
    pub uid_next: Option<Uid>,
    /// UIDVALIDITY value.
    pub uid_validity: Option<UidValidity>,
    /// UNSEEN count.
    pub unseen: Option<u32>,
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

    mod folder_tests {
        use super::*;

        #[test]
        fn inbox_is_case_insensitive() {
            assert!(Folder::new("inbox").is_inbox());
            assert!(Folder::new("InBoX").is_inbox());
            assert!(!Folder::new("INBOX/sub").is_inbox());
        }

        #[test]
        fn identity_is_name_equality() {
            assert_eq!(Folder::new("Sent"), Folder::new("Sent"));
            assert_ne!(Folder::new("Sent"), Folder::new("Drafts"));
        }

        #[test]
        fn separator_round_trip() {
            let folder = Folder::new("Work/2026").with_separator('/');
            assert_eq!(folder.separator(), Some('/'));
            assert_eq!(folder.encoded_name(), "Work/2026");
        }
    }

    mod list_attrs_tests {
        use super::*;

        #[test]
        fn fixed_table_lookup() {
            assert_eq!(
                ListAttrs::from_name("\\Noselect"),
                Some(ListAttrs::NOSELECT)
            );
            assert_eq!(
                ListAttrs::from_name("\\HASNOCHILDREN"),
                Some(ListAttrs::HAS_NO_CHILDREN)
            );
            assert_eq!(ListAttrs::from_name("\\Subscribed"), None);
        }

        #[test]
        fn accumulate_bits() {
            let mut attrs = ListAttrs::NONE;
            attrs |= ListAttrs::MARKED;
            attrs |= ListAttrs::HAS_CHILDREN;
            assert!(attrs.contains(ListAttrs::MARKED));
            assert!(!attrs.contains(ListAttrs::NOSELECT));
        }
    }
}
