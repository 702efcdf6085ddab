//! Server capability tracking: the capability bitset, protocol level and
//! advertised AUTH mechanisms.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Capability bits recognized by the engine, from a fixed name table.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Caps(u32);

impl Caps {
    /// No capabilities.
    pub const NONE: Self = Self(0);
    /// `IMAP4` (RFC 1730 era).
    pub const IMAP4: Self = Self(1);
    /// `IMAP4rev1` (RFC 3501).
    pub const IMAP4REV1: Self = Self(1 << 1);
    /// STATUS command support; implied by `IMAP4rev1`.
    pub const STATUS: Self = Self(1 << 2);
    /// `NAMESPACE` (RFC 2342).
    pub const NAMESPACE: Self = Self(1 << 3);
    /// `LITERAL+` non-synchronizing literals (RFC 7888).
    pub const LITERAL_PLUS: Self = Self(1 << 4);
    /// `UIDPLUS` (RFC 4315); enables APPENDUID/COPYUID codes.
    pub const UIDPLUS: Self = Self(1 << 5);
    /// `STARTTLS` offer.
    pub const STARTTLS: Self = Self(1 << 6);
    /// `LOGINDISABLED`: plain LOGIN is refused until TLS.
    pub const LOGINDISABLED: Self = Self(1 << 7);
    /// Session-local assumption that SEARCH accepts a UTF-8 charset;
    /// cleared when the server answers with BADCHARSET.
    pub const SEARCH_UTF8: Self = Self(1 << 8);

    /// True if no bit is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True if every bit of `other` is set here.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Caps {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Caps {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Caps {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for Caps {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

/// Protocol level advertised by the server.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolLevel {
    /// No capability response seen yet.
    #[default]
    Unknown,
    /// Plain `IMAP4`.
    Imap4,
    /// `IMAP4rev1`.
    Imap4Rev1,
}

impl fmt::Display for ProtocolLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Imap4 => write!(f, "IMAP4"),
            Self::Imap4Rev1 => write!(f, "IMAP4rev1"),
        }
    }
}

/// The engine's view of everything a CAPABILITY response declares.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Capabilities {
    set: Caps,
    level: ProtocolLevel,
    auth: Vec<String>,
}

impl Capabilities {
    /// Fresh session state: nothing advertised yet, UTF-8 search assumed
    /// until a server rejects it.
    #[must_use]
    pub fn for_session() -> Self {
        Self {
            set: Caps::SEARCH_UTF8,
            level: ProtocolLevel::Unknown,
            auth: Vec::new(),
        }
    }

    /// Clears everything back to the fresh-session state; a CAPABILITY
    /// response replaces, never extends, the previous set.
    pub fn reset(&mut self) {
        *self = Self::for_session();
    }

    /// Applies one capability name from a CAPABILITY response. Returns
    /// false for names outside the fixed table (callers may log them).
    pub fn apply(&mut self, name: &str) -> bool {
        let upper = name.to_uppercase();
        match upper.as_str() {
            "IMAP4" => {
                self.set |= Caps::IMAP4;
                if self.level == ProtocolLevel::Unknown {
                    self.level = ProtocolLevel::Imap4;
                }
                true
            }
            "IMAP4REV1" => {
                // IMAP4rev1 folds STATUS into the base protocol.
                self.set |= Caps::IMAP4REV1 | Caps::STATUS;
                self.level = ProtocolLevel::Imap4Rev1;
                true
            }
            "STATUS" => {
                self.set |= Caps::STATUS;
                true
            }
            "NAMESPACE" => {
                self.set |= Caps::NAMESPACE;
                true
            }
            "LITERAL+" => {
                self.set |= Caps::LITERAL_PLUS;
                true
            }
            "UIDPLUS" => {
                self.set |= Caps::UIDPLUS;
                true
            }
            "STARTTLS" => {
                self.set |= Caps::STARTTLS;
                true
            }
            "LOGINDISABLED" => {
                self.set |= Caps::LOGINDISABLED;
                true
            }
            _ => {
                if let Some(mech) = upper.strip_prefix("AUTH=") {
                    if !self.auth.iter().any(|m| m == mech) {
                        self.auth.push(mech.to_string());
                    }
                    true
                } else {
                    false
                }
            }
        }
    }

    /// True if all the given bits are advertised.
    #[must_use]
    pub const fn has(&self, caps: Caps) -> bool {
        self.set.contains(caps)
    }

    /// Clears the given bits in place (e.g. SEARCH_UTF8 on BADCHARSET).
    pub fn clear(&mut self, caps: Caps) {
        self.set = self.set & !caps;
    }

    /// The advertised protocol level.
    #[must_use]
    pub const fn level(&self) -> ProtocolLevel {
        self.level
    }

    /// AUTH mechanisms in advertisement order, upper-cased.
    #[must_use]
    pub fn auth_mechanisms(&self) -> &[String] {
        &self.auth
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
    fn rev1_implies_status_and_level() {
        let mut caps = Capabilities::for_session();
        assert!(caps.apply("IMAP4rev1"));
        assert!(caps.has(Caps::IMAP4REV1));
        assert!(caps.has(Caps::STATUS));
        assert_eq!(caps.level(), ProtocolLevel::Imap4Rev1);
    }

    #[test]
    fn imap4_does_not_downgrade_rev1() {
        let mut caps = Capabilities::for_session();
        caps.apply("IMAP4rev1");
        caps.apply("IMAP4");
        assert_eq!(caps.level(), ProtocolLevel::Imap4Rev1);
    }

    #[test]
    fn auth_mechanisms_collected_once() {
        let mut caps = Capabilities::for_session();
        assert!(caps.apply("AUTH=PLAIN"));
        assert!(caps.apply("auth=plain"));
        assert!(caps.apply("AUTH=CRAM-MD5"));
        assert_eq!(caps.auth_mechanisms(), &["PLAIN", "CRAM-MD5"]);
    }

    #[test]
    fn unknown_names_are_reported() {
        let mut caps = Capabilities::for_session();
        assert!(!caps.apply("X-GM-EXT-1"));
        assert!(!caps.has(Caps::IMAP4REV1));
    }

    #[test]
    fn reset_restores_utf8_search_assumption() {
        let mut caps = Capabilities::for_session();
        caps.apply("LITERAL+");
        caps.clear(Caps::SEARCH_UTF8);
        caps.reset();
        assert!(!caps.has(Caps::LITERAL_PLUS));
        assert!(caps.has(Caps::SEARCH_UTF8));
    }

    #[test]
    fn literal_plus_case_insensitive() {
        let mut caps = Capabilities::for_session();
        assert!(caps.apply("literal+"));
        assert!(caps.has(Caps::LITERAL_PLUS));
    }
}
