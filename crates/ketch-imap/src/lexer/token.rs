//! Token types produced by the streaming lexer.

use std::fmt;

/// One lexical token of the IMAP4 response grammar.
///
/// Tokens own their data: the stream's internal buffer is compacted and
/// refilled between reads, so borrowed tokens could not outlive a single
/// call. Inter-token spaces and bare carriage returns are consumed by the
/// lexer and never surfaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Clean end of data: zero-byte read with the buffer fully consumed.
    Eof,
    /// The special `NIL` atom.
    Nil,
    /// A bare atom, e.g. `OK`, `FETCH`, `12:40`, `LITERAL+`.
    Atom(String),
    /// A quoted string with escapes resolved.
    Quoted(String),
    /// A literal header `{n}` or `{n+}`; the payload follows in literal
    /// mode.
    LiteralSize(u32),
    /// A backslash-prefixed flag atom, e.g. `\Seen`, or the bare `\*`.
    Flag(String),
    /// An unsigned decimal number. A digit run that continues with other
    /// atom characters (e.g. `12:40`) is an [`Token::Atom`] instead.
    Number(u32),
    /// A lone `+` (continuation request marker).
    Plus,
    /// `*` (untagged response marker, also the wildcard).
    Asterisk,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// End of line (`\n`, with any preceding `\r` consumed).
    Crlf,
}

impl Token {
    /// True for the tokens that terminate a response line.
    #[must_use]
    pub const fn is_line_end(&self) -> bool {
        matches!(self, Self::Crlf | Self::Eof)
    }

    /// The atom text, if this token is a bare atom.
    #[must_use]
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Self::Atom(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    /// Renders the token for diagnostics, close to its wire form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eof => write!(f, "<end of data>"),
            Self::Nil => write!(f, "NIL"),
            Self::Atom(s) => write!(f, "{s}"),
            Self::Quoted(s) => write!(f, "\"{s}\""),
            Self::LiteralSize(n) => write!(f, "{{{n}}}"),
            Self::Flag(s) => write!(f, "{s}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Plus => write!(f, "+"),
            Self::Asterisk => write!(f, "*"),
            Self::LParen => write!(f, "("),
            Self::RParen => write!(f, ")"),
            Self::LBracket => write!(f, "["),
            Self::RBracket => write!(f, "]"),
            Self::Crlf => write!(f, "<end of line>"),
        }
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
    fn line_end_tokens() {
        assert!(Token::Crlf.is_line_end());
        assert!(Token::Eof.is_line_end());
        assert!(!Token::Plus.is_line_end());
    }

    #[test]
    fn display_renders_wire_form() {
        assert_eq!(Token::Atom("FETCH".to_string()).to_string(), "FETCH");
        assert_eq!(Token::Quoted("a b".to_string()).to_string(), "\"a b\"");
        assert_eq!(Token::LiteralSize(310).to_string(), "{310}");
        assert_eq!(Token::Flag("\\Seen".to_string()).to_string(), "\\Seen");
    }

    #[test]
    fn as_atom_only_for_atoms() {
        assert_eq!(Token::Atom("OK".to_string()).as_atom(), Some("OK"));
        assert_eq!(Token::Number(3).as_atom(), None);
        assert_eq!(Token::Nil.as_atom(), None);
    }
}
