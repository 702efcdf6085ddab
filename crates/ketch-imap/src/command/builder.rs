//! Command assembly.
//!
//! [`CommandSpec`] collects a verb and typed arguments, then renders the
//! wire bytes. String arguments are classified: atom-safe text goes out
//! bare, printable text that is not atom-safe goes out quoted, and
//! anything containing control bytes, 8-bit content, braces or quote
//! specials becomes a literal. Without LITERAL+ each literal terminates
//! its part right after the `{n}` header; the payload and everything
//! after it wait for a server continuation.

use crate::command::literal::LiteralPayload;
use crate::error::Result;
use crate::types::{FlagSet, Folder};

/// One contiguous sendable span of a command. `literal` is the payload
/// whose `{n}` header closes `buffer`; it goes out only after the server
/// grants a continuation.
#[derive(Debug)]
pub(crate) struct Part {
    pub(crate) buffer: Vec<u8>,
    pub(crate) literal: Option<LiteralPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Class {
    Atom,
    Quoted,
    Literal,
}

/// Strict outgoing atom class: printable 7-bit ASCII minus wildcards,
/// parens, brace, brackets and quote specials. Stricter than what the
/// lexer accepts from servers.
const fn is_atom_safe(b: u8) -> bool {
    b > b' '
        && b < 0x7F
        && !matches!(
            b,
            b'(' | b')' | b'{' | b'[' | b']' | b'%' | b'*' | b'"' | b'\\'
        )
}

/// Quotable class: printable 7-bit ASCII including space. Braces, quote
/// specials, control bytes and 8-bit content all force a literal, since
/// quoted strings are sent without escaping.
const fn is_qstring_safe(b: u8) -> bool {
    b >= b' ' && b < 0x7F && !matches!(b, b'{' | b'"' | b'\\')
}

fn classify(s: &str) -> Class {
    if !s.is_empty() && s.bytes().all(is_atom_safe) {
        Class::Atom
    } else if s.bytes().all(is_qstring_safe) {
        Class::Quoted
    } else {
        Class::Literal
    }
}

#[derive(Debug)]
enum Piece {
    Raw(String),
    Str(String),
    Number(u32),
    Signed(i64),
    Literal(LiteralPayload),
    List(Vec<String>),
}

/// A command under construction: a verb plus typed arguments, rendered to
/// wire parts when the command is queued.
#[derive(Debug)]
pub struct CommandSpec {
    verb: String,
    pieces: Vec<Piece>,
}

impl CommandSpec {
    /// Starts a command with the given verb, e.g. `SELECT` or `UID FETCH`.
    #[must_use]
    pub fn new(verb: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            pieces: Vec::new(),
        }
    }

    /// Appends caller-guaranteed-safe text verbatim, no classification.
    #[must_use]
    pub fn atom(mut self, text: impl Into<String>) -> Self {
        self.pieces.push(Piece::Raw(text.into()));
        self
    }

    /// Appends a string argument, classified as atom, quoted or literal.
    #[must_use]
    pub fn string(mut self, value: impl Into<String>) -> Self {
        self.pieces.push(Piece::Str(value.into()));
        self
    }

    /// Appends an unsigned number argument.
    #[must_use]
    pub fn number(mut self, value: u32) -> Self {
        self.pieces.push(Piece::Number(value));
        self
    }

    /// Appends a signed number argument.
    #[must_use]
    pub fn signed(mut self, value: i64) -> Self {
        self.pieces.push(Piece::Signed(value));
        self
    }

    /// Appends a folder's server-visible name, classified like a string.
    #[must_use]
    pub fn folder(mut self, folder: &Folder) -> Self {
        self.pieces.push(Piece::Str(folder.encoded_name().to_string()));
        self
    }

    /// Appends a literal payload argument.
    #[must_use]
    pub fn literal(mut self, payload: LiteralPayload) -> Self {
        self.pieces.push(Piece::Literal(payload));
        self
    }

    /// Appends each element classified independently. Elements after the
    /// first are separated by the most recent [`CommandSpec::atom`] text,
    /// so `.atom("B").strings(..)` over two elements renders
    /// `B first B second`.
    #[must_use]
    pub fn strings<I, T>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.pieces
            .push(Piece::List(values.into_iter().map(Into::into).collect()));
        self
    }

    /// The first word of the verb, used for connection-state transitions.
    #[must_use]
    pub fn leading_verb(&self) -> &str {
        self.verb.split_whitespace().next().unwrap_or(&self.verb)
    }

    pub(crate) fn verb(&self) -> &str {
        &self.verb
    }

    /// Renders the wire parts. `literal_plus` selects inline `{n+}`
    /// emission over part splitting at `{n}`.
    ///
    /// # Errors
    ///
    /// A [`LiteralPayload::Source`] may fail while being measured.
    pub(crate) fn into_parts(self, literal_plus: bool) -> Result<Vec<Part>> {
        let mut assembler = Assembler::new(self.verb, literal_plus);
        let mut last_raw = String::new();
        for piece in self.pieces {
            match piece {
                Piece::Raw(text) => {
                    assembler.space();
                    assembler.text(&text);
                    last_raw = text;
                }
                Piece::Str(value) => {
                    assembler.space();
                    assembler.classified(&value)?;
                }
                Piece::Number(n) => {
                    assembler.space();
                    assembler.text(&n.to_string());
                }
                Piece::Signed(n) => {
                    assembler.space();
                    assembler.text(&n.to_string());
                }
                Piece::Literal(payload) => {
                    assembler.space();
                    assembler.literal(payload)?;
                }
                Piece::List(values) => {
                    for (i, value) in values.iter().enumerate() {
                        if i > 0 && !last_raw.is_empty() {
                            assembler.space();
                            assembler.text(&last_raw);
                        }
                        assembler.space();
                        assembler.classified(value)?;
                    }
                }
            }
        }
        Ok(assembler.finish())
    }
}

/// Well-known command shapes.
impl CommandSpec {
    /// `CAPABILITY`
    #[must_use]
    pub fn capability() -> Self {
        Self::new("CAPABILITY")
    }

    /// `NOOP`
    #[must_use]
    pub fn noop() -> Self {
        Self::new("NOOP")
    }

    /// `LOGOUT`
    #[must_use]
    pub fn logout() -> Self {
        Self::new("LOGOUT")
    }

    /// `CLOSE`
    #[must_use]
    pub fn close() -> Self {
        Self::new("CLOSE")
    }

    /// `NAMESPACE`
    #[must_use]
    pub fn namespace() -> Self {
        Self::new("NAMESPACE")
    }

    /// `LOGIN <user> <password>`
    #[must_use]
    pub fn login(user: &str, password: &str) -> Self {
        Self::new("LOGIN").string(user).string(password)
    }

    /// `AUTHENTICATE <mechanism>`; pair with a continuation handler on
    /// the queued command for the SASL exchange.
    #[must_use]
    pub fn authenticate(mechanism: &str) -> Self {
        Self::new("AUTHENTICATE").atom(mechanism)
    }

    /// `SELECT <folder>`
    #[must_use]
    pub fn select(folder: &Folder) -> Self {
        Self::new("SELECT").folder(folder)
    }

    /// `EXAMINE <folder>`
    #[must_use]
    pub fn examine(folder: &Folder) -> Self {
        Self::new("EXAMINE").folder(folder)
    }

    /// `LIST <reference> <pattern>`
    #[must_use]
    pub fn list(reference: &str, pattern: &str) -> Self {
        Self::new("LIST").string(reference).string(pattern)
    }

    /// `STATUS <folder> (...)` over the attributes the decoder knows.
    #[must_use]
    pub fn status(folder: &Folder) -> Self {
        Self::new("STATUS")
            .folder(folder)
            .atom("(MESSAGES RECENT UIDNEXT UIDVALIDITY UNSEEN)")
    }

    /// `APPEND <folder> [(<flags>)] <message>`
    #[must_use]
    pub fn append(folder: &Folder, flags: Option<FlagSet>, message: LiteralPayload) -> Self {
        let mut spec = Self::new("APPEND").folder(folder);
        if let Some(flags) = flags
            && !flags.is_empty()
        {
            spec = spec.atom(format!("({flags})"));
        }
        spec.literal(message)
    }

    /// `FETCH <range> <items>` over sequence numbers.
    #[must_use]
    pub fn fetch(range: &str, items: &str) -> Self {
        Self::new("FETCH").atom(range).atom(items)
    }

    /// `UID FETCH <set> <items>`
    #[must_use]
    pub fn uid_fetch(set: &str, items: &str) -> Self {
        Self::new("UID FETCH").atom(set).atom(items)
    }

    /// `UID STORE <set> +FLAGS.SILENT (...)` or the `-FLAGS.SILENT` form.
    #[must_use]
    pub fn uid_store(set: &str, add: bool, flags: FlagSet) -> Self {
        let sign = if add { '+' } else { '-' };
        Self::new("UID STORE")
            .atom(set)
            .atom(format!("{sign}FLAGS.SILENT"))
            .atom(format!("({flags})"))
    }
}

struct Assembler {
    parts: Vec<Part>,
    current: Vec<u8>,
    literal_plus: bool,
}

impl Assembler {
    fn new(verb: String, literal_plus: bool) -> Self {
        Self {
            parts: Vec::new(),
            current: verb.into_bytes(),
            literal_plus,
        }
    }

    fn space(&mut self) {
        self.current.push(b' ');
    }

    fn text(&mut self, s: &str) {
        self.current.extend_from_slice(s.as_bytes());
    }

    fn classified(&mut self, value: &str) -> Result<()> {
        match classify(value) {
            Class::Atom => self.text(value),
            Class::Quoted => {
                self.current.push(b'"');
                self.text(value);
                self.current.push(b'"');
            }
            Class::Literal => self.literal(LiteralPayload::Text(value.to_string()))?,
        }
        Ok(())
    }

    fn literal(&mut self, payload: LiteralPayload) -> Result<()> {
        let len = payload.wire_len()?;
        if self.literal_plus {
            self.text(&format!("{{{len}+}}\r\n"));
            payload.write_wire(&mut self.current)?;
        } else {
            self.text(&format!("{{{len}}}\r\n"));
            let buffer = std::mem::take(&mut self.current);
            self.parts.push(Part {
                buffer,
                literal: Some(payload),
            });
        }
        Ok(())
    }

    fn finish(self) -> Vec<Part> {
        let Self {
            mut parts,
            mut current,
            ..
        } = self;
        current.extend_from_slice(b"\r\n");
        parts.push(Part {
            buffer: current,
            literal: None,
        });
        parts
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

    fn single_part(spec: CommandSpec, literal_plus: bool) -> String {
        let mut parts = spec.into_parts(literal_plus).unwrap();
        assert_eq!(parts.len(), 1, "expected an unsplit command");
        String::from_utf8(parts.remove(0).buffer).unwrap()
    }

    mod classification {
        use super::*;

        #[test]
        fn atom_safe_text_goes_out_bare() {
            assert_eq!(
                single_part(CommandSpec::login("user", "pass"), false),
                "LOGIN user pass\r\n"
            );
        }

        #[test]
        fn spaces_and_parens_get_quoted() {
            assert_eq!(
                single_part(CommandSpec::new("X").string("Sent Items"), false),
                "X \"Sent Items\"\r\n"
            );
            assert_eq!(
                single_part(CommandSpec::new("X").string("a(b)"), false),
                "X \"a(b)\"\r\n"
            );
        }

        #[test]
        fn empty_string_is_quoted() {
            assert_eq!(
                single_part(CommandSpec::list("", "%"), false),
                "LIST \"\" \"%\"\r\n"
            );
        }

        #[test]
        fn quote_specials_force_a_literal() {
            let parts = CommandSpec::new("X")
                .string("say \"hi\"")
                .into_parts(false)
                .unwrap();
            assert_eq!(parts.len(), 2);
            assert_eq!(parts[0].buffer, b"X {8}\r\n");
            assert!(parts[0].literal.is_some());
        }

        #[test]
        fn braces_force_a_literal() {
            let parts = CommandSpec::new("X")
                .string("pass{word")
                .into_parts(false)
                .unwrap();
            assert_eq!(parts.len(), 2);
            assert_eq!(parts[0].buffer, b"X {9}\r\n");
        }

        #[test]
        fn control_bytes_force_a_literal() {
            let parts = CommandSpec::new("X")
                .string("a\tb")
                .into_parts(false)
                .unwrap();
            assert_eq!(parts[0].buffer, b"X {3}\r\n");
        }

        #[test]
        fn non_ascii_forces_a_literal() {
            let parts = CommandSpec::new("X")
                .string("héllo")
                .into_parts(false)
                .unwrap();
            assert_eq!(parts[0].buffer, b"X {6}\r\n");
        }
    }

    mod literal_emission {
        use super::*;

        #[test]
        fn literal_plus_stays_inline() {
            assert_eq!(
                single_part(CommandSpec::new("X").string("say \"hi\""), true),
                "X {8+}\r\nsay \"hi\"\r\n"
            );
        }

        #[test]
        fn append_without_literal_plus_splits_into_two_parts() {
            let body = b"ab\r\n".repeat(1250);
            let folder = Folder::new("saved-messages");
            let spec = CommandSpec::append(&folder, None, LiteralPayload::Data(body));
            let parts = spec.into_parts(false).unwrap();
            assert_eq!(parts.len(), 2);
            assert_eq!(parts[0].buffer, b"APPEND saved-messages {5000}\r\n");
            assert_eq!(parts[1].buffer, b"\r\n");
            let payload = parts[0].literal.as_ref().unwrap();
            assert_eq!(payload.wire_len().unwrap(), 5000);
        }

        #[test]
        fn append_includes_flag_list() {
            let folder = Folder::new("INBOX");
            let flags = FlagSet::SEEN | FlagSet::DRAFT;
            let spec = CommandSpec::append(
                &folder,
                Some(flags),
                LiteralPayload::Text("body".to_string()),
            );
            let parts = spec.into_parts(true).unwrap();
            assert_eq!(
                String::from_utf8(parts[0].buffer.clone()).unwrap(),
                "APPEND INBOX (\\Seen \\Draft) {4+}\r\nbody\r\n"
            );
        }

        #[test]
        fn trailing_text_after_a_literal_opens_a_new_part() {
            let spec = CommandSpec::new("X")
                .literal(LiteralPayload::Text("one".to_string()))
                .atom("tail");
            let parts = spec.into_parts(false).unwrap();
            assert_eq!(parts.len(), 2);
            assert_eq!(parts[0].buffer, b"X {3}\r\n");
            assert_eq!(parts[1].buffer, b" tail\r\n");
        }
    }

    mod vectors {
        use super::*;

        #[test]
        fn elements_join_on_the_preceding_atom() {
            let spec = CommandSpec::new("X")
                .atom("A")
                .atom("B")
                .strings(["first", "second"]);
            assert_eq!(single_part(spec, false), "X A B first B second\r\n");
        }

        #[test]
        fn without_a_preceding_atom_elements_are_space_joined() {
            let spec = CommandSpec::new("SEARCH").strings(["FLAGGED", "UNSEEN"]);
            assert_eq!(single_part(spec, false), "SEARCH FLAGGED UNSEEN\r\n");
        }

        #[test]
        fn each_element_is_classified_independently() {
            let spec = CommandSpec::new("X").strings(["bare", "two words"]);
            assert_eq!(single_part(spec, false), "X bare \"two words\"\r\n");
        }
    }

    mod shapes {
        use super::*;

        #[test]
        fn select_quotes_folders_with_spaces() {
            let folder = Folder::new("Sent Items");
            assert_eq!(
                single_part(CommandSpec::select(&folder), false),
                "SELECT \"Sent Items\"\r\n"
            );
        }

        #[test]
        fn status_carries_the_fixed_attribute_list() {
            let folder = Folder::new("INBOX");
            assert_eq!(
                single_part(CommandSpec::status(&folder), false),
                "STATUS INBOX (MESSAGES RECENT UIDNEXT UIDVALIDITY UNSEEN)\r\n"
            );
        }

        #[test]
        fn uid_store_renders_sign_and_flags() {
            let spec = CommandSpec::uid_store("1:3,7", true, FlagSet::DELETED);
            assert_eq!(
                single_part(spec, false),
                "UID STORE 1:3,7 +FLAGS.SILENT (\\Deleted)\r\n"
            );
        }

        #[test]
        fn numbers_render_bare() {
            let spec = CommandSpec::new("X").number(42).signed(-7);
            assert_eq!(single_part(spec, false), "X 42 -7\r\n");
        }

        #[test]
        fn leading_verb_is_the_first_word() {
            assert_eq!(CommandSpec::uid_fetch("1:*", "(FLAGS)").leading_verb(), "UID");
            assert_eq!(CommandSpec::select(&Folder::new("INBOX")).leading_verb(), "SELECT");
        }
    }
}
