//! Streaming lexer over an IMAP connection.
//!
//! [`TokenStream`] owns the duplex stream and hands out owned [`Token`]s
//! one at a time. Incoming bytes accumulate in an internal buffer; a token
//! is only produced once it is complete in the buffer, so a read that ends
//! mid-token is abandoned and re-lexed from the token's first byte after
//! the next refill. Consumed prefixes are compacted away lazily and
//! unconsumed bytes are never dropped.
//!
//! After a literal header `{n}` the stream switches to literal mode:
//! exactly `n` raw bytes pass through [`TokenStream::read_literal_chunk`]
//! untokenized before token reads resume. The header's terminating CRLF
//! belongs to the header token.
//!
//! A single pushback slot ([`TokenStream::unget`]) lets a parser undo one
//! read when it dispatched on a token that belongs to its caller.

mod token;

pub use token::Token;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{Error, Result};

/// Reserve hint for each refill.
const READ_CHUNK: usize = 8 * 1024;

/// Consumed prefix length beyond which the buffer is compacted.
const COMPACT_THRESHOLD: usize = 4 * 1024;

/// Upper bound on a single response line in [`TokenStream::read_line`].
const MAX_LINE: usize = 64 * 1024;

/// A streaming IMAP lexer wrapping a duplex byte stream.
///
/// Reads are tokenized; writes pass through unchanged so command bytes and
/// literal payloads can be sent over the same connection.
#[derive(Debug)]
pub struct TokenStream<S> {
    stream: S,
    buf: BytesMut,
    /// Length of the consumed prefix of `buf`.
    pos: usize,
    /// Single token pushback slot.
    unget: Option<Token>,
    /// Raw literal bytes still owed to the reader. Nonzero means literal
    /// mode: token reads are a bug until the payload is drained.
    literal_left: usize,
    /// A zero-byte read was observed.
    eof: bool,
}

impl<S> TokenStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps a connected stream.
    #[must_use]
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            buf: BytesMut::with_capacity(READ_CHUNK),
            pos: 0,
            unget: None,
            literal_left: 0,
            eof: false,
        }
    }

    /// Unconsumed buffered bytes.
    fn pending(&self) -> &[u8] {
        &self.buf[self.pos..]
    }

    /// Drops the consumed prefix once it grows past the compaction
    /// threshold. Unconsumed bytes survive by shifting.
    fn compact(&mut self) {
        if self.pos == self.buf.len() {
            self.buf.clear();
            self.pos = 0;
        } else if self.pos > COMPACT_THRESHOLD {
            self.buf.advance(self.pos);
            self.pos = 0;
        }
    }

    /// Reads more bytes from the stream, extending the buffer. A zero-byte
    /// read marks end of data.
    async fn refill(&mut self) -> Result<()> {
        self.compact();
        self.buf.reserve(READ_CHUNK);
        let n = self.stream.read_buf(&mut self.buf).await?;
        if n == 0 {
            self.eof = true;
        } else {
            trace!(bytes = n, "stream refill");
        }
        Ok(())
    }

    /// Returns the next token, refilling the buffer as needed.
    ///
    /// Inter-token spaces and bare carriage returns are skipped. On a clean
    /// end of data with nothing left in the buffer this returns
    /// [`Token::Eof`]; end of data in the middle of a token is
    /// [`Error::Closed`].
    ///
    /// # Errors
    ///
    /// [`Error::Io`] from the underlying stream, [`Error::Parse`] for bytes
    /// that fit no token, [`Error::Closed`] for truncated input.
    pub async fn next_token(&mut self) -> Result<Token> {
        if let Some(token) = self.unget.take() {
            return Ok(token);
        }
        debug_assert_eq!(self.literal_left, 0, "token read while literal bytes remain");
        loop {
            if let Some((token, consumed)) = scan(self.pending(), self.eof)? {
                self.pos += consumed;
                self.compact();
                if let Token::LiteralSize(n) = token {
                    self.literal_left = n as usize;
                }
                return Ok(token);
            }
            if self.eof {
                return Err(Error::Closed);
            }
            self.refill().await?;
        }
    }

    /// Pushes one token back so the next [`TokenStream::next_token`]
    /// returns it again. Calling this twice without a consuming read in
    /// between is a programmer error.
    pub fn unget(&mut self, token: Token) {
        debug_assert!(self.unget.is_none(), "pushback slot already occupied");
        self.unget = Some(token);
    }

    /// Literal payload bytes not yet read.
    #[must_use]
    pub const fn literal_remaining(&self) -> usize {
        self.literal_left
    }

    /// True once the stream has reported end of data.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.eof
    }

    /// Returns the next chunk of the pending literal payload, at most the
    /// announced remaining length. An empty chunk means the payload is
    /// exhausted and token reads may resume.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] from the stream, [`Error::Closed`] if it ends before
    /// the announced length arrives.
    pub async fn read_literal_chunk(&mut self) -> Result<Bytes> {
        if self.literal_left == 0 {
            return Ok(Bytes::new());
        }
        while self.pending().is_empty() {
            if self.eof {
                return Err(Error::Closed);
            }
            self.refill().await?;
        }
        self.buf.advance(self.pos);
        self.pos = 0;
        let take = self.literal_left.min(self.buf.len());
        self.literal_left -= take;
        Ok(self.buf.split_to(take).freeze())
    }

    /// Collects the whole pending literal payload.
    ///
    /// # Errors
    ///
    /// Same as [`TokenStream::read_literal_chunk`].
    pub async fn take_literal(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(self.literal_left);
        while self.literal_left > 0 {
            let chunk = self.read_literal_chunk().await?;
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Reads up to and including the next line feed, returning the line
    /// with the terminator and a trailing carriage return trimmed. At end
    /// of data any leftover bytes are returned as a final partial line.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] from the stream, [`Error::Parse`] if the line exceeds
    /// the internal cap.
    pub async fn read_line(&mut self) -> Result<String> {
        debug_assert!(self.unget.is_none(), "line read would skip a pushed-back token");
        debug_assert_eq!(self.literal_left, 0, "line read while literal bytes remain");
        loop {
            if let Some(at) = self.pending().iter().position(|&b| b == b'\n') {
                let mut line = self.pending()[..at].to_vec();
                self.pos += at + 1;
                self.compact();
                if line.last() == Some(&b'\r') {
                    line.pop();
                }
                return Ok(String::from_utf8_lossy(&line).into_owned());
            }
            if self.eof {
                let rest = self.pending().to_vec();
                self.pos += rest.len();
                self.compact();
                return Ok(String::from_utf8_lossy(&rest).into_owned());
            }
            if self.pending().len() > MAX_LINE {
                return Err(Error::parse("response line exceeds maximum length"));
            }
            self.refill().await?;
        }
    }

    /// Skips inter-token spaces and returns the next byte without
    /// consuming it, or `None` at end of data. Lets a parser decide
    /// between structured tokens and free-form trailing text without
    /// tokenizing the text.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] from the stream.
    pub async fn peek_significant(&mut self) -> Result<Option<u8>> {
        debug_assert!(self.unget.is_none(), "peek would bypass a pushed-back token");
        loop {
            while let Some(&b) = self.pending().first() {
                if b == b' ' {
                    self.pos += 1;
                } else {
                    return Ok(Some(b));
                }
            }
            if self.eof {
                return Ok(None);
            }
            self.refill().await?;
        }
    }

    /// Reads an astring value: atom, quoted string or literal.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] if the next token cannot stand for a string.
    pub async fn read_astring(&mut self) -> Result<String> {
        let token = self.next_token().await?;
        match token {
            Token::Atom(s) | Token::Quoted(s) => Ok(s),
            Token::Number(n) => Ok(n.to_string()),
            // A mailbox literally named NIL arrives as the NIL atom.
            Token::Nil => Ok("NIL".to_string()),
            Token::LiteralSize(_) => {
                let data = self.take_literal().await?;
                Ok(String::from_utf8_lossy(&data).into_owned())
            }
            other => Err(Error::parse(format!("expected string, found {other}"))),
        }
    }

    /// Reads an nstring value: `NIL` becomes `None`.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] if the next token cannot stand for a string.
    pub async fn read_nstring(&mut self) -> Result<Option<String>> {
        let token = self.next_token().await?;
        match token {
            Token::Nil => Ok(None),
            Token::Atom(s) | Token::Quoted(s) => Ok(Some(s)),
            Token::Number(n) => Ok(Some(n.to_string())),
            Token::LiteralSize(_) => {
                let data = self.take_literal().await?;
                Ok(Some(String::from_utf8_lossy(&data).into_owned()))
            }
            other => Err(Error::parse(format!("expected string or NIL, found {other}"))),
        }
    }

    /// Reads a decimal number token.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] if the next token is not a number.
    pub async fn read_number(&mut self) -> Result<u32> {
        let token = self.next_token().await?;
        match token {
            Token::Number(n) => Ok(n),
            other => Err(Error::parse(format!("expected number, found {other}"))),
        }
    }

    /// Consumes the next token and checks it against `expected`.
    ///
    /// # Errors
    ///
    /// [`Error::Parse`] on mismatch.
    pub async fn expect(&mut self, expected: &Token) -> Result<()> {
        let found = self.next_token().await?;
        if found == *expected {
            Ok(())
        } else {
            Err(Error::parse(format!("expected {expected}, found {found}")))
        }
    }

    /// Writes raw bytes to the outgoing half.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] from the underlying stream.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        trace!(bytes = bytes.len(), "stream send");
        self.stream.write_all(bytes).await?;
        Ok(())
    }

    /// Flushes the outgoing half.
    ///
    /// # Errors
    ///
    /// [`Error::Io`] from the underlying stream.
    pub async fn flush(&mut self) -> Result<()> {
        self.stream.flush().await?;
        Ok(())
    }
}

/// Tries to lex one token from `input`. Returns the token and the number
/// of bytes it consumed (leading skippable bytes included), or `None` when
/// the input ends before the token is complete and more data could still
/// arrive.
fn scan(input: &[u8], at_eof: bool) -> Result<Option<(Token, usize)>> {
    let mut i = 0;
    while i < input.len() && (input[i] == b' ' || input[i] == b'\r') {
        i += 1;
    }
    if i == input.len() {
        return if at_eof { Ok(Some((Token::Eof, i))) } else { Ok(None) };
    }
    match input[i] {
        b'\n' => Ok(Some((Token::Crlf, i + 1))),
        b'(' => Ok(Some((Token::LParen, i + 1))),
        b')' => Ok(Some((Token::RParen, i + 1))),
        b'[' => Ok(Some((Token::LBracket, i + 1))),
        b']' => Ok(Some((Token::RBracket, i + 1))),
        b'*' => Ok(Some((Token::Asterisk, i + 1))),
        b'"' => scan_quoted(input, i),
        b'{' => scan_literal_header(input, i),
        b'\\' => scan_flag(input, i, at_eof),
        b if is_atom_char(b) => scan_atom(input, i, at_eof),
        b => Err(Error::parse(format!("unexpected byte 0x{b:02x} in response"))),
    }
}

/// Atom character class. Deliberately liberal about high bytes: servers
/// put unencoded UTF-8 in response text and mailbox names, and rejecting
/// it here would kill the session. Outgoing classification is stricter.
const fn is_atom_char(b: u8) -> bool {
    b >= 0x20
        && b != 0x7F
        && !matches!(
            b,
            b' ' | b'(' | b')' | b'{' | b'[' | b']' | b'"' | b'\\' | b'%' | b'*'
        )
}

fn scan_quoted(input: &[u8], start: usize) -> Result<Option<(Token, usize)>> {
    let mut value = Vec::new();
    let mut i = start + 1;
    loop {
        match input.get(i) {
            None => return Ok(None),
            Some(&b'"') => {
                let text = String::from_utf8_lossy(&value).into_owned();
                return Ok(Some((Token::Quoted(text), i + 1)));
            }
            Some(&b'\\') => match input.get(i + 1) {
                None => return Ok(None),
                Some(&escaped) => {
                    value.push(escaped);
                    i += 2;
                }
            },
            Some(&(b'\r' | b'\n')) => return Err(Error::parse("line break inside quoted string")),
            Some(&b) => {
                value.push(b);
                i += 1;
            }
        }
    }
}

/// Lexes `{n}` or `{n+}` including the terminating CRLF, which is part of
/// the header rather than a separate line end.
fn scan_literal_header(input: &[u8], start: usize) -> Result<Option<(Token, usize)>> {
    let mut i = start + 1;
    let mut size: u32 = 0;
    let mut digits = 0usize;
    loop {
        match input.get(i) {
            None => return Ok(None),
            Some(&b @ b'0'..=b'9') => {
                size = size
                    .checked_mul(10)
                    .and_then(|s| s.checked_add(u32::from(b - b'0')))
                    .ok_or_else(|| Error::parse("literal size overflows u32"))?;
                digits += 1;
                i += 1;
            }
            Some(&(b'+' | b'}')) => break,
            Some(&b) => {
                return Err(Error::parse(format!(
                    "unexpected byte 0x{b:02x} in literal header"
                )));
            }
        }
    }
    if digits == 0 {
        return Err(Error::parse("literal header without a size"));
    }
    if input.get(i) == Some(&b'+') {
        i += 1;
    }
    match input.get(i) {
        None => return Ok(None),
        Some(&b'}') => i += 1,
        Some(&b) => {
            return Err(Error::parse(format!(
                "unexpected byte 0x{b:02x} in literal header"
            )));
        }
    }
    match input.get(i) {
        None => Ok(None),
        Some(&b'\n') => Ok(Some((Token::LiteralSize(size), i + 1))),
        Some(&b'\r') => match input.get(i + 1) {
            None => Ok(None),
            Some(&b'\n') => Ok(Some((Token::LiteralSize(size), i + 2))),
            Some(&b) => Err(Error::parse(format!(
                "unexpected byte 0x{b:02x} after literal header"
            ))),
        },
        Some(&b) => Err(Error::parse(format!(
            "literal header not followed by line end, found 0x{b:02x}"
        ))),
    }
}

fn scan_flag(input: &[u8], start: usize, at_eof: bool) -> Result<Option<(Token, usize)>> {
    match input.get(start + 1) {
        None => Ok(None),
        Some(&b'*') => Ok(Some((Token::Flag("\\*".to_string()), start + 2))),
        Some(&b) if is_atom_char(b) => {
            let mut i = start + 1;
            while i < input.len() && is_atom_char(input[i]) {
                i += 1;
            }
            if i == input.len() && !at_eof {
                return Ok(None);
            }
            let name = String::from_utf8_lossy(&input[start..i]).into_owned();
            Ok(Some((Token::Flag(name), i)))
        }
        Some(&b) => Err(Error::parse(format!(
            "unexpected byte 0x{b:02x} after backslash"
        ))),
    }
}

/// Lexes a maximal run of atom characters. An all-digit run that fits in
/// u32 is a number; anything else, including `12:40` and overlong digit
/// runs, stays an atom. A lone `+` is the continuation marker.
fn scan_atom(input: &[u8], start: usize, at_eof: bool) -> Result<Option<(Token, usize)>> {
    let mut i = start;
    while i < input.len() && is_atom_char(input[i]) {
        i += 1;
    }
    if i == input.len() && !at_eof {
        return Ok(None);
    }
    let raw = &input[start..i];
    if raw == b"+" {
        return Ok(Some((Token::Plus, i)));
    }
    if raw == b"NIL" {
        return Ok(Some((Token::Nil, i)));
    }
    if raw.iter().all(u8::is_ascii_digit)
        && let Ok(text) = std::str::from_utf8(raw)
        && let Ok(n) = text.parse::<u32>()
    {
        return Ok(Some((Token::Number(n), i)));
    }
    let text = String::from_utf8_lossy(raw).into_owned();
    Ok(Some((Token::Atom(text), i)))
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

    fn stream_over(script: &[&[u8]]) -> TokenStream<tokio_test::io::Mock> {
        let mut builder = tokio_test::io::Builder::new();
        for chunk in script {
            builder.read(chunk);
        }
        TokenStream::new(builder.build())
    }

    async fn collect_tokens(
        stream: &mut TokenStream<tokio_test::io::Mock>,
    ) -> Vec<(Token, Option<Vec<u8>>)> {
        let mut out = Vec::new();
        loop {
            let token = stream.next_token().await.unwrap();
            let payload = if matches!(token, Token::LiteralSize(_)) {
                Some(stream.take_literal().await.unwrap())
            } else {
                None
            };
            let done = token == Token::Eof;
            out.push((token, payload));
            if done {
                break;
            }
        }
        out
    }

    mod token_reads {
        use super::*;

        #[tokio::test]
        async fn lexes_a_greeting_line() {
            let mut stream = stream_over(&[b"* OK IMAP4rev1 server ready\r\n"]);
            assert_eq!(stream.next_token().await.unwrap(), Token::Asterisk);
            assert_eq!(stream.next_token().await.unwrap(), Token::Atom("OK".to_string()));
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Atom("IMAP4rev1".to_string())
            );
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Atom("server".to_string())
            );
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Atom("ready".to_string())
            );
            assert_eq!(stream.next_token().await.unwrap(), Token::Crlf);
            assert_eq!(stream.next_token().await.unwrap(), Token::Eof);
        }

        #[tokio::test]
        async fn digit_runs_with_atom_tail_stay_atoms() {
            let mut stream = stream_over(&[b"12:40 999 4294967296 0\r\n"]);
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Atom("12:40".to_string())
            );
            assert_eq!(stream.next_token().await.unwrap(), Token::Number(999));
            // Too large for u32, so it degrades to an atom.
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Atom("4294967296".to_string())
            );
            assert_eq!(stream.next_token().await.unwrap(), Token::Number(0));
        }

        #[tokio::test]
        async fn brackets_parens_and_nil() {
            let mut stream = stream_over(&[b"[UIDNEXT 4392] (NIL)\r\n"]);
            assert_eq!(stream.next_token().await.unwrap(), Token::LBracket);
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Atom("UIDNEXT".to_string())
            );
            assert_eq!(stream.next_token().await.unwrap(), Token::Number(4392));
            assert_eq!(stream.next_token().await.unwrap(), Token::RBracket);
            assert_eq!(stream.next_token().await.unwrap(), Token::LParen);
            assert_eq!(stream.next_token().await.unwrap(), Token::Nil);
            assert_eq!(stream.next_token().await.unwrap(), Token::RParen);
        }

        #[tokio::test]
        async fn flags_and_the_star_flag() {
            let mut stream = stream_over(&[b"(\\Seen \\Deleted \\* custom)\r\n"]);
            assert_eq!(stream.next_token().await.unwrap(), Token::LParen);
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Flag("\\Seen".to_string())
            );
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Flag("\\Deleted".to_string())
            );
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Flag("\\*".to_string())
            );
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Atom("custom".to_string())
            );
            assert_eq!(stream.next_token().await.unwrap(), Token::RParen);
        }

        #[tokio::test]
        async fn lone_plus_is_continuation_but_embedded_plus_is_not() {
            let mut stream = stream_over(&[b"+ go\r\nLITERAL+ X\r\n"]);
            assert_eq!(stream.next_token().await.unwrap(), Token::Plus);
            assert_eq!(stream.next_token().await.unwrap(), Token::Atom("go".to_string()));
            assert_eq!(stream.next_token().await.unwrap(), Token::Crlf);
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Atom("LITERAL+".to_string())
            );
            assert_eq!(stream.next_token().await.unwrap(), Token::Atom("X".to_string()));
        }

        #[tokio::test]
        async fn quoted_strings_resolve_escapes() {
            let mut stream = stream_over(&[b"\"Sent Items\" \"a\\\"b\\\\c\"\r\n"]);
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Quoted("Sent Items".to_string())
            );
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Quoted("a\"b\\c".to_string())
            );
        }

        #[tokio::test]
        async fn token_split_across_reads_is_relexed_whole() {
            let mut stream = stream_over(&[b"\"hel", b"lo", b"\" EXI", b"STS\r\n"]);
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Quoted("hello".to_string())
            );
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Atom("EXISTS".to_string())
            );
            assert_eq!(stream.next_token().await.unwrap(), Token::Crlf);
        }
    }

    mod literal_mode {
        use super::*;

        #[tokio::test]
        async fn literal_header_swallows_its_crlf_and_yields_raw_bytes() {
            let mut stream = stream_over(&[b"{5}\r\nhel\r\n rest\r\n"]);
            assert_eq!(stream.next_token().await.unwrap(), Token::LiteralSize(5));
            // Payload contains a CRLF; it passes through untokenized.
            assert_eq!(stream.take_literal().await.unwrap(), b"hel\r\n");
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Atom("rest".to_string())
            );
            assert_eq!(stream.next_token().await.unwrap(), Token::Crlf);
        }

        #[tokio::test]
        async fn literal_spanning_refills_is_collected() {
            let mut stream = stream_over(&[b"{11}\r\nhello", b" world TAIL\r\n"]);
            assert_eq!(stream.next_token().await.unwrap(), Token::LiteralSize(11));
            assert_eq!(stream.take_literal().await.unwrap(), b"hello world");
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Atom("TAIL".to_string())
            );
        }

        #[tokio::test]
        async fn chunked_literal_reads_make_progress() {
            let mut stream = stream_over(&[b"{10}\r\nabcde", b"fghij DONE\r\n"]);
            assert_eq!(stream.next_token().await.unwrap(), Token::LiteralSize(10));
            let mut collected = Vec::new();
            loop {
                let chunk = stream.read_literal_chunk().await.unwrap();
                if chunk.is_empty() {
                    break;
                }
                collected.extend_from_slice(&chunk);
            }
            assert_eq!(collected, b"abcdefghij");
            assert_eq!(stream.literal_remaining(), 0);
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Atom("DONE".to_string())
            );
        }

        #[tokio::test]
        async fn nonsynchronizing_form_is_accepted() {
            let mut stream = stream_over(&[b"{3+}\r\nabc\r\n"]);
            assert_eq!(stream.next_token().await.unwrap(), Token::LiteralSize(3));
            assert_eq!(stream.take_literal().await.unwrap(), b"abc");
            assert_eq!(stream.next_token().await.unwrap(), Token::Crlf);
        }

        #[tokio::test]
        async fn truncated_literal_is_a_closed_stream() {
            let mut stream = stream_over(&[b"{10}\r\nabc"]);
            assert_eq!(stream.next_token().await.unwrap(), Token::LiteralSize(10));
            let first = stream.read_literal_chunk().await.unwrap();
            assert_eq!(&first[..], b"abc");
            let err = stream.read_literal_chunk().await.unwrap_err();
            assert!(matches!(err, Error::Closed));
        }
    }

    mod pushback {
        use super::*;

        #[tokio::test]
        async fn unget_replays_the_token_once() {
            let mut stream = stream_over(&[b"* 23 EXISTS\r\n"]);
            assert_eq!(stream.next_token().await.unwrap(), Token::Asterisk);
            let number = stream.next_token().await.unwrap();
            assert_eq!(number, Token::Number(23));
            stream.unget(number.clone());
            assert_eq!(stream.next_token().await.unwrap(), number);
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Atom("EXISTS".to_string())
            );
        }
    }

    mod line_reads {
        use super::*;

        #[tokio::test]
        async fn read_line_trims_the_terminator() {
            let mut stream = stream_over(&[b"ignored free text\r\nNEXT\r\n"]);
            assert_eq!(stream.read_line().await.unwrap(), "ignored free text");
            assert_eq!(
                stream.next_token().await.unwrap(),
                Token::Atom("NEXT".to_string())
            );
        }

        #[tokio::test]
        async fn read_line_spanning_refills() {
            let mut stream = stream_over(&[b"first ha", b"lf and second half\r\n"]);
            assert_eq!(stream.read_line().await.unwrap(), "first half and second half");
        }

        #[tokio::test]
        async fn peek_does_not_consume() {
            let mut stream = stream_over(&[b"  [ALERT] maintenance\r\n"]);
            assert_eq!(stream.peek_significant().await.unwrap(), Some(b'['));
            assert_eq!(stream.next_token().await.unwrap(), Token::LBracket);
        }
    }

    mod end_of_data {
        use super::*;

        #[tokio::test]
        async fn clean_eof_after_full_consumption() {
            let mut stream = stream_over(&[b"BYE\r\n"]);
            assert_eq!(stream.next_token().await.unwrap(), Token::Atom("BYE".to_string()));
            assert_eq!(stream.next_token().await.unwrap(), Token::Crlf);
            assert_eq!(stream.next_token().await.unwrap(), Token::Eof);
        }

        #[tokio::test]
        async fn trailing_spaces_still_count_as_consumed() {
            let mut stream = stream_over(&[b"  "]);
            assert_eq!(stream.next_token().await.unwrap(), Token::Eof);
        }

        #[tokio::test]
        async fn eof_inside_a_token_is_closed() {
            let mut stream = stream_over(&[b"\"unterminated"]);
            let err = stream.next_token().await.unwrap_err();
            assert!(matches!(err, Error::Closed));
        }
    }

    mod value_helpers {
        use super::*;

        #[tokio::test]
        async fn astring_accepts_every_string_form() {
            let mut stream = stream_over(&[b"INBOX \"Sent Items\" {4}\r\nabcd 42 NIL\r\n"]);
            assert_eq!(stream.read_astring().await.unwrap(), "INBOX");
            assert_eq!(stream.read_astring().await.unwrap(), "Sent Items");
            assert_eq!(stream.read_astring().await.unwrap(), "abcd");
            assert_eq!(stream.read_astring().await.unwrap(), "42");
            assert_eq!(stream.read_astring().await.unwrap(), "NIL");
        }

        #[tokio::test]
        async fn nstring_maps_nil_to_none() {
            let mut stream = stream_over(&[b"NIL \"x\"\r\n"]);
            assert_eq!(stream.read_nstring().await.unwrap(), None);
            assert_eq!(stream.read_nstring().await.unwrap(), Some("x".to_string()));
        }

        #[tokio::test]
        async fn expect_reports_the_mismatch() {
            let mut stream = stream_over(&[b") \r\n"]);
            let err = stream.expect(&Token::LParen).await.unwrap_err();
            assert!(err.to_string().contains("expected ("));
        }

        #[tokio::test]
        async fn read_number_rejects_atoms() {
            let mut stream = stream_over(&[b"EXISTS\r\n"]);
            assert!(stream.read_number().await.is_err());
        }
    }

    mod chunking {
        use super::*;
        use proptest::prelude::*;

        /// Builds wire text from generated pieces that are valid token
        /// source, so lexing must succeed regardless of how the bytes are
        /// split across reads.
        fn arb_piece() -> impl Strategy<Value = Vec<u8>> {
            prop_oneof![
                "[A-Za-z][A-Za-z0-9:.+-]{0,8}".prop_map(String::into_bytes),
                "[0-9]{1,6}".prop_map(String::into_bytes),
                "[a-z ]{0,10}".prop_map(|s| format!("\"{s}\"").into_bytes()),
                prop::collection::vec(any::<u8>(), 0..12).prop_map(|data| {
                    let mut piece = format!("{{{}}}\r\n", data.len()).into_bytes();
                    piece.extend_from_slice(&data);
                    piece
                }),
                Just(b"(".to_vec()),
                Just(b")".to_vec()),
                Just(b"[".to_vec()),
                Just(b"]".to_vec()),
                Just(b"*".to_vec()),
                Just(b"+".to_vec()),
                Just(b"\\Seen".to_vec()),
                Just(b"\\*".to_vec()),
            ]
        }

        fn wire_from(pieces: &[Vec<u8>]) -> Vec<u8> {
            let mut wire = Vec::new();
            for piece in pieces {
                wire.extend_from_slice(piece);
                wire.push(b' ');
            }
            wire.extend_from_slice(b"\r\n");
            wire
        }

        proptest! {
            #[test]
            fn token_sequence_is_chunking_invariant(
                pieces in prop::collection::vec(arb_piece(), 0..12)
            ) {
                let wire = wire_from(&pieces);

                let whole = tokio_test::block_on(async {
                    let mut stream = stream_over(&[wire.as_slice()]);
                    collect_tokens(&mut stream).await
                });

                let bytewise = tokio_test::block_on(async {
                    let chunks: Vec<&[u8]> = wire.chunks(1).collect();
                    let mut stream = stream_over(&chunks);
                    collect_tokens(&mut stream).await
                });

                prop_assert_eq!(whole, bytewise);
            }
        }
    }
}
