//! Literal payloads and CRLF normalization.
//!
//! A literal is announced as `{n}` where `n` counts the bytes as they will
//! appear on the wire. Inline text is sent byte-for-byte, so its length is
//! just its size. Raw data and streamed sources are normalized to CRLF
//! line endings on the way out, so their wire length is computed by a
//! counting pass over the same normalization.

use std::fmt;

use crate::error::Result;

/// A byte source for a streamed literal, e.g. a message being appended.
///
/// The payload is walked twice, once to measure and once to send. Both
/// passes must produce identical bytes.
pub trait LiteralSource: Send + fmt::Debug {
    /// Feeds the raw payload to `sink` in order, in any chunking.
    ///
    /// # Errors
    ///
    /// Implementations surface their own read failures.
    fn for_each_chunk(&self, sink: &mut dyn FnMut(&[u8])) -> Result<()>;
}

impl LiteralSource for Vec<u8> {
    fn for_each_chunk(&self, sink: &mut dyn FnMut(&[u8])) -> Result<()> {
        sink(self);
        Ok(())
    }
}

/// One literal argument of a command.
#[derive(Debug)]
pub enum LiteralPayload {
    /// Inline text, sent verbatim. The caller is responsible for line
    /// endings.
    Text(String),
    /// Raw bytes, CRLF-normalized on send.
    Data(Vec<u8>),
    /// A streamed source, CRLF-normalized on send.
    Source(Box<dyn LiteralSource>),
}

impl LiteralPayload {
    /// The byte count that goes into the `{n}` header.
    ///
    /// # Errors
    ///
    /// A [`LiteralSource`] may fail while being measured.
    pub fn wire_len(&self) -> Result<usize> {
        match self {
            Self::Text(s) => Ok(s.len()),
            Self::Data(d) => Ok(count_normalized(d, &mut 0)),
            Self::Source(src) => {
                let mut total = 0;
                let mut prev = 0u8;
                src.for_each_chunk(&mut |chunk| {
                    total += count_normalized(chunk, &mut prev);
                })?;
                Ok(total)
            }
        }
    }

    /// Appends the wire bytes to `out`, applying the same normalization
    /// the length was computed with.
    ///
    /// # Errors
    ///
    /// A [`LiteralSource`] may fail while being read.
    pub fn write_wire(&self, out: &mut Vec<u8>) -> Result<()> {
        match self {
            Self::Text(s) => {
                out.extend_from_slice(s.as_bytes());
                Ok(())
            }
            Self::Data(d) => {
                normalize_into(d, &mut 0, out);
                Ok(())
            }
            Self::Source(src) => {
                let mut prev = 0u8;
                src.for_each_chunk(&mut |chunk| {
                    normalize_into(chunk, &mut prev, out);
                })?;
                Ok(())
            }
        }
    }
}

/// Counts `chunk` as CRLF-normalized output. `prev` carries the last raw
/// byte across chunk boundaries so a CRLF split over two chunks is not
/// double-expanded.
fn count_normalized(chunk: &[u8], prev: &mut u8) -> usize {
    let mut len = 0;
    for &b in chunk {
        if b == b'\n' && *prev != b'\r' {
            len += 2;
        } else {
            len += 1;
        }
        *prev = b;
    }
    len
}

/// CRLF-normalizes `chunk` into `out`. Bare line feeds gain a carriage
/// return; everything else passes through.
fn normalize_into(chunk: &[u8], prev: &mut u8, out: &mut Vec<u8>) {
    for &b in chunk {
        if b == b'\n' && *prev != b'\r' {
            out.push(b'\r');
        }
        out.push(b);
        *prev = b;
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

    fn wire_of(payload: &LiteralPayload) -> Vec<u8> {
        let mut out = Vec::new();
        payload.write_wire(&mut out).unwrap();
        out
    }

    mod text {
        use super::*;

        #[test]
        fn sent_verbatim_with_exact_length() {
            let payload = LiteralPayload::Text("a\nb".to_string());
            assert_eq!(payload.wire_len().unwrap(), 3);
            assert_eq!(wire_of(&payload), b"a\nb");
        }
    }

    mod data {
        use super::*;

        #[test]
        fn bare_line_feeds_are_expanded() {
            let payload = LiteralPayload::Data(b"line one\nline two\n".to_vec());
            assert_eq!(wire_of(&payload), b"line one\r\nline two\r\n");
            assert_eq!(payload.wire_len().unwrap(), 20);
        }

        #[test]
        fn existing_crlf_is_untouched() {
            let payload = LiteralPayload::Data(b"a\r\nb\r\n".to_vec());
            assert_eq!(wire_of(&payload), b"a\r\nb\r\n");
            assert_eq!(payload.wire_len().unwrap(), 6);
        }

        #[test]
        fn length_matches_written_bytes() {
            let payload = LiteralPayload::Data(b"\n\r\n\nx\n".to_vec());
            assert_eq!(payload.wire_len().unwrap(), wire_of(&payload).len());
        }
    }

    mod source {
        use super::*;

        /// Replays fixed chunks, exercising the cross-chunk CRLF carry.
        #[derive(Debug)]
        struct Chunked(Vec<Vec<u8>>);

        impl LiteralSource for Chunked {
            fn for_each_chunk(&self, sink: &mut dyn FnMut(&[u8])) -> Result<()> {
                for chunk in &self.0 {
                    sink(chunk);
                }
                Ok(())
            }
        }

        #[test]
        fn crlf_split_across_chunks_is_not_doubled() {
            let source = Chunked(vec![b"head\r".to_vec(), b"\ntail\n".to_vec()]);
            let payload = LiteralPayload::Source(Box::new(source));
            assert_eq!(wire_of(&payload), b"head\r\ntail\r\n");
            assert_eq!(payload.wire_len().unwrap(), 12);
        }

        #[test]
        fn vec_source_normalizes_like_data() {
            let payload = LiteralPayload::Source(Box::new(b"a\nb".to_vec()));
            assert_eq!(wire_of(&payload), b"a\r\nb");
            assert_eq!(payload.wire_len().unwrap(), 4);
        }
    }
}
