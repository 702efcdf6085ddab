//! Token-level readers for untagged response payloads.
//!
//! Each reader consumes exactly the grammar it names and leaves the
//! stream positioned after it; none of them consume the line terminator
//! unless the grammar itself runs to end of line (noted per function).
//! Server data these readers do not model (keyword flags, extension
//! items) is skipped, never an error.

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::trace;

use crate::error::{Error, Result};
use crate::lexer::{Token, TokenStream};
use crate::summary::{Address, Envelope, StagedRecord};
use crate::types::{
    Capabilities, FlagSet, ListAttrs, ListEntry, NamespaceEntry, Namespaces, StatusSummary, Uid,
    UidValidity,
};

/// Applies capability names to `caps` until `until` is consumed. The
/// terminator is [`Token::Crlf`] for an untagged CAPABILITY line and
/// [`Token::RBracket`] for a `[CAPABILITY ...]` response code.
pub(crate) async fn read_capabilities<S>(
    stream: &mut TokenStream<S>,
    caps: &mut Capabilities,
    until: &Token,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let token = stream.next_token().await?;
        if token == *until {
            return Ok(());
        }
        match token {
            Token::Atom(name) => {
                if !caps.apply(&name) {
                    trace!(%name, "ignoring unknown capability");
                }
            }
            Token::Number(n) => {
                let _ = caps.apply(&n.to_string());
            }
            Token::Eof => return Err(Error::Closed),
            other => {
                return Err(Error::parse(format!(
                    "unexpected {other} in capability list"
                )));
            }
        }
    }
}

/// Reads a parenthesized flag list. Keyword flags and `\*` fall outside
/// the fixed system-flag table and are skipped.
pub(crate) async fn read_flag_list<S>(stream: &mut TokenStream<S>) -> Result<FlagSet>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.expect(&Token::LParen).await?;
    let mut set = FlagSet::EMPTY;
    loop {
        match stream.next_token().await? {
            Token::RParen => return Ok(set),
            Token::Flag(name) => {
                if let Some(flag) = FlagSet::from_name(&name) {
                    set |= flag;
                }
            }
            Token::Atom(_) => {}
            Token::Eof => return Err(Error::Closed),
            other => return Err(Error::parse(format!("unexpected {other} in flag list"))),
        }
    }
}

/// Reads the remainder of a LIST or LSUB line: attribute list,
/// separator, mailbox name.
pub(crate) async fn read_list_entry<S>(stream: &mut TokenStream<S>) -> Result<ListEntry>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.expect(&Token::LParen).await?;
    let mut attrs = ListAttrs::NONE;
    loop {
        match stream.next_token().await? {
            Token::RParen => break,
            Token::Flag(name) => {
                if let Some(attr) = ListAttrs::from_name(&name) {
                    attrs |= attr;
                }
            }
            Token::Atom(_) => {}
            Token::Eof => return Err(Error::Closed),
            other => {
                return Err(Error::parse(format!(
                    "unexpected {other} in mailbox attributes"
                )));
            }
        }
    }
    let separator = read_separator(stream).await?;
    let name = stream.read_astring().await?;
    Ok(ListEntry {
        attrs,
        separator,
        name,
    })
}

/// Reads the remainder of a STATUS line: mailbox name plus the
/// attribute/value pairs. Unknown attributes are consumed and dropped.
pub(crate) async fn read_status<S>(stream: &mut TokenStream<S>) -> Result<StatusSummary>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mailbox = stream.read_astring().await?;
    let mut summary = StatusSummary {
        mailbox,
        messages: None,
        recent: None,
        uid_next: None,
        uid_validity: None,
        unseen: None,
    };
    stream.expect(&Token::LParen).await?;
    loop {
        let attr = match stream.next_token().await? {
            Token::RParen => return Ok(summary),
            Token::Atom(attr) => attr,
            Token::Eof => return Err(Error::Closed),
            other => {
                return Err(Error::parse(format!(
                    "unexpected {other} in status attributes"
                )));
            }
        };
        let value = stream.read_number().await?;
        match attr.to_ascii_uppercase().as_str() {
            "MESSAGES" => summary.messages = Some(value),
            "RECENT" => summary.recent = Some(value),
            "UIDNEXT" => summary.uid_next = Uid::new(value),
            "UIDVALIDITY" => summary.uid_validity = UidValidity::new(value),
            "UNSEEN" => summary.unseen = Some(value),
            _ => {}
        }
    }
}

/// Reads the three namespace groups of a NAMESPACE line.
pub(crate) async fn read_namespaces<S>(stream: &mut TokenStream<S>) -> Result<Namespaces>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    Ok(Namespaces {
        personal: read_namespace_group(stream).await?,
        other: read_namespace_group(stream).await?,
        shared: read_namespace_group(stream).await?,
    })
}

/// One namespace group: `NIL` or a list of `(prefix separator ...)`
/// pairs, each possibly trailing extension data.
async fn read_namespace_group<S>(stream: &mut TokenStream<S>) -> Result<Vec<NamespaceEntry>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match stream.next_token().await? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut entries = Vec::new();
            loop {
                match stream.next_token().await? {
                    Token::RParen => return Ok(entries),
                    Token::LParen => {
                        let prefix = stream.read_astring().await?;
                        let separator = read_separator(stream).await?;
                        skip_group(stream).await?;
                        entries.push(NamespaceEntry::new(prefix, separator));
                    }
                    Token::Eof => return Err(Error::Closed),
                    other => {
                        return Err(Error::parse(format!(
                            "unexpected {other} in namespace group"
                        )));
                    }
                }
            }
        }
        other => Err(Error::parse(format!("unexpected {other} as namespace"))),
    }
}

/// Reads the parenthesized item list of one FETCH line keyed by `seq`.
pub(crate) async fn read_fetch_record<S>(
    stream: &mut TokenStream<S>,
    seq: u32,
) -> Result<StagedRecord>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.expect(&Token::LParen).await?;
    let mut record = StagedRecord {
        seq,
        ..StagedRecord::default()
    };
    loop {
        let item = match stream.next_token().await? {
            Token::RParen => return Ok(record),
            Token::Atom(item) => item.to_ascii_uppercase(),
            Token::Eof => return Err(Error::Closed),
            other => return Err(Error::parse(format!("unexpected {other} in fetch items"))),
        };
        match item.as_str() {
            "UID" => {
                let value = stream.read_number().await?;
                record.uid =
                    Some(Uid::new(value).ok_or_else(|| Error::parse("UID 0 in fetch response"))?);
            }
            "FLAGS" => record.flags = Some(read_flag_list(stream).await?),
            "INTERNALDATE" => record.internal_date = stream.read_nstring().await?,
            "RFC822.SIZE" => record.size = Some(stream.read_number().await?),
            "ENVELOPE" => record.envelope = Some(read_envelope(stream).await?),
            _ if item.starts_with("BODY") => {
                if let Some(body) = read_body_item(stream).await? {
                    record.body = Some(body);
                }
            }
            _ => skip_fetch_value(stream).await?,
        }
    }
}

/// Appends `* SEARCH` hits to `hits`. Consumes the line terminator,
/// since numbers run to end of line.
pub(crate) async fn read_search_hits<S>(
    stream: &mut TokenStream<S>,
    hits: &mut Vec<u32>,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match stream.next_token().await? {
            Token::Crlf | Token::Eof => return Ok(()),
            Token::Number(n) => hits.push(n),
            other => {
                return Err(Error::parse(format!(
                    "unexpected {other} in search response"
                )));
            }
        }
    }
}

/// Consumes tokens until the response-code `]` closes, or to end of
/// line for a malformed code. Returns true if the line terminator was
/// consumed.
pub(crate) async fn drain_code<S>(stream: &mut TokenStream<S>) -> Result<bool>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut depth = 0usize;
    loop {
        match stream.next_token().await? {
            Token::RBracket if depth == 0 => return Ok(false),
            Token::Crlf | Token::Eof => return Ok(true),
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::LiteralSize(_) => {
                stream.take_literal().await?;
            }
            _ => {}
        }
    }
}

/// Reads a hierarchy separator: a quoted single character or `NIL`.
async fn read_separator<S>(stream: &mut TokenStream<S>) -> Result<Option<char>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match stream.next_token().await? {
        Token::Quoted(s) => Ok(s.chars().next()),
        Token::Nil => Ok(None),
        other => Err(Error::parse(format!("unexpected {other} as separator"))),
    }
}

/// Consumes the remainder of an already-opened parenthesized group,
/// nesting included.
async fn skip_group<S>(stream: &mut TokenStream<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut depth = 1usize;
    while depth > 0 {
        match stream.next_token().await? {
            Token::LParen => depth += 1,
            Token::RParen => depth -= 1,
            Token::LiteralSize(_) => {
                stream.take_literal().await?;
            }
            Token::Eof => return Err(Error::Closed),
            Token::Crlf => return Err(Error::parse("unterminated parenthesized list")),
            _ => {}
        }
    }
    Ok(())
}

/// Consumes one fetch item value of unknown shape.
async fn skip_fetch_value<S>(stream: &mut TokenStream<S>) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match stream.next_token().await? {
        Token::LParen => skip_group(stream).await,
        Token::LiteralSize(_) => {
            stream.take_literal().await?;
            Ok(())
        }
        Token::Eof => Err(Error::Closed),
        Token::Crlf => Err(Error::parse("missing fetch item value")),
        _ => Ok(()),
    }
}

/// `BODY (...)` structure forms are skipped; `BODY[section]<origin>`
/// content forms yield the payload bytes.
async fn read_body_item<S>(stream: &mut TokenStream<S>) -> Result<Option<Vec<u8>>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match stream.next_token().await? {
        Token::LParen => {
            skip_group(stream).await?;
            Ok(None)
        }
        Token::LBracket => {
            loop {
                match stream.next_token().await? {
                    Token::RBracket => break,
                    Token::LParen => skip_group(stream).await?,
                    Token::LiteralSize(_) => {
                        stream.take_literal().await?;
                    }
                    Token::Eof => return Err(Error::Closed),
                    Token::Crlf => return Err(Error::parse("unterminated body section")),
                    _ => {}
                }
            }
            // An origin octet like `<0>` may sit between section and
            // payload.
            let mut token = stream.next_token().await?;
            if let Token::Atom(origin) = &token
                && origin.starts_with('<')
            {
                token = stream.next_token().await?;
            }
            match token {
                Token::Nil => Ok(None),
                Token::Quoted(s) => Ok(Some(s.into_bytes())),
                Token::LiteralSize(_) => Ok(Some(stream.take_literal().await?)),
                other => Err(Error::parse(format!("unexpected {other} as body payload"))),
            }
        }
        other => Err(Error::parse(format!("unexpected {other} after BODY"))),
    }
}

/// Reads a full ENVELOPE structure.
async fn read_envelope<S>(stream: &mut TokenStream<S>) -> Result<Envelope>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.expect(&Token::LParen).await?;
    let envelope = Envelope {
        date: stream.read_nstring().await?,
        subject: stream.read_nstring().await?,
        from: read_address_list(stream).await?,
        sender: read_address_list(stream).await?,
        reply_to: read_address_list(stream).await?,
        to: read_address_list(stream).await?,
        cc: read_address_list(stream).await?,
        bcc: read_address_list(stream).await?,
        in_reply_to: stream.read_nstring().await?,
        message_id: stream.read_nstring().await?,
    };
    stream.expect(&Token::RParen).await?;
    Ok(envelope)
}

/// `NIL` or a parenthesized list of four-field address groups.
async fn read_address_list<S>(stream: &mut TokenStream<S>) -> Result<Vec<Address>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match stream.next_token().await? {
        Token::Nil => Ok(Vec::new()),
        Token::LParen => {
            let mut list = Vec::new();
            loop {
                match stream.next_token().await? {
                    Token::RParen => return Ok(list),
                    Token::LParen => {
                        let address = Address {
                            name: stream.read_nstring().await?,
                            route: stream.read_nstring().await?,
                            mailbox: stream.read_nstring().await?,
                            host: stream.read_nstring().await?,
                        };
                        stream.expect(&Token::RParen).await?;
                        list.push(address);
                    }
                    Token::Eof => return Err(Error::Closed),
                    other => {
                        return Err(Error::parse(format!(
                            "unexpected {other} in address list"
                        )));
                    }
                }
            }
        }
        other => Err(Error::parse(format!("unexpected {other} as address list"))),
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
    use crate::types::Caps;

    fn stream(script: &[u8]) -> TokenStream<tokio_test::io::Mock> {
        TokenStream::new(tokio_test::io::Builder::new().read(script).build())
    }

    mod capabilities {
        use super::*;

        #[tokio::test]
        async fn line_form_stops_at_crlf() {
            let mut s = stream(b"IMAP4rev1 LITERAL+ AUTH=PLAIN X-NONSENSE\r\n");
            let mut caps = Capabilities::default();
            read_capabilities(&mut s, &mut caps, &Token::Crlf)
                .await
                .unwrap();
            assert!(caps.has(Caps::IMAP4REV1));
            assert!(caps.has(Caps::LITERAL_PLUS));
            assert_eq!(caps.auth_mechanisms(), ["PLAIN"]);
        }

        #[tokio::test]
        async fn code_form_stops_at_bracket() {
            let mut s = stream(b"IMAP4rev1 UIDPLUS] ready\r\n");
            let mut caps = Capabilities::default();
            read_capabilities(&mut s, &mut caps, &Token::RBracket)
                .await
                .unwrap();
            assert!(caps.has(Caps::UIDPLUS));
            // The closing bracket is consumed, the line text is not.
            assert_eq!(s.read_line().await.unwrap(), " ready");
        }
    }

    mod flag_lists {
        use super::*;

        #[tokio::test]
        async fn system_flags_and_keywords() {
            let mut s = stream(b"(\\Seen \\Deleted custom \\*)\r\n");
            let set = read_flag_list(&mut s).await.unwrap();
            assert_eq!(set, FlagSet::SEEN | FlagSet::DELETED);
        }

        #[tokio::test]
        async fn empty_list() {
            let mut s = stream(b"()\r\n");
            assert_eq!(read_flag_list(&mut s).await.unwrap(), FlagSet::EMPTY);
        }
    }

    mod list_lines {
        use super::*;

        #[tokio::test]
        async fn attributes_separator_and_name() {
            let mut s = stream(b"(\\Noselect \\HasChildren) \"/\" \"Public Folders\"\r\n");
            let entry = read_list_entry(&mut s).await.unwrap();
            assert!(entry.attrs.contains(ListAttrs::NOSELECT));
            assert!(entry.attrs.contains(ListAttrs::HAS_CHILDREN));
            assert_eq!(entry.separator, Some('/'));
            assert_eq!(entry.name, "Public Folders");
        }

        #[tokio::test]
        async fn nil_separator_and_literal_name() {
            let mut s = stream(b"() NIL {5}\r\nINBOX\r\n");
            let entry = read_list_entry(&mut s).await.unwrap();
            assert!(entry.attrs.is_empty());
            assert_eq!(entry.separator, None);
            assert_eq!(entry.name, "INBOX");
        }
    }

    mod status_lines {
        use super::*;

        #[tokio::test]
        async fn reads_known_attributes() {
            let mut s = stream(b"Drafts (MESSAGES 4 RECENT 1 UIDNEXT 443 UIDVALIDITY 9 UNSEEN 2)\r\n");
            let summary = read_status(&mut s).await.unwrap();
            assert_eq!(summary.mailbox, "Drafts");
            assert_eq!(summary.messages, Some(4));
            assert_eq!(summary.recent, Some(1));
            assert_eq!(summary.uid_next, Uid::new(443));
            assert_eq!(summary.uid_validity, UidValidity::new(9));
            assert_eq!(summary.unseen, Some(2));
        }

        #[tokio::test]
        async fn unknown_attributes_are_skipped() {
            let mut s = stream(b"INBOX (MESSAGES 7 HIGHESTMODSEQ 9999)\r\n");
            let summary = read_status(&mut s).await.unwrap();
            assert_eq!(summary.messages, Some(7));
            assert_eq!(summary.unseen, None);
        }
    }

    mod namespace_lines {
        use super::*;

        #[tokio::test]
        async fn personal_only() {
            let mut s = stream(b"((\"\" \"/\")) NIL NIL\r\n");
            let ns = read_namespaces(&mut s).await.unwrap();
            assert_eq!(ns.personal.len(), 1);
            assert_eq!(ns.personal[0].prefix, "");
            assert_eq!(ns.personal[0].separator, Some('/'));
            assert!(ns.other.is_empty());
            assert!(ns.shared.is_empty());
        }

        #[tokio::test]
        async fn multiple_prefixes_with_extension_data() {
            let mut s = stream(
                b"((\"INBOX.\" \".\")) ((\"~user.\" \".\" \"X-PARAM\" (\"a\" \"b\"))) NIL\r\n",
            );
            let ns = read_namespaces(&mut s).await.unwrap();
            assert_eq!(ns.personal[0].prefix, "INBOX");
            assert_eq!(ns.other.len(), 1);
            assert_eq!(ns.other[0].prefix, "~user");
        }
    }

    mod fetch_records {
        use super::*;

        #[tokio::test]
        async fn uid_flags_size_and_date() {
            let mut s = stream(
                b"(UID 812 FLAGS (\\Seen) RFC822.SIZE 4196 INTERNALDATE \"17-Jul-2002 02:44:25 -0700\")\r\n",
            );
            let record = read_fetch_record(&mut s, 12).await.unwrap();
            assert_eq!(record.seq, 12);
            assert_eq!(record.uid, Uid::new(812));
            assert_eq!(record.flags, Some(FlagSet::SEEN));
            assert_eq!(record.size, Some(4196));
            assert_eq!(
                record.internal_date.as_deref(),
                Some("17-Jul-2002 02:44:25 -0700")
            );
        }

        #[tokio::test]
        async fn envelope_fields_come_through() {
            let mut s = stream(
                b"(ENVELOPE (\"Mon, 7 Feb 1994 21:52:25 -0800\" \"afternoon meeting\" ((\"Terry Gray\" NIL \"gray\" \"cac.washington.edu\")) NIL NIL ((NIL NIL \"imap\" \"cac.washington.edu\")) NIL NIL NIL \"<B27397-0100000@cac.washington.edu>\"))\r\n",
            );
            let record = read_fetch_record(&mut s, 2).await.unwrap();
            let envelope = record.envelope.unwrap();
            assert_eq!(envelope.subject.as_deref(), Some("afternoon meeting"));
            assert_eq!(envelope.from.len(), 1);
            assert_eq!(
                envelope.from[0].email().as_deref(),
                Some("gray@cac.washington.edu")
            );
            assert_eq!(envelope.from[0].name.as_deref(), Some("Terry Gray"));
            assert!(envelope.sender.is_empty());
            assert_eq!(envelope.to[0].mailbox.as_deref(), Some("imap"));
            assert_eq!(
                envelope.message_id.as_deref(),
                Some("<B27397-0100000@cac.washington.edu>")
            );
        }

        #[tokio::test]
        async fn body_section_literal() {
            let mut s = stream(b"(UID 5 BODY[HEADER.FIELDS (DATE)] {14}\r\nDate: someday\n)\r\n");
            let record = read_fetch_record(&mut s, 1).await.unwrap();
            assert_eq!(record.body.as_deref(), Some(&b"Date: someday\n"[..]));
        }

        #[tokio::test]
        async fn bodystructure_is_skipped() {
            let mut s = stream(
                b"(BODYSTRUCTURE (\"TEXT\" \"PLAIN\" (\"CHARSET\" \"US-ASCII\") NIL NIL \"7BIT\" 2 1) UID 44)\r\n",
            );
            let record = read_fetch_record(&mut s, 3).await.unwrap();
            assert!(record.body.is_none());
            assert_eq!(record.uid, Uid::new(44));
        }

        #[tokio::test]
        async fn unknown_items_are_skipped() {
            let mut s = stream(b"(X-GM-MSGID 1278455344230334865 MODSEQ (624140) UID 9)\r\n");
            let record = read_fetch_record(&mut s, 4).await.unwrap();
            assert_eq!(record.uid, Uid::new(9));
        }

        #[tokio::test]
        async fn uid_zero_is_rejected() {
            let mut s = stream(b"(UID 0)\r\n");
            let err = read_fetch_record(&mut s, 1).await.unwrap_err();
            assert!(err.to_string().contains("UID 0"));
        }
    }

    mod search_lines {
        use super::*;

        #[tokio::test]
        async fn numbers_until_end_of_line() {
            let mut s = stream(b" 2 84 882\r\n");
            let mut hits = Vec::new();
            read_search_hits(&mut s, &mut hits).await.unwrap();
            assert_eq!(hits, vec![2, 84, 882]);
        }

        #[tokio::test]
        async fn empty_result() {
            let mut s = stream(b"\r\n");
            let mut hits = Vec::new();
            read_search_hits(&mut s, &mut hits).await.unwrap();
            assert!(hits.is_empty());
        }
    }

    mod code_draining {
        use super::*;

        #[tokio::test]
        async fn stops_at_closing_bracket() {
            let mut s = stream(b"BADCHARSET (UTF-8 US-ASCII)] rest\r\n");
            assert!(!drain_code(&mut s).await.unwrap());
            assert_eq!(s.read_line().await.unwrap(), " rest");
        }

        #[tokio::test]
        async fn tolerates_missing_bracket() {
            let mut s = stream(b"HALF OPEN\r\n");
            assert!(drain_code(&mut s).await.unwrap());
        }
    }
}
