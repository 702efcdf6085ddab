//! Integration tests for the IMAP engine.
//!
//! These tests run complete scripted sessions over a mock stream,
//! without a real server. The mock hands out the scripted responses as
//! the engine reads and logs everything the engine writes, so each test
//! can assert the exact wire transcript afterwards.

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use ketch_imap::{
    Capabilities, Caps, CommandSpec, ConnectionState, Engine, FlagSet, Folder, Greeting,
    LiteralPayload, MessageRecord, Uid, UidPos, compress_uids, summary,
};

/// Mock stream: scripted responses in, sent bytes logged for later
/// inspection through the shared handle.
struct MockStream {
    responses: Cursor<Vec<u8>>,
    sent: Arc<Mutex<Vec<u8>>>,
}

impl MockStream {
    fn new(responses: &str) -> (Self, Arc<Mutex<Vec<u8>>>) {
        let sent = Arc::new(Mutex::new(Vec::new()));
        let stream = Self {
            responses: Cursor::new(responses.as_bytes().to_vec()),
            sent: Arc::clone(&sent),
        };
        (stream, sent)
    }
}

fn transcript(sent: &Arc<Mutex<Vec<u8>>>) -> String {
    String::from_utf8(sent.lock().unwrap().clone()).unwrap()
}

impl AsyncRead for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let data = self.responses.get_ref();
        let pos = self.responses.position() as usize;

        if pos >= data.len() {
            return Poll::Ready(Ok(()));
        }

        let remaining = &data[pos..];
        let to_read = remaining.len().min(buf.remaining());
        buf.put_slice(&remaining[..to_read]);
        self.responses.set_position((pos + to_read) as u64);

        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.sent.lock().unwrap().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn test_greeting_and_login() {
    let (stream, sent) = MockStream::new("* OK IMAP4rev1 Service Ready\r\nA00001 OK LOGIN completed\r\n");
    let mut engine = Engine::with_tag_prefix('A');

    let greeting = engine.take_stream(stream).await.unwrap();
    assert_eq!(greeting, Greeting::Ok);
    assert_eq!(engine.connection(), ConnectionState::Connected);

    let login = engine
        .queue(None, CommandSpec::login("user", "secret"))
        .unwrap();
    engine.run_until(login).await.unwrap();

    assert_eq!(engine.connection(), ConnectionState::Authenticated);
    assert_eq!(transcript(&sent), "A00001 LOGIN user secret\r\n");
}

#[tokio::test]
async fn test_bye_greeting_refuses_service() {
    let (stream, sent) = MockStream::new("* BYE Autologout; idle for too long\r\n");
    let mut engine = Engine::<MockStream>::with_tag_prefix('A');

    let greeting = engine.take_stream(stream).await.unwrap();
    assert_eq!(greeting, Greeting::Bye);
    assert_eq!(engine.connection(), ConnectionState::Disconnected);
    assert!(transcript(&sent).is_empty());
}

/// Login, let the engine open INBOX by itself, pull full summaries,
/// reconcile them, then push a flag change and watch the unsolicited
/// FETCH fold back into the held records.
#[tokio::test]
async fn test_full_session_select_fetch_store() {
    let responses = concat!(
        "* OK Dovecot ready.\r\n",
        "A00001 OK Logged in.\r\n",
        "* FLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft)\r\n",
        "* OK [PERMANENTFLAGS (\\Answered \\Flagged \\Deleted \\Seen \\Draft \\*)] Flags permitted.\r\n",
        "* 2 EXISTS\r\n",
        "* 0 RECENT\r\n",
        "* OK [UIDVALIDITY 1596000000] UIDs valid\r\n",
        "* OK [UIDNEXT 12] Predicted next UID\r\n",
        "A00002 OK [READ-WRITE] Select completed.\r\n",
        "* 1 FETCH (UID 5 FLAGS (\\Seen) INTERNALDATE \"17-Jul-1996 02:44:25 -0700\" RFC822.SIZE 352 ",
        "ENVELOPE (\"Wed, 17 Jul 1996 02:23:25 -0700 (PDT)\" \"IMAP4rev1 WG mtg summary and minutes\" ",
        "((\"Terry Gray\" NIL \"gray\" \"cac.washington.edu\")) ((\"Terry Gray\" NIL \"gray\" \"cac.washington.edu\")) ",
        "((\"Terry Gray\" NIL \"gray\" \"cac.washington.edu\")) ((NIL NIL \"imap\" \"cac.washington.edu\")) ",
        "NIL NIL NIL \"<B27397-0100000@cac.washington.edu>\"))\r\n",
        "* 2 FETCH (UID 11 FLAGS () INTERNALDATE \"18-Jul-1996 09:00:00 -0700\" RFC822.SIZE 128 ",
        "ENVELOPE (\"Thu, 18 Jul 1996 09:00:00 -0700\" \"Re: minutes\" ((\"J Smith\" NIL \"jsmith\" \"example.org\")) ",
        "NIL NIL ((NIL NIL \"gray\" \"cac.washington.edu\")) NIL NIL NIL \"<next@example.org>\"))\r\n",
        "A00003 OK Fetch completed.\r\n",
        "* 2 FETCH (UID 11 FLAGS (\\Seen))\r\n",
        "A00004 OK Store completed.\r\n",
    );
    let (stream, sent) = MockStream::new(responses);
    let mut engine = Engine::with_tag_prefix('A');
    engine.take_stream(stream).await.unwrap();

    let login = engine
        .queue(None, CommandSpec::login("user", "secret"))
        .unwrap();
    engine.run_until(login).await.unwrap();

    let inbox = Folder::new("INBOX");
    let fetch = summary::fetch_all(&mut engine, &inbox, 1, None).unwrap();
    engine.run_until(fetch).await.unwrap();

    assert_eq!(engine.connection(), ConnectionState::Selected);
    assert_eq!(engine.state().selected.exists, 2);
    assert!(!engine.state().selected.read_only);
    assert!(engine.state().selected.permanent_flags.contains(FlagSet::SEEN));
    assert_eq!(
        engine.state().selected.uid_next,
        Some(Uid::new(12).unwrap())
    );

    let outcome = summary::complete_fetch(&mut engine, fetch).unwrap();
    assert_eq!(outcome.appended, 2);
    assert_eq!(outcome.removed, 0);
    assert!(!outcome.incomplete);

    {
        let records = &engine.state().selected.records;
        assert_eq!(records.len(), 2);
        let first = records.get(1).unwrap();
        assert_eq!(first.uid, Uid::new(5).unwrap());
        assert!(first.flags.contains(FlagSet::SEEN));
        let envelope = first.envelope.as_ref().unwrap();
        assert_eq!(
            envelope.subject.as_deref(),
            Some("IMAP4rev1 WG mtg summary and minutes")
        );
        assert_eq!(
            envelope.from[0].email().as_deref(),
            Some("gray@cac.washington.edu")
        );
    }

    // Mark everything seen; both records are position-adjacent so a
    // single UID range covers them.
    let positions = engine.state().selected.records.uid_positions();
    let ids = summary::store_flags(&mut engine, &inbox, &positions, true, FlagSet::SEEN).unwrap();
    assert_eq!(ids.len(), 1);
    engine.run_until(ids[0]).await.unwrap();

    // The unsolicited FETCH echoing the store landed on record 2.
    let second = engine.state().selected.records.get(2).unwrap();
    assert!(second.flags.contains(FlagSet::SEEN));

    assert_eq!(
        transcript(&sent),
        "A00001 LOGIN user secret\r\n\
         A00002 SELECT INBOX\r\n\
         A00003 FETCH 1:* (UID ALL)\r\n\
         A00004 UID STORE 5:11 +FLAGS.SILENT (\\Seen)\r\n"
    );
}

#[tokio::test]
async fn test_append_splits_at_the_literal() {
    let (stream, sent) = MockStream::new(concat!(
        "* OK ready\r\n",
        "+ Ready for literal data\r\n",
        "A00001 OK APPEND completed\r\n",
    ));
    let mut engine = Engine::with_tag_prefix('A');
    engine.take_stream(stream).await.unwrap();

    let body = "ab\r\n".repeat(1250);
    let id = engine
        .queue(
            None,
            CommandSpec::append(
                &Folder::new("saved-messages"),
                None,
                LiteralPayload::Text(body.clone()),
            ),
        )
        .unwrap();
    engine.run_until(id).await.unwrap();

    let wire = transcript(&sent);
    let expected = format!("A00001 APPEND saved-messages {{5000}}\r\n{body}\r\n");
    assert_eq!(wire, expected);
    assert!(engine.take_completed(id).unwrap().result().is_ok());
}

#[tokio::test]
async fn test_store_chunks_respect_the_line_budget() {
    let (stream, sent) = MockStream::new(concat!(
        "* OK ready\r\n",
        "A00001 OK Store completed\r\n",
        "A00002 OK Store completed\r\n",
        "A00003 OK Store completed\r\n",
    ));
    let mut engine = Engine::with_tag_prefix('A');
    engine.take_stream(stream).await.unwrap();

    let inbox = Folder::new("INBOX");
    engine.state_mut().connection = ConnectionState::Selected;
    engine.state_mut().selected.folder = Some(inbox.clone());
    // Leaves an 8-byte budget for each UID set once the command's fixed
    // text is subtracted.
    engine.state_mut().line_budget = 40;

    // Gappy positions keep every record a lone element, so the sets
    // split after two three-digit UIDs each.
    let positions: Vec<UidPos> = [(101, 1), (103, 3), (105, 5), (107, 7), (109, 9), (111, 11)]
        .into_iter()
        .map(|(uid, pos)| UidPos::new(uid, pos).unwrap())
        .collect();
    let ids = summary::store_flags(&mut engine, &inbox, &positions, true, FlagSet::SEEN).unwrap();
    assert_eq!(ids.len(), 3);
    engine.run_until(ids[2]).await.unwrap();

    assert_eq!(
        transcript(&sent),
        "A00001 UID STORE 101,103 +FLAGS.SILENT (\\Seen)\r\n\
         A00002 UID STORE 105,107 +FLAGS.SILENT (\\Seen)\r\n\
         A00003 UID STORE 109,111 +FLAGS.SILENT (\\Seen)\r\n"
    );
}

#[tokio::test]
async fn test_expunge_renumbers_held_records() {
    let (stream, _sent) = MockStream::new(concat!(
        "* OK ready\r\n",
        "* 3 EXPUNGE\r\n",
        "* 3 EXISTS\r\n",
        "A00001 OK NOOP completed\r\n",
    ));
    let mut engine = Engine::with_tag_prefix('A');
    engine.take_stream(stream).await.unwrap();
    engine.state_mut().connection = ConnectionState::Selected;
    {
        let selected = &mut engine.state_mut().selected;
        selected.folder = Some(Folder::new("INBOX"));
        for uid in [21, 22, 23, 24] {
            selected
                .records
                .push(MessageRecord::new(Uid::new(uid).unwrap(), FlagSet::EMPTY));
        }
        selected.exists = 4;
    }

    let id = engine.queue(None, CommandSpec::noop()).unwrap();
    engine.run_until(id).await.unwrap();

    let records = &engine.state().selected.records;
    assert_eq!(records.len(), 3);
    // Record 24 moved down into the expunged slot.
    assert_eq!(records.get(3).unwrap().uid, Uid::new(24).unwrap());
    assert_eq!(engine.state().selected.exists, 3);
}

#[test]
fn test_uid_set_wire_form() {
    let input: Vec<UidPos> = [(1, 1), (2, 2), (3, 3), (7, 7), (8, 8), (10, 10)]
        .into_iter()
        .map(|(uid, pos)| UidPos::new(uid, pos).unwrap())
        .collect();
    let chunk = compress_uids(&input, 64);
    assert_eq!(chunk.set, "1:3,7:8,10");
    assert_eq!(chunk.consumed, 6);
}

#[test]
fn test_flag_names_round_trip() {
    for name in ["\\Seen", "\\Answered", "\\Flagged", "\\Deleted", "\\Draft"] {
        let set = FlagSet::from_name(name).unwrap();
        assert_eq!(set.to_string(), name);
    }
    // Keyword flags are not modeled.
    assert!(FlagSet::from_name("$Important").is_none());
}

#[test]
fn test_capability_tracking() {
    let mut caps = Capabilities::default();
    assert!(caps.apply("IMAP4rev1"));
    assert!(caps.apply("LITERAL+"));
    assert!(caps.apply("AUTH=PLAIN"));
    assert!(caps.has(Caps::IMAP4REV1));
    assert!(caps.has(Caps::LITERAL_PLUS));
    assert_eq!(caps.auth_mechanisms(), ["PLAIN"]);
}
