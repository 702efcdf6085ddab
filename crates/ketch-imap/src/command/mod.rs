//! Queued commands and their execution record.
//!
//! A [`Command`] is built from a [`CommandSpec`] when it is queued and
//! keeps the durable record of its execution: status, tagged result,
//! accumulated response codes and any collected untagged data. The engine
//! drives it part by part; the command itself is plain data.

mod builder;
mod literal;
mod tag;

pub use builder::CommandSpec;
pub use literal::{LiteralPayload, LiteralSource};

pub(crate) use builder::Part;
pub(crate) use tag::TagSequencer;

use std::fmt;

use crate::error::Result;
use crate::summary::FetchStage;
use crate::types::{CommandId, Folder, ListEntry, ResponseCode, StatusSummary};

/// Execution status of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    /// Waiting in the engine's queue.
    Queued,
    /// Currently being driven against the connection.
    Active,
    /// Finished with a tagged result.
    Complete,
    /// Aborted by an I/O or protocol failure; see [`Command::failure`].
    Error,
}

/// Tagged completion result reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommandResult {
    /// No tagged response observed yet.
    #[default]
    None,
    /// `OK`
    Ok,
    /// `NO`
    No,
    /// `BAD`
    Bad,
}

impl CommandResult {
    /// True for a tagged `OK`.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Where a command's untagged data lands.
///
/// Each variant answers the untagged keyword it names; anything else the
/// engine does not understand itself is drained and ignored. This makes
/// the dispatch exhaustive instead of a string-keyed callback table.
#[derive(Debug, Default)]
pub enum Collector {
    /// No command-specific untagged data expected.
    #[default]
    None,
    /// `* <n> FETCH (...)`, staged by sequence number.
    Fetch(FetchStage),
    /// `* SEARCH <n>...`
    Search(Vec<u32>),
    /// `* LIST (...) <sep> <name>`, also LSUB.
    List(Vec<ListEntry>),
    /// `* STATUS <name> (...)`
    Status(Vec<StatusSummary>),
}

impl Collector {
    /// Drops collected data but keeps the collector kind, so a retried
    /// command does not see duplicates.
    fn clear(&mut self) {
        match self {
            Self::None => {}
            Self::Fetch(stage) => stage.clear(),
            Self::Search(hits) => hits.clear(),
            Self::List(entries) => entries.clear(),
            Self::Status(rows) => rows.clear(),
        }
    }
}

/// Produces the client's next exchange line from the server's
/// continuation text (CRLF excluded), e.g. one SASL step. Returning an
/// error aborts the command.
pub type ContinuationFn = Box<dyn FnMut(&str) -> Result<Vec<u8>> + Send>;

/// A queued or executed IMAP command.
pub struct Command {
    pub(crate) id: CommandId,
    tag: Option<String>,
    verb: String,
    folder: Option<Folder>,
    parts: Vec<Part>,
    cursor: usize,
    status: CommandStatus,
    result: CommandResult,
    response_codes: Vec<ResponseCode>,
    collector: Collector,
    pub(crate) continuation: Option<ContinuationFn>,
    failure: Option<String>,
    pub(crate) synthetic: bool,
}

impl Command {
    pub(crate) fn build(
        spec: CommandSpec,
        literal_plus: bool,
        id: CommandId,
        folder: Option<Folder>,
    ) -> Result<Self> {
        let verb = spec.verb().to_string();
        let parts = spec.into_parts(literal_plus)?;
        Ok(Self {
            id,
            tag: None,
            verb,
            folder,
            parts,
            cursor: 0,
            status: CommandStatus::Queued,
            result: CommandResult::None,
            response_codes: Vec::new(),
            collector: Collector::None,
            continuation: None,
            failure: None,
            synthetic: false,
        })
    }

    /// Queue-order id, assigned when the command was queued.
    #[must_use]
    pub const fn id(&self) -> CommandId {
        self.id
    }

    /// The connection tag, assigned on the first execution step.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    /// Full verb text, e.g. `UID FETCH`.
    #[must_use]
    pub fn verb(&self) -> &str {
        &self.verb
    }

    /// First word of the verb, used for connection-state transitions.
    #[must_use]
    pub fn leading_verb(&self) -> &str {
        self.verb.split_whitespace().next().unwrap_or(&self.verb)
    }

    /// The folder this command targets, if any.
    #[must_use]
    pub const fn folder(&self) -> Option<&Folder> {
        self.folder.as_ref()
    }

    /// Current execution status.
    #[must_use]
    pub const fn status(&self) -> CommandStatus {
        self.status
    }

    /// Tagged result, [`CommandResult::None`] until completion.
    #[must_use]
    pub const fn result(&self) -> CommandResult {
        self.result
    }

    /// Response codes retained from this command's response lines.
    #[must_use]
    pub fn response_codes(&self) -> &[ResponseCode] {
        &self.response_codes
    }

    /// Failure detail when [`Command::status`] is [`CommandStatus::Error`].
    #[must_use]
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// True for commands the engine inserted itself, e.g. the implicit
    /// SELECT ahead of a command that needs a different folder.
    #[must_use]
    pub const fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Sets where untagged data for this command is collected.
    pub fn set_collector(&mut self, collector: Collector) {
        self.collector = collector;
    }

    /// Installs the continuation handler for a multi-step exchange such
    /// as `AUTHENTICATE`.
    pub fn set_continuation(&mut self, handler: ContinuationFn) {
        self.continuation = Some(handler);
    }

    /// Claims the collected untagged data, leaving [`Collector::None`].
    pub fn take_collector(&mut self) -> Collector {
        std::mem::take(&mut self.collector)
    }

    /// Returns the command to [`CommandStatus::Queued`]: clears the tag,
    /// result, response codes and failure detail, rewinds the part cursor
    /// and drops collected data. Lets a caller requeue after a
    /// recoverable rejection, e.g. retry once a missing folder has been
    /// created.
    pub fn reset(&mut self) {
        self.tag = None;
        self.status = CommandStatus::Queued;
        self.result = CommandResult::None;
        self.response_codes.clear();
        self.cursor = 0;
        self.failure = None;
        self.collector.clear();
    }

    pub(crate) fn assign_tag(&mut self, tag: String) {
        debug_assert!(self.tag.is_none(), "tag assigned twice");
        self.tag = Some(tag);
    }

    pub(crate) const fn needs_tag(&self) -> bool {
        self.tag.is_none()
    }

    pub(crate) fn current_part(&self) -> Option<&Part> {
        self.parts.get(self.cursor)
    }

    pub(crate) fn advance_part(&mut self) {
        self.cursor += 1;
    }

    pub(crate) const fn set_status(&mut self, status: CommandStatus) {
        self.status = status;
    }

    pub(crate) const fn set_result(&mut self, result: CommandResult) {
        self.result = result;
    }

    pub(crate) fn push_response_code(&mut self, code: ResponseCode) {
        self.response_codes.push(code);
    }

    pub(crate) fn take_response_codes(&mut self) -> Vec<ResponseCode> {
        std::mem::take(&mut self.response_codes)
    }

    pub(crate) fn append_response_codes(&mut self, codes: Vec<ResponseCode>) {
        self.response_codes.extend(codes);
    }

    pub(crate) fn fail(&mut self, message: impl Into<String>) {
        self.status = CommandStatus::Error;
        self.failure = Some(message.into());
    }

    pub(crate) const fn collector_mut(&mut self) -> &mut Collector {
        &mut self.collector
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("verb", &self.verb)
            .field("status", &self.status)
            .field("result", &self.result)
            .field("parts", &self.parts.len())
            .field("cursor", &self.cursor)
            .finish_non_exhaustive()
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

    fn command(spec: CommandSpec) -> Command {
        Command::build(spec, false, CommandId(1), None).unwrap()
    }

    mod lifecycle {
        use super::*;

        #[test]
        fn starts_queued_without_a_tag() {
            let cmd = command(CommandSpec::login("u", "p"));
            assert_eq!(cmd.status(), CommandStatus::Queued);
            assert_eq!(cmd.result(), CommandResult::None);
            assert!(cmd.needs_tag());
            assert!(cmd.response_codes().is_empty());
        }

        #[test]
        fn reset_rewinds_everything_durable() {
            let mut cmd = command(CommandSpec::select(&Folder::new("INBOX")));
            cmd.assign_tag("A00001".to_string());
            cmd.set_status(CommandStatus::Complete);
            cmd.set_result(CommandResult::No);
            cmd.push_response_code(ResponseCode::TryCreate);
            cmd.advance_part();

            cmd.reset();

            assert_eq!(cmd.status(), CommandStatus::Queued);
            assert_eq!(cmd.result(), CommandResult::None);
            assert!(cmd.tag().is_none());
            assert!(cmd.response_codes().is_empty());
            assert!(cmd.current_part().is_some());
            assert!(cmd.failure().is_none());
        }

        #[test]
        fn fail_records_the_detail() {
            let mut cmd = command(CommandSpec::noop());
            cmd.fail("connection reset");
            assert_eq!(cmd.status(), CommandStatus::Error);
            assert_eq!(cmd.failure(), Some("connection reset"));
        }
    }

    mod parts {
        use super::*;

        #[test]
        fn cursor_walks_the_parts() {
            let spec = CommandSpec::new("X").literal(LiteralPayload::Text("abc".to_string()));
            let mut cmd = command(spec);
            assert!(cmd.current_part().unwrap().literal.is_some());
            cmd.advance_part();
            assert!(cmd.current_part().unwrap().literal.is_none());
            cmd.advance_part();
            assert!(cmd.current_part().is_none());
        }
    }

    mod collectors {
        use super::*;

        #[test]
        fn take_leaves_none_behind() {
            let mut cmd = command(CommandSpec::list("", "*"));
            cmd.set_collector(Collector::List(Vec::new()));
            assert!(matches!(cmd.take_collector(), Collector::List(_)));
            assert!(matches!(cmd.take_collector(), Collector::None));
        }

        #[test]
        fn reset_clears_data_but_keeps_the_kind() {
            let mut cmd = command(CommandSpec::new("SEARCH").atom("UNSEEN"));
            cmd.set_collector(Collector::Search(vec![3, 9]));
            cmd.reset();
            match cmd.take_collector() {
                Collector::Search(hits) => assert!(hits.is_empty()),
                other => panic!("collector kind changed: {other:?}"),
            }
        }
    }
}
