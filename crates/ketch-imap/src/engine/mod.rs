//! Command queue and response dispatch for one IMAP connection.
//!
//! The [`Engine`] owns the token stream, a FIFO of built commands and
//! the session state. Callers queue commands, then drive the connection
//! with [`Engine::iterate`]: each call executes exactly one command to
//! completion, feeding untagged responses into the session state or the
//! active command's collector as they arrive. Commands bound to a
//! folder other than the selected one get a SELECT slipped in ahead of
//! them automatically.

mod decode;
mod state;

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace};

use crate::command::{
    Collector, Command, CommandResult, CommandSpec, CommandStatus, TagSequencer,
};
use crate::error::{Error, Result};
use crate::events::{EngineEvents, NoopEvents};
use crate::lexer::{Token, TokenStream};
use crate::types::{Caps, CommandId, Folder, ResponseCode, Uid, UidValidity};

pub use state::{ConnectionState, EngineState, Greeting, SelectedState};

use decode::{
    drain_code, read_capabilities, read_fetch_record, read_flag_list, read_list_entry,
    read_namespaces, read_search_hits, read_status,
};

/// Restores a lost connection.
///
/// The callback owns dialing, [`Engine::take_stream`] and whatever
/// re-authentication the session needs; on success the engine must be
/// connected again. The engine guards against re-entry, so a nested
/// [`Engine::iterate`] from inside the callback will not start a second
/// reconnect.
pub trait Reconnect<S>: Send {
    /// Re-establishes transport and session.
    fn reconnect<'a>(
        &'a mut self,
        engine: &'a mut Engine<S>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

/// Classification of one handled untagged line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Untagged {
    Ok,
    No,
    Bad,
    PreAuth,
    Bye,
    Handled,
}

/// What one [`Engine::step`] round achieved.
enum StepOutcome {
    /// Parts remain to send; call again.
    More,
    /// The tagged completion line arrived.
    Finished,
}

/// First id handed out by [`Engine::queue`]. Ids below it stay free for
/// commands prequeued ahead of the very first one, which keeps queue
/// ids stable in the common case.
const FIRST_QUEUE_ID: u32 = 2;

/// Driver for one IMAP connection.
pub struct Engine<S> {
    stream: Option<TokenStream<S>>,
    state: EngineState,
    tags: TagSequencer,
    queue: VecDeque<Command>,
    done: Vec<Command>,
    next_id: u32,
    reconnect: Option<Box<dyn Reconnect<S>>>,
    reconnecting: bool,
    events: Box<dyn EngineEvents>,
}

impl<S> fmt::Debug for Engine<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .field("queued", &self.queue.len())
            .field("done", &self.done.len())
            .finish_non_exhaustive()
    }
}

impl<S> Engine<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// An engine with no transport attached and a random tag prefix.
    #[must_use]
    pub fn new() -> Self {
        Self::with_sequencer(TagSequencer::rotating())
    }

    /// An engine whose tags use a fixed prefix, for predictable wire
    /// output.
    #[must_use]
    pub fn with_tag_prefix(prefix: char) -> Self {
        Self::with_sequencer(TagSequencer::with_prefix(prefix))
    }

    fn with_sequencer(tags: TagSequencer) -> Self {
        Self {
            stream: None,
            state: EngineState::new(),
            tags,
            queue: VecDeque::new(),
            done: Vec::new(),
            next_id: FIRST_QUEUE_ID,
            reconnect: None,
            reconnecting: false,
            events: Box::new(NoopEvents),
        }
    }

    /// Session state: connection phase, capabilities, namespaces and
    /// the selected folder.
    #[must_use]
    pub const fn state(&self) -> &EngineState {
        &self.state
    }

    /// Mutable session state, for callers that keep their own folder
    /// bookkeeping in it.
    pub const fn state_mut(&mut self) -> &mut EngineState {
        &mut self.state
    }

    /// Current connection phase.
    #[must_use]
    pub const fn connection(&self) -> ConnectionState {
        self.state.connection
    }

    /// Installs the sink for alerts and other session notifications.
    pub fn set_events(&mut self, events: Box<dyn EngineEvents>) {
        self.events = events;
    }

    /// Installs the reconnect callback invoked when [`Engine::iterate`]
    /// finds the connection gone.
    pub fn set_reconnect(&mut self, callback: Box<dyn Reconnect<S>>) {
        self.reconnect = Some(callback);
    }

    /// Number of commands waiting to execute.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Attaches a connected byte stream and classifies the server's
    /// greeting.
    ///
    /// [`Greeting::Ok`] leaves the session connected and waiting to
    /// authenticate, [`Greeting::PreAuth`] starts it authenticated, and
    /// [`Greeting::Bye`] means the server refused service; nothing is
    /// attached in that case.
    ///
    /// # Errors
    ///
    /// [`Error::Greeting`] when the first line is not an untagged
    /// status, plus any transport or parse failure reading it.
    pub async fn take_stream(&mut self, transport: S) -> Result<Greeting> {
        let mut stream = TokenStream::new(transport);
        self.state.connection = ConnectionState::Connected;
        let first = match stream.next_token().await {
            Ok(token) => token,
            Err(err) => {
                self.state.connection = ConnectionState::Disconnected;
                return Err(err);
            }
        };
        if first != Token::Asterisk {
            self.state.connection = ConnectionState::Disconnected;
            return Err(Error::Greeting(format!(
                "expected untagged greeting, got {first}"
            )));
        }
        let kind =
            match dispatch_untagged(&mut stream, &mut self.state, self.events.as_mut(), None).await
            {
                Ok(kind) => kind,
                Err(err) => {
                    self.state.connection = ConnectionState::Disconnected;
                    return Err(err);
                }
            };
        match kind {
            Untagged::Ok => {
                self.stream = Some(stream);
                Ok(Greeting::Ok)
            }
            Untagged::PreAuth => {
                self.stream = Some(stream);
                Ok(Greeting::PreAuth)
            }
            Untagged::Bye => {
                self.state.connection = ConnectionState::Disconnected;
                Ok(Greeting::Bye)
            }
            Untagged::No | Untagged::Bad | Untagged::Handled => {
                self.state.connection = ConnectionState::Disconnected;
                Err(Error::Greeting(
                    "greeting was not OK, PREAUTH or BYE".to_string(),
                ))
            }
        }
    }

    /// Builds a command and queues it at the back.
    ///
    /// `folder` names the mailbox the command operates on; when it is
    /// not the selected one at execution time, the engine inserts a
    /// SELECT ahead of the command.
    ///
    /// # Errors
    ///
    /// [`Error::Literal`] when a literal payload cannot be sized.
    pub fn queue(&mut self, folder: Option<Folder>, spec: CommandSpec) -> Result<CommandId> {
        let id = CommandId(self.next_id);
        self.next_id += 1;
        let cmd = self.build(spec, id, folder)?;
        debug!(%id, verb = cmd.verb(), "queued");
        self.queue.push_back(cmd);
        Ok(id)
    }

    /// Builds a command and queues it at the front, ahead of everything
    /// waiting.
    ///
    /// The new command's id slots in below the current head's so that
    /// completion ids stay non-decreasing. When the head already holds
    /// the lowest id, every queued id shifts up by one to make room.
    ///
    /// # Errors
    ///
    /// [`Error::Literal`] when a literal payload cannot be sized.
    pub fn prequeue(&mut self, folder: Option<Folder>, spec: CommandSpec) -> Result<CommandId> {
        let head_id = self.queue.front().map_or(self.next_id, |cmd| cmd.id.get());
        let id = if head_id > 1 {
            head_id - 1
        } else {
            for cmd in &mut self.queue {
                cmd.id = CommandId(cmd.id.get() + 1);
            }
            self.next_id += 1;
            1
        };
        let cmd = self.build(spec, CommandId(id), folder)?;
        debug!(id = %cmd.id(), verb = cmd.verb(), "prequeued");
        self.queue.push_front(cmd);
        Ok(CommandId(id))
    }

    fn build(&self, spec: CommandSpec, id: CommandId, folder: Option<Folder>) -> Result<Command> {
        let literal_plus = self.state.capabilities.has(Caps::LITERAL_PLUS);
        Command::build(spec, literal_plus, id, folder)
    }

    fn prequeue_select(&mut self, folder: &Folder) -> Result<CommandId> {
        let id = self.prequeue(Some(folder.clone()), CommandSpec::select(folder))?;
        if let Some(cmd) = self.queue.front_mut() {
            cmd.synthetic = true;
        }
        Ok(id)
    }

    /// Removes a command that has not started executing.
    pub fn dequeue(&mut self, id: CommandId) -> Option<Command> {
        let index = self.queue.iter().position(|cmd| cmd.id == id)?;
        self.queue.remove(index)
    }

    /// Mutable access to a queued command, e.g. to attach a collector
    /// or continuation handler before it runs.
    pub fn command_mut(&mut self, id: CommandId) -> Option<&mut Command> {
        self.queue.iter_mut().find(|cmd| cmd.id == id)
    }

    /// Claims a finished command.
    pub fn take_completed(&mut self, id: CommandId) -> Option<Command> {
        let index = self.done.iter().position(|cmd| cmd.id == id)?;
        Some(self.done.remove(index))
    }

    /// Resets a claimed command and queues it again under a fresh id,
    /// e.g. to retry after creating a missing folder.
    pub fn requeue(&mut self, mut cmd: Command) -> CommandId {
        cmd.reset();
        let id = CommandId(self.next_id);
        self.next_id += 1;
        cmd.id = id;
        self.queue.push_back(cmd);
        id
    }

    /// Executes the queue head to completion.
    ///
    /// Returns the finished command's id, or `None` when the queue is
    /// empty. A server rejection still finishes the command, with
    /// [`CommandResult::No`] or [`CommandResult::Bad`] recorded on it;
    /// `Err` is reserved for transport and protocol failures, after
    /// which the failed command waits in the finished set carrying the
    /// error detail.
    ///
    /// When the connection is down this first runs the reconnect
    /// callback; if that fails, the head command is failed with the
    /// reconnect error.
    ///
    /// # Errors
    ///
    /// [`Error::Io`]/[`Error::Closed`] for transport loss (the engine
    /// is disconnected afterwards), [`Error::Parse`] for protocol
    /// violations, [`Error::Reconnect`] when the connection could not
    /// be restored.
    pub async fn iterate(&mut self) -> Result<Option<CommandId>> {
        if self.queue.is_empty() {
            return Ok(None);
        }
        if let Err(err) = self.ensure_connected().await {
            if let Some(mut cmd) = self.queue.pop_front() {
                cmd.fail(err.to_string());
                self.done.push(cmd);
            }
            return Err(err);
        }

        if let Some(folder) = self.pending_select() {
            self.prequeue_select(&folder)?;
        }

        let Some(mut cmd) = self.queue.pop_front() else {
            return Ok(None);
        };
        cmd.set_status(CommandStatus::Active);
        debug!(id = %cmd.id(), verb = cmd.verb(), "executing");

        // SELECT wipes the previous mailbox's state up front so the
        // untagged FLAGS/EXISTS lines land in a fresh slate.
        if matches!(cmd.leading_verb(), "SELECT" | "EXAMINE") {
            match cmd.folder() {
                Some(folder) => self.state.selected.reselect(folder.clone()),
                None => self.state.selected = SelectedState::default(),
            }
            if cmd.leading_verb() == "EXAMINE" {
                self.state.selected.read_only = true;
            }
        }

        let outcome = loop {
            match self.step(&mut cmd).await {
                Ok(StepOutcome::More) => {}
                Ok(StepOutcome::Finished) => break Ok(()),
                Err(err) => break Err(err),
            }
        };

        match outcome {
            Ok(()) => Ok(Some(self.settle(cmd))),
            Err(err) => {
                if err.is_disconnect() {
                    self.stream = None;
                    self.state.connection = ConnectionState::Disconnected;
                }
                debug!(id = %cmd.id(), error = %err, "command failed");
                cmd.fail(err.to_string());
                if !cmd.is_synthetic() {
                    self.done.push(cmd);
                }
                Err(err)
            }
        }
    }

    /// Iterates until the command with `id`, or any later one, has
    /// finished.
    ///
    /// # Errors
    ///
    /// Everything [`Engine::iterate`] can fail with, plus
    /// [`Error::State`] when the queue drains without reaching `id`.
    pub async fn run_until(&mut self, id: CommandId) -> Result<()> {
        loop {
            match self.iterate().await? {
                Some(done) if done >= id => return Ok(()),
                Some(_) => {}
                None => return Err(Error::state(format!("command {id} is not queued"))),
            }
        }
    }

    /// Drops the transport and fails everything still queued, for
    /// callers abandoning the connection instead of logging out.
    pub fn teardown(&mut self) {
        self.stream = None;
        self.state.connection = ConnectionState::Disconnected;
        while let Some(mut cmd) = self.queue.pop_front() {
            cmd.fail("connection torn down");
            self.done.push(cmd);
        }
    }

    /// The folder the queue head needs selected first, if any.
    fn pending_select(&self) -> Option<Folder> {
        let head = self.queue.front()?;
        let folder = head.folder()?;
        if self.state.selected.is_current(folder)
            || matches!(head.leading_verb(), "SELECT" | "EXAMINE")
        {
            return None;
        }
        Some(folder.clone())
    }

    async fn ensure_connected(&mut self) -> Result<()> {
        let alive = self.stream.as_ref().is_some_and(|s| !s.is_closed())
            && self.state.connection.is_connected();
        if alive || self.reconnecting {
            return Ok(());
        }
        let Some(mut callback) = self.reconnect.take() else {
            return Err(Error::Reconnect(
                "connection lost and no reconnect callback is set".to_string(),
            ));
        };
        debug!("reconnecting");
        self.reconnecting = true;
        let outcome = callback.reconnect(self).await;
        self.reconnecting = false;
        self.reconnect = Some(callback);
        outcome?;
        if self.stream.is_none() || !self.state.connection.is_connected() {
            return Err(Error::Reconnect(
                "reconnect callback left the engine disconnected".to_string(),
            ));
        }
        Ok(())
    }

    /// Sends the command's current part, then reads responses until the
    /// round ends: a continuation advancing to the next part, or the
    /// tagged completion line.
    async fn step(&mut self, cmd: &mut Command) -> Result<StepOutcome> {
        let Self {
            stream,
            state,
            events,
            tags,
            ..
        } = self;
        let stream = stream.as_mut().ok_or(Error::Closed)?;

        let fresh_tag = if cmd.needs_tag() {
            Some(tags.allocate())
        } else {
            None
        };
        {
            let part = cmd
                .current_part()
                .ok_or_else(|| Error::state("command has no part left to send"))?;
            let mut wire = Vec::with_capacity(part.buffer.len() + 8);
            if let Some(tag) = &fresh_tag {
                wire.extend_from_slice(tag.as_bytes());
                wire.push(b' ');
            }
            wire.extend_from_slice(&part.buffer);
            stream.send(&wire).await?;
            stream.flush().await?;
        }
        if let Some(tag) = fresh_tag {
            cmd.assign_tag(tag);
        }

        loop {
            match stream.next_token().await? {
                Token::Plus => {
                    let prompt = stream.read_line().await?;
                    trace!(prompt = prompt.trim(), "continuation");
                    let staged = match cmd.current_part().and_then(|part| part.literal.as_ref()) {
                        Some(payload) => {
                            let mut bytes = Vec::new();
                            payload.write_wire(&mut bytes)?;
                            Some(bytes)
                        }
                        None => None,
                    };
                    if let Some(bytes) = staged {
                        stream.send(&bytes).await?;
                        stream.flush().await?;
                        cmd.advance_part();
                        if cmd.current_part().is_some() {
                            return Ok(StepOutcome::More);
                        }
                    } else if let Some(handler) = cmd.continuation.as_mut() {
                        let reply = handler(prompt.trim())
                            .map_err(|err| Error::Continuation(err.to_string()))?;
                        stream.send(&reply).await?;
                        stream.send(b"\r\n").await?;
                        stream.flush().await?;
                    } else {
                        return Err(Error::Continuation(
                            "server continuation with no literal or handler pending".to_string(),
                        ));
                    }
                }
                Token::Asterisk => {
                    dispatch_untagged(stream, state, events.as_mut(), Some(&mut *cmd)).await?;
                }
                Token::Atom(atom) if cmd.tag() == Some(atom.as_str()) => {
                    let result = match stream.next_token().await? {
                        Token::Atom(verdict) => match verdict.to_ascii_uppercase().as_str() {
                            "OK" => CommandResult::Ok,
                            "NO" => CommandResult::No,
                            "BAD" => CommandResult::Bad,
                            other => {
                                return Err(Error::parse(format!(
                                    "unexpected tagged verdict {other}"
                                )));
                            }
                        },
                        other => {
                            return Err(Error::parse(format!("unexpected {other} after tag")));
                        }
                    };
                    read_tail_codes(stream, state, Some(&mut *cmd), events.as_mut()).await?;
                    cmd.set_result(result);
                    return Ok(StepOutcome::Finished);
                }
                Token::Eof => return Err(Error::Closed),
                other => {
                    let rest = stream.read_line().await.unwrap_or_default();
                    return Err(Error::parse(format!(
                        "unexpected response line starting {other}{rest}"
                    )));
                }
            }
        }
    }

    /// Finishes a command that got its tagged line: applies state
    /// transitions and routes it to the finished set. Synthetic SELECTs
    /// are claimed by the engine; on rejection their diagnosis is
    /// transplanted onto the command they were opening the folder for.
    fn settle(&mut self, mut cmd: Command) -> CommandId {
        cmd.set_status(CommandStatus::Complete);
        if cmd.result().is_ok() {
            self.apply_completion(&cmd);
        } else if matches!(cmd.leading_verb(), "SELECT" | "EXAMINE") {
            // A failed open leaves no mailbox selected.
            self.state.selected = SelectedState::default();
            if self.state.connection == ConnectionState::Selected {
                self.state.connection = ConnectionState::Authenticated;
            }
        }

        let id = cmd.id();
        if !cmd.is_synthetic() {
            self.done.push(cmd);
            return id;
        }
        if cmd.result().is_ok() {
            trace!(%id, "folder opened");
            return id;
        }
        match self.queue.pop_front() {
            Some(mut victim) => {
                victim.append_response_codes(cmd.take_response_codes());
                victim.set_result(cmd.result());
                victim.set_status(CommandStatus::Complete);
                let victim_id = victim.id();
                debug!(id = %victim_id, "folder open failed, command inherits the rejection");
                self.done.push(victim);
                victim_id
            }
            None => id,
        }
    }

    fn apply_completion(&mut self, cmd: &Command) {
        match cmd.leading_verb() {
            "LOGIN" | "AUTHENTICATE" => {
                if self.state.connection == ConnectionState::Connected {
                    self.state.connection = ConnectionState::Authenticated;
                }
            }
            "SELECT" | "EXAMINE" => {
                self.state.connection = ConnectionState::Selected;
                for code in cmd.response_codes() {
                    match code {
                        ResponseCode::PermanentFlags(set) => {
                            self.state.selected.permanent_flags = *set;
                        }
                        ResponseCode::ReadOnly => self.state.selected.read_only = true,
                        ResponseCode::ReadWrite => self.state.selected.read_only = false,
                        ResponseCode::UidNext(uid) => self.state.selected.uid_next = Some(*uid),
                        ResponseCode::UidValidity(validity) => {
                            self.state.selected.uid_validity = Some(*validity);
                        }
                        ResponseCode::Unseen(n) => self.state.selected.unseen = Some(*n),
                        _ => {}
                    }
                }
            }
            "CLOSE" => {
                self.state.selected = SelectedState::default();
                if self.state.connection == ConnectionState::Selected {
                    self.state.connection = ConnectionState::Authenticated;
                }
            }
            "LOGOUT" => {
                self.state.connection = ConnectionState::Disconnected;
                self.stream = None;
            }
            _ => {}
        }
    }
}

impl<S> Default for Engine<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Handles one untagged line after its `*` token. Every branch consumes
/// through the line terminator.
async fn dispatch_untagged<S>(
    stream: &mut TokenStream<S>,
    state: &mut EngineState,
    events: &mut dyn EngineEvents,
    active: Option<&mut Command>,
) -> Result<Untagged>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match stream.next_token().await? {
        Token::Number(n) => dispatch_numbered(stream, state, events, active, n).await,
        Token::Atom(keyword) => {
            let upper = keyword.to_ascii_uppercase();
            match upper.as_str() {
                "OK" => {
                    read_tail_codes(stream, state, active, events).await?;
                    Ok(Untagged::Ok)
                }
                "NO" => {
                    read_tail_codes(stream, state, active, events).await?;
                    Ok(Untagged::No)
                }
                "BAD" => {
                    read_tail_codes(stream, state, active, events).await?;
                    Ok(Untagged::Bad)
                }
                "PREAUTH" => {
                    if state.connection == ConnectionState::Connected {
                        state.connection = ConnectionState::Authenticated;
                    }
                    if stream.peek_significant().await? != Some(b'[') {
                        return Err(Error::parse("PREAUTH greeting without a response code"));
                    }
                    read_response_code(stream, state, active, events).await?;
                    Ok(Untagged::PreAuth)
                }
                "BYE" => {
                    // Best effort: the connection is going away anyway,
                    // so a read failure here is not itself an error.
                    let text = stream.read_line().await.unwrap_or_default();
                    debug!(text = text.trim(), "server said BYE");
                    events.bye(text.trim());
                    state.connection = ConnectionState::Disconnected;
                    Ok(Untagged::Bye)
                }
                "CAPABILITY" => {
                    state.capabilities.reset();
                    read_capabilities(stream, &mut state.capabilities, &Token::Crlf).await?;
                    Ok(Untagged::Handled)
                }
                "FLAGS" => {
                    state.selected.flags = read_flag_list(stream).await?;
                    stream.read_line().await?;
                    Ok(Untagged::Handled)
                }
                "NAMESPACE" => {
                    state.namespaces = read_namespaces(stream).await?;
                    stream.read_line().await?;
                    Ok(Untagged::Handled)
                }
                "LIST" | "LSUB" => {
                    let entry = read_list_entry(stream).await?;
                    stream.read_line().await?;
                    if let Some(cmd) = active
                        && let Collector::List(entries) = cmd.collector_mut()
                    {
                        entries.push(entry);
                    } else {
                        events.ignored(&upper);
                    }
                    Ok(Untagged::Handled)
                }
                "STATUS" => {
                    let summary = read_status(stream).await?;
                    stream.read_line().await?;
                    if let Some(cmd) = active
                        && let Collector::Status(rows) = cmd.collector_mut()
                    {
                        rows.push(summary);
                    } else {
                        events.ignored("STATUS");
                    }
                    Ok(Untagged::Handled)
                }
                "SEARCH" => {
                    if let Some(cmd) = active
                        && let Collector::Search(hits) = cmd.collector_mut()
                    {
                        read_search_hits(stream, hits).await?;
                    } else {
                        events.ignored("SEARCH");
                        stream.read_line().await?;
                    }
                    Ok(Untagged::Handled)
                }
                _ => {
                    trace!(keyword = %upper, "ignoring untagged line");
                    events.ignored(&upper);
                    stream.read_line().await?;
                    Ok(Untagged::Handled)
                }
            }
        }
        Token::Eof => Err(Error::Closed),
        other => {
            stream.read_line().await?;
            Err(Error::parse(format!("unexpected untagged {other}")))
        }
    }
}

/// Handles `* <n> <keyword>` lines.
async fn dispatch_numbered<S>(
    stream: &mut TokenStream<S>,
    state: &mut EngineState,
    events: &mut dyn EngineEvents,
    active: Option<&mut Command>,
    n: u32,
) -> Result<Untagged>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let keyword = match stream.next_token().await? {
        Token::Atom(keyword) => keyword.to_ascii_uppercase(),
        Token::Eof => return Err(Error::Closed),
        other => {
            return Err(Error::parse(format!(
                "unexpected {other} after untagged number"
            )));
        }
    };
    match keyword.as_str() {
        "EXISTS" => {
            state.selected.exists = n;
            stream.read_line().await?;
        }
        "RECENT" => {
            state.selected.recent = n;
            stream.read_line().await?;
        }
        "EXPUNGE" => {
            if state.selected.records.expunge(n).is_none() {
                trace!(seq = n, "expunge for a sequence not held");
            }
            state.selected.exists = state.selected.exists.saturating_sub(1);
            stream.read_line().await?;
        }
        "FETCH" => {
            let record = read_fetch_record(stream, n).await?;
            stream.read_line().await?;
            if let Some(cmd) = active
                && let Collector::Fetch(stage) = cmd.collector_mut()
            {
                stage.absorb(record);
            } else if let Some(flags) = record.flags {
                // Unsolicited flag change; fold it straight into the
                // record list.
                if let Some(held) = state.selected.records.record_mut(n) {
                    held.absorb_flags(flags);
                } else {
                    events.ignored("FETCH");
                }
            }
        }
        _ => {
            trace!(keyword = %keyword, seq = n, "ignoring numbered line");
            events.ignored(&keyword);
            stream.read_line().await?;
        }
    }
    Ok(Untagged::Handled)
}

/// Consumes the resp-text after OK/NO/BAD: an optional bracketed
/// response code, then the free text through end of line.
async fn read_tail_codes<S>(
    stream: &mut TokenStream<S>,
    state: &mut EngineState,
    active: Option<&mut Command>,
    events: &mut dyn EngineEvents,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if stream.peek_significant().await? == Some(b'[') {
        read_response_code(stream, state, active, events).await?;
    } else {
        stream.read_line().await?;
    }
    Ok(())
}

/// Parses one `[...]` response code plus the line's trailing text.
///
/// Codes naming mailbox facts are retained on the active command;
/// CAPABILITY and BADCHARSET mutate the session instead; ALERT text
/// goes to the event sink; unknown codes are drained without failing.
async fn read_response_code<S>(
    stream: &mut TokenStream<S>,
    state: &mut EngineState,
    active: Option<&mut Command>,
    events: &mut dyn EngineEvents,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream.expect(&Token::LBracket).await?;
    let name = match stream.next_token().await? {
        Token::Atom(name) => name.to_ascii_uppercase(),
        Token::Eof => return Err(Error::Closed),
        other => {
            return Err(Error::parse(format!(
                "unexpected {other} as response code"
            )));
        }
    };
    let code = match name.as_str() {
        "ALERT" => {
            stream.expect(&Token::RBracket).await?;
            let text = stream.read_line().await?;
            events.alert(text.trim());
            return Ok(());
        }
        "CAPABILITY" => {
            state.capabilities.reset();
            read_capabilities(stream, &mut state.capabilities, &Token::RBracket).await?;
            stream.read_line().await?;
            return Ok(());
        }
        "BADCHARSET" => {
            // The server cannot search UTF-8; remember that for query
            // planning.
            state.capabilities.clear(Caps::SEARCH_UTF8);
            if !drain_code(stream).await? {
                stream.read_line().await?;
            }
            return Ok(());
        }
        "PARSE" => ResponseCode::Parse,
        "PERMANENTFLAGS" => ResponseCode::PermanentFlags(read_flag_list(stream).await?),
        "READ-ONLY" => ResponseCode::ReadOnly,
        "READ-WRITE" => ResponseCode::ReadWrite,
        "TRYCREATE" => ResponseCode::TryCreate,
        "UIDNEXT" => ResponseCode::UidNext(read_uid(stream, "UIDNEXT").await?),
        "UIDVALIDITY" => ResponseCode::UidValidity(read_validity(stream).await?),
        "UNSEEN" => ResponseCode::Unseen(stream.read_number().await?),
        "NEWNAME" => ResponseCode::NewName {
            from: stream.read_astring().await?,
            to: stream.read_astring().await?,
        },
        "APPENDUID" => {
            let validity = read_validity(stream).await?;
            let set = stream.read_astring().await?;
            let uid = first_uid_of(&set)
                .ok_or_else(|| Error::parse(format!("bad APPENDUID set {set}")))?;
            ResponseCode::AppendUid { validity, uid }
        }
        "COPYUID" => ResponseCode::CopyUid {
            validity: read_validity(stream).await?,
            source: stream.read_astring().await?,
            dest: stream.read_astring().await?,
        },
        _ => {
            trace!(code = %name, "skipping unknown response code");
            if !drain_code(stream).await? {
                stream.read_line().await?;
            }
            return Ok(());
        }
    };
    stream.expect(&Token::RBracket).await?;
    stream.read_line().await?;
    if code.is_retained()
        && let Some(cmd) = active
    {
        cmd.push_response_code(code);
    }
    Ok(())
}

async fn read_uid<S>(stream: &mut TokenStream<S>, what: &str) -> Result<Uid>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let value = stream.read_number().await?;
    Uid::new(value).ok_or_else(|| Error::parse(format!("{what} 0 in response code")))
}

async fn read_validity<S>(stream: &mut TokenStream<S>) -> Result<UidValidity>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let value = stream.read_number().await?;
    UidValidity::new(value).ok_or_else(|| Error::parse("UIDVALIDITY 0 in response code"))
}

/// First UID of a UID set rendering such as `23` or `23:25,28`.
fn first_uid_of(set: &str) -> Option<Uid> {
    let digits = set.split([':', ',']).next()?;
    Uid::new(digits.parse().ok()?)
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
    use crate::command::LiteralPayload;
    use crate::events::CollectedEvents;
    use crate::summary;
    use crate::types::FlagSet;
    use std::sync::{Arc, Mutex};
    use tokio_test::io::{Builder, Mock};

    fn engine() -> Engine<Mock> {
        Engine::with_tag_prefix('A')
    }

    fn inbox() -> Folder {
        Folder::new("INBOX")
    }

    mod greetings {
        use super::*;

        #[tokio::test]
        async fn plain_ok_stays_connected() {
            let mock = Builder::new().read(b"* OK ready when you are\r\n").build();
            let mut engine = engine();
            let greeting = engine.take_stream(mock).await.unwrap();
            assert_eq!(greeting, Greeting::Ok);
            assert_eq!(engine.connection(), ConnectionState::Connected);
        }

        #[tokio::test]
        async fn ok_greeting_applies_capability_code() {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1 LITERAL+ UIDPLUS] ready\r\n")
                .build();
            let mut engine = engine();
            engine.take_stream(mock).await.unwrap();
            assert!(engine.state().capabilities.has(Caps::IMAP4REV1));
            assert!(engine.state().capabilities.has(Caps::LITERAL_PLUS));
            assert_eq!(engine.connection(), ConnectionState::Connected);
        }

        #[tokio::test]
        async fn preauth_skips_authentication() {
            let mock = Builder::new()
                .read(b"* PREAUTH [CAPABILITY IMAP4rev1] logged in as before\r\n")
                .build();
            let mut engine = engine();
            let greeting = engine.take_stream(mock).await.unwrap();
            assert_eq!(greeting, Greeting::PreAuth);
            assert_eq!(engine.connection(), ConnectionState::Authenticated);
        }

        #[tokio::test]
        async fn preauth_without_code_is_rejected() {
            let mock = Builder::new().read(b"* PREAUTH welcome back\r\n").build();
            let mut engine = engine();
            let err = engine.take_stream(mock).await.unwrap_err();
            assert!(err.to_string().contains("PREAUTH"));
            assert_eq!(engine.connection(), ConnectionState::Disconnected);
        }

        #[tokio::test]
        async fn bye_refuses_service() {
            let mock = Builder::new()
                .read(b"* BYE too many connections\r\n")
                .build();
            let mut engine = engine();
            let greeting = engine.take_stream(mock).await.unwrap();
            assert_eq!(greeting, Greeting::Bye);
            assert_eq!(engine.connection(), ConnectionState::Disconnected);
        }

        #[tokio::test]
        async fn tagged_first_line_is_a_greeting_error() {
            let mock = Builder::new().read(b"A1 OK nope\r\n").build();
            let mut engine = engine();
            let err = engine.take_stream(mock).await.unwrap_err();
            assert!(matches!(err, Error::Greeting(_)));
        }
    }

    mod queueing {
        use super::*;

        #[test]
        fn queue_ids_count_up() {
            let mut engine = engine();
            let a = engine.queue(None, CommandSpec::noop()).unwrap();
            let b = engine.queue(None, CommandSpec::capability()).unwrap();
            assert!(b > a);
        }

        #[test]
        fn prequeue_slots_in_under_the_head() {
            let mut engine = engine();
            let head = engine.queue(None, CommandSpec::noop()).unwrap();
            let front = engine.prequeue(None, CommandSpec::capability()).unwrap();
            assert!(front < head);
            assert_eq!(engine.queue[0].id(), front);
            assert_eq!(engine.queue[1].id(), head);
        }

        #[test]
        fn prequeue_renumbers_when_ids_run_out() {
            let mut engine = engine();
            engine.queue(None, CommandSpec::noop()).unwrap();
            engine.prequeue(None, CommandSpec::capability()).unwrap();
            // The head now holds id 1; making room shifts everything up.
            let front = engine.prequeue(None, CommandSpec::logout()).unwrap();
            assert_eq!(front, CommandId(1));
            let ids: Vec<u32> = engine.queue.iter().map(|cmd| cmd.id().get()).collect();
            assert_eq!(ids, vec![1, 2, 3]);
        }

        #[test]
        fn dequeue_removes_a_waiting_command() {
            let mut engine = engine();
            let id = engine.queue(None, CommandSpec::noop()).unwrap();
            let cmd = engine.dequeue(id).unwrap();
            assert_eq!(cmd.id(), id);
            assert_eq!(engine.queued(), 0);
            assert!(engine.dequeue(id).is_none());
        }

        #[test]
        fn requeue_assigns_a_fresh_id() {
            let mut engine = engine();
            let id = engine.queue(None, CommandSpec::noop()).unwrap();
            let mut cmd = engine.dequeue(id).unwrap();
            cmd.fail("pretend it ran");
            let again = engine.requeue(cmd);
            assert!(again > id);
            assert_eq!(engine.queue[0].status(), CommandStatus::Queued);
        }
    }

    mod execution {
        use super::*;

        #[tokio::test]
        async fn login_completes_and_authenticates() {
            let mock = Builder::new()
                .read(b"* OK ready\r\n")
                .write(b"A00001 LOGIN user secret\r\n")
                .read(b"A00001 OK LOGIN completed\r\n")
                .build();
            let mut engine = engine();
            engine.take_stream(mock).await.unwrap();
            let id = engine
                .queue(None, CommandSpec::login("user", "secret"))
                .unwrap();
            engine.run_until(id).await.unwrap();
            assert_eq!(engine.connection(), ConnectionState::Authenticated);
            let cmd = engine.take_completed(id).unwrap();
            assert_eq!(cmd.status(), CommandStatus::Complete);
            assert!(cmd.result().is_ok());
            assert!(cmd.response_codes().is_empty());
        }

        #[tokio::test]
        async fn rejection_is_a_result_not_an_error() {
            let mock = Builder::new()
                .read(b"* OK ready\r\n")
                .write(b"A00001 LOGIN user wrong\r\n")
                .read(b"A00001 NO [ALERT] bad credentials\r\n")
                .build();
            let shared = Arc::new(Mutex::new(CollectedEvents::default()));
            let mut engine = engine();
            engine.set_events(Box::new(Arc::clone(&shared)));
            engine.take_stream(mock).await.unwrap();
            let id = engine
                .queue(None, CommandSpec::login("user", "wrong"))
                .unwrap();
            engine.run_until(id).await.unwrap();
            let cmd = engine.take_completed(id).unwrap();
            assert_eq!(cmd.result(), CommandResult::No);
            assert_eq!(engine.connection(), ConnectionState::Connected);
            assert_eq!(shared.lock().unwrap().alerts, ["bad credentials"]);
        }

        #[tokio::test]
        async fn literal_plus_sends_in_one_round() {
            let mock = Builder::new()
                .read(b"* OK [CAPABILITY IMAP4rev1 LITERAL+] ready\r\n")
                .write(b"A00001 LOGIN user {8+}\r\npa\"ss\\wd\r\n")
                .read(b"A00001 OK done\r\n")
                .build();
            let mut engine = engine();
            engine.take_stream(mock).await.unwrap();
            let id = engine
                .queue(None, CommandSpec::login("user", "pa\"ss\\wd"))
                .unwrap();
            engine.run_until(id).await.unwrap();
            assert!(engine.take_completed(id).unwrap().result().is_ok());
        }

        #[tokio::test]
        async fn append_waits_for_continuation_between_parts() {
            let body = b"ab\r\n".repeat(1250);
            let mock = Builder::new()
                .read(b"* OK ready\r\n")
                .write(b"A00001 APPEND saved-messages {5000}\r\n")
                .read(b"+ Ready for literal data\r\n")
                .write(&body)
                .write(b"\r\n")
                .read(b"A00001 OK APPEND completed\r\n")
                .build();
            let mut engine = engine();
            engine.take_stream(mock).await.unwrap();
            let id = engine
                .queue(
                    None,
                    CommandSpec::append(
                        &Folder::new("saved-messages"),
                        None,
                        LiteralPayload::Data(body.clone()),
                    ),
                )
                .unwrap();
            engine.run_until(id).await.unwrap();
            assert!(engine.take_completed(id).unwrap().result().is_ok());
        }

        #[tokio::test]
        async fn search_hits_reach_the_collector() {
            let mock = Builder::new()
                .read(b"* OK ready\r\n")
                .write(b"A00001 SEARCH UNSEEN\r\n")
                .read(b"* SEARCH 2 84 882\r\nA00001 OK SEARCH completed\r\n")
                .build();
            let mut engine = engine();
            engine.take_stream(mock).await.unwrap();
            let id = engine
                .queue(None, CommandSpec::new("SEARCH").atom("UNSEEN"))
                .unwrap();
            if let Some(cmd) = engine.command_mut(id) {
                cmd.set_collector(Collector::Search(Vec::new()));
            }
            engine.run_until(id).await.unwrap();
            let mut cmd = engine.take_completed(id).unwrap();
            match cmd.take_collector() {
                Collector::Search(hits) => assert_eq!(hits, vec![2, 84, 882]),
                other => panic!("wrong collector {other:?}"),
            }
        }

        #[tokio::test]
        async fn list_entries_reach_the_collector() {
            let mock = Builder::new()
                .read(b"* OK ready\r\n")
                .write(b"A00001 LIST \"\" \"*\"\r\n")
                .read(b"* LIST (\\Noselect) \"/\" foo\r\n* LIST () \"/\" foo/bar\r\nA00001 OK LIST completed\r\n")
                .build();
            let mut engine = engine();
            engine.take_stream(mock).await.unwrap();
            let id = engine.queue(None, CommandSpec::list("", "*")).unwrap();
            if let Some(cmd) = engine.command_mut(id) {
                cmd.set_collector(Collector::List(Vec::new()));
            }
            engine.run_until(id).await.unwrap();
            let mut cmd = engine.take_completed(id).unwrap();
            match cmd.take_collector() {
                Collector::List(entries) => {
                    assert_eq!(entries.len(), 2);
                    assert_eq!(entries[0].name, "foo");
                    assert_eq!(entries[1].name, "foo/bar");
                }
                other => panic!("wrong collector {other:?}"),
            }
        }

        #[tokio::test]
        async fn badcharset_downgrades_search_planning() {
            let mock = Builder::new()
                .read(b"* OK ready\r\n")
                .write(b"A00001 SEARCH CHARSET UTF-8 ALL\r\n")
                .read(b"A00001 NO [BADCHARSET (US-ASCII)] try again\r\n")
                .build();
            let mut engine = engine();
            engine.take_stream(mock).await.unwrap();
            assert!(engine.state().capabilities.has(Caps::SEARCH_UTF8));
            let id = engine
                .queue(None, CommandSpec::new("SEARCH").atom("CHARSET UTF-8 ALL"))
                .unwrap();
            engine.run_until(id).await.unwrap();
            assert!(!engine.state().capabilities.has(Caps::SEARCH_UTF8));
        }
    }

    mod folder_tracking {
        use super::*;

        #[tokio::test]
        async fn synthetic_select_opens_the_folder_first() {
            let mock = Builder::new()
                .read(b"* OK ready\r\n")
                .write(b"A00001 SELECT INBOX\r\n")
                .read(
                    b"* 3 EXISTS\r\n* 0 RECENT\r\n* FLAGS (\\Seen \\Deleted)\r\n* OK [UIDVALIDITY 857] ok\r\nA00001 OK [READ-WRITE] SELECT completed\r\n",
                )
                .write(b"A00002 FETCH 1:* (UID ALL)\r\n")
                .read(
                    b"* 1 FETCH (UID 9 FLAGS (\\Seen) ENVELOPE (NIL \"hi\" NIL NIL NIL NIL NIL NIL NIL NIL))\r\nA00002 OK FETCH completed\r\n",
                )
                .build();
            let mut engine = engine();
            engine.take_stream(mock).await.unwrap();
            let id = summary::fetch_all(&mut engine, &inbox(), 1, None).unwrap();

            // First round runs the inserted SELECT; the engine claims it.
            let first = engine.iterate().await.unwrap();
            assert_eq!(first, Some(CommandId(1)));
            assert!(engine.take_completed(CommandId(1)).is_none());
            assert_eq!(engine.connection(), ConnectionState::Selected);
            assert_eq!(engine.state().selected.exists, 3);
            assert!(engine.state().selected.uid_validity.is_some());

            // Second round runs the fetch itself.
            let second = engine.iterate().await.unwrap();
            assert_eq!(second, Some(id));
            let outcome = summary::complete_fetch(&mut engine, id).unwrap();
            assert_eq!(outcome.appended, 1);
            let records = &engine.state().selected.records;
            assert_eq!(records.len(), 1);
            assert_eq!(records.get(1).unwrap().uid, Uid::new(9).unwrap());
        }

        #[tokio::test]
        async fn selected_folder_is_not_reopened() {
            let mock = Builder::new()
                .read(b"* OK ready\r\n")
                .write(b"A00001 SELECT INBOX\r\n")
                .read(b"* 0 EXISTS\r\nA00001 OK done\r\n")
                .write(b"A00002 NOOP\r\n")
                .read(b"A00002 OK done\r\n")
                .build();
            let mut engine = engine();
            engine.take_stream(mock).await.unwrap();
            let select = engine
                .queue(Some(inbox()), CommandSpec::select(&inbox()))
                .unwrap();
            engine.run_until(select).await.unwrap();
            let noop = engine.queue(Some(inbox()), CommandSpec::noop()).unwrap();
            engine.run_until(noop).await.unwrap();
            assert!(engine.take_completed(noop).unwrap().result().is_ok());
        }

        #[tokio::test]
        async fn failed_synthetic_select_fails_the_caller_command() {
            let mock = Builder::new()
                .read(b"* OK ready\r\n")
                .write(b"A00001 SELECT Missing\r\n")
                .read(b"A00001 NO [TRYCREATE] no such mailbox\r\n")
                .build();
            let mut engine = engine();
            engine.take_stream(mock).await.unwrap();
            let folder = Folder::new("Missing");
            let id = engine
                .queue(Some(folder.clone()), CommandSpec::noop())
                .unwrap();
            let finished = engine.iterate().await.unwrap();
            // The caller's command reports finished, carrying the
            // SELECT's diagnosis.
            assert_eq!(finished, Some(id));
            let cmd = engine.take_completed(id).unwrap();
            assert_eq!(cmd.result(), CommandResult::No);
            assert!(
                cmd.response_codes()
                    .iter()
                    .any(|code| matches!(code, ResponseCode::TryCreate))
            );
            assert_eq!(engine.connection(), ConnectionState::Connected);
        }

        #[tokio::test]
        async fn expunge_shifts_the_record_list() {
            let mock = Builder::new()
                .read(b"* OK ready\r\n")
                .write(b"A00001 NOOP\r\n")
                .read(b"* 5 EXPUNGE\r\n* 9 EXISTS\r\nA00001 OK NOOP completed\r\n")
                .build();
            let mut engine = engine();
            engine.take_stream(mock).await.unwrap();
            {
                let selected = &mut engine.state_mut().selected;
                selected.folder = Some(inbox());
                for uid in 101..=110 {
                    selected.records.push(crate::summary::MessageRecord::new(
                        Uid::new(uid).unwrap(),
                        FlagSet::SEEN,
                    ));
                }
                selected.exists = 10;
            }
            engine.state_mut().connection = ConnectionState::Selected;
            let id = engine.queue(None, CommandSpec::noop()).unwrap();
            engine.run_until(id).await.unwrap();
            let records = &engine.state().selected.records;
            assert_eq!(records.len(), 9);
            assert_eq!(records.get(5).unwrap().uid, Uid::new(106).unwrap());
            assert_eq!(engine.state().selected.exists, 9);
        }

        #[tokio::test]
        async fn close_returns_to_authenticated() {
            let mock = Builder::new()
                .read(b"* PREAUTH [CAPABILITY IMAP4rev1] hi\r\n")
                .write(b"A00001 SELECT INBOX\r\n")
                .read(b"* 2 EXISTS\r\nA00001 OK done\r\n")
                .write(b"A00002 CLOSE\r\n")
                .read(b"A00002 OK closed\r\n")
                .build();
            let mut engine = engine();
            engine.take_stream(mock).await.unwrap();
            let select = engine
                .queue(Some(inbox()), CommandSpec::select(&inbox()))
                .unwrap();
            engine.run_until(select).await.unwrap();
            assert_eq!(engine.connection(), ConnectionState::Selected);
            let close = engine.queue(None, CommandSpec::close()).unwrap();
            engine.run_until(close).await.unwrap();
            assert_eq!(engine.connection(), ConnectionState::Authenticated);
            assert!(engine.state().selected.folder.is_none());
        }

        #[tokio::test]
        async fn logout_disconnects() {
            let mock = Builder::new()
                .read(b"* OK ready\r\n")
                .write(b"A00001 LOGOUT\r\n")
                .read(b"* BYE have a nice day\r\nA00001 OK LOGOUT completed\r\n")
                .build();
            let shared = Arc::new(Mutex::new(CollectedEvents::default()));
            let mut engine = engine();
            engine.set_events(Box::new(Arc::clone(&shared)));
            engine.take_stream(mock).await.unwrap();
            let id = engine.queue(None, CommandSpec::logout()).unwrap();
            engine.run_until(id).await.unwrap();
            assert_eq!(engine.connection(), ConnectionState::Disconnected);
            assert_eq!(shared.lock().unwrap().byes, ["have a nice day"]);
        }
    }

    mod reconnects {
        use super::*;

        struct Rewire {
            replacement: Option<Mock>,
        }

        impl Reconnect<Mock> for Rewire {
            fn reconnect<'a>(
                &'a mut self,
                engine: &'a mut Engine<Mock>,
            ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
                Box::pin(async move {
                    let transport = self
                        .replacement
                        .take()
                        .ok_or_else(|| Error::Reconnect("no spare transport".to_string()))?;
                    engine.take_stream(transport).await?;
                    Ok(())
                })
            }
        }

        #[tokio::test]
        async fn missing_callback_fails_the_head_command() {
            let mut engine = engine();
            let id = engine.queue(None, CommandSpec::noop()).unwrap();
            let err = engine.iterate().await.unwrap_err();
            assert!(matches!(err, Error::Reconnect(_)));
            let cmd = engine.take_completed(id).unwrap();
            assert_eq!(cmd.status(), CommandStatus::Error);
            assert!(cmd.failure().unwrap().contains("no reconnect callback"));
        }

        #[tokio::test]
        async fn callback_restores_the_connection() {
            let replacement = Builder::new()
                .read(b"* OK back again\r\n")
                .write(b"A00001 NOOP\r\n")
                .read(b"A00001 OK done\r\n")
                .build();
            let mut engine = engine();
            engine.set_reconnect(Box::new(Rewire {
                replacement: Some(replacement),
            }));
            let id = engine.queue(None, CommandSpec::noop()).unwrap();
            engine.run_until(id).await.unwrap();
            assert!(engine.take_completed(id).unwrap().result().is_ok());
            assert_eq!(engine.connection(), ConnectionState::Connected);
        }
    }

    mod teardown {
        use super::*;

        #[test]
        fn queued_commands_are_failed() {
            let mut engine = engine();
            let a = engine.queue(None, CommandSpec::noop()).unwrap();
            let b = engine.queue(None, CommandSpec::capability()).unwrap();
            engine.teardown();
            assert_eq!(engine.queued(), 0);
            for id in [a, b] {
                let cmd = engine.take_completed(id).unwrap();
                assert_eq!(cmd.status(), CommandStatus::Error);
                assert!(cmd.failure().unwrap().contains("torn down"));
            }
        }
    }
}
