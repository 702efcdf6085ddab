//! # ketch-imap
//!
//! A client-side IMAP4rev1 (RFC 3501) protocol core built around an
//! explicit command queue.
//!
//! ## Features
//!
//! - **Queue-driven execution**: Commands are built up front, queued,
//!   and executed one per [`Engine::iterate`] call, so callers decide
//!   when network work happens
//! - **Automatic folder opening**: A command bound to an unselected
//!   folder gets a SELECT slipped in ahead of it
//! - **Literal-aware wire building**: Arguments are classified as
//!   atom, quoted string or literal, with `LITERAL+` (RFC 7888) used
//!   when the server offers it
//! - **Streaming lexer**: Responses are tokenized incrementally with
//!   literal payloads readable in chunks
//! - **Mailbox reconciliation**: Fetch results replay onto a held
//!   message list, preserving local flag edits not yet pushed
//! - **TLS via rustls**: Secure connections without OpenSSL
//!
//! ## Quick Start
//!
//! ```ignore
//! use ketch_imap::{CommandSpec, Engine, Folder, Security, summary};
//!
//! #[tokio::main]
//! async fn main() -> ketch_imap::Result<()> {
//!     let stream = ketch_imap::transport::dial("imap.example.com", 993, Security::Tls).await?;
//!     let mut engine = Engine::new();
//!     engine.take_stream(stream).await?;
//!
//!     let login = engine.queue(None, CommandSpec::login("user@example.com", "password"))?;
//!     engine.run_until(login).await?;
//!
//!     // Pull flag state for the whole mailbox; the engine opens
//!     // INBOX by itself.
//!     let inbox = Folder::new("INBOX");
//!     let fetch = summary::fetch_all(&mut engine, &inbox, 1, None)?;
//!     engine.run_until(fetch).await?;
//!     let outcome = summary::complete_fetch(&mut engine, fetch)?;
//!     println!("{} new, {} changed", outcome.appended, outcome.updated);
//!
//!     let logout = engine.queue(None, CommandSpec::logout())?;
//!     engine.run_until(logout).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Connection Phases
//!
//! The engine tracks the session phase at runtime and applies
//! transitions as commands complete:
//!
//! ```text
//! Disconnected ── take_stream() ──→ Connected
//! Connected ──── LOGIN/AUTHENTICATE OK ──→ Authenticated
//! Authenticated ── SELECT/EXAMINE OK ──→ Selected
//! Selected ────── CLOSE OK ──→ Authenticated
//! any ─────────── LOGOUT / transport loss ──→ Disconnected
//! ```
//!
//! A `PREAUTH` greeting enters `Authenticated` directly.
//!
//! ## Modules
//!
//! - [`command`]: Command construction and the queued-command type
//! - [`engine`]: The connection driver and session state
//! - [`events`]: Sink for alerts and other session notifications
//! - [`lexer`]: Streaming response tokenizer
//! - [`summary`]: Message records and fetch reconciliation
//! - [`transport`]: Plaintext and TLS byte streams
//! - [`types`]: Core protocol types (flags, folders, capabilities, ...)

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod engine;
mod error;
pub mod events;
pub mod lexer;
pub mod summary;
pub mod transport;
pub mod types;

pub use command::{
    Collector, Command, CommandResult, CommandSpec, CommandStatus, LiteralPayload, LiteralSource,
};
pub use engine::{ConnectionState, Engine, EngineState, Greeting, Reconnect, SelectedState};
pub use error::{Error, Result};
pub use events::{CollectedEvents, EngineEvents, NoopEvents};
pub use lexer::{Token, TokenStream};
pub use summary::{
    Address, Envelope, FetchStage, MessageList, MessageRecord, StagedRecord, SyncOutcome,
};
pub use transport::{ImapStream, Security};
pub use types::{
    Capabilities, Caps, CommandId, FlagDiff, FlagSet, Folder, ListAttrs, ListEntry,
    NamespaceEntry, Namespaces, ProtocolLevel, ResponseCode, SeqNum, StatusSummary, Uid, UidChunk,
    UidPos, UidValidity, compress_uids,
};

/// IMAP protocol revision this crate speaks.
pub const IMAP_VERSION: &str = "IMAP4rev1";
