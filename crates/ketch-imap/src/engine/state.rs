//! Connection-wide protocol state.
//!
//! [`EngineState`] is passed explicitly into the response parsers, so
//! every mutation a server line causes (capability resets, namespace
//! tables, selected-folder bookkeeping) happens through one visible
//! value instead of scattered engine fields.

use crate::summary::MessageList;
use crate::types::{Capabilities, FlagSet, Folder, Namespaces, Uid, UidValidity};

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No transport attached, or the connection was lost.
    #[default]
    Disconnected,
    /// Transport attached and greeting handled; not yet authenticated.
    Connected,
    /// Authenticated; no folder selected.
    Authenticated,
    /// A folder is selected.
    Selected,
}

impl ConnectionState {
    /// True once a transport is attached.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        !matches!(self, Self::Disconnected)
    }

    /// True from authentication onward.
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated | Self::Selected)
    }
}

/// Classification of the server's greeting line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Greeting {
    /// `* OK ...`: the session starts unauthenticated.
    Ok,
    /// `* PREAUTH ...`: the session starts already authenticated.
    PreAuth,
    /// `* BYE ...`: the server refused the connection.
    Bye,
}

/// State of the currently selected folder.
#[derive(Debug, Default)]
pub struct SelectedState {
    /// The folder, once a SELECT or EXAMINE succeeds.
    pub folder: Option<Folder>,
    /// True when the mailbox was opened read-only or reported
    /// `[READ-ONLY]`.
    pub read_only: bool,
    /// The mailbox's full flag list from the untagged `FLAGS` line.
    pub flags: FlagSet,
    /// Flags the server lets clients store persistently.
    pub permanent_flags: FlagSet,
    /// `[UIDVALIDITY n]` of the open mailbox.
    pub uid_validity: Option<UidValidity>,
    /// `[UIDNEXT n]` prediction.
    pub uid_next: Option<Uid>,
    /// Message count from the latest `EXISTS`.
    pub exists: u32,
    /// Count from the latest `RECENT`.
    pub recent: u32,
    /// Sequence number of the first unseen message, if reported.
    pub unseen: Option<u32>,
    /// The persisted record list kept in sync by FETCH reconciliation
    /// and untagged `EXPUNGE`.
    pub records: MessageList,
}

impl SelectedState {
    /// Resets everything for a newly selected folder, keeping nothing
    /// from the previous one.
    pub fn reselect(&mut self, folder: Folder) {
        *self = Self {
            folder: Some(folder),
            ..Self::default()
        };
    }

    /// True if `folder` is the currently selected one.
    #[must_use]
    pub fn is_current(&self, folder: &Folder) -> bool {
        self.folder
            .as_ref()
            .is_some_and(|f| f.encoded_name() == folder.encoded_name())
    }
}

/// Default output line budget, the conventional 1000-octet command line
/// less room for the terminator.
const DEFAULT_LINE_BUDGET: usize = 998;

/// Everything about the connection that is not the stream or the queue.
#[derive(Debug)]
pub struct EngineState {
    /// Lifecycle position.
    pub connection: ConnectionState,
    /// Capability table from the latest CAPABILITY response.
    pub capabilities: Capabilities,
    /// NAMESPACE triple, empty until queried.
    pub namespaces: Namespaces,
    /// Selected-folder bookkeeping.
    pub selected: SelectedState,
    /// Output line-length budget, used to size UID sets.
    pub line_budget: usize,
}

impl EngineState {
    pub(crate) fn new() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            capabilities: Capabilities::for_session(),
            namespaces: Namespaces::default(),
            selected: SelectedState::default(),
            line_budget: DEFAULT_LINE_BUDGET,
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
    fn lifecycle_predicates() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connected.is_authenticated());
        assert!(ConnectionState::Selected.is_authenticated());
    }

    #[test]
    fn reselect_drops_previous_mailbox_state() {
        let mut selected = SelectedState {
            exists: 50,
            read_only: true,
            ..SelectedState::default()
        };
        selected.reselect(Folder::new("Archive"));
        assert_eq!(selected.exists, 0);
        assert!(!selected.read_only);
        assert!(selected.is_current(&Folder::new("Archive")));
        assert!(!selected.is_current(&Folder::new("INBOX")));
    }

    #[test]
    fn fresh_state_assumes_utf8_search() {
        let state = EngineState::new();
        assert_eq!(state.connection, ConnectionState::Disconnected);
        assert!(state.capabilities.has(crate::types::Caps::SEARCH_UTF8));
    }
}
