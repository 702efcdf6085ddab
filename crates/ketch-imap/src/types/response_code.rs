//! Response codes: the bracketed `[CODE ...]` metadata inside OK/NO/BAD
//! response lines.

use super::{FlagSet, Uid, UidValidity};

/// A parsed response code.
///
/// Only a subset of kinds is retained on the command that was executing
/// when the code arrived (see [`ResponseCode::is_retained`]); the rest
/// act on engine state in place and are then dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// `[ALERT]`: the line's text must be shown to the user.
    Alert,
    /// `[BADCHARSET ...]`: the search charset was rejected.
    BadCharset,
    /// `[CAPABILITY ...]`: inline capability list.
    Capability,
    /// `[PARSE]`: the server had trouble parsing a message header.
    Parse,
    /// `[PERMANENTFLAGS (...)]`: flags the client may store persistently.
    PermanentFlags(FlagSet),
    /// `[READ-ONLY]`: the selected mailbox rejects changes.
    ReadOnly,
    /// `[READ-WRITE]`: the selected mailbox accepts changes.
    ReadWrite,
    /// `[TRYCREATE]`: the target mailbox does not exist but may be created.
    TryCreate,
    /// `[UIDNEXT n]`: the next UID the mailbox will assign.
    UidNext(Uid),
    /// `[UIDVALIDITY n]`: the mailbox's UID validity value.
    UidValidity(UidValidity),
    /// `[UNSEEN n]`: sequence number of the first unseen message.
    Unseen(u32),
    /// `[NEWNAME old new]`: the mailbox was renamed.
    NewName {
        /// Previous mailbox name.
        from: String,
        /// Current mailbox name.
        to: String,
    },
    /// `[APPENDUID validity uid]`: UID assigned to an appended message.
    AppendUid {
        /// UIDVALIDITY of the destination mailbox.
        validity: UidValidity,
        /// UID of the appended message.
        uid: Uid,
    },
    /// `[COPYUID validity source dest]`: UIDs assigned by a copy.
    CopyUid {
        /// UIDVALIDITY of the destination mailbox.
        validity: UidValidity,
        /// Source UID set, as sent by the server.
        source: String,
        /// Destination UID set, as sent by the server.
        dest: String,
    },
    /// A code outside the fixed table, kept by name for diagnostics.
    Unknown(String),
}

impl ResponseCode {
    /// True if this code kind is persisted onto the executing command.
    ///
    /// ALERT, BADCHARSET and CAPABILITY only mutate engine/session state;
    /// unknown codes are drained and dropped.
    #[must_use]
    pub const fn is_retained(&self) -> bool {
        !matches!(
            self,
            Self::Alert | Self::BadCharset | Self::Capability | Self::Unknown(_)
        )
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
    fn retained_kinds() {
        assert!(ResponseCode::TryCreate.is_retained());
        assert!(ResponseCode::ReadOnly.is_retained());
        assert!(ResponseCode::Unseen(3).is_retained());
        assert!(
            ResponseCode::AppendUid {
                validity: UidValidity::new(1).unwrap(),
                uid: Uid::new(9).unwrap(),
            }
            .is_retained()
        );
    }

    #[test]
    fn state_only_kinds_are_not_retained() {
        assert!(!ResponseCode::Alert.is_retained());
        assert!(!ResponseCode::BadCharset.is_retained());
        assert!(!ResponseCode::Capability.is_retained());
        assert!(!ResponseCode::Unknown("X-CUSTOM".to_string()).is_retained());
    }
}
