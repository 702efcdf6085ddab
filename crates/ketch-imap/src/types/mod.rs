//! Protocol data types shared across the lexer, command builder and
//! engine.

mod capability;
mod flags;
mod folder;
mod identifiers;
mod namespace;
mod response_code;
mod uidset;

pub use capability::{Capabilities, Caps, ProtocolLevel};
pub use flags::{FlagDiff, FlagSet};
pub use folder::{Folder, ListAttrs, ListEntry, StatusSummary};
pub use identifiers::{CommandId, SeqNum, Uid, UidValidity};
pub use namespace::{NamespaceEntry, Namespaces};
pub use response_code::ResponseCode;
pub use uidset::{UidChunk, UidPos, compress_uids};
