//! Folder summary reconciliation.
//!
//! A selected folder keeps a [`MessageList`] of per-message records
//! ordered by sequence number. FETCH responses are staged into a
//! [`FetchStage`] keyed by sequence position while a command runs, then
//! [`reconcile`] folds the stage into the list in one pass: records the
//! server no longer reports are dropped, flag changes are merged without
//! losing local edits, and brand-new messages are appended. Flag-only
//! data for a UID the list has never seen marks where a follow-up
//! [`fetch_all`] should start.

use tokio::io::{AsyncRead, AsyncWrite};

use crate::command::{Collector, CommandSpec};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::types::{CommandId, FlagDiff, FlagSet, Folder, Uid, UidPos, compress_uids};

/// One mailbox address from an ENVELOPE item.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Address {
    /// Display name.
    pub name: Option<String>,
    /// Source route, rarely present.
    pub route: Option<String>,
    /// Local part.
    pub mailbox: Option<String>,
    /// Domain part.
    pub host: Option<String>,
}

impl Address {
    /// `mailbox@host` when both halves are present.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(mailbox), Some(host)) => Some(format!("{mailbox}@{host}")),
            _ => None,
        }
    }
}

/// Parsed ENVELOPE structure, as much of it as reconciliation needs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// The message's own Date header, verbatim.
    pub date: Option<String>,
    /// Subject, undecoded.
    pub subject: Option<String>,
    /// From addresses.
    pub from: Vec<Address>,
    /// Sender addresses.
    pub sender: Vec<Address>,
    /// Reply-To addresses.
    pub reply_to: Vec<Address>,
    /// To addresses.
    pub to: Vec<Address>,
    /// Cc addresses.
    pub cc: Vec<Address>,
    /// Bcc addresses.
    pub bcc: Vec<Address>,
    /// In-Reply-To header.
    pub in_reply_to: Option<String>,
    /// Message-ID header.
    pub message_id: Option<String>,
}

/// One persisted message record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// Immutable UID within the current UIDVALIDITY.
    pub uid: Uid,
    /// Current flags, local edits included.
    pub flags: FlagSet,
    /// The server's flags as of the last reconciliation. The gap
    /// between this and `flags` is the locally pending change.
    pub server_flags: FlagSet,
    /// Envelope, when a full fetch supplied one.
    pub envelope: Option<Envelope>,
    /// INTERNALDATE string, verbatim.
    pub internal_date: Option<String>,
    /// RFC822.SIZE in octets.
    pub size: Option<u32>,
}

impl MessageRecord {
    /// A record carrying only a UID and flags.
    #[must_use]
    pub fn new(uid: Uid, flags: FlagSet) -> Self {
        Self {
            uid,
            flags,
            server_flags: flags,
            envelope: None,
            internal_date: None,
            size: None,
        }
    }

    /// Folds a freshly fetched server flag set into the record while
    /// keeping local edits that have not been stored yet. Returns true
    /// if anything changed.
    pub fn absorb_flags(&mut self, fetched: FlagSet) -> bool {
        let pending = FlagDiff::between(self.server_flags, self.flags);
        let merged = pending.apply(fetched);
        let changed = merged != self.flags || fetched != self.server_flags;
        self.flags = merged;
        self.server_flags = fetched;
        changed
    }

    /// The locally pending flag change, empty once synchronized.
    #[must_use]
    pub fn pending_flags(&self) -> FlagDiff {
        FlagDiff::between(self.server_flags, self.flags)
    }

    fn from_staged(staged: StagedRecord, uid: Uid) -> Self {
        let flags = staged.flags.unwrap_or(FlagSet::EMPTY);
        Self {
            uid,
            flags,
            server_flags: flags,
            envelope: staged.envelope,
            internal_date: staged.internal_date,
            size: staged.size,
        }
    }
}

/// Ordered message records for the selected folder, addressed by their
/// 1-based wire sequence number.
#[derive(Debug, Default)]
pub struct MessageList {
    records: Vec<MessageRecord>,
}

impl MessageList {
    fn index(seq: u32) -> Option<usize> {
        seq.checked_sub(1).and_then(|i| usize::try_from(i).ok())
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True when no records are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Record at sequence number `seq`.
    #[must_use]
    pub fn get(&self, seq: u32) -> Option<&MessageRecord> {
        self.records.get(Self::index(seq)?)
    }

    pub(crate) fn record_mut(&mut self, seq: u32) -> Option<&mut MessageRecord> {
        let index = Self::index(seq)?;
        self.records.get_mut(index)
    }

    /// Record with the given UID.
    #[must_use]
    pub fn by_uid(&self, uid: Uid) -> Option<&MessageRecord> {
        self.records.iter().find(|r| r.uid == uid)
    }

    fn by_uid_mut(&mut self, uid: Uid) -> Option<&mut MessageRecord> {
        self.records.iter_mut().find(|r| r.uid == uid)
    }

    /// True if any record carries `uid`.
    #[must_use]
    pub fn contains_uid(&self, uid: Uid) -> bool {
        self.by_uid(uid).is_some()
    }

    /// Appends a record at the next sequence position.
    pub fn push(&mut self, record: MessageRecord) {
        self.records.push(record);
    }

    /// Removes the record at sequence `seq`; every later record shifts
    /// down by one, exactly as an untagged EXPUNGE does on the wire.
    pub fn expunge(&mut self, seq: u32) -> Option<MessageRecord> {
        let index = Self::index(seq)?;
        if index < self.records.len() {
            Some(self.records.remove(index))
        } else {
            None
        }
    }

    /// Iterates records in sequence order.
    pub fn iter(&self) -> std::slice::Iter<'_, MessageRecord> {
        self.records.iter()
    }

    /// UID/position pairs for every record, ready for
    /// [`compress_uids`].
    #[must_use]
    pub fn uid_positions(&self) -> Vec<UidPos> {
        self.records
            .iter()
            .enumerate()
            .filter_map(|(i, r)| {
                let pos = u32::try_from(i).ok()?.checked_add(1)?;
                UidPos::new(r.uid.get(), pos)
            })
            .collect()
    }

    /// Drops every record.
    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl<'a> IntoIterator for &'a MessageList {
    type Item = &'a MessageRecord;
    type IntoIter = std::slice::Iter<'a, MessageRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Per-message data accumulated from one untagged FETCH line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StagedRecord {
    /// Wire sequence number the line was keyed by.
    pub seq: u32,
    /// UID item, if reported.
    pub uid: Option<Uid>,
    /// FLAGS item, if reported. `Some(EMPTY)` and `None` differ: the
    /// former is an explicit empty flag list.
    pub flags: Option<FlagSet>,
    /// ENVELOPE item.
    pub envelope: Option<Envelope>,
    /// INTERNALDATE item, verbatim.
    pub internal_date: Option<String>,
    /// RFC822.SIZE item.
    pub size: Option<u32>,
    /// Literal payload of a `BODY[...]` item, when one was fetched.
    pub body: Option<Vec<u8>>,
}

impl StagedRecord {
    fn merge(&mut self, other: Self) {
        if other.uid.is_some() {
            self.uid = other.uid;
        }
        if other.flags.is_some() {
            self.flags = other.flags;
        }
        if other.envelope.is_some() {
            self.envelope = other.envelope;
        }
        if other.internal_date.is_some() {
            self.internal_date = other.internal_date;
        }
        if other.size.is_some() {
            self.size = other.size;
        }
        if other.body.is_some() {
            self.body = other.body;
        }
    }

    fn is_flags_only(&self) -> bool {
        self.envelope.is_none()
    }
}

/// Staging area for one running FETCH command. Slots are addressed by
/// `seq - first`; sequence numbers below `first` are treated as flag
/// updates to records outside the fetched window.
#[derive(Debug)]
pub struct FetchStage {
    first: u32,
    slots: Vec<Option<StagedRecord>>,
    out_of_band: Vec<(u32, FlagSet)>,
}

impl FetchStage {
    /// A stage whose window starts at sequence `first`.
    #[must_use]
    pub fn new(first: u32) -> Self {
        Self {
            first: first.max(1),
            slots: Vec::new(),
            out_of_band: Vec::new(),
        }
    }

    /// First sequence number of the fetched window.
    #[must_use]
    pub const fn first(&self) -> u32 {
        self.first
    }

    /// True while nothing has been staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty() && self.out_of_band.is_empty()
    }

    /// Empties the stage, keeping the window, so a reset command can
    /// refill it from scratch.
    pub fn clear(&mut self) {
        self.slots.clear();
        self.out_of_band.clear();
    }

    /// Files one parsed FETCH line into its slot.
    pub(crate) fn absorb(&mut self, record: StagedRecord) {
        if record.seq < self.first {
            if let Some(flags) = record.flags {
                self.out_of_band.push((record.seq, flags));
            }
            return;
        }
        let Ok(slot) = usize::try_from(record.seq - self.first) else {
            return;
        };
        if slot >= self.slots.len() {
            self.slots.resize(slot + 1, None);
        }
        match &mut self.slots[slot] {
            Some(existing) => existing.merge(record),
            empty => *empty = Some(record),
        }
    }

    fn into_parts(self) -> (u32, Vec<Option<StagedRecord>>, Vec<(u32, FlagSet)>) {
        (self.first, self.slots, self.out_of_band)
    }
}

/// What one [`reconcile`] pass did to the list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Records dropped because the server no longer reported their UID.
    pub removed: u32,
    /// Records whose flags changed.
    pub updated: u32,
    /// Full records appended to the list.
    pub appended: u32,
    /// Lowest sequence number whose UID the list had never seen and
    /// for which only flags were staged. A follow-up [`fetch_all`]
    /// from here fetches exactly the genuinely new messages.
    pub first_new_seq: Option<u32>,
    /// True when a slot in the window stayed empty or lacked a UID;
    /// the pass still completes with what it has.
    pub incomplete: bool,
}

/// Folds a completed fetch stage into the record list.
pub fn reconcile(list: &mut MessageList, stage: FetchStage) -> SyncOutcome {
    let mut outcome = SyncOutcome::default();
    let (first, slots, out_of_band) = stage.into_parts();

    for (seq, flags) in out_of_band {
        if let Some(record) = list.record_mut(seq)
            && record.absorb_flags(flags)
        {
            outcome.updated += 1;
        }
    }

    let mut staged = Vec::with_capacity(slots.len());
    for slot in slots {
        match slot {
            Some(record) if record.uid.is_some() => staged.push(record),
            _ => outcome.incomplete = true,
        }
    }

    let staged_uids: std::collections::HashSet<u32> = staged
        .iter()
        .filter_map(|r| r.uid.map(Uid::get))
        .collect();

    // Records in the window whose UID the server never mentioned were
    // expunged elsewhere.
    if let Some(mut index) = MessageList::index(first) {
        while index < list.records.len() {
            if staged_uids.contains(&list.records[index].uid.get()) {
                index += 1;
            } else {
                list.records.remove(index);
                outcome.removed += 1;
            }
        }
    }

    for record in staged {
        let Some(uid) = record.uid else {
            continue;
        };
        if let Some(existing) = list.by_uid_mut(uid) {
            if let Some(fetched) = record.flags
                && existing.absorb_flags(fetched)
            {
                outcome.updated += 1;
            }
        } else if record.is_flags_only() {
            // Never-seen UID with no envelope: this is where new mail
            // starts.
            let candidate = record.seq;
            outcome.first_new_seq = Some(match outcome.first_new_seq {
                Some(seq) => seq.min(candidate),
                None => candidate,
            });
        } else {
            list.push(MessageRecord::from_staged(record, uid));
            outcome.appended += 1;
        }
    }

    outcome
}

/// Queues `FETCH first:last (UID ALL)` for `folder`, staging results
/// for reconciliation. `None` for `last` fetches through `*`.
pub fn fetch_all<S>(
    engine: &mut Engine<S>,
    folder: &Folder,
    first: u32,
    last: Option<u32>,
) -> Result<CommandId>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stage_fetch(engine, folder, first, last, "(UID ALL)")
}

/// Queues `FETCH first:last (UID FLAGS)` for `folder`, the cheap pass
/// that detects expunges, flag changes and new mail.
pub fn fetch_flags<S>(
    engine: &mut Engine<S>,
    folder: &Folder,
    first: u32,
    last: Option<u32>,
) -> Result<CommandId>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stage_fetch(engine, folder, first, last, "(UID FLAGS)")
}

fn stage_fetch<S>(
    engine: &mut Engine<S>,
    folder: &Folder,
    first: u32,
    last: Option<u32>,
    items: &str,
) -> Result<CommandId>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let range = match last {
        Some(last) => format!("{first}:{last}"),
        None => format!("{first}:*"),
    };
    let id = engine.queue(Some(folder.clone()), CommandSpec::fetch(&range, items))?;
    if let Some(cmd) = engine.command_mut(id) {
        cmd.set_collector(Collector::Fetch(FetchStage::new(first)));
    }
    Ok(id)
}

/// Takes a completed fetch command and reconciles its stage into the
/// engine's selected-folder records.
pub fn complete_fetch<S>(engine: &mut Engine<S>, id: CommandId) -> Result<SyncOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut cmd = engine
        .take_completed(id)
        .ok_or_else(|| Error::state(format!("command {id} is not complete")))?;
    if !cmd.result().is_ok() {
        let detail = cmd.failure().unwrap_or("fetch rejected").to_string();
        return Err(Error::state(detail));
    }
    let Collector::Fetch(stage) = cmd.take_collector() else {
        return Err(Error::state(format!("command {id} was not a fetch")));
    };
    Ok(reconcile(&mut engine.state_mut().selected.records, stage))
}

/// Splits `records` into UID-set strings each at most `budget` octets,
/// covering all records in order.
#[must_use]
pub fn uid_set_chunks(records: &[UidPos], budget: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = records;
    while !rest.is_empty() {
        let chunk = compress_uids(rest, budget);
        if chunk.consumed == 0 {
            break;
        }
        rest = &rest[chunk.consumed..];
        chunks.push(chunk.set);
    }
    chunks
}

/// Queues as many `UID STORE .. ±FLAGS.SILENT` commands as the line
/// budget requires to cover `records`, restricted to flags the mailbox
/// accepts. Returns the queued ids, possibly none if nothing storable
/// remains.
pub fn store_flags<S>(
    engine: &mut Engine<S>,
    folder: &Folder,
    records: &[UidPos],
    add: bool,
    flags: FlagSet,
) -> Result<Vec<CommandId>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let permitted = {
        let permanent = engine.state().selected.permanent_flags;
        if permanent.is_empty() {
            FlagSet::STORABLE
        } else {
            permanent & FlagSet::STORABLE
        }
    };
    let flags = flags & permitted;
    if flags.is_empty() || records.is_empty() {
        return Ok(Vec::new());
    }

    let sign = if add { '+' } else { '-' };
    // Tag, verb, flag list and terminator all count against the line.
    let overhead = format!("A00000 UID STORE  {sign}FLAGS.SILENT ({flags})\r\n").len();
    let budget = engine.state().line_budget.saturating_sub(overhead).max(8);

    let mut ids = Vec::new();
    for set in uid_set_chunks(records, budget) {
        ids.push(engine.queue(Some(folder.clone()), CommandSpec::uid_store(&set, add, flags))?);
    }
    Ok(ids)
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

    fn uid(n: u32) -> Uid {
        Uid::new(n).unwrap()
    }

    fn list_of(uids: &[u32]) -> MessageList {
        let mut list = MessageList::default();
        for &n in uids {
            list.push(MessageRecord::new(uid(n), FlagSet::SEEN));
        }
        list
    }

    fn staged(seq: u32, uid_n: u32, flags: FlagSet) -> StagedRecord {
        StagedRecord {
            seq,
            uid: Some(uid(uid_n)),
            flags: Some(flags),
            ..StagedRecord::default()
        }
    }

    fn staged_full(seq: u32, uid_n: u32, subject: &str) -> StagedRecord {
        let mut record = staged(seq, uid_n, FlagSet::EMPTY);
        record.envelope = Some(Envelope {
            subject: Some(subject.to_string()),
            ..Envelope::default()
        });
        record
    }

    mod records {
        use super::*;

        #[test]
        fn absorb_keeps_local_pending_edits() {
            // Local state: seen, locally flagged but not yet stored.
            let mut record = MessageRecord::new(uid(1), FlagSet::SEEN);
            record.flags.insert(FlagSet::FLAGGED);
            // Server meanwhile added \Answered.
            let fetched = FlagSet::SEEN | FlagSet::ANSWERED;
            assert!(record.absorb_flags(fetched));
            assert_eq!(
                record.flags,
                FlagSet::SEEN | FlagSet::ANSWERED | FlagSet::FLAGGED
            );
            assert_eq!(record.server_flags, fetched);
            // The pending delta is still just the local \Flagged add.
            assert_eq!(record.pending_flags().apply(fetched), record.flags);
        }

        #[test]
        fn absorb_reports_no_change_when_in_sync() {
            let mut record = MessageRecord::new(uid(1), FlagSet::SEEN);
            assert!(!record.absorb_flags(FlagSet::SEEN));
        }

        #[test]
        fn expunge_shifts_later_records_down() {
            let mut list = list_of(&[101, 102, 103, 104, 105, 106, 107, 108, 109, 110]);
            let gone = list.expunge(5).unwrap();
            assert_eq!(gone.uid, uid(105));
            assert_eq!(list.len(), 9);
            // The record that was sequence 6 now answers to 5.
            assert_eq!(list.get(5).unwrap().uid, uid(106));
            assert_eq!(list.get(9).unwrap().uid, uid(110));
            assert!(list.get(10).is_none());
        }

        #[test]
        fn expunge_out_of_range_is_none() {
            let mut list = list_of(&[1, 2]);
            assert!(list.expunge(0).is_none());
            assert!(list.expunge(3).is_none());
            assert_eq!(list.len(), 2);
        }

        #[test]
        fn uid_positions_are_one_based() {
            let list = list_of(&[20, 30, 40]);
            let positions = list.uid_positions();
            assert_eq!(positions.len(), 3);
            assert_eq!(positions[0].pos, 1);
            assert_eq!(positions[2].uid, uid(40));
            assert_eq!(positions[2].pos, 3);
        }
    }

    mod staging {
        use super::*;

        #[test]
        fn absorb_merges_lines_for_the_same_sequence() {
            let mut stage = FetchStage::new(1);
            stage.absorb(StagedRecord {
                seq: 2,
                flags: Some(FlagSet::SEEN),
                ..StagedRecord::default()
            });
            stage.absorb(StagedRecord {
                seq: 2,
                uid: Some(uid(7)),
                ..StagedRecord::default()
            });
            let (_, slots, _) = stage.into_parts();
            let merged = slots[1].as_ref().unwrap();
            assert_eq!(merged.uid, Some(uid(7)));
            assert_eq!(merged.flags, Some(FlagSet::SEEN));
        }

        #[test]
        fn below_window_sequences_go_out_of_band() {
            let mut stage = FetchStage::new(5);
            stage.absorb(staged(3, 30, FlagSet::DELETED));
            let (_, slots, out_of_band) = stage.into_parts();
            assert!(slots.is_empty());
            assert_eq!(out_of_band, vec![(3, FlagSet::DELETED)]);
        }

        #[test]
        fn clear_keeps_the_window() {
            let mut stage = FetchStage::new(4);
            stage.absorb(staged(4, 1, FlagSet::EMPTY));
            stage.clear();
            assert!(stage.is_empty());
            assert_eq!(stage.first(), 4);
        }
    }

    mod reconciliation {
        use super::*;

        #[test]
        fn missing_uids_are_removed() {
            let mut list = list_of(&[1, 2, 3]);
            let mut stage = FetchStage::new(1);
            stage.absorb(staged(1, 1, FlagSet::SEEN));
            stage.absorb(staged(2, 3, FlagSet::SEEN));
            let outcome = reconcile(&mut list, stage);
            assert_eq!(outcome.removed, 1);
            assert_eq!(list.len(), 2);
            assert!(!list.contains_uid(uid(2)));
        }

        #[test]
        fn flag_changes_update_in_place() {
            let mut list = list_of(&[1, 2]);
            let mut stage = FetchStage::new(1);
            stage.absorb(staged(1, 1, FlagSet::SEEN | FlagSet::ANSWERED));
            stage.absorb(staged(2, 2, FlagSet::SEEN));
            let outcome = reconcile(&mut list, stage);
            assert_eq!(outcome.updated, 1);
            assert_eq!(outcome.removed, 0);
            assert_eq!(
                list.by_uid(uid(1)).unwrap().flags,
                FlagSet::SEEN | FlagSet::ANSWERED
            );
        }

        #[test]
        fn full_records_for_new_uids_are_appended() {
            let mut list = list_of(&[1]);
            let mut stage = FetchStage::new(1);
            stage.absorb(staged(1, 1, FlagSet::SEEN));
            stage.absorb(staged_full(2, 9, "hello"));
            let outcome = reconcile(&mut list, stage);
            assert_eq!(outcome.appended, 1);
            let appended = list.get(2).unwrap();
            assert_eq!(appended.uid, uid(9));
            assert_eq!(
                appended.envelope.as_ref().unwrap().subject.as_deref(),
                Some("hello")
            );
        }

        #[test]
        fn flags_only_unknown_uid_marks_new_mail_start() {
            let mut list = list_of(&[1, 2]);
            let mut stage = FetchStage::new(1);
            stage.absorb(staged(1, 1, FlagSet::SEEN));
            stage.absorb(staged(2, 2, FlagSet::SEEN));
            stage.absorb(staged(3, 50, FlagSet::RECENT));
            stage.absorb(staged(4, 51, FlagSet::RECENT));
            let outcome = reconcile(&mut list, stage);
            assert_eq!(outcome.first_new_seq, Some(3));
            assert_eq!(list.len(), 2);
        }

        #[test]
        fn below_window_update_reaches_earlier_records() {
            let mut list = list_of(&[1, 2, 3]);
            let mut stage = FetchStage::new(3);
            stage.absorb(staged(1, 1, FlagSet::SEEN | FlagSet::DELETED));
            stage.absorb(staged(3, 3, FlagSet::SEEN));
            let outcome = reconcile(&mut list, stage);
            assert_eq!(outcome.updated, 1);
            assert!(list.get(1).unwrap().flags.contains(FlagSet::DELETED));
            // Records below the window are not removal candidates.
            assert_eq!(outcome.removed, 0);
            assert_eq!(list.len(), 3);
        }

        #[test]
        fn empty_slot_is_a_soft_warning() {
            let mut list = list_of(&[1, 2, 3]);
            let mut stage = FetchStage::new(1);
            stage.absorb(staged(1, 1, FlagSet::SEEN));
            // Sequence 2 never reported.
            stage.absorb(staged(3, 3, FlagSet::SEEN));
            let outcome = reconcile(&mut list, stage);
            assert!(outcome.incomplete);
            // UID 2 had no staged data, so it is dropped like an
            // expunge.
            assert_eq!(outcome.removed, 1);
            assert_eq!(list.len(), 2);
        }
    }

    mod chunking {
        use super::*;

        fn positions(uids: &[u32]) -> Vec<UidPos> {
            uids.iter()
                .enumerate()
                .map(|(i, &u)| UidPos::new(u, u32::try_from(i).unwrap() + 1).unwrap())
                .collect()
        }

        #[test]
        fn chunks_cover_everything_within_budget() {
            let records = positions(&[1, 2, 3, 7, 8, 10, 40, 41, 42, 90]);
            let chunks = uid_set_chunks(&records, 8);
            assert!(chunks.len() > 1);
            for chunk in &chunks {
                assert!(chunk.len() <= 8, "chunk {chunk:?} over budget");
                assert!(!chunk.is_empty());
            }
        }

        #[test]
        fn generous_budget_is_one_chunk() {
            let records = positions(&[1, 2, 3, 7, 8, 10]);
            let chunks = uid_set_chunks(&records, 256);
            assert_eq!(chunks, vec!["1:3,7:8,10".to_string()]);
        }

        #[test]
        fn empty_input_yields_no_chunks() {
            assert!(uid_set_chunks(&[], 16).is_empty());
        }
    }
}
