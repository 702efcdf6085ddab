//! UID-set compression: turning an ordered run of message records into
//! the compact `1:3,7:8,10` wire form under a byte budget.
//!
//! Ranges are keyed by folder position, not UID: a record can only extend
//! the current range when its sequence position is exactly one past the
//! range's last position. The emitted endpoints are UIDs, so a range may
//! span UIDs that no longer exist in the mailbox; UID commands ignore
//! nonexistent UIDs, which is what makes position-keyed ranging safe.

use super::Uid;

/// One record fed to the compressor: a UID and its current 1-based
/// position in the folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UidPos {
    /// Message UID.
    pub uid: Uid,
    /// Current sequence position of the message.
    pub pos: u32,
}

impl UidPos {
    /// Convenience constructor; returns `None` for a zero UID.
    #[must_use]
    pub fn new(uid: u32, pos: u32) -> Option<Self> {
        Uid::new(uid).map(|uid| Self { uid, pos })
    }
}

/// The result of one compression call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidChunk {
    /// The UID set string, at most `budget` bytes.
    pub set: String,
    /// How many input records the set covers; the caller re-invokes with
    /// the remaining records for the next command.
    pub consumed: usize,
}

/// Greedily compresses as many leading records as fit within `budget`
/// bytes.
///
/// Consumes at least one record whenever the budget admits a single UID;
/// a budget too small for even one UID yields an empty chunk.
#[must_use]
pub fn compress_uids(records: &[UidPos], budget: usize) -> UidChunk {
    let mut set = String::new();
    let mut consumed = 0;

    while consumed < records.len() {
        let first = records[consumed];
        let mut last = first;
        let mut take = 1;
        while let Some(next) = records.get(consumed + take) {
            if next.pos != last.pos + 1 {
                break;
            }
            last = *next;
            take += 1;
        }

        let element = if take == 1 {
            first.uid.to_string()
        } else {
            format!("{}:{}", first.uid, last.uid)
        };
        let sep = usize::from(!set.is_empty());

        if set.len() + sep + element.len() > budget {
            // A lone oversized range can still yield its first UID.
            if set.is_empty() && take > 1 {
                let single = first.uid.to_string();
                if single.len() <= budget {
                    set = single;
                    consumed = 1;
                }
            }
            break;
        }

        if sep == 1 {
            set.push(',');
        }
        set.push_str(&element);
        consumed += take;
    }

    UidChunk { set, consumed }
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
    use proptest::prelude::*;

    fn records(pairs: &[(u32, u32)]) -> Vec<UidPos> {
        pairs
            .iter()
            .map(|&(uid, pos)| UidPos::new(uid, pos).unwrap())
            .collect()
    }

    /// True if `uid` falls inside one of the set's elements.
    fn set_covers(set: &str, uid: u32) -> bool {
        set.split(',').any(|element| {
            element.split_once(':').map_or_else(
                || element.parse::<u32>() == Ok(uid),
                |(lo, hi)| {
                    let lo: u32 = lo.parse().unwrap();
                    let hi: u32 = hi.parse().unwrap();
                    (lo..=hi).contains(&uid)
                },
            )
        })
    }

    #[test]
    fn compresses_position_runs_with_uid_endpoints() {
        // Positions mirror UIDs here, so runs break at the UID gaps.
        let input = records(&[(1, 1), (2, 2), (3, 3), (7, 7), (8, 8), (10, 10)]);
        let chunk = compress_uids(&input, usize::MAX);
        assert_eq!(chunk.set, "1:3,7:8,10");
        assert_eq!(chunk.consumed, 6);
    }

    #[test]
    fn position_adjacency_spans_uid_gaps() {
        // Consecutive positions with gappy UIDs form one range; the
        // missing UIDs were expunged and UID commands skip them.
        let input = records(&[(4, 1), (9, 2), (23, 3)]);
        let chunk = compress_uids(&input, usize::MAX);
        assert_eq!(chunk.set, "4:23");
        assert_eq!(chunk.consumed, 3);
    }

    #[test]
    fn position_gap_splits_ranges() {
        let input = records(&[(4, 1), (9, 2), (23, 5)]);
        let chunk = compress_uids(&input, usize::MAX);
        assert_eq!(chunk.set, "4:9,23");
    }

    #[test]
    fn budget_stops_before_overflow() {
        let input = records(&[(1, 1), (2, 2), (100, 4), (101, 5), (300, 9)]);
        // "1:2,100:101" is 11 bytes; an 8-byte budget keeps only "1:2,100"?
        // No: elements are atomic, so "1:2" (3) fits, ",100:101" would
        // make 11 > 8, stop after the first element.
        let chunk = compress_uids(&input, 8);
        assert_eq!(chunk.set, "1:2");
        assert_eq!(chunk.consumed, 2);

        let rest = &input[chunk.consumed..];
        let chunk = compress_uids(rest, 8);
        assert_eq!(chunk.set, "100:101");
        assert_eq!(chunk.consumed, 2);
    }

    #[test]
    fn oversized_leading_range_degrades_to_single() {
        let input = records(&[(1000, 1), (1001, 2), (1002, 3)]);
        // "1000:1002" is 9 bytes; a 6-byte budget still makes progress.
        let chunk = compress_uids(&input, 6);
        assert_eq!(chunk.set, "1000");
        assert_eq!(chunk.consumed, 1);
    }

    #[test]
    fn hopeless_budget_consumes_nothing() {
        let input = records(&[(12345, 1)]);
        let chunk = compress_uids(&input, 3);
        assert_eq!(chunk.set, "");
        assert_eq!(chunk.consumed, 0);
    }

    #[test]
    fn empty_input_is_empty() {
        let chunk = compress_uids(&[], 100);
        assert_eq!(chunk.set, "");
        assert_eq!(chunk.consumed, 0);
    }

    proptest! {
        #[test]
        fn never_exceeds_budget(
            steps in proptest::collection::vec((1u32..5, 1u32..4), 0..40),
            budget in 0usize..48,
        ) {
            let mut uid = 0;
            let mut pos = 0;
            let input: Vec<UidPos> = steps
                .iter()
                .map(|&(du, dp)| {
                    uid += du;
                    pos += dp;
                    UidPos::new(uid, pos).unwrap()
                })
                .collect();

            let chunk = compress_uids(&input, budget);
            prop_assert!(chunk.set.len() <= budget);

            // Forward progress whenever one UID fits.
            if !input.is_empty() && budget >= input[0].uid.to_string().len() {
                prop_assert!(chunk.consumed >= 1);
            }

            // Every consumed record is addressed by the emitted set.
            for record in &input[..chunk.consumed] {
                prop_assert!(set_covers(&chunk.set, record.uid.get()));
            }
        }
    }
}
