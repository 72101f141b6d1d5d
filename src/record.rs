//! The `CdrRecord` and the flags/disposition it carries (§3).

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::snapshot::{PartySnapshot, Timestamp};
use crate::state::CdrState;

static SEQUENCE: AtomicU32 = AtomicU32::new(1);

/// Issues the next globally unique, strictly increasing sequence number (§3 invariants, §8.2).
pub fn next_sequence() -> u32 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CdrFlags: u16 {
        const DISABLE    = 0b0000_0001;
        const KEEP_VARS  = 0b0000_0010;
        const SET_ANSWER = 0b0000_0100;
        const RESET      = 0b0000_1000;
        const FINALIZE   = 0b0001_0000;
        const PARTY_A    = 0b0010_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Null,
    NoAnswer,
    Failed,
    Busy,
    Answered,
    Congestion,
}

impl Disposition {
    /// Ordering used by §4.8's "disposition < Answered" filter and §8.7's invariant.
    fn rank(self) -> u8 {
        match self {
            Disposition::Null => 0,
            Disposition::NoAnswer => 1,
            Disposition::Failed => 1,
            Disposition::Busy => 1,
            Disposition::Congestion => 1,
            Disposition::Answered => 2,
        }
    }

    pub fn is_below_answered(self) -> bool {
        self.rank() < Disposition::Answered.rank()
    }
}

/// One record in a channel's chain.
#[derive(Debug, Clone)]
pub struct CdrRecord {
    pub party_a: PartySnapshot,
    pub party_b: Option<PartySnapshot>,
    pub state: CdrState,
    pub start: Option<Timestamp>,
    pub answer: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub disposition: Disposition,
    pub sequence: u32,
    pub flags: CdrFlags,
    /// Cached identity: the Party-A channel name at creation. Stable across snapshot swaps.
    pub name: String,
    pub linkedid: String,
    /// Empty when the record is not currently in a bridge.
    pub bridge: String,
    pub appl: String,
    pub data: String,
}

impl CdrRecord {
    pub fn new(party_a: PartySnapshot) -> Self {
        let name = party_a.snapshot.name.clone();
        let linkedid = party_a.snapshot.linkedid.clone();
        let appl = party_a.snapshot.appl.clone();
        let data = party_a.snapshot.data.clone();
        CdrRecord {
            party_a,
            party_b: None,
            state: CdrState::Single,
            start: None,
            answer: None,
            end: None,
            disposition: Disposition::Null,
            sequence: next_sequence(),
            flags: CdrFlags::empty(),
            name,
            linkedid,
            bridge: String::new(),
            appl,
            data,
        }
    }

    /// Append-forward construction used by forks (§4.4) and `fork()` (§6.2): copies
    /// `linkedid`/`appl`/`data`/Party-A forward and leaves timestamps/disposition fresh.
    pub fn fork_from(prev: &CdrRecord) -> Self {
        let mut fresh = CdrRecord::new(prev.party_a.clone());
        fresh.linkedid = prev.linkedid.clone();
        fresh
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, CdrState::Finalized)
    }

    /// Whenever Party A becomes Up and `answer` is unset, stamp it (§4.3 answer detection).
    pub fn check_party_a_answer(&mut self, now: Timestamp) {
        if self.answer.is_none() && self.party_a.snapshot.is_up() {
            self.answer = Some(now);
        }
    }

    /// Sets `end` and derives disposition if not already finalized (§4.3, idempotent).
    pub fn finalize(&mut self, now: Timestamp, log_congestion: bool) {
        if self.end.is_some() {
            return;
        }
        self.end = Some(now);
        if self.disposition == Disposition::Null {
            if let Some(disposition) = self.derive_disposition(log_congestion) {
                self.disposition = disposition;
            }
        }
    }

    /// `None` means "leave disposition as-is" (§4.3: an unmatched non-zero cause
    /// never overwrites whatever disposition the record already carries).
    fn derive_disposition(&self, log_congestion: bool) -> Option<Disposition> {
        if self.answer.is_some() {
            return Some(Disposition::Answered);
        }
        let cause = if self.party_a.snapshot.hangupcause != 0 {
            self.party_a.snapshot.hangupcause
        } else {
            self.party_b
                .as_ref()
                .map(|b| b.snapshot.hangupcause)
                .unwrap_or(0)
        };
        if cause == 0 {
            return Some(Disposition::Failed);
        }
        disposition_from_hangupcause(cause, log_congestion)
    }
}

/// Hangup-cause → disposition mapping at finalize (§4.3). Returns `None` for a cause
/// with no mapping entry, meaning the disposition is left unchanged — only the
/// both-causes-zero case falls back to `Failed`, and that is handled by the caller.
pub fn disposition_from_hangupcause(cause: i32, log_congestion: bool) -> Option<Disposition> {
    const BUSY: i32 = 17;
    const NO_ROUTE_DEST: i32 = 3;
    const UNREGISTERED: i32 = 20;
    const NORMAL_CLEARING: i32 = 16;
    const NO_ANSWER: i32 = 19;
    const CONGESTION: i32 = 34;

    match cause {
        BUSY => Some(Disposition::Busy),
        NO_ROUTE_DEST | UNREGISTERED => Some(Disposition::Failed),
        NORMAL_CLEARING | NO_ANSWER => Some(Disposition::NoAnswer),
        CONGESTION => Some(if log_congestion {
            Disposition::Congestion
        } else {
            Disposition::Failed
        }),
        _ => None,
    }
}

/// Dial-status → disposition mapping on dial-end (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DialStatus {
    Answer,
    Busy,
    Cancel,
    NoAnswer,
    Congestion,
    Failed,
}

pub fn disposition_from_dial_status(status: DialStatus, log_congestion: bool) -> Disposition {
    match status {
        DialStatus::Answer => Disposition::Answered,
        DialStatus::Busy => Disposition::Busy,
        DialStatus::Cancel | DialStatus::NoAnswer => Disposition::NoAnswer,
        DialStatus::Congestion => {
            if log_congestion {
                Disposition::Congestion
            } else {
                Disposition::Failed
            }
        }
        DialStatus::Failed => Disposition::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ChannelFlags, ChannelSnapshot, ChannelState};
    use chrono::Utc;
    use std::sync::Arc;

    fn party(name: &str) -> PartySnapshot {
        PartySnapshot::new(Arc::new(ChannelSnapshot {
            name: name.to_string(),
            uniqueid: name.to_string(),
            linkedid: "link1".to_string(),
            accountcode: String::new(),
            caller_name: String::new(),
            caller_number: String::new(),
            caller_dnid: String::new(),
            caller_subaddr: String::new(),
            dialed_subaddr: String::new(),
            exten: String::new(),
            context: String::new(),
            priority: 1,
            appl: String::new(),
            data: String::new(),
            state: ChannelState::Down,
            amaflags: 0,
            hangupcause: 0,
            creation_time: Utc::now(),
            flags: ChannelFlags::empty(),
        }))
    }

    #[test]
    fn sequence_numbers_strictly_increase() {
        let a = next_sequence();
        let b = next_sequence();
        assert!(b > a);
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut rec = CdrRecord::new(party("SIP/A"));
        let t1 = Utc::now();
        rec.finalize(t1, false);
        let end1 = rec.end;
        let t2 = t1 + chrono::Duration::seconds(10);
        rec.finalize(t2, false);
        assert_eq!(rec.end, end1);
    }

    #[test]
    fn finalize_derives_answered_when_answer_set() {
        let mut rec = CdrRecord::new(party("SIP/A"));
        rec.answer = Some(Utc::now());
        rec.finalize(Utc::now(), false);
        assert_eq!(rec.disposition, Disposition::Answered);
    }

    #[test]
    fn congestion_maps_to_failed_unless_log_congestion() {
        assert_eq!(
            disposition_from_hangupcause(34, false),
            Some(Disposition::Failed)
        );
        assert_eq!(
            disposition_from_hangupcause(34, true),
            Some(Disposition::Congestion)
        );
    }

    #[test]
    fn unmatched_nonzero_cause_leaves_disposition_unchanged() {
        assert_eq!(disposition_from_hangupcause(1, false), None);
    }

    #[test]
    fn finalize_leaves_disposition_null_for_unmapped_nonzero_cause() {
        let mut rec = CdrRecord::new(party("SIP/A"));
        rec.party_a.snapshot = Arc::new(ChannelSnapshot {
            hangupcause: 1,
            ..(*rec.party_a.snapshot).clone()
        });
        rec.finalize(Utc::now(), false);
        assert_eq!(rec.disposition, Disposition::Null);
    }

    #[test]
    fn finalize_maps_zero_cause_to_failed() {
        let mut rec = CdrRecord::new(party("SIP/A"));
        rec.finalize(Utc::now(), false);
        assert_eq!(rec.disposition, Disposition::Failed);
    }

    #[test]
    fn fork_from_copies_linkedid_and_party_a_but_resets_timestamps() {
        let mut prev = CdrRecord::new(party("SIP/A"));
        prev.start = Some(Utc::now());
        prev.linkedid = "shared-link".to_string();
        let forked = CdrRecord::fork_from(&prev);
        assert_eq!(forked.linkedid, "shared-link");
        assert!(forked.start.is_none());
        assert_ne!(forked.sequence, prev.sequence);
    }
}
