//! The six-state CDR vtable, modelled as a tagged enum rather than a trait object
//! (§9: keeps transitions introspectable and allocation-free).

mod bridged;
mod dial;
mod dialed_pending;
mod finalized;
mod pending;
mod single;

use crate::record::CdrRecord;
use crate::snapshot::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdrState {
    Single,
    Dial,
    DialedPending,
    Bridged,
    Pending,
    Finalized,
}

/// What happened when a handler was offered an event.
#[derive(Debug)]
pub enum HandleOutcome {
    /// The event was absorbed by this record.
    Handled,
    /// The record refused the event; the router may need to fork a new record.
    NotHandled,
    /// The record transitioned and the event should be re-dispatched to the *same*
    /// record (now in its new state) — used by DP→S and P→S re-dispatch (§4.3).
    Redispatch,
}

impl CdrState {
    /// Per-state entry action run immediately after a transition into this state (§4.3 "init hooks").
    pub fn on_enter(
        self,
        record: &mut CdrRecord,
        now: Timestamp,
        end_before_hexten: bool,
        log_congestion: bool,
    ) {
        match self {
            CdrState::Single => single::on_enter(record, now),
            CdrState::Pending => pending::on_enter(record),
            CdrState::Finalized => finalized::on_enter(record, now, end_before_hexten, log_congestion),
            CdrState::Dial | CdrState::DialedPending | CdrState::Bridged => {}
        }
    }

    /// `cep_changed` is already gated on `check_new_cdr_needed` (§4.4: requires a
    /// non-empty `appl` on the new snapshot plus an actual context/exten/priority/appl diff).
    pub fn process_party_a(
        self,
        record: &mut CdrRecord,
        now: Timestamp,
        log_congestion: bool,
        cep_changed: bool,
    ) -> HandleOutcome {
        match self {
            CdrState::Single => single::process_party_a(record, now, log_congestion),
            CdrState::Dial => dial::process_party_a(record, now, log_congestion),
            CdrState::DialedPending => {
                dialed_pending::process_party_a(record, now, log_congestion, cep_changed)
            }
            CdrState::Bridged => bridged::process_party_a(record, now, log_congestion),
            CdrState::Pending => pending::process_party_a(record, now, log_congestion, cep_changed),
            CdrState::Finalized => finalized::process_party_a(record, now, log_congestion),
        }
    }

    /// Whether this state accepts a dial-begin for the record it is attached to
    /// (without yet mutating it) — used by the router to decide fork vs. handle.
    pub fn accepts_dial_begin(self) -> bool {
        matches!(
            self,
            CdrState::Single | CdrState::DialedPending | CdrState::Pending
        )
    }

    pub fn accepts_bridge_enter(self) -> bool {
        matches!(
            self,
            CdrState::Single | CdrState::Dial | CdrState::DialedPending | CdrState::Pending
        )
    }

    pub fn accepts_cep_change(self) -> bool {
        matches!(self, CdrState::DialedPending | CdrState::Pending)
    }

    /// Whether Party-B updates are accepted at all in this state (§4.3 table: only S/D/B).
    pub fn accepts_party_b_update(self) -> bool {
        matches!(self, CdrState::Single | CdrState::Dial | CdrState::Bridged)
    }
}

use crate::snapshot::PartySnapshot;

/// Party-B update dispatch (§4.3, §4.7). Only S/D/B states accept it; callers must
/// check `accepts_party_b_update` first.
pub fn process_party_b(
    state: CdrState,
    record: &mut CdrRecord,
    new: PartySnapshot,
    now: Timestamp,
    log_congestion: bool,
) -> HandleOutcome {
    match state {
        CdrState::Single => single::process_party_b(record),
        CdrState::Dial => dial::process_party_b(record, new, now, log_congestion),
        CdrState::Bridged => bridged::process_party_b(record, new, now, log_congestion),
        _ => HandleOutcome::NotHandled,
    }
}

// The remaining handlers below are narrow, router-facing entry points into otherwise
// private per-state modules — kept private at the submodule level so the tagged-enum
// dispatch above stays the single public surface for ordinary event handling.

/// P → S re-entry (§4.3): used directly by the router for both the CEP-change
/// redispatch path and the dial-begin/bridge-enter "definite intent" transitions.
pub fn transition_pending_to_single(record: &mut CdrRecord) {
    pending::enter_single(record)
}

/// D's dial-end handler (§4.3): D → DP on Answer, else derives disposition and
/// finalizes to F.
pub fn dial_end(
    record: &mut CdrRecord,
    status: crate::record::DialStatus,
    now: Timestamp,
    log_congestion: bool,
    end_before_hexten: bool,
) {
    dial::process_dial_end(record, status, now, log_congestion, end_before_hexten)
}

/// DP's dial-begin handler (§4.3): always finalizes DP to F; the router is
/// responsible for forking a fresh Single to receive the dial-begin itself.
pub fn dialed_pending_dial_begin(record: &mut CdrRecord, now: Timestamp, log_congestion: bool) {
    dialed_pending::process_dial_begin(record, now, log_congestion)
}

/// B's bridge-leave handler (§4.3): finalizes, clears `bridge`, transitions to F.
pub fn bridge_leave(record: &mut CdrRecord, now: Timestamp, log_congestion: bool) -> bool {
    bridged::process_bridge_leave(record, now, log_congestion)
}
