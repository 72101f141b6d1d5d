use crate::record::CdrRecord;
use crate::snapshot::Timestamp;
use crate::state::{CdrState, HandleOutcome};

/// DP accepts Party-A updates; a CEP change with no Party B re-dispatches to Single,
/// one with a Party B finalizes this record and lets the router fork a new Single (§4.3, §4.4).
pub fn process_party_a(
    record: &mut CdrRecord,
    now: Timestamp,
    log_congestion: bool,
    cep_changed: bool,
) -> HandleOutcome {
    if record.party_a.snapshot.is_zombie() {
        record.finalize(now, log_congestion);
        record.state = CdrState::Finalized;
        record.state.on_enter(record, now, false, log_congestion);
        return HandleOutcome::Handled;
    }

    if cep_changed {
        if record.party_b.is_none() {
            record.state = CdrState::Single;
            return HandleOutcome::Redispatch;
        }
        record.finalize(now, log_congestion);
        record.state = CdrState::Finalized;
        record.state.on_enter(record, now, false, log_congestion);
        return HandleOutcome::NotHandled;
    }

    record.check_party_a_answer(now);
    HandleOutcome::Handled
}

/// DP → F + new S on dial-begin (§4.3, §4.4): this record finalizes; the router
/// creates a fresh Single record to receive the dial-begin.
pub fn process_dial_begin(record: &mut CdrRecord, now: Timestamp, log_congestion: bool) {
    record.finalize(now, log_congestion);
    record.state = CdrState::Finalized;
    record.state.on_enter(record, now, false, log_congestion);
}
