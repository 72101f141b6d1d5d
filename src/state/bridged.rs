use crate::record::CdrRecord;
use crate::snapshot::{PartySnapshot, Timestamp};
use crate::state::{CdrState, HandleOutcome};

pub fn process_party_a(record: &mut CdrRecord, now: Timestamp, log_congestion: bool) -> HandleOutcome {
    if record.party_a.snapshot.is_zombie() {
        record.finalize(now, log_congestion);
        record.state = CdrState::Finalized;
        record.state.on_enter(record, now, false, log_congestion);
        return HandleOutcome::Handled;
    }
    record.check_party_a_answer(now);
    HandleOutcome::Handled
}

pub fn process_party_b(
    record: &mut CdrRecord,
    new: PartySnapshot,
    now: Timestamp,
    log_congestion: bool,
) -> HandleOutcome {
    let zombie = new.snapshot.is_zombie();
    if let Some(existing) = record.party_b.as_mut() {
        existing.swap_snapshot(new.snapshot);
    } else {
        record.party_b = Some(new);
    }
    if zombie {
        record.finalize(now, log_congestion);
        record.state = CdrState::Finalized;
        record.state.on_enter(record, now, false, log_congestion);
    }
    HandleOutcome::Handled
}

/// Bridge-leave for this record: finalize and clear `bridge` (§4.6). Caller (the
/// pairing/router layer) is responsible for the index removal and the Pending append.
pub fn process_bridge_leave(record: &mut CdrRecord, now: Timestamp, log_congestion: bool) -> bool {
    record.finalize(now, log_congestion);
    record.state = CdrState::Finalized;
    record.bridge.clear();
    record.state.on_enter(record, now, false, log_congestion);
    true
}
