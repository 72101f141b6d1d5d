use crate::record::CdrRecord;
use crate::snapshot::Timestamp;
use crate::state::{CdrState, HandleOutcome};

/// S init hook: `start = now`, then check answer (§4.3).
pub fn on_enter(record: &mut CdrRecord, now: Timestamp) {
    record.start = Some(now);
    record.check_party_a_answer(now);
}

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

/// Party-B update in Single: ignored; a Single record has no Party B (§4.3 "√†").
pub fn process_party_b(record: &CdrRecord) -> HandleOutcome {
    debug_assert!(
        record.party_b.is_none(),
        "Single record unexpectedly carries a Party B"
    );
    HandleOutcome::Handled
}
