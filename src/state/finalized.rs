use crate::record::CdrRecord;
use crate::snapshot::Timestamp;
use crate::state::HandleOutcome;

/// Finalized init hook: if `end_before_hexten` is set, close `end` immediately (§4.3).
pub fn on_enter(record: &mut CdrRecord, now: Timestamp, end_before_hexten: bool, log_congestion: bool) {
    if end_before_hexten {
        record.finalize(now, log_congestion);
    }
}

/// F absorbs Party-A updates only to (idempotently) detect Zombie; otherwise "not handled"
/// so the router may fork a new record (§4.3, §9 open question: the re-finalize is a no-op
/// because `finalize` already returns early once `end` is set).
pub fn process_party_a(record: &mut CdrRecord, now: Timestamp, log_congestion: bool) -> HandleOutcome {
    if record.party_a.snapshot.is_zombie() {
        record.finalize(now, log_congestion);
        return HandleOutcome::Handled;
    }
    HandleOutcome::NotHandled
}
