use crate::record::CdrRecord;
use crate::record::CdrFlags;
use crate::snapshot::Timestamp;
use crate::state::{CdrState, HandleOutcome};

/// Entering Pending sets `Disable` so the derived public record is suppressed (§4.3).
pub fn on_enter(record: &mut CdrRecord) {
    record.flags |= CdrFlags::DISABLE;
}

/// Clears `Disable` on transition out of Pending.
fn clear_disable(record: &mut CdrRecord) {
    record.flags.remove(CdrFlags::DISABLE);
}

/// Any definite intent (here: a CEP change) transitions P → S and re-dispatches (§4.3).
/// Dial-begin and bridge-enter are also "definite intent" but are routed directly by
/// the event router, which calls `enter_single` before re-dispatching.
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
        enter_single(record);
        return HandleOutcome::Redispatch;
    }
    HandleOutcome::Handled
}

/// Transition P → S for a definite-intent event (dial-begin, bridge-enter, or CEP change).
pub fn enter_single(record: &mut CdrRecord) {
    clear_disable(record);
    record.state = CdrState::Single;
}
