use crate::record::{disposition_from_dial_status, CdrRecord, DialStatus, Disposition};
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

pub fn process_party_b(record: &mut CdrRecord, new: PartySnapshot, now: Timestamp, log_congestion: bool) -> HandleOutcome {
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

/// D → DP on ANSWER, D → F otherwise, or on Party-B Zombie (§4.3).
pub fn process_dial_end(
    record: &mut CdrRecord,
    status: DialStatus,
    now: Timestamp,
    log_congestion: bool,
    end_before_hexten: bool,
) {
    let party_b_zombie = record
        .party_b
        .as_ref()
        .map(|b| b.snapshot.is_zombie())
        .unwrap_or(false);

    // Set unconditionally before branching, mirroring the original's unconditional
    // assignment ahead of its ANSWERED check (§4.3 "Dial-status → disposition").
    record.disposition = disposition_from_dial_status(status, log_congestion);

    if status == DialStatus::Answer && !party_b_zombie {
        record.state = CdrState::DialedPending;
        record.state.on_enter(record, now, end_before_hexten, log_congestion);
        return;
    }

    if record.disposition == Disposition::Null {
        record.disposition = Disposition::Failed;
    }
    record.finalize(now, log_congestion);
    record.state = CdrState::Finalized;
    record.state.on_enter(record, now, end_before_hexten, log_congestion);
}
