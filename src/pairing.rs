//! Party-A selection (§4.2) and bridge pairing (§4.5): self-pairing plus the
//! two-pass cross-pairing candidate sweep.

use log::{debug, warn};
use smallvec::SmallVec;

use crate::chain::{Chain, ChainHandle};
use crate::indexes::Indexes;
use crate::record::CdrRecord;
use crate::snapshot::{PartySnapshot, Timestamp};
use crate::state::CdrState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyAWinner {
    Left,
    Right,
}

/// §4.2: dialed-ness, then the PartyA flag, then creation time, then left-wins tiebreak.
pub fn select_party_a(left: &PartySnapshot, right: &PartySnapshot) -> PartyAWinner {
    let left_dialed = left.is_dialed();
    let right_dialed = right.is_dialed();
    if left_dialed != right_dialed {
        return if left_dialed {
            PartyAWinner::Right
        } else {
            PartyAWinner::Left
        };
    }

    let left_flag = left.flags.contains(crate::snapshot::PartyFlags::PARTY_A);
    let right_flag = right.flags.contains(crate::snapshot::PartyFlags::PARTY_A);
    if left_flag != right_flag {
        return if left_flag {
            PartyAWinner::Left
        } else {
            PartyAWinner::Right
        };
    }

    if left.snapshot.creation_time < right.snapshot.creation_time {
        return PartyAWinner::Left;
    }
    if right.snapshot.creation_time < left.snapshot.creation_time {
        return PartyAWinner::Right;
    }

    PartyAWinner::Left
}

/// True if `ours` wins Party A over `theirs` (i.e. `theirs` is not preferred).
fn we_win(ours: &PartySnapshot, theirs: &PartySnapshot) -> bool {
    select_party_a(ours, theirs) == PartyAWinner::Left
}

/// A best-effort, deadlock-avoiding lock of a candidate chain while `self` is already
/// locked: contended candidates are skipped for this pairing attempt rather than
/// blocked on, since there is no canonical address ordering between two sibling
/// chains here (see DESIGN.md's lock-order note for C4).
fn try_lock_candidate(candidate: &ChainHandle) -> Option<parking_lot::MutexGuard<'_, Chain>> {
    candidate.try_lock()
}

/// Runs the full bridge-enter pairing sequence (§4.5) against `chain`'s tail record,
/// which the caller has already set to `bridge` and transitioned to Bridged. `chain`
/// is the already-locked guard for `own_chain`; forks discovered during cross-pairing
/// are appended directly onto it. Bridge-index insertion of `own_chain` is left to the
/// caller, which performs it after releasing the chain lock (index ← chain ordering).
pub fn enter_bridge(
    indexes: &Indexes,
    own_chain: &ChainHandle,
    chain: &mut Chain,
    bridge_id: &str,
    now: Timestamp,
    log_congestion: bool,
) {
    let members: SmallVec<[ChainHandle; 4]> = indexes.bridge_members(bridge_id);

    // Step 2: self-pairing.
    let mut paired = false;
    {
        let record = chain.tail_mut();
        for candidate in members.iter() {
            if std::sync::Arc::ptr_eq(candidate, own_chain) {
                continue;
            }
            let Some(mut guard) = try_lock_candidate(candidate) else {
                debug!("bridge pairing: candidate chain contended, skipping this round");
                continue;
            };
            for cand_record in guard.iter_mut() {
                if cand_record.state != CdrState::Bridged || cand_record.bridge != bridge_id {
                    continue;
                }
                // Try the candidate's Party A, then its Party B, as our prospective Party B.
                let attempts: SmallVec<[PartySnapshot; 2]> = {
                    let mut v = SmallVec::new();
                    v.push(cand_record.party_a.clone());
                    if let Some(b) = cand_record.party_b.clone() {
                        v.push(b);
                    }
                    v
                };
                for (i, attempt) in attempts.into_iter().enumerate() {
                    if we_win(&record.party_a, &attempt) {
                        continue;
                    }
                    // The candidate is preferred as Party A over us: adopt it as our Party B.
                    record.party_b = Some(attempt);
                    if i == 0 && cand_record.party_b.is_none() {
                        // Stealing: finalize the donor without transitioning its state.
                        cand_record.finalize(now, log_congestion);
                    }
                    paired = true;
                    break;
                }
                if paired {
                    break;
                }
            }
            if paired {
                break;
            }
        }
    }

    // Step 3: cross-pairing.
    let cross_paired = cross_pair(indexes, own_chain, chain, bridge_id, &members, now, log_congestion);

    if !paired && !cross_paired {
        // No peer found anywhere: finalize; a later arrival may re-activate this record.
        chain.tail_mut().finalize(now, log_congestion);
    }
}

/// Step 3 of §4.5: builds the two-pass candidate set from every record already in the
/// bridge and resolves each candidate not already our A/B. Returns true if any pairing
/// action (append/assign) was taken.
fn cross_pair(
    indexes: &Indexes,
    own_chain: &ChainHandle,
    chain: &mut Chain,
    bridge_id: &str,
    members: &SmallVec<[ChainHandle; 4]>,
    now: Timestamp,
    log_congestion: bool,
) -> bool {
    let mut candidates: Vec<PartySnapshot> = Vec::new();
    let mut seen_names: Vec<String> = Vec::new();

    for candidate in members.iter() {
        if std::sync::Arc::ptr_eq(candidate, own_chain) {
            continue;
        }
        let Some(guard) = try_lock_candidate(candidate) else {
            continue;
        };
        for cand_record in guard.iter() {
            if cand_record.bridge != bridge_id {
                continue;
            }
            seen_names.push(cand_record.party_a.snapshot.name.clone());
            candidates.push(cand_record.party_a.clone());
        }
    }
    for candidate in members.iter() {
        if std::sync::Arc::ptr_eq(candidate, own_chain) {
            continue;
        }
        let Some(guard) = try_lock_candidate(candidate) else {
            continue;
        };
        for cand_record in guard.iter() {
            if cand_record.bridge != bridge_id {
                continue;
            }
            if let Some(b) = &cand_record.party_b {
                if !seen_names.contains(&b.snapshot.name) {
                    candidates.push(b.clone());
                }
            }
        }
    }

    let mut did_something = false;
    for x in candidates {
        let our_party_a = chain.tail().party_a.clone();
        if x.snapshot.name == our_party_a.snapshot.name {
            continue;
        }
        if let Some(b) = &chain.tail().party_b {
            if b.snapshot.name == x.snapshot.name {
                continue;
            }
        }

        if we_win(&our_party_a, &x) {
            // We win Party A: append a new record on our own chain with party_b = X.
            let mut fresh = CdrRecord::fork_from(chain.tail());
            fresh.party_b = Some(x);
            fresh.bridge = bridge_id.to_string();
            fresh.state = CdrState::Bridged;
            chain.append(fresh);
            did_something = true;
            continue;
        }

        // X wins Party A over us: place it on X's home chain.
        if let Some(home) = indexes.lookup_channel(&x.snapshot.name) {
            let Some(mut guard) = try_lock_candidate(&home) else {
                continue;
            };
            let home_is_party_a = guard
                .iter()
                .any(|r| r.party_a.snapshot.name == x.snapshot.name);
            if home_is_party_a {
                if let Some(target) = guard
                    .iter_mut()
                    .find(|r| r.party_a.snapshot.name == x.snapshot.name && r.bridge == bridge_id)
                {
                    if target.party_b.is_none() {
                        target.party_b = Some(our_party_a.clone());
                        // A legitimately re-paired, previously stolen candidate is live again.
                        target.end = None;
                    } else {
                        let mut fresh = CdrRecord::fork_from(target);
                        fresh.party_b = Some(our_party_a.clone());
                        fresh.bridge = bridge_id.to_string();
                        fresh.state = CdrState::Bridged;
                        guard.append(fresh);
                    }
                    did_something = true;
                }
            } else {
                // X is Party B of its home record: append a Bridged record there.
                let mut fresh = CdrRecord::new(x.clone());
                fresh.party_b = Some(our_party_a.clone());
                fresh.bridge = bridge_id.to_string();
                fresh.state = CdrState::Bridged;
                guard.append(fresh);
                did_something = true;
            }
        } else {
            // No chain owns X's channel name: create one and warn (§4.5, §9 open question).
            warn!(
                "bridge pairing: creating new chain for party-B-only candidate {:?} with no home chain",
                x.snapshot.name
            );
            let mut fresh = CdrRecord::new(x.clone());
            fresh.party_b = Some(our_party_a.clone());
            fresh.bridge = bridge_id.to_string();
            fresh.state = CdrState::Bridged;
            let new_chain = Chain::handle(fresh);
            indexes.insert_channel(x.snapshot.name.clone(), new_chain.clone());
            indexes.insert_bridge_member(bridge_id, new_chain);
            did_something = true;
        }
    }

    did_something
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ChannelFlags, ChannelSnapshot, ChannelState};
    use chrono::Utc;
    use std::sync::Arc;

    fn party(name: &str, flags: ChannelFlags, party_a_flag: bool, t: Timestamp) -> PartySnapshot {
        let mut p = PartySnapshot::new(Arc::new(ChannelSnapshot {
            name: name.to_string(),
            uniqueid: name.to_string(),
            linkedid: String::new(),
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
            creation_time: t,
            flags,
        }));
        if party_a_flag {
            p.flags |= crate::snapshot::PartyFlags::PARTY_A;
        }
        p
    }

    #[test]
    fn non_dialed_beats_dialed() {
        let t = Utc::now();
        let l = party("L", ChannelFlags::empty(), false, t);
        let r = party("R", ChannelFlags::OUTGOING, false, t);
        assert_eq!(select_party_a(&l, &r), PartyAWinner::Left);
        assert_eq!(select_party_a(&r, &l), PartyAWinner::Right);
    }

    #[test]
    fn party_a_flag_wins_when_dialed_ness_ties() {
        let t = Utc::now();
        let l = party("L", ChannelFlags::empty(), false, t);
        let r = party("R", ChannelFlags::empty(), true, t);
        assert_eq!(select_party_a(&l, &r), PartyAWinner::Right);
        assert_eq!(select_party_a(&r, &l), PartyAWinner::Left);
    }

    #[test]
    fn earlier_creation_time_wins_on_full_tie_otherwise() {
        let earlier = Utc::now();
        let later = earlier + chrono::Duration::seconds(1);
        let l = party("L", ChannelFlags::empty(), false, later);
        let r = party("R", ChannelFlags::empty(), false, earlier);
        assert_eq!(select_party_a(&l, &r), PartyAWinner::Right);
    }

    #[test]
    fn left_wins_a_complete_tie() {
        let t = Utc::now();
        let l = party("L", ChannelFlags::empty(), false, t);
        let r = party("R", ChannelFlags::empty(), false, t);
        assert_eq!(select_party_a(&l, &r), PartyAWinner::Left);
    }
}
