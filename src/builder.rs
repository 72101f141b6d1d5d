//! The record builder (§4.8): turns a finalized `CdrRecord` into the `PublicRecord`
//! a backend actually sees, and decides whether it is posted at all.

use crate::config::Config;
use crate::record::{CdrFlags, CdrRecord, Disposition};
use crate::snapshot::{Timestamp, Variable};

/// The row a backend is handed. Every field here is derived once, at build time,
/// from the cached chain fields and the final Party-A/Party-B snapshots — never
/// read live off a channel again (§4.8).
#[derive(Debug, Clone)]
pub struct PublicRecord {
    pub accountcode: String,
    pub amaflags: i32,
    pub channel: String,
    pub clid: String,
    pub src: String,
    pub dst: String,
    pub dcontext: String,
    pub dstchannel: String,
    pub lastapp: String,
    pub lastdata: String,
    pub peeraccount: String,
    pub userfield: String,
    pub start: Option<Timestamp>,
    pub answer: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub uniqueid: String,
    pub linkedid: String,
    pub sequence: u32,
    pub flags: CdrFlags,
    pub disposition: Disposition,
    pub duration: i64,
    pub billsec: i64,
    pub variables: Vec<Variable>,
}

/// Builds the public row for a finalized record, or `None` if the record's Party A
/// is itself a dialed channel — those legs are suppressed entirely at build time,
/// not merely filtered at post time (§4.8).
pub fn build_record(record: &CdrRecord, now: Timestamp, cfg: &Config) -> Option<PublicRecord> {
    if record.party_a.is_dialed() {
        return None;
    }

    let (dstchannel, peeraccount) = match &record.party_b {
        Some(b) => (b.snapshot.name.clone(), b.snapshot.accountcode.clone()),
        None => (String::new(), String::new()),
    };

    let userfield = match &record.party_b {
        Some(b) if !b.userfield.is_empty() => {
            format!("{};{}", record.party_a.userfield, b.userfield)
        }
        _ => record.party_a.userfield.clone(),
    };

    let mut variables = record.party_a.variables.clone();
    if let Some(b) = &record.party_b {
        for var in &b.variables {
            if !variables.iter().any(|v| v.name == var.name) {
                variables.push(var.clone());
            }
        }
    }

    Some(PublicRecord {
        accountcode: record.party_a.snapshot.accountcode.clone(),
        amaflags: record.party_a.snapshot.amaflags,
        channel: record.party_a.snapshot.name.clone(),
        clid: merge_clid(
            &record.party_a.snapshot.caller_name,
            &record.party_a.snapshot.caller_number,
        ),
        src: record.party_a.snapshot.caller_number.clone(),
        dst: record.party_a.snapshot.exten.clone(),
        dcontext: record.party_a.snapshot.context.clone(),
        dstchannel,
        lastapp: record.appl.clone(),
        lastdata: record.data.clone(),
        peeraccount,
        userfield,
        start: record.start,
        answer: record.answer,
        end: record.end,
        uniqueid: record.party_a.snapshot.uniqueid.clone(),
        linkedid: record.linkedid.clone(),
        sequence: record.sequence,
        flags: record.flags,
        disposition: record.disposition,
        duration: duration_seconds(record, now),
        billsec: billsec_seconds(record, cfg),
        variables,
    })
}

fn duration_seconds(record: &CdrRecord, now: Timestamp) -> i64 {
    let Some(start) = record.start else {
        return 0;
    };
    let end = record.end.unwrap_or(now);
    (end - start).num_seconds().max(0)
}

/// Billsec runs from answer to end. When `initiatedseconds` is set, a leftover
/// fraction of 500ms or more rounds the second count up (§6.3).
fn billsec_seconds(record: &CdrRecord, cfg: &Config) -> i64 {
    let (Some(answer), Some(end)) = (record.answer, record.end) else {
        return 0;
    };
    let delta = end - answer;
    let mut secs = delta.num_seconds().max(0);
    if cfg.initiatedseconds {
        let remainder_ms = (delta - chrono::Duration::seconds(secs)).num_milliseconds();
        if remainder_ms >= 500 {
            secs += 1;
        }
    }
    secs
}

fn merge_clid(name: &str, number: &str) -> String {
    match (name.is_empty(), number.is_empty()) {
        (true, true) => String::new(),
        (true, false) => number.to_string(),
        (false, true) => name.to_string(),
        (false, false) => format!("\"{name}\" <{number}>"),
    }
}

/// Post-time filtering (§4.8, §6.3): a record flagged `DISABLE` never posts; an
/// unanswered record with an empty `channel` or `dstchannel` is suppressed unless
/// `unanswered` is set.
pub fn should_post(record: &PublicRecord, cfg: &Config) -> bool {
    if record.flags.contains(CdrFlags::DISABLE) {
        return false;
    }
    if !cfg.unanswered
        && record.disposition.is_below_answered()
        && (record.channel.is_empty() || record.dstchannel.is_empty())
    {
        return false;
    }
    true
}
