//! A channel's chain of `CdrRecord`s (§3, §9): a `Vec` plus a tail index rather than
//! linked `next`/`last` pointers, avoiding literal back-pointers.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::record::CdrRecord;

pub type ChainHandle = Arc<Mutex<Chain>>;

#[derive(Debug)]
pub struct Chain {
    records: Vec<CdrRecord>,
}

impl Chain {
    pub fn new(head: CdrRecord) -> Chain {
        Chain {
            records: vec![head],
        }
    }

    pub fn handle(head: CdrRecord) -> ChainHandle {
        Arc::new(Mutex::new(Chain::new(head)))
    }

    /// The stable channel-name identity of this chain (the head's `name`, §3 invariant).
    pub fn channel_name(&self) -> &str {
        &self.records[0].name
    }

    pub fn head(&self) -> &CdrRecord {
        &self.records[0]
    }

    pub fn head_mut(&mut self) -> &mut CdrRecord {
        &mut self.records[0]
    }

    /// The tail record: `head.last` always points here (§3 invariant #4).
    pub fn tail(&self) -> &CdrRecord {
        self.records.last().expect("chain is never empty")
    }

    pub fn tail_mut(&mut self) -> &mut CdrRecord {
        self.records.last_mut().expect("chain is never empty")
    }

    /// Indexed access for the router's tail-backward event search (§4.3, §4.4).
    pub fn record_mut(&mut self, idx: usize) -> &mut CdrRecord {
        &mut self.records[idx]
    }

    pub fn append(&mut self, record: CdrRecord) {
        self.records.push(record);
    }

    pub fn iter(&self) -> impl Iterator<Item = &CdrRecord> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CdrRecord> {
        self.records.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True if any record in the chain currently carries a non-empty `bridge` field.
    pub fn has_bridge_member(&self) -> bool {
        self.records.iter().any(|r| !r.bridge.is_empty())
    }

    /// True if every record in the chain is Finalized — the chain is ready to leave
    /// the system and be dispatched (§3 "Chain" paragraph).
    pub fn all_finalized(&self) -> bool {
        self.records.iter().all(|r| r.is_finalized())
    }
}
