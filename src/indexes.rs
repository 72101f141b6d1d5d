//! The two process-wide indexes (§3 "Indexes (C2)", §5 locking model).

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::chain::ChainHandle;

/// Lock order is index → chain: callers must release an index lock before
/// acquiring any chain lock (§5).
#[derive(Default)]
pub struct Indexes {
    active_by_channel: RwLock<FxHashMap<String, ChainHandle>>,
    active_by_bridge: RwLock<FxHashMap<String, SmallVec<[ChainHandle; 4]>>>,
}

impl Indexes {
    pub fn new() -> Self {
        Indexes::default()
    }

    pub fn lookup_channel(&self, name: &str) -> Option<ChainHandle> {
        self.active_by_channel.read().get(name).cloned()
    }

    pub fn insert_channel(&self, name: String, chain: ChainHandle) {
        self.active_by_channel.write().insert(name, chain);
    }

    pub fn remove_channel(&self, name: &str) -> Option<ChainHandle> {
        self.active_by_channel.write().remove(name)
    }

    /// A consistent snapshot of every chain touching `bridge_id` at call time (§5: iteration
    /// returns a snapshot of references, taken under the read lock and then released).
    pub fn bridge_members(&self, bridge_id: &str) -> SmallVec<[ChainHandle; 4]> {
        self.active_by_bridge
            .read()
            .get(bridge_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn insert_bridge_member(&self, bridge_id: &str, chain: ChainHandle) {
        let mut guard = self.active_by_bridge.write();
        let bucket = guard.entry(bridge_id.to_string()).or_default();
        if !bucket.iter().any(|existing| std::sync::Arc::ptr_eq(existing, &chain)) {
            bucket.push(chain);
        }
    }

    /// Removes `chain` from `bridge_id`'s bucket; drops the bucket entirely once empty.
    pub fn remove_bridge_member(&self, bridge_id: &str, chain: &ChainHandle) {
        let mut guard = self.active_by_bridge.write();
        if let Some(bucket) = guard.get_mut(bridge_id) {
            bucket.retain(|existing| !std::sync::Arc::ptr_eq(existing, chain));
            if bucket.is_empty() {
                guard.remove(bridge_id);
            }
        }
    }

    /// A snapshot of every chain currently known to the channel index, for shutdown
    /// dispatch-all and the Party-B scan (§4.7, §5 "Cancellation and timeouts").
    pub fn all_channel_chains(&self) -> Vec<ChainHandle> {
        self.active_by_channel.read().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::record::CdrRecord;
    use crate::snapshot::{ChannelFlags, ChannelSnapshot, ChannelState, PartySnapshot};
    use chrono::Utc;
    use std::sync::Arc;

    fn chain_for(name: &str) -> ChainHandle {
        let snap = Arc::new(ChannelSnapshot {
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
            creation_time: Utc::now(),
            flags: ChannelFlags::empty(),
        });
        Chain::handle(CdrRecord::new(PartySnapshot::new(snap)))
    }

    #[test]
    fn bridge_index_deduplicates_same_chain() {
        let idx = Indexes::new();
        let chain = chain_for("SIP/A");
        idx.insert_bridge_member("b1", chain.clone());
        idx.insert_bridge_member("b1", chain.clone());
        assert_eq!(idx.bridge_members("b1").len(), 1);
    }

    #[test]
    fn removing_last_bridge_member_drops_the_bucket() {
        let idx = Indexes::new();
        let chain = chain_for("SIP/A");
        idx.insert_bridge_member("b1", chain.clone());
        idx.remove_bridge_member("b1", &chain);
        assert!(idx.bridge_members("b1").is_empty());
    }

    #[test]
    fn channel_lookup_round_trips() {
        let idx = Indexes::new();
        let chain = chain_for("SIP/A");
        idx.insert_channel("SIP/A".to_string(), chain.clone());
        assert!(idx.lookup_channel("SIP/A").is_some());
        idx.remove_channel("SIP/A");
        assert!(idx.lookup_channel("SIP/A").is_none());
    }
}
