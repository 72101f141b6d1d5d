//! The event router and public `Engine` (§4.2–§4.7, §6.1, §6.2): dispatches
//! inbound events onto the right chain, drives forking and pairing, and exposes
//! the public API surface backends and call-control code call into.
//!
//! Grounded on `flow_manager/dial.rs`'s `on_dial_result` dispatch style: a small
//! set of free functions per event kind, each doing its own lookup-miss handling
//! before touching a chain.

use std::sync::Arc;

use chrono::Utc;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::backend::{Backend, BackendRegistry};
use crate::batch::BatchQueue;
use crate::builder::{self, PublicRecord};
use crate::chain::Chain;
use crate::config::Config;
use crate::error::EngineError;
use crate::indexes::Indexes;
use crate::pairing;
use crate::record::{CdrFlags, CdrRecord, DialStatus, Disposition};
use crate::snapshot::{BridgeSnapshot, ChannelSnapshot, PartySnapshot, Timestamp};
use crate::state::{self, CdrState, HandleOutcome};

/// Variable names the builder derives itself; rejected by `set_var` (§6.2).
const READONLY_VARS: &[&str] = &[
    "clid", "src", "dst", "dcontext", "channel", "dstchannel", "lastapp", "lastdata", "start",
    "answer", "end", "duration", "billsec", "disposition", "amaflags", "accountcode", "uniqueid",
    "linkedid", "userfield", "sequence",
];

/// The events the engine reacts to (§6.1). Deserializable so `cdrctl` can replay a
/// scripted event file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum Event {
    /// A channel snapshot cache entry changed: `old`/`new` absent means created/gone.
    ChannelCacheUpdate {
        old: Option<Arc<ChannelSnapshot>>,
        new: Option<Arc<ChannelSnapshot>>,
    },
    /// A dial attempt: `dialstatus` absent is dial-begin, present is dial-end.
    ChannelDial {
        caller: Option<Arc<ChannelSnapshot>>,
        peer: Arc<ChannelSnapshot>,
        dialstatus: Option<DialStatus>,
    },
    BridgeEnter {
        bridge: Arc<BridgeSnapshot>,
        channel: Arc<ChannelSnapshot>,
    },
    BridgeLeave {
        bridge: Arc<BridgeSnapshot>,
        channel: Arc<ChannelSnapshot>,
    },
}

/// Channel-name prefixes the event source tags as internal plumbing, never CDR
/// subjects in their own right (§6.1).
fn is_filtered_channel(name: &str) -> bool {
    name.starts_with("CBAnn") || name.starts_with("CBRec")
}

pub struct Engine {
    indexes: Indexes,
    config: Config,
    backends: Arc<BackendRegistry>,
    batch: Option<BatchQueue>,
}

impl Engine {
    pub fn new(config: Config) -> Self {
        let backends = Arc::new(BackendRegistry::new());
        let batch = if config.batch {
            Some(BatchQueue::start(backends.clone(), config.clone()))
        } else {
            None
        };
        Engine {
            indexes: Indexes::new(),
            config,
            backends,
            batch,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    // ---- §6.1 event dispatch -------------------------------------------------

    pub fn dispatch(&self, event: Event) {
        if !self.config.enable {
            return;
        }
        let now = Utc::now();
        match event {
            Event::ChannelCacheUpdate { old, new } => self.handle_channel_cache_update(old, new, now),
            Event::ChannelDial {
                caller,
                peer,
                dialstatus,
            } => self.handle_channel_dial(caller, peer, dialstatus, now),
            Event::BridgeEnter { bridge, channel } => {
                self.handle_bridge_enter(&channel.name, bridge, now)
            }
            Event::BridgeLeave { bridge, channel } => {
                self.handle_bridge_leave(&channel.name, bridge, now)
            }
        }
    }

    fn handle_channel_cache_update(
        &self,
        old: Option<Arc<ChannelSnapshot>>,
        new: Option<Arc<ChannelSnapshot>>,
        now: Timestamp,
    ) {
        let name = match (&old, &new) {
            (_, Some(n)) => n.name.clone(),
            (Some(o), None) => o.name.clone(),
            (None, None) => return,
        };
        if is_filtered_channel(&name) {
            return;
        }

        match (old, new) {
            (None, Some(new)) => self.handle_channel_created(new, now),
            (Some(_), None) => self.handle_channel_gone(&name, now),
            (Some(_old), Some(new)) => {
                self.handle_channel_snapshot_update(new.clone(), now);
                self.scan_party_b_updates(&name, new, now);
            }
            (None, None) => {}
        }
    }

    fn handle_channel_created(&self, new: Arc<ChannelSnapshot>, now: Timestamp) {
        let name = new.name.clone();
        let mut record = CdrRecord::new(PartySnapshot::new(new));
        CdrState::Single.on_enter(
            &mut record,
            now,
            self.config.endbeforehexten,
            self.config.congestion,
        );
        let chain = Chain::handle(record);
        self.indexes.insert_channel(name, chain);
    }

    fn handle_channel_gone(&self, name: &str, now: Timestamp) {
        let Some(chain_handle) = self.indexes.remove_channel(name) else {
            debug!("channel-gone for unknown channel {name:?}, dropping");
            return;
        };
        let (bridge_ids, records) = {
            let mut guard = chain_handle.lock();
            finalize_all(&mut guard, now, self.config.congestion);
            collect_bridge_ids_and_records(&guard, now, &self.config)
        };
        for bridge_id in bridge_ids {
            self.indexes.remove_bridge_member(&bridge_id, &chain_handle);
        }
        for record in records {
            self.post_or_queue(record);
        }
    }

    fn handle_channel_snapshot_update(&self, new: Arc<ChannelSnapshot>, now: Timestamp) {
        let name = new.name.clone();
        let Some(chain_handle) = self.indexes.lookup_channel(&name) else {
            warn!("channel update for unknown channel {name:?}, dropping");
            return;
        };
        let mut guard = chain_handle.lock();
        self.apply_party_a_update(&mut guard, new, now);
    }

    /// Always operates on the chain's tail (§3 invariant: earlier records are
    /// already finalized and no longer take events). Loops in place across
    /// `HandleOutcome::Redispatch` transitions (P→S, DP→S) and forks a fresh
    /// Single when the tail refuses a genuine CEP change, or when the tail is
    /// already Finalized and still receiving Party-A traffic (§4.3, §4.4).
    fn apply_party_a_update(&self, chain: &mut Chain, new: Arc<ChannelSnapshot>, now: Timestamp) {
        loop {
            let record = chain.tail_mut();
            let state = record.state;
            let cep_changed =
                new.cep_changed_from(&record.party_a.snapshot) && !new.appl.is_empty();
            record.party_a.swap_snapshot(new.clone());
            let outcome = state.process_party_a(record, now, self.config.congestion, cep_changed);
            match outcome {
                HandleOutcome::Handled => return,
                HandleOutcome::Redispatch => continue,
                HandleOutcome::NotHandled => {
                    if cep_changed || state == CdrState::Finalized {
                        let mut fresh = CdrRecord::fork_from(chain.tail());
                        CdrState::Single.on_enter(
                            &mut fresh,
                            now,
                            self.config.endbeforehexten,
                            self.config.congestion,
                        );
                        chain.append(fresh);
                    }
                    return;
                }
            }
        }
    }

    /// §4.7: every chain's records in S/D/B whose Party B matches the updated
    /// channel get that new snapshot.
    fn scan_party_b_updates(&self, channel_name: &str, new: Arc<ChannelSnapshot>, now: Timestamp) {
        for chain_handle in self.indexes.all_channel_chains() {
            let mut guard = chain_handle.lock();
            for record in guard.iter_mut() {
                let state = record.state;
                if !state.accepts_party_b_update() {
                    continue;
                }
                let is_match = record
                    .party_b
                    .as_ref()
                    .is_some_and(|b| b.snapshot.name == channel_name);
                if !is_match {
                    continue;
                }
                let new_party = PartySnapshot::new(new.clone());
                state::process_party_b(state, record, new_party, now, self.config.congestion);
            }
        }
    }

    fn handle_channel_dial(
        &self,
        caller: Option<Arc<ChannelSnapshot>>,
        peer: Arc<ChannelSnapshot>,
        dialstatus: Option<DialStatus>,
        now: Timestamp,
    ) {
        let Some(caller) = caller else {
            debug!("dial event with no caller channel, dropping");
            return;
        };
        match dialstatus {
            None => self.handle_dial_begin(&caller.name, peer, now),
            Some(status) => self.handle_dial_end(&caller.name, status, now),
        }
    }

    fn handle_dial_begin(&self, caller_name: &str, peer: Arc<ChannelSnapshot>, now: Timestamp) {
        let Some(chain_handle) = self.indexes.lookup_channel(caller_name) else {
            warn!("dial-begin for unknown caller {caller_name:?}, dropping");
            return;
        };
        let mut guard = chain_handle.lock();
        loop {
            let record = guard.tail_mut();
            let state = record.state;
            if !state.accepts_dial_begin() {
                debug!("dial-begin for {caller_name:?} refused by tail state {state:?}");
                return;
            }
            match state {
                CdrState::Single => {
                    record.party_b = Some(PartySnapshot::new(peer));
                    record.state = CdrState::Dial;
                    return;
                }
                CdrState::Pending => {
                    state::transition_pending_to_single(record);
                    continue;
                }
                CdrState::DialedPending => {
                    state::dialed_pending_dial_begin(record, now, self.config.congestion);
                    let mut fresh = CdrRecord::fork_from(guard.tail());
                    CdrState::Single.on_enter(
                        &mut fresh,
                        now,
                        self.config.endbeforehexten,
                        self.config.congestion,
                    );
                    fresh.party_b = Some(PartySnapshot::new(peer));
                    fresh.state = CdrState::Dial;
                    guard.append(fresh);
                    return;
                }
                _ => unreachable!("accepts_dial_begin admitted an unexpected state"),
            }
        }
    }

    fn handle_dial_end(&self, caller_name: &str, status: DialStatus, now: Timestamp) {
        let Some(chain_handle) = self.indexes.lookup_channel(caller_name) else {
            warn!("dial-end for unknown caller {caller_name:?}, dropping");
            return;
        };
        let mut guard = chain_handle.lock();
        match guard.iter_mut().rev().find(|r| r.state == CdrState::Dial) {
            Some(record) => state::dial_end(
                record,
                status,
                now,
                self.config.congestion,
                self.config.endbeforehexten,
            ),
            None => debug!("dial-end for {caller_name:?} found no Dial-state record"),
        }
    }

    fn handle_bridge_enter(&self, channel_name: &str, bridge: Arc<BridgeSnapshot>, now: Timestamp) {
        if bridge.is_holding_bridge() {
            return;
        }
        let Some(chain_handle) = self.indexes.lookup_channel(channel_name) else {
            warn!("bridge-enter for unknown channel {channel_name:?}, dropping");
            return;
        };
        let bridge_id = bridge.uniqueid.clone();
        let mut handled = false;
        {
            let mut guard = chain_handle.lock();
            loop {
                let record = guard.tail_mut();
                let state = record.state;
                if !state.accepts_bridge_enter() {
                    debug!("bridge-enter for {channel_name:?} refused by tail state {state:?}");
                    break;
                }
                match state {
                    CdrState::Pending => {
                        state::transition_pending_to_single(record);
                        continue;
                    }
                    CdrState::DialedPending => {
                        record.state = CdrState::Dial;
                        continue;
                    }
                    CdrState::Single | CdrState::Dial => {
                        record.bridge = bridge_id.clone();
                        record.state = CdrState::Bridged;
                        pairing::enter_bridge(
                            &self.indexes,
                            &chain_handle,
                            &mut *guard,
                            &bridge_id,
                            now,
                            self.config.congestion,
                        );
                        handled = true;
                        break;
                    }
                    _ => unreachable!("accepts_bridge_enter admitted an unexpected state"),
                }
            }
        }
        if handled {
            self.indexes.insert_bridge_member(&bridge_id, chain_handle);
        }
    }

    fn handle_bridge_leave(&self, channel_name: &str, bridge: Arc<BridgeSnapshot>, now: Timestamp) {
        if bridge.is_holding_bridge() {
            return;
        }
        let bridge_id = bridge.uniqueid.clone();

        if let Some(chain_handle) = self.indexes.lookup_channel(channel_name) {
            {
                let mut guard = chain_handle.lock();
                for record in guard.iter_mut() {
                    if record.state == CdrState::Bridged && record.bridge == bridge_id {
                        state::bridge_leave(record, now, self.config.congestion);
                    }
                }
                let mut pending_record = CdrRecord::fork_from(guard.tail());
                pending_record.state = CdrState::Pending;
                CdrState::Pending.on_enter(
                    &mut pending_record,
                    now,
                    self.config.endbeforehexten,
                    self.config.congestion,
                );
                guard.append(pending_record);
            }
            self.indexes.remove_bridge_member(&bridge_id, &chain_handle);
        } else {
            warn!("bridge-leave for unknown channel {channel_name:?}, dropping");
        }

        // Party-B side (§4.6): any remaining bridge member whose Party B was the
        // leaver finalizes that record in place, without appending anything.
        for member in self.indexes.bridge_members(&bridge_id) {
            let mut guard = member.lock();
            for record in guard.iter_mut() {
                let is_match = record.state == CdrState::Bridged
                    && record.bridge == bridge_id
                    && record
                        .party_b
                        .as_ref()
                        .is_some_and(|b| b.snapshot.name == channel_name);
                if is_match {
                    record.finalize(now, self.config.congestion);
                }
            }
        }
    }

    fn post_or_queue(&self, record: PublicRecord) {
        match &self.batch {
            Some(batch) => batch.enqueue(record),
            None => {
                if builder::should_post(&record, &self.config) {
                    self.backends.post_all(&record);
                }
            }
        }
    }

    // ---- §6.2 public API ------------------------------------------------------

    pub fn register_backend(&self, name: &str, backend: Arc<dyn Backend>) -> Result<(), EngineError> {
        self.backends.register(name, backend)
    }

    pub fn unregister_backend(&self, name: &str) -> Result<(), EngineError> {
        self.backends.unregister(name)
    }

    pub fn get_var(&self, channel: &str, name: &str) -> Option<String> {
        let chain = self.indexes.lookup_channel(channel)?;
        let guard = chain.lock();
        guard.tail().party_a.get_var(name).map(str::to_string)
    }

    pub fn set_var(&self, channel: &str, name: &str, value: &str) -> Result<(), EngineError> {
        if READONLY_VARS.contains(&name) {
            return Err(EngineError::Config(format!(
                "{name:?} is a readonly CDR variable"
            )));
        }
        let Some(chain) = self.indexes.lookup_channel(channel) else {
            debug!("set_var for unknown channel {channel:?}, dropping");
            return Ok(());
        };
        let mut guard = chain.lock();
        guard.tail_mut().party_a.set_var(name, value.to_string());
        Ok(())
    }

    /// Writes Party-A's userfield on every non-finalized record of `channel`'s own
    /// chain, and Party-B's userfield on any record (in any chain) whose Party B
    /// is `channel` (§6.2).
    pub fn set_userfield(&self, channel: &str, value: &str) {
        match self.indexes.lookup_channel(channel) {
            Some(chain) => {
                let mut guard = chain.lock();
                for record in guard.iter_mut() {
                    if !record.is_finalized() {
                        record.party_a.userfield = value.to_string();
                    }
                }
            }
            None => debug!("set_userfield for unknown channel {channel:?}, dropping"),
        }

        for other in self.indexes.all_channel_chains() {
            let mut guard = other.lock();
            for record in guard.iter_mut() {
                if let Some(b) = record.party_b.as_mut() {
                    if b.snapshot.name == channel {
                        b.userfield = value.to_string();
                    }
                }
            }
        }
    }

    pub fn set_property(&self, channel: &str, flag: CdrFlags) {
        self.edit_non_finalized(channel, |record| record.flags |= flag);
    }

    pub fn clear_property(&self, channel: &str, flag: CdrFlags) {
        self.edit_non_finalized(channel, |record| record.flags.remove(flag));
    }

    fn edit_non_finalized(&self, channel: &str, mut f: impl FnMut(&mut CdrRecord)) {
        let Some(chain) = self.indexes.lookup_channel(channel) else {
            debug!("property edit for unknown channel {channel:?}, dropping");
            return;
        };
        let mut guard = chain.lock();
        for record in guard.iter_mut() {
            if !record.is_finalized() {
                f(record);
            }
        }
    }

    /// Resets every non-finalized record of `channel`'s chain: timestamps are
    /// cleared and `start` restarts at now; variables are cleared unless
    /// `CdrFlags::KEEP_VARS` is set (§6.2).
    pub fn reset(&self, channel: &str, options: CdrFlags) {
        let now = Utc::now();
        let Some(chain) = self.indexes.lookup_channel(channel) else {
            debug!("reset for unknown channel {channel:?}, dropping");
            return;
        };
        let mut guard = chain.lock();
        for record in guard.iter_mut() {
            if record.is_finalized() {
                continue;
            }
            record.start = Some(now);
            record.answer = None;
            record.end = None;
            record.disposition = Disposition::Null;
            if !options.contains(CdrFlags::KEEP_VARS) {
                record.party_a.variables.clear();
                if let Some(b) = record.party_b.as_mut() {
                    b.variables.clear();
                }
            }
        }
    }

    /// Appends a fresh record carrying the tail's state/Party-B/timestamps forward,
    /// applying `SET_ANSWER`/`RESET`/`FINALIZE` as requested. Refused if the chain's
    /// last record is already Finalized (§6.2).
    pub fn fork(&self, channel: &str, options: CdrFlags) -> Result<(), EngineError> {
        let now = Utc::now();
        let Some(chain) = self.indexes.lookup_channel(channel) else {
            return Err(EngineError::Config(format!(
                "no active chain for channel {channel:?}"
            )));
        };
        let mut guard = chain.lock();
        if guard.tail().is_finalized() {
            return Err(EngineError::Config(format!(
                "cannot fork {channel:?}: chain is already finalized"
            )));
        }

        if options.contains(CdrFlags::FINALIZE) {
            finalize_all(&mut guard, now, self.config.congestion);
        }

        let mut fresh = CdrRecord::fork_from(guard.tail());
        fresh.state = guard.tail().state;
        fresh.party_b = guard.tail().party_b.clone();
        fresh.start = guard.tail().start;
        fresh.answer = guard.tail().answer;

        if options.contains(CdrFlags::SET_ANSWER) && fresh.answer.is_none() {
            fresh.answer = Some(now);
        }
        if options.contains(CdrFlags::RESET) {
            fresh.start = Some(now);
            fresh.answer = None;
            fresh.end = None;
            fresh.disposition = Disposition::Null;
        }

        guard.append(fresh);
        Ok(())
    }

    /// Cooperative shutdown (§5, §6.2): finalizes and dispatches every live chain in
    /// a single pass, then flushes the batch queue if `safeshutdown` is set.
    pub fn shutdown(&self) {
        let now = Utc::now();
        for chain_handle in self.indexes.all_channel_chains() {
            let name = chain_handle.lock().channel_name().to_string();
            self.indexes.remove_channel(&name);
            let (bridge_ids, records) = {
                let mut guard = chain_handle.lock();
                finalize_all(&mut guard, now, self.config.congestion);
                collect_bridge_ids_and_records(&guard, now, &self.config)
            };
            for bridge_id in bridge_ids {
                self.indexes.remove_bridge_member(&bridge_id, &chain_handle);
            }
            for record in records {
                self.post_or_queue(record);
            }
        }
        if self.config.safeshutdown {
            if let Some(batch) = &self.batch {
                batch.flush();
            }
        }
    }
}

fn finalize_all(chain: &mut Chain, now: Timestamp, log_congestion: bool) {
    for record in chain.iter_mut() {
        if !record.is_finalized() {
            record.finalize(now, log_congestion);
            record.state = CdrState::Finalized;
        }
    }
}

fn collect_bridge_ids_and_records(
    chain: &Chain,
    now: Timestamp,
    cfg: &Config,
) -> (Vec<String>, Vec<PublicRecord>) {
    let bridge_ids = chain
        .iter()
        .map(|r| r.bridge.clone())
        .filter(|b| !b.is_empty())
        .collect();
    let records = chain
        .iter()
        .filter_map(|r| builder::build_record(r, now, cfg))
        .collect();
    (bridge_ids, records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ChannelFlags, ChannelState};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct RecordingBackend {
        seen: StdMutex<Vec<PublicRecord>>,
        count: AtomicUsize,
    }

    impl Backend for RecordingBackend {
        fn name(&self) -> &str {
            "recording"
        }

        fn post(&self, record: &PublicRecord) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(record.clone());
            Ok(())
        }
    }

    fn channel(name: &str, flags: ChannelFlags, state: ChannelState) -> Arc<ChannelSnapshot> {
        Arc::new(ChannelSnapshot {
            name: name.to_string(),
            uniqueid: format!("{name}-uid"),
            linkedid: format!("{name}-uid"),
            accountcode: String::new(),
            caller_name: "Caller".to_string(),
            caller_number: "1000".to_string(),
            caller_dnid: String::new(),
            caller_subaddr: String::new(),
            dialed_subaddr: String::new(),
            exten: "2000".to_string(),
            context: "default".to_string(),
            priority: 1,
            appl: "AppDial".to_string(),
            data: "SIP/2000".to_string(),
            state,
            amaflags: 3,
            hangupcause: 16,
            creation_time: Utc::now(),
            flags,
        })
    }

    #[test]
    fn simple_inbound_call_answer_then_hangup_posts_one_record() {
        let engine = Engine::new(Config::default());
        let backend = Arc::new(RecordingBackend {
            seen: StdMutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        });
        engine.register_backend("recording", backend.clone()).unwrap();

        let down = channel("SIP/A-1", ChannelFlags::empty(), ChannelState::Down);
        engine.dispatch(Event::ChannelCacheUpdate {
            old: None,
            new: Some(down.clone()),
        });

        let up = channel("SIP/A-1", ChannelFlags::empty(), ChannelState::Up);
        engine.dispatch(Event::ChannelCacheUpdate {
            old: Some(down),
            new: Some(up.clone()),
        });

        engine.dispatch(Event::ChannelCacheUpdate {
            old: Some(up),
            new: None,
        });

        assert_eq!(backend.count.load(Ordering::SeqCst), 1);
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].disposition, Disposition::Answered);
    }

    #[test]
    fn dialed_channel_is_suppressed_but_caller_leg_posts() {
        let engine = Engine::new(Config::default());
        let backend = Arc::new(RecordingBackend {
            seen: StdMutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        });
        engine.register_backend("recording", backend.clone()).unwrap();

        let caller = channel("SIP/A-1", ChannelFlags::empty(), ChannelState::Up);
        engine.dispatch(Event::ChannelCacheUpdate {
            old: None,
            new: Some(caller.clone()),
        });

        let peer = channel(
            "SIP/B-1",
            ChannelFlags::OUTGOING,
            ChannelState::Down,
        );
        engine.dispatch(Event::ChannelCacheUpdate {
            old: None,
            new: Some(peer.clone()),
        });

        engine.dispatch(Event::ChannelDial {
            caller: Some(caller.clone()),
            peer: peer.clone(),
            dialstatus: None,
        });
        engine.dispatch(Event::ChannelDial {
            caller: Some(caller.clone()),
            peer: peer.clone(),
            dialstatus: Some(DialStatus::Answer),
        });

        let peer_up = channel("SIP/B-1", ChannelFlags::OUTGOING, ChannelState::Up);
        engine.dispatch(Event::ChannelCacheUpdate {
            old: Some(peer),
            new: Some(peer_up.clone()),
        });

        engine.dispatch(Event::ChannelCacheUpdate {
            old: Some(peer_up),
            new: None,
        });
        engine.dispatch(Event::ChannelCacheUpdate {
            old: Some(caller),
            new: None,
        });

        // Only the caller's (non-dialed) leg is ever built into a public record.
        assert_eq!(backend.count.load(Ordering::SeqCst), 1);
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].channel, "SIP/A-1");
        assert_eq!(seen[0].dstchannel, "SIP/B-1");
    }

    #[test]
    fn dial_end_answer_sets_disposition_without_a_separate_up_snapshot() {
        // A dial-end(ANSWER) must stamp disposition=Answered itself; it must not rely
        // on a later channel-update carrying ChannelState::Up to ever arrive.
        let engine = Engine::new(Config::default());
        let backend = Arc::new(RecordingBackend {
            seen: StdMutex::new(Vec::new()),
            count: AtomicUsize::new(0),
        });
        engine.register_backend("recording", backend.clone()).unwrap();

        let caller = channel("SIP/A-1", ChannelFlags::empty(), ChannelState::Down);
        engine.dispatch(Event::ChannelCacheUpdate {
            old: None,
            new: Some(caller.clone()),
        });

        let peer = channel("SIP/B-1", ChannelFlags::OUTGOING, ChannelState::Down);
        engine.dispatch(Event::ChannelCacheUpdate {
            old: None,
            new: Some(peer.clone()),
        });

        engine.dispatch(Event::ChannelDial {
            caller: Some(caller.clone()),
            peer: peer.clone(),
            dialstatus: None,
        });
        engine.dispatch(Event::ChannelDial {
            caller: Some(caller.clone()),
            peer: peer.clone(),
            dialstatus: Some(DialStatus::Answer),
        });

        // Caller never reports Up; hangs up directly while still DialedPending.
        engine.dispatch(Event::ChannelCacheUpdate {
            old: Some(caller),
            new: None,
        });
        engine.dispatch(Event::ChannelCacheUpdate {
            old: Some(peer),
            new: None,
        });

        assert_eq!(backend.count.load(Ordering::SeqCst), 1);
        let seen = backend.seen.lock().unwrap();
        assert_eq!(seen[0].disposition, Disposition::Answered);
    }

    #[test]
    fn set_var_rejects_readonly_names() {
        let engine = Engine::new(Config::default());
        let result = engine.set_var("SIP/A-1", "start", "bogus");
        assert!(result.is_err());
    }

    #[test]
    fn fork_is_refused_once_the_chain_is_finalized() {
        let engine = Engine::new(Config::default());
        let down = channel("SIP/A-1", ChannelFlags::empty(), ChannelState::Down);
        engine.dispatch(Event::ChannelCacheUpdate {
            old: None,
            new: Some(down.clone()),
        });
        engine.dispatch(Event::ChannelCacheUpdate {
            old: Some(down),
            new: None,
        });
        assert!(engine.fork("SIP/A-1", CdrFlags::empty()).is_err());
    }
}
