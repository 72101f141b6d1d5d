//! Channel/bridge snapshots and the per-CDR party wrapper around them (§3, §4.1).

use bitflags::bitflags;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub type Timestamp = DateTime<Utc>;

bitflags! {
    /// Flags carried on a `ChannelSnapshot`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ChannelFlags: u8 {
        const OUTGOING   = 0b0000_0001;
        const ORIGINATED = 0b0000_0010;
        const ZOMBIE     = 0b0000_0100;
    }
}

bitflags! {
    /// Per-party flags stored on a `PartySnapshot` (distinct from channel flags).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct PartyFlags: u8 {
        const PARTY_A = 0b0000_0001;
    }
}

/// Whether the channel has reached the "Up" (answered) state, per §4.3's answer detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelState {
    Down,
    Ringing,
    Up,
}

/// Immutable point-in-time view of a channel, owned by the event source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub name: String,
    pub uniqueid: String,
    pub linkedid: String,
    pub accountcode: String,
    pub caller_name: String,
    pub caller_number: String,
    pub caller_dnid: String,
    pub caller_subaddr: String,
    pub dialed_subaddr: String,
    pub exten: String,
    pub context: String,
    pub priority: i32,
    pub appl: String,
    pub data: String,
    pub state: ChannelState,
    pub amaflags: i32,
    pub hangupcause: i32,
    pub creation_time: Timestamp,
    pub flags: ChannelFlags,
}

impl ChannelSnapshot {
    pub fn is_up(&self) -> bool {
        self.state == ChannelState::Up
    }

    pub fn is_zombie(&self) -> bool {
        self.flags.contains(ChannelFlags::ZOMBIE)
    }

    /// A channel is "dialed" iff Outgoing and not Originated (§4.2, §GLOSSARY).
    pub fn is_dialed(&self) -> bool {
        self.flags.contains(ChannelFlags::OUTGOING) && !self.flags.contains(ChannelFlags::ORIGINATED)
    }

    /// A CEP change relative to `old`: context, extension, priority, or application differ.
    pub fn cep_changed_from(&self, old: &ChannelSnapshot) -> bool {
        self.context != old.context
            || self.exten != old.exten
            || self.priority != old.priority
            || self.appl != old.appl
    }
}

/// Immutable view of a bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSnapshot {
    pub uniqueid: String,
    pub technology: String,
}

impl BridgeSnapshot {
    /// Holding bridges are not real bridges for pairing purposes (§6.1).
    pub fn is_holding_bridge(&self) -> bool {
        self.technology == "holding_bridge"
    }
}

/// A single named variable, stored in insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    pub value: String,
}

/// A mutable per-CDR wrapper around a shared, immutable `ChannelSnapshot` (§3, §4.1).
#[derive(Debug, Clone)]
pub struct PartySnapshot {
    pub snapshot: Arc<ChannelSnapshot>,
    pub userfield: String,
    pub flags: PartyFlags,
    pub variables: Vec<Variable>,
}

impl PartySnapshot {
    pub fn new(snapshot: Arc<ChannelSnapshot>) -> Self {
        PartySnapshot {
            snapshot,
            userfield: String::new(),
            flags: PartyFlags::empty(),
            variables: Vec::new(),
        }
    }

    pub fn is_dialed(&self) -> bool {
        self.snapshot.is_dialed()
    }

    pub fn set_var(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        if let Some(existing) = self.variables.iter_mut().find(|v| v.name == name) {
            existing.value = value;
        } else {
            self.variables.push(Variable {
                name: name.to_string(),
                value,
            });
        }
    }

    pub fn get_var(&self, name: &str) -> Option<&str> {
        self.variables
            .iter()
            .find(|v| v.name == name)
            .map(|v| v.value.as_str())
    }

    /// Replace the channel snapshot, preserving `userfield`/`flags`, and merge
    /// caller-id-derived variables per §4.1.
    pub fn swap_snapshot(&mut self, new: Arc<ChannelSnapshot>) {
        let old = &self.snapshot;
        let dnid_matches = old.caller_dnid == new.caller_dnid;
        let subaddr_matches = old.caller_subaddr == new.caller_subaddr;
        let dialed_subaddr_matches = old.dialed_subaddr == new.dialed_subaddr;

        if dnid_matches {
            self.set_var("dnid", new.caller_dnid.clone());
        }
        if subaddr_matches {
            self.set_var("callingsubaddr", new.caller_subaddr.clone());
        }
        if dialed_subaddr_matches {
            self.set_var("calledsubaddr", new.dialed_subaddr.clone());
        }

        self.snapshot = new;
    }
}
