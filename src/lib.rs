//! A per-channel call detail record engine: tracks one state-machine chain per
//! channel, pairs bridged legs, forks new CDR lives on dial/CEP events, and
//! dispatches finished records to registered backends (optionally batched).

mod backend;
mod batch;
mod builder;
mod chain;
mod config;
mod error;
mod indexes;
mod pairing;
mod record;
mod router;
mod snapshot;
mod state;

pub use backend::{Backend, BackendRegistry};
pub use builder::PublicRecord;
pub use config::Config;
pub use error::EngineError;
pub use record::{CdrFlags, DialStatus, Disposition};
pub use router::{Engine, Event};
pub use snapshot::{
    BridgeSnapshot, ChannelFlags, ChannelSnapshot, ChannelState, PartyFlags, Timestamp, Variable,
};
