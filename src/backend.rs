//! Backend registration and dispatch (§6.2 register/unregister_backend, §9 design
//! note reshaping `ffi.rs`'s `BridgeCallbacks` C-function-pointer table into an
//! `Arc<dyn Backend>` registry).

use std::sync::Arc;

use log::warn;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::builder::PublicRecord;
use crate::error::EngineError;

/// A sink a finished `PublicRecord` is posted to. Implementations do their own I/O;
/// a failed post is logged and otherwise swallowed (§7) rather than propagated,
/// since one backend's failure must not block the others or the engine itself.
pub trait Backend: Send + Sync {
    fn name(&self) -> &str;
    fn post(&self, record: &PublicRecord) -> anyhow::Result<()>;
}

#[derive(Default)]
pub struct BackendRegistry {
    backends: RwLock<FxHashMap<String, Arc<dyn Backend>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        BackendRegistry::default()
    }

    pub fn register(&self, name: &str, backend: Arc<dyn Backend>) -> Result<(), EngineError> {
        let mut guard = self.backends.write();
        if guard.contains_key(name) {
            return Err(EngineError::BackendExists(name.to_string()));
        }
        guard.insert(name.to_string(), backend);
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> Result<(), EngineError> {
        let mut guard = self.backends.write();
        if guard.remove(name).is_none() {
            return Err(EngineError::BackendNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Posts to every registered backend; a backend's error is logged at `warn`
    /// and does not stop the remaining backends from receiving the record (§7).
    pub fn post_all(&self, record: &PublicRecord) {
        let guard = self.backends.read();
        for (name, backend) in guard.iter() {
            if let Err(err) = backend.post(record) {
                warn!(
                    "backend {name:?} failed to post record (sequence {}): {err:#}",
                    record.sequence
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{CdrFlags, Disposition};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_record() -> PublicRecord {
        PublicRecord {
            accountcode: String::new(),
            amaflags: 0,
            channel: "SIP/A".to_string(),
            clid: String::new(),
            src: String::new(),
            dst: String::new(),
            dcontext: String::new(),
            dstchannel: String::new(),
            lastapp: String::new(),
            lastdata: String::new(),
            peeraccount: String::new(),
            userfield: String::new(),
            start: None,
            answer: None,
            end: None,
            uniqueid: "uid-1".to_string(),
            linkedid: "uid-1".to_string(),
            sequence: 1,
            flags: CdrFlags::empty(),
            disposition: Disposition::Answered,
            duration: 0,
            billsec: 0,
            variables: Vec::new(),
        }
    }

    struct CountingBackend {
        count: AtomicUsize,
    }

    impl Backend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }

        fn post(&self, _record: &PublicRecord) -> anyhow::Result<()> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingBackend;

    impl Backend for FailingBackend {
        fn name(&self) -> &str {
            "failing"
        }

        fn post(&self, _record: &PublicRecord) -> anyhow::Result<()> {
            anyhow::bail!("sink unavailable")
        }
    }

    #[test]
    fn register_rejects_duplicate_names() {
        let registry = BackendRegistry::new();
        registry
            .register("a", Arc::new(CountingBackend { count: AtomicUsize::new(0) }))
            .unwrap();
        assert!(registry
            .register("a", Arc::new(CountingBackend { count: AtomicUsize::new(0) }))
            .is_err());
    }

    #[test]
    fn unregister_unknown_name_errors() {
        let registry = BackendRegistry::new();
        assert!(registry.unregister("missing").is_err());
    }

    #[test]
    fn one_backend_failing_does_not_block_the_others() {
        let registry = BackendRegistry::new();
        registry.register("failing", Arc::new(FailingBackend)).unwrap();
        registry
            .register("counting", Arc::new(CountingBackend { count: AtomicUsize::new(0) }))
            .unwrap();
        registry.post_all(&sample_record());
    }
}
