//! The batch queue (§4 C7, §5, §6.3 batch/size/time): detaches built records from
//! the dispatching thread onto a background drain thread, grounded on
//! `flow_manager/batch.rs`'s `CallbackBatch` but retargeted to an actual
//! cross-thread handoff via `crossbeam-channel` rather than a same-thread buffer.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::debug;

use crate::backend::BackendRegistry;
use crate::builder::{should_post, PublicRecord};
use crate::config::Config;

enum BatchMsg {
    Record(PublicRecord),
    Flush,
    Shutdown,
}

/// Owns the background drain thread; dropping it flushes and joins.
pub struct BatchQueue {
    sender: Sender<BatchMsg>,
    handle: Option<JoinHandle<()>>,
}

impl BatchQueue {
    pub fn start(registry: Arc<BackendRegistry>, config: Config) -> Self {
        let (sender, receiver) = bounded::<BatchMsg>(4096);
        let timeout = Duration::from_secs(config.time.max(1) as u64);

        let handle = std::thread::spawn(move || {
            let mut buffer: Vec<PublicRecord> = Vec::new();
            loop {
                match receiver.recv_timeout(timeout) {
                    Ok(BatchMsg::Record(record)) => {
                        buffer.push(record);
                        if config.size > 0 && buffer.len() >= config.size as usize {
                            drain(&registry, &config, &mut buffer);
                        }
                    }
                    Ok(BatchMsg::Flush) => drain(&registry, &config, &mut buffer),
                    Ok(BatchMsg::Shutdown) => {
                        drain(&registry, &config, &mut buffer);
                        break;
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        if !buffer.is_empty() {
                            drain(&registry, &config, &mut buffer);
                        }
                    }
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        });

        BatchQueue {
            sender,
            handle: Some(handle),
        }
    }

    pub fn enqueue(&self, record: PublicRecord) {
        if self.sender.send(BatchMsg::Record(record)).is_err() {
            debug!("batch queue is shut down, dropping record");
        }
    }

    /// Forces an immediate drain regardless of size/time thresholds (§6.2 shutdown path).
    pub fn flush(&self) {
        let _ = self.sender.send(BatchMsg::Flush);
    }
}

impl Drop for BatchQueue {
    fn drop(&mut self) {
        let _ = self.sender.send(BatchMsg::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn drain(registry: &BackendRegistry, config: &Config, buffer: &mut Vec<PublicRecord>) {
    if buffer.is_empty() {
        return;
    }
    debug!("batch queue draining {} record(s)", buffer.len());
    for record in buffer.drain(..) {
        if should_post(&record, config) {
            registry.post_all(&record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Backend;
    use crate::record::{CdrFlags, Disposition};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc as StdArc;

    struct CountingBackend {
        count: StdArc<AtomicUsize>,
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

    fn sample_record(sequence: u32) -> PublicRecord {
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
            uniqueid: format!("uid-{sequence}"),
            linkedid: format!("uid-{sequence}"),
            sequence,
            flags: CdrFlags::empty(),
            disposition: Disposition::Answered,
            duration: 0,
            billsec: 0,
            variables: Vec::new(),
        }
    }

    #[test]
    fn flush_drains_whatever_is_buffered() {
        let count = StdArc::new(AtomicUsize::new(0));
        let registry = StdArc::new(BackendRegistry::new());
        registry
            .register(
                "counting",
                StdArc::new(CountingBackend {
                    count: count.clone(),
                }),
            )
            .unwrap();

        let mut cfg = Config::default();
        cfg.size = 100;
        cfg.time = 86_400;
        let queue = BatchQueue::start(registry, cfg);
        queue.enqueue(sample_record(1));
        queue.enqueue(sample_record(2));
        queue.flush();
        drop(queue);

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn size_threshold_triggers_an_early_drain() {
        let count = StdArc::new(AtomicUsize::new(0));
        let registry = StdArc::new(BackendRegistry::new());
        registry
            .register(
                "counting",
                StdArc::new(CountingBackend {
                    count: count.clone(),
                }),
            )
            .unwrap();

        let mut cfg = Config::default();
        cfg.size = 2;
        cfg.time = 86_400;
        let queue = BatchQueue::start(registry, cfg);
        queue.enqueue(sample_record(1));
        queue.enqueue(sample_record(2));
        drop(queue);

        assert_eq!(count.load(Ordering::SeqCst), 2);
    }
}
