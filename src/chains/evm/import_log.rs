use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, sleep_until},
};
use tracing::info;

const MAX_BLOCKS: u64 = 1000;
const MAX_AGE: Duration = Duration::from_secs(60);

struct Entry {
    number: u64,
    txns: u64,
    logs: u64,
}

struct Segment {
    head: u64,
    blocks: u64,
    txns: u64,
    logs: u64,
    started: Instant,
}

impl Segment {
    fn new() -> Self {
        Self {
            head: 0,
            blocks: 0,
            txns: 0,
            logs: 0,
            started: Instant::now(),
        }
    }

    fn add(&mut self, entry: Entry) {
        self.head = entry.number;
        self.blocks += 1;
        self.txns += entry.txns;
        self.logs += entry.logs;
    }

    fn flush(&mut self, chain: &str) {
        info!(
            chain,
            head = self.head,
            blocks = self.blocks,
            txns = self.txns,
            logs = self.logs,
            took = ?self.started.elapsed(),
            "Imported new chain segment"
        );
        *self = Self::new();
    }
}

/// Sender side of the import aggregator. Cheap to clone into sync tasks.
#[derive(Clone)]
pub struct ImportLogHandle {
    tx: mpsc::UnboundedSender<Entry>,
}

impl ImportLogHandle {
    pub fn record(&self, number: u64, txns: usize, logs: usize) {
        // the aggregator only goes away on close, after every handle is dropped
        let _ = self.tx.send(Entry {
            number,
            txns: txns as u64,
            logs: logs as u64,
        });
    }
}

/// Coalesces per-block stats into periodic "imported N blocks" summaries.
pub struct ImportLogger {
    handle: ImportLogHandle,
    worker: JoinHandle<u64>,
}

impl ImportLogger {
    pub fn start(chain: impl Into<String>) -> Self {
        Self::with_limits(chain, MAX_BLOCKS, MAX_AGE)
    }

    /// Flush every `max_blocks` entries or once a segment is older than `max_age`.
    pub fn with_limits(chain: impl Into<String>, max_blocks: u64, max_age: Duration) -> Self {
        let chain = chain.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Entry>();

        let worker = tokio::spawn(async move {
            let mut segment = Segment::new();
            let mut flushes = 0u64;
            // age is measured from the last flush, which is when a segment starts
            let deadline = sleep_until(segment.started + max_age);
            tokio::pin!(deadline);

            loop {
                tokio::select! {
                    entry = rx.recv() => match entry {
                        Some(entry) => {
                            segment.add(entry);
                            if segment.blocks < max_blocks && segment.started.elapsed() < max_age {
                                continue;
                            }
                        }
                        None => break,
                    },
                    _ = &mut deadline, if segment.blocks > 0 => {}
                }

                segment.flush(&chain);
                flushes += 1;
                deadline.as_mut().reset(segment.started + max_age);
            }

            if segment.blocks > 0 {
                segment.flush(&chain);
                flushes += 1;
            }
            flushes
        });

        Self {
            handle: ImportLogHandle { tx },
            worker,
        }
    }

    pub fn handle(&self) -> ImportLogHandle {
        self.handle.clone()
    }

    /// Drain pending entries and emit the last summary. Returns how many
    /// summaries were written in total.
    pub async fn close(self) -> u64 {
        drop(self.handle);
        self.worker.await.unwrap_or(0)
    }
}
