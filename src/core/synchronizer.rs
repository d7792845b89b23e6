//! Bounded-concurrency executor with an ordered commit section.
//!
//! Every submitted task gets a ticket: the receiving end of its predecessor's
//! turn and the sending end of its own. Work before [`TaskHandle::barrier`] runs
//! in parallel (at most `max_routines` admitted tasks at once); work after it runs
//! strictly in submission order because a ticket only passes its turn on once the
//! task body has returned.
//!
//! An abort requested by task `k` takes effect when task `k` reaches its turn, so
//! tasks `0..k` still commit while every task after `k` is told to stop. A task
//! that panics counts as an abort request of its own. Once in effect the abort is
//! level-triggered for the rest of the batch.

use std::{
    future::Future,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use tokio::{
    sync::{Semaphore, oneshot},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::core::error::SyncError;

/// Signal handed from one ticket to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Turn {
    Proceed,
    Stop,
}

struct Ticket {
    wait: Mutex<Option<oneshot::Receiver<Turn>>>,
    pass: Mutex<Option<oneshot::Sender<Turn>>>,
    abort_requested: AtomicBool,
}

impl Ticket {
    fn new(wait: oneshot::Receiver<Turn>, pass: oneshot::Sender<Turn>) -> Self {
        Self {
            wait: Mutex::new(Some(wait)),
            pass: Mutex::new(Some(pass)),
            abort_requested: AtomicBool::new(false),
        }
    }

    fn take_wait(&self) -> Option<oneshot::Receiver<Turn>> {
        self.wait
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Wait for the predecessor's turn. Returns `true` if this task must stop.
    async fn await_turn(&self, index: u64, batch: &CancellationToken) -> bool {
        let Some(wait) = self.take_wait() else {
            return true;
        };
        let stop = match wait.await {
            Ok(Turn::Proceed) => false,
            Ok(Turn::Stop) => true,
            Err(_) => {
                // predecessor was torn down without passing its turn
                warn!(task = index, "Predecessor task vanished, aborting batch");
                batch.cancel();
                true
            }
        };
        if self.abort_requested.load(Ordering::SeqCst) && !batch.is_cancelled() {
            debug!(task = index, "Abort takes effect");
            batch.cancel();
        }
        stop || batch.is_cancelled()
    }

    /// Called after the task body returns: hand the turn to the successor.
    async fn release(&self, index: u64, batch: &CancellationToken) {
        // a body that never reached its barrier still holds its place in line
        if self
            .wait
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
        {
            self.await_turn(index, batch).await;
        }
        if self.abort_requested.load(Ordering::SeqCst) {
            batch.cancel();
        }

        let turn = if batch.is_cancelled() {
            Turn::Stop
        } else {
            Turn::Proceed
        };
        let pass = self
            .pass
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(pass) = pass {
            // the successor may already be gone; nothing to tell it then
            let _ = pass.send(turn);
        }
    }
}

/// Handle given to each task body.
pub struct TaskHandle {
    index: u64,
    batch: CancellationToken,
    ticket: Arc<Ticket>,
}

impl TaskHandle {
    /// Submission index of this task, starting at 0.
    pub fn index(&self) -> u64 {
        self.index
    }

    /// Suspend until every earlier task has finished its ordered section.
    ///
    /// Returns `true` when the batch was aborted at or before this task and the
    /// caller must return without doing any further work. Returns `false` when the
    /// caller now owns the ordered section; it ends when the task body returns.
    ///
    /// Must be called at most once; a second call returns `true`.
    pub async fn barrier(&self) -> bool {
        self.ticket.await_turn(self.index, &self.batch).await
    }

    /// Ask the whole batch to stop. Takes effect at this task's turn.
    pub fn abort(&self) {
        self.ticket.abort_requested.store(true, Ordering::SeqCst);
    }
}

/// Ordered bounded-concurrency executor. One instance per batch.
pub struct Synchronizer {
    permits: Arc<Semaphore>,
    batch: CancellationToken,
    next_turn: oneshot::Receiver<Turn>,
    tasks: JoinSet<()>,
    submitted: u64,
}

impl Synchronizer {
    pub fn new(max_routines: usize) -> Result<Self, SyncError> {
        if max_routines == 0 {
            return Err(SyncError::ZeroConcurrency);
        }

        // the first ticket may go straight through its barrier
        let (first, next_turn) = oneshot::channel();
        let _ = first.send(Turn::Proceed);

        Ok(Self {
            permits: Arc::new(Semaphore::new(max_routines)),
            batch: CancellationToken::new(),
            next_turn,
            tasks: JoinSet::new(),
            submitted: 0,
        })
    }

    /// Queue a task. Waits for a free slot when `max_routines` tasks are in flight.
    ///
    /// Returns `false` without running `body` if the batch has been aborted, including
    /// while this call was waiting for a slot.
    pub async fn submit<F, Fut>(&mut self, body: F) -> bool
    where
        F: FnOnce(TaskHandle) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.batch.is_cancelled() {
            return false;
        }

        let permit = tokio::select! {
            biased;
            _ = self.batch.cancelled() => return false,
            permit = Arc::clone(&self.permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
        };

        let (pass, next_turn) = oneshot::channel();
        let wait = std::mem::replace(&mut self.next_turn, next_turn);
        let ticket = Arc::new(Ticket::new(wait, pass));

        let index = self.submitted;
        self.submitted += 1;

        let handle = TaskHandle {
            index,
            batch: self.batch.clone(),
            ticket: Arc::clone(&ticket),
        };
        let batch = self.batch.clone();

        self.tasks.spawn(async move {
            let _permit = permit;
            // a panicking body still waits for its turn before stopping the batch
            if let Err(err) = tokio::spawn(body(handle)).await {
                error!(task = index, error = %err, "Sync task failed, aborting batch");
                ticket.abort_requested.store(true, Ordering::SeqCst);
            }
            ticket.release(index, &batch).await;
        });
        true
    }

    /// Number of tasks accepted so far.
    pub fn submitted(&self) -> u64 {
        self.submitted
    }

    /// Stop accepting work and wait for every task to finish.
    /// Returns whether the batch was aborted.
    pub async fn finish(mut self) -> bool {
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "Sync task failed, aborting batch");
                self.batch.cancel();
            }
        }
        self.batch.is_cancelled()
    }
}
