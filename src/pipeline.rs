//! Bounded, ordered event pipeline with exactly one consumer
//!
//! Every producer goes through a [`Publisher`]; a single worker task hands
//! events to an [`EventHandler`] in publish order, stamping each with a
//! sequence number. Handlers run synchronously on the worker and must not
//! wait on I/O: a slow handler stalls every producer once the buffer fills.
//!
//! Backpressure is explicit. [`Backpressure::Block`] waits for a free slot
//! forever. [`Backpressure::DropAfter`] waits at most the given time and then
//! rejects the event, which the caller logs. Events that must never be lost
//! go through [`Publisher::submit_blocking`], which ignores the policy.

use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::SendTimeoutError};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

/// What `submit` does when the buffer is full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    Block,
    DropAfter(Duration),
}

impl Backpressure {
    /// `0` selects the indefinite block
    pub fn from_millis(ms: u64) -> Self {
        if ms == 0 {
            Self::Block
        } else {
            Self::DropAfter(Duration::from_millis(ms))
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("pipeline is shut down")]
    Closed,
    #[error("pipeline full for {0:?}, event dropped")]
    Timeout(Duration),
}

/// Consumer side of the pipeline
pub trait EventHandler<T>: Send + 'static {
    fn handle(&mut self, seq: u64, event: T);
}

impl<T, F> EventHandler<T> for F
where
    F: FnMut(u64, T) + Send + 'static,
{
    fn handle(&mut self, seq: u64, event: T) {
        self(seq, event)
    }
}

/// Counts reported once the worker has stopped
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    pub processed: u64,
    /// Events still buffered when shutdown began, handled before the worker exited
    pub drained: u64,
}

/// Producer handle; cheap to clone, one per connection task
#[derive(Debug)]
pub struct Publisher<T> {
    tx: mpsc::Sender<T>,
    policy: Backpressure,
}

impl<T> Clone for Publisher<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            policy: self.policy,
        }
    }
}

impl<T> Publisher<T> {
    /// Publishes an event behind everything already published
    pub async fn submit(&self, event: T) -> Result<(), SubmitError> {
        match self.policy {
            Backpressure::Block => self.tx.send(event).await.map_err(|_| SubmitError::Closed),
            Backpressure::DropAfter(limit) => {
                self.tx
                    .send_timeout(event, limit)
                    .await
                    .map_err(|e| match e {
                        SendTimeoutError::Timeout(_) => SubmitError::Timeout(limit),
                        SendTimeoutError::Closed(_) => SubmitError::Closed,
                    })
            }
        }
    }

    /// Waits for a slot however long it takes. Fails only once shutdown has begun.
    pub async fn submit_blocking(&self, event: T) -> Result<(), SubmitError> {
        self.tx.send(event).await.map_err(|_| SubmitError::Closed)
    }

    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Events published but not yet taken by the worker
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Owner of the worker task
pub struct Pipeline<T> {
    publisher: Publisher<T>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    worker: Mutex<Option<JoinHandle<ShutdownReport>>>,
}

impl<T: Send + 'static> Pipeline<T> {
    /// Starts the worker. Must be called inside a tokio runtime.
    pub fn spawn<H: EventHandler<T>>(capacity: usize, policy: Backpressure, handler: H) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let (stop_tx, stop_rx) = oneshot::channel();
        let worker = tokio::spawn(run_worker(rx, stop_rx, handler));

        tracing::info!(capacity, policy = ?policy, "Event pipeline started");

        Self {
            publisher: Publisher { tx, policy },
            stop: Mutex::new(Some(stop_tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn publisher(&self) -> Publisher<T> {
        self.publisher.clone()
    }

    /// Stops accepting events, drains what is already buffered and waits for the worker.
    /// Later calls return an empty report.
    pub async fn shutdown(&self) -> ShutdownReport {
        if let Some(stop) = self.stop.lock().await.take() {
            let _ = stop.send(());
        }

        let Some(worker) = self.worker.lock().await.take() else {
            return ShutdownReport::default();
        };

        match worker.await {
            Ok(report) => {
                tracing::info!(
                    processed = report.processed,
                    drained = report.drained,
                    "Event pipeline stopped"
                );
                report
            }
            Err(e) => {
                tracing::error!(error = %e, "Event pipeline worker failed");
                ShutdownReport::default()
            }
        }
    }
}

async fn run_worker<T, H: EventHandler<T>>(
    mut rx: mpsc::Receiver<T>,
    mut stop: oneshot::Receiver<()>,
    mut handler: H,
) -> ShutdownReport {
    let mut report = ShutdownReport::default();
    let mut seq = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = &mut stop => break,
            next = rx.recv() => match next {
                Some(event) => {
                    seq += 1;
                    handler.handle(seq, event);
                    report.processed += 1;
                }
                None => return report,
            },
        }
    }

    // Reject new submissions, including producers already waiting for a slot
    rx.close();
    while let Some(event) = rx.recv().await {
        seq += 1;
        handler.handle(seq, event);
        report.processed += 1;
        report.drained += 1;
    }
    report
}
