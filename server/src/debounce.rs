//! Keyed trailing-edge debouncer.
//!
//! Editors usually save a file as a burst of create/modify/rename events.
//! [`Debouncer`] holds the latest value per key and emits it once no new
//! event for that key has arrived for the configured interval.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use tokio::sync::mpsc;
//! use tickbook_server::debounce::Debouncer;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (output_tx, mut output_rx) = mpsc::channel(16);
//!     let debouncer = Debouncer::new(Duration::from_millis(100), output_tx);
//!
//!     debouncer.send("notes", 1).await.unwrap();
//!     debouncer.send("notes", 2).await.unwrap();
//!
//!     // One emission, carrying the last value.
//!     assert_eq!(output_rx.recv().await, Some(("notes", 2)));
//! }
//! ```

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

/// Capacity of the input channel.
const INPUT_CAPACITY: usize = 1024;

/// Error type for debouncer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebouncerError {
    /// The background task has stopped.
    #[error("debouncer channel closed")]
    ChannelClosed,
}

/// A value waiting for its quiet period to end.
#[derive(Debug)]
struct Pending<V> {
    value: V,
    deadline: Instant,
}

/// Coalesces bursts of events per key.
///
/// Dropping the debouncer closes its input; values still pending are flushed
/// immediately.
#[derive(Debug)]
pub struct Debouncer<K, V> {
    input_tx: mpsc::Sender<(K, V)>,
    #[allow(dead_code)]
    task: JoinHandle<()>,
}

impl<K, V> Debouncer<K, V>
where
    K: Clone + Eq + Hash + Debug + Send + 'static,
    V: Send + 'static,
{
    /// Starts a debouncer that emits into `output_tx`.
    #[must_use]
    pub fn new(interval: Duration, output_tx: mpsc::Sender<(K, V)>) -> Self {
        let (input_tx, input_rx) = mpsc::channel(INPUT_CAPACITY);
        let task = tokio::spawn(run(interval, input_rx, output_tx));
        Self { input_tx, task }
    }

    /// Queues an event, replacing any pending value for `key` and restarting
    /// its timer.
    ///
    /// # Errors
    ///
    /// Returns [`DebouncerError::ChannelClosed`] if the background task has
    /// stopped.
    pub async fn send(&self, key: K, value: V) -> Result<(), DebouncerError> {
        self.input_tx
            .send((key, value))
            .await
            .map_err(|_| DebouncerError::ChannelClosed)
    }

    /// Queues an event without waiting. Usable from the synchronous notify
    /// callback.
    ///
    /// Returns `false` if the channel is full or closed.
    pub fn try_send(&self, key: K, value: V) -> bool {
        self.input_tx.try_send((key, value)).is_ok()
    }
}

async fn run<K, V>(
    interval: Duration,
    mut input_rx: mpsc::Receiver<(K, V)>,
    output_tx: mpsc::Sender<(K, V)>,
) where
    K: Clone + Eq + Hash + Debug,
{
    let mut pending: HashMap<K, Pending<V>> = HashMap::new();
    debug!(interval_ms = interval.as_millis(), "Starting debounce loop");

    loop {
        let next_deadline = pending.values().map(|p| p.deadline).min();

        tokio::select! {
            received = input_rx.recv() => match received {
                Some((key, value)) => {
                    trace!(key = ?key, "Event received, timer reset");
                    let deadline = Instant::now() + interval;
                    pending.insert(key, Pending { value, deadline });
                }
                None => {
                    debug!(pending = pending.len(), "Input closed, flushing");
                    for (key, entry) in pending.drain() {
                        emit(&output_tx, key, entry.value).await;
                    }
                    break;
                }
            },

            () = sleep_until(next_deadline) => {
                let now = Instant::now();
                let due: Vec<K> = pending
                    .iter()
                    .filter(|(_, p)| p.deadline <= now)
                    .map(|(k, _)| k.clone())
                    .collect();

                for key in due {
                    if let Some(entry) = pending.remove(&key) {
                        emit(&output_tx, key, entry.value).await;
                    }
                }
            }
        }
    }

    debug!("Debounce loop terminated");
}

/// Sleeps until `deadline`, or forever when nothing is pending.
async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn emit<K: Debug, V>(output_tx: &mpsc::Sender<(K, V)>, key: K, value: V) {
    trace!(key = ?key, "Emitting debounced event");
    if output_tx.send((key, value)).await.is_err() {
        warn!("Debounce output channel closed, dropping event");
    }
}
