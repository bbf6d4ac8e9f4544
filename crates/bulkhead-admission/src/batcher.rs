//! Micro-batcher
//!
//! Coalesces near-simultaneous requests sharing a request key into one
//! underlying execution. The first arrival opens a window and starts the
//! delay timer; later arrivals join until the size cap closes the window
//! early. The executor runs exactly once per window with members in arrival
//! order, and its result set must be positionally aligned with them.

use bulkhead_core::{BatchConfig, BulkheadError, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowState {
    Open,
    Closed,
    Executed,
}

struct BatchWindow<R, V> {
    state: WindowState,
    members: Vec<(R, oneshot::Sender<Result<V>>)>,
    close_tx: Option<oneshot::Sender<()>>,
}

/// Coalesces identically keyed requests of one request family.
///
/// One instance per family; clones share the same windows.
pub struct MicroBatcher<R, V> {
    window: Duration,
    max_batch_size: usize,
    windows: Arc<DashMap<String, Arc<Mutex<BatchWindow<R, V>>>>>,
}

impl<R, V> Clone for MicroBatcher<R, V> {
    fn clone(&self) -> Self {
        Self {
            window: self.window,
            max_batch_size: self.max_batch_size,
            windows: Arc::clone(&self.windows),
        }
    }
}

impl<R, V> MicroBatcher<R, V>
where
    R: Send + 'static,
    V: Send + 'static,
{
    pub fn new(config: &BatchConfig) -> Self {
        Self {
            window: Duration::from_millis(config.window_ms),
            max_batch_size: config.max_batch_size,
            windows: Arc::new(DashMap::new()),
        }
    }

    /// Join or start the batch window for `key`.
    ///
    /// Only the executor of the member that opens the window runs; joiners'
    /// executors are dropped. On executor failure every member receives the
    /// same `BatchExecution` error.
    pub async fn execute<F, Fut>(&self, key: &str, request: R, executor: F) -> Result<V>
    where
        F: FnOnce(Vec<R>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<V>>> + Send,
    {
        let (result_tx, result_rx) = oneshot::channel();
        let mut pending = Some((request, result_tx));

        loop {
            // No lock guard may survive past this match: the future must
            // stay `Send` across the yield below.
            match self.windows.entry(key.to_string()) {
                Entry::Occupied(occupied) => {
                    let window = Arc::clone(occupied.get());
                    drop(occupied);
                    let mut guard = window.lock().unwrap();
                    if guard.state == WindowState::Open {
                        let (request, result_tx) =
                            pending.take().expect("member joins exactly once");
                        guard.members.push((request, result_tx));
                        self.close_if_full(&mut guard);
                        break;
                    }
                }
                Entry::Vacant(vacant) => {
                    let (request, result_tx) =
                        pending.take().expect("member opens exactly once");
                    let (close_tx, close_rx) = oneshot::channel();
                    let window = Arc::new(Mutex::new(BatchWindow {
                        state: WindowState::Open,
                        members: vec![(request, result_tx)],
                        close_tx: Some(close_tx),
                    }));
                    vacant.insert(Arc::clone(&window));
                    self.spawn_closer(key.to_string(), Arc::clone(&window), close_rx, executor);
                    // A cap of one is already full with its opening member.
                    self.close_if_full(&mut window.lock().unwrap());
                    break;
                }
            }
            // The window is draining; retry once the closer has removed it.
            tokio::task::yield_now().await;
        }

        result_rx.await.map_err(|_| BulkheadError::BatchClosed)?
    }

    // A full window closes on the spot rather than waiting out its timer.
    fn close_if_full(&self, window: &mut BatchWindow<R, V>) {
        if window.members.len() >= self.max_batch_size {
            window.state = WindowState::Closed;
            if let Some(close_tx) = window.close_tx.take() {
                let _ = close_tx.send(());
            }
        }
    }

    fn spawn_closer<F, Fut>(
        &self,
        key: String,
        window: Arc<Mutex<BatchWindow<R, V>>>,
        close_rx: oneshot::Receiver<()>,
        executor: F,
    ) where
        F: FnOnce(Vec<R>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<V>>> + Send,
    {
        let windows = Arc::clone(&self.windows);
        let delay = self.window;
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = close_rx => {}
            }

            let members = {
                let mut guard = window.lock().unwrap();
                guard.state = WindowState::Closed;
                guard.close_tx = None;
                std::mem::take(&mut guard.members)
            };
            // Remove before executing so new requests for this key open a
            // fresh window while this one runs.
            windows.remove(&key);
            window.lock().unwrap().state = WindowState::Executed;

            let (requests, senders): (Vec<R>, Vec<oneshot::Sender<Result<V>>>) =
                members.into_iter().unzip();
            debug!(key = %key, members = senders.len(), "executing batch window");

            match executor(requests).await {
                Ok(results) if results.len() == senders.len() => {
                    for (tx, result) in senders.into_iter().zip(results) {
                        let _ = tx.send(Ok(result));
                    }
                }
                Ok(results) => {
                    let message = format!(
                        "executor returned {} results for {} members",
                        results.len(),
                        senders.len()
                    );
                    for tx in senders {
                        let _ = tx.send(Err(BulkheadError::BatchExecution(message.clone())));
                    }
                }
                Err(e) => {
                    let message = e.to_string();
                    for tx in senders {
                        let _ = tx.send(Err(BulkheadError::BatchExecution(message.clone())));
                    }
                }
            }
        });
    }
}
