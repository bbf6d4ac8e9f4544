//! Admission controller
//!
//! Bounds the number of concurrently running logical operations and queues
//! excess requests by priority. Higher priorities are always served first;
//! requests of equal priority are served strictly FIFO. There is no aging,
//! so a sustained flood of high-priority work can delay low-priority
//! requests indefinitely; `status()` exposes the queue depth so operators
//! can observe that.

use bulkhead_core::{AdmissionConfig, AdmissionStatus, MetricsRecorder, Priority};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::oneshot;
use tracing::debug;

struct Waiter {
    priority: Priority,
    tx: oneshot::Sender<()>,
}

struct Inner {
    running: usize,
    queue: VecDeque<Waiter>,
}

/// Caps in-flight operations and queues the rest by priority.
pub struct AdmissionController {
    max_concurrent: usize,
    inner: Mutex<Inner>,
    metrics: Arc<MetricsRecorder>,
}

impl AdmissionController {
    pub fn new(config: &AdmissionConfig, metrics: Arc<MetricsRecorder>) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            inner: Mutex::new(Inner {
                running: 0,
                queue: VecDeque::new(),
            }),
            metrics,
        }
    }

    /// Wait for a concurrency slot. Resolves immediately while capacity is
    /// available; otherwise the request queues by priority.
    pub async fn acquire(self: &Arc<Self>, priority: Priority) -> AdmissionPermit {
        let waiting = {
            let mut inner = self.inner.lock().unwrap();
            if inner.running < self.max_concurrent {
                inner.running += 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                // Ahead of every lower-priority waiter, behind equal ones.
                let position = inner
                    .queue
                    .iter()
                    .position(|w| w.priority < priority)
                    .unwrap_or(inner.queue.len());
                inner.queue.insert(position, Waiter { priority, tx });
                debug!(%priority, depth = inner.queue.len(), "admission request queued");
                Some(rx)
            }
        };

        if let Some(rx) = waiting {
            let queued_at = Instant::now();
            // The sender cannot be dropped without sending while we hold an
            // Arc to the controller.
            let _ = rx.await;
            self.metrics
                .record("admission.wait", queued_at.elapsed(), false)
                .await;
        }

        AdmissionPermit {
            controller: Arc::clone(self),
        }
    }

    /// Run `fut` once a slot is available. The slot is released whether the
    /// operation succeeds or fails.
    pub async fn admit<F, T>(self: &Arc<Self>, priority: Priority, fut: F) -> T
    where
        F: Future<Output = T>,
    {
        let _permit = self.acquire(priority).await;
        fut.await
    }

    pub fn status(&self) -> AdmissionStatus {
        let inner = self.inner.lock().unwrap();
        AdmissionStatus {
            running: inner.running,
            max_concurrent: self.max_concurrent,
            queue_depth: inner.queue.len(),
        }
    }

    // Hand the freed slot to the best waiter, or decrement the running
    // count when nobody is waiting. A waiter whose receiver was dropped is
    // skipped in favor of the next one.
    fn release(&self) {
        loop {
            let waiter = {
                let mut inner = self.inner.lock().unwrap();
                match inner.queue.pop_front() {
                    Some(waiter) => waiter,
                    None => {
                        inner.running -= 1;
                        return;
                    }
                }
            };
            if waiter.tx.send(()).is_ok() {
                return;
            }
        }
    }
}

/// Permission to run one logical operation. Releases its slot on drop and
/// promotes the highest-priority, earliest-queued waiter.
pub struct AdmissionPermit {
    controller: Arc<AdmissionController>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.controller.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn controller(max_concurrent: usize) -> Arc<AdmissionController> {
        Arc::new(AdmissionController::new(
            &AdmissionConfig { max_concurrent },
            Arc::new(MetricsRecorder::new()),
        ))
    }

    #[tokio::test]
    async fn acquires_immediately_under_the_limit() {
        let controller = controller(2);
        let _a = controller.acquire(Priority::Low).await;
        let _b = controller.acquire(Priority::Low).await;

        let status = controller.status();
        assert_eq!(status.running, 2);
        assert_eq!(status.queue_depth, 0);
    }

    #[tokio::test]
    async fn permit_drop_releases_the_slot() {
        let controller = controller(1);
        let permit = controller.acquire(Priority::Medium).await;
        assert_eq!(controller.status().running, 1);

        drop(permit);
        assert_eq!(controller.status().running, 0);

        let _again = controller.acquire(Priority::Medium).await;
        assert_eq!(controller.status().running, 1);
    }

    #[tokio::test]
    async fn high_priority_jumps_the_queue() {
        let controller = controller(2);
        let blocker_a = controller.acquire(Priority::Medium).await;
        let blocker_b = controller.acquire(Priority::Medium).await;

        let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();

        // Three medium-priority requests queue first.
        for name in ["m1", "m2", "m3"] {
            let controller = controller.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                controller
                    .admit(Priority::Medium, async move {
                        order.lock().unwrap().push(name);
                    })
                    .await;
            }));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Two high-priority requests arrive last.
        for name in ["h1", "h2"] {
            let controller = controller.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                controller
                    .admit(Priority::High, async move {
                        order.lock().unwrap().push(name);
                    })
                    .await;
            }));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(controller.status().queue_depth, 5);

        drop(blocker_a);
        drop(blocker_b);
        for joined in futures::future::join_all(handles).await {
            joined.unwrap();
        }

        let order = order.lock().unwrap().clone();
        assert_eq!(&order[..2], &["h1", "h2"]);
        assert_eq!(&order[2..], &["m1", "m2", "m3"]);
    }

    #[tokio::test]
    async fn equal_priority_is_fifo() {
        let controller = controller(1);
        let blocker = controller.acquire(Priority::Low).await;

        let order: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..4 {
            let controller = controller.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                controller
                    .admit(Priority::Medium, async move {
                        order.lock().unwrap().push(i);
                    })
                    .await;
            }));
            // Enqueue one at a time so arrival order is unambiguous.
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        drop(blocker);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn abandoned_waiter_is_skipped() {
        let controller = controller(1);
        let blocker = controller.acquire(Priority::Medium).await;

        let abandoned = {
            let controller = controller.clone();
            tokio::spawn(async move {
                let _permit = controller.acquire(Priority::High).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        abandoned.abort();
        let _ = abandoned.await;

        let survivor = {
            let controller = controller.clone();
            tokio::spawn(async move {
                controller.admit(Priority::Low, async { 99u32 }).await
            })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;

        drop(blocker);
        assert_eq!(survivor.await.unwrap(), 99);
        assert_eq!(controller.status().running, 0);
    }

    #[tokio::test]
    async fn admit_releases_on_failure() {
        let controller = controller(1);
        let result: Result<(), &str> = controller.admit(Priority::High, async { Err("boom") }).await;
        assert!(result.is_err());
        assert_eq!(controller.status().running, 0);
    }
}
