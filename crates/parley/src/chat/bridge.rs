//! Adapts a pull-based [`EventStream`] into a bounded queue.
//!
//! One worker task per stream fetches events and pushes them onto an `mpsc`
//! channel. [`Bridge::shutdown`] signals the worker, which drops any pending
//! fetch or push, closes the stream and exits; shutdown returns only after
//! the worker has been joined.

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::chat::events::Event;
use crate::chat::transport::{EventStream, StreamError};

pub type BridgeItem = std::result::Result<Event, StreamError>;

pub struct Bridge {
    rx: mpsc::Receiver<BridgeItem>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Bridge {
    /// Spawn the worker. A capacity of zero is treated as one.
    pub fn spawn(stream: Box<dyn EventStream>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_worker(stream, tx, shutdown_rx));

        Self {
            rx,
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Next item in stream order; `None` once the worker has exited and the
    /// queue is drained.
    pub async fn recv(&mut self) -> Option<BridgeItem> {
        self.rx.recv().await
    }

    /// Stop the worker and wait for it to exit. Safe to call repeatedly.
    pub async fn shutdown(&mut self) {
        let _ = self.shutdown_tx.send(true);
        self.rx.close();

        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                tracing::warn!(error = %err, "stream bridge worker panicked");
            }
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.task.is_none()
    }
}

impl Drop for Bridge {
    fn drop(&mut self) {
        // Cannot join here; the worker still observes the signal and exits.
        let _ = self.shutdown_tx.send(true);
    }
}

async fn run_worker(
    mut stream: Box<dyn EventStream>,
    tx: mpsc::Sender<BridgeItem>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        let item = tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            item = stream.next_event() => item,
        };

        let failed = item.is_err();
        if let Err(err) = &item {
            tracing::debug!(error = %err, "event stream stopped");
        }

        tokio::select! {
            biased;
            _ = shutdown_rx.changed() => break,
            sent = tx.send(item) => {
                if sent.is_err() {
                    break;
                }
            }
        }

        if failed {
            break;
        }
    }

    stream.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::events::EventKind;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct Counting {
        next: usize,
        limit: Option<usize>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl EventStream for Counting {
        async fn next_event(&mut self) -> std::result::Result<Event, StreamError> {
            if self.limit.is_some_and(|limit| self.next >= limit) {
                return Err(StreamError::Ended);
            }
            self.next += 1;
            let mut ev = Event::bare(EventKind::Message);
            ev.message_id = format!("m{}", self.next);
            Ok(ev)
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    struct Stuck {
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl EventStream for Stuck {
        async fn next_event(&mut self) -> std::result::Result<Event, StreamError> {
            std::future::pending().await
        }

        async fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn delivers_in_order_then_error_once() {
        let closed = Arc::new(AtomicBool::new(false));
        let mut bridge = Bridge::spawn(
            Box::new(Counting {
                next: 0,
                limit: Some(3),
                closed: closed.clone(),
            }),
            8,
        );

        for expected in ["m1", "m2", "m3"] {
            let ev = bridge.recv().await.unwrap().unwrap();
            assert_eq!(ev.message_id, expected);
        }
        assert_eq!(bridge.recv().await, Some(Err(StreamError::Ended)));
        assert_eq!(bridge.recv().await, None);

        bridge.shutdown().await;
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_with_full_queue_and_no_consumer() {
        let closed = Arc::new(AtomicBool::new(false));
        let mut bridge = Bridge::spawn(
            Box::new(Counting {
                next: 0,
                limit: None,
                closed: closed.clone(),
            }),
            10,
        );

        // Let the worker fill the queue and block on the next push.
        tokio::time::sleep(Duration::from_millis(10)).await;

        tokio::time::timeout(Duration::from_secs(1), bridge.shutdown())
            .await
            .expect("shutdown must not hang");
        assert!(closed.load(Ordering::SeqCst));
        assert!(bridge.is_shut_down());

        bridge.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_unblocks_a_stuck_read() {
        let closed = Arc::new(AtomicBool::new(false));
        let mut bridge = Bridge::spawn(
            Box::new(Stuck {
                closed: closed.clone(),
            }),
            4,
        );

        tokio::time::timeout(Duration::from_secs(1), bridge.shutdown())
            .await
            .expect("shutdown must not hang");
        assert!(closed.load(Ordering::SeqCst));
    }
}
