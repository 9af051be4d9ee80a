//! Bounded work queues shared by a pool of workers

use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Bounded multi-producer multi-consumer queue.
///
/// Producers block while the queue is full and consumers while it is empty;
/// both give up as soon as the run's token is cancelled.
pub struct WorkQueue<T> {
    name: &'static str,
    capacity: usize,
    tx: mpsc::Sender<T>,
    rx: Arc<Mutex<mpsc::Receiver<T>>>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            capacity: self.capacity,
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }
}

impl<T: Send> WorkQueue<T> {
    /// `capacity` must be at least 1
    pub fn bounded(name: &'static str, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            name,
            capacity,
            tx,
            rx: Arc::new(Mutex::new(rx)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Items currently buffered
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Enqueue, waiting for space. Returns false if the run was cancelled first.
    pub async fn push(&self, item: T, token: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = token.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }

    /// Dequeue, waiting for work. Returns `None` once the run is cancelled.
    pub async fn pop(&self, token: &CancellationToken) -> Option<T> {
        tokio::select! {
            biased;
            _ = token.cancelled() => None,
            item = async { self.rx.lock().await.recv().await } => item,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_push_blocks_when_full() {
        let queue = WorkQueue::bounded("raw", 100);
        let token = CancellationToken::new();
        for i in 0..100 {
            assert!(queue.push(i, &token).await);
        }
        assert_eq!(queue.len(), 100);

        let blocked = timeout(Duration::from_millis(50), queue.push(100, &token)).await;
        assert!(blocked.is_err());

        assert_eq!(queue.pop(&token).await, Some(0));
        assert!(timeout(Duration::from_millis(50), queue.push(100, &token))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_cancel_releases_blocked_producer_and_consumer() {
        let queue: WorkQueue<u32> = WorkQueue::bounded("stage", 1);
        let token = CancellationToken::new();
        assert!(queue.push(1, &token).await);

        let producer = {
            let queue = queue.clone();
            let token = token.clone();
            tokio::spawn(async move { queue.push(2, &token).await })
        };
        let empty: WorkQueue<u32> = WorkQueue::bounded("empty", 1);
        let consumer = {
            let token = token.clone();
            tokio::spawn(async move { empty.pop(&token).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        assert!(!producer.await.unwrap());
        assert_eq!(consumer.await.unwrap(), None);
        assert_eq!(queue.pop(&token).await, None);
    }

    #[tokio::test]
    async fn test_workers_share_one_queue() {
        let queue = WorkQueue::bounded("shared", 10);
        let token = CancellationToken::new();
        for i in 0..10 {
            queue.push(i, &token).await;
        }

        let a = queue.clone();
        let b = queue.clone();
        let (x, y) = tokio::join!(a.pop(&token), b.pop(&token));
        let mut seen = vec![x.unwrap(), y.unwrap()];
        seen.sort();
        assert_eq!(seen, vec![0, 1]);
        assert_eq!(queue.len(), 8);
    }
}
