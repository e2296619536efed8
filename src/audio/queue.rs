use parking_lot::Mutex;
use std::{collections::VecDeque, time::Duration};
use tokio::{sync::Notify, time::Instant};
use tracing::debug;

use crate::sources::TrackRequest;

/// Returned by [`TrackQueue::push`] once the consumer has shut the queue down.
#[derive(Debug)]
pub struct QueueClosed(pub TrackRequest);

#[derive(Debug, Default)]
struct Inner {
    items: VecDeque<TrackRequest>,
    closed: bool,
}

/// Unbounded FIFO of pending tracks with a single consumer.
///
/// The consumer waits with a deadline. When the deadline passes on an empty queue
/// the queue closes itself under the same lock producers take, so a push either
/// lands before the close (and is returned by the pop) or fails with
/// [`QueueClosed`]. Nothing is silently dropped.
#[derive(Debug, Default)]
pub struct TrackQueue {
    inner: Mutex<Inner>,
    available: Notify,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends to the tail, returning the 1-based position of the new entry.
    pub fn push(&self, request: TrackRequest) -> Result<usize, QueueClosed> {
        let position = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(QueueClosed(request));
            }
            debug!("➕ Queued: {}", request.title());
            inner.items.push_back(request);
            inner.items.len()
        };

        self.available.notify_one();
        Ok(position)
    }

    /// Waits up to `timeout` for the next entry.
    ///
    /// Returns `None` and closes the queue if nothing arrived in time, or
    /// immediately if the queue was already closed.
    pub async fn pop(&self, timeout: Duration) -> Option<TrackRequest> {
        let deadline = Instant::now() + timeout;

        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                if let Some(item) = inner.items.pop_front() {
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                let mut inner = self.inner.lock();
                let item = inner.items.pop_front();
                if item.is_none() {
                    inner.closed = true;
                }
                return item;
            }
        }
    }

    /// Rejects further pushes and drops everything pending.
    pub fn close(&self) -> usize {
        let dropped = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            let dropped = inner.items.len();
            inner.items.clear();
            dropped
        };

        self.available.notify_one();
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Up to `limit` pending entries, head first.
    pub fn upcoming(&self, limit: usize) -> Vec<TrackRequest> {
        self.inner.lock().items.iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{DeferredTrack, Requester};
    use serenity::model::id::UserId;
    use std::sync::Arc;

    fn request(title: &str) -> TrackRequest {
        TrackRequest::Deferred(DeferredTrack {
            title: title.to_string(),
            webpage_url: format!("https://youtu.be/{title}"),
            duration: None,
            thumbnail: None,
            requester: Requester {
                id: UserId::new(1),
                name: "tester".to_string(),
            },
        })
    }

    #[tokio::test]
    async fn dequeues_in_enqueue_order() {
        let queue = TrackQueue::new();
        let titles = ["a", "b", "c", "d", "e"];

        for (i, title) in titles.iter().enumerate() {
            assert_eq!(queue.push(request(title)).unwrap(), i + 1);
        }

        for title in titles {
            let next = queue.pop(Duration::from_secs(1)).await.unwrap();
            assert_eq!(next.title(), title);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_on_empty_queue_closes_it() {
        let queue = TrackQueue::new();

        assert!(queue.pop(Duration::from_secs(300)).await.is_none());
        assert!(queue.is_closed());
        assert!(matches!(queue.push(request("late")), Err(QueueClosed(r)) if r.title() == "late"));
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_consumer_is_woken_by_push() {
        let queue = Arc::new(TrackQueue::new());

        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.pop(Duration::from_secs(300)).await })
        };

        tokio::time::sleep(Duration::from_secs(10)).await;
        queue.push(request("song")).unwrap();

        let popped = consumer.await.unwrap().unwrap();
        assert_eq!(popped.title(), "song");
        assert!(!queue.is_closed());
    }

    #[tokio::test]
    async fn close_drops_pending_entries() {
        let queue = TrackQueue::new();
        queue.push(request("a")).unwrap();
        queue.push(request("b")).unwrap();

        assert_eq!(queue.close(), 2);
        assert!(queue.is_empty());
        assert!(queue.pop(Duration::from_secs(1)).await.is_none());
    }

    #[test]
    fn upcoming_is_limited_and_ordered() {
        let queue = TrackQueue::new();
        for title in ["a", "b", "c"] {
            queue.push(request(title)).unwrap();
        }

        let titles: Vec<String> = queue
            .upcoming(2)
            .iter()
            .map(|r| r.title().to_string())
            .collect();
        assert_eq!(titles, vec!["a", "b"]);
        assert_eq!(queue.len(), 3);
    }
}
