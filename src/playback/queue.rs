use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{Notify, watch};

/// One unit of inbound playback work.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Base64 encoded audio fragment.
    Audio(String),
    /// Mark object to echo back once playback reaches it.
    Mark(Value),
}

/// Unbounded FIFO between the receive path and the playback loop.
///
/// Every `clear` advances an interrupt epoch. The epoch is updated under the
/// queue lock, so an event handed out by `dequeue` carries the epoch it was
/// taken under, and the loop can tell whether a clear happened since.
pub struct PlaybackQueue {
    events: Mutex<VecDeque<PlaybackEvent>>,
    epoch: watch::Sender<u64>,
    notify: Notify,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        let (epoch, _) = watch::channel(0);
        Self {
            events: Mutex::new(VecDeque::new()),
            epoch,
            notify: Notify::new(),
        }
    }

    pub fn enqueue(&self, event: PlaybackEvent) {
        self.events.lock().push_back(event);
        self.notify.notify_one();
    }

    /// Pops the oldest event with the epoch it was taken under.
    pub fn dequeue(&self) -> Option<(PlaybackEvent, u64)> {
        let mut events = self.events.lock();
        let event = events.pop_front()?;
        Some((event, *self.epoch.borrow()))
    }

    /// Drops every pending event and signals an interrupt. Returns how many
    /// events were discarded.
    pub fn clear(&self) -> usize {
        let mut events = self.events.lock();
        let discarded = events.len();
        events.clear();
        self.epoch.send_modify(|e| *e += 1);
        drop(events);
        self.notify.notify_one();
        discarded
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn epoch(&self) -> u64 {
        *self.epoch.borrow()
    }

    /// Receiver that observes every interrupt.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.epoch.subscribe()
    }

    /// Wakes a waiting loop without adding work, e.g. after the transport closed.
    pub fn wake(&self) {
        self.notify.notify_one();
    }

    /// Waits until something is enqueued or woken, or `timeout` passes.
    pub async fn wait(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }
}

impl Default for PlaybackQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn audio(tag: &str) -> PlaybackEvent {
        PlaybackEvent::Audio(tag.to_string())
    }

    #[test]
    fn dequeues_in_arrival_order() {
        let queue = PlaybackQueue::new();
        for i in 0..10 {
            queue.enqueue(audio(&i.to_string()));
        }
        queue.enqueue(PlaybackEvent::Mark(json!({"type": "mark"})));

        let drained: Vec<PlaybackEvent> = std::iter::from_fn(|| queue.dequeue().map(|(e, _)| e)).collect();
        let mut expected: Vec<PlaybackEvent> = (0..10).map(|i| audio(&i.to_string())).collect();
        expected.push(PlaybackEvent::Mark(json!({"type": "mark"})));
        assert_eq!(drained, expected);
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn clear_empties_and_bumps_epoch() {
        let queue = PlaybackQueue::new();
        queue.enqueue(audio("a"));
        queue.enqueue(audio("b"));
        queue.enqueue(audio("c"));
        let (_, before) = queue.dequeue().unwrap();

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.epoch(), before + 1);
    }

    #[test]
    fn events_after_clear_carry_new_epoch() {
        let queue = PlaybackQueue::new();
        queue.clear();
        queue.enqueue(audio("x"));
        let (_, epoch) = queue.dequeue().unwrap();
        assert_eq!(epoch, 1);
    }

    #[tokio::test]
    async fn subscribers_see_interrupts() {
        let queue = PlaybackQueue::new();
        let mut rx = queue.subscribe();
        queue.clear();
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), 1);
    }

    #[tokio::test]
    async fn wait_returns_early_on_enqueue() {
        let queue = PlaybackQueue::new();
        queue.enqueue(audio("a"));
        // The stored permit lets this return immediately.
        tokio::time::timeout(Duration::from_millis(500), queue.wait(Duration::from_secs(30)))
            .await
            .unwrap();
    }
}
