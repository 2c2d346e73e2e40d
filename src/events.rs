//! Fire-and-forget broadcast of committed votes.

use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace};
use rocket::tokio::sync::broadcast;

use crate::model::event::VoteCast;

/// Default number of events buffered for each subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// In-process vote event bus.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// dropped, and a subscriber that falls behind loses the oldest events.
pub struct EventBus {
    sender: broadcast::Sender<VoteCast>,
    events_published: AtomicU64,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            events_published: AtomicU64::new(0),
        }
    }

    /// Publish an event, returning how many subscribers received it.
    pub fn publish(&self, event: VoteCast) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        let candidate = event.candidate_id.clone();
        match self.sender.send(event) {
            Ok(receivers) => {
                trace!("VoteCast for {candidate} delivered to {receivers} subscriber(s)");
                receivers
            }
            Err(_) => {
                debug!("VoteCast for {candidate} dropped (no subscribers)");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VoteCast> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Total number of events ever published, delivered or not.
    pub fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
