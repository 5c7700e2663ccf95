//! Bounded, drop-on-full event channel

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::warn;

use crate::types::EventEnvelope;

/// Receiving half. Yields `None` once every sender is gone.
pub type EventReceiver<E> = mpsc::Receiver<EventEnvelope<E>>;

/// Create a channel holding at most `capacity` undelivered events.
pub fn channel<E>(capacity: usize) -> (EventSender<E>, EventReceiver<E>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EventSender {
            sender: tx,
            sent: Arc::new(AtomicUsize::new(0)),
            dropped: Arc::new(AtomicUsize::new(0)),
        },
        rx,
    )
}

/// Sending half. `send` never waits: a full or closed channel drops the event.
pub struct EventSender<E> {
    sender: mpsc::Sender<EventEnvelope<E>>,
    sent: Arc<AtomicUsize>,
    dropped: Arc<AtomicUsize>,
}

impl<E> Clone for EventSender<E> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            sent: Arc::clone(&self.sent),
            dropped: Arc::clone(&self.dropped),
        }
    }
}

impl<E> EventSender<E> {
    /// Publish an event. Returns whether it was queued.
    pub fn send(&self, event: E) -> bool {
        match self.sender.try_send(EventEnvelope::new(event)) {
            Ok(()) => {
                self.sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(dropped, "event channel full, dropping event");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Number of events queued so far
    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::Relaxed)
    }

    /// Number of events lost to a full or closed channel
    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<E> std::fmt::Debug for EventSender<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("sent", &self.sent_count())
            .field("dropped", &self.dropped_count())
            .finish()
    }
}
