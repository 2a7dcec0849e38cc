//! Best-effort broadcast of device change events to bounded subscriber
//! queues.
//!
//! Delivery is a non-blocking enqueue per subscriber: a full queue means
//! that subscriber misses the event. The producer never waits for a slow
//! consumer — correctness of the radio-facing ingestion path must not
//! depend on the liveness of anything downstream. Drops are counted per
//! subscriber for observability.

use std::ops::{BitOr, BitOrAssign};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

/// Queue depth used when a subscriber does not pick its own.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10;

/// What changed for a device, as a bitmask: one event can carry both NEW
/// and UPDATED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChangeFlags(u8);

impl ChangeFlags {
    pub const NONE: ChangeFlags = ChangeFlags(0);
    pub const NEW: ChangeFlags = ChangeFlags(1);
    pub const UPDATED: ChangeFlags = ChangeFlags(1 << 1);
    pub const GONE: ChangeFlags = ChangeFlags(1 << 2);

    pub fn contains(self, other: ChangeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for ChangeFlags {
    type Output = ChangeFlags;

    fn bitor(self, rhs: ChangeFlags) -> ChangeFlags {
        ChangeFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for ChangeFlags {
    fn bitor_assign(&mut self, rhs: ChangeFlags) {
        self.0 |= rhs.0;
    }
}

/// One device state transition, handed to every subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceEvent {
    pub device_id: u16,
    pub changes: ChangeFlags,
}

/// A subscriber's receiving half: the bounded event queue plus its
/// dropped-event counter.
pub struct EventStream {
    receiver: mpsc::Receiver<DeviceEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventStream {
    /// Wait for the next event. `None` means the gateway shut down and
    /// the queue drained.
    pub async fn recv(&mut self) -> Option<DeviceEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<DeviceEvent> {
        self.receiver.try_recv().ok()
    }

    /// Events this subscriber missed because its queue was full.
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct Subscriber {
    label: String,
    sender: mpsc::Sender<DeviceEvent>,
    dropped: Arc<AtomicU64>,
}

/// The broadcasting half. Subscribers register once at startup and stay
/// for the life of the process; there is no removal.
#[derive(Default)]
pub struct EventFanout {
    subscribers: Vec<Subscriber>,
}

impl EventFanout {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber with a queue of `capacity` events.
    pub fn add_listener(&mut self, label: &str, capacity: usize) -> EventStream {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));

        self.subscribers.push(Subscriber {
            label: label.to_owned(),
            sender,
            dropped: Arc::clone(&dropped),
        });

        EventStream { receiver, dropped }
    }

    /// Offer `event` to every subscriber without blocking. Full queues
    /// drop their copy silently, apart from the counter.
    pub fn publish(&self, event: DeviceEvent) {
        for sub in &self.subscribers {
            if sub.sender.try_send(event).is_err() {
                sub.dropped.fetch_add(1, Ordering::Relaxed);
                debug!(
                    subscriber = %sub.label,
                    device_id = event.device_id,
                    "subscriber queue full, event dropped"
                );
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine_and_test() {
        let mut flags = ChangeFlags::NEW;
        flags |= ChangeFlags::UPDATED;

        assert!(flags.contains(ChangeFlags::NEW));
        assert!(flags.contains(ChangeFlags::UPDATED));
        assert!(!flags.contains(ChangeFlags::GONE));
        assert_eq!(flags, ChangeFlags::NEW | ChangeFlags::UPDATED);
    }

    #[tokio::test]
    async fn events_reach_every_subscriber() {
        let mut fanout = EventFanout::new();
        let mut a = fanout.add_listener("a", DEFAULT_QUEUE_CAPACITY);
        let mut b = fanout.add_listener("b", DEFAULT_QUEUE_CAPACITY);

        let event = DeviceEvent {
            device_id: 3,
            changes: ChangeFlags::UPDATED,
        };
        fanout.publish(event);

        assert_eq!(a.recv().await, Some(event));
        assert_eq!(b.recv().await, Some(event));
    }

    #[tokio::test]
    async fn full_queue_drops_and_counts() {
        let mut fanout = EventFanout::new();
        let mut stream = fanout.add_listener("slow", 2);

        for id in 0..5 {
            fanout.publish(DeviceEvent {
                device_id: id,
                changes: ChangeFlags::UPDATED,
            });
        }

        // Capacity 2: the first two events are queued, the rest dropped.
        assert_eq!(stream.try_recv().map(|e| e.device_id), Some(0));
        assert_eq!(stream.try_recv().map(|e| e.device_id), Some(1));
        assert_eq!(stream.try_recv(), None);
        assert_eq!(stream.dropped_count(), 3);
    }

    #[tokio::test]
    async fn closed_fanout_ends_streams() {
        let mut fanout = EventFanout::new();
        let mut stream = fanout.add_listener("sink", 2);
        drop(fanout);

        assert_eq!(stream.recv().await, None);
    }
}
