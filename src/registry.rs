//! Concurrent registry of known devices and their latest state.
//!
//! The registry is specific to one network, so a device id is unique
//! within it. One mutex guards every read, insert, merge and deletion;
//! critical sections are short and do no blocking I/O, so the radio
//! receive loop, the eviction sweep and query callers can all share it.
//! Devices unseen for more than two liveness periods are evicted.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::info;

use crate::decode::Readings;
use crate::fanout::{ChangeFlags, DeviceEvent, EventFanout, EventStream};

/// Default reassessment interval for device staleness.
pub const DEFAULT_LIVENESS_PERIOD: Duration = Duration::from_secs(60);

/// Latest known state of one field device.
#[derive(Debug, Clone)]
pub struct DeviceState {
    pub device_id: u16,
    pub last_seen: Instant,
    pub alerts: u16,
    pub readings: Readings,
}

struct Inner {
    devices: HashMap<u16, DeviceState>,
    fanout: EventFanout,
}

pub struct DeviceRegistry {
    inner: Mutex<Inner>,
    liveness_period: Duration,
}

impl DeviceRegistry {
    pub fn new(liveness_period: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                devices: HashMap::new(),
                fanout: EventFanout::new(),
            }),
            liveness_period,
        }
    }

    /// The staleness reassessment interval; the eviction threshold is
    /// twice this.
    pub fn liveness_period(&self) -> Duration {
        self.liveness_period
    }

    /// Register a subscriber for the lifetime of the process.
    pub fn add_listener(&self, label: &str, capacity: usize) -> EventStream {
        let mut inner = self.lock();
        inner.fanout.add_listener(label, capacity)
    }

    /// Fold one decoded report into the registry and broadcast exactly
    /// one change event describing what happened.
    ///
    /// An unseen id is created (NEW); `alerts` replaces the stored bitmap
    /// wholesale; `readings` merge key-by-key so a device sending a
    /// partial report keeps its previously stored sensor types. UPDATED
    /// is always set, brand-new devices included.
    pub fn on_message(&self, device_id: u16, alerts: u16, readings: &Readings) -> DeviceEvent {
        let mut inner = self.lock();

        let mut changes = ChangeFlags::NONE;
        let device = inner.devices.entry(device_id).or_insert_with(|| {
            changes |= ChangeFlags::NEW;
            DeviceState {
                device_id,
                last_seen: Instant::now(),
                alerts: 0,
                readings: Readings::new(),
            }
        });

        device.last_seen = Instant::now();
        device.alerts = alerts;
        for (&sensor, &value) in readings {
            device.readings.insert(sensor, value);
        }
        changes |= ChangeFlags::UPDATED;

        let event = DeviceEvent { device_id, changes };
        inner.fanout.publish(event);
        event
    }

    /// Point-in-time snapshot of one device.
    pub fn get_device(&self, device_id: u16) -> Option<DeviceState> {
        self.lock().devices.get(&device_id).cloned()
    }

    pub fn device_count(&self) -> usize {
        self.lock().devices.len()
    }

    /// Remove devices unseen for more than two liveness periods,
    /// emitting one GONE event per eviction. Returns how many were
    /// evicted.
    ///
    /// Removal and the GONE event happen under the same lock hold, so a
    /// message racing with the sweep sees either the old device or a
    /// clean slate — never a torn state. An id arriving right after its
    /// eviction starts over as a brand-new device.
    pub fn sweep_stale(&self) -> usize {
        let now = Instant::now();
        let threshold = 2 * self.liveness_period;
        let mut inner = self.lock();

        let stale: Vec<u16> = inner
            .devices
            .values()
            .filter(|d| now.duration_since(d.last_seen) > threshold)
            .map(|d| d.device_id)
            .collect();

        for &device_id in &stale {
            inner.devices.remove(&device_id);
            info!(device_id, "device timed out, evicting");
            inner.fanout.publish(DeviceEvent {
                device_id,
                changes: ChangeFlags::GONE,
            });
        }

        stale.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_LIVENESS_PERIOD)
    }
}
