//! Ingestion pipeline counters.
//!
//! One [`GatewayMetrics`] is constructed at startup and handed to the
//! pipeline; there is no global metric state. Exporters read a
//! [`MetricsSnapshot`] through whatever surface they expose.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct GatewayMetrics {
    frames_received: AtomicU64,
    frames_unrecognized: AtomicU64,
    frames_foreign_network: AtomicU64,
    crc_errors: AtomicU64,
    transport_errors: AtomicU64,
    devices_evicted: AtomicU64,
    events_published: AtomicU64,
}

/// Point-in-time copy of all counters.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_unrecognized: u64,
    pub frames_foreign_network: u64,
    pub crc_errors: u64,
    pub transport_errors: u64,
    pub devices_evicted: u64,
    pub events_published: u64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unrecognized(&self) {
        self.frames_unrecognized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_foreign_network(&self) {
        self.frames_foreign_network.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_crc_error(&self) {
        self.crc_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: u64) {
        self.devices_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn record_event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_unrecognized: self.frames_unrecognized.load(Ordering::Relaxed),
            frames_foreign_network: self.frames_foreign_network.load(Ordering::Relaxed),
            crc_errors: self.crc_errors.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            devices_evicted: self.devices_evicted.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
        }
    }
}
