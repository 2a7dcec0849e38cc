//! # Fieldgate
//!
//! A gateway for battery-powered environmental field sensors on a
//! long-range (LoRa) radio link: raw frames in, structured per-device
//! state and change events out.
//!
//! ## Features
//!
//! - **Register-level SX127x driver**: configuration, transmit, receive,
//!   sleep/idle transitions, interrupt-or-poll event waits
//! - **Interchangeable transports**: hardware modem, marker-framed serial
//!   link, UDP-multicast loopback for testing — selected at startup
//! - **Concurrent device registry**: liveness tracking, partial-reading
//!   merge, periodic eviction of silent devices
//! - **Bounded event fanout**: best-effort broadcast to per-subscriber
//!   queues; a slow consumer never stalls the radio path
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use fieldgate::config::GatewayConfig;
//! use fieldgate::decode::EnvReportDecoder;
//! use fieldgate::gateway::Gateway;
//!
//! # async fn run() {
//! let config = GatewayConfig::load("fieldgate.json").unwrap();
//! let gateway = Gateway::new(config);
//!
//! let mut events = gateway.add_listener("dashboard");
//! let _tasks = gateway.start(Arc::new(EnvReportDecoder));
//!
//! while let Some(event) = events.recv().await {
//!     println!("device {:#06x}: {:?}", event.device_id, event.changes);
//! }
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`radio`] - transport trait, SX127x driver, serial framing, loopback
//! - [`decode`] - telemetry payload decoder contract
//! - [`registry`] - concurrent device state tracking and eviction
//! - [`fanout`] - bounded per-subscriber event queues
//! - [`metrics`] - ingestion pipeline counters
//! - [`gateway`] - task wiring and shutdown
//! - [`config`] - JSON configuration surface

pub mod config;
pub mod decode;
pub mod fanout;
pub mod gateway;
pub mod metrics;
pub mod radio;
pub mod registry;

// Re-export main public types for convenience
pub use config::GatewayConfig;
pub use decode::{ReportDecoder, SensorReport, SensorType};
pub use fanout::{ChangeFlags, DeviceEvent, EventStream};
pub use gateway::Gateway;
pub use metrics::{GatewayMetrics, MetricsSnapshot};
pub use radio::{RadioTransport, RawFrame, TransportError};
pub use registry::{DeviceRegistry, DeviceState};
