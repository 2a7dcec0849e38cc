//! Decoder contract for application-layer telemetry payloads.
//!
//! Payload decoding is a collaborator of the gateway, not part of it:
//! the gateway hands every raw frame to a [`ReportDecoder`] and only
//! consumes the structured result. The environment-sensor decoder here
//! covers the fleet's fixed report layout; other payload formats plug in
//! through the same trait.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Sensor channels a field device can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorType {
    BatteryVolts,
    Temperature,
    Pressure,
    Humidity,
}

/// Presentation scaling for a raw reading: `raw * multiplier / divisor`
/// in `unit`.
#[derive(Debug, Clone, Copy)]
pub struct SensorMetadata {
    pub name: &'static str,
    pub unit: &'static str,
    pub multiplier: u32,
    pub divisor: u32,
}

impl SensorType {
    pub fn metadata(self) -> SensorMetadata {
        match self {
            SensorType::BatteryVolts => SensorMetadata {
                name: "battery",
                unit: "V",
                multiplier: 1,
                divisor: 1000,
            },
            SensorType::Temperature => SensorMetadata {
                name: "temperature",
                unit: "°C",
                multiplier: 1,
                divisor: 100,
            },
            SensorType::Pressure => SensorMetadata {
                name: "pressure",
                unit: "mbar",
                multiplier: 1,
                divisor: 10,
            },
            SensorType::Humidity => SensorMetadata {
                name: "humidity",
                unit: "%",
                multiplier: 1,
                divisor: 100,
            },
        }
    }

    /// Scale a raw reading for presentation.
    pub fn scale(self, raw: u16) -> f64 {
        let md = self.metadata();
        f64::from(raw) * f64::from(md.multiplier) / f64::from(md.divisor)
    }
}

/// Raw integer readings keyed by sensor type. Unscaled; insertion order
/// is irrelevant.
pub type Readings = HashMap<SensorType, u16>;

/// One decoded telemetry report.
#[derive(Debug, Clone)]
pub struct SensorReport {
    pub device_id: u16,
    pub network_id: u16,
    pub alerts: u16,
    pub readings: Readings,
}

/// Maps raw frames to structured reports. `None` means the frame was not
/// recognized; the caller discards it.
pub trait ReportDecoder: Send + Sync {
    fn decode(&self, frame: &[u8]) -> Option<SensorReport>;
}

/// Decoder for the environment-sensor report layout: seven big-endian
/// 16-bit words — device id, network id, alert bitmap, then battery,
/// temperature, pressure and humidity readings.
#[derive(Debug, Default)]
pub struct EnvReportDecoder;

/// Bytes in a well-formed environment-sensor report.
pub const ENV_REPORT_LEN: usize = 14;

impl EnvReportDecoder {
    /// Build the wire form of a report; the simulated publisher and
    /// tests use this to craft frames.
    pub fn encode(report: &SensorReport) -> Vec<u8> {
        let mut frame = Vec::with_capacity(ENV_REPORT_LEN);
        frame.extend_from_slice(&report.device_id.to_be_bytes());
        frame.extend_from_slice(&report.network_id.to_be_bytes());
        frame.extend_from_slice(&report.alerts.to_be_bytes());
        for sensor in [
            SensorType::BatteryVolts,
            SensorType::Temperature,
            SensorType::Pressure,
            SensorType::Humidity,
        ] {
            let raw = report.readings.get(&sensor).copied().unwrap_or(0);
            frame.extend_from_slice(&raw.to_be_bytes());
        }
        frame
    }
}

impl ReportDecoder for EnvReportDecoder {
    fn decode(&self, frame: &[u8]) -> Option<SensorReport> {
        if frame.len() < ENV_REPORT_LEN {
            return None;
        }

        let word = |i: usize| u16::from_be_bytes([frame[2 * i], frame[2 * i + 1]]);

        let mut readings = Readings::new();
        readings.insert(SensorType::BatteryVolts, word(3));
        readings.insert(SensorType::Temperature, word(4));
        readings.insert(SensorType::Pressure, word(5));
        readings.insert(SensorType::Humidity, word(6));

        Some(SensorReport {
            device_id: word(0),
            network_id: word(1),
            alerts: word(2),
            readings,
        })
    }
}
