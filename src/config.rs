//! Gateway configuration, loaded from a JSON file and overridable from
//! the command line.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::radio::sx127x::RadioConfig;

pub const DEFAULT_CONFIG_PATH: &str = "fieldgate.json";

const DEFAULT_LIVENESS_SECS: u64 = 60;
const DEFAULT_QUEUE_CAPACITY: usize = 10;
const DEFAULT_BAUD_RATE: u32 = 115_200;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Which radio backend to run, chosen at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TransportConfig {
    /// SX127x modem on a local SPI bus.
    Sx127x(HardwareConfig),
    /// Radio behind an intermediary controller on a serial link.
    Serial {
        port: String,
        #[serde(default = "default_baud_rate")]
        baud_rate: u32,
    },
    /// UDP-multicast loopback for testing.
    Simulated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareConfig {
    /// SPI port the modem hangs off, e.g. `/dev/spidev0.0`.
    pub spi_device: String,
    /// GPIO number of the reset line.
    pub reset_pin: u64,
    /// GPIO number of the DIO0 interrupt line; omit to poll instead.
    #[serde(default)]
    pub irq_pin: Option<u64>,
    pub radio: RadioConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Sensor network this gateway serves; reports for other networks
    /// are discarded.
    pub network_id: u16,

    /// Device staleness reassessment interval; eviction happens after
    /// twice this.
    #[serde(default = "default_liveness_secs")]
    pub liveness_period_secs: u64,

    /// Depth of each subscriber's event queue.
    #[serde(default = "default_queue_capacity")]
    pub event_queue_capacity: usize,

    pub transport: TransportConfig,
}

impl GatewayConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn liveness_period(&self) -> Duration {
        // A zero period would evict everything instantly and spin the
        // sweep timer; floor it at one second.
        Duration::from_secs(self.liveness_period_secs.max(1))
    }
}

fn default_liveness_secs() -> u64 {
    DEFAULT_LIVENESS_SECS
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}
