//! Radio transports.
//!
//! Three interchangeable backends deliver raw frames to the gateway: the
//! SX127x hardware driver, a marker-framed serial link to an intermediary
//! controller, and a UDP-multicast loopback for testing. All are unified
//! behind the blocking [`RadioTransport`] trait and selected at startup
//! from configuration.

pub mod hw;
pub mod serial;
pub mod simulated;
pub mod sx127x;

use std::io;
use std::time::Duration;

use static_assertions::const_assert;

use crate::config::TransportConfig;
use sx127x::RadioError;

/// On-chip FIFO capacity; no frame on any transport exceeds this.
pub const FIFO_CAPACITY: usize = 256;

/// One received radio frame.
pub type RawFrame = heapless::Vec<u8, FIFO_CAPACITY>;

// The serial framing length byte must cover every frame the FIFO can hold.
const_assert!(FIFO_CAPACITY <= u8::MAX as usize + 1);

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Frame arrived but failed its integrity check; discard and re-listen.
    #[error("payload failed integrity check")]
    Crc,
    /// Fault in the radio driver below the transport surface.
    #[error("radio fault: {0}")]
    Radio(#[from] RadioError),
    /// I/O failure on the underlying byte stream or bus.
    #[error("transport i/o: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Recoverable errors let the receive loop re-listen on the same
    /// transport; anything else forces re-acquisition.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TransportError::Crc | TransportError::Radio(RadioError::Timeout)
        )
    }
}

/// One capability set shared by every backend: blocking receive with a
/// timeout, and close. Exactly one task owns the active transport.
pub trait RadioTransport: Send {
    /// Wait up to `timeout` for one frame, copying it into `buf`.
    ///
    /// `Ok(None)` means nothing arrived in time — an expected outcome,
    /// not an error.
    fn recv_timeout(
        &mut self,
        timeout: Duration,
        buf: &mut [u8],
    ) -> Result<Option<usize>, TransportError>;

    /// Release the transport's resources.
    fn close(&mut self) -> Result<(), TransportError>;
}

/// Construct the transport selected by configuration.
pub fn open_transport(
    cfg: &TransportConfig,
) -> Result<Box<dyn RadioTransport + Send>, TransportError> {
    match cfg {
        TransportConfig::Sx127x(hw_cfg) => hw::open(hw_cfg),
        TransportConfig::Serial { port, baud_rate } => Ok(Box::new(
            serial::SerialTransport::open(port, *baud_rate)?,
        )),
        TransportConfig::Simulated => Ok(Box::new(simulated::SimulatedTransport::join()?)),
    }
}
