//! Host wiring for the SX127x transport on Linux SBCs.
//!
//! The driver itself is generic over `embedded-hal` traits; this module
//! binds it to a spidev port and sysfs GPIO lines and adapts it to the
//! [`RadioTransport`] capability set.

use std::io;
use std::time::Duration;

use embedded_hal::blocking::spi::{Transfer, Write};
use embedded_hal::digital::v2::OutputPin;
use linux_embedded_hal::spidev::{SpiModeFlags, SpidevOptions};
use linux_embedded_hal::sysfs_gpio::{self, Direction, Edge};
use linux_embedded_hal::{Spidev, SysfsPin};
use tracing::{debug, info, warn};

use crate::config::HardwareConfig;
use crate::radio::sx127x::{IrqLine, RadioError, Sx127x};
use crate::radio::{RadioTransport, TransportError};

const SPI_CLOCK_HZ: u32 = 1_000_000;

/// [`RadioTransport`] adapter over the register-level driver.
pub struct Sx127xTransport<SPI, RESET, IRQ> {
    dev: Sx127x<SPI, RESET, IRQ>,
}

impl<SPI, RESET, IRQ> Sx127xTransport<SPI, RESET, IRQ>
where
    SPI: Transfer<u8> + Write<u8>,
    RESET: OutputPin,
    IRQ: IrqLine,
{
    pub fn new(dev: Sx127x<SPI, RESET, IRQ>) -> Self {
        Self { dev }
    }
}

impl<SPI, RESET, IRQ> RadioTransport for Sx127xTransport<SPI, RESET, IRQ>
where
    SPI: Transfer<u8> + Write<u8> + Send,
    RESET: OutputPin + Send,
    IRQ: IrqLine + Send,
{
    fn recv_timeout(
        &mut self,
        timeout: Duration,
        buf: &mut [u8],
    ) -> Result<Option<usize>, TransportError> {
        match self.dev.receive_into(timeout, buf) {
            Ok(Some(n)) => {
                if let (Ok(rssi), Ok(snr)) = (self.dev.packet_rssi(), self.dev.packet_snr()) {
                    debug!(rssi_dbm = rssi, snr_db = snr, len = n, "frame received");
                }
                Ok(Some(n))
            }
            Ok(None) => Ok(None),
            Err(RadioError::Crc) => Err(TransportError::Crc),
            Err(e) => Err(TransportError::Radio(e)),
        }
    }

    fn close(&mut self) -> Result<(), TransportError> {
        self.dev.sleep().map_err(TransportError::Radio)
    }
}

/// DIO0 interrupt line backed by a sysfs GPIO edge poller.
pub struct SysfsIrq {
    poller: sysfs_gpio::PinPoller,
}

impl IrqLine for SysfsIrq {
    fn wait_for_edge(&mut self, timeout: Duration) -> bool {
        let ms = timeout.as_millis().min(i32::MAX as u128) as isize;
        matches!(self.poller.poll(ms), Ok(Some(_)))
    }
}

/// Open the SPI port and GPIO lines, configure the modem, and hand back
/// the transport. The interrupt pin is optional; without one the driver
/// polls the IRQ flags register.
pub fn open(cfg: &HardwareConfig) -> Result<Box<dyn RadioTransport + Send>, TransportError> {
    let mut spi = Spidev::open(&cfg.spi_device)?;
    let options = SpidevOptions::new()
        .bits_per_word(8)
        .max_speed_hz(SPI_CLOCK_HZ)
        .mode(SpiModeFlags::SPI_MODE_0)
        .build();
    spi.configure(&options)?;

    let reset_pin = sysfs_gpio::Pin::new(cfg.reset_pin);
    reset_pin.export().map_err(gpio_err)?;
    reset_pin.set_direction(Direction::High).map_err(gpio_err)?;
    let reset = SysfsPin(reset_pin);

    match cfg.irq_pin {
        Some(pin_num) => {
            let pin = sysfs_gpio::Pin::new(pin_num);
            pin.export().map_err(gpio_err)?;
            pin.set_direction(Direction::In).map_err(gpio_err)?;
            pin.set_edge(Edge::RisingEdge).map_err(gpio_err)?;
            let poller = pin.get_poller().map_err(gpio_err)?;

            let dev = Sx127x::new(spi, reset, SysfsIrq { poller });
            finish(dev, cfg)
        }
        None => {
            let dev = Sx127x::new_polled(spi, reset);
            finish(dev, cfg)
        }
    }
}

fn finish<SPI, RESET, IRQ>(
    mut dev: Sx127x<SPI, RESET, IRQ>,
    cfg: &HardwareConfig,
) -> Result<Box<dyn RadioTransport + Send>, TransportError>
where
    SPI: Transfer<u8> + Write<u8> + Send + 'static,
    RESET: OutputPin + Send + 'static,
    IRQ: IrqLine + Send + 'static,
{
    if dev.detect()? {
        info!("sx127x detected on {}", cfg.spi_device);
    } else {
        warn!("sx127x not detected on {}; continuing anyway", cfg.spi_device);
    }

    dev.configure(&cfg.radio)?;
    info!(
        frequency_hz = cfg.radio.frequency_hz,
        "sx127x configured"
    );

    Ok(Box::new(Sx127xTransport::new(dev)))
}

fn gpio_err(e: sysfs_gpio::Error) -> TransportError {
    TransportError::Io(io::Error::new(io::ErrorKind::Other, e.to_string()))
}
