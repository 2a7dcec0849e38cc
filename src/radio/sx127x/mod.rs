//! Register-level driver for Semtech SX127x LoRa modems (HopeRF RFM9x and
//! similar modules).
//!
//! The driver is generic over the blocking `embedded-hal` SPI and GPIO
//! traits so the RX/TX state machine can be exercised against an in-memory
//! bus in tests. Chip select is expected to be handled by the SPI
//! implementation (the kernel does this for spidev ports).
//!
//! The modem signals TX-done / RX-done either on its DIO0 line or in the
//! IRQ flags register. Both are supported: pass an [`IrqLine`] to wait on
//! rising edges, or construct with [`Sx127x::new_polled`] to busy-poll the
//! flags register instead.

pub mod registers;

use std::thread;
use std::time::{Duration, Instant};

use embedded_hal::blocking::spi::{Transfer, Write};
use embedded_hal::digital::v2::OutputPin;
use serde::{Deserialize, Serialize};

use crate::radio::{RawFrame, FIFO_CAPACITY};
use registers::*;

/// Bandwidth quantization ladder: requested bandwidth rounds up to the
/// nearest bin; anything above the last bin selects the 500 kHz setting.
const BW_BINS: [u32; 9] = [
    7_800, 10_400, 15_600, 20_800, 31_250, 41_700, 62_500, 125_000, 250_000,
];

/// Power amplifier selection. The default is the high-power PA_BOOST path,
/// which every common module wires up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerMode {
    #[default]
    Default,
    Low,
    High,
}

/// Payload CRC control. The default is CRC on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrcMode {
    #[default]
    Default,
    Off,
    On,
}

/// Modem configuration applied once by [`Sx127x::configure`].
///
/// Zero values select defaults for every field except `frequency_hz`,
/// which is mandatory: permitted frequencies vary by region, so there is
/// no sensible global default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadioConfig {
    /// Carrier frequency in Hz. Must be within 240 MHz to 960 MHz.
    pub frequency_hz: u32,

    #[serde(default)]
    pub power_mode: PowerMode,

    /// Configured preamble length; the radiated preamble is 4 symbols
    /// longer. 0 selects the default of 8.
    #[serde(default)]
    pub preamble_length: u16,

    /// Forward error-correction rate denominator, valid 5 through 8.
    /// 0 selects the default of 5.
    #[serde(default)]
    pub coding_rate: u8,

    /// Chirp spreading factor, valid 6 through 12. 0 selects the default
    /// of 7.
    #[serde(default)]
    pub spreading_factor: u8,

    /// Signal bandwidth in Hz, quantized up to the chip's bandwidth bins.
    /// 0 selects the default of 125 kHz.
    #[serde(default)]
    pub bandwidth_hz: u32,

    #[serde(default)]
    pub crc_mode: CrcMode,

    /// Automatic gain control, off by default.
    #[serde(default)]
    pub agc: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum RadioError {
    #[error("frequency is mandatory")]
    FrequencyRequired,
    #[error("frequency must be between 240MHz and 960MHz")]
    FrequencyRange,
    #[error("tx power outside of acceptable range")]
    TxPowerRange,
    #[error("packet too large for radio FIFO")]
    PacketTooLarge,
    #[error("timed out waiting for radio event")]
    Timeout,
    #[error("payload failed CRC check")]
    Crc,
    #[error("SPI transfer failed")]
    Spi,
    #[error("GPIO access failed")]
    Gpio,
}

/// A dedicated interrupt line from the modem.
///
/// One blocking capability: wait for a rising edge within a bounded
/// duration. Kept as a trait so driver waits are mockable without
/// hardware, and so poll-only wiring (no DIO0 connected) stays possible.
pub trait IrqLine {
    /// Block until a rising edge or the timeout elapses. Returns true if
    /// an edge was observed.
    fn wait_for_edge(&mut self, timeout: Duration) -> bool;
}

/// Placeholder IRQ type for poll-mode construction.
pub enum NoIrq {}

impl IrqLine for NoIrq {
    fn wait_for_edge(&mut self, _timeout: Duration) -> bool {
        match *self {}
    }
}

/// SX127x device handle.
pub struct Sx127x<SPI, RESET, IRQ> {
    spi: SPI,
    reset: RESET,
    irq: Option<IRQ>,
    high_power: bool,
}

impl<SPI, RESET> Sx127x<SPI, RESET, NoIrq>
where
    SPI: Transfer<u8> + Write<u8>,
    RESET: OutputPin,
{
    /// Create a driver with no interrupt line; event waits busy-poll the
    /// IRQ flags register.
    pub fn new_polled(spi: SPI, reset: RESET) -> Self {
        Self {
            spi,
            reset,
            irq: None,
            high_power: true,
        }
    }
}

impl<SPI, RESET, IRQ> Sx127x<SPI, RESET, IRQ>
where
    SPI: Transfer<u8> + Write<u8>,
    RESET: OutputPin,
    IRQ: IrqLine,
{
    /// Create a driver that waits for modem events on the DIO0 line.
    pub fn new(spi: SPI, reset: RESET, irq: IRQ) -> Self {
        Self {
            spi,
            reset,
            irq: Some(irq),
            high_power: true,
        }
    }

    /// Give back the bus and reset line, consuming the driver.
    pub fn release(self) -> (SPI, RESET) {
        (self.spi, self.reset)
    }

    /// Sanity presence check: reads the silicon version register and
    /// compares against the known SX127x revision. Not a correctness
    /// guarantee, just a wiring check.
    pub fn detect(&mut self) -> Result<bool, RadioError> {
        Ok(self.read_register(REG_42_VERSION)? == VERSION_EXPECTED)
    }

    /// Apply the full modem configuration.
    ///
    /// Hard-resets the chip, enables LoRa mode and programs frequency,
    /// preamble, bandwidth, coding rate, spreading factor, CRC and AGC,
    /// finishing in standby with TX power at a safe 13 dBm.
    pub fn configure(&mut self, cfg: &RadioConfig) -> Result<(), RadioError> {
        if cfg.frequency_hz == 0 {
            return Err(RadioError::FrequencyRequired);
        }
        if !(240_000_000..=960_000_000).contains(&cfg.frequency_hz) {
            return Err(RadioError::FrequencyRange);
        }

        self.high_power = cfg.power_mode != PowerMode::Low;

        let preamble_length = if cfg.preamble_length == 0 {
            8
        } else {
            cfg.preamble_length
        };
        let bandwidth = if cfg.bandwidth_hz == 0 {
            125_000
        } else {
            cfg.bandwidth_hz
        };
        let coding_rate = if cfg.coding_rate == 0 { 5 } else { cfg.coding_rate };
        let spreading_factor = if cfg.spreading_factor == 0 {
            7
        } else {
            cfg.spreading_factor
        };
        let crc = cfg.crc_mode != CrcMode::Off;

        self.hard_reset()?;

        // Modulation scheme changes require sleep mode first.
        self.sleep()?;
        thread::sleep(Duration::from_millis(10));
        self.set_long_range_mode(true)?;

        // Low frequency mode below 525MHz selects the matching set of
        // band-specific registers (address space 0x61..0x73).
        self.set_low_frequency_mode(cfg.frequency_hz < 525_000_000)?;

        // Dedicate the whole FIFO to rx and tx; only one direction is
        // ever active at a time.
        self.write_register(REG_0E_FIFO_TX_BASE_ADDR, 0x00)?;
        self.write_register(REG_0F_FIFO_RX_BASE_ADDR, 0x00)?;

        self.idle()?;

        self.set_frequency(cfg.frequency_hz)?;
        self.set_preamble_length(preamble_length)?;
        self.set_signal_bandwidth(bandwidth)?;
        self.set_coding_rate(coding_rate)?;
        self.set_spreading_factor(spreading_factor)?;
        self.enable_crc(crc)?;
        self.set_reg_bit(REG_26_MODEM_CONFIG3, cfg.agc, MODEM_CONFIG3_AUTO_AGC_OFFSET)?;

        // 13 dBm is within range for any module, high power or not.
        self.set_tx_power(13)?;

        Ok(())
    }

    /// Enter sleep mode.
    pub fn sleep(&mut self) -> Result<(), RadioError> {
        self.set_operation_mode(MODE_SLEEP)
    }

    /// Enter standby mode.
    pub fn idle(&mut self) -> Result<(), RadioError> {
        self.set_operation_mode(MODE_STANDBY)
    }

    /// Transmit one LoRa packet, waiting up to `timeout` for completion.
    ///
    /// On timeout the device is left in whatever mode it settled in; the
    /// caller decides whether to retry.
    pub fn transmit(&mut self, payload: &[u8], timeout: Duration) -> Result<(), RadioError> {
        if payload.len() > FIFO_CAPACITY {
            return Err(RadioError::PacketTooLarge);
        }

        // Standby required to write the FIFO.
        self.set_operation_mode(MODE_STANDBY)?;
        self.write_register(REG_0D_FIFO_ADDR_PTR, 0)?;
        self.write_burst(REG_00_FIFO, payload)?;
        self.write_register(REG_22_PAYLOAD_LENGTH, payload.len() as u8)?;
        self.set_dio0_mapping(DIO0_TX_DONE)?;
        self.set_operation_mode(MODE_TX)?;

        let deadline = Instant::now() + timeout;
        let flags = self.wait_for_any_event(1 << IRQ_TX_DONE_OFFSET, deadline)?;
        if flags & (1 << IRQ_TX_DONE_OFFSET) == 0 {
            return Err(RadioError::Timeout);
        }

        Ok(())
    }

    /// Receive one LoRa packet into a fresh frame buffer.
    ///
    /// Returns `Ok(None)` when nothing arrived within `timeout`; that is
    /// an expected outcome, not an error. CRC failures return
    /// [`RadioError::Crc`] and the payload is discarded; the caller can
    /// simply re-listen.
    pub fn receive(&mut self, timeout: Duration) -> Result<Option<RawFrame>, RadioError> {
        let mut buf = [0u8; FIFO_CAPACITY];
        match self.receive_into(timeout, &mut buf)? {
            Some(len) => {
                let mut frame = RawFrame::new();
                frame
                    .extend_from_slice(&buf[..len])
                    .map_err(|_| RadioError::PacketTooLarge)?;
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Receive one LoRa packet into `buf`, returning the payload length.
    ///
    /// The payload is truncated to the capacity of `buf`. Timeout and CRC
    /// semantics are those of [`Sx127x::receive`].
    pub fn receive_into(
        &mut self,
        timeout: Duration,
        buf: &mut [u8],
    ) -> Result<Option<usize>, RadioError> {
        self.set_dio0_mapping(DIO0_RX_DONE)?;

        // Continuous mode so the caller can listen for long windows
        // without re-arming single-shot receives.
        self.set_operation_mode(MODE_RX_CONTINUOUS)?;

        let deadline = Instant::now() + timeout;
        let flags = self.wait_for_any_event(
            1 << IRQ_RX_DONE_OFFSET | 1 << IRQ_RX_TIMEOUT_OFFSET,
            deadline,
        )?;

        // Force idle so a newly arriving packet cannot overwrite the FIFO
        // before it is read out.
        self.idle()?;

        if flags & (1 << IRQ_RX_DONE_OFFSET) == 0 {
            return Ok(None);
        }

        if self.crc_error(flags)? {
            return Err(RadioError::Crc);
        }

        let length = self.read_register(REG_13_RX_NB_BYTES)? as usize;
        let addr = self.read_register(REG_10_FIFO_RX_CURRENT_ADDR)?;
        self.write_register(REG_0D_FIFO_ADDR_PTR, addr)?;

        let n = length.min(buf.len());
        self.read_burst(REG_00_FIFO, &mut buf[..n])?;

        Ok(Some(n))
    }

    /// Program the TX output power in dBm.
    ///
    /// High-power modules accept 5..=23; above 20 the PA DAC boost is
    /// enabled and the programmed value reduced by 3. Low-power modules
    /// accept 0..=14 on the RFO path. Out-of-range requests fail without
    /// touching the hardware.
    pub fn set_tx_power(&mut self, db: i8) -> Result<(), RadioError> {
        if self.high_power {
            if !(5..=23).contains(&db) {
                return Err(RadioError::TxPowerRange);
            }

            let mut db = db;
            if db > 20 {
                self.set_reg_bits(
                    REG_4D_PA_DAC,
                    PA_DAC_ENABLE,
                    PA_DAC_BOOST_MASK,
                    PA_DAC_BOOST_OFFSET,
                )?;
                db -= 3;
            } else {
                self.set_reg_bits(
                    REG_4D_PA_DAC,
                    PA_DAC_DISABLE,
                    PA_DAC_BOOST_MASK,
                    PA_DAC_BOOST_OFFSET,
                )?;
            }

            self.set_reg_bit(REG_09_PA_CONFIG, true, PA_CONFIG_SELECT_OFFSET)?;
            self.set_reg_bits(
                REG_09_PA_CONFIG,
                ((db - 5) & 0x0F) as u8,
                PA_CONFIG_POWER_MASK,
                PA_CONFIG_POWER_OFFSET,
            )?;
        } else {
            if !(0..=14).contains(&db) {
                return Err(RadioError::TxPowerRange);
            }

            self.set_reg_bit(REG_09_PA_CONFIG, false, PA_CONFIG_SELECT_OFFSET)?;
            self.set_reg_bits(
                REG_09_PA_CONFIG,
                0b111,
                PA_CONFIG_MAX_POWER_MASK,
                PA_CONFIG_MAX_POWER_OFFSET,
            )?;
            self.set_reg_bits(
                REG_09_PA_CONFIG,
                ((db + 1) & 0x0F) as u8,
                PA_CONFIG_POWER_MASK,
                PA_CONFIG_POWER_OFFSET,
            )?;
        }

        Ok(())
    }

    /// RSSI of the last received packet in dBm.
    pub fn packet_rssi(&mut self) -> Result<i16, RadioError> {
        Ok(-137 + i16::from(self.read_register(REG_1A_PKT_RSSI_VALUE)?))
    }

    /// SNR of the last received packet in dB.
    pub fn packet_snr(&mut self) -> Result<i8, RadioError> {
        Ok(self.read_register(REG_19_PKT_SNR_VALUE)? as i8 / 4)
    }

    /// Wait for any of the masked IRQ flags until `deadline`.
    ///
    /// With an interrupt line: block for a rising edge bounded by the
    /// remaining time; on an edge, read and clear all flags and return
    /// what was observed, even if it does not match `mask` (the caller
    /// re-checks). Without one: busy-poll the flags register until a
    /// masked bit is set, clearing explicitly after a match.
    ///
    /// Returns 0 if no event arrived in time.
    fn wait_for_any_event(&mut self, mask: u8, deadline: Instant) -> Result<u8, RadioError> {
        loop {
            let now = Instant::now();
            if now >= deadline {
                return Ok(0);
            }

            if let Some(irq) = self.irq.as_mut() {
                if !irq.wait_for_edge(deadline - now) {
                    return Ok(0);
                }
                let flags = self.read_register(REG_12_IRQ_FLAGS)?;
                self.clear_interrupts()?;
                return Ok(flags);
            }

            let flags = self.read_register(REG_12_IRQ_FLAGS)?;
            if flags & mask != 0 {
                // No interrupt edge handling in poll mode, so the flags
                // must be cleared here.
                self.clear_interrupts()?;
                return Ok(flags);
            }
        }
    }

    /// A payload CRC error is only meaningful when the packet actually
    /// carried a CRC: both the CrcOnPayload bit and the error flag must
    /// be set. `flags` is the IRQ state observed by the event wait; it
    /// cannot be re-read since the wait already cleared it.
    fn crc_error(&mut self, flags: u8) -> Result<bool, RadioError> {
        Ok(
            self.get_reg_bit(REG_1C_HOP_CHANNEL, HOP_CHANNEL_CRC_ON_PAYLOAD_OFFSET)?
                && flags & (1 << IRQ_PAYLOAD_CRC_ERROR_OFFSET) != 0,
        )
    }

    fn hard_reset(&mut self) -> Result<(), RadioError> {
        self.reset.set_low().map_err(|_| RadioError::Gpio)?;
        thread::sleep(Duration::from_micros(100));
        self.reset.set_high().map_err(|_| RadioError::Gpio)?;
        thread::sleep(Duration::from_millis(5));
        Ok(())
    }

    fn clear_interrupts(&mut self) -> Result<(), RadioError> {
        self.write_register(REG_12_IRQ_FLAGS, 0xFF)
    }

    fn set_operation_mode(&mut self, mode: u8) -> Result<(), RadioError> {
        self.set_reg_bits(REG_01_OP_MODE, mode, OP_MODE_MODE_MASK, OP_MODE_MODE_OFFSET)
    }

    fn set_long_range_mode(&mut self, on: bool) -> Result<(), RadioError> {
        self.set_reg_bits(
            REG_01_OP_MODE,
            u8::from(on),
            OP_MODE_LRM_MASK,
            OP_MODE_LRM_OFFSET,
        )
    }

    fn set_low_frequency_mode(&mut self, on: bool) -> Result<(), RadioError> {
        self.set_reg_bits(
            REG_01_OP_MODE,
            u8::from(on),
            OP_MODE_LFM_MASK,
            OP_MODE_LFM_OFFSET,
        )
    }

    fn low_frequency_mode(&mut self) -> Result<bool, RadioError> {
        Ok(self.get_reg_bits(REG_01_OP_MODE, OP_MODE_LFM_MASK, OP_MODE_LFM_OFFSET)? != 0)
    }

    fn set_frequency(&mut self, freq: u32) -> Result<(), RadioError> {
        // 24-bit FRF = freq * 2^19 / Fxosc, computed in u64 to avoid
        // floating point.
        let frf = ((u64::from(freq) * 524_288) / u64::from(FXOSC)) as u32 & 0xFF_FFFF;

        self.write_register(REG_06_FRF_MSB, (frf >> 16) as u8)?;
        self.write_register(REG_07_FRF_MID, ((frf >> 8) & 0xFF) as u8)?;
        self.write_register(REG_08_FRF_LSB, (frf & 0xFF) as u8)?;

        Ok(())
    }

    fn set_preamble_length(&mut self, len: u16) -> Result<(), RadioError> {
        self.write_register(REG_20_PREAMBLE_MSB, (len >> 8) as u8)?;
        self.write_register(REG_21_PREAMBLE_LSB, (len & 0xFF) as u8)
    }

    fn set_signal_bandwidth(&mut self, bw: u32) -> Result<(), RadioError> {
        let bw_id = BW_BINS
            .iter()
            .position(|&bin| bw <= bin)
            .unwrap_or(BW_BINS.len()) as u8;

        self.set_reg_bits(
            REG_1D_MODEM_CONFIG1,
            bw_id,
            MODEM_CONFIG1_BW_MASK,
            MODEM_CONFIG1_BW_OFFSET,
        )?;

        // Semtech errata work-arounds for receiver spurious reception,
        // following the RFM9x reference implementation.
        if bw >= 500_000 {
            self.set_reg_bits(
                REG_31_DETECTION_OPTIMIZE,
                1,
                DETECTION_OPTIMIZE_AUTO_IF_ON_MASK,
                DETECTION_OPTIMIZE_AUTO_IF_ON_OFFSET,
            )?;

            if self.low_frequency_mode()? {
                self.write_register(REG_36_HIGHBW_OPTIMIZE1, 0x02)?;
                self.write_register(REG_3A_HIGHBW_OPTIMIZE2, 0x20)?;
            } else {
                self.write_register(REG_36_HIGHBW_OPTIMIZE1, 0x02)?;
                self.write_register(REG_3A_HIGHBW_OPTIMIZE2, 0x64)?;
            }
        } else {
            self.set_reg_bits(
                REG_31_DETECTION_OPTIMIZE,
                0,
                DETECTION_OPTIMIZE_AUTO_IF_ON_MASK,
                DETECTION_OPTIMIZE_AUTO_IF_ON_OFFSET,
            )?;

            self.write_register(REG_36_HIGHBW_OPTIMIZE1, 0x03)?;
            if bw == 7_800 {
                self.write_register(REG_2F_IF_FREQ2, 0x48)?;
            } else if bw >= 62_500 {
                self.write_register(REG_2F_IF_FREQ2, 0x40)?;
            } else {
                self.write_register(REG_2F_IF_FREQ2, 0x44)?;
            }
            self.write_register(REG_30_IF_FREQ1, 0)?;
        }

        Ok(())
    }

    fn set_coding_rate(&mut self, rate: u8) -> Result<(), RadioError> {
        let cr_id = rate.clamp(5, 8) - 4;
        self.set_reg_bits(
            REG_1D_MODEM_CONFIG1,
            cr_id,
            MODEM_CONFIG1_CR_MASK,
            MODEM_CONFIG1_CR_OFFSET,
        )
    }

    fn set_spreading_factor(&mut self, sf: u8) -> Result<(), RadioError> {
        let sf = sf.clamp(6, 12);

        // SF6 needs a different detection threshold and optimize value.
        let threshold = if sf == 6 {
            self.set_reg_bits(
                REG_31_DETECTION_OPTIMIZE,
                0x05,
                DETECTION_OPTIMIZE_SF_MASK,
                DETECTION_OPTIMIZE_SF_OFFSET,
            )?;
            0x0C
        } else {
            self.set_reg_bits(
                REG_31_DETECTION_OPTIMIZE,
                0x03,
                DETECTION_OPTIMIZE_SF_MASK,
                DETECTION_OPTIMIZE_SF_OFFSET,
            )?;
            0x0A
        };

        self.write_register(REG_37_DETECTION_THRESHOLD, threshold)?;
        self.set_reg_bits(
            REG_1E_MODEM_CONFIG2,
            sf,
            MODEM_CONFIG2_SF_MASK,
            MODEM_CONFIG2_SF_OFFSET,
        )
    }

    fn enable_crc(&mut self, on: bool) -> Result<(), RadioError> {
        self.set_reg_bit(REG_1E_MODEM_CONFIG2, on, MODEM_CONFIG2_CRC_ON_OFFSET)
    }

    fn set_dio0_mapping(&mut self, function: u8) -> Result<(), RadioError> {
        self.set_reg_bits(
            REG_40_DIO_MAPPING1,
            function,
            DIO_MAPPING1_DIO0_MASK,
            DIO_MAPPING1_DIO0_OFFSET,
        )
    }

    fn set_reg_bits(
        &mut self,
        reg: u8,
        val: u8,
        mask: u8,
        offset: u8,
    ) -> Result<(), RadioError> {
        let mut v = self.read_register(reg)?;
        v &= !(mask << offset);
        v |= (val & mask) << offset;
        self.write_register(reg, v)
    }

    fn get_reg_bits(&mut self, reg: u8, mask: u8, offset: u8) -> Result<u8, RadioError> {
        Ok((self.read_register(reg)? >> offset) & mask)
    }

    fn set_reg_bit(&mut self, reg: u8, val: bool, offset: u8) -> Result<(), RadioError> {
        self.set_reg_bits(reg, u8::from(val), 1, offset)
    }

    fn get_reg_bit(&mut self, reg: u8, offset: u8) -> Result<bool, RadioError> {
        Ok(self.get_reg_bits(reg, 1, offset)? != 0)
    }

    fn read_register(&mut self, reg: u8) -> Result<u8, RadioError> {
        // High bit clear selects a read.
        let mut buf = [reg & 0x7F, 0];
        let out = self.spi.transfer(&mut buf).map_err(|_| RadioError::Spi)?;
        Ok(out[1])
    }

    fn write_register(&mut self, reg: u8, value: u8) -> Result<(), RadioError> {
        // High bit set selects a write.
        self.spi
            .write(&[reg | 0x80, value])
            .map_err(|_| RadioError::Spi)
    }

    fn write_burst(&mut self, reg: u8, data: &[u8]) -> Result<(), RadioError> {
        let mut buf = [0u8; FIFO_CAPACITY + 1];
        buf[0] = reg | 0x80;
        buf[1..=data.len()].copy_from_slice(data);
        self.spi
            .write(&buf[..=data.len()])
            .map_err(|_| RadioError::Spi)
    }

    fn read_burst(&mut self, reg: u8, data: &mut [u8]) -> Result<(), RadioError> {
        let mut buf = [0u8; FIFO_CAPACITY + 1];
        buf[0] = reg & 0x7F;
        let n = data.len();
        let out = self.spi.transfer(&mut buf[..=n]).map_err(|_| RadioError::Spi)?;
        data.copy_from_slice(&out[1..=n]);
        Ok(())
    }
}
