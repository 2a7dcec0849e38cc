mod common;

use std::time::Duration;

use common::{MockBus, MockPin};
use fieldgate::radio::sx127x::{CrcMode, PowerMode, RadioConfig, RadioError, Sx127x};

const REG_OP_MODE: usize = 0x01;
const REG_FRF_MSB: usize = 0x06;
const REG_FRF_MID: usize = 0x07;
const REG_FRF_LSB: usize = 0x08;
const REG_PA_CONFIG: usize = 0x09;
const REG_IRQ_FLAGS: usize = 0x12;
const REG_HOP_CHANNEL: usize = 0x1C;
const REG_MODEM_CONFIG1: usize = 0x1D;
const REG_MODEM_CONFIG2: usize = 0x1E;
const REG_PREAMBLE_MSB: usize = 0x20;
const REG_PREAMBLE_LSB: usize = 0x21;
const REG_PAYLOAD_LENGTH: usize = 0x22;
const REG_2F_IF_FREQ2: usize = 0x2F;
const REG_DETECTION_OPTIMIZE: usize = 0x31;
const REG_DETECTION_THRESHOLD: usize = 0x37;
const REG_VERSION: usize = 0x42;
const REG_PA_DAC: usize = 0x4D;

const FXOSC: u64 = 32_000_000;
const BW_BINS: [u32; 9] = [
    7_800, 10_400, 15_600, 20_800, 31_250, 41_700, 62_500, 125_000, 250_000,
];

fn config(frequency_hz: u32) -> RadioConfig {
    RadioConfig {
        frequency_hz,
        power_mode: PowerMode::Default,
        preamble_length: 0,
        coding_rate: 0,
        spreading_factor: 0,
        bandwidth_hz: 0,
        crc_mode: CrcMode::Default,
        agc: false,
    }
}

fn configured_bus(cfg: &RadioConfig) -> MockBus {
    let mut dev = Sx127x::new_polled(MockBus::new(), MockPin::new());
    dev.configure(cfg).expect("configure");
    dev.release().0
}

#[test]
fn detect_matches_version_register() {
    let mut bus = MockBus::new();
    bus.regs[REG_VERSION] = 0x12;
    let mut dev = Sx127x::new_polled(bus, MockPin::new());
    assert!(dev.detect().unwrap());

    let mut bus = dev.release().0;
    bus.regs[REG_VERSION] = 0x22;
    let mut dev = Sx127x::new_polled(bus, MockPin::new());
    assert!(!dev.detect().unwrap());
}

#[test]
fn configure_rejects_bad_frequencies() {
    let mut dev = Sx127x::new_polled(MockBus::new(), MockPin::new());

    assert!(matches!(
        dev.configure(&config(0)),
        Err(RadioError::FrequencyRequired)
    ));
    assert!(matches!(
        dev.configure(&config(100_000_000)),
        Err(RadioError::FrequencyRange)
    ));
    assert!(matches!(
        dev.configure(&config(1_000_000_000)),
        Err(RadioError::FrequencyRange)
    ));
}

#[test]
fn configure_defaults_program_known_register_values() {
    let bus = configured_bus(&config(868_100_000));

    // LoRa mode on, standby, high-frequency band.
    assert_eq!(bus.regs[REG_OP_MODE] & 0x80, 0x80);
    assert_eq!(bus.regs[REG_OP_MODE] & 0x07, 0x01);
    assert_eq!(bus.regs[REG_OP_MODE] & 0x08, 0x00);

    // Bw125Cr45Sf128, CRC on: the RadioHead-compatible default.
    assert_eq!(bus.regs[REG_MODEM_CONFIG1], 0x72);
    assert_eq!(bus.regs[REG_MODEM_CONFIG2], 0x74);

    assert_eq!(bus.regs[REG_PREAMBLE_MSB], 0x00);
    assert_eq!(bus.regs[REG_PREAMBLE_LSB], 0x08);

    // Whole FIFO dedicated to each direction.
    assert_eq!(bus.regs[0x0E], 0x00);
    assert_eq!(bus.regs[0x0F], 0x00);

    // SF7 detection tuning and sub-500kHz errata values.
    assert_eq!(bus.regs[REG_DETECTION_OPTIMIZE] & 0x07, 0x03);
    assert_eq!(bus.regs[REG_DETECTION_THRESHOLD], 0x0A);
    assert_eq!(bus.regs[0x36], 0x03);
    assert_eq!(bus.regs[REG_2F_IF_FREQ2], 0x40);
    assert_eq!(bus.regs[0x30], 0x00);

    // 13 dBm on the PA_BOOST path, DAC boost off.
    assert_eq!(bus.regs[REG_PA_CONFIG], 0x88);
    assert_eq!(bus.regs[REG_PA_DAC] & 0x07, 0x04);
}

#[test]
fn configure_sets_low_frequency_mode_below_525mhz() {
    let bus = configured_bus(&config(433_000_000));
    assert_eq!(bus.regs[REG_OP_MODE] & 0x08, 0x08);
}

#[test]
fn frequency_programming_round_trips() {
    for freq in [240_000_000u32, 433_000_000, 868_100_000, 915_000_000, 960_000_000] {
        let bus = configured_bus(&config(freq));

        let frf = (u32::from(bus.regs[REG_FRF_MSB]) << 16)
            | (u32::from(bus.regs[REG_FRF_MID]) << 8)
            | u32::from(bus.regs[REG_FRF_LSB]);
        let decoded = (u64::from(frf) * FXOSC / 524_288) as i64;

        // One quantization step is Fxosc / 2^19, about 61 Hz.
        let step = (FXOSC / 524_288) as i64 + 1;
        assert!(
            (decoded - i64::from(freq)).abs() <= step,
            "freq {freq} decoded as {decoded}"
        );
    }
}

#[test]
fn valid_modulation_parameters_read_back_after_quantization() {
    for coding_rate in 5..=8u8 {
        for spreading_factor in 6..=12u8 {
            for bandwidth_hz in [7_800u32, 20_000, 62_500, 125_000, 200_000, 300_000] {
                let cfg = RadioConfig {
                    coding_rate,
                    spreading_factor,
                    bandwidth_hz,
                    ..config(868_100_000)
                };
                let bus = configured_bus(&cfg);

                let mc1 = bus.regs[REG_MODEM_CONFIG1];
                let mc2 = bus.regs[REG_MODEM_CONFIG2];

                assert_eq!((mc1 >> 1) & 0x07, coding_rate - 4);
                assert_eq!(mc2 >> 4, spreading_factor);

                // Bandwidth rounds up to the nearest ladder bin.
                let bw_id = (mc1 >> 4) as usize;
                let expected_id = BW_BINS
                    .iter()
                    .position(|&bin| bandwidth_hz <= bin)
                    .unwrap_or(BW_BINS.len());
                assert_eq!(bw_id, expected_id);
            }
        }
    }
}

#[test]
fn spreading_factor_6_uses_alternate_detection_tuning() {
    let cfg = RadioConfig {
        spreading_factor: 6,
        ..config(868_100_000)
    };
    let bus = configured_bus(&cfg);

    assert_eq!(bus.regs[REG_DETECTION_OPTIMIZE] & 0x07, 0x05);
    assert_eq!(bus.regs[REG_DETECTION_THRESHOLD], 0x0C);
}

#[test]
fn wide_bandwidth_enables_auto_if_and_optimize_registers() {
    let cfg = RadioConfig {
        bandwidth_hz: 500_000,
        ..config(868_100_000)
    };
    let bus = configured_bus(&cfg);

    assert_eq!(bus.regs[REG_DETECTION_OPTIMIZE] & 0x80, 0x80);
    assert_eq!(bus.regs[0x36], 0x02);
    // High-frequency band value; the low band programs 0x20 instead.
    assert_eq!(bus.regs[0x3A], 0x64);
}

#[test]
fn crc_off_clears_the_crc_enable_bit() {
    let cfg = RadioConfig {
        crc_mode: CrcMode::Off,
        ..config(868_100_000)
    };
    let bus = configured_bus(&cfg);
    assert_eq!(bus.regs[REG_MODEM_CONFIG2] & 0x04, 0x00);
}

#[test]
fn tx_power_boost_encoding_above_20dbm() {
    let mut dev = Sx127x::new_polled(MockBus::new(), MockPin::new());
    dev.configure(&config(868_100_000)).unwrap();

    dev.set_tx_power(23).unwrap();
    let bus = dev.release().0;

    // Boost enabled and 23-3=20 encoded as (20-5)&0xF on the boost path.
    assert_eq!(bus.regs[REG_PA_DAC] & 0x07, 0x07);
    assert_eq!(bus.regs[REG_PA_CONFIG] & 0x80, 0x80);
    assert_eq!(bus.regs[REG_PA_CONFIG] & 0x0F, 0x0F);
}

#[test]
fn tx_power_low_power_module_encoding() {
    let cfg = RadioConfig {
        power_mode: PowerMode::Low,
        ..config(868_100_000)
    };
    let mut dev = Sx127x::new_polled(MockBus::new(), MockPin::new());
    dev.configure(&cfg).unwrap();

    dev.set_tx_power(14).unwrap();
    let bus = dev.release().0;

    // RFO path: PA select clear, max-power field topped out,
    // power = (14+1)&0xF.
    assert_eq!(bus.regs[REG_PA_CONFIG] & 0x80, 0x00);
    assert_eq!((bus.regs[REG_PA_CONFIG] >> 4) & 0x07, 0x07);
    assert_eq!(bus.regs[REG_PA_CONFIG] & 0x0F, 0x0F);
}

#[test]
fn tx_power_range_is_capability_dependent() {
    let mut dev = Sx127x::new_polled(MockBus::new(), MockPin::new());
    dev.configure(&config(868_100_000)).unwrap();
    assert!(matches!(dev.set_tx_power(4), Err(RadioError::TxPowerRange)));
    assert!(matches!(dev.set_tx_power(24), Err(RadioError::TxPowerRange)));

    let cfg = RadioConfig {
        power_mode: PowerMode::Low,
        ..config(868_100_000)
    };
    let mut dev = Sx127x::new_polled(MockBus::new(), MockPin::new());
    dev.configure(&cfg).unwrap();
    assert!(matches!(dev.set_tx_power(-1), Err(RadioError::TxPowerRange)));
    assert!(matches!(dev.set_tx_power(15), Err(RadioError::TxPowerRange)));
}

#[test]
fn transmit_writes_fifo_and_completes_on_tx_done() {
    let mut bus = MockBus::new();
    bus.regs[REG_IRQ_FLAGS] = 1 << 3; // TxDone already raised
    let mut dev = Sx127x::new_polled(bus, MockPin::new());

    dev.transmit(b"hello", Duration::from_millis(100)).unwrap();
    let bus = dev.release().0;

    assert_eq!(&bus.fifo[..5], b"hello");
    assert_eq!(bus.regs[REG_PAYLOAD_LENGTH], 5);
    // DIO0 mapped to TxDone and the flag consumed.
    assert_eq!(bus.regs[0x40] >> 6, 0b01);
    assert_eq!(bus.regs[REG_IRQ_FLAGS], 0);
}

#[test]
fn transmit_rejects_oversized_payload_before_hardware() {
    let mut dev = Sx127x::new_polled(MockBus::new(), MockPin::new());
    let payload = [0u8; 257];

    assert!(matches!(
        dev.transmit(&payload, Duration::from_millis(10)),
        Err(RadioError::PacketTooLarge)
    ));

    // Nothing touched.
    let bus = dev.release().0;
    assert_eq!(bus.regs[REG_PAYLOAD_LENGTH], 0);
}

#[test]
fn transmit_times_out_without_tx_done() {
    let mut dev = Sx127x::new_polled(MockBus::new(), MockPin::new());

    assert!(matches!(
        dev.transmit(b"x", Duration::from_millis(20)),
        Err(RadioError::Timeout)
    ));
}

#[test]
fn receive_returns_staged_packet() {
    let mut bus = MockBus::new();
    bus.stage_rx_packet(0x10, b"telemetry");
    let mut dev = Sx127x::new_polled(bus, MockPin::new());

    let frame = dev.receive(Duration::from_millis(100)).unwrap().unwrap();
    assert_eq!(frame.as_slice(), b"telemetry");

    // Forced back to standby after the wait.
    let bus = dev.release().0;
    assert_eq!(bus.regs[REG_OP_MODE] & 0x07, 0x01);
}

#[test]
fn receive_timeout_is_empty_not_an_error() {
    let mut dev = Sx127x::new_polled(MockBus::new(), MockPin::new());

    let got = dev.receive(Duration::from_millis(30)).unwrap();
    assert!(got.is_none());
}

#[test]
fn crc_mismatch_is_reported_and_payload_discarded() {
    let mut bus = MockBus::new();
    bus.stage_rx_packet(0x00, b"corrupt");
    bus.regs[REG_IRQ_FLAGS] |= 1 << 5; // PayloadCrcError
    bus.regs[REG_HOP_CHANNEL] = 1 << 6; // CrcOnPayload
    let mut dev = Sx127x::new_polled(bus, MockPin::new());

    assert!(matches!(
        dev.receive(Duration::from_millis(100)),
        Err(RadioError::Crc)
    ));
}

#[test]
fn crc_flag_without_crc_on_payload_is_not_an_error() {
    // The error flag alone is meaningless when the packet carried no CRC.
    let mut bus = MockBus::new();
    bus.stage_rx_packet(0x00, b"ok");
    bus.regs[REG_IRQ_FLAGS] |= 1 << 5;
    let mut dev = Sx127x::new_polled(bus, MockPin::new());

    let frame = dev.receive(Duration::from_millis(100)).unwrap().unwrap();
    assert_eq!(frame.as_slice(), b"ok");
}

#[test]
fn receive_truncates_to_caller_buffer() {
    let mut bus = MockBus::new();
    bus.stage_rx_packet(0x00, b"0123456789");
    let mut dev = Sx127x::new_polled(bus, MockPin::new());

    let mut small = [0u8; 4];
    let n = dev
        .receive_into(Duration::from_millis(100), &mut small)
        .unwrap()
        .unwrap();
    assert_eq!(n, 4);
    assert_eq!(&small, b"0123");
}

#[test]
fn configure_pulses_the_reset_line() {
    let mut dev = Sx127x::new_polled(MockBus::new(), MockPin::new());
    dev.configure(&config(868_100_000)).unwrap();

    let (_, pin) = dev.release();
    assert!(pin.pulses >= 1);
    assert!(pin.high);
}
