//! SX127x LoRa register map.
//!
//! Addresses and field layouts follow the Semtech SX1276/77/78/79 datasheet,
//! LoRa mode register table. Only the registers the driver touches are listed.

// Crystal oscillator frequency, used to derive the 24-bit FRF value.
pub const FXOSC: u32 = 32_000_000;

pub const REG_00_FIFO: u8 = 0x00;
pub const REG_01_OP_MODE: u8 = 0x01;
pub const REG_06_FRF_MSB: u8 = 0x06;
pub const REG_07_FRF_MID: u8 = 0x07;
pub const REG_08_FRF_LSB: u8 = 0x08;
pub const REG_09_PA_CONFIG: u8 = 0x09;
pub const REG_0D_FIFO_ADDR_PTR: u8 = 0x0D;
pub const REG_0E_FIFO_TX_BASE_ADDR: u8 = 0x0E;
pub const REG_0F_FIFO_RX_BASE_ADDR: u8 = 0x0F;
pub const REG_10_FIFO_RX_CURRENT_ADDR: u8 = 0x10;
pub const REG_12_IRQ_FLAGS: u8 = 0x12;
pub const REG_13_RX_NB_BYTES: u8 = 0x13;
pub const REG_19_PKT_SNR_VALUE: u8 = 0x19;
pub const REG_1A_PKT_RSSI_VALUE: u8 = 0x1A;
pub const REG_1C_HOP_CHANNEL: u8 = 0x1C;
pub const REG_1D_MODEM_CONFIG1: u8 = 0x1D;
pub const REG_1E_MODEM_CONFIG2: u8 = 0x1E;
pub const REG_20_PREAMBLE_MSB: u8 = 0x20;
pub const REG_21_PREAMBLE_LSB: u8 = 0x21;
pub const REG_22_PAYLOAD_LENGTH: u8 = 0x22;
pub const REG_26_MODEM_CONFIG3: u8 = 0x26;
pub const REG_2F_IF_FREQ2: u8 = 0x2F;
pub const REG_30_IF_FREQ1: u8 = 0x30;
pub const REG_31_DETECTION_OPTIMIZE: u8 = 0x31;
pub const REG_36_HIGHBW_OPTIMIZE1: u8 = 0x36;
pub const REG_37_DETECTION_THRESHOLD: u8 = 0x37;
pub const REG_3A_HIGHBW_OPTIMIZE2: u8 = 0x3A;
pub const REG_40_DIO_MAPPING1: u8 = 0x40;
pub const REG_42_VERSION: u8 = 0x42;
pub const REG_4D_PA_DAC: u8 = 0x4D;

// RegOpMode fields
pub const OP_MODE_MODE_MASK: u8 = 0x07;
pub const OP_MODE_MODE_OFFSET: u8 = 0;
pub const OP_MODE_LFM_MASK: u8 = 0x01;
pub const OP_MODE_LFM_OFFSET: u8 = 3;
pub const OP_MODE_LRM_MASK: u8 = 0x01;
pub const OP_MODE_LRM_OFFSET: u8 = 7;

// Operating modes (RegOpMode Mode field)
pub const MODE_SLEEP: u8 = 0x00;
pub const MODE_STANDBY: u8 = 0x01;
pub const MODE_TX: u8 = 0x03;
pub const MODE_RX_CONTINUOUS: u8 = 0x05;

// RegPaConfig fields
pub const PA_CONFIG_SELECT_OFFSET: u8 = 7;
pub const PA_CONFIG_MAX_POWER_MASK: u8 = 0x07;
pub const PA_CONFIG_MAX_POWER_OFFSET: u8 = 4;
pub const PA_CONFIG_POWER_MASK: u8 = 0x0F;
pub const PA_CONFIG_POWER_OFFSET: u8 = 0;

// RegIrqFlags bit offsets
pub const IRQ_RX_TIMEOUT_OFFSET: u8 = 7;
pub const IRQ_RX_DONE_OFFSET: u8 = 6;
pub const IRQ_PAYLOAD_CRC_ERROR_OFFSET: u8 = 5;
pub const IRQ_TX_DONE_OFFSET: u8 = 3;

// RegHopChannel fields
pub const HOP_CHANNEL_CRC_ON_PAYLOAD_OFFSET: u8 = 6;

// RegModemConfig1 fields
pub const MODEM_CONFIG1_BW_MASK: u8 = 0x0F;
pub const MODEM_CONFIG1_BW_OFFSET: u8 = 4;
pub const MODEM_CONFIG1_CR_MASK: u8 = 0x07;
pub const MODEM_CONFIG1_CR_OFFSET: u8 = 1;

// RegModemConfig2 fields
pub const MODEM_CONFIG2_SF_MASK: u8 = 0x0F;
pub const MODEM_CONFIG2_SF_OFFSET: u8 = 4;
pub const MODEM_CONFIG2_CRC_ON_OFFSET: u8 = 2;

// RegModemConfig3 fields
pub const MODEM_CONFIG3_AUTO_AGC_OFFSET: u8 = 2;

// RegDetectionOptimize fields
pub const DETECTION_OPTIMIZE_SF_MASK: u8 = 0x07;
pub const DETECTION_OPTIMIZE_SF_OFFSET: u8 = 0;
pub const DETECTION_OPTIMIZE_AUTO_IF_ON_MASK: u8 = 0x01;
pub const DETECTION_OPTIMIZE_AUTO_IF_ON_OFFSET: u8 = 7;

// RegDioMapping1 fields (DIO0 function select)
pub const DIO_MAPPING1_DIO0_MASK: u8 = 0x03;
pub const DIO_MAPPING1_DIO0_OFFSET: u8 = 6;
pub const DIO0_TX_DONE: u8 = 0b01;
pub const DIO0_RX_DONE: u8 = 0b00;

// RegPaDac fields
pub const PA_DAC_BOOST_MASK: u8 = 0x07;
pub const PA_DAC_BOOST_OFFSET: u8 = 0;
pub const PA_DAC_ENABLE: u8 = 0x07;
pub const PA_DAC_DISABLE: u8 = 0x04;

// Silicon revision reported by REG_42_VERSION on SX1276/77/78/79 parts.
pub const VERSION_EXPECTED: u8 = 0x12;
